//! Parse textual EIR, run liveness and register allocation, and print the result.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use bumpalo::Bump;
use clap::Parser;
use eir::abi::CallingConvention;
use eir::allocator::{AllocatorConfig, GreedyAllocator};
use eir::core::CompilationContext;
use eir::text::{parse_methods_with_convention, print_live_ranges, print_method};

/// Allocate registers for the methods of an EIR file.
#[derive(Parser, Debug)]
#[command(name = "eirdump")]
struct Options {
    /// Input file; reads stdin when absent or '-'.
    file: Option<PathBuf>,

    /// Calling convention for methods whose header names none.
    #[arg(long, default_value = "java", value_parser = parse_convention)]
    convention: CallingConvention,

    /// Stop after live range computation.
    #[arg(long)]
    liveness_only: bool,

    /// Keep moves whose ends share a location instead of turning them into fillers.
    #[arg(long)]
    no_fillers: bool,

    /// Fail instead of spilling when registers run out.
    #[arg(long)]
    no_spill: bool,

    /// Print live ranges next to the allocated code.
    #[arg(long)]
    ranges: bool,

    /// Enable debug logging on stderr.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_convention(name: &str) -> Result<CallingConvention, String> {
    CallingConvention::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = CallingConvention::ALL.iter().map(|c| c.name()).collect();
        format!("unknown calling convention '{name}', expected one of {}", known.join(", "))
    })
}

fn read_input(file: Option<&PathBuf>) -> io::Result<String> {
    match file {
        Some(path) if path.as_os_str() != "-" => fs::read_to_string(path),
        _ => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::parse();
    let default_level = if options.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let text = read_input(options.file.as_ref())?;
    let arena = Bump::new();
    let context = CompilationContext::new(&arena)?;
    let allocator = GreedyAllocator::new(AllocatorConfig {
        replace_redundant_moves: !options.no_fillers,
        spill_to_stack: !options.no_spill,
        ..AllocatorConfig::default()
    });

    for (i, mut method) in parse_methods_with_convention(&context, &text, options.convention)?.into_iter().enumerate() {
        if i != 0 {
            println!();
        }
        if options.liveness_only {
            method.compute_live_ranges();
            print!("{}", print_method(&method));
            print!("{}", print_live_ranges(&method));
            continue;
        }

        let summary = match allocator.allocate(&context, &mut method) {
            Ok(summary) => summary,
            Err(err) => {
                eprintln!("{}: {err}", method.name());
                std::process::exit(1);
            }
        };
        print!("{}", print_method(&method));
        if options.ranges {
            print!("{}", print_live_ranges(&method));
        }
        println!(
            "; frame {} bytes, {} registers, {} spills, {} fillers, {} literals",
            summary.frame_size, summary.registers, summary.spills, summary.fillers, summary.literals
        );
    }

    if !options.liveness_only {
        eprint!("{}", context.stats());
    }
    Ok(())
}
