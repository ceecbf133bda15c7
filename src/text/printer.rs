//! Textual EIR printer.
//!
//! Output parses back with [`super::parse_methods`]. Placed values carry
//! their location after an `@`, named with the ABI's register names.

use std::fmt::Write;

use crate::core::block::{BlockId, EirBlock};
use crate::core::instruction::{EirInstruction, InstructionKind};
use crate::core::kind::Kind;
use crate::core::location::EirLocation;
use crate::core::method::EirMethod;
use crate::core::value::ValueId;

pub fn print_method(method: &EirMethod) -> String {
    let mut out = String::new();
    let parameters: Vec<&str> = method.parameter_kinds().iter().map(|kind| kind.name()).collect();
    let _ = write!(out, "method {}({})", method.name(), parameters.join(", "));
    if method.result_kind() != Kind::Void {
        let _ = write!(out, " -> {}", method.result_kind());
    }
    let _ = writeln!(out, " @{} {{", method.abi().convention());

    for block in method.blocks() {
        let _ = writeln!(out, "{}:", block_label(method, block.id()));
        for &inst in block.instructions() {
            let _ = writeln!(out, "  {}", instruction_text(method, method.instruction(inst)));
        }
    }
    out.push_str("}\n");
    out
}

/// One line per variable with a non-empty live range.
pub fn print_live_ranges(method: &EirMethod) -> String {
    let mut out = String::new();
    for value in method.values() {
        if value.is_constant() || value.live_range().is_empty() {
            continue;
        }
        let range = value.live_range();
        let _ = match range.as_bit_set() {
            Some(bits) => writeln!(out, "{}: {bits}", value_text(method, value.id())),
            None => writeln!(out, "{}: {range:?}", value_text(method, value.id())),
        };
    }
    out
}

fn block_label(method: &EirMethod, block: BlockId) -> String {
    let block: &EirBlock = method.block(block);
    match block.name() {
        Some(name) => name.to_string(),
        None => format!("b{}", block.id().index()),
    }
}

fn location_text(method: &EirMethod, location: EirLocation) -> String {
    match location {
        EirLocation::Register(register) => method.abi().register_name(register).to_string(),
        other => other.to_string(),
    }
}

fn value_text(method: &EirMethod, id: ValueId) -> String {
    let value = method.value(id);
    if let Some(constant) = value.constant() {
        return constant.to_string();
    }
    let mut text = match value.name() {
        Some(name) => format!("%{name}:{}", value.kind()),
        None => format!("%v{}:{}", id.index(), value.kind()),
    };
    if let Some(location) = value.location() {
        let _ = write!(text, "@{}", location_text(method, location));
    }
    text
}

fn instruction_text(method: &EirMethod, inst: &EirInstruction) -> String {
    let operand = |index: usize| match method.operand_value(inst.id(), index) {
        Some(value) => value_text(method, value),
        None => "_".to_string(),
    };
    let mut text = match inst.kind() {
        InstructionKind::Prologue => {
            let parameters: Vec<String> = (0..inst.operands().len()).map(operand).collect();
            if parameters.is_empty() {
                "prologue".to_string()
            } else {
                format!("prologue {}", parameters.join(", "))
            }
        }
        InstructionKind::Move => format!("{} = move {}", operand(0), operand(1)),
        InstructionKind::Arithmetic(op) => format!("{} {}, {}", op.mnemonic(), operand(0), operand(1)),
        InstructionKind::Compare => format!("cmp {}, {}", operand(0), operand(1)),
        InstructionKind::Call { arguments, has_result } => {
            let args: Vec<String> = (1..=*arguments).map(operand).collect();
            let mut text = format!("call {}({})", operand(0), args.join(", "));
            if *has_result {
                let _ = write!(text, " -> {}", operand(arguments + 1));
            }
            text
        }
        InstructionKind::Safepoint => "safepoint".to_string(),
        InstructionKind::Jump { target } => format!("jump ^{}", block_label(method, *target)),
        InstructionKind::Branch { then_block, else_block } => format!(
            "branch {} ^{}, ^{}",
            operand(0),
            block_label(method, *then_block),
            block_label(method, *else_block)
        ),
        InstructionKind::Return if inst.operands().is_empty() => "return".to_string(),
        InstructionKind::Return => format!("return {}", operand(0)),
        InstructionKind::StackAllocate { size, align } => {
            format!("{} = stackalloc {size}, {align}", operand(0))
        }
        InstructionKind::Catch => format!("catch {}", operand(0)),
        InstructionKind::Filler => "filler".to_string(),
    };

    if !inst.live_variables().is_empty() {
        let roots: Vec<String> = inst
            .live_variables()
            .iter()
            .map(|&value| value_text(method, value))
            .collect();
        let _ = write!(text, " ; roots {}", roots.join(", "));
    }
    text
}
