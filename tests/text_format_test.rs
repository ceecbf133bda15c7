//! Textual EIR round trips and diagnostics.

use bumpalo::Bump;
use eir::abi::CallingConvention;
use eir::allocator::GreedyAllocator;
use eir::core::{CompilationContext, EirError, InstructionKind, Kind};
use eir::text::{parse_methods, print_method};

const MODULE: &str = "
; two methods in one file
method first(long) -> long {
entry:
  prologue %x:long
  shl %x, #2
  return %x
}

method second(word, double) -> double @cfunction {
entry:
  prologue %f:word, %d:double
  %p:word = stackalloc 32, 16
  call %f(%p, %d) -> %r:double
  return %r
}
";

#[test]
fn test_parse_several_methods() {
    let arena = Bump::new();
    let context = CompilationContext::new(&arena).unwrap();
    let methods = parse_methods(&context, MODULE).unwrap();
    assert_eq!(methods.len(), 2);

    assert_eq!(methods[0].name(), "first");
    assert_eq!(methods[0].result_kind(), Kind::Long);
    assert_eq!(methods[0].abi().convention(), CallingConvention::Java);

    let second = &methods[1];
    assert_eq!(second.abi().convention(), CallingConvention::CFunction);
    assert_eq!(second.parameter_kinds(), &[Kind::Word, Kind::Double]);
    let call = second
        .instructions()
        .iter()
        .find(|inst| inst.is_call())
        .unwrap();
    assert_eq!(
        call.kind(),
        &InstructionKind::Call {
            arguments: 2,
            has_result: true
        }
    );
    assert!(second
        .instructions()
        .iter()
        .any(|inst| inst.kind() == &InstructionKind::StackAllocate { size: 32, align: 16 }));
}

#[test]
fn test_allocated_text_parses_again() {
    let arena = Bump::new();
    let context = CompilationContext::new(&arena).unwrap();
    let mut text = String::new();
    for mut method in parse_methods(&context, MODULE).unwrap() {
        GreedyAllocator::default().allocate(&context, &mut method).unwrap();
        text.push_str(&print_method(&method));
    }
    assert!(text.contains("@cfunction {"));
    assert!(text.contains("= stackalloc 32, 16"));

    let reparsed = parse_methods(&context, &text).unwrap();
    let names: Vec<&str> = reparsed.iter().map(|method| method.name()).collect();
    assert_eq!(names, vec!["first", "second"]);
}

#[test]
fn test_diagnostics() {
    let arena = Bump::new();
    let context = CompilationContext::new(&arena).unwrap();

    let cases = [
        ("method m() {\nb:\n  frobnicate %x:int\n}", 3),
        ("method m() {\n  return\n}", 2),
        ("method m(int {\nb:\n  return\n}", 1),
        ("method m() @fastcall {\nb:\n  return\n}", 1),
        ("method m() {\nb:\nb:\n  return\n}", 3),
        ("method m() {\nb:\n  %x:int = move #1.5.5\n}", 3),
    ];
    for (text, line) in cases {
        match parse_methods(&context, text) {
            Err(EirError::Parse { line: actual, .. }) => assert_eq!(actual, line, "{text}"),
            other => panic!("{text}: {other:?}"),
        }
    }

    // Builder invariants surface unchanged.
    let void_return = "method m() {\nb:\n  return #1\n}";
    assert!(parse_methods(&context, void_return)
        .unwrap_err()
        .is_invariant_violation());
}
