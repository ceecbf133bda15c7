//! Live range computation over parsed EIR methods.

use bumpalo::Bump;
use eir::core::{
    BitSetLiveRange, BlockId, CompilationContext, ControlFlow, EirMethod, EirPosition, InstructionKind, LiveRange,
    ValueId,
};
use eir::text::parse_method;

fn value_named(method: &EirMethod, name: &str) -> ValueId {
    method
        .values()
        .iter()
        .find(|value| value.name() == Some(name))
        .map(|value| value.id())
        .unwrap()
}

fn at(block: usize, index: usize) -> EirPosition {
    EirPosition::new(BlockId::new(block), index)
}

#[test]
fn test_value_flowing_into_successor() {
    let arena = Bump::new();
    let context = CompilationContext::new(&arena).unwrap();
    let mut method = parse_method(
        &context,
        "
        method two() {
        a:
          %x:int = move #1
          %y:int = move #2
          %v:int = move #3
          add %x, %y
          jump ^b
        b:
          cmp %v, #0
          return
        }
        ",
    )
    .unwrap();
    method.compute_live_ranges();

    let v = method.value(value_named(&method, "v")).live_range();
    assert!(!v.contains(at(0, 0)));
    assert!(!v.contains(at(0, 1)));
    for index in 2..=5 {
        assert!(v.contains(at(0, index)), "a[{index}]");
    }
    assert!(v.contains(at(1, 0)));
    assert!(!v.contains(at(1, 1)));
    assert!(!v.contains(at(1, 2)));

    let bits = v.as_bit_set().unwrap();
    assert!(bits.is_coverage_extending_beyond_block(method.control_flow(), BlockId::new(0)));
    assert!(!bits.is_coverage_extending_beyond_block(method.control_flow(), BlockId::new(1)));
    assert_eq!(bits.to_string(), "b0[2..5] b1[0]");
}

#[test]
fn test_contains_has_no_side_effects() {
    let arena = Bump::new();
    let context = CompilationContext::new(&arena).unwrap();
    let mut method = parse_method(
        &context,
        "
        method m() {
        b:
          %x:long = move #1:long
          safepoint
          cmp %x, #2
          return
        }
        ",
    )
    .unwrap();
    method.compute_live_ranges();
    let x = method.value(value_named(&method, "x")).live_range();
    let before = x.as_bit_set().cloned().unwrap();
    for _ in 0..3 {
        assert!(x.contains(at(0, 1)));
        assert!(!x.contains(at(0, 3)));
    }
    assert_eq!(x.as_bit_set(), Some(&before));
}

#[test]
fn test_loop_carried_value() {
    let arena = Bump::new();
    let context = CompilationContext::new(&arena).unwrap();
    let mut method = parse_method(
        &context,
        "
        method counting() {
        entry:
          %i:int = move #0
          jump ^head
        head:
          cmp %i, #10
          branch %i ^body, ^done
        body:
          add %i, #1
          jump ^head
        done:
          return
        }
        ",
    )
    .unwrap();
    method.compute_live_ranges();

    let i = method.value(value_named(&method, "i")).live_range();
    let bits = i.as_bit_set().unwrap();
    assert_eq!(bits.to_string(), "b0[0..2] b1[0..2] b2[0..2]");
    assert!(!i.contains(at(3, 0)));
    assert_eq!(bits.blocks().collect::<Vec<_>>(), vec![BlockId::new(0), BlockId::new(1), BlockId::new(2)]);
}

#[test]
fn test_every_use_is_covered() {
    let arena = Bump::new();
    let context = CompilationContext::new(&arena).unwrap();
    let mut method = parse_method(
        &context,
        "
        method diamond(int, int) -> int {
        entry:
          prologue %a:int, %b:int
          cmp %a, %b
          branch %a ^left, ^right
        left:
          add %a, %b
          jump ^join
        right:
          sub %a, #1
          jump ^join
        join:
          return %a
        }
        ",
    )
    .unwrap();
    method.compute_live_ranges();

    for value in method.values() {
        if value.is_constant() {
            continue;
        }
        for &operand in value.operands() {
            let operand = method.operand(operand);
            let position = method.instruction(operand.instruction()).position();
            assert!(
                value.live_range().contains(position),
                "{} not live at its operand in {}",
                value.id(),
                position.block
            );
        }
    }
    let b = method.value(value_named(&method, "b")).live_range();
    assert!(!b.contains(at(3, 0)));
    assert!(!b.contains(at(2, 0)));
}

#[test]
fn test_filler_keeps_indices_and_ranges() {
    let arena = Bump::new();
    let context = CompilationContext::new(&arena).unwrap();
    let mut method = parse_method(
        &context,
        "
        method m() {
        b:
          %x:int = move #1
          %y:int = move #2
          safepoint
          cmp %x, %y
          add %y, %x
          return
        }
        ",
    )
    .unwrap();
    method.compute_live_ranges();
    let snapshot: Vec<BitSetLiveRange> = method
        .values()
        .iter()
        .filter_map(|value| value.live_range().as_bit_set().cloned())
        .collect();
    let positions: Vec<EirPosition> = method.instructions().iter().map(|inst| inst.position()).collect();
    let length = method.blocks()[0].len();

    let safepoint = method
        .instructions()
        .iter()
        .find(|inst| inst.kind() == &InstructionKind::Safepoint)
        .map(|inst| inst.id())
        .unwrap();
    method.replace_with_filler(safepoint).unwrap();
    method.compute_live_ranges();

    assert_eq!(method.blocks()[0].len(), length);
    assert_eq!(method.control_flow().block_length(BlockId::new(0)), length);
    let after: Vec<EirPosition> = method.instructions().iter().map(|inst| inst.position()).collect();
    assert_eq!(after, positions);
    let recomputed: Vec<BitSetLiveRange> = method
        .values()
        .iter()
        .filter_map(|value| value.live_range().as_bit_set().cloned())
        .collect();
    assert_eq!(recomputed, snapshot);
    assert!(method.is_redundant(safepoint));
}

/// Straight-line graph used to drive live ranges directly.
struct Straight(usize);

impl ControlFlow for Straight {
    fn block_length(&self, _block: BlockId) -> usize {
        self.0
    }

    fn predecessors(&self, _block: BlockId) -> &[BlockId] {
        &[]
    }
}

#[test]
fn test_union_of_disjoint_ranges() {
    let cfg = Straight(8);
    let mut first = BitSetLiveRange::new();
    first.record_definition(at(0, 0));
    first.record_use(&cfg, at(0, 2));
    let mut second = BitSetLiveRange::new();
    second.record_definition(at(0, 4));
    second.record_use(&cfg, at(0, 6));
    assert!(!first.intersects(&second).unwrap());

    let original = first.clone();
    first.add(&second).unwrap();
    for index in 0..=8 {
        let position = at(0, index);
        assert_eq!(
            first.contains(position),
            original.contains(position) || second.contains(position),
            "index {index}"
        );
    }
    assert!(first.intersects(&second).unwrap());
}
