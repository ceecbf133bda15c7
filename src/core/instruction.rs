// This module defines EIR instructions as a tagged union over instruction kinds instead
// of a class hierarchy with visitor dispatch. Every instruction stores its position
// (block and index), its kind and the operands it owns. Most kinds are ordinary
// near-machine operations (moves, two-address arithmetic, compares, calls, control
// transfer). Two kinds are pseudo-instructions that exist only for the allocator:
// Catch defines the exception object at the ABI's exception location at the entry of a
// handler block, and Filler stands in for an instruction removed after allocation so
// that no other instruction changes its index. Neither emits code. Calls and safepoints
// additionally record the set of live reference variables for stack maps.

//! EIR instructions.

use std::fmt;

use smallvec::SmallVec;

use super::block::BlockId;
use super::live_range::EirPosition;
use super::operand::OperandId;
use super::value::ValueId;

/// Handle of an instruction inside its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionId(u32);

impl InstructionId {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Two-address arithmetic and logic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl ArithmeticOp {
    pub const ALL: [ArithmeticOp; 8] = [
        ArithmeticOp::Add,
        ArithmeticOp::Sub,
        ArithmeticOp::Mul,
        ArithmeticOp::And,
        ArithmeticOp::Or,
        ArithmeticOp::Xor,
        ArithmeticOp::Shl,
        ArithmeticOp::Shr,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Sub => "sub",
            ArithmeticOp::Mul => "mul",
            ArithmeticOp::And => "and",
            ArithmeticOp::Or => "or",
            ArithmeticOp::Xor => "xor",
            ArithmeticOp::Shl => "shl",
            ArithmeticOp::Shr => "shr",
        }
    }

    pub fn from_mnemonic(mnemonic: &str) -> Option<ArithmeticOp> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == mnemonic)
    }
}

/// Instruction kinds and their operand layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    /// Defines every parameter at its ABI location. One operand per parameter.
    Prologue,
    /// `[destination (def), source (use)]`.
    Move,
    /// `[destination (update), source (use)]`.
    Arithmetic(ArithmeticOp),
    /// `[left (use), right (use)]`.
    Compare,
    /// `[callee (use), arguments (use)..., result (def)?]`.
    Call { arguments: usize, has_result: bool },
    Safepoint,
    Jump { target: BlockId },
    /// `[condition (use)]`.
    Branch { then_block: BlockId, else_block: BlockId },
    /// `[value (use)]?`.
    Return,
    /// `[address (def)]` of `size` bytes reserved in the frame.
    StackAllocate { size: u32, align: u32 },
    /// `[exception (def)]` pinned to the ABI's exception location.
    Catch,
    Filler,
}

impl InstructionKind {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            InstructionKind::Prologue => "prologue",
            InstructionKind::Move => "move",
            InstructionKind::Arithmetic(op) => op.mnemonic(),
            InstructionKind::Compare => "cmp",
            InstructionKind::Call { .. } => "call",
            InstructionKind::Safepoint => "safepoint",
            InstructionKind::Jump { .. } => "jump",
            InstructionKind::Branch { .. } => "branch",
            InstructionKind::Return => "return",
            InstructionKind::StackAllocate { .. } => "stackalloc",
            InstructionKind::Catch => "catch",
            InstructionKind::Filler => "filler",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EirInstruction {
    id: InstructionId,
    position: EirPosition,
    kind: InstructionKind,
    operands: SmallVec<[OperandId; 4]>,
    live_variables: Vec<ValueId>,
}

impl EirInstruction {
    pub(crate) fn new(id: InstructionId, position: EirPosition, kind: InstructionKind) -> Self {
        Self {
            id,
            position,
            kind,
            operands: SmallVec::new(),
            live_variables: Vec::new(),
        }
    }

    pub fn id(&self) -> InstructionId {
        self.id
    }

    pub fn kind(&self) -> &InstructionKind {
        &self.kind
    }

    pub fn position(&self) -> EirPosition {
        self.position
    }

    pub fn block(&self) -> BlockId {
        self.position.block
    }

    pub fn index(&self) -> usize {
        self.position.index
    }

    pub fn operands(&self) -> &[OperandId] {
        &self.operands
    }

    /// Catch and Filler contribute no machine code.
    pub fn is_pseudo(&self) -> bool {
        matches!(self.kind, InstructionKind::Catch | InstructionKind::Filler)
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, InstructionKind::Call { .. })
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Jump { .. } | InstructionKind::Branch { .. } | InstructionKind::Return
        )
    }

    /// Blocks control may transfer to after this instruction.
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self.kind {
            InstructionKind::Jump { target } => SmallVec::from_slice(&[target]),
            InstructionKind::Branch {
                then_block,
                else_block,
            } => SmallVec::from_slice(&[then_block, else_block]),
            _ => SmallVec::new(),
        }
    }

    /// Variables the garbage collector must see at this instruction.
    pub fn live_variables(&self) -> &[ValueId] {
        &self.live_variables
    }

    /// Record a GC root; only calls and safepoints keep them.
    pub fn add_live_variable(&mut self, value: ValueId) {
        match self.kind {
            InstructionKind::Call { .. } | InstructionKind::Safepoint => {
                if !self.live_variables.contains(&value) {
                    self.live_variables.push(value);
                }
            }
            _ => {}
        }
    }

    pub fn remove_live_variable(&mut self, value: ValueId) {
        match self.kind {
            InstructionKind::Call { .. } | InstructionKind::Safepoint => {
                self.live_variables.retain(|&v| v != value);
            }
            _ => {}
        }
    }

    pub(crate) fn push_operand(&mut self, operand: OperandId) {
        self.operands.push(operand);
    }

    /// Turn into a Filler, handing back the operands it owned.
    pub(crate) fn become_filler(&mut self) -> SmallVec<[OperandId; 4]> {
        self.kind = InstructionKind::Filler;
        self.live_variables.clear();
        std::mem::take(&mut self.operands)
    }

    pub(crate) fn release(&mut self) {
        self.operands.clear();
        self.live_variables.clear();
    }
}

impl fmt::Display for EirInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @{}", self.kind.mnemonic(), self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction(kind: InstructionKind) -> EirInstruction {
        EirInstruction::new(InstructionId::new(0), EirPosition::new(BlockId::new(0), 0), kind)
    }

    #[test]
    fn test_live_variables_only_on_calls_and_safepoints() {
        let mut safepoint = instruction(InstructionKind::Safepoint);
        safepoint.add_live_variable(ValueId::new(1));
        safepoint.add_live_variable(ValueId::new(1));
        safepoint.add_live_variable(ValueId::new(2));
        assert_eq!(safepoint.live_variables(), &[ValueId::new(1), ValueId::new(2)]);
        safepoint.remove_live_variable(ValueId::new(1));
        assert_eq!(safepoint.live_variables(), &[ValueId::new(2)]);

        let mut filler = instruction(InstructionKind::Filler);
        filler.add_live_variable(ValueId::new(1));
        assert!(filler.live_variables().is_empty());
        filler.remove_live_variable(ValueId::new(1));
        assert!(filler.is_pseudo());
    }

    #[test]
    fn test_successors() {
        let jump = instruction(InstructionKind::Jump { target: BlockId::new(3) });
        assert_eq!(jump.successors().as_slice(), &[BlockId::new(3)]);
        assert!(jump.is_terminator());

        let branch = instruction(InstructionKind::Branch {
            then_block: BlockId::new(1),
            else_block: BlockId::new(2),
        });
        assert_eq!(branch.successors().len(), 2);
        assert!(instruction(InstructionKind::Return).successors().is_empty());
    }

    #[test]
    fn test_become_filler_keeps_position() {
        let mut inst = EirInstruction::new(
            InstructionId::new(4),
            EirPosition::new(BlockId::new(1), 3),
            InstructionKind::Move,
        );
        inst.push_operand(OperandId::new(7));
        inst.push_operand(OperandId::new(8));
        let released = inst.become_filler();
        assert_eq!(released.as_slice(), &[OperandId::new(7), OperandId::new(8)]);
        assert_eq!(inst.kind(), &InstructionKind::Filler);
        assert_eq!(inst.position(), EirPosition::new(BlockId::new(1), 3));
        assert!(inst.operands().is_empty());
    }

    #[test]
    fn test_arithmetic_mnemonics() {
        for op in ArithmeticOp::ALL {
            assert_eq!(ArithmeticOp::from_mnemonic(op.mnemonic()), Some(op));
        }
    }
}
