//! Basic blocks.
//!
//! A block is an ordered list of instruction handles plus its edges in the
//! control flow graph. Instruction indices inside a block stay stable while
//! liveness is computed; removed instructions are overwritten with fillers
//! rather than deleted.

use std::fmt;

use super::instruction::InstructionId;
use super::live_range::ControlFlow;

/// Handle of a block; also its serial number for printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl BlockId {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRole {
    Normal,
    /// Entered by the runtime when an exception is thrown; starts with a catch.
    ExceptionDispatcher,
}

#[derive(Debug, Clone)]
pub struct EirBlock {
    id: BlockId,
    role: BlockRole,
    name: Option<String>,
    instructions: Vec<InstructionId>,
    predecessors: Vec<BlockId>,
    successors: Vec<BlockId>,
}

impl EirBlock {
    pub(crate) fn new(id: BlockId, name: Option<String>) -> Self {
        Self {
            id,
            role: BlockRole::Normal,
            name,
            instructions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn role(&self) -> BlockRole {
        self.role
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn instructions(&self) -> &[InstructionId] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    pub(crate) fn set_role(&mut self, role: BlockRole) {
        self.role = role;
    }

    /// Append and return the new instruction's index.
    pub(crate) fn push_instruction(&mut self, instruction: InstructionId) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    pub(crate) fn add_predecessor(&mut self, block: BlockId) {
        if !self.predecessors.contains(&block) {
            self.predecessors.push(block);
        }
    }

    pub(crate) fn add_successor(&mut self, block: BlockId) {
        if !self.successors.contains(&block) {
            self.successors.push(block);
        }
    }

    pub(crate) fn release_instructions(&mut self) {
        self.instructions.clear();
    }
}

impl ControlFlow for Vec<EirBlock> {
    fn block_length(&self, block: BlockId) -> usize {
        self[block.index()].len()
    }

    fn predecessors(&self, block: BlockId) -> &[BlockId] {
        &self[block.index()].predecessors
    }
}
