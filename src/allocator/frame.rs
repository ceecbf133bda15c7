//! Stack frame bookkeeping for one method.
//!
//! Frame layout, growing away from the stack pointer:
//!
//! ```text
//! sp + 0:                 outgoing stack arguments
//! sp + outgoing:          spill slots
//! sp + ... :              stack-allocated blocks
//! sp + ... :              saved callee-saved registers
//! sp + frame_size:        return address
//! ```
//!
//! The layout is scratch data of a single compilation, so it lives in the
//! compilation arena.

use bumpalo::{collections::Vec as BumpVec, Bump};

use crate::abi::EirAbi;
use crate::core::location::{EirStackSlot, StackSlotPurpose};
use crate::core::register::EirRegister;

#[derive(Debug)]
pub struct FrameLayout<'a> {
    /// Callee-saved registers the method writes and must restore.
    saved_registers: BumpVec<'a, EirRegister>,
    /// Spill slots in allocation order.
    spill_slots: BumpVec<'a, EirStackSlot>,
    /// Byte offsets of stack blocks inside the block area.
    stack_blocks: BumpVec<'a, u32>,
    outgoing_size: u32,
    stack_blocks_size: u32,
    slot_size: u32,
    alignment: u32,
}

impl<'a> FrameLayout<'a> {
    pub fn new(arena: &'a Bump, abi: &EirAbi, outgoing_size: u32) -> Self {
        Self {
            saved_registers: BumpVec::new_in(arena),
            spill_slots: BumpVec::new_in(arena),
            stack_blocks: BumpVec::new_in(arena),
            outgoing_size: align_up(outgoing_size, abi.stack_slot_size()),
            stack_blocks_size: 0,
            slot_size: abi.stack_slot_size(),
            alignment: abi.frame_alignment(),
        }
    }

    pub fn add_saved_register(&mut self, register: EirRegister) {
        if !self.saved_registers.contains(&register) {
            self.saved_registers.push(register);
        }
    }

    pub fn saved_registers(&self) -> &[EirRegister] {
        &self.saved_registers
    }

    /// Hand out a fresh local slot above the outgoing argument area.
    pub fn allocate_spill_slot(&mut self) -> EirStackSlot {
        let offset = self.outgoing_size + self.spill_slots.len() as u32 * self.slot_size;
        let slot = EirStackSlot::new(StackSlotPurpose::Local, offset);
        self.spill_slots.push(slot);
        slot
    }

    pub fn spill_slots(&self) -> &[EirStackSlot] {
        &self.spill_slots
    }

    /// Reserve `size` bytes aligned to `align` in the stack block area.
    pub fn allocate_stack_block(&mut self, size: u32, align: u32) -> EirStackSlot {
        let offset = align_up(self.stack_blocks_size, align.max(1));
        self.stack_blocks.push(offset);
        self.stack_blocks_size = offset + size;
        EirStackSlot::new(StackSlotPurpose::Block, offset)
    }

    pub fn stack_blocks_size(&self) -> u32 {
        align_up(self.stack_blocks_size, self.slot_size)
    }

    /// Total frame size, rounded up to the frame alignment.
    pub fn frame_size(&self) -> u32 {
        let total = self.outgoing_size
            + self.spill_slots.len() as u32 * self.slot_size
            + self.stack_blocks_size()
            + self.saved_registers.len() as u32 * self.slot_size;
        align_up(total, self.alignment)
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{amd64, CallingConvention};

    #[test]
    fn test_spill_slots_follow_outgoing_area() {
        let arena = Bump::new();
        let abi = amd64::unix_abi(CallingConvention::Java).unwrap();
        let mut frame = FrameLayout::new(&arena, &abi, 12);

        let first = frame.allocate_spill_slot();
        let second = frame.allocate_spill_slot();
        assert_eq!(first, EirStackSlot::new(StackSlotPurpose::Local, 16));
        assert_eq!(second.offset, 24);
        assert_eq!(frame.frame_size(), 32);
    }

    #[test]
    fn test_frame_is_aligned() {
        let arena = Bump::new();
        let abi = amd64::unix_abi(CallingConvention::CFunction).unwrap();
        let mut frame = FrameLayout::new(&arena, &abi, 0);
        assert_eq!(frame.frame_size(), 0);

        frame.allocate_spill_slot();
        assert_eq!(frame.frame_size(), 16);

        frame.add_saved_register(amd64::RBX);
        frame.add_saved_register(amd64::RBX);
        assert_eq!(frame.saved_registers().len(), 1);
        assert_eq!(frame.frame_size(), 16);
    }

    #[test]
    fn test_stack_blocks() {
        let arena = Bump::new();
        let abi = amd64::unix_abi(CallingConvention::Java).unwrap();
        let mut frame = FrameLayout::new(&arena, &abi, 0);
        let a = frame.allocate_stack_block(5, 1);
        let b = frame.allocate_stack_block(8, 8);
        assert_eq!(a.purpose, StackSlotPurpose::Block);
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 8);
        assert_eq!(frame.stack_blocks_size(), 16);
        assert_eq!(frame.frame_size(), 16);
    }
}
