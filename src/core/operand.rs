//! Operands: one use-site or def-site of a value inside one instruction.
//!
//! Operands are the objects the allocator actually manipulates. Each one
//! names its instruction, its effect, the location categories it accepts
//! and optional placement constraints. The value an operand is bound to is
//! tracked by the owning [`EirMethod`](super::method::EirMethod), which keeps
//! the value's operand set in sync.

use std::fmt;

use super::instruction::InstructionId;
use super::location::{EirLocation, LocationCategorySet};
use super::register::EirRegister;
use super::value::ValueId;

/// Handle of an operand inside its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperandId(u32);

impl OperandId {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What an instruction does to the value behind an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandEffect {
    Definition,
    /// Read, then written (two-address destinations).
    Update,
    Use,
}

impl OperandEffect {
    pub fn is_definition(self) -> bool {
        matches!(self, OperandEffect::Definition | OperandEffect::Update)
    }

    pub fn is_use(self) -> bool {
        matches!(self, OperandEffect::Use | OperandEffect::Update)
    }
}

#[derive(Debug, Clone)]
pub struct EirOperand {
    id: OperandId,
    instruction: InstructionId,
    effect: OperandEffect,
    location_categories: LocationCategorySet,
    preferred_register: Option<EirRegister>,
    required_register: Option<EirRegister>,
    required_location: Option<EirLocation>,
    weight: u32,
    value: Option<ValueId>,
}

impl EirOperand {
    pub(crate) fn new(
        id: OperandId,
        instruction: InstructionId,
        effect: OperandEffect,
        location_categories: LocationCategorySet,
    ) -> Self {
        Self {
            id,
            instruction,
            effect,
            location_categories,
            preferred_register: None,
            required_register: None,
            required_location: None,
            weight: 1,
            value: None,
        }
    }

    pub fn id(&self) -> OperandId {
        self.id
    }

    pub fn instruction(&self) -> InstructionId {
        self.instruction
    }

    pub fn effect(&self) -> OperandEffect {
        self.effect
    }

    pub fn location_categories(&self) -> LocationCategorySet {
        self.location_categories
    }

    pub fn preferred_register(&self) -> Option<EirRegister> {
        self.preferred_register
    }

    pub fn required_register(&self) -> Option<EirRegister> {
        self.required_register
    }

    pub fn required_location(&self) -> Option<EirLocation> {
        self.required_location
    }

    /// Allocation priority hint.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn eir_value(&self) -> Option<ValueId> {
        self.value
    }

    /// Whether a value living at `location` may be bound to this operand.
    pub fn accepts(&self, location: &EirLocation) -> bool {
        self.location_categories.contains(location.category())
    }

    pub fn set_preferred_register(&mut self, register: EirRegister) {
        self.preferred_register = Some(register);
    }

    pub fn set_weight(&mut self, weight: u32) {
        self.weight = weight;
    }

    /// Caller has checked `accepts(&location)`.
    pub(crate) fn set_required_location(&mut self, location: EirLocation) {
        self.required_location = Some(location);
        self.required_register = location.as_register();
    }

    pub(crate) fn bind(&mut self, value: ValueId) -> Option<ValueId> {
        self.value.replace(value)
    }

    pub(crate) fn unbind(&mut self) -> Option<ValueId> {
        self.value.take()
    }
}

impl fmt::Display for EirOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(value) => write!(f, "{value}")?,
            None => f.write_str("<unbound>")?,
        }
        if let Some(location) = self.required_location {
            write!(f, "!{location}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::location::{EirStackSlot, StackSlotPurpose};

    fn operand(effect: OperandEffect, categories: LocationCategorySet) -> EirOperand {
        EirOperand::new(OperandId::new(0), InstructionId::new(0), effect, categories)
    }

    #[test]
    fn test_effects() {
        assert!(OperandEffect::Definition.is_definition());
        assert!(!OperandEffect::Definition.is_use());
        assert!(OperandEffect::Update.is_definition());
        assert!(OperandEffect::Update.is_use());
        assert!(OperandEffect::Use.is_use());
        assert!(!OperandEffect::Use.is_definition());
    }

    #[test]
    fn test_required_location_implies_register() {
        let mut op = operand(OperandEffect::Definition, LocationCategorySet::G);
        let rax = EirRegister::integer(0);
        op.set_required_location(EirLocation::Register(rax));
        assert_eq!(op.required_register(), Some(rax));

        let mut op = operand(OperandEffect::Use, LocationCategorySet::S);
        let slot = EirStackSlot::new(StackSlotPurpose::Parameter, 8);
        op.set_required_location(slot.into());
        assert_eq!(op.required_register(), None);
        assert_eq!(op.required_location(), Some(EirLocation::StackSlot(slot)));
    }

    #[test]
    fn test_accepts() {
        let op = operand(OperandEffect::Use, LocationCategorySet::G.union(LocationCategorySet::S));
        assert!(op.accepts(&EirLocation::Register(EirRegister::integer(3))));
        assert!(!op.accepts(&EirLocation::Register(EirRegister::floating_point(3))));
        assert!(!op.accepts(&EirLocation::Literal(0)));
    }
}
