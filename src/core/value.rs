//! Values: abstract storage-independent quantities.
//!
//! A value is produced and consumed by instructions through operands. It is
//! either a free variable waiting for a location, a constant, or a value
//! preallocated to a fixed location. The location of a free variable is
//! assigned once by the allocator and never changes afterwards.

use std::fmt;

use super::kind::Kind;
use super::live_range::{BitSetLiveRange, LiveRange};
use super::location::{ConstantValue, EirLocation};
use super::operand::OperandId;

/// Handle of a value inside its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);

impl ValueId {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%v{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRole {
    /// Free to be placed by the allocator.
    Variable,
    Constant(ConstantValue),
    /// Pinned to a location from the start.
    Preallocated,
}

#[derive(Debug)]
pub struct EirValue {
    id: ValueId,
    kind: Kind,
    role: ValueRole,
    name: Option<String>,
    location: Option<EirLocation>,
    location_fixed: bool,
    operands: Vec<OperandId>,
    live_range: Box<dyn LiveRange>,
}

impl EirValue {
    pub(crate) fn variable(id: ValueId, kind: Kind, name: Option<String>) -> Self {
        Self {
            id,
            kind,
            role: ValueRole::Variable,
            name,
            location: None,
            location_fixed: false,
            operands: Vec::new(),
            live_range: Box::new(BitSetLiveRange::new()),
        }
    }

    pub(crate) fn new_constant(id: ValueId, constant: ConstantValue) -> Self {
        Self {
            role: ValueRole::Constant(constant),
            ..Self::variable(id, constant.kind, None)
        }
    }

    pub(crate) fn preallocated(id: ValueId, kind: Kind, location: EirLocation) -> Self {
        Self {
            role: ValueRole::Preallocated,
            location: Some(location),
            location_fixed: true,
            ..Self::variable(id, kind, None)
        }
    }

    pub fn id(&self) -> ValueId {
        self.id
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn role(&self) -> ValueRole {
        self.role
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.role, ValueRole::Constant(_))
    }

    pub fn constant(&self) -> Option<ConstantValue> {
        match self.role {
            ValueRole::Constant(constant) => Some(constant),
            _ => None,
        }
    }

    pub fn location(&self) -> Option<EirLocation> {
        self.location
    }

    pub fn is_location_fixed(&self) -> bool {
        self.location_fixed
    }

    /// Operands currently bound to this value, in binding order.
    pub fn operands(&self) -> &[OperandId] {
        &self.operands
    }

    pub fn live_range(&self) -> &dyn LiveRange {
        self.live_range.as_ref()
    }

    pub(crate) fn live_range_mut(&mut self) -> &mut dyn LiveRange {
        self.live_range.as_mut()
    }

    /// Swap in a different live range representation.
    pub fn set_live_range(&mut self, live_range: Box<dyn LiveRange>) {
        self.live_range = live_range;
    }

    pub(crate) fn fix_location(&mut self, location: EirLocation) {
        self.location = Some(location);
        self.location_fixed = true;
    }

    pub(crate) fn add_operand(&mut self, operand: OperandId) {
        if !self.operands.contains(&operand) {
            self.operands.push(operand);
        }
    }

    pub(crate) fn remove_operand(&mut self, operand: OperandId) {
        self.operands.retain(|&o| o != operand);
    }

    /// Drop operand back-references and liveness bookkeeping.
    pub(crate) fn cleanup(&mut self) {
        self.operands.clear();
        self.live_range.clear();
    }
}

impl fmt::Display for EirValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let ValueRole::Constant(constant) = self.role {
            return write!(f, "{constant}");
        }
        match &self.name {
            Some(name) => write!(f, "%{name}")?,
            None => write!(f, "{}", self.id)?,
        }
        if let Some(location) = self.location {
            write!(f, "@{location}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::register::EirRegister;

    #[test]
    fn test_value_roles() {
        let variable = EirValue::variable(ValueId::new(0), Kind::Int, Some("x".to_string()));
        assert!(!variable.is_constant());
        assert!(!variable.is_location_fixed());
        assert_eq!(variable.location(), None);
        assert_eq!(variable.to_string(), "%x");

        let constant = EirValue::new_constant(ValueId::new(1), ConstantValue::int(42));
        assert!(constant.is_constant());
        assert_eq!(constant.kind(), Kind::Int);
        assert_eq!(constant.to_string(), "#42");

        let rax = EirLocation::Register(EirRegister::integer(0));
        let fixed = EirValue::preallocated(ValueId::new(2), Kind::Reference, rax);
        assert!(fixed.is_location_fixed());
        assert_eq!(fixed.location(), Some(rax));
        assert_eq!(fixed.to_string(), "%v2@r0");
    }

    #[test]
    fn test_operand_set_is_ordered_and_unique() {
        let mut value = EirValue::variable(ValueId::new(0), Kind::Long, None);
        value.add_operand(OperandId::new(3));
        value.add_operand(OperandId::new(1));
        value.add_operand(OperandId::new(3));
        assert_eq!(value.operands(), &[OperandId::new(3), OperandId::new(1)]);

        value.remove_operand(OperandId::new(3));
        assert_eq!(value.operands(), &[OperandId::new(1)]);

        value.cleanup();
        assert!(value.operands().is_empty());
        assert!(value.live_range().is_empty());
    }
}
