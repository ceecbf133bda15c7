//! Storage locations and location categories.
//!
//! An [`EirLocation`] is where a value ends up after allocation: a
//! register, a stack slot, an immediate encoded into the instruction, or an
//! entry of the method's literal pool. Operands restrict which kinds of
//! location they accept through a [`LocationCategorySet`].

use std::fmt;

use super::kind::Kind;
use super::register::{EirRegister, RegisterCategory};

/// Storage class of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationCategory {
    IntegerRegister = 0,
    FloatingPointRegister = 1,
    Immediate8 = 2,
    Immediate16 = 3,
    Immediate32 = 4,
    Immediate64 = 5,
    Literal = 6,
    StackSlot = 7,
}

impl LocationCategory {
    pub const ALL: [LocationCategory; 8] = [
        LocationCategory::IntegerRegister,
        LocationCategory::FloatingPointRegister,
        LocationCategory::Immediate8,
        LocationCategory::Immediate16,
        LocationCategory::Immediate32,
        LocationCategory::Immediate64,
        LocationCategory::Literal,
        LocationCategory::StackSlot,
    ];

    pub fn for_register(category: RegisterCategory) -> Self {
        match category {
            RegisterCategory::Integer => LocationCategory::IntegerRegister,
            RegisterCategory::FloatingPoint => LocationCategory::FloatingPointRegister,
        }
    }

    pub fn is_register(self) -> bool {
        matches!(
            self,
            LocationCategory::IntegerRegister | LocationCategory::FloatingPointRegister
        )
    }

    pub fn is_immediate(self) -> bool {
        matches!(
            self,
            LocationCategory::Immediate8
                | LocationCategory::Immediate16
                | LocationCategory::Immediate32
                | LocationCategory::Immediate64
        )
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Set of location categories an operand accepts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LocationCategorySet {
    bits: u16,
}

impl LocationCategorySet {
    pub const EMPTY: LocationCategorySet = LocationCategorySet { bits: 0 };
    /// General purpose register.
    pub const G: LocationCategorySet = LocationCategorySet { bits: 1 << 0 };
    /// Floating point register.
    pub const F: LocationCategorySet = LocationCategorySet { bits: 1 << 1 };
    pub const I8: LocationCategorySet = LocationCategorySet { bits: 1 << 2 };
    pub const I16: LocationCategorySet = LocationCategorySet { bits: 1 << 3 };
    pub const I32: LocationCategorySet = LocationCategorySet { bits: 1 << 4 };
    pub const I64: LocationCategorySet = LocationCategorySet { bits: 1 << 5 };
    /// Literal pool entry.
    pub const L: LocationCategorySet = LocationCategorySet { bits: 1 << 6 };
    /// Stack slot.
    pub const S: LocationCategorySet = LocationCategorySet { bits: 1 << 7 };

    pub const fn union(self, other: LocationCategorySet) -> LocationCategorySet {
        LocationCategorySet {
            bits: self.bits | other.bits,
        }
    }

    pub const fn intersection(self, other: LocationCategorySet) -> LocationCategorySet {
        LocationCategorySet {
            bits: self.bits & other.bits,
        }
    }

    pub fn contains(self, category: LocationCategory) -> bool {
        self.bits & category.bit() != 0
    }

    pub fn insert(&mut self, category: LocationCategory) {
        self.bits |= category.bit();
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Register or stack slot of the kind's bank, the default for variables.
    pub fn for_kind(kind: Kind) -> LocationCategorySet {
        match kind.register_category() {
            Some(RegisterCategory::Integer) => Self::G.union(Self::S),
            Some(RegisterCategory::FloatingPoint) => Self::F.union(Self::S),
            None => Self::EMPTY,
        }
    }

    /// Accepts the kind's register bank only.
    pub fn register_for_kind(kind: Kind) -> LocationCategorySet {
        match kind.register_category() {
            Some(category) => LocationCategory::for_register(category).into(),
            None => Self::EMPTY,
        }
    }

    /// Accepts everything a source operand of a move may read from.
    pub fn any_source(kind: Kind) -> LocationCategorySet {
        let immediates = if kind.is_floating_point() {
            Self::EMPTY
        } else {
            Self::I8.union(Self::I16).union(Self::I32).union(Self::I64)
        };
        Self::for_kind(kind).union(immediates).union(Self::L)
    }

    pub fn iter(self) -> impl Iterator<Item = LocationCategory> {
        LocationCategory::ALL
            .into_iter()
            .filter(move |category| self.contains(*category))
    }
}

impl From<LocationCategory> for LocationCategorySet {
    fn from(category: LocationCategory) -> Self {
        LocationCategorySet {
            bits: category.bit(),
        }
    }
}

impl fmt::Debug for LocationCategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// A constant payload, stored as raw bits next to its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantValue {
    pub kind: Kind,
    pub bits: i64,
}

impl ConstantValue {
    pub fn new(kind: Kind, bits: i64) -> Self {
        Self { kind, bits }
    }

    pub fn int(value: i32) -> Self {
        Self::new(Kind::Int, value as i64)
    }

    pub fn long(value: i64) -> Self {
        Self::new(Kind::Long, value)
    }

    pub fn double(value: f64) -> Self {
        Self::new(Kind::Double, value.to_bits() as i64)
    }

    pub fn null() -> Self {
        Self::new(Kind::Reference, 0)
    }

    /// Smallest immediate category able to encode this constant, if any.
    ///
    /// Floating point constants and non-null references never encode as
    /// immediates; they have to go through the literal pool.
    pub fn immediate_category(&self) -> Option<LocationCategory> {
        if self.kind.is_floating_point() || (self.kind.is_reference() && self.bits != 0) {
            return None;
        }
        let bits = self.bits;
        Some(if i8::try_from(bits).is_ok() {
            LocationCategory::Immediate8
        } else if i16::try_from(bits).is_ok() {
            LocationCategory::Immediate16
        } else if i32::try_from(bits).is_ok() {
            LocationCategory::Immediate32
        } else {
            LocationCategory::Immediate64
        })
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::Float => write!(f, "#{}:float", f32::from_bits(self.bits as u32)),
            Kind::Double => write!(f, "#{}:double", f64::from_bits(self.bits as u64)),
            Kind::Reference if self.bits == 0 => write!(f, "#null"),
            Kind::Int => write!(f, "#{}", self.bits),
            kind => write!(f, "#{}:{}", self.bits, kind),
        }
    }
}

/// Why a stack slot exists, which also decides whose frame it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackSlotPurpose {
    /// Incoming parameter, in the caller's frame above the return address.
    Parameter,
    /// Spill slot or outgoing argument area in the current frame.
    Local,
    /// Stack-allocated block of memory.
    Block,
}

/// A stack slot, addressed by byte offset within its area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EirStackSlot {
    pub purpose: StackSlotPurpose,
    pub offset: u32,
}

impl EirStackSlot {
    pub fn new(purpose: StackSlotPurpose, offset: u32) -> Self {
        Self { purpose, offset }
    }
}

impl fmt::Display for EirStackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.purpose {
            StackSlotPurpose::Parameter => write!(f, "param[{}]", self.offset),
            StackSlotPurpose::Local => write!(f, "local[{}]", self.offset),
            StackSlotPurpose::Block => write!(f, "block[{}]", self.offset),
        }
    }
}

/// Where a value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EirLocation {
    Register(EirRegister),
    StackSlot(EirStackSlot),
    Immediate(ConstantValue),
    /// Index into the method's literal pool.
    Literal(u32),
}

impl EirLocation {
    pub fn category(&self) -> LocationCategory {
        match self {
            EirLocation::Register(register) => LocationCategory::for_register(register.category),
            EirLocation::StackSlot(_) => LocationCategory::StackSlot,
            EirLocation::Immediate(constant) => constant
                .immediate_category()
                .unwrap_or(LocationCategory::Immediate64),
            EirLocation::Literal(_) => LocationCategory::Literal,
        }
    }

    pub fn as_register(&self) -> Option<EirRegister> {
        match self {
            EirLocation::Register(register) => Some(*register),
            _ => None,
        }
    }

    pub fn is_register(&self) -> bool {
        matches!(self, EirLocation::Register(_))
    }
}

impl From<EirRegister> for EirLocation {
    fn from(register: EirRegister) -> Self {
        EirLocation::Register(register)
    }
}

impl From<EirStackSlot> for EirLocation {
    fn from(slot: EirStackSlot) -> Self {
        EirLocation::StackSlot(slot)
    }
}

impl fmt::Display for EirLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EirLocation::Register(register) => write!(f, "{register}"),
            EirLocation::StackSlot(slot) => write!(f, "{slot}"),
            EirLocation::Immediate(constant) => write!(f, "{constant}"),
            EirLocation::Literal(index) => write!(f, "literal[{index}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_categories() {
        assert_eq!(ConstantValue::int(7).immediate_category(), Some(LocationCategory::Immediate8));
        assert_eq!(ConstantValue::int(300).immediate_category(), Some(LocationCategory::Immediate16));
        assert_eq!(ConstantValue::int(70000).immediate_category(), Some(LocationCategory::Immediate32));
        assert_eq!(
            ConstantValue::long(1 << 40).immediate_category(),
            Some(LocationCategory::Immediate64)
        );
        assert_eq!(ConstantValue::double(1.5).immediate_category(), None);
        assert_eq!(ConstantValue::null().immediate_category(), Some(LocationCategory::Immediate8));
        assert_eq!(ConstantValue::new(Kind::Reference, 0x1000).immediate_category(), None);
    }

    #[test]
    fn test_location_category_of_location() {
        let slot = EirStackSlot::new(StackSlotPurpose::Local, 16);
        assert_eq!(EirLocation::from(slot).category(), LocationCategory::StackSlot);
        assert_eq!(
            EirLocation::from(EirRegister::floating_point(3)).category(),
            LocationCategory::FloatingPointRegister
        );
        assert_eq!(EirLocation::Literal(0).category(), LocationCategory::Literal);
    }

    #[test]
    fn test_category_sets() {
        let set = LocationCategorySet::for_kind(Kind::Reference);
        assert!(set.contains(LocationCategory::IntegerRegister));
        assert!(set.contains(LocationCategory::StackSlot));
        assert!(!set.contains(LocationCategory::FloatingPointRegister));
        assert!(LocationCategorySet::for_kind(Kind::Void).is_empty());

        let source = LocationCategorySet::any_source(Kind::Double);
        assert!(source.contains(LocationCategory::Literal));
        assert!(!source.contains(LocationCategory::Immediate8));
    }
}
