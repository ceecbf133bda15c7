//! Value kinds.
//!
//! Every EIR value carries a [`Kind`] tag. The kind decides which register
//! bank can hold the value, how many bytes it occupies and whether the
//! garbage collector must treat it as a root.

use std::fmt;

use super::register::RegisterCategory;

/// Primitive, word or reference type tag of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Void,
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Float,
    Long,
    Double,
    Word,
    Reference,
}

impl Kind {
    pub const ALL: [Kind; 11] = [
        Kind::Void,
        Kind::Boolean,
        Kind::Byte,
        Kind::Short,
        Kind::Char,
        Kind::Int,
        Kind::Float,
        Kind::Long,
        Kind::Double,
        Kind::Word,
        Kind::Reference,
    ];

    /// Size of a value of this kind in bytes (words and references are 64-bit).
    pub fn width(self) -> u32 {
        match self {
            Kind::Void => 0,
            Kind::Boolean | Kind::Byte => 1,
            Kind::Short | Kind::Char => 2,
            Kind::Int | Kind::Float => 4,
            Kind::Long | Kind::Double | Kind::Word | Kind::Reference => 8,
        }
    }

    pub fn is_floating_point(self) -> bool {
        matches!(self, Kind::Float | Kind::Double)
    }

    pub fn is_reference(self) -> bool {
        self == Kind::Reference
    }

    /// Register bank that values of this kind live in, `None` for void.
    pub fn register_category(self) -> Option<RegisterCategory> {
        match self {
            Kind::Void => None,
            Kind::Float | Kind::Double => Some(RegisterCategory::FloatingPoint),
            _ => Some(RegisterCategory::Integer),
        }
    }

    /// Short name used by the text format.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Void => "void",
            Kind::Boolean => "boolean",
            Kind::Byte => "byte",
            Kind::Short => "short",
            Kind::Char => "char",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Long => "long",
            Kind::Double => "double",
            Kind::Word => "word",
            Kind::Reference => "ref",
        }
    }

    pub fn from_name(name: &str) -> Option<Kind> {
        Kind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == name)
            .or(match name {
                "reference" => Some(Kind::Reference),
                _ => None,
            })
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
