//! Register identity and register bitsets.
//!
//! Registers are identified by their bank ([`RegisterCategory`]) and an
//! ordinal inside that bank. [`RegisterSet`] tracks sets of registers with
//! one `u64` mask per bank, which is enough for every target we describe
//! and makes the ABI partition checks single word operations.

use std::fmt;

/// Number of register banks.
pub const REGISTER_BANKS: usize = 2;

/// Maximum number of registers per bank.
pub const MAX_REGISTERS_PER_BANK: u8 = 64;

/// Register bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterCategory {
    Integer = 0,
    FloatingPoint = 1,
}

impl RegisterCategory {
    pub const ALL: [RegisterCategory; REGISTER_BANKS] =
        [RegisterCategory::Integer, RegisterCategory::FloatingPoint];

    fn bank(self) -> usize {
        self as usize
    }
}

/// A machine register of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EirRegister {
    pub category: RegisterCategory,
    pub ordinal: u8,
}

impl EirRegister {
    pub const fn integer(ordinal: u8) -> Self {
        Self {
            category: RegisterCategory::Integer,
            ordinal,
        }
    }

    pub const fn floating_point(ordinal: u8) -> Self {
        Self {
            category: RegisterCategory::FloatingPoint,
            ordinal,
        }
    }
}

impl fmt::Display for EirRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            RegisterCategory::Integer => write!(f, "r{}", self.ordinal),
            RegisterCategory::FloatingPoint => write!(f, "f{}", self.ordinal),
        }
    }
}

/// Bit set for efficiently tracking register sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegisterSet {
    banks: [u64; REGISTER_BANKS],
}

impl RegisterSet {
    /// Create empty register set.
    pub const fn new() -> Self {
        Self {
            banks: [0; REGISTER_BANKS],
        }
    }

    /// Create register set with the first `count` registers of a bank.
    pub fn all_in_bank(category: RegisterCategory, count: u8) -> Self {
        let mut set = Self::new();
        set.banks[category.bank()] = match count {
            0 => 0,
            c if c >= MAX_REGISTERS_PER_BANK => u64::MAX,
            c => (1u64 << c) - 1,
        };
        set
    }

    pub fn from_registers<I: IntoIterator<Item = EirRegister>>(registers: I) -> Self {
        let mut set = Self::new();
        for register in registers {
            set.insert(register);
        }
        set
    }

    pub fn contains(&self, register: EirRegister) -> bool {
        register.ordinal < MAX_REGISTERS_PER_BANK
            && self.banks[register.category.bank()] & (1u64 << register.ordinal) != 0
    }

    pub fn insert(&mut self, register: EirRegister) {
        if register.ordinal < MAX_REGISTERS_PER_BANK {
            self.banks[register.category.bank()] |= 1u64 << register.ordinal;
        }
    }

    pub fn remove(&mut self, register: EirRegister) {
        if register.ordinal < MAX_REGISTERS_PER_BANK {
            self.banks[register.category.bank()] &= !(1u64 << register.ordinal);
        }
    }

    pub fn union(&self, other: &RegisterSet) -> RegisterSet {
        let mut result = *self;
        for i in 0..REGISTER_BANKS {
            result.banks[i] |= other.banks[i];
        }
        result
    }

    pub fn intersection(&self, other: &RegisterSet) -> RegisterSet {
        let mut result = *self;
        for i in 0..REGISTER_BANKS {
            result.banks[i] &= other.banks[i];
        }
        result
    }

    pub fn difference(&self, other: &RegisterSet) -> RegisterSet {
        let mut result = *self;
        for i in 0..REGISTER_BANKS {
            result.banks[i] &= !other.banks[i];
        }
        result
    }

    pub fn is_disjoint(&self, other: &RegisterSet) -> bool {
        self.intersection(other).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.iter().all(|&bank| bank == 0)
    }

    pub fn len(&self) -> usize {
        self.banks.iter().map(|bank| bank.count_ones() as usize).sum()
    }

    /// Restrict to one bank.
    pub fn in_bank(&self, category: RegisterCategory) -> RegisterSet {
        let mut result = RegisterSet::new();
        result.banks[category.bank()] = self.banks[category.bank()];
        result
    }

    /// Lowest-numbered register of the bank in this set.
    pub fn first_in_bank(&self, category: RegisterCategory) -> Option<EirRegister> {
        let mask = self.banks[category.bank()];
        (mask != 0).then(|| EirRegister {
            category,
            ordinal: mask.trailing_zeros() as u8,
        })
    }

    /// Registers in bank order, then ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = EirRegister> + '_ {
        RegisterCategory::ALL.into_iter().flat_map(move |category| {
            let mask = self.banks[category.bank()];
            (0..MAX_REGISTERS_PER_BANK)
                .filter(move |ordinal| mask & (1u64 << ordinal) != 0)
                .map(move |ordinal| EirRegister { category, ordinal })
        })
    }
}

impl FromIterator<EirRegister> for RegisterSet {
    fn from_iter<I: IntoIterator<Item = EirRegister>>(iter: I) -> Self {
        Self::from_registers(iter)
    }
}
