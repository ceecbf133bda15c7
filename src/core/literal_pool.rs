//! Literal pool of a generated method.
//!
//! Constants that cannot be encoded as immediates are placed here and
//! referenced by index. Equal constants share one entry.

use hashbrown::HashMap;

use super::location::{ConstantValue, EirLocation};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiteralPool {
    literals: Vec<ConstantValue>,
    indices: HashMap<ConstantValue, u32>,
}

impl LiteralPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of `constant` in the pool, adding it if needed.
    pub fn intern(&mut self, constant: ConstantValue) -> EirLocation {
        let next = self.literals.len() as u32;
        let index = *self.indices.entry(constant).or_insert_with(|| {
            log::trace!("literal pool: {constant} -> [{next}]");
            next
        });
        if index == next {
            self.literals.push(constant);
        }
        EirLocation::Literal(index)
    }

    pub fn get(&self, index: u32) -> Option<ConstantValue> {
        self.literals.get(index as usize).copied()
    }

    pub fn literals(&self) -> &[ConstantValue] {
        &self.literals
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// Pool size in bytes with every entry padded to eight bytes.
    pub fn size_in_bytes(&self) -> u32 {
        self.literals.len() as u32 * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_are_deduplicated() {
        let mut pool = LiteralPool::new();
        let pi = pool.intern(ConstantValue::double(3.25));
        let big = pool.intern(ConstantValue::long(1 << 40));
        let again = pool.intern(ConstantValue::double(3.25));

        assert_eq!(pi, EirLocation::Literal(0));
        assert_eq!(big, EirLocation::Literal(1));
        assert_eq!(again, pi);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(1), Some(ConstantValue::long(1 << 40)));
        assert_eq!(pool.size_in_bytes(), 16);
    }
}
