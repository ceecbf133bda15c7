// This module implements per-value liveness over the control flow graph of an EIR method.
// LiveRange is the abstract interface the allocator talks to; BitSetLiveRange is the
// concrete representation: for every block the value touches it keeps a bitset over
// instruction indices, where bit i means the value is live at instruction i and the
// extra bit at index == block length means the value is live out of the block into its
// successors. Definitions set a single bit. Uses extend coverage backwards to the
// nearest covered index, and when a use is not reached by anything inside its block the
// coverage is propagated to predecessors with a worklist, stopping at blocks whose
// live-out bit is already set. This gives a lazy backward data-flow fixpoint that only
// does work for values that actually cross block boundaries. All definitions of a value
// must be recorded before its uses, because the backward scan relies on them.

//! Live range tracking with per-block bitsets.

use std::fmt;

use super::block::BlockId;
use super::error::{EirError, EirResult};

/// A program point: instruction `index` of `block`.
///
/// `index == block length` denotes the end of the block, i.e. the edge into
/// its successors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EirPosition {
    pub block: BlockId,
    pub index: usize,
}

impl EirPosition {
    pub fn new(block: BlockId, index: usize) -> Self {
        Self { block, index }
    }
}

impl fmt::Display for EirPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.index)
    }
}

/// The view of the block graph live range computation needs.
pub trait ControlFlow {
    /// Number of instructions in the block.
    fn block_length(&self, block: BlockId) -> usize;

    fn predecessors(&self, block: BlockId) -> &[BlockId];
}

/// Liveness of one value across the control flow graph.
pub trait LiveRange: fmt::Debug + Send {
    /// The value becomes live at `position`.
    fn record_definition(&mut self, position: EirPosition);

    /// The value is read at `position`; extends coverage backwards.
    fn record_use(&mut self, cfg: &dyn ControlFlow, position: EirPosition);

    /// Union `other` into this range.
    fn add(&mut self, other: &dyn LiveRange) -> EirResult<()>;

    fn contains(&self, position: EirPosition) -> bool;

    /// Whether the two ranges share at least one position.
    fn intersects(&self, other: &dyn LiveRange) -> EirResult<bool>;

    /// Visit every covered position, including end-of-block positions.
    fn for_all_live_positions(&self, visitor: &mut dyn FnMut(EirPosition));

    fn clear(&mut self);

    fn is_empty(&self) -> bool;

    fn as_bit_set(&self) -> Option<&BitSetLiveRange> {
        None
    }
}

/// Coverage bitset of a single block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BlockCoverage {
    words: Vec<u64>,
}

impl BlockCoverage {
    fn get(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .is_some_and(|word| word & (1u64 << (index % 64)) != 0)
    }

    fn set(&mut self, index: usize) {
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (index % 64);
    }

    /// Set every bit in `from..=to`.
    fn set_range(&mut self, from: usize, to: usize) {
        for index in from..=to {
            self.set(index);
        }
    }

    /// Nearest set bit strictly below `index`.
    fn last_set_before(&self, index: usize) -> Option<usize> {
        (0..index).rev().find(|&i| self.get(i))
    }

    fn union_with(&mut self, other: &BlockCoverage) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (word, other_word) in self.words.iter_mut().zip(&other.words) {
            *word |= other_word;
        }
    }

    fn intersects(&self, other: &BlockCoverage) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(word, other_word)| word & other_word != 0)
    }

    fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| w * 64 + bit)
        })
    }
}

/// Live range represented as one coverage bitset per block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitSetLiveRange {
    coverage: Vec<BlockCoverage>,
}

impl BitSetLiveRange {
    pub fn new() -> Self {
        Self::default()
    }

    fn coverage(&self, block: BlockId) -> Option<&BlockCoverage> {
        self.coverage.get(block.index())
    }

    fn coverage_mut(&mut self, block: BlockId) -> &mut BlockCoverage {
        let index = block.index();
        if index >= self.coverage.len() {
            self.coverage.resize_with(index + 1, BlockCoverage::default);
        }
        &mut self.coverage[index]
    }

    /// Whether the value flows out of `block` into its successors.
    pub fn is_coverage_extending_beyond_block(&self, cfg: &dyn ControlFlow, block: BlockId) -> bool {
        self.contains(EirPosition::new(block, cfg.block_length(block)))
    }

    /// Blocks with at least one covered position, in block order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.coverage
            .iter()
            .enumerate()
            .filter(|(_, coverage)| !coverage.is_empty())
            .map(|(index, _)| BlockId::new(index))
    }

    /// Make the value live into `block` from every predecessor, transitively.
    fn propagate_to_predecessors(&mut self, cfg: &dyn ControlFlow, block: BlockId) {
        let mut worklist: Vec<BlockId> = cfg.predecessors(block).to_vec();
        while let Some(predecessor) = worklist.pop() {
            let end = cfg.block_length(predecessor);
            let coverage = self.coverage_mut(predecessor);
            if coverage.get(end) {
                continue;
            }
            coverage.set(end);
            match coverage.last_set_before(end) {
                Some(covered) => coverage.set_range(covered, end),
                None => {
                    coverage.set_range(0, end);
                    worklist.extend_from_slice(cfg.predecessors(predecessor));
                }
            }
        }
    }
}

impl LiveRange for BitSetLiveRange {
    fn record_definition(&mut self, position: EirPosition) {
        self.coverage_mut(position.block).set(position.index);
    }

    fn record_use(&mut self, cfg: &dyn ControlFlow, position: EirPosition) {
        let EirPosition { block, index } = position;
        let coverage = self.coverage_mut(block);
        let already_reached = index > 0 && coverage.get(index - 1);
        coverage.set(index);
        if index == 0 {
            self.propagate_to_predecessors(cfg, block);
            return;
        }
        if already_reached {
            return;
        }
        match coverage.last_set_before(index) {
            Some(covered) => coverage.set_range(covered, index),
            None => {
                coverage.set_range(0, index);
                self.propagate_to_predecessors(cfg, block);
            }
        }
    }

    fn add(&mut self, other: &dyn LiveRange) -> EirResult<()> {
        let other = other
            .as_bit_set()
            .ok_or_else(|| EirError::unimplemented("union of live ranges with different representations"))?;
        for (index, coverage) in other.coverage.iter().enumerate() {
            if !coverage.is_empty() {
                self.coverage_mut(BlockId::new(index)).union_with(coverage);
            }
        }
        Ok(())
    }

    fn contains(&self, position: EirPosition) -> bool {
        self.coverage(position.block)
            .is_some_and(|coverage| coverage.get(position.index))
    }

    fn intersects(&self, other: &dyn LiveRange) -> EirResult<bool> {
        let other = other
            .as_bit_set()
            .ok_or_else(|| EirError::unimplemented("interference between different live range representations"))?;
        Ok(self
            .coverage
            .iter()
            .zip(&other.coverage)
            .any(|(mine, theirs)| mine.intersects(theirs)))
    }

    fn for_all_live_positions(&self, visitor: &mut dyn FnMut(EirPosition)) {
        for (block, coverage) in self.coverage.iter().enumerate() {
            for index in coverage.iter() {
                visitor(EirPosition::new(BlockId::new(block), index));
            }
        }
    }

    fn clear(&mut self) {
        self.coverage.clear();
    }

    fn is_empty(&self) -> bool {
        self.coverage.iter().all(BlockCoverage::is_empty)
    }

    fn as_bit_set(&self) -> Option<&BitSetLiveRange> {
        Some(self)
    }
}

impl fmt::Display for BitSetLiveRange {
    /// Renders covered runs per block, e.g. `b0[2..4] b1[0]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (block, coverage) in self.coverage.iter().enumerate() {
            if coverage.is_empty() {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{}[", BlockId::new(block))?;
            let mut runs: Vec<(usize, usize)> = Vec::new();
            for index in coverage.iter() {
                match runs.last_mut() {
                    Some((_, end)) if *end + 1 == index => *end = index,
                    _ => runs.push((index, index)),
                }
            }
            for (i, (start, end)) in runs.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                if start == end {
                    write!(f, "{start}")?;
                } else {
                    write!(f, "{start}..{end}")?;
                }
            }
            f.write_str("]")?;
        }
        if first {
            f.write_str("<empty>")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-built block graph: lengths plus predecessor lists.
    struct Graph {
        lengths: Vec<usize>,
        predecessors: Vec<Vec<BlockId>>,
    }

    impl Graph {
        fn new(lengths: &[usize], edges: &[(usize, usize)]) -> Self {
            let mut predecessors = vec![Vec::new(); lengths.len()];
            for &(from, to) in edges {
                predecessors[to].push(BlockId::new(from));
            }
            Self {
                lengths: lengths.to_vec(),
                predecessors,
            }
        }
    }

    impl ControlFlow for Graph {
        fn block_length(&self, block: BlockId) -> usize {
            self.lengths[block.index()]
        }

        fn predecessors(&self, block: BlockId) -> &[BlockId] {
            &self.predecessors[block.index()]
        }
    }

    fn pos(block: usize, index: usize) -> EirPosition {
        EirPosition::new(BlockId::new(block), index)
    }

    #[derive(Debug)]
    struct OtherRepresentation;

    impl LiveRange for OtherRepresentation {
        fn record_definition(&mut self, _position: EirPosition) {}
        fn record_use(&mut self, _cfg: &dyn ControlFlow, _position: EirPosition) {}
        fn add(&mut self, _other: &dyn LiveRange) -> EirResult<()> {
            Ok(())
        }
        fn contains(&self, _position: EirPosition) -> bool {
            false
        }
        fn intersects(&self, _other: &dyn LiveRange) -> EirResult<bool> {
            Ok(false)
        }
        fn for_all_live_positions(&self, _visitor: &mut dyn FnMut(EirPosition)) {}
        fn clear(&mut self) {}
        fn is_empty(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_use_within_block_extends_to_definition() {
        let graph = Graph::new(&[6], &[]);
        let mut range = BitSetLiveRange::new();
        range.record_definition(pos(0, 1));
        range.record_use(&graph, pos(0, 4));

        assert!(!range.contains(pos(0, 0)));
        for index in 1..=4 {
            assert!(range.contains(pos(0, index)));
        }
        assert!(!range.contains(pos(0, 5)));
        assert!(!range.is_coverage_extending_beyond_block(&graph, BlockId::new(0)));
    }

    #[test]
    fn test_use_in_successor_covers_block_end() {
        // b0 (4 insts) -> b1; defined at b0:2, used at b1:0
        let graph = Graph::new(&[4, 3], &[(0, 1)]);
        let mut range = BitSetLiveRange::new();
        range.record_definition(pos(0, 2));
        range.record_use(&graph, pos(1, 0));

        assert!(!range.contains(pos(0, 1)));
        assert!(range.contains(pos(0, 2)));
        assert!(range.contains(pos(0, 3)));
        assert!(range.contains(pos(0, 4)));
        assert!(range.contains(pos(1, 0)));
        assert!(!range.contains(pos(1, 1)));
        assert!(range.is_coverage_extending_beyond_block(&graph, BlockId::new(0)));
        assert_eq!(range.to_string(), "b0[2..4] b1[0]");
    }

    #[test]
    fn test_propagation_through_diamond() {
        // b0 -> b1, b0 -> b2, b1 -> b3, b2 -> b3; defined at b0:0, used at b3:1
        let graph = Graph::new(&[2, 2, 2, 2], &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let mut range = BitSetLiveRange::new();
        range.record_definition(pos(0, 0));
        range.record_use(&graph, pos(3, 1));

        for block in 1..=2 {
            for index in 0..=2 {
                assert!(range.contains(pos(block, index)), "b{block}:{index}");
            }
        }
        assert!(range.contains(pos(0, 2)));
        assert!(range.contains(pos(3, 0)));
        assert!(!range.contains(pos(3, 2)));
    }

    #[test]
    fn test_loop_carried_value() {
        // b0 -> b1, b1 -> b1, b1 -> b2; b1 uses at 0 and redefines at 2
        let graph = Graph::new(&[1, 4, 1], &[(0, 1), (1, 1), (1, 2)]);
        let mut range = BitSetLiveRange::new();
        range.record_definition(pos(0, 0));
        range.record_definition(pos(1, 2));
        range.record_use(&graph, pos(1, 0));

        assert!(range.contains(pos(0, 1)));
        assert!(range.contains(pos(1, 0)));
        assert!(!range.contains(pos(1, 1)));
        assert!(range.contains(pos(1, 2)));
        assert!(range.contains(pos(1, 4)));
        assert!(range.blocks().all(|block| block.index() < 2));
    }

    #[test]
    fn test_repeated_use_is_idempotent() {
        let graph = Graph::new(&[3, 3], &[(0, 1)]);
        let mut once = BitSetLiveRange::new();
        once.record_definition(pos(0, 0));
        once.record_use(&graph, pos(1, 2));

        let mut twice = once.clone();
        twice.record_use(&graph, pos(1, 2));
        twice.record_use(&graph, pos(1, 1));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_union_of_ranges() {
        let graph = Graph::new(&[8], &[]);
        let mut first = BitSetLiveRange::new();
        first.record_definition(pos(0, 0));
        first.record_use(&graph, pos(0, 2));
        let mut second = BitSetLiveRange::new();
        second.record_definition(pos(0, 5));
        second.record_use(&graph, pos(0, 7));

        let original = first.clone();
        first.add(&second).unwrap();
        for index in 0..8 {
            let p = pos(0, index);
            assert_eq!(first.contains(p), original.contains(p) || second.contains(p));
        }
        assert!(!original.intersects(&second).unwrap());
        assert!(first.intersects(&second).unwrap());
    }

    #[test]
    fn test_union_with_other_representation_is_unimplemented() {
        let mut range = BitSetLiveRange::new();
        let err = range.add(&OtherRepresentation).unwrap_err();
        assert!(matches!(err, EirError::Unimplemented { .. }));
    }

    #[test]
    fn test_large_block_coverage() {
        let graph = Graph::new(&[130], &[]);
        let mut range = BitSetLiveRange::new();
        range.record_definition(pos(0, 3));
        range.record_use(&graph, pos(0, 129));
        assert!(range.contains(pos(0, 64)));
        assert!(range.contains(pos(0, 128)));
        assert!(!range.contains(pos(0, 130)));

        let mut count = 0;
        range.for_all_live_positions(&mut |_| count += 1);
        assert_eq!(count, 127);
    }
}
