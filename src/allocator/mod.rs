// This module implements the reference register allocator that drives the EIR core end
// to end. It computes live ranges, then places values in three passes. Pinned values
// come first: preallocated values keep their location and values with a required
// operand location are fixed there, with conflicting requirements reported as
// allocation failures. Free variables follow in descending weight order: candidates are
// the allocatable registers of the value's bank, restricted to callee-saved registers
// when the value is live across a call, with preferred registers and move partners
// tried first. Interference is checked pairwise against the values already in a
// register; a value defined by an instruction may share a register with an operand that
// dies at the same instruction, which is what lets coalesced moves become redundant.
// Values that find no register are spilled to stack slots that are reused when the
// occupants do not interfere. Constants become immediates or literal pool entries.
// Finally redundant moves are overwritten with fillers, the frame is laid out and the
// result is installed with set_generated. Observers hear about every phase.

//! Greedy reference register allocator.

pub mod frame;

use hashbrown::HashMap;

use crate::core::error::{EirError, EirResult};
use crate::core::instruction::{InstructionId, InstructionKind};
use crate::core::literal_pool::LiteralPool;
use crate::core::live_range::{BitSetLiveRange, EirPosition, LiveRange};
use crate::core::location::{EirLocation, EirStackSlot, LocationCategory};
use crate::core::method::{EirMethod, GeneratedCode};
use crate::core::operand::OperandEffect;
use crate::core::register::{EirRegister, RegisterSet};
use crate::core::session::{CompilationContext, CompilationEvent};
use crate::core::value::{ValueId, ValueRole};

use self::frame::FrameLayout;

/// Allocator knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Try the location of a move's other end before other registers.
    pub coalesce_moves: bool,
    /// Overwrite moves between identical locations with fillers.
    pub replace_redundant_moves: bool,
    /// Spill to stack slots when registers run out; fail otherwise.
    pub spill_to_stack: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            coalesce_moves: true,
            replace_redundant_moves: true,
            spill_to_stack: true,
        }
    }
}

/// What one allocation run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationSummary {
    pub registers: usize,
    pub spills: usize,
    pub fillers: usize,
    pub literals: usize,
    pub frame_size: u32,
}

#[derive(Debug, Clone, Default)]
pub struct GreedyAllocator {
    config: AllocatorConfig,
}

impl GreedyAllocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Place every value of `method` and install the generated metadata.
    pub fn allocate(&self, context: &CompilationContext<'_>, method: &mut EirMethod) -> EirResult<AllocationSummary> {
        context.notify(CompilationEvent::BeforeAllocation, method);
        method.compute_live_ranges();

        let abi = method.shared_abi();
        let mut state = AllocationState {
            method: &*method,
            occupants: HashMap::new(),
            definitions: HashMap::new(),
            calls: method
                .instructions()
                .iter()
                .filter(|inst| inst.is_call())
                .map(|inst| inst.id())
                .collect(),
        };
        let mut frame = FrameLayout::new(context.arena(), &abi, method.outgoing_stack_size());
        let mut summary = AllocationSummary::default();
        let mut decisions: Vec<(ValueId, EirLocation)> = Vec::new();

        // Pinned values.
        for value in method.values() {
            if value.is_constant() || (value.operands().is_empty() && value.location().is_none()) {
                continue;
            }
            let location = match value.location() {
                Some(fixed) => Some(fixed),
                None => state.required_location(value.id())?,
            };
            let Some(location) = location else { continue };
            if let EirLocation::Register(register) = location {
                if let Some(other) = state.conflict_in(register, value.id())? {
                    return Err(allocation_error(
                        method,
                        format!("{} and {} are both pinned to {}", value, method.value(other), abi.register_name(register)),
                    ));
                }
                if abi.caller_saved_registers().contains(register) && state.crosses_call(value.id()) {
                    return Err(allocation_error(
                        method,
                        format!("{value} is pinned to caller-saved {} across a call", abi.register_name(register)),
                    ));
                }
                if abi.callee_saved_registers().contains(register) {
                    frame.add_saved_register(register);
                }
                state.occupy(register, value.id());
            }
            if value.location().is_none() {
                decisions.push((value.id(), location));
            }
        }

        // Free variables, heaviest first.
        let mut free: Vec<ValueId> = method
            .values()
            .iter()
            .filter(|value| value.role() == ValueRole::Variable && value.location().is_none())
            .filter(|value| !value.operands().is_empty())
            .filter(|value| !decisions.iter().any(|(id, _)| *id == value.id()))
            .map(|value| value.id())
            .collect();
        free.sort_by_key(|&value| (std::cmp::Reverse(method.value_weight(value)), value));

        let mut slots: Vec<(EirStackSlot, Vec<ValueId>)> = Vec::new();
        for value in free {
            let kind = method.value(value).kind();
            let Some(category) = kind.register_category() else {
                return Err(allocation_error(method, format!("{} has no storage for kind {kind}", method.value(value))));
            };
            let mut candidates = abi.allocatable_registers().in_bank(category);
            if state.crosses_call(value) {
                candidates = candidates.intersection(&abi.callee_saved_registers());
            }
            let register = if state.accepts_everywhere(value, LocationCategory::for_register(category)) {
                self.choose_register(&mut state, value, &decisions, candidates)?
            } else {
                None
            };

            let location = match register {
                Some(register) => {
                    log::debug!("{}: {} -> {}", method.name(), method.value(value), abi.register_name(register));
                    if abi.callee_saved_registers().contains(register) {
                        frame.add_saved_register(register);
                    }
                    state.occupy(register, value);
                    summary.registers += 1;
                    EirLocation::Register(register)
                }
                None if self.config.spill_to_stack && state.accepts_everywhere(value, LocationCategory::StackSlot) => {
                    let slot = state.spill_slot(value, &mut slots, &mut frame)?;
                    log::debug!("{}: spilled {} to {}", method.name(), method.value(value), slot);
                    summary.spills += 1;
                    EirLocation::StackSlot(slot)
                }
                None => {
                    return Err(allocation_error(
                        method,
                        format!("no register left for {}", method.value(value)),
                    ))
                }
            };
            decisions.push((value, location));
        }

        // Constants.
        let mut literal_pool = LiteralPool::new();
        for value in method.values() {
            let Some(constant) = value.constant() else { continue };
            if value.operands().is_empty() {
                continue;
            }
            let immediate = constant
                .immediate_category()
                .filter(|&category| state.accepts_everywhere(value.id(), category));
            let location = if immediate.is_some() {
                EirLocation::Immediate(constant)
            } else if state.accepts_everywhere(value.id(), LocationCategory::Literal) {
                literal_pool.intern(constant)
            } else {
                return Err(EirError::unimplemented(format!(
                    "constant {constant} in {} needs a register",
                    method.name()
                )));
            };
            decisions.push((value.id(), location));
        }

        let stack_blocks: Vec<(InstructionId, EirStackSlot)> = method
            .instructions()
            .iter()
            .filter_map(|inst| match *inst.kind() {
                InstructionKind::StackAllocate { size, align } => {
                    Some((inst.id(), frame.allocate_stack_block(size, align)))
                }
                _ => None,
            })
            .collect();
        drop(state);

        for (value, location) in decisions {
            method.assign_location(value, location)?;
        }

        if self.config.replace_redundant_moves {
            for index in 0..method.instructions().len() {
                let id = InstructionId::new(index);
                if matches!(method.instruction(id).kind(), InstructionKind::Move) && method.is_redundant(id) {
                    log::debug!("{}: {} is redundant", method.name(), method.instruction(id));
                    method.replace_with_filler(id)?;
                    context.record_filler_inserted();
                    summary.fillers += 1;
                }
            }
        }
        context.notify(CompilationEvent::AfterAllocation, method);

        summary.literals = literal_pool.len();
        summary.frame_size = frame.frame_size();
        let generated = GeneratedCode {
            block_order: method.blocks().iter().map(|block| block.id()).collect(),
            literal_pool,
            parameter_locations: method.incoming_parameter_locations().to_vec(),
            result_location: abi.result_location(method.result_kind()),
            frame_size: summary.frame_size,
            stack_blocks_size: frame.stack_blocks_size(),
            stack_blocks,
        };
        method.set_generated(generated)?;
        context.notify(CompilationEvent::AfterGeneration, method);

        for _ in 0..summary.registers {
            context.record_register_assigned();
        }
        for _ in 0..summary.spills {
            context.record_spill();
        }
        context.record_literals(summary.literals);
        context.record_method_compiled(summary.frame_size);
        log::debug!(
            "{}: {} in registers, {} spilled, {} fillers, frame {} bytes",
            method.name(),
            summary.registers,
            summary.spills,
            summary.fillers,
            summary.frame_size
        );
        Ok(summary)
    }

    fn choose_register(
        &self,
        state: &mut AllocationState<'_>,
        value: ValueId,
        decisions: &[(ValueId, EirLocation)],
        candidates: RegisterSet,
    ) -> EirResult<Option<EirRegister>> {
        let mut preferred: Vec<EirRegister> = Vec::new();
        let method = state.method;
        for &operand in method.value(value).operands() {
            let op = method.operand(operand);
            if let Some(register) = op.preferred_register() {
                preferred.push(register);
            }
            if !self.config.coalesce_moves {
                continue;
            }
            let instruction = method.instruction(op.instruction());
            if !matches!(instruction.kind(), InstructionKind::Move) {
                continue;
            }
            for &other in instruction.operands() {
                let partner = method.operand(other).eir_value();
                if other == operand || partner == Some(value) {
                    continue;
                }
                let placed = decisions
                    .iter()
                    .find(|(id, _)| Some(*id) == partner)
                    .and_then(|(_, location)| location.as_register());
                if let Some(register) = placed {
                    preferred.push(register);
                }
            }
        }

        for register in preferred.into_iter().chain(candidates.iter()) {
            if candidates.contains(register) && state.conflict_in(register, value)?.is_none() {
                return Ok(Some(register));
            }
        }
        Ok(None)
    }
}

fn allocation_error(method: &EirMethod, reason: String) -> EirError {
    EirError::RegisterAllocation {
        method: method.name().to_string(),
        reason,
    }
}

/// Scratch state of one allocation run.
struct AllocationState<'m> {
    method: &'m EirMethod,
    /// Values placed in each register so far.
    occupants: HashMap<EirRegister, Vec<ValueId>>,
    /// Positions where each value is defined without being read.
    definitions: HashMap<ValueId, Vec<EirPosition>>,
    calls: Vec<InstructionId>,
}

impl<'m> AllocationState<'m> {
    fn range(&self, value: ValueId) -> EirResult<&'m BitSetLiveRange> {
        let method: &'m EirMethod = self.method;
        method
            .value(value)
            .live_range()
            .as_bit_set()
            .ok_or_else(|| EirError::unimplemented("allocation over non-bitset live ranges"))
    }

    fn definitions(&mut self, value: ValueId) -> &[EirPosition] {
        let method = self.method;
        self.definitions.entry(value).or_insert_with(|| {
            method
                .value(value)
                .operands()
                .iter()
                .map(|&operand| method.operand(operand))
                .filter(|op| op.effect() == OperandEffect::Definition)
                .map(|op| method.instruction(op.instruction()).position())
                .collect()
        })
    }

    /// Whether `a` and `b` need distinct locations.
    ///
    /// A value written at a position does not clash there with a value
    /// whose last read is that same position.
    fn interferes(&mut self, a: ValueId, b: ValueId) -> EirResult<bool> {
        let (range_a, range_b) = (self.range(a)?, self.range(b)?);
        if !range_a.intersects(range_b)? {
            return Ok(false);
        }
        let mut shared = Vec::new();
        range_a.for_all_live_positions(&mut |position| {
            if range_b.contains(position) {
                shared.push(position);
            }
        });
        let after = |p: EirPosition| EirPosition::new(p.block, p.index + 1);
        let defs_a = self.definitions(a).to_vec();
        let defs_b = self.definitions(b).to_vec();
        Ok(shared.into_iter().any(|p| {
            let a_starts = defs_a.contains(&p) && !range_b.contains(after(p));
            let b_starts = defs_b.contains(&p) && !range_a.contains(after(p));
            !(a_starts || b_starts)
        }))
    }

    fn conflict_in(&mut self, register: EirRegister, value: ValueId) -> EirResult<Option<ValueId>> {
        let occupants = self.occupants.get(&register).cloned().unwrap_or_default();
        for other in occupants {
            if self.interferes(value, other)? {
                return Ok(Some(other));
            }
        }
        Ok(None)
    }

    fn occupy(&mut self, register: EirRegister, value: ValueId) {
        self.occupants.entry(register).or_default().push(value);
    }

    fn crosses_call(&self, value: ValueId) -> bool {
        self.calls
            .iter()
            .any(|&call| self.method.is_live_across(value, call))
    }

    /// Whether every operand of `value` accepts `category`.
    fn accepts_everywhere(&self, value: ValueId, category: LocationCategory) -> bool {
        self.method
            .value(value)
            .operands()
            .iter()
            .all(|&operand| self.method.operand(operand).location_categories().contains(category))
    }

    /// The one location the operands of `value` require, if any.
    fn required_location(&self, value: ValueId) -> EirResult<Option<EirLocation>> {
        let mut required: Option<EirLocation> = None;
        for &operand in self.method.value(value).operands() {
            let Some(location) = self.method.operand(operand).required_location() else {
                continue;
            };
            match required {
                Some(existing) if existing != location => {
                    return Err(allocation_error(
                        self.method,
                        format!("{} is required at both {existing} and {location}", self.method.value(value)),
                    ));
                }
                _ => required = Some(location),
            }
        }
        Ok(required)
    }

    /// A stack slot none of whose occupants interfere with `value`.
    fn spill_slot(
        &mut self,
        value: ValueId,
        slots: &mut Vec<(EirStackSlot, Vec<ValueId>)>,
        frame: &mut FrameLayout<'_>,
    ) -> EirResult<EirStackSlot> {
        for (slot, occupants) in slots.iter_mut() {
            let mut free = true;
            for &other in occupants.iter() {
                if self.interferes(value, other)? {
                    free = false;
                    break;
                }
            }
            if free {
                occupants.push(value);
                return Ok(*slot);
            }
        }
        let slot = frame.allocate_spill_slot();
        slots.push((slot, vec![value]));
        Ok(slot)
    }
}
