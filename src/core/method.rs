// This module implements EirMethod, the container for one compilation unit. The method
// owns every value, operand, instruction and block of the unit in plain vectors and
// hands out typed index handles, so the operand <-> value back-references become index
// lookups into the same arena and cleanup is a matter of clearing vectors. The builder
// operations lower call, return, prologue and catch constraints by binding operands to
// short-lived temporaries pinned at their ABI locations and connecting them to the real
// values with moves that carry preferred-register hints, so a coalescing allocator can
// delete most of those moves again. Liveness is computed per value (all definitions
// first, then all uses) and afterwards the GC roots of calls and safepoints are derived
// from the ranges. set_generated is the single transition into the generated state;
// the frame/parameter/result metadata it installs can be queried afterwards and
// survives cleanup_after_emitting, which releases the instruction graph.

//! The per-method EIR arena and its builder/liveness operations.

use std::sync::Arc;

use super::block::{BlockId, BlockRole, EirBlock};
use super::error::{EirError, EirResult};
use super::instruction::{ArithmeticOp, EirInstruction, InstructionId, InstructionKind};
use super::kind::Kind;
use super::literal_pool::LiteralPool;
use super::live_range::{ControlFlow, EirPosition};
use super::location::{ConstantValue, EirLocation, EirStackSlot, LocationCategorySet, StackSlotPurpose};
use super::operand::{EirOperand, OperandEffect, OperandId};
use super::register::EirRegister;
use super::value::{EirValue, ValueId, ValueRole};
use crate::abi::EirAbi;

/// Metadata installed by [`EirMethod::set_generated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    /// Blocks in emission order.
    pub block_order: Vec<BlockId>,
    pub literal_pool: LiteralPool,
    pub parameter_locations: Vec<EirLocation>,
    pub result_location: Option<EirLocation>,
    pub frame_size: u32,
    pub stack_blocks_size: u32,
    /// Frame memory reserved by each stack allocation.
    pub stack_blocks: Vec<(InstructionId, EirStackSlot)>,
}

/// Consumer of generated code, e.g. a machine code encoder.
pub trait EirEmitter {
    fn begin_block(&mut self, _method: &EirMethod, _block: &EirBlock) -> EirResult<()> {
        Ok(())
    }

    fn emit_instruction(&mut self, method: &EirMethod, instruction: &EirInstruction) -> EirResult<()>;
}

#[derive(Debug)]
pub struct EirMethod {
    name: String,
    abi: Arc<EirAbi>,
    parameter_kinds: Vec<Kind>,
    result_kind: Kind,
    incoming_locations: Vec<EirLocation>,
    outgoing_stack_size: u32,
    values: Vec<EirValue>,
    operands: Vec<EirOperand>,
    instructions: Vec<EirInstruction>,
    blocks: Vec<EirBlock>,
    generated: Option<GeneratedCode>,
    /// Value operand sets were dropped by `cleanup`.
    cleaned_up: bool,
    retired: bool,
}

impl EirMethod {
    /// Create an empty method whose parameters are placed by `abi`.
    pub fn new(
        name: impl Into<String>,
        abi: Arc<EirAbi>,
        parameter_kinds: &[Kind],
        result_kind: Kind,
    ) -> EirResult<Self> {
        let incoming_locations = abi.get_parameter_locations(StackSlotPurpose::Parameter, parameter_kinds)?;
        Ok(Self {
            name: name.into(),
            abi,
            parameter_kinds: parameter_kinds.to_vec(),
            result_kind,
            incoming_locations,
            outgoing_stack_size: 0,
            values: Vec::new(),
            operands: Vec::new(),
            instructions: Vec::new(),
            blocks: Vec::new(),
            generated: None,
            cleaned_up: false,
            retired: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn abi(&self) -> &EirAbi {
        &self.abi
    }

    pub fn shared_abi(&self) -> Arc<EirAbi> {
        Arc::clone(&self.abi)
    }

    pub fn parameter_kinds(&self) -> &[Kind] {
        &self.parameter_kinds
    }

    pub fn result_kind(&self) -> Kind {
        self.result_kind
    }

    /// Where the ABI delivers each parameter on entry.
    pub fn incoming_parameter_locations(&self) -> &[EirLocation] {
        &self.incoming_locations
    }

    /// Bytes of outgoing stack arguments the largest call of this method needs.
    pub fn outgoing_stack_size(&self) -> u32 {
        self.outgoing_stack_size
    }

    fn invariant(&self, message: impl Into<String>) -> EirError {
        EirError::invariant(self.name.clone(), message)
    }

    // Arena access

    pub fn value(&self, id: ValueId) -> &EirValue {
        &self.values[id.index()]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut EirValue {
        &mut self.values[id.index()]
    }

    pub fn values(&self) -> &[EirValue] {
        &self.values
    }

    pub fn operand(&self, id: OperandId) -> &EirOperand {
        &self.operands[id.index()]
    }

    pub fn operand_mut(&mut self, id: OperandId) -> &mut EirOperand {
        &mut self.operands[id.index()]
    }

    pub fn operands(&self) -> &[EirOperand] {
        &self.operands
    }

    pub fn instruction(&self, id: InstructionId) -> &EirInstruction {
        &self.instructions[id.index()]
    }

    pub fn instruction_mut(&mut self, id: InstructionId) -> &mut EirInstruction {
        &mut self.instructions[id.index()]
    }

    pub fn instructions(&self) -> &[EirInstruction] {
        &self.instructions
    }

    pub fn block(&self, id: BlockId) -> &EirBlock {
        &self.blocks[id.index()]
    }

    pub fn blocks(&self) -> &[EirBlock] {
        &self.blocks
    }

    /// The block graph as seen by live ranges.
    pub fn control_flow(&self) -> &dyn ControlFlow {
        &self.blocks
    }

    /// Instruction at `position`, `None` for end-of-block positions.
    pub fn instruction_at(&self, position: EirPosition) -> Option<InstructionId> {
        self.blocks
            .get(position.block.index())
            .and_then(|block| block.instructions().get(position.index).copied())
    }

    /// Value bound to operand `index` of `instruction`.
    pub fn operand_value(&self, instruction: InstructionId, index: usize) -> Option<ValueId> {
        self.instruction(instruction)
            .operands()
            .get(index)
            .and_then(|&operand| self.operand(operand).eir_value())
    }

    // Values and blocks

    pub fn new_block(&mut self, name: Option<&str>) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(EirBlock::new(id, name.map(str::to_string)));
        id
    }

    /// Add the control flow edge `from -> to`.
    pub fn connect(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].add_successor(to);
        self.blocks[to.index()].add_predecessor(from);
    }

    pub fn new_variable(&mut self, kind: Kind) -> ValueId {
        let id = ValueId::new(self.values.len());
        self.values.push(EirValue::variable(id, kind, None));
        id
    }

    pub fn new_named_variable(&mut self, kind: Kind, name: &str) -> ValueId {
        let id = ValueId::new(self.values.len());
        self.values.push(EirValue::variable(id, kind, Some(name.to_string())));
        id
    }

    pub fn new_constant(&mut self, constant: ConstantValue) -> ValueId {
        let id = ValueId::new(self.values.len());
        self.values.push(EirValue::new_constant(id, constant));
        id
    }

    pub fn new_preallocated(&mut self, kind: Kind, location: EirLocation) -> ValueId {
        let id = ValueId::new(self.values.len());
        self.values.push(EirValue::preallocated(id, kind, location));
        id
    }

    // Operand bindings

    /// Bind `operand` to `value`, detaching it from its previous value.
    ///
    /// Fails when `value` has a fixed location outside the operand's
    /// location categories.
    pub fn set_operand_value(&mut self, operand: OperandId, value: ValueId) -> EirResult<()> {
        let target = &self.values[value.index()];
        if target.is_location_fixed() {
            if let Some(location) = target.location() {
                let op = &self.operands[operand.index()];
                if !op.accepts(&location) {
                    return Err(self.invariant(format!(
                        "{target} is fixed at {location}, which operand {} of {} does not accept ({:?})",
                        operand.index(),
                        self.instructions[op.instruction().index()],
                        op.location_categories()
                    )));
                }
            }
        }
        if let Some(previous) = self.operands[operand.index()].bind(value) {
            if previous != value {
                self.values[previous.index()].remove_operand(operand);
            }
        }
        self.values[value.index()].add_operand(operand);
        Ok(())
    }

    pub fn clear_operand_value(&mut self, operand: OperandId) {
        if let Some(previous) = self.operands[operand.index()].unbind() {
            self.values[previous.index()].remove_operand(operand);
        }
    }

    /// Pin `operand` to `location`.
    pub fn set_required_location(&mut self, operand: OperandId, location: EirLocation) -> EirResult<()> {
        let op = &self.operands[operand.index()];
        if !op.accepts(&location) {
            return Err(self.invariant(format!(
                "required location {location} is outside {:?}",
                op.location_categories()
            )));
        }
        if let Some(value) = op.eir_value().map(|v| &self.values[v.index()]) {
            if value.is_location_fixed() && value.location() != Some(location) {
                return Err(self.invariant(format!("{value} cannot be required at {location}")));
            }
        }
        self.operands[operand.index()].set_required_location(location);
        Ok(())
    }

    pub fn set_required_register(&mut self, operand: OperandId, register: EirRegister) -> EirResult<()> {
        self.set_required_location(operand, EirLocation::Register(register))
    }

    /// Permanently place `value` at `location`.
    pub fn fix_value_location(&mut self, value: ValueId, location: EirLocation) -> EirResult<()> {
        self.check_not_cleaned_up(value)?;
        let target = &self.values[value.index()];
        if target.is_location_fixed() && target.location() != Some(location) {
            return Err(self.invariant(format!("{target} is already fixed, cannot move it to {location}")));
        }
        self.check_operands_accept(value, location)?;
        self.values[value.index()].fix_location(location);
        Ok(())
    }

    /// Record the allocator's decision for `value`; allowed once.
    pub fn assign_location(&mut self, value: ValueId, location: EirLocation) -> EirResult<()> {
        self.check_not_cleaned_up(value)?;
        let target = &self.values[value.index()];
        if target.location().is_some() {
            return Err(self.invariant(format!("location of {target} assigned twice")));
        }
        self.check_operands_accept(value, location)?;
        self.values[value.index()].fix_location(location);
        Ok(())
    }

    /// Operand sets are gone after cleanup, so placements can no longer be checked.
    fn check_not_cleaned_up(&self, value: ValueId) -> EirResult<()> {
        if self.cleaned_up {
            return Err(self.invariant(format!(
                "cannot place {} after cleanup",
                self.values[value.index()]
            )));
        }
        Ok(())
    }

    fn check_operands_accept(&self, value: ValueId, location: EirLocation) -> EirResult<()> {
        let target = &self.values[value.index()];
        for &operand in target.operands() {
            let op = &self.operands[operand.index()];
            if !op.accepts(&location) {
                return Err(self.invariant(format!(
                    "{target} at {location} violates operand {} of {} ({:?})",
                    operand.index(),
                    self.instructions[op.instruction().index()],
                    op.location_categories()
                )));
            }
        }
        Ok(())
    }

    // Instruction builders

    fn push_instruction(&mut self, block: BlockId, kind: InstructionKind) -> EirResult<InstructionId> {
        if self.retired {
            return Err(self.invariant("cannot append to a method released after emission"));
        }
        if self.generated.is_some() {
            return Err(self.invariant("cannot append to a generated method"));
        }
        let id = InstructionId::new(self.instructions.len());
        let index = self.blocks[block.index()].push_instruction(id);
        self.instructions
            .push(EirInstruction::new(id, EirPosition::new(block, index), kind));
        Ok(id)
    }

    fn add_operand(
        &mut self,
        instruction: InstructionId,
        effect: OperandEffect,
        categories: LocationCategorySet,
        value: ValueId,
    ) -> EirResult<OperandId> {
        let id = OperandId::new(self.operands.len());
        self.operands
            .push(EirOperand::new(id, instruction, effect, categories));
        self.instructions[instruction.index()].push_operand(id);
        self.set_operand_value(id, value)?;
        Ok(id)
    }

    fn value_kind(&self, value: ValueId) -> Kind {
        self.values[value.index()].kind()
    }

    /// Categories a second source operand may use: no 64-bit immediates.
    fn source_categories(kind: Kind) -> LocationCategorySet {
        let categories = LocationCategorySet::for_kind(kind).union(LocationCategorySet::L);
        if kind.is_floating_point() {
            categories
        } else {
            categories
                .union(LocationCategorySet::I8)
                .union(LocationCategorySet::I16)
                .union(LocationCategorySet::I32)
        }
    }

    /// `destination = source`.
    pub fn append_move(&mut self, block: BlockId, destination: ValueId, source: ValueId) -> EirResult<InstructionId> {
        let inst = self.push_instruction(block, InstructionKind::Move)?;
        let dst_categories = LocationCategorySet::for_kind(self.value_kind(destination));
        let src_categories = LocationCategorySet::any_source(self.value_kind(source));
        self.add_operand(inst, OperandEffect::Definition, dst_categories, destination)?;
        self.add_operand(inst, OperandEffect::Use, src_categories, source)?;
        Ok(inst)
    }

    /// Move whose operands both prefer `register`.
    fn append_hinted_move(
        &mut self,
        block: BlockId,
        destination: ValueId,
        source: ValueId,
        location: EirLocation,
    ) -> EirResult<InstructionId> {
        let inst = self.append_move(block, destination, source)?;
        if let Some(register) = location.as_register() {
            for &operand in self.instructions[inst.index()].operands() {
                self.operands[operand.index()].set_preferred_register(register);
            }
        }
        Ok(inst)
    }

    /// Two-address `destination op= source`.
    pub fn append_arithmetic(
        &mut self,
        block: BlockId,
        op: ArithmeticOp,
        destination: ValueId,
        source: ValueId,
    ) -> EirResult<InstructionId> {
        let inst = self.push_instruction(block, InstructionKind::Arithmetic(op))?;
        let dst_categories = LocationCategorySet::for_kind(self.value_kind(destination));
        let src_categories = Self::source_categories(self.value_kind(source));
        self.add_operand(inst, OperandEffect::Update, dst_categories, destination)?;
        self.add_operand(inst, OperandEffect::Use, src_categories, source)?;
        Ok(inst)
    }

    pub fn append_compare(&mut self, block: BlockId, left: ValueId, right: ValueId) -> EirResult<InstructionId> {
        let inst = self.push_instruction(block, InstructionKind::Compare)?;
        let left_categories = LocationCategorySet::for_kind(self.value_kind(left));
        let right_categories = Self::source_categories(self.value_kind(right));
        self.add_operand(inst, OperandEffect::Use, left_categories, left)?;
        self.add_operand(inst, OperandEffect::Use, right_categories, right)?;
        Ok(inst)
    }

    pub fn append_safepoint(&mut self, block: BlockId) -> EirResult<InstructionId> {
        self.push_instruction(block, InstructionKind::Safepoint)
    }

    pub fn append_jump(&mut self, block: BlockId, target: BlockId) -> EirResult<InstructionId> {
        let inst = self.push_instruction(block, InstructionKind::Jump { target })?;
        self.connect(block, target);
        Ok(inst)
    }

    pub fn append_branch(
        &mut self,
        block: BlockId,
        condition: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    ) -> EirResult<InstructionId> {
        let inst = self.push_instruction(block, InstructionKind::Branch { then_block, else_block })?;
        let categories = LocationCategorySet::for_kind(self.value_kind(condition));
        self.add_operand(inst, OperandEffect::Use, categories, condition)?;
        self.connect(block, then_block);
        self.connect(block, else_block);
        Ok(inst)
    }

    /// Reserve `size` bytes of frame memory and define `address` to point at it.
    pub fn append_stack_allocate(
        &mut self,
        block: BlockId,
        address: ValueId,
        size: u32,
        align: u32,
    ) -> EirResult<InstructionId> {
        let kind = self.value_kind(address);
        if kind != Kind::Word {
            return Err(self.invariant(format!("stack block address must be a word, not {kind}")));
        }
        let inst = self.push_instruction(block, InstructionKind::StackAllocate { size, align })?;
        self.add_operand(inst, OperandEffect::Definition, LocationCategorySet::for_kind(kind), address)?;
        Ok(inst)
    }

    pub fn append_filler(&mut self, block: BlockId) -> EirResult<InstructionId> {
        self.push_instruction(block, InstructionKind::Filler)
    }

    /// Call `callee` with `arguments`, optionally defining `result`.
    ///
    /// Each argument is moved into a temporary pinned at its outgoing ABI
    /// location; the result arrives in a temporary pinned at the result
    /// register and is moved into `result` after the call.
    pub fn append_call(
        &mut self,
        block: BlockId,
        callee: ValueId,
        arguments: &[ValueId],
        result: Option<ValueId>,
    ) -> EirResult<InstructionId> {
        let kinds: Vec<Kind> = arguments.iter().map(|&a| self.value_kind(a)).collect();
        let locations = self.abi.get_parameter_locations(StackSlotPurpose::Local, &kinds)?;
        self.outgoing_stack_size = self
            .outgoing_stack_size
            .max(self.abi.parameter_stack_size(&kinds)?);

        let mut pinned = Vec::with_capacity(arguments.len());
        for ((&argument, &kind), &location) in arguments.iter().zip(&kinds).zip(&locations) {
            let temporary = self.new_variable(kind);
            self.append_hinted_move(block, temporary, argument, location)?;
            pinned.push((temporary, kind, location));
        }

        let result_location = match result {
            Some(value) => {
                let kind = self.value_kind(value);
                let location = self
                    .abi
                    .result_location(kind)
                    .ok_or_else(|| self.invariant(format!("call result of kind {kind}")))?;
                Some((value, kind, location))
            }
            None => None,
        };

        let inst = self.push_instruction(
            block,
            InstructionKind::Call {
                arguments: arguments.len(),
                has_result: result.is_some(),
            },
        )?;
        let callee_categories = LocationCategorySet::for_kind(Kind::Word)
            .union(LocationCategorySet::I32)
            .union(LocationCategorySet::I64);
        self.add_operand(inst, OperandEffect::Use, callee_categories, callee)?;
        for (temporary, kind, location) in pinned {
            let operand = self.add_operand(inst, OperandEffect::Use, LocationCategorySet::for_kind(kind), temporary)?;
            self.set_required_location(operand, location)?;
        }
        if let Some((value, kind, location)) = result_location {
            let temporary = self.new_variable(kind);
            let operand = self.add_operand(
                inst,
                OperandEffect::Definition,
                LocationCategorySet::register_for_kind(kind),
                temporary,
            )?;
            self.set_required_location(operand, location)?;
            self.append_hinted_move(block, value, temporary, location)?;
        }
        Ok(inst)
    }

    /// Return, handing `value` back in the ABI result location.
    pub fn append_return(&mut self, block: BlockId, value: Option<ValueId>) -> EirResult<InstructionId> {
        let pinned = match value {
            Some(value) => {
                let kind = self.value_kind(value);
                if self.result_kind == Kind::Void {
                    return Err(self.invariant(format!("void method returns a {kind}")));
                }
                let location = self
                    .abi
                    .result_location(self.result_kind)
                    .ok_or_else(|| self.invariant("no result location"))?;
                let temporary = self.new_variable(kind);
                self.append_hinted_move(block, temporary, value, location)?;
                Some((temporary, kind, location))
            }
            None if self.result_kind != Kind::Void => {
                return Err(self.invariant(format!("missing {} return value", self.result_kind)));
            }
            None => None,
        };
        let inst = self.push_instruction(block, InstructionKind::Return)?;
        if let Some((temporary, kind, location)) = pinned {
            let operand = self.add_operand(
                inst,
                OperandEffect::Use,
                LocationCategorySet::register_for_kind(kind),
                temporary,
            )?;
            self.set_required_location(operand, location)?;
        }
        Ok(inst)
    }

    /// Define `parameters` from the locations the ABI passes them in.
    pub fn append_prologue(&mut self, block: BlockId, parameters: &[ValueId]) -> EirResult<InstructionId> {
        if parameters.len() != self.parameter_kinds.len() {
            return Err(self.invariant(format!(
                "prologue defines {} parameters, signature has {}",
                parameters.len(),
                self.parameter_kinds.len()
            )));
        }
        let inst = self.push_instruction(block, InstructionKind::Prologue)?;
        let mut moves = Vec::with_capacity(parameters.len());
        for (i, &parameter) in parameters.iter().enumerate() {
            let kind = self.parameter_kinds[i];
            let location = self.incoming_locations[i];
            let temporary = self.new_variable(kind);
            let operand = self.add_operand(inst, OperandEffect::Definition, LocationCategorySet::for_kind(kind), temporary)?;
            self.set_required_location(operand, location)?;
            moves.push((parameter, temporary, location));
        }
        for (parameter, temporary, location) in moves {
            self.append_hinted_move(block, parameter, temporary, location)?;
        }
        Ok(inst)
    }

    /// Start exception handler `block`: the catch defines a temporary at the
    /// ABI's exception location and a hinted move copies it into `exception`.
    /// `block` must be empty.
    pub fn append_catch(&mut self, block: BlockId, exception: ValueId) -> EirResult<InstructionId> {
        if !self.blocks[block.index()].is_empty() {
            return Err(self.invariant(format!("catch must be the first instruction of {block}")));
        }
        let kind = self.value_kind(exception);
        if !kind.is_reference() {
            return Err(self.invariant(format!("catch defines a {kind} value")));
        }
        let inst = self.push_instruction(block, InstructionKind::Catch)?;
        self.blocks[block.index()].set_role(BlockRole::ExceptionDispatcher);
        let location = self.abi.catch_parameter_location();
        let temporary = self.new_variable(kind);
        let operand = self.add_operand(
            inst,
            OperandEffect::Definition,
            LocationCategorySet::register_for_kind(kind),
            temporary,
        )?;
        self.set_required_location(operand, location)?;
        self.append_hinted_move(block, exception, temporary, location)?;
        Ok(inst)
    }

    /// Overwrite `instruction` with a filler, keeping every index stable.
    pub fn replace_with_filler(&mut self, instruction: InstructionId) -> EirResult<()> {
        if self.retired {
            return Err(self.invariant("cannot rewrite a method released after emission"));
        }
        for operand in self.instructions[instruction.index()].become_filler() {
            self.clear_operand_value(operand);
        }
        Ok(())
    }

    /// True for fillers and for moves whose ends share a location.
    pub fn is_redundant(&self, instruction: InstructionId) -> bool {
        let inst = self.instruction(instruction);
        match inst.kind() {
            InstructionKind::Filler => true,
            InstructionKind::Move => {
                let location = |index| {
                    self.operand_value(instruction, index)
                        .and_then(|value| self.value(value).location())
                };
                matches!((location(0), location(1)), (Some(a), Some(b)) if a == b)
            }
            _ => false,
        }
    }

    // Liveness

    /// Feed a defining operand into its value's live range.
    pub fn record_definition(&mut self, operand: OperandId) {
        let op = &self.operands[operand.index()];
        if !op.effect().is_definition() {
            return;
        }
        if let Some(value) = op.eir_value() {
            let position = self.instructions[op.instruction().index()].position();
            self.values[value.index()].live_range_mut().record_definition(position);
        }
    }

    /// Feed a using operand into its value's live range.
    pub fn record_use(&mut self, operand: OperandId) {
        let op = &self.operands[operand.index()];
        if !op.effect().is_use() {
            return;
        }
        if let Some(value) = op.eir_value() {
            let position = self.instructions[op.instruction().index()].position();
            self.values[value.index()]
                .live_range_mut()
                .record_use(&self.blocks, position);
        }
    }

    /// Rebuild the live range of `value` from its operands.
    pub fn compute_live_range(&mut self, value: ValueId) {
        let operands = self.values[value.index()].operands().to_vec();
        self.values[value.index()].live_range_mut().clear();
        for &operand in &operands {
            self.record_definition(operand);
        }
        for &operand in &operands {
            self.record_use(operand);
        }
        log::trace!("{}: {} live over {:?}", self.name, self.values[value.index()], self.values[value.index()].live_range());
    }

    /// Compute every non-constant value's live range, then the GC roots
    /// of calls and safepoints.
    pub fn compute_live_ranges(&mut self) {
        for index in 0..self.values.len() {
            if !self.values[index].is_constant() {
                self.compute_live_range(ValueId::new(index));
            }
        }
        self.record_gc_roots();
        log::debug!("{}: computed live ranges of {} values", self.name, self.values.len());
    }

    /// Whether `value` is live on both sides of `instruction` without being
    /// produced by it.
    pub fn is_live_across(&self, value: ValueId, instruction: InstructionId) -> bool {
        let inst = self.instruction(instruction);
        let position = inst.position();
        let after = EirPosition::new(position.block, position.index + 1);
        let range = self.value(value).live_range();
        range.contains(position)
            && range.contains(after)
            && !inst.operands().iter().any(|&operand| {
                let op = self.operand(operand);
                op.effect().is_definition() && op.eir_value() == Some(value)
            })
    }

    fn record_gc_roots(&mut self) {
        let roots: Vec<ValueId> = self
            .values
            .iter()
            .filter(|value| value.kind().is_reference() && !value.is_constant())
            .map(|value| value.id())
            .collect();
        for index in 0..self.instructions.len() {
            let id = InstructionId::new(index);
            if !matches!(
                self.instructions[index].kind(),
                InstructionKind::Call { .. } | InstructionKind::Safepoint
            ) {
                continue;
            }
            let live: Vec<ValueId> = roots
                .iter()
                .copied()
                .filter(|&value| self.is_live_across(value, id))
                .collect();
            let inst = &mut self.instructions[index];
            for value in inst.live_variables().to_vec() {
                inst.remove_live_variable(value);
            }
            for value in live {
                inst.add_live_variable(value);
            }
        }
    }

    /// Visit the instructions at which `value` is live.
    pub fn for_all_live_instructions(&self, value: ValueId, visitor: &mut dyn FnMut(InstructionId)) {
        self.value(value).live_range().for_all_live_positions(&mut |position| {
            if let Some(instruction) = self.instruction_at(position) {
                visitor(instruction);
            }
        });
    }

    /// Allocation priority of `value`: the sum of its operand weights.
    pub fn value_weight(&self, value: ValueId) -> u32 {
        self.value(value)
            .operands()
            .iter()
            .map(|&operand| self.operand(operand).weight())
            .sum()
    }

    // Generation state

    pub fn is_generated(&self) -> bool {
        self.generated.is_some()
    }

    /// Install the allocation result. Allowed once.
    pub fn set_generated(&mut self, generated: GeneratedCode) -> EirResult<()> {
        if self.generated.is_some() {
            return Err(self.invariant("generated twice"));
        }
        if let Some(block) = generated
            .block_order
            .iter()
            .find(|block| block.index() >= self.blocks.len())
        {
            return Err(self.invariant(format!("generated block order names unknown block {block}")));
        }
        log::debug!(
            "{}: generated, frame {} bytes, {} literals",
            self.name,
            generated.frame_size,
            generated.literal_pool.len()
        );
        self.generated = Some(generated);
        Ok(())
    }

    fn generated(&self, what: &str) -> EirResult<&GeneratedCode> {
        self.generated
            .as_ref()
            .ok_or_else(|| self.invariant(format!("{what} queried before generation")))
    }

    pub fn frame_size(&self) -> EirResult<u32> {
        Ok(self.generated("frame size")?.frame_size)
    }

    pub fn stack_blocks_size(&self) -> EirResult<u32> {
        Ok(self.generated("stack blocks size")?.stack_blocks_size)
    }

    pub fn literal_pool(&self) -> EirResult<&LiteralPool> {
        Ok(&self.generated("literal pool")?.literal_pool)
    }

    pub fn parameter_locations(&self) -> EirResult<&[EirLocation]> {
        Ok(&self.generated("parameter locations")?.parameter_locations)
    }

    /// Locations a caller of this method passes the arguments in.
    pub fn argument_locations(&self) -> EirResult<Vec<EirLocation>> {
        self.generated("argument locations")?;
        self.abi
            .get_parameter_locations(StackSlotPurpose::Local, &self.parameter_kinds)
    }

    pub fn result_location(&self) -> EirResult<Option<EirLocation>> {
        Ok(self.generated("result location")?.result_location)
    }

    /// Frame memory reserved by stack allocation `instruction`.
    pub fn stack_block(&self, instruction: InstructionId) -> EirResult<Option<EirStackSlot>> {
        Ok(self
            .generated("stack blocks")?
            .stack_blocks
            .iter()
            .find(|(id, _)| *id == instruction)
            .map(|(_, slot)| *slot))
    }

    /// Blocks in emission order.
    pub fn generated_blocks(&self) -> EirResult<&[BlockId]> {
        Ok(&self.generated("blocks")?.block_order)
    }

    /// Forward every non-pseudo instruction to `emitter`, in block order.
    pub fn emit(&self, emitter: &mut dyn EirEmitter) -> EirResult<()> {
        if self.retired {
            return Err(self.invariant("emitted after cleanup"));
        }
        for &block in self.generated_blocks()? {
            let block = self.block(block);
            emitter.begin_block(self, block)?;
            for &instruction in block.instructions() {
                let instruction = self.instruction(instruction);
                if !instruction.is_pseudo() {
                    emitter.emit_instruction(self, instruction)?;
                }
            }
        }
        Ok(())
    }

    /// Drop allocation-time bookkeeping: value operand sets and live ranges.
    pub fn cleanup(&mut self) {
        for value in &mut self.values {
            value.cleanup();
        }
        self.cleaned_up = true;
    }

    /// Release the instruction graph, keeping the generated metadata.
    pub fn cleanup_after_emitting(&mut self) {
        self.cleanup();
        for instruction in &mut self.instructions {
            instruction.release();
        }
        for block in &mut self.blocks {
            block.release_instructions();
        }
        self.instructions.clear();
        self.operands.clear();
        self.retired = true;
        log::trace!("{}: released after emission", self.name);
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Values the allocator still has to place, in creation order.
    pub fn unplaced_variables(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.values
            .iter()
            .filter(|value| value.role() == ValueRole::Variable && value.location().is_none())
            .map(|value| value.id())
    }
}
