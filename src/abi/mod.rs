// This module describes calling conventions as immutable tables that parameterize the
// allocator. An EirAbi names the target's registers, the ordered integer and floating
// point parameter registers, the result registers, and the registers that can never be
// allocated (stack pointer, frame pointer, safepoint latch and one scratch register per
// bank). The allocatable set is computed once as the complement of that and cached; the
// builder refuses any table where the two sets fail to partition the register file.
// Caller-saved and callee-saved sets are per convention, and specialized conventions
// override them (the native-call ABI makes everything caller-saved so the garbage
// collector never has to find roots in registers across a native call). Parameter
// location assignment walks the kinds once, takes registers greedily per bank and
// overflows into sequential stack slots. ABIs are shared read-only through Arc.

//! Target and calling-convention descriptions.

pub mod amd64;

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::core::error::{EirError, EirResult};
use crate::core::kind::Kind;
use crate::core::location::{EirLocation, EirStackSlot, StackSlotPurpose};
use crate::core::register::{EirRegister, RegisterCategory, RegisterSet};

/// Target architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Amd64,
}

impl Target {
    pub fn name(self) -> &'static str {
        match self {
            Target::Amd64 => "amd64",
        }
    }
}

/// Calling convention an ABI instance implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// Compiled code calling compiled code.
    Java,
    /// Stubs calling into native code.
    Native,
    /// Compiled code that native code calls into.
    CFunction,
    /// Resolution trampolines that must hand their arguments on untouched.
    Trampoline,
}

impl CallingConvention {
    pub const ALL: [CallingConvention; 4] = [
        CallingConvention::Java,
        CallingConvention::Native,
        CallingConvention::CFunction,
        CallingConvention::Trampoline,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CallingConvention::Java => "java",
            CallingConvention::Native => "native",
            CallingConvention::CFunction => "cfunction",
            CallingConvention::Trampoline => "trampoline",
        }
    }

    pub fn from_name(name: &str) -> Option<CallingConvention> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Register file of a target: names per bank, indexed by ordinal.
#[derive(Debug, Clone, Copy)]
pub struct TargetRegisters {
    pub integer: &'static [&'static str],
    pub floating_point: &'static [&'static str],
}

impl TargetRegisters {
    pub fn all(&self) -> RegisterSet {
        RegisterSet::all_in_bank(RegisterCategory::Integer, self.integer.len() as u8).union(
            &RegisterSet::all_in_bank(RegisterCategory::FloatingPoint, self.floating_point.len() as u8),
        )
    }

    pub fn name(&self, register: EirRegister) -> Option<&'static str> {
        let names = match register.category {
            RegisterCategory::Integer => self.integer,
            RegisterCategory::FloatingPoint => self.floating_point,
        };
        names.get(register.ordinal as usize).copied()
    }

    pub fn lookup(&self, name: &str) -> Option<EirRegister> {
        let find = |names: &[&str]| names.iter().position(|&n| n == name).map(|i| i as u8);
        find(self.integer)
            .map(EirRegister::integer)
            .or_else(|| find(self.floating_point).map(EirRegister::floating_point))
    }
}

/// Per-target, per-convention register and stack conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EirAbi {
    name: String,
    target: Target,
    convention: CallingConvention,
    register_names: &'static [&'static str],
    floating_point_register_names: &'static [&'static str],
    all_registers: RegisterSet,
    integer_parameter_registers: Vec<EirRegister>,
    floating_point_parameter_registers: Vec<EirRegister>,
    integer_result_register: EirRegister,
    floating_point_result_register: EirRegister,
    stack_pointer: EirRegister,
    frame_pointer: EirRegister,
    safepoint_latch: EirRegister,
    integer_scratch: EirRegister,
    floating_point_scratch: EirRegister,
    allocatable: RegisterSet,
    unallocatable: RegisterSet,
    callee_saved: RegisterSet,
    caller_saved: RegisterSet,
    stack_slot_size: u32,
    frame_alignment: u32,
}

impl EirAbi {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    pub fn target_registers(&self) -> RegisterSet {
        self.all_registers
    }

    pub fn allocatable_registers(&self) -> RegisterSet {
        self.allocatable
    }

    pub fn unallocatable_registers(&self) -> RegisterSet {
        self.unallocatable
    }

    pub fn is_allocatable(&self, register: EirRegister) -> bool {
        self.allocatable.contains(register)
    }

    pub fn caller_saved_registers(&self) -> RegisterSet {
        self.caller_saved
    }

    pub fn callee_saved_registers(&self) -> RegisterSet {
        self.callee_saved
    }

    pub fn integer_parameter_registers(&self) -> &[EirRegister] {
        &self.integer_parameter_registers
    }

    pub fn floating_point_parameter_registers(&self) -> &[EirRegister] {
        &self.floating_point_parameter_registers
    }

    pub fn result_registers(&self) -> RegisterSet {
        RegisterSet::from_registers([self.integer_result_register, self.floating_point_result_register])
    }

    pub fn stack_pointer(&self) -> EirRegister {
        self.stack_pointer
    }

    pub fn frame_pointer(&self) -> EirRegister {
        self.frame_pointer
    }

    pub fn safepoint_latch_register(&self) -> EirRegister {
        self.safepoint_latch
    }

    /// Scratch register reserved for moves of values of `kind`.
    pub fn scratch_register(&self, kind: Kind) -> Option<EirRegister> {
        kind.register_category().map(|category| match category {
            RegisterCategory::Integer => self.integer_scratch,
            RegisterCategory::FloatingPoint => self.floating_point_scratch,
        })
    }

    pub fn stack_slot_size(&self) -> u32 {
        self.stack_slot_size
    }

    pub fn frame_alignment(&self) -> u32 {
        self.frame_alignment
    }

    pub fn register_name(&self, register: EirRegister) -> &'static str {
        let names = match register.category {
            RegisterCategory::Integer => self.register_names,
            RegisterCategory::FloatingPoint => self.floating_point_register_names,
        };
        names.get(register.ordinal as usize).copied().unwrap_or("?")
    }

    /// Where a value of `kind` is returned, `None` for void.
    pub fn result_location(&self, kind: Kind) -> Option<EirLocation> {
        kind.register_category().map(|category| {
            EirLocation::Register(match category {
                RegisterCategory::Integer => self.integer_result_register,
                RegisterCategory::FloatingPoint => self.floating_point_result_register,
            })
        })
    }

    /// Where the runtime delivers the exception object to a handler.
    pub fn catch_parameter_location(&self) -> EirLocation {
        EirLocation::Register(self.integer_result_register)
    }

    /// Locations of parameters of the given kinds, in order.
    ///
    /// Registers are handed out per bank in declaration order; once a bank
    /// is exhausted the remaining parameters of that bank take consecutive
    /// stack slots with purpose `purpose`.
    pub fn get_parameter_locations(
        &self,
        purpose: StackSlotPurpose,
        kinds: &[Kind],
    ) -> EirResult<Vec<EirLocation>> {
        if purpose == StackSlotPurpose::Block {
            return Err(EirError::program(format!(
                "{} cannot place parameters in stack blocks",
                self.name
            )));
        }
        let mut integer_index = 0;
        let mut floating_point_index = 0;
        let mut stack_offset = 0;
        let mut locations = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let register = match kind.register_category() {
                None => {
                    return Err(EirError::program(format!(
                        "{} has no location for a {kind} parameter",
                        self.name
                    )))
                }
                Some(RegisterCategory::Integer) => {
                    let register = self.integer_parameter_registers.get(integer_index).copied();
                    integer_index += 1;
                    register
                }
                Some(RegisterCategory::FloatingPoint) => {
                    let register = self
                        .floating_point_parameter_registers
                        .get(floating_point_index)
                        .copied();
                    floating_point_index += 1;
                    register
                }
            };
            locations.push(match register {
                Some(register) => EirLocation::Register(register),
                None => {
                    let slot = EirStackSlot::new(purpose, stack_offset);
                    stack_offset += self.stack_slot_size;
                    EirLocation::StackSlot(slot)
                }
            });
        }
        Ok(locations)
    }

    /// Bytes of stack the parameters of `kinds` occupy.
    pub fn parameter_stack_size(&self, kinds: &[Kind]) -> EirResult<u32> {
        Ok(self
            .get_parameter_locations(StackSlotPurpose::Parameter, kinds)?
            .iter()
            .filter(|location| matches!(location, EirLocation::StackSlot(_)))
            .count() as u32
            * self.stack_slot_size)
    }
}

/// How caller-/callee-saved registers are chosen for a convention.
#[derive(Debug, Clone)]
pub enum SavedRegisterPolicy {
    /// The given registers are callee-saved, the rest caller-saved.
    CalleeSaved(RegisterSet),
    /// Every allocatable register is caller-saved.
    AllCallerSaved,
    /// Parameter registers are callee-saved, the rest caller-saved.
    ParametersCalleeSaved,
}

/// Builds and validates an [`EirAbi`].
#[derive(Debug, Clone)]
pub struct AbiBuilder {
    target: Target,
    convention: CallingConvention,
    registers: TargetRegisters,
    integer_parameter_registers: Vec<EirRegister>,
    floating_point_parameter_registers: Vec<EirRegister>,
    integer_result_register: Option<EirRegister>,
    floating_point_result_register: Option<EirRegister>,
    stack_pointer: Option<EirRegister>,
    frame_pointer: Option<EirRegister>,
    safepoint_latch: Option<EirRegister>,
    integer_scratch: Option<EirRegister>,
    floating_point_scratch: Option<EirRegister>,
    saved: SavedRegisterPolicy,
    stack_slot_size: u32,
    frame_alignment: u32,
}

impl AbiBuilder {
    pub fn new(target: Target, convention: CallingConvention, registers: TargetRegisters) -> Self {
        Self {
            target,
            convention,
            registers,
            integer_parameter_registers: Vec::new(),
            floating_point_parameter_registers: Vec::new(),
            integer_result_register: None,
            floating_point_result_register: None,
            stack_pointer: None,
            frame_pointer: None,
            safepoint_latch: None,
            integer_scratch: None,
            floating_point_scratch: None,
            saved: SavedRegisterPolicy::AllCallerSaved,
            stack_slot_size: 8,
            frame_alignment: 16,
        }
    }

    pub fn parameter_registers(mut self, integer: &[EirRegister], floating_point: &[EirRegister]) -> Self {
        self.integer_parameter_registers = integer.to_vec();
        self.floating_point_parameter_registers = floating_point.to_vec();
        self
    }

    pub fn result_registers(mut self, integer: EirRegister, floating_point: EirRegister) -> Self {
        self.integer_result_register = Some(integer);
        self.floating_point_result_register = Some(floating_point);
        self
    }

    pub fn stack_pointer(mut self, register: EirRegister) -> Self {
        self.stack_pointer = Some(register);
        self
    }

    pub fn frame_pointer(mut self, register: EirRegister) -> Self {
        self.frame_pointer = Some(register);
        self
    }

    pub fn safepoint_latch(mut self, register: EirRegister) -> Self {
        self.safepoint_latch = Some(register);
        self
    }

    pub fn scratch_registers(mut self, integer: EirRegister, floating_point: EirRegister) -> Self {
        self.integer_scratch = Some(integer);
        self.floating_point_scratch = Some(floating_point);
        self
    }

    pub fn saved_registers(mut self, policy: SavedRegisterPolicy) -> Self {
        self.saved = policy;
        self
    }

    pub fn stack_slot_size(mut self, size: u32) -> Self {
        self.stack_slot_size = size;
        self
    }

    pub fn frame_alignment(mut self, alignment: u32) -> Self {
        self.frame_alignment = alignment;
        self
    }

    pub fn build(self) -> EirResult<EirAbi> {
        let name = format!("{}-{}", self.target.name(), self.convention.name());
        let missing = |what: &str| EirError::program(format!("{name}: no {what} register configured"));
        let stack_pointer = self.stack_pointer.ok_or_else(|| missing("stack pointer"))?;
        let frame_pointer = self.frame_pointer.ok_or_else(|| missing("frame pointer"))?;
        let safepoint_latch = self.safepoint_latch.ok_or_else(|| missing("safepoint latch"))?;
        let integer_scratch = self.integer_scratch.ok_or_else(|| missing("integer scratch"))?;
        let floating_point_scratch = self
            .floating_point_scratch
            .ok_or_else(|| missing("floating point scratch"))?;
        let integer_result_register = self.integer_result_register.ok_or_else(|| missing("result"))?;
        let floating_point_result_register = self
            .floating_point_result_register
            .ok_or_else(|| missing("floating point result"))?;

        let all_registers = self.registers.all();
        let unallocatable = RegisterSet::from_registers([
            stack_pointer,
            frame_pointer,
            safepoint_latch,
            integer_scratch,
            floating_point_scratch,
        ]);
        let allocatable = all_registers.difference(&unallocatable);

        let mut special = vec![integer_result_register, floating_point_result_register];
        special.extend(&self.integer_parameter_registers);
        special.extend(&self.floating_point_parameter_registers);
        if let Some(register) = special.iter().find(|r| !allocatable.contains(**r)) {
            return Err(EirError::program(format!(
                "{name}: parameter/result register {register} is not allocatable"
            )));
        }
        if !all_registers.difference(&allocatable).difference(&unallocatable).is_empty()
            || !unallocatable.difference(&all_registers).is_empty()
        {
            return Err(EirError::program(format!("{name}: registers do not partition the target")));
        }

        let callee_saved = match self.saved {
            SavedRegisterPolicy::CalleeSaved(set) => {
                let dropped = set.difference(&allocatable);
                if !dropped.is_empty() {
                    log::warn!("{name}: ignoring {} unallocatable callee-saved registers", dropped.len());
                }
                set.intersection(&allocatable)
            }
            SavedRegisterPolicy::AllCallerSaved => RegisterSet::new(),
            SavedRegisterPolicy::ParametersCalleeSaved => RegisterSet::from_registers(
                self.integer_parameter_registers
                    .iter()
                    .chain(&self.floating_point_parameter_registers)
                    .copied(),
            ),
        };
        let caller_saved = allocatable.difference(&callee_saved);
        log::debug!(
            "built ABI {name}: {} allocatable, {} callee-saved",
            allocatable.len(),
            callee_saved.len()
        );

        Ok(EirAbi {
            name,
            target: self.target,
            convention: self.convention,
            register_names: self.registers.integer,
            floating_point_register_names: self.registers.floating_point,
            all_registers,
            integer_parameter_registers: self.integer_parameter_registers,
            floating_point_parameter_registers: self.floating_point_parameter_registers,
            integer_result_register,
            floating_point_result_register,
            stack_pointer,
            frame_pointer,
            safepoint_latch,
            integer_scratch,
            floating_point_scratch,
            allocatable,
            unallocatable,
            callee_saved,
            caller_saved,
            stack_slot_size: self.stack_slot_size,
            frame_alignment: self.frame_alignment,
        })
    }
}

/// Shared, read-only ABI instances keyed by target and convention.
#[derive(Debug, Clone, Default)]
pub struct AbiRegistry {
    abis: HashMap<(Target, CallingConvention), Arc<EirAbi>>,
}

impl AbiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in target/convention pair.
    pub fn with_defaults() -> EirResult<Self> {
        let mut registry = Self::new();
        for convention in CallingConvention::ALL {
            registry.register(amd64::unix_abi(convention)?);
        }
        Ok(registry)
    }

    pub fn register(&mut self, abi: EirAbi) -> Arc<EirAbi> {
        let abi = Arc::new(abi);
        self.abis.insert((abi.target(), abi.convention()), Arc::clone(&abi));
        abi
    }

    pub fn get(&self, target: Target, convention: CallingConvention) -> EirResult<Arc<EirAbi>> {
        self.abis
            .get(&(target, convention))
            .cloned()
            .ok_or_else(|| {
                EirError::program(format!("no {} ABI registered for {}", convention, target.name()))
            })
    }

    pub fn len(&self) -> usize {
        self.abis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abis.is_empty()
    }
}
