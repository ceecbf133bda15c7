// This module describes the AMD64 register file and the Unix ABI variants built on it.
// Integer registers are numbered by their hardware encoding (RAX=0 ... R15=15) and the
// XMM registers follow in the floating point bank. Parameters follow the System V
// order: RDI, RSI, RDX, RCX, R8, R9 for integers and XMM0-XMM7 for floating point, with
// results in RAX and XMM0. RSP and RBP are never allocated, R14 holds the safepoint
// latch and R11/XMM15 are the scratch registers the code emitter uses for memory to
// memory moves. The conventions differ only in which registers survive a call: compiled
// code treats everything as caller-saved, C entry points preserve the System V
// callee-saved set (minus the latch), native stubs make every register caller-saved
// and trampolines preserve the parameter registers they forward.

//! AMD64 register table and Unix ABIs.

use super::{AbiBuilder, CallingConvention, EirAbi, SavedRegisterPolicy, Target, TargetRegisters};
use crate::core::error::EirResult;
use crate::core::register::{EirRegister, RegisterSet};

pub const RAX: EirRegister = EirRegister::integer(0);
pub const RCX: EirRegister = EirRegister::integer(1);
pub const RDX: EirRegister = EirRegister::integer(2);
pub const RBX: EirRegister = EirRegister::integer(3);
pub const RSP: EirRegister = EirRegister::integer(4);
pub const RBP: EirRegister = EirRegister::integer(5);
pub const RSI: EirRegister = EirRegister::integer(6);
pub const RDI: EirRegister = EirRegister::integer(7);
pub const R8: EirRegister = EirRegister::integer(8);
pub const R9: EirRegister = EirRegister::integer(9);
pub const R11: EirRegister = EirRegister::integer(11);
pub const R12: EirRegister = EirRegister::integer(12);
pub const R13: EirRegister = EirRegister::integer(13);
pub const R14: EirRegister = EirRegister::integer(14);
pub const R15: EirRegister = EirRegister::integer(15);

pub const fn xmm(n: u8) -> EirRegister {
    EirRegister::floating_point(n)
}

pub const REGISTERS: TargetRegisters = TargetRegisters {
    integer: &[
        "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
    ],
    floating_point: &[
        "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10", "xmm11", "xmm12",
        "xmm13", "xmm14", "xmm15",
    ],
};

/// System V integer argument registers.
pub const INTEGER_PARAMETERS: [EirRegister; 6] = [RDI, RSI, RDX, RCX, R8, R9];

/// System V floating point argument registers.
pub const FLOATING_POINT_PARAMETERS: [EirRegister; 8] =
    [xmm(0), xmm(1), xmm(2), xmm(3), xmm(4), xmm(5), xmm(6), xmm(7)];

/// System V callee-saved registers that stay allocatable (R14 is the latch).
pub const C_CALLEE_SAVED: [EirRegister; 4] = [RBX, R12, R13, R15];

/// Builder preloaded with the AMD64 Unix tables.
pub fn unix_builder(convention: CallingConvention) -> AbiBuilder {
    let saved = match convention {
        CallingConvention::Java => SavedRegisterPolicy::CalleeSaved(RegisterSet::new()),
        CallingConvention::Native => SavedRegisterPolicy::AllCallerSaved,
        CallingConvention::CFunction => {
            SavedRegisterPolicy::CalleeSaved(RegisterSet::from_registers(C_CALLEE_SAVED))
        }
        CallingConvention::Trampoline => SavedRegisterPolicy::ParametersCalleeSaved,
    };
    AbiBuilder::new(Target::Amd64, convention, REGISTERS)
        .parameter_registers(&INTEGER_PARAMETERS, &FLOATING_POINT_PARAMETERS)
        .result_registers(RAX, xmm(0))
        .stack_pointer(RSP)
        .frame_pointer(RBP)
        .safepoint_latch(R14)
        .scratch_registers(R11, xmm(15))
        .saved_registers(saved)
        .stack_slot_size(8)
        .frame_alignment(16)
}

pub fn unix_abi(convention: CallingConvention) -> EirResult<EirAbi> {
    unix_builder(convention).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kind::Kind;
    use crate::core::location::{EirLocation, EirStackSlot, StackSlotPurpose};
    use crate::core::register::RegisterCategory;

    #[test]
    fn test_partition_for_every_convention() {
        for convention in CallingConvention::ALL {
            let abi = unix_abi(convention).unwrap();
            let allocatable = abi.allocatable_registers();
            let unallocatable = abi.unallocatable_registers();
            assert!(allocatable.is_disjoint(&unallocatable), "{convention}");
            assert_eq!(allocatable.union(&unallocatable), abi.target_registers(), "{convention}");
            assert_eq!(abi.target_registers().len(), 32);
            assert_eq!(unallocatable, RegisterSet::from_registers([RSP, RBP, R14, R11, xmm(15)]));
        }
    }

    #[test]
    fn test_builder_rejects_inconsistent_tables() {
        let err = unix_builder(CallingConvention::Java)
            .scratch_registers(RDI, xmm(15))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("not allocatable"), "{err}");

        let err = AbiBuilder::new(Target::Amd64, CallingConvention::Java, REGISTERS)
            .result_registers(RAX, xmm(0))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("stack pointer"), "{err}");

        let abi = unix_builder(CallingConvention::CFunction)
            .saved_registers(SavedRegisterPolicy::CalleeSaved(RegisterSet::from_registers([RBX, R14])))
            .build()
            .unwrap();
        assert_eq!(abi.callee_saved_registers(), RegisterSet::from_registers([RBX]));
    }

    #[test]
    fn test_floating_point_parameters_overflow_separately() {
        let abi = unix_abi(CallingConvention::Java).unwrap();
        let mut kinds = vec![Kind::Double; 9];
        kinds.push(Kind::Int);
        let locations = abi.get_parameter_locations(StackSlotPurpose::Local, &kinds).unwrap();
        for (location, register) in locations.iter().zip(FLOATING_POINT_PARAMETERS) {
            assert_eq!(*location, EirLocation::Register(register));
        }
        assert_eq!(
            locations[8],
            EirLocation::StackSlot(EirStackSlot::new(StackSlotPurpose::Local, 0))
        );
        assert_eq!(locations[9], EirLocation::Register(RDI));
        assert_eq!(abi.parameter_stack_size(&kinds).unwrap(), 8);
    }

    #[test]
    fn test_names_and_scratch() {
        let abi = unix_abi(CallingConvention::Java).unwrap();
        assert_eq!(abi.register_name(RDI), "rdi");
        assert_eq!(abi.register_name(xmm(3)), "xmm3");
        assert_eq!(abi.scratch_register(Kind::Double), Some(xmm(15)));
        assert_eq!(abi.scratch_register(Kind::Reference), Some(R11));
        assert_eq!(abi.scratch_register(Kind::Void), None);
        assert_eq!(abi.result_location(Kind::Float), Some(EirLocation::Register(xmm(0))));
        assert_eq!(
            abi.allocatable_registers().in_bank(RegisterCategory::Integer).len(),
            12
        );
    }
}
