//! Calling convention tables of the built-in targets.

use std::sync::Arc;
use std::thread;

use eir::abi::{amd64, AbiRegistry, CallingConvention, Target};
use eir::core::{EirLocation, EirStackSlot, Kind, StackSlotPurpose};

#[test]
fn test_every_convention_partitions_the_register_file() {
    let registry = AbiRegistry::with_defaults().unwrap();
    assert_eq!(registry.len(), CallingConvention::ALL.len());
    for convention in CallingConvention::ALL {
        let abi = registry.get(Target::Amd64, convention).unwrap();
        let allocatable = abi.allocatable_registers();
        let unallocatable = abi.unallocatable_registers();
        assert!(allocatable.is_disjoint(&unallocatable), "{convention}");
        assert_eq!(allocatable.union(&unallocatable), abi.target_registers(), "{convention}");
        assert_eq!(
            abi.caller_saved_registers().union(&abi.callee_saved_registers()),
            allocatable,
            "{convention}"
        );
        assert!(abi.caller_saved_registers().is_disjoint(&abi.callee_saved_registers()));
    }
}

#[test]
fn test_saved_register_overrides() {
    let registry = AbiRegistry::with_defaults().unwrap();
    let native = registry.get(Target::Amd64, CallingConvention::Native).unwrap();
    assert!(native.callee_saved_registers().is_empty());
    assert_eq!(native.caller_saved_registers(), native.allocatable_registers());

    let c = registry.get(Target::Amd64, CallingConvention::CFunction).unwrap();
    for register in amd64::C_CALLEE_SAVED {
        assert!(c.callee_saved_registers().contains(register));
    }
    assert!(c.caller_saved_registers().contains(amd64::RAX));

    let trampoline = registry.get(Target::Amd64, CallingConvention::Trampoline).unwrap();
    for register in amd64::INTEGER_PARAMETERS {
        assert!(trampoline.callee_saved_registers().contains(register));
    }
    assert!(!trampoline.callee_saved_registers().contains(amd64::RAX));
}

#[test]
fn test_parameters_overflow_to_stack_deterministically() {
    let abi = amd64::unix_abi(CallingConvention::Java).unwrap();
    let kinds = [Kind::Reference; 7];
    let first = abi.get_parameter_locations(StackSlotPurpose::Parameter, &kinds).unwrap();
    let second = abi.get_parameter_locations(StackSlotPurpose::Parameter, &kinds).unwrap();
    assert_eq!(first, second);

    for (location, register) in first.iter().zip(amd64::INTEGER_PARAMETERS) {
        assert_eq!(*location, EirLocation::Register(register));
    }
    assert_eq!(
        first[6],
        EirLocation::StackSlot(EirStackSlot::new(StackSlotPurpose::Parameter, 0))
    );
    assert_eq!(abi.parameter_stack_size(&kinds).unwrap(), 8);
}

#[test]
fn test_register_banks_are_counted_separately() {
    let abi = amd64::unix_abi(CallingConvention::Java).unwrap();
    let kinds = [Kind::Double, Kind::Int, Kind::Float, Kind::Long];
    let locations = abi.get_parameter_locations(StackSlotPurpose::Local, &kinds).unwrap();
    assert_eq!(
        locations,
        vec![
            EirLocation::Register(amd64::xmm(0)),
            EirLocation::Register(amd64::RDI),
            EirLocation::Register(amd64::xmm(1)),
            EirLocation::Register(amd64::RSI),
        ]
    );
}

#[test]
fn test_bad_parameter_requests() {
    let abi = amd64::unix_abi(CallingConvention::Java).unwrap();
    assert!(abi.get_parameter_locations(StackSlotPurpose::Parameter, &[Kind::Void]).is_err());
    assert!(abi.get_parameter_locations(StackSlotPurpose::Block, &[Kind::Int]).is_err());
    assert!(AbiRegistry::new().get(Target::Amd64, CallingConvention::Java).is_err());
}

#[test]
fn test_abi_is_shared_between_compilation_threads() {
    let abi = Arc::new(amd64::unix_abi(CallingConvention::CFunction).unwrap());
    let expected = abi
        .get_parameter_locations(StackSlotPurpose::Parameter, &[Kind::Word; 9])
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let abi = Arc::clone(&abi);
            thread::spawn(move || {
                abi.get_parameter_locations(StackSlotPurpose::Parameter, &[Kind::Word; 9])
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}
