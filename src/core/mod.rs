// This module is the hub of the EIR data model that register allocation works on. It
// gathers the value kinds and register/location vocabulary, the operand and value
// records with their back-references, instructions including the Catch and Filler
// pseudo-instructions, blocks, the per-method arena with its builders and liveness
// computation, and the compilation context that owns the arena, the ABI registry,
// observers and statistics. Everything here is target independent; concrete register
// files and calling conventions come in from crate::abi.

//! Core EIR model.
//!
//! # Key Components
//!
//! ## Values and operands (`value`, `operand`)
//! - Variables, constants and preallocated values with an optional location
//! - Operands carry their effect, accepted location categories and
//!   register constraints, and point back at the value they are bound to
//!
//! ## Liveness (`live_range`)
//! - [`LiveRange`] trait with a per-block bitset implementation
//! - Positions are `(block, index)`; index == block length means live-out
//!
//! ## Methods (`method`)
//! - Arena of values, operands, instructions and blocks addressed by ids
//! - Builders that lower ABI constraints to pinned temporaries and moves
//! - The generated state with frame, literal pool and parameter metadata
//!
//! ## Session (`session`)
//! - Compilation arena, ABI lookup, observers and statistics

pub mod block;
pub mod error;
pub mod instruction;
pub mod kind;
pub mod literal_pool;
pub mod live_range;
pub mod location;
pub mod method;
pub mod operand;
pub mod register;
pub mod session;
pub mod value;

pub use block::{BlockId, BlockRole, EirBlock};
pub use error::{EirError, EirResult};
pub use instruction::{ArithmeticOp, EirInstruction, InstructionId, InstructionKind};
pub use kind::Kind;
pub use literal_pool::LiteralPool;
pub use live_range::{BitSetLiveRange, ControlFlow, EirPosition, LiveRange};
pub use location::{
    ConstantValue, EirLocation, EirStackSlot, LocationCategory, LocationCategorySet, StackSlotPurpose,
};
pub use method::{EirEmitter, EirMethod, GeneratedCode};
pub use operand::{EirOperand, OperandEffect, OperandId};
pub use register::{EirRegister, RegisterCategory, RegisterSet};
pub use session::{CompilationContext, CompilationEvent, CompilationObserver, SessionStats};
pub use value::{EirValue, ValueId, ValueRole};
