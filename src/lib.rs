//! EIR - register allocation core for a JIT's low-level IR.
//!
//! EIR is the near-machine intermediate representation a method compiler
//! lowers to before register allocation. This crate holds the part of that
//! pipeline that is independent of instruction encoding: the value and
//! operand model, liveness, calling-convention tables and a greedy
//! allocator that places every variable in a register or stack slot.
//!
//! # Primary Usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use eir::allocator::{AllocatorConfig, GreedyAllocator};
//! use eir::core::CompilationContext;
//!
//! let arena = Bump::new();
//! let context = CompilationContext::new(&arena)?;
//! let mut method = eir::text::parse_method(&context, source)?;
//! let summary = GreedyAllocator::new(AllocatorConfig::default()).allocate(&context, &mut method)?;
//! println!("{}", eir::text::print_method(&method));
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Values, operands, instructions, blocks, methods and liveness
//! - [`abi`] - Register files and calling conventions per target
//! - [`allocator`] - Greedy register allocation and frame layout
//! - [`text`] - Textual EIR for tests and tools

pub mod abi;
pub mod allocator;
pub mod core;
pub mod text;

pub use abi::{AbiRegistry, CallingConvention, EirAbi, Target};
pub use allocator::{AllocationSummary, AllocatorConfig, GreedyAllocator};
pub use core::{
    CompilationContext, EirError, EirLocation, EirMethod, EirResult, EirValue, Kind, ValueId,
};
