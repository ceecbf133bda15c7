// This module defines the error type shared by every layer of the EIR core using the
// thiserror crate. EirError mirrors the failure taxonomy of the register allocation core:
// invariant violations (a bug in an earlier compiler stage, e.g. binding a value whose
// fixed location is outside an operand's categories or asking for the frame size of a
// method that was never generated), unimplemented combinations (e.g. unioning live
// ranges of different representations), program errors from misuse of the ABI API,
// allocation failures from the reference allocator and parse errors from the text
// format. None of these are meant to be recovered from: they propagate with `?` to
// the per-method compilation boundary, which abandons that method.

//! Error types for the EIR core.

use thiserror::Error;

/// Main error type for EIR construction, liveness and allocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EirError {
    #[error("invariant violated in {method}: {message}")]
    InvariantViolation { method: String, message: String },

    #[error("unimplemented: {what}")]
    Unimplemented { what: String },

    #[error("program error: {message}")]
    ProgramError { message: String },

    #[error("register allocation failed in {method}: {reason}")]
    RegisterAllocation { method: String, reason: String },

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl EirError {
    pub fn invariant(method: impl Into<String>, message: impl Into<String>) -> Self {
        EirError::InvariantViolation {
            method: method.into(),
            message: message.into(),
        }
    }

    pub fn unimplemented(what: impl Into<String>) -> Self {
        EirError::Unimplemented { what: what.into() }
    }

    pub fn program(message: impl Into<String>) -> Self {
        EirError::ProgramError {
            message: message.into(),
        }
    }

    /// Whether this error reports a broken compiler-internal contract.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, EirError::InvariantViolation { .. })
    }
}

/// Result type alias for EIR operations.
pub type EirResult<T> = Result<T, EirError>;
