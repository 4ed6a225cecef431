// This module defines the error types of the Rogue backend using the thiserror crate. Shader
// compilation has two failure classes: input the backend has no lowering for (an operation,
// bit size, modifier or conversion combination outside the finite Rogue instruction set) and
// violated IR invariants found by the validator or by a pass that cannot legalize the program.
// Both are abort-class: they are raised through `abort`, which logs the error and panics with
// the rendered message, so no caller ever observes a half-compiled shader. CompileError keeps
// the variants typed so the message format stays uniform across the selection layer, the
// passes and the validator, and CompileResult<T> is used by internal helpers that want to
// propagate a failure up to the point where it is turned into an abort.

//! Error types for the Rogue backend.
//!
//! Using thiserror for the error enum; aborting is centralised in [`abort`].

use thiserror::Error;

/// Main error type for shader compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Unsupported {what}")]
    Unsupported { what: String },

    #[error("Unsupported {bits}-bit {operation}")]
    UnsupportedBitSize { operation: &'static str, bits: u32 },

    #[error("Unsupported conversion from {description}")]
    UnsupportedConversion { description: String },

    #[error("Register allocation failed: {reason}")]
    RegisterAllocation { reason: String },

    #[error("Invalid shader: {reason}")]
    InvalidShader { reason: String },

    #[error("Shader validation failed {context}:\n{errors}")]
    Validation { context: String, errors: String },
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// Terminates compilation with `err`.
///
/// Logs through the `log` facade first so the failure is visible even when the
/// panic message is swallowed by a caller's unwind handler.
#[cold]
#[track_caller]
pub fn abort(err: CompileError) -> ! {
    log::error!("{err}");
    panic!("{err}");
}

/// Shorthand for aborting on an operation with no lowering.
#[cold]
#[track_caller]
pub fn unsupported(what: impl Into<String>) -> ! {
    abort(CompileError::Unsupported { what: what.into() })
}

/// Shorthand for aborting on an unsupported bit size.
#[cold]
#[track_caller]
pub fn unsupported_bits(operation: &'static str, bits: u32) -> ! {
    abort(CompileError::UnsupportedBitSize { operation, bits })
}

/// Shorthand for aborting on a broken shader invariant.
#[cold]
#[track_caller]
pub fn invalid(reason: impl Into<String>) -> ! {
    abort(CompileError::InvalidShader {
        reason: reason.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CompileError::UnsupportedBitSize {
            operation: "iadd",
            bits: 128,
        };
        assert_eq!(err.to_string(), "Unsupported 128-bit iadd");

        let err = CompileError::Unsupported {
            what: "jump type".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported jump type");
    }

    #[test]
    #[should_panic(expected = "Register allocation failed: out of temps")]
    fn test_abort_panics_with_message() {
        abort(CompileError::RegisterAllocation {
            reason: "out of temps".to_string(),
        });
    }
}
