// This module defines error types for the z80gen backend using the thiserror crate.
// CodegenError is the single error enum covering the backend's failure taxonomy:
// unimplemented-feature conditions (frame pointers, variadic arguments, three-way
// branches, dynamic call-frame adjustment), and contract violations signalling an
// internal consistency bug in an earlier stage (unlegalized operators reaching the
// selector, impossible register copies, out-of-range frame displacements, invalid
// rendering modifiers). Both classes are fatal and propagate with `?` to the pipeline
// boundary; there is no retry or partial recovery. The one non-fatal condition in the
// backend, "unanalyzable control flow", is intentionally not represented here - the
// branch analyzer reports it as an Ok(None) payload so callers can skip simplification
// for a single block.

//! Error types for the Z80 backend.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Main error type for Z80 code generation.
#[derive(Error, Debug)]
pub enum CodegenError {
    /// A known-incomplete path was reached. Always fatal; this is missing
    /// coverage, not a recoverable runtime condition.
    #[error("not implemented: {feature}")]
    Unimplemented { feature: &'static str },

    #[error("unsupported {width}-bit {operation} operation")]
    UnsupportedOp {
        operation: &'static str,
        width: u32,
    },

    /// Internal consistency bug in an earlier stage.
    #[error("internal error: {reason}")]
    Internal { reason: String },

    #[error("impossible register-to-register copy: {src} -> {dst}")]
    InvalidRegCopy {
        src: &'static str,
        dst: &'static str,
    },

    #[error("displacement {disp} for local object {index} exceeds the signed 8-bit range")]
    DisplacementOutOfRange { index: u32, disp: i32 },

    #[error("invalid {kind} modifier: {modifier}")]
    InvalidModifier {
        kind: &'static str,
        modifier: String,
    },

    #[error("virtual register v{vreg} reached a post-allocation stage unassigned")]
    UnallocatedRegister { vreg: u32 },
}

impl CodegenError {
    /// Shorthand for contract-violation errors built from format strings.
    pub fn internal(reason: impl Into<String>) -> Self {
        CodegenError::Internal {
            reason: reason.into(),
        }
    }
}

/// Result type alias for codegen operations.
pub type CodegenResult<T> = Result<T, CodegenError>;
