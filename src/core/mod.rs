// This module serves as the hub for the backend's shared infrastructure: the
// arena-based codegen session (allocation, interning, statistics), the error
// taxonomy, the legalized-IR interface consumed from the external optimizer, and the
// target capability seams with their registry. Everything here is shared by the
// lowering, selection, frame and printing stages and is target-independent.

//! Core backend infrastructure.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based allocation using `bumpalo`
//! - Symbol interning and run statistics
//!
//! ## Error Handling (`error`)
//! - The fatal error taxonomy: unimplemented features and contract violations
//!
//! ## IR Interface (`ir`)
//! - The legalized operation graph consumed from the external optimizer
//!
//! ## Targets (`target`)
//! - Capability traits (registers, instructions, frames, lowering)
//! - Explicit init-once/lookup-by-name target registry

pub mod error;
pub mod ir;
pub mod session;
pub mod target;

// Re-export core components
pub use error::{CodegenError, CodegenResult};
pub use ir::{
    BinaryOp, CallConv, IrBlockId, IrFunction, IrNode, NodeId, Op, Predicate, ShiftOp, Signature,
    ValueType,
};
pub use session::{CodegenSession, SessionStats};
pub use target::{
    initialize_targets, FrameInfo, LoweringInfo, RegisterInfo, Target, TargetInstrInfo,
    TargetRegistry,
};
