//! z80gen - Z80 compiler backend.
//!
//! z80gen lowers a legalized, target-independent IR onto the Z80: an 8-bit
//! accumulator machine with a 16-bit address space, paired 8/16-bit registers,
//! two restricted index registers and condition codes instead of general
//! compares. The crate covers operation legalization, instruction selection,
//! calling-convention lowering, stack-frame layout, branch rewriting and
//! assembly printing. Register allocation itself is external: selected code
//! references virtual registers tagged with a register class, and the
//! allocator's assignment is applied back before frame lowering and printing.
//!
//! # Primary Usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use z80gen::core::{CodegenSession, TargetRegistry};
//!
//! let arena = Bump::new();
//! let session = CodegenSession::new(&arena);
//!
//! let mut registry = TargetRegistry::new();
//! z80gen::core::initialize_targets(&mut registry);
//! let target = registry.lookup("z80").unwrap();
//!
//! let legal = target.lowering.legalize(&session, &ir_func)?;
//! let mut mf = z80gen::z80::isel::select_function(&session, &legal)?;
//! // ... external register allocation produces a RegisterMap ...
//! z80gen::mir::apply_register_map(&mut mf, &map)?;
//! target.frames.emit_prologue(&mut mf)?;
//! let text = z80gen::z80::printer::print_function(&mf)?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Shared infrastructure (session, errors, IR interface, targets)
//! - [`mir`] - Machine IR: operands, instructions, blocks, frame layout
//! - [`z80`] - Z80 specific code (registers, calling convention, lowering,
//!   selection, frames, branches, printing)

pub mod core;
pub mod mir;
pub mod z80;

// Re-export common types from organized modules
pub use crate::core::{
    // Session management
    CodegenSession, SessionStats,
    // Error handling
    CodegenError, CodegenResult,
    // Target capability seams
    FrameInfo, LoweringInfo, RegisterInfo, Target, TargetInstrInfo, TargetRegistry,
    initialize_targets,
};
pub use crate::mir::{
    apply_register_map, BlockId, CondCode, FrameIndex, FrameLayout, MachineBlock,
    MachineFunction, MachineInst, MemBase, Opcode, Operand, Reg, RegisterMap, VReg,
};
pub use crate::z80::registers::{RegClass, SubRegPart, Z80Reg};
