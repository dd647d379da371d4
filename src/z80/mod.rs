// This module contains all Z80-specific code and wires the target's capability
// implementations into the generic seams: the register model, the calling
// convention, legalization rules, the instruction selector, frame lowering, branch
// rewriting, and the printer. The target() constructor builds the descriptor the
// registry hands out.

//! Z80 architecture-specific components.

pub mod calling_convention;
pub mod frame;
pub mod instr_info;
pub mod isel;
pub mod lowering;
pub mod printer;
pub mod registers;

use crate::core::error::CodegenResult;
use crate::core::ir::IrFunction;
use crate::core::session::CodegenSession;
use crate::core::target::{FrameInfo, LoweringInfo, RegisterInfo, Target, TargetInstrInfo};
use crate::mir::{BlockId, CondCode, MachineBlock, MachineFunction, MachineInst};
use instr_info::{BranchAnalysis, Z80InstrInfo};
use registers::{SubRegPart, Z80Reg};

pub use calling_convention::Z80Assigner;
pub use frame::Z80FrameLowering;
pub use lowering::Z80Lowering;
pub use printer::Z80InstPrinter;

/// Z80 register-information capability.
pub struct Z80RegisterInfo;

impl RegisterInfo for Z80RegisterInfo {
    fn reserved_registers(&self) -> &'static [Z80Reg] {
        registers::reserved_registers()
    }

    fn callee_saved_registers(&self) -> &'static [Z80Reg] {
        registers::callee_saved_registers()
    }

    fn sub_register(&self, reg: Z80Reg, part: SubRegPart) -> CodegenResult<Z80Reg> {
        registers::sub_register(reg, part)
    }
}

impl TargetInstrInfo for Z80InstrInfo {
    fn copy_phys_reg<'a>(&self, dst: Z80Reg, src: Z80Reg) -> CodegenResult<Vec<MachineInst<'a>>> {
        Z80InstrInfo::copy_phys_reg(dst, src)
    }

    fn analyze_branch(
        &self,
        func: &mut MachineFunction<'_>,
        block: BlockId,
        allow_modify: bool,
    ) -> CodegenResult<Option<BranchAnalysis>> {
        Z80InstrInfo::analyze_branch(func, block, allow_modify)
    }

    fn remove_branch(&self, block: &mut MachineBlock<'_>) -> usize {
        Z80InstrInfo::remove_branch(block)
    }

    fn insert_branch<'a>(
        &self,
        block: &mut MachineBlock<'a>,
        target: BlockId,
        false_target: Option<BlockId>,
        cond: Option<CondCode>,
    ) -> CodegenResult<usize> {
        Z80InstrInfo::insert_branch(block, target, false_target, cond)
    }
}

impl FrameInfo for Z80FrameLowering {
    fn has_frame_pointer(&self, func: &MachineFunction<'_>) -> bool {
        Z80FrameLowering::has_frame_pointer(func)
    }

    fn emit_prologue(&self, func: &mut MachineFunction<'_>) -> CodegenResult<()> {
        Z80FrameLowering::emit_prologue(func)
    }

    fn emit_epilogue(&self, func: &mut MachineFunction<'_>, block: BlockId) -> CodegenResult<()> {
        Z80FrameLowering::emit_epilogue(func, block)
    }

    fn eliminate_frame_indices(&self, func: &mut MachineFunction<'_>) -> CodegenResult<()> {
        Z80FrameLowering::eliminate_frame_indices(func)
    }

    fn eliminate_call_frame_pseudos(&self, func: &mut MachineFunction<'_>) -> CodegenResult<()> {
        Z80FrameLowering::eliminate_call_frame_pseudos(func)
    }
}

impl LoweringInfo for Z80Lowering {
    fn legalize<'a>(
        &self,
        session: &CodegenSession<'a>,
        func: &IrFunction<'a>,
    ) -> CodegenResult<IrFunction<'a>> {
        Z80Lowering::legalize(self, session, func)
    }
}

static REGISTER_INFO: Z80RegisterInfo = Z80RegisterInfo;
static INSTR_INFO: Z80InstrInfo = Z80InstrInfo;
static FRAME_LOWERING: Z80FrameLowering = Z80FrameLowering;
static LOWERING: Z80Lowering = Z80Lowering {
    allow_unaligned_wide_access: false,
};

/// The Z80 target descriptor.
pub fn target() -> Target {
    Target {
        name: "z80",
        registers: &REGISTER_INFO,
        instrs: &INSTR_INFO,
        frames: &FRAME_LOWERING,
        lowering: &LOWERING,
    }
}
