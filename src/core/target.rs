// This module defines the capability seams a target architecture plugs into the
// generic passes: register information, instruction information (copies and branch
// rewriting), frame information, and lowering rules. Each capability is an explicit
// trait; a Target composes one implementation of each, and a TargetRegistry holds the
// process-wide set of targets with explicit init-once/lookup-by-name semantics. The
// registry is populated by initialize_targets rather than by static constructors, so
// target availability is visible and testable.

//! Target capability traits and the target registry.

use hashbrown::HashMap;

use crate::core::error::CodegenResult;
use crate::core::ir::IrFunction;
use crate::core::session::CodegenSession;
use crate::mir::{BlockId, CondCode, MachineBlock, MachineFunction, MachineInst};
use crate::z80::instr_info::BranchAnalysis;
use crate::z80::registers::{SubRegPart, Z80Reg};

/// Register identities, classes and sub-register structure.
pub trait RegisterInfo: Sync {
    /// Registers never allocatable as general-purpose operands.
    fn reserved_registers(&self) -> &'static [Z80Reg];

    /// Registers the convention preserves across calls.
    fn callee_saved_registers(&self) -> &'static [Z80Reg];

    /// Low/high 8-bit identity of a 16-bit pair; fatal on index registers.
    fn sub_register(&self, reg: Z80Reg, part: SubRegPart) -> CodegenResult<Z80Reg>;
}

/// Per-instruction knowledge: copies and branch rewriting.
pub trait TargetInstrInfo: Sync {
    fn copy_phys_reg<'a>(&self, dst: Z80Reg, src: Z80Reg) -> CodegenResult<Vec<MachineInst<'a>>>;

    fn analyze_branch(
        &self,
        func: &mut MachineFunction<'_>,
        block: BlockId,
        allow_modify: bool,
    ) -> CodegenResult<Option<BranchAnalysis>>;

    fn remove_branch(&self, block: &mut MachineBlock<'_>) -> usize;

    fn insert_branch<'a>(
        &self,
        block: &mut MachineBlock<'a>,
        target: BlockId,
        false_target: Option<BlockId>,
        cond: Option<CondCode>,
    ) -> CodegenResult<usize>;
}

/// Stack frame layout and lowering.
pub trait FrameInfo: Sync {
    fn has_frame_pointer(&self, func: &MachineFunction<'_>) -> bool;

    fn emit_prologue(&self, func: &mut MachineFunction<'_>) -> CodegenResult<()>;

    fn emit_epilogue(&self, func: &mut MachineFunction<'_>, block: BlockId) -> CodegenResult<()>;

    fn eliminate_frame_indices(&self, func: &mut MachineFunction<'_>) -> CodegenResult<()>;

    fn eliminate_call_frame_pseudos(&self, func: &mut MachineFunction<'_>) -> CodegenResult<()>;
}

/// Operation legalization rules.
pub trait LoweringInfo: Sync {
    fn legalize<'a>(
        &self,
        session: &CodegenSession<'a>,
        func: &IrFunction<'a>,
    ) -> CodegenResult<IrFunction<'a>>;
}

/// One target architecture: a name plus one implementation of each
/// capability.
pub struct Target {
    pub name: &'static str,
    pub registers: &'static dyn RegisterInfo,
    pub instrs: &'static dyn TargetInstrInfo,
    pub frames: &'static dyn FrameInfo,
    pub lowering: &'static dyn LoweringInfo,
}

/// Process-wide set of targets with explicit initialization.
#[derive(Default)]
pub struct TargetRegistry {
    targets: HashMap<&'static str, Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: Target) {
        log::debug!("registering target {}", target.name);
        self.targets.insert(target.name, target);
    }

    pub fn lookup(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.targets.keys().copied()
    }
}

/// Register every built-in target. Call once at startup.
pub fn initialize_targets(registry: &mut TargetRegistry) {
    registry.register(crate::z80::target());
}
