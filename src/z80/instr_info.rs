// This module carries the per-instruction knowledge the generic passes call into:
// physical register-to-register copies (8-bit moves, 16-bit pairs as two half moves,
// index registers as whole-unit push/pop because their halves are not addressable)
// and the branch rewriter. Branch analysis scans a block from the end, skipping
// debug-only entries; a non-branch terminator is reported as unanalyzable so callers
// leave that block's terminators alone, a second conditional terminator is an
// unimplemented three-way shape, and under allow_modify dead code after an
// unconditional jump and jumps to the immediately following block are deleted. All
// mutation is two-phase: the terminator suffix is analyzed first, then replaced in
// one step, so no live instruction list is edited mid-iteration.

//! Register copies and branch analysis/rewriting.

use crate::core::error::{CodegenError, CodegenResult};
use crate::mir::{BlockId, CondCode, MachineBlock, MachineFunction, MachineInst, Opcode, Operand, Reg};
use crate::z80::registers::{sub_register, RegClass, SubRegPart, Z80Reg};

/// Result of analyzing a block's terminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchAnalysis {
    /// No terminators; control falls through in layout order.
    Fallthrough,
    Unconditional { target: BlockId },
    Conditional {
        cond: CondCode,
        target: BlockId,
        /// Explicit false-side jump, when control does not simply fall through.
        fallthrough: Option<BlockId>,
    },
}

/// Z80 instruction information.
pub struct Z80InstrInfo;

impl Z80InstrInfo {
    /// Build the instruction sequence copying `src` into `dst`.
    ///
    /// 16-bit general pairs copy as two 8-bit half moves; copies involving an
    /// index register move the whole unit through the stack. Any other class
    /// combination is impossible on this machine.
    pub fn copy_phys_reg<'a>(dst: Z80Reg, src: Z80Reg) -> CodegenResult<Vec<MachineInst<'a>>> {
        if RegClass::GR8.contains(dst) && RegClass::GR8.contains(src) {
            return Ok(vec![MachineInst::new(
                Opcode::Ld8rr,
                vec![Operand::Reg(Reg::Phys(dst)), Operand::Reg(Reg::Phys(src))],
            )]);
        }
        if RegClass::GR16.contains(dst) && RegClass::GR16.contains(src) {
            if !dst.is_index() && !src.is_index() {
                let lo = MachineInst::new(
                    Opcode::Ld8rr,
                    vec![
                        Operand::Reg(Reg::Phys(sub_register(dst, SubRegPart::Low)?)),
                        Operand::Reg(Reg::Phys(sub_register(src, SubRegPart::Low)?)),
                    ],
                );
                let hi = MachineInst::new(
                    Opcode::Ld8rr,
                    vec![
                        Operand::Reg(Reg::Phys(sub_register(dst, SubRegPart::High)?)),
                        Operand::Reg(Reg::Phys(sub_register(src, SubRegPart::High)?)),
                    ],
                );
                return Ok(vec![lo, hi]);
            }
            return Ok(vec![
                MachineInst::new(Opcode::Push16r, vec![Operand::Reg(Reg::Phys(src))]),
                MachineInst::new(Opcode::Pop16r, vec![Operand::Reg(Reg::Phys(dst))]),
            ]);
        }
        Err(CodegenError::InvalidRegCopy {
            src: src.name(),
            dst: dst.name(),
        })
    }

    /// Analyze (and under `allow_modify` simplify) a block's terminators.
    ///
    /// `Ok(None)` means the control flow could not be analyzed; callers must
    /// leave this block's terminators unchanged. Successor sets are not
    /// touched: a deleted fallthrough jump keeps its successor edge.
    pub fn analyze_branch(
        func: &mut MachineFunction<'_>,
        block: BlockId,
        allow_modify: bool,
    ) -> CodegenResult<Option<BranchAnalysis>> {
        let next = func.next_in_layout(block);

        // Phase one: read-only scan of the terminator suffix from the end,
        // skipping debug-only entries, stopping at the first non-terminator.
        let mut suffix = Vec::new();
        {
            let blk = func.block(block)?;
            for (pos, inst) in blk.insts.iter().enumerate().rev() {
                if inst.is_debug() {
                    continue;
                }
                if !inst.is_terminator() {
                    break;
                }
                if !inst.is_branch() {
                    return Ok(None);
                }
                suffix.push(pos);
            }
        }
        suffix.reverse();

        let mut cond: Option<(CondCode, BlockId)> = None;
        let mut uncond: Option<BlockId> = None;
        let mut dead_after: Option<usize> = None;
        {
            let blk = func.block(block)?;
            for &pos in &suffix {
                let inst = &blk.insts[pos];
                match inst.opcode {
                    Opcode::Jp => {
                        let Some(Operand::Block(target)) = inst.operands.first() else {
                            return Err(CodegenError::internal("jump without a target operand"));
                        };
                        uncond = Some(*target);
                        dead_after = Some(pos);
                        break; // everything after is dead code
                    }
                    Opcode::Jpcc => {
                        if cond.is_some() {
                            return Err(CodegenError::Unimplemented {
                                feature: "three-way branch analysis",
                            });
                        }
                        let (Some(Operand::Cond(cc)), Some(Operand::Block(target))) =
                            (inst.operands.first(), inst.operands.get(1))
                        else {
                            return Err(CodegenError::internal(
                                "conditional jump with malformed operands",
                            ));
                        };
                        cond = Some((*cc, *target));
                    }
                    _ => unreachable!("suffix contains only branches"),
                }
            }
        }

        // Phase two: apply the computed edits in one step.
        if allow_modify {
            let blk = func.block_mut(block)?;
            if let Some(pos) = dead_after {
                if pos + 1 < blk.insts.len() {
                    log::trace!(
                        "deleting {} dead instructions after jump in block {}",
                        blk.insts.len() - pos - 1,
                        block.0
                    );
                    blk.insts.truncate(pos + 1);
                }
            }
            if uncond.is_some() && uncond == next {
                // Pure fallthrough: the jump to the next block goes away.
                blk.insts.pop();
                uncond = None;
            }
        }

        Ok(Some(match (cond, uncond) {
            (None, None) => BranchAnalysis::Fallthrough,
            (None, Some(target)) => BranchAnalysis::Unconditional { target },
            (Some((cond, target)), fallthrough) => BranchAnalysis::Conditional {
                cond,
                target,
                fallthrough,
            },
        }))
    }

    /// Strip trailing jump instructions, returning how many were removed.
    /// Debug-only entries are skipped; the first other non-jump instruction
    /// stops the scan.
    pub fn remove_branch(block: &mut MachineBlock<'_>) -> usize {
        let mut removed = 0;
        let mut i = block.insts.len();
        while i > 0 {
            i -= 1;
            if block.insts[i].is_debug() {
                continue;
            }
            if !block.insts[i].is_branch() {
                break;
            }
            block.insts.remove(i);
            removed += 1;
        }
        removed
    }

    /// Synthesize the minimal terminator sequence for the given edges and
    /// return how many instructions were inserted.
    ///
    /// With no condition a single jump is emitted and supplying a second
    /// target is a contract violation; with a condition, a conditional jump
    /// to `target` is followed by an unconditional jump to `false_target`
    /// when control does not simply fall through.
    pub fn insert_branch<'a>(
        block: &mut MachineBlock<'a>,
        target: BlockId,
        false_target: Option<BlockId>,
        cond: Option<CondCode>,
    ) -> CodegenResult<usize> {
        // Compute the new terminator list first, then append it atomically.
        let mut seq: Vec<MachineInst<'a>> = Vec::new();
        match cond {
            None => {
                if false_target.is_some() {
                    return Err(CodegenError::internal(
                        "unconditional branch with a second target",
                    ));
                }
                seq.push(MachineInst::new(Opcode::Jp, vec![Operand::Block(target)]));
            }
            Some(cc) => {
                seq.push(MachineInst::new(
                    Opcode::Jpcc,
                    vec![Operand::Cond(cc), Operand::Block(target)],
                ));
                if let Some(false_target) = false_target {
                    seq.push(MachineInst::new(
                        Opcode::Jp,
                        vec![Operand::Block(false_target)],
                    ));
                }
            }
        }
        let count = seq.len();
        block.insts.extend(seq);
        block.add_successor(target);
        if let Some(false_target) = false_target {
            block.add_successor(false_target);
        }
        Ok(count)
    }
}
