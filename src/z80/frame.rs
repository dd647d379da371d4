// This module implements Z80 frame lowering. The prologue saves the IX frame base,
// lowers it by the frame size and copies it into the stack pointer; the epilogue
// mirrors that sequence before the return and restores IX. Both skip an existing
// callee-save push/pop sequence and are omitted entirely for zero-size frames. Frame
// indices resolve to IX-relative displacements with `offset + stack_size + 2`, the +2
// covering the saved base register; the result must fit the signed 8-bit indexed
// addressing range. The dedicated-frame-pointer paths (frame-pointer elimination
// disabled, variable-sized objects, frame address taken) are explicit unsupported
// errors, as are the non-reserved and callee-cleanup cases of call-frame pseudo
// elimination; the common reserved case simply deletes the markers.

//! Stack frame lowering: prologue/epilogue emission and frame-index
//! resolution.

use crate::core::error::{CodegenError, CodegenResult};
use crate::mir::{
    BlockId, FrameLayout, MachineFunction, MachineInst, MemBase, Opcode, Operand, Reg,
};
use crate::z80::registers::Z80Reg;

/// Z80 frame lowering.
pub struct Z80FrameLowering;

impl Z80FrameLowering {
    /// Whether the function needs a dedicated frame-pointer base.
    pub fn has_frame_pointer(func: &MachineFunction<'_>) -> bool {
        func.disable_fp_elim
            || func.frame.has_var_sized_objects()
            || func.frame.is_frame_address_taken()
    }

    /// Whether call-frame space is reserved ahead of time.
    pub fn has_reserved_call_frame(func: &MachineFunction<'_>) -> bool {
        !func.frame.has_var_sized_objects()
    }

    /// Emit the function prologue into the entry block.
    ///
    /// The sequence is inserted after any existing callee-save push
    /// instructions and skipped entirely for zero-size frames:
    /// `push ix; ld ix, -size; add ix, sp; ld sp, ix`.
    pub fn emit_prologue(func: &mut MachineFunction<'_>) -> CodegenResult<()> {
        if Self::has_frame_pointer(func) {
            return Err(CodegenError::Unimplemented {
                feature: "frame-pointer-based prologue",
            });
        }
        let size = func.frame.stack_size();
        if size == 0 {
            return Ok(());
        }
        log::debug!("emitting prologue for {} ({} bytes)", func.name, size);

        let entry = func.entry_block()?;
        let block = func.block_mut(entry)?;
        // Skip the callee-saved push instructions.
        let mut at = 0;
        while at < block.insts.len() && block.insts[at].opcode == Opcode::Push16r {
            at += 1;
        }

        let ix = Operand::Reg(Reg::Phys(Z80Reg::IX));
        let sp = Operand::Reg(Reg::Phys(Z80Reg::SP));
        let seq = [
            MachineInst::new(Opcode::Push16r, vec![ix]),
            MachineInst::new(Opcode::Ld16ri, vec![ix, Operand::Imm(-(size as i64))]),
            MachineInst::new(Opcode::Add16rr, vec![ix, ix, sp]),
            MachineInst::new(Opcode::Ld16rr, vec![sp, ix]),
        ];
        for (i, inst) in seq.into_iter().enumerate() {
            block.insts.insert(at + i, inst);
        }
        Ok(())
    }

    /// Emit the function epilogue into a returning block.
    ///
    /// The mirror sequence `ld ix, size; add ix, sp; ld sp, ix; pop ix` is
    /// inserted before the return, skipping over trailing callee-save pops.
    pub fn emit_epilogue(func: &mut MachineFunction<'_>, block: BlockId) -> CodegenResult<()> {
        if Self::has_frame_pointer(func) {
            return Err(CodegenError::Unimplemented {
                feature: "frame-pointer-based epilogue",
            });
        }
        let size = func.frame.stack_size();
        let name = func.name;
        let blk = func.block_mut(block)?;

        let ret_pos = blk
            .last_non_debug()
            .ok_or_else(|| CodegenError::internal("epilogue requested for an empty block"))?;
        if blk.insts[ret_pos].opcode != Opcode::Ret {
            return Err(CodegenError::internal(
                "can only insert epilogue into returning blocks",
            ));
        }
        if size == 0 {
            return Ok(());
        }
        log::debug!("emitting epilogue for {} ({} bytes)", name, size);

        // Skip the callee-saved pop instructions.
        let mut at = ret_pos;
        while at > 0 && blk.insts[at - 1].opcode == Opcode::Pop16r {
            at -= 1;
        }

        let ix = Operand::Reg(Reg::Phys(Z80Reg::IX));
        let sp = Operand::Reg(Reg::Phys(Z80Reg::SP));
        let seq = [
            MachineInst::new(Opcode::Ld16ri, vec![ix, Operand::Imm(size as i64)]),
            MachineInst::new(Opcode::Add16rr, vec![ix, ix, sp]),
            MachineInst::new(Opcode::Ld16rr, vec![sp, ix]),
            MachineInst::new(Opcode::Pop16r, vec![ix]),
        ];
        for (i, inst) in seq.into_iter().enumerate() {
            blk.insts.insert(at + i, inst);
        }
        Ok(())
    }

    /// Resolve an abstract frame-index operand to an IX-relative
    /// displacement: `object offset + stack size + 2`, the +2 accounting for
    /// the base register pushed in the prologue.
    ///
    /// Any nonzero incoming stack adjustment is a contract violation;
    /// adjustments must already be resolved at this point.
    pub fn eliminate_frame_index(
        frame: &FrameLayout,
        has_fp: bool,
        inst: &mut MachineInst<'_>,
        sp_adj: i32,
    ) -> CodegenResult<()> {
        if sp_adj != 0 {
            return Err(CodegenError::internal(format!(
                "unexpected stack adjustment {} during frame-index elimination",
                sp_adj
            )));
        }
        if has_fp {
            return Err(CodegenError::Unimplemented {
                feature: "frame-pointer-based frame-index resolution",
            });
        }

        let operand = inst
            .operands
            .iter_mut()
            .find(|o| matches!(o, Operand::Mem { base: MemBase::Frame(_), .. }))
            .ok_or_else(|| {
                CodegenError::internal("instruction has no frame-index operand")
            })?;
        let Operand::Mem {
            base: MemBase::Frame(index),
            disp,
        } = *operand
        else {
            unreachable!();
        };

        let offset = frame.object_offset(index)? + frame.stack_size() as i32 + 2 + disp as i32;
        if offset < i8::MIN as i32 || offset > i8::MAX as i32 {
            return Err(CodegenError::DisplacementOutOfRange {
                index: index.0,
                disp: offset,
            });
        }
        *operand = Operand::mem_reg(Reg::Phys(Z80Reg::IX), offset as i16);
        Ok(())
    }

    /// Resolve every frame-index operand in the function.
    pub fn eliminate_frame_indices(func: &mut MachineFunction<'_>) -> CodegenResult<()> {
        let has_fp = Self::has_frame_pointer(func);
        let frame = func.frame.clone();
        for block in func.blocks_mut() {
            for inst in &mut block.insts {
                let has_frame_operand = inst
                    .operands
                    .iter()
                    .any(|o| matches!(o, Operand::Mem { base: MemBase::Frame(_), .. }));
                if has_frame_operand {
                    Self::eliminate_frame_index(&frame, has_fp, inst, 0)?;
                }
            }
        }
        Ok(())
    }

    /// Delete the call-frame pseudo markers.
    ///
    /// Only the common case is supported: call-frame space reserved ahead of
    /// time and no callee-cleanup amount to synthesize.
    pub fn eliminate_call_frame_pseudos(func: &mut MachineFunction<'_>) -> CodegenResult<()> {
        let reserved = Self::has_reserved_call_frame(func);
        for block in func.blocks_mut() {
            for inst in &block.insts {
                match inst.opcode {
                    Opcode::AdjCallStackDown | Opcode::AdjCallStackUp => {
                        if !reserved {
                            return Err(CodegenError::Unimplemented {
                                feature: "dynamic call-frame adjustment",
                            });
                        }
                        if inst.opcode == Opcode::AdjCallStackUp
                            && inst.operands.get(1) != Some(&Operand::Imm(0))
                        {
                            return Err(CodegenError::Unimplemented {
                                feature: "callee-cleanup stack adjustment",
                            });
                        }
                    }
                    _ => {}
                }
            }
            block.insts.retain(|i| {
                !matches!(
                    i.opcode,
                    Opcode::AdjCallStackDown | Opcode::AdjCallStackUp
                )
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::FrameIndex;

    fn returning_function<'a>(frame_bytes: u32) -> MachineFunction<'a> {
        let mut f = MachineFunction::new("f");
        let entry = f.create_block();
        if frame_bytes > 0 {
            f.frame.create_object(frame_bytes);
        }
        f.block_mut(entry)
            .unwrap()
            .push(MachineInst::new(Opcode::Ret, vec![]));
        f
    }

    #[test]
    fn test_prologue_sequence() {
        let mut f = returning_function(4);
        Z80FrameLowering::emit_prologue(&mut f).unwrap();

        let entry = f.entry_block().unwrap();
        let insts = &f.block(entry).unwrap().insts;
        let opcodes: Vec<_> = insts.iter().map(|i| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                Opcode::Push16r,
                Opcode::Ld16ri,
                Opcode::Add16rr,
                Opcode::Ld16rr,
                Opcode::Ret
            ]
        );
        // push ix; ld ix, -4; add ix, sp; ld sp, ix
        assert_eq!(insts[0].operands[0], Operand::Reg(Reg::Phys(Z80Reg::IX)));
        assert_eq!(insts[1].operands[1], Operand::Imm(-4));
        assert_eq!(insts[2].operands[2], Operand::Reg(Reg::Phys(Z80Reg::SP)));
        assert_eq!(insts[3].operands[0], Operand::Reg(Reg::Phys(Z80Reg::SP)));
    }

    #[test]
    fn test_prologue_skipped_for_empty_frame() {
        let mut f = returning_function(0);
        Z80FrameLowering::emit_prologue(&mut f).unwrap();
        let entry = f.entry_block().unwrap();
        assert_eq!(f.block(entry).unwrap().insts.len(), 1);
    }

    #[test]
    fn test_prologue_inserts_after_callee_save_pushes() {
        let mut f = returning_function(2);
        let entry = f.entry_block().unwrap();
        f.block_mut(entry).unwrap().insts.insert(
            0,
            MachineInst::new(Opcode::Push16r, vec![Operand::Reg(Reg::Phys(Z80Reg::BC))]),
        );
        Z80FrameLowering::emit_prologue(&mut f).unwrap();

        let insts = &f.block(entry).unwrap().insts;
        // The existing push stays first; the frame setup follows it.
        assert_eq!(insts[0].operands[0], Operand::Reg(Reg::Phys(Z80Reg::BC)));
        assert_eq!(insts[1].opcode, Opcode::Push16r);
        assert_eq!(insts[1].operands[0], Operand::Reg(Reg::Phys(Z80Reg::IX)));
    }

    #[test]
    fn test_epilogue_sequence() {
        let mut f = returning_function(6);
        let entry = f.entry_block().unwrap();
        Z80FrameLowering::emit_epilogue(&mut f, entry).unwrap();

        let insts = &f.block(entry).unwrap().insts;
        let opcodes: Vec<_> = insts.iter().map(|i| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![
                Opcode::Ld16ri,
                Opcode::Add16rr,
                Opcode::Ld16rr,
                Opcode::Pop16r,
                Opcode::Ret
            ]
        );
        assert_eq!(insts[0].operands[1], Operand::Imm(6));
        assert_eq!(insts[3].operands[0], Operand::Reg(Reg::Phys(Z80Reg::IX)));
    }

    #[test]
    fn test_epilogue_skips_trailing_pops() {
        let mut f = returning_function(2);
        let entry = f.entry_block().unwrap();
        {
            let blk = f.block_mut(entry).unwrap();
            blk.insts.insert(
                0,
                MachineInst::new(Opcode::Pop16r, vec![Operand::Reg(Reg::Phys(Z80Reg::BC))]),
            );
        }
        Z80FrameLowering::emit_epilogue(&mut f, entry).unwrap();

        let insts = &f.block(entry).unwrap().insts;
        // Frame teardown lands before the callee-save pop.
        assert_eq!(insts[0].opcode, Opcode::Ld16ri);
        assert_eq!(insts[3].opcode, Opcode::Pop16r);
        assert_eq!(insts[3].operands[0], Operand::Reg(Reg::Phys(Z80Reg::IX)));
        assert_eq!(insts[4].opcode, Opcode::Pop16r);
        assert_eq!(insts[4].operands[0], Operand::Reg(Reg::Phys(Z80Reg::BC)));
        assert_eq!(insts[5].opcode, Opcode::Ret);
    }

    #[test]
    fn test_epilogue_requires_return() {
        let mut f = MachineFunction::new("f");
        let b = f.create_block();
        f.frame.create_object(2);
        f.block_mut(b)
            .unwrap()
            .push(MachineInst::new(Opcode::Jp, vec![Operand::Block(b)]));
        let err = Z80FrameLowering::emit_epilogue(&mut f, b).unwrap_err();
        assert!(matches!(err, CodegenError::Internal { .. }));
    }

    #[test]
    fn test_frame_pointer_paths_are_unimplemented() {
        let mut f = returning_function(2);
        f.disable_fp_elim = true;
        assert!(matches!(
            Z80FrameLowering::emit_prologue(&mut f),
            Err(CodegenError::Unimplemented { .. })
        ));
        let entry = f.entry_block().unwrap();
        assert!(matches!(
            Z80FrameLowering::emit_epilogue(&mut f, entry),
            Err(CodegenError::Unimplemented { .. })
        ));

        let mut g = returning_function(2);
        g.frame.set_has_var_sized_objects();
        assert!(Z80FrameLowering::has_frame_pointer(&g));

        let mut h = returning_function(2);
        h.frame.set_frame_address_taken();
        assert!(Z80FrameLowering::has_frame_pointer(&h));
    }

    #[test]
    fn test_frame_index_resolution_formula() {
        // Object at offset k in a frame of size S resolves to k + S + 2.
        let mut frame = FrameLayout::new();
        let a = frame.create_object(2); // offset -2
        let b = frame.create_object(2); // offset -4, S = 4

        let mut inst = MachineInst::new(
            Opcode::Ld8rm,
            vec![
                Operand::Reg(Reg::Phys(Z80Reg::A)),
                Operand::frame(a, 0),
            ],
        );
        Z80FrameLowering::eliminate_frame_index(&frame, false, &mut inst, 0).unwrap();
        assert_eq!(
            inst.operands[1],
            Operand::mem_reg(Reg::Phys(Z80Reg::IX), -2 + 4 + 2)
        );

        let mut inst = MachineInst::new(
            Opcode::Ld8rm,
            vec![
                Operand::Reg(Reg::Phys(Z80Reg::A)),
                Operand::frame(b, 1),
            ],
        );
        Z80FrameLowering::eliminate_frame_index(&frame, false, &mut inst, 0).unwrap();
        // Existing displacement is added on top of the resolved offset.
        assert_eq!(
            inst.operands[1],
            Operand::mem_reg(Reg::Phys(Z80Reg::IX), -4 + 4 + 2 + 1)
        );
    }

    #[test]
    fn test_frame_index_displacement_boundary() {
        // 123 bytes of locals: first object resolves to -123 + 123 + 2 = 2,
        // and the deepest reachable displacement stays in the signed range.
        let mut frame = FrameLayout::new();
        let first = frame.create_object(123);
        let mut inst = MachineInst::new(
            Opcode::Ld8rm,
            vec![
                Operand::Reg(Reg::Phys(Z80Reg::A)),
                Operand::frame(first, 125),
            ],
        );
        Z80FrameLowering::eliminate_frame_index(&frame, false, &mut inst, 0).unwrap();
        assert_eq!(
            inst.operands[1],
            Operand::mem_reg(Reg::Phys(Z80Reg::IX), 127)
        );

        // One byte beyond the representable limit aborts.
        let mut inst = MachineInst::new(
            Opcode::Ld8rm,
            vec![
                Operand::Reg(Reg::Phys(Z80Reg::A)),
                Operand::frame(first, 126),
            ],
        );
        let err =
            Z80FrameLowering::eliminate_frame_index(&frame, false, &mut inst, 0).unwrap_err();
        assert!(matches!(err, CodegenError::DisplacementOutOfRange { .. }));
    }

    #[test]
    fn test_nonzero_stack_adjustment_is_fatal() {
        let mut frame = FrameLayout::new();
        let a = frame.create_object(2);
        let mut inst = MachineInst::new(
            Opcode::Ld8rm,
            vec![Operand::Reg(Reg::Phys(Z80Reg::A)), Operand::frame(a, 0)],
        );
        let err =
            Z80FrameLowering::eliminate_frame_index(&frame, false, &mut inst, 2).unwrap_err();
        assert!(matches!(err, CodegenError::Internal { .. }));
    }

    #[test]
    fn test_frame_pointer_index_resolution_is_unimplemented() {
        let mut frame = FrameLayout::new();
        let a = frame.create_object(2);
        let mut inst = MachineInst::new(
            Opcode::Ld8rm,
            vec![Operand::Reg(Reg::Phys(Z80Reg::A)), Operand::frame(a, 0)],
        );
        let err =
            Z80FrameLowering::eliminate_frame_index(&frame, true, &mut inst, 0).unwrap_err();
        assert!(matches!(err, CodegenError::Unimplemented { .. }));
    }

    #[test]
    fn test_call_frame_pseudo_elimination() {
        let mut f = MachineFunction::new("f");
        let b = f.create_block();
        {
            let blk = f.block_mut(b).unwrap();
            blk.push(MachineInst::new(
                Opcode::AdjCallStackDown,
                vec![Operand::Imm(2)],
            ));
            blk.push(MachineInst::new(Opcode::Call, vec![Operand::Sym("g")]));
            blk.push(MachineInst::new(
                Opcode::AdjCallStackUp,
                vec![Operand::Imm(2), Operand::Imm(0)],
            ));
            blk.push(MachineInst::new(Opcode::Ret, vec![]));
        }
        Z80FrameLowering::eliminate_call_frame_pseudos(&mut f).unwrap();
        let opcodes: Vec<_> = f.block(b).unwrap().insts.iter().map(|i| i.opcode).collect();
        assert_eq!(opcodes, vec![Opcode::Call, Opcode::Ret]);
    }

    #[test]
    fn test_callee_cleanup_is_unimplemented() {
        let mut f = MachineFunction::new("f");
        let b = f.create_block();
        f.block_mut(b).unwrap().push(MachineInst::new(
            Opcode::AdjCallStackUp,
            vec![Operand::Imm(2), Operand::Imm(2)],
        ));
        let err = Z80FrameLowering::eliminate_call_frame_pseudos(&mut f).unwrap_err();
        assert!(matches!(err, CodegenError::Unimplemented { .. }));
    }

    #[test]
    fn test_unreserved_call_frame_is_unimplemented() {
        let mut f = MachineFunction::new("f");
        let b = f.create_block();
        f.frame.set_has_var_sized_objects();
        f.block_mut(b).unwrap().push(MachineInst::new(
            Opcode::AdjCallStackDown,
            vec![Operand::Imm(0)],
        ));
        let err = Z80FrameLowering::eliminate_call_frame_pseudos(&mut f).unwrap_err();
        assert!(matches!(err, CodegenError::Unimplemented { .. }));
    }
}
