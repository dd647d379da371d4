// This module matches legalized operation nodes against concrete Z80 instruction
// templates. Address-mode recognition special-cases a bare register value, an add/or
// of a stack-local reference and a constant (frame base plus displacement), and a bare
// stack-local reference; global addresses must already be wrapped and select as
// immediate/extended addressing instead of register-indirect. ALU operations emit the
// machine's two-address accumulator forms (copy, then operate). Calls lower through
// the calling-convention assigner with call-frame markers around the argument moves,
// and the SELECT8 pseudo expands into diamond control flow with a block-level phi
// join. Any operation with no template here is a fatal internal error: the legalizer
// is exhaustive for every reachable node shape.

//! Instruction selection: legalized nodes to machine instructions.

use crate::core::error::{CodegenError, CodegenResult};
use crate::core::ir::{BinaryOp, IrFunction, NodeId, Op, ShiftOp, ValueType};
use crate::core::session::CodegenSession;
use crate::mir::{
    BlockId, FrameIndex, MachineFunction, MachineInst, MemBase, Opcode, Operand, Reg,
};
use crate::z80::calling_convention::{analyze_arguments, analyze_returns, ArgLocation, Direction};
use crate::z80::registers::{RegClass, Z80Reg};

/// Select machine instructions for an entire legalized function.
pub fn select_function<'a>(
    session: &CodegenSession<'a>,
    ir: &IrFunction<'a>,
) -> CodegenResult<MachineFunction<'a>> {
    session.set_current_function(ir.name);
    log::debug!("selecting function {}", ir.name);

    let mut sel = Selector {
        session,
        ir,
        mf: MachineFunction::new(ir.name),
        values: vec![None; ir.node_count()],
        frame_slots: vec![None; ir.node_count()],
        cur: BlockId(0),
    };

    for _ in 0..ir.block_count() {
        sel.mf.create_block();
    }

    sel.lower_formal_arguments()?;

    for block in ir.block_ids() {
        sel.cur = BlockId(block.0);
        for &node in &ir.block(block)?.nodes {
            sel.select_node(node)?;
        }
    }

    expand_select_pseudos(&mut sel.mf)?;
    session.record_function_selected(ir.name);
    Ok(sel.mf)
}

struct Selector<'s, 'a> {
    session: &'s CodegenSession<'a>,
    ir: &'s IrFunction<'a>,
    mf: MachineFunction<'a>,
    values: Vec<Option<Reg>>,
    frame_slots: Vec<Option<FrameIndex>>,
    cur: BlockId,
}

impl<'s, 'a> Selector<'s, 'a> {
    fn emit(&mut self, inst: MachineInst<'a>) -> CodegenResult<()> {
        self.session.record_instruction_selected();
        self.mf.block_mut(self.cur)?.push(inst);
        Ok(())
    }

    fn emit_to(&mut self, block: BlockId, inst: MachineInst<'a>) -> CodegenResult<()> {
        self.session.record_instruction_selected();
        self.mf.block_mut(block)?.push(inst);
        Ok(())
    }

    /// Define the value of `node` in a fresh virtual register.
    fn def_reg(&mut self, node: NodeId, class: RegClass) -> Reg {
        let reg = self.mf.new_vreg(class);
        self.values[node.0 as usize] = Some(reg);
        reg
    }

    fn class_for(ty: ValueType) -> RegClass {
        if ty.is_wide() {
            RegClass::GR16
        } else {
            RegClass::GR8
        }
    }

    /// Register holding `node`, materializing constants and wrapped symbols
    /// on first use.
    fn use_reg(&mut self, node: NodeId) -> CodegenResult<Reg> {
        if let Some(reg) = self.values[node.0 as usize] {
            return Ok(reg);
        }
        let ir_node = self.ir.node(node);
        match ir_node.op {
            Op::Const(c) => {
                let wide = ir_node.ty.is_wide();
                let reg = self.def_reg(node, Self::class_for(ir_node.ty));
                let opcode = if wide { Opcode::Ld16ri } else { Opcode::Ld8ri };
                self.emit(MachineInst::new(
                    opcode,
                    vec![Operand::Reg(reg), Operand::Imm(c)],
                ))?;
                Ok(reg)
            }
            Op::Wrapper { sym } => {
                let reg = self.def_reg(node, RegClass::GR16);
                self.emit(MachineInst::new(
                    Opcode::Ld16ri,
                    vec![Operand::Reg(reg), Operand::Sym(sym)],
                ))?;
                Ok(reg)
            }
            Op::FrameSlot { .. } => Err(CodegenError::Unimplemented {
                feature: "taking the address of a frame object",
            }),
            Op::Binary {
                op: BinaryOp::Add | BinaryOp::Or,
                lhs,
                ..
            } if matches!(self.ir.node(lhs).op, Op::FrameSlot { .. }) => {
                Err(CodegenError::Unimplemented {
                    feature: "taking the address of a frame object",
                })
            }
            ref other => Err(CodegenError::internal(format!(
                "node {} ({:?}) has no selected value",
                node.0, other
            ))),
        }
    }

    fn const_of(&self, node: NodeId) -> Option<i64> {
        match self.ir.node(node).op {
            Op::Const(c) => Some(c),
            _ => None,
        }
    }

    fn frame_index(&mut self, node: NodeId) -> CodegenResult<FrameIndex> {
        if let Some(index) = self.frame_slots[node.0 as usize] {
            return Ok(index);
        }
        let Op::FrameSlot { size } = self.ir.node(node).op else {
            return Err(CodegenError::internal(format!(
                "node {} is not a frame slot",
                node.0
            )));
        };
        let index = self.mf.frame.create_object(size);
        self.frame_slots[node.0 as usize] = Some(index);
        Ok(index)
    }

    /// Address-mode recognition for memory operands.
    ///
    /// A bare value selects as a register base with zero displacement; an
    /// add/or of a stack-local reference and a constant selects the frame
    /// index plus that constant; a bare stack-local reference selects the
    /// frame index with zero displacement; anything else defaults to the node
    /// itself as base. A global address reaching this point was not wrapped by
    /// the legalizer and is rejected.
    fn select_addr(&mut self, addr: NodeId) -> CodegenResult<(MemBase<'a>, i16)> {
        match self.ir.node(addr).op {
            Op::Global(_) | Op::Wrapper { .. } => Err(CodegenError::internal(
                "global address must be lowered before address-mode selection",
            )),
            Op::Binary {
                op: BinaryOp::Add | BinaryOp::Or,
                lhs,
                rhs,
            } if self.const_of(rhs).is_some()
                && matches!(self.ir.node(lhs).op, Op::FrameSlot { .. }) =>
            {
                let c = self.const_of(rhs).unwrap();
                let disp = i16::try_from(c).map_err(|_| {
                    CodegenError::internal(format!("displacement {} out of range", c))
                })?;
                let index = self.frame_index(lhs)?;
                Ok((MemBase::Frame(index), disp))
            }
            Op::FrameSlot { .. } => {
                let index = self.frame_index(addr)?;
                Ok((MemBase::Frame(index), 0))
            }
            _ => {
                let base = self.use_reg(addr)?;
                Ok((MemBase::Reg(base), 0))
            }
        }
    }

    /// Memory operand for a load/store: wrapped globals use direct
    /// (extended) addressing, everything else goes through `select_addr`.
    fn mem_operand(&mut self, addr: NodeId) -> CodegenResult<Operand<'a>> {
        if let Op::Wrapper { sym } = self.ir.node(addr).op {
            return Ok(Operand::mem_sym(sym));
        }
        let (base, disp) = self.select_addr(addr)?;
        Ok(Operand::Mem { base, disp })
    }

    fn lower_formal_arguments(&mut self) -> CodegenResult<()> {
        let sig = &self.ir.sig;
        let (locs, _) = analyze_arguments(&sig.args, Direction::Incoming, sig.variadic)?;
        let entry = self.mf.entry_block()?;
        let mut arg_regs = Vec::with_capacity(locs.len());
        for (&ty, loc) in sig.args.iter().zip(&locs) {
            match *loc {
                ArgLocation::Reg(phys) => {
                    let vreg = self.mf.new_vreg(Self::class_for(ty));
                    let opcode = if ty.is_wide() {
                        Opcode::Ld16rr
                    } else {
                        Opcode::Ld8rr
                    };
                    self.emit_to(
                        entry,
                        MachineInst::new(
                            opcode,
                            vec![Operand::Reg(vreg), Operand::Reg(Reg::Phys(phys))],
                        ),
                    )?;
                    arg_regs.push(vreg);
                }
                ArgLocation::Stack { .. } => {
                    return Err(CodegenError::Unimplemented {
                        feature: "stack-located formal arguments",
                    })
                }
            }
        }
        // Bind Arg nodes wherever they appear.
        for block in self.ir.block_ids() {
            for &node in &self.ir.block(block)?.nodes {
                if let Op::Arg(i) = self.ir.node(node).op {
                    let reg = *arg_regs.get(i as usize).ok_or_else(|| {
                        CodegenError::internal(format!("argument index {} out of range", i))
                    })?;
                    self.values[node.0 as usize] = Some(reg);
                }
            }
        }
        Ok(())
    }

    fn lower_call(&mut self, node: NodeId, callee: &'a str, args: &[NodeId]) -> CodegenResult<()> {
        let arg_types: Vec<ValueType> = args.iter().map(|&a| self.ir.node(a).ty).collect();
        let (locs, stack_bytes) = analyze_arguments(&arg_types, Direction::Outgoing, false)?;

        self.emit(MachineInst::new(
            Opcode::AdjCallStackDown,
            vec![Operand::Imm(stack_bytes as i64)],
        ))?;

        // Stack-located arguments store relative to the frame base first;
        // register arguments copy last so the call sees them live.
        let mut reg_moves = Vec::new();
        for (&arg, loc) in args.iter().zip(&locs) {
            let ty = self.ir.node(arg).ty;
            match *loc {
                ArgLocation::Reg(phys) => reg_moves.push((arg, ty, phys)),
                ArgLocation::Stack { offset } => {
                    let base = Reg::Phys(Z80Reg::IX);
                    if ty.is_wide() {
                        let value = self.use_reg(arg)?;
                        let lo = self.mf.new_vreg(RegClass::GR8);
                        self.emit(MachineInst::new(
                            Opcode::ExtLo8,
                            vec![Operand::Reg(lo), Operand::Reg(value)],
                        ))?;
                        self.emit(MachineInst::new(
                            Opcode::Ld8mr,
                            vec![Operand::mem_reg(base, offset as i16), Operand::Reg(lo)],
                        ))?;
                        let hi = self.mf.new_vreg(RegClass::GR8);
                        self.emit(MachineInst::new(
                            Opcode::ExtHi8,
                            vec![Operand::Reg(hi), Operand::Reg(value)],
                        ))?;
                        self.emit(MachineInst::new(
                            Opcode::Ld8mr,
                            vec![Operand::mem_reg(base, offset as i16 + 1), Operand::Reg(hi)],
                        ))?;
                    } else if let Some(c) = self.const_of(arg) {
                        self.emit(MachineInst::new(
                            Opcode::Ld8mi,
                            vec![Operand::mem_reg(base, offset as i16), Operand::Imm(c)],
                        ))?;
                    } else {
                        let value = self.use_reg(arg)?;
                        self.emit(MachineInst::new(
                            Opcode::Ld8mr,
                            vec![Operand::mem_reg(base, offset as i16), Operand::Reg(value)],
                        ))?;
                    }
                }
            }
        }
        for (arg, ty, phys) in reg_moves {
            let dst = Operand::Reg(Reg::Phys(phys));
            if let Some(c) = self.const_of(arg) {
                let opcode = if ty.is_wide() {
                    Opcode::Ld16ri
                } else {
                    Opcode::Ld8ri
                };
                self.emit(MachineInst::new(opcode, vec![dst, Operand::Imm(c)]))?;
            } else {
                let src = self.use_reg(arg)?;
                let opcode = if ty.is_wide() {
                    Opcode::Ld16rr
                } else {
                    Opcode::Ld8rr
                };
                self.emit(MachineInst::new(opcode, vec![dst, Operand::Reg(src)]))?;
            }
        }

        self.emit(MachineInst::new(Opcode::Call, vec![Operand::Sym(callee)]))?;
        self.emit(MachineInst::new(
            Opcode::AdjCallStackUp,
            vec![Operand::Imm(stack_bytes as i64), Operand::Imm(0)],
        ))?;

        // Copy the result out of its convention register.
        let ty = self.ir.node(node).ty;
        let ret = analyze_returns(&[ty])?;
        let ArgLocation::Reg(phys) = ret[0] else {
            return Err(CodegenError::internal("return values are register-only"));
        };
        let dst = self.def_reg(node, Self::class_for(ty));
        let opcode = if ty.is_wide() {
            Opcode::Ld16rr
        } else {
            Opcode::Ld8rr
        };
        self.emit(MachineInst::new(
            opcode,
            vec![Operand::Reg(dst), Operand::Reg(Reg::Phys(phys))],
        ))?;
        Ok(())
    }

    fn select_node(&mut self, node: NodeId) -> CodegenResult<()> {
        let ty = self.ir.node(node).ty;
        match self.ir.node(node).op.clone() {
            // Materialized lazily at first use.
            Op::Const(_) | Op::Wrapper { .. } => Ok(()),
            // Bound during formal-argument lowering.
            Op::Arg(_) => Ok(()),
            Op::FrameSlot { .. } => {
                self.frame_index(node)?;
                Ok(())
            }

            Op::ExtractLow(v) => {
                let src = self.use_reg(v)?;
                let dst = self.def_reg(node, RegClass::GR8);
                self.emit(MachineInst::new(
                    Opcode::ExtLo8,
                    vec![Operand::Reg(dst), Operand::Reg(src)],
                ))
            }
            Op::ExtractHigh(v) => {
                let src = self.use_reg(v)?;
                let dst = self.def_reg(node, RegClass::GR8);
                self.emit(MachineInst::new(
                    Opcode::ExtHi8,
                    vec![Operand::Reg(dst), Operand::Reg(src)],
                ))
            }
            Op::Combine { lo, hi } => {
                let lo = self.use_reg(lo)?;
                let hi = self.use_reg(hi)?;
                let dst = self.def_reg(node, RegClass::GR16);
                self.emit(MachineInst::new(
                    Opcode::InsLo8,
                    vec![Operand::Reg(dst), Operand::Reg(lo)],
                ))?;
                self.emit(MachineInst::new(
                    Opcode::InsHi8,
                    vec![Operand::Reg(dst), Operand::Reg(hi)],
                ))
            }

            // Rotate the sign bit into carry, then broadcast it.
            Op::SignBits(v) => {
                let src = self.use_reg(v)?;
                let tmp = self.mf.new_vreg(RegClass::GR8);
                self.emit(MachineInst::new(
                    Opcode::Ld8rr,
                    vec![Operand::Reg(tmp), Operand::Reg(src)],
                ))?;
                self.emit(MachineInst::new(Opcode::Rl8r, vec![Operand::Reg(tmp)]))?;
                let dst = self.def_reg(node, RegClass::Acc);
                self.emit(MachineInst::new(Opcode::Sbc8aa, vec![Operand::Reg(dst)]))
            }

            // Frame-address arithmetic is an address expression, folded into
            // the memory operand by select_addr rather than computed here.
            Op::Binary {
                op: BinaryOp::Add | BinaryOp::Or,
                lhs,
                ..
            } if matches!(self.ir.node(lhs).op, Op::FrameSlot { .. }) => Ok(()),

            Op::Binary { op, lhs, rhs } => self.select_binary(node, ty, op, lhs, rhs),

            Op::Shift1 { op, value } => {
                let src = self.use_reg(value)?;
                let dst = self.def_reg(node, RegClass::GR8);
                self.emit(MachineInst::new(
                    Opcode::Ld8rr,
                    vec![Operand::Reg(dst), Operand::Reg(src)],
                ))?;
                let opcode = match op {
                    ShiftOp::Shl => Opcode::Sla8r,
                    ShiftOp::Sra => Opcode::Sra8r,
                    ShiftOp::Srl => Opcode::Srl8r,
                };
                self.emit(MachineInst::new(opcode, vec![Operand::Reg(dst)]))
            }

            Op::Cmp { lhs, rhs } => {
                let acc = self.mf.new_vreg(RegClass::Acc);
                let l = self.use_reg(lhs)?;
                self.emit(MachineInst::new(
                    Opcode::Ld8rr,
                    vec![Operand::Reg(acc), Operand::Reg(l)],
                ))?;
                if let Some(c) = self.const_of(rhs) {
                    self.emit(MachineInst::new(
                        Opcode::Cp8i,
                        vec![Operand::Reg(acc), Operand::Imm(c)],
                    ))
                } else {
                    let r = self.use_reg(rhs)?;
                    self.emit(MachineInst::new(
                        Opcode::Cp8r,
                        vec![Operand::Reg(acc), Operand::Reg(r)],
                    ))
                }
            }

            Op::SelectCc {
                cc,
                if_true,
                if_false,
            } => {
                let t = self.use_reg(if_true)?;
                let f = self.use_reg(if_false)?;
                let dst = self.def_reg(node, RegClass::GR8);
                self.emit(MachineInst::new(
                    Opcode::Select8,
                    vec![
                        Operand::Reg(dst),
                        Operand::Reg(t),
                        Operand::Reg(f),
                        Operand::Cond(cc),
                    ],
                ))
            }

            Op::BrCc { cc, target } => {
                let target = BlockId(target.0);
                self.emit(MachineInst::new(
                    Opcode::Jpcc,
                    vec![Operand::Cond(cc), Operand::Block(target)],
                ))?;
                let cur = self.cur;
                let fallthrough = self.mf.next_in_layout(cur);
                let block = self.mf.block_mut(cur)?;
                block.add_successor(target);
                if let Some(next) = fallthrough {
                    block.add_successor(next);
                }
                Ok(())
            }

            Op::Br { target } => {
                let target = BlockId(target.0);
                self.emit(MachineInst::new(Opcode::Jp, vec![Operand::Block(target)]))?;
                self.mf.block_mut(self.cur)?.add_successor(target);
                Ok(())
            }

            Op::Ret { value } => {
                if let Some(v) = value {
                    let results = self.ir.sig.results.clone();
                    let locs = analyze_returns(&results)?;
                    let ArgLocation::Reg(phys) = *locs.first().ok_or_else(|| {
                        CodegenError::internal("return with a value in a void signature")
                    })?
                    else {
                        return Err(CodegenError::internal("return values are register-only"));
                    };
                    let src = self.use_reg(v)?;
                    let opcode = if self.ir.node(v).ty.is_wide() {
                        Opcode::Ld16rr
                    } else {
                        Opcode::Ld8rr
                    };
                    self.emit(MachineInst::new(
                        opcode,
                        vec![Operand::Reg(Reg::Phys(phys)), Operand::Reg(src)],
                    ))?;
                }
                self.emit(MachineInst::new(Opcode::Ret, vec![]))
            }

            Op::Call { callee, args } => self.lower_call(node, callee, &args),

            Op::Load { addr } => {
                if ty.is_wide() {
                    let Op::Wrapper { sym } = self.ir.node(addr).op else {
                        return Err(CodegenError::internal(
                            "wide load should have been split by the legalizer",
                        ));
                    };
                    let dst = self.def_reg(node, RegClass::GR16);
                    return self.emit(MachineInst::new(
                        Opcode::Ld16rm,
                        vec![Operand::Reg(dst), Operand::mem_sym(sym)],
                    ));
                }
                let mem = self.mem_operand(addr)?;
                let dst = self.def_reg(node, RegClass::GR8);
                self.emit(MachineInst::new(
                    Opcode::Ld8rm,
                    vec![Operand::Reg(dst), mem],
                ))
            }

            Op::Store { value, addr } => {
                let mem = self.mem_operand(addr)?;
                if self.ir.node(value).ty.is_wide() {
                    let src = self.use_reg(value)?;
                    self.emit(MachineInst::new(
                        Opcode::Ld16mr,
                        vec![mem, Operand::Reg(src)],
                    ))
                } else if let Some(c) = self.const_of(value) {
                    self.emit(MachineInst::new(Opcode::Ld8mi, vec![mem, Operand::Imm(c)]))
                } else {
                    let src = self.use_reg(value)?;
                    self.emit(MachineInst::new(Opcode::Ld8mr, vec![mem, Operand::Reg(src)]))
                }
            }

            other @ (Op::Global(_)
            | Op::Shift { .. }
            | Op::SignExtend(_)
            | Op::ZeroExtend(_)
            | Op::Select { .. }
            | Op::BrCond { .. }) => Err(CodegenError::internal(format!(
                "unlegalized operation reached the selector: {:?}",
                other
            ))),
        }
    }

    fn select_binary(
        &mut self,
        node: NodeId,
        ty: ValueType,
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> CodegenResult<()> {
        if matches!(op, BinaryOp::Mul | BinaryOp::UDiv | BinaryOp::SDiv) {
            return Err(CodegenError::internal(format!(
                "{:?} must be lowered to a runtime-library call",
                op
            )));
        }
        if ty.is_wide() {
            if op != BinaryOp::Add {
                return Err(CodegenError::internal(format!(
                    "wide {:?} should have been split by the legalizer",
                    op
                )));
            }
            let l = self.use_reg(lhs)?;
            let r = self.use_reg(rhs)?;
            let dst = self.def_reg(node, RegClass::GR16);
            self.emit(MachineInst::new(
                Opcode::Ld16rr,
                vec![Operand::Reg(dst), Operand::Reg(l)],
            ))?;
            return self.emit(MachineInst::new(
                Opcode::Add16rr,
                vec![Operand::Reg(dst), Operand::Reg(dst), Operand::Reg(r)],
            ));
        }

        // Two-address accumulator form: copy, then operate.
        let l = self.use_reg(lhs)?;
        let dst = self.def_reg(node, RegClass::Acc);
        self.emit(MachineInst::new(
            Opcode::Ld8rr,
            vec![Operand::Reg(dst), Operand::Reg(l)],
        ))?;
        let (rr, ri) = match op {
            BinaryOp::Add => (Opcode::Add8rr, Opcode::Add8ri),
            BinaryOp::Sub => (Opcode::Sub8rr, Opcode::Sub8ri),
            BinaryOp::And => (Opcode::And8rr, Opcode::And8ri),
            BinaryOp::Or => (Opcode::Or8rr, Opcode::Or8ri),
            BinaryOp::Xor => (Opcode::Xor8rr, Opcode::Xor8ri),
            BinaryOp::Mul | BinaryOp::UDiv | BinaryOp::SDiv => unreachable!(),
        };
        if let Some(c) = self.const_of(rhs) {
            self.emit(MachineInst::new(
                ri,
                vec![Operand::Reg(dst), Operand::Imm(c)],
            ))
        } else {
            let r = self.use_reg(rhs)?;
            self.emit(MachineInst::new(
                rr,
                vec![Operand::Reg(dst), Operand::Reg(r)],
            ))
        }
    }
}

/// Expand every SELECT8 pseudo into explicit control flow: an empty
/// predicated-copy placeholder block, a join block led by a phi, and a
/// conditional jump around the placeholder.
pub fn expand_select_pseudos(func: &mut MachineFunction<'_>) -> CodegenResult<()> {
    loop {
        let found = func.blocks().find_map(|b| {
            b.insts
                .iter()
                .position(|i| i.opcode == Opcode::Select8)
                .map(|p| (b.id, p))
        });
        let Some((bid, pos)) = found else {
            return Ok(());
        };

        let (dst, tv, fv, cc) = {
            let inst = &func.block(bid)?.insts[pos];
            match inst.operands.as_slice() {
                [Operand::Reg(dst), Operand::Reg(tv), Operand::Reg(fv), Operand::Cond(cc)] => {
                    (*dst, *tv, *fv, *cc)
                }
                _ => {
                    return Err(CodegenError::internal(
                        "malformed SELECT8 pseudo instruction",
                    ))
                }
            }
        };

        let placeholder = func.insert_block_after(bid)?;
        let sink = func.insert_block_after(placeholder)?;
        log::trace!(
            "expanding select in block {} via blocks {} and {}",
            bid.0,
            placeholder.0,
            sink.0
        );

        // Move the tail and the successor edges over to the join block.
        let (tail, old_succs) = {
            let block = func.block_mut(bid)?;
            let tail: Vec<_> = block.insts.drain(pos + 1..).collect();
            block.insts.pop(); // the SELECT8 itself
            let old_succs = std::mem::take(&mut block.succs);
            block.push(MachineInst::new(
                Opcode::Jpcc,
                vec![Operand::Cond(cc), Operand::Block(sink)],
            ));
            block.succs = vec![placeholder, sink];
            (tail, old_succs)
        };

        {
            let join = func.block_mut(sink)?;
            join.push(MachineInst::new(
                Opcode::Phi,
                vec![
                    Operand::Reg(dst),
                    Operand::Reg(fv),
                    Operand::Block(placeholder),
                    Operand::Reg(tv),
                    Operand::Block(bid),
                ],
            ));
            join.insts.extend(tail);
            join.succs = old_succs;
        }

        func.block_mut(placeholder)?.succs = vec![sink];
    }
}
