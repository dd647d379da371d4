// This module implements operation legalization for the Z80: every wide or
// unsupported operation is rewritten into sequences the selector has templates for.
// 16-bit bitwise operations split into independent 8-bit operations on the low and
// high halves with constant operands split by masking/shifting at lowering time;
// comparisons become an explicit 8-bit compare plus one of the hardware condition
// codes, with operand-swap rules for predicates that have no direct encoding;
// multiply and divide become calls into the fixed runtime-library routines;
// sign-extension synthesizes its high byte with the rotate-through-carry plus
// subtract-with-carry idiom; wide frame-relative stores and loads split into byte
// pairs; global references are wrapped for the selector's extended addressing; and
// constant 8-bit shifts unroll into single-bit shift nodes.

//! Operation legalization rules.
//!
//! The legalizer rewrites a generic operation graph into one the instruction
//! selector can match exhaustively. It owns the transient graph it builds;
//! nothing here mutates the input function.

use crate::core::error::{CodegenError, CodegenResult};
use crate::core::ir::{BinaryOp, IrBlockId, IrFunction, NodeId, Op, Predicate, ValueType};
use crate::core::session::CodegenSession;
use crate::mir::CondCode;

/// Runtime-library symbol for a multiply/divide operation.
pub fn libcall_name(op: BinaryOp, ty: ValueType) -> Option<&'static str> {
    let wide = ty.is_wide();
    match op {
        BinaryOp::Mul => Some(if wide {
            "_mathLib_MULi16"
        } else {
            "_mathLib_MULi8"
        }),
        BinaryOp::UDiv => Some(if wide {
            "_mathLib_UDIVi16"
        } else {
            "_mathLib_UDIVi8"
        }),
        BinaryOp::SDiv => Some(if wide {
            "_mathLib_SDIVi16"
        } else {
            "_mathLib_SDIVi8"
        }),
        _ => None,
    }
}

/// Map a comparison predicate onto a hardware condition code.
///
/// Returns the condition plus whether the compare operands must swap.
/// Equality predicates additionally swap when the left-hand side is a
/// constant, biasing code generation toward immediate-right-hand-side
/// compares. Signed orderings have no encoding on this machine.
pub fn map_predicate(pred: Predicate, lhs_is_const: bool) -> CodegenResult<(CondCode, bool)> {
    match pred {
        Predicate::Ne => Ok((CondCode::Nz, lhs_is_const)),
        Predicate::Eq => Ok((CondCode::Z, lhs_is_const)),
        Predicate::ULt => Ok((CondCode::C, false)),
        Predicate::UGt => Ok((CondCode::C, true)),
        Predicate::UGe => Ok((CondCode::Nc, false)),
        Predicate::ULe => Ok((CondCode::Nc, true)),
        Predicate::SLt | Predicate::SLe | Predicate::SGt | Predicate::SGe => Err(
            CodegenError::internal(format!("invalid integer condition {:?}", pred)),
        ),
    }
}

/// Z80 legalization rules.
pub struct Z80Lowering {
    /// When set, wide stores and loads are treated as unaligned-safe atomic
    /// accesses and bypass the byte split.
    pub allow_unaligned_wide_access: bool,
}

impl Default for Z80Lowering {
    fn default() -> Self {
        Self {
            allow_unaligned_wide_access: false,
        }
    }
}

impl Z80Lowering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite `func` into a graph of selectable operations.
    pub fn legalize<'a>(
        &self,
        session: &CodegenSession<'a>,
        func: &IrFunction<'a>,
    ) -> CodegenResult<IrFunction<'a>> {
        log::debug!("legalizing function {}", func.name);
        let mut lg = Legalizer {
            src: func,
            dst: IrFunction::new(func.name, func.sig.clone()),
            map: vec![None; func.node_count()],
            rules: self,
        };
        for _ in 0..func.block_count() {
            lg.dst.add_block();
        }
        for block in func.block_ids() {
            for &node in &func.block(block)?.nodes {
                lg.lower_node(session, block, node)?;
            }
        }
        Ok(lg.dst)
    }
}

struct Legalizer<'s, 'a> {
    src: &'s IrFunction<'a>,
    dst: IrFunction<'a>,
    map: Vec<Option<NodeId>>,
    rules: &'s Z80Lowering,
}

impl<'s, 'a> Legalizer<'s, 'a> {
    fn mapped(&self, old: NodeId) -> CodegenResult<NodeId> {
        self.map[old.0 as usize]
            .ok_or_else(|| CodegenError::internal(format!("node {} used before definition", old.0)))
    }

    fn set(&mut self, old: NodeId, new: NodeId) {
        self.map[old.0 as usize] = Some(new);
    }

    fn push(&mut self, block: IrBlockId, op: Op<'a>, ty: ValueType) -> NodeId {
        self.dst.push(block, op, ty)
    }

    /// Low/high 8-bit pieces of a (possibly constant) 16-bit operand.
    /// Constants split at lowering time by masking and shifting.
    fn half_operands(
        &mut self,
        block: IrBlockId,
        old: NodeId,
    ) -> CodegenResult<(NodeId, NodeId)> {
        if let Op::Const(c) = self.src.node(old).op {
            let lo = self.push(block, Op::Const(c & 0xff), ValueType::I8);
            let hi = self.push(block, Op::Const((c >> 8) & 0xff), ValueType::I8);
            return Ok((lo, hi));
        }
        let mapped = self.mapped(old)?;
        let lo = self.push(block, Op::ExtractLow(mapped), ValueType::I8);
        let hi = self.push(block, Op::ExtractHigh(mapped), ValueType::I8);
        Ok((lo, hi))
    }

    /// True when an address expression resolves against the frame.
    fn is_frame_relative(&self, addr: NodeId) -> bool {
        match &self.src.node(addr).op {
            Op::FrameSlot { .. } => true,
            Op::Binary {
                op: BinaryOp::Add | BinaryOp::Or,
                lhs,
                rhs,
            } => {
                matches!(self.src.node(*lhs).op, Op::FrameSlot { .. })
                    && matches!(self.src.node(*rhs).op, Op::Const(_))
            }
            _ => false,
        }
    }

    fn is_global_address(&self, addr: NodeId) -> bool {
        matches!(
            self.src.node(addr).op,
            Op::Global(_) | Op::Wrapper { .. }
        )
    }

    /// Address expression `old + delta`, folded into an existing constant
    /// displacement where possible.
    fn offset_addr(
        &mut self,
        block: IrBlockId,
        old: NodeId,
        delta: i64,
    ) -> CodegenResult<NodeId> {
        let addr_ty = self.src.node(old).ty;
        if let Op::Binary {
            op: BinaryOp::Add | BinaryOp::Or,
            lhs,
            rhs,
        } = self.src.node(old).op
        {
            if let Op::Const(c) = self.src.node(rhs).op {
                let base = self.mapped(lhs)?;
                let disp = self.push(block, Op::Const(c + delta), addr_ty);
                return Ok(self.push(
                    block,
                    Op::Binary {
                        op: BinaryOp::Add,
                        lhs: base,
                        rhs: disp,
                    },
                    addr_ty,
                ));
            }
        }
        let base = self.mapped(old)?;
        let disp = self.push(block, Op::Const(delta), addr_ty);
        Ok(self.push(
            block,
            Op::Binary {
                op: BinaryOp::Add,
                lhs: base,
                rhs: disp,
            },
            addr_ty,
        ))
    }

    /// Emit the explicit compare for a comparison-based control operation and
    /// return the derived condition code.
    fn emit_cmp(
        &mut self,
        block: IrBlockId,
        pred: Predicate,
        lhs: NodeId,
        rhs: NodeId,
    ) -> CodegenResult<CondCode> {
        if self.src.node(lhs).ty.is_wide() {
            return Err(CodegenError::Unimplemented {
                feature: "16-bit comparisons",
            });
        }
        let lhs_is_const = matches!(self.src.node(lhs).op, Op::Const(_));
        let (cc, swap) = map_predicate(pred, lhs_is_const)?;
        let (l, r) = if swap { (rhs, lhs) } else { (lhs, rhs) };
        let l = self.mapped(l)?;
        let r = self.mapped(r)?;
        self.push(block, Op::Cmp { lhs: l, rhs: r }, ValueType::I8);
        Ok(cc)
    }

    fn lower_node(
        &mut self,
        session: &CodegenSession<'a>,
        block: IrBlockId,
        old: NodeId,
    ) -> CodegenResult<()> {
        let node = self.src.node(old).clone();
        let ty = node.ty;
        let new = match node.op {
            Op::Const(c) => self.push(block, Op::Const(c), ty),
            Op::Arg(i) => self.push(block, Op::Arg(i), ty),
            Op::FrameSlot { size } => self.push(block, Op::FrameSlot { size }, ty),
            Op::Global(sym) => self.push(block, Op::Wrapper { sym }, ty),

            Op::Binary { op, lhs, rhs } => {
                if let Some(symbol) = libcall_name(op, ty) {
                    session.record_libcall(symbol);
                    let args = vec![self.mapped(lhs)?, self.mapped(rhs)?];
                    self.push(
                        block,
                        Op::Call {
                            callee: symbol,
                            args,
                        },
                        ty,
                    )
                } else if ty.is_wide() {
                    match op {
                        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                            let (ll, lh) = self.half_operands(block, lhs)?;
                            let (rl, rh) = self.half_operands(block, rhs)?;
                            let lo = self.push(
                                block,
                                Op::Binary {
                                    op,
                                    lhs: ll,
                                    rhs: rl,
                                },
                                ValueType::I8,
                            );
                            let hi = self.push(
                                block,
                                Op::Binary {
                                    op,
                                    lhs: lh,
                                    rhs: rh,
                                },
                                ValueType::I8,
                            );
                            self.push(block, Op::Combine { lo, hi }, ty)
                        }
                        // 16-bit add is native (add rr, rr).
                        BinaryOp::Add => {
                            let lhs = self.mapped(lhs)?;
                            let rhs = self.mapped(rhs)?;
                            self.push(block, Op::Binary { op, lhs, rhs }, ty)
                        }
                        BinaryOp::Sub => {
                            return Err(CodegenError::Unimplemented {
                                feature: "16-bit subtraction",
                            })
                        }
                        _ => unreachable!("multiply/divide handled as libcalls"),
                    }
                } else {
                    let lhs = self.mapped(lhs)?;
                    let rhs = self.mapped(rhs)?;
                    self.push(block, Op::Binary { op, lhs, rhs }, ty)
                }
            }

            Op::Shift { op, value, amount } => {
                if ty.is_wide() {
                    return Err(CodegenError::Unimplemented {
                        feature: "16-bit shifts",
                    });
                }
                let Op::Const(n) = self.src.node(amount).op else {
                    return Err(CodegenError::Unimplemented {
                        feature: "non-constant shift amounts",
                    });
                };
                let mut victim = self.mapped(value)?;
                for _ in 0..n {
                    victim = self.push(block, Op::Shift1 { op, value: victim }, ValueType::I8);
                }
                victim
            }

            Op::Load { addr } => {
                let wide = ty.is_wide();
                if wide
                    && !self.rules.allow_unaligned_wide_access
                    && self.is_frame_relative(addr)
                {
                    let lo_addr = self.mapped(addr)?;
                    let lo = self.push(block, Op::Load { addr: lo_addr }, ValueType::I8);
                    let hi_addr = self.offset_addr(block, addr, 1)?;
                    let hi = self.push(block, Op::Load { addr: hi_addr }, ValueType::I8);
                    self.push(block, Op::Combine { lo, hi }, ty)
                } else {
                    let addr = self.mapped(addr)?;
                    self.push(block, Op::Load { addr }, ty)
                }
            }

            Op::Store { value, addr } => {
                let wide = self.src.node(value).ty.is_wide();
                if !wide || self.rules.allow_unaligned_wide_access {
                    let value = self.mapped(value)?;
                    let addr = self.mapped(addr)?;
                    self.push(block, Op::Store { value, addr }, ty)
                } else if self.is_global_address(addr) {
                    // Atomic wide store to a direct address.
                    let value = self.mapped(value)?;
                    let addr = self.mapped(addr)?;
                    self.push(block, Op::Store { value, addr }, ty)
                } else if self.is_frame_relative(addr) {
                    // Low byte to the address, high byte to address+1.
                    let (lo, hi) = self.half_operands(block, value)?;
                    let lo_addr = self.mapped(addr)?;
                    self.push(
                        block,
                        Op::Store {
                            value: lo,
                            addr: lo_addr,
                        },
                        ty,
                    );
                    let hi_addr = self.offset_addr(block, addr, 1)?;
                    self.push(
                        block,
                        Op::Store {
                            value: hi,
                            addr: hi_addr,
                        },
                        ty,
                    )
                } else {
                    return Err(CodegenError::internal(
                        "16-bit store supports only frame-relative or direct addresses",
                    ));
                }
            }

            Op::SignExtend(v) => {
                if self.src.node(v).ty.is_wide() || !ty.is_wide() {
                    return Err(CodegenError::UnsupportedOp {
                        operation: "sign-extension",
                        width: 8 * ty.byte_size(),
                    });
                }
                let lo = self.mapped(v)?;
                let hi = self.push(block, Op::SignBits(lo), ValueType::I8);
                self.push(block, Op::Combine { lo, hi }, ty)
            }

            Op::ZeroExtend(v) => {
                if self.src.node(v).ty.is_wide() || !ty.is_wide() {
                    return Err(CodegenError::UnsupportedOp {
                        operation: "zero-extension",
                        width: 8 * ty.byte_size(),
                    });
                }
                let lo = self.mapped(v)?;
                let hi = self.push(block, Op::Const(0), ValueType::I8);
                self.push(block, Op::Combine { lo, hi }, ty)
            }

            Op::Select {
                pred,
                lhs,
                rhs,
                if_true,
                if_false,
            } => {
                let cc = self.emit_cmp(block, pred, lhs, rhs)?;
                let if_true = self.mapped(if_true)?;
                let if_false = self.mapped(if_false)?;
                self.push(
                    block,
                    Op::SelectCc {
                        cc,
                        if_true,
                        if_false,
                    },
                    ty,
                )
            }

            Op::BrCond {
                pred,
                lhs,
                rhs,
                target,
            } => {
                let cc = self.emit_cmp(block, pred, lhs, rhs)?;
                self.push(block, Op::BrCc { cc, target }, ty)
            }

            Op::Br { target } => self.push(block, Op::Br { target }, ty),
            Op::Ret { value } => {
                let value = value.map(|v| self.mapped(v)).transpose()?;
                self.push(block, Op::Ret { value }, ty)
            }
            Op::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|&a| self.mapped(a))
                    .collect::<CodegenResult<Vec<_>>>()?;
                self.push(block, Op::Call { callee, args }, ty)
            }

            // Already-legal operators pass through unchanged.
            Op::ExtractLow(v) => {
                let v = self.mapped(v)?;
                self.push(block, Op::ExtractLow(v), ty)
            }
            Op::ExtractHigh(v) => {
                let v = self.mapped(v)?;
                self.push(block, Op::ExtractHigh(v), ty)
            }
            Op::Combine { lo, hi } => {
                let lo = self.mapped(lo)?;
                let hi = self.mapped(hi)?;
                self.push(block, Op::Combine { lo, hi }, ty)
            }
            Op::SignBits(v) => {
                let v = self.mapped(v)?;
                self.push(block, Op::SignBits(v), ty)
            }
            Op::Wrapper { sym } => self.push(block, Op::Wrapper { sym }, ty),
            Op::Cmp { lhs, rhs } => {
                let lhs = self.mapped(lhs)?;
                let rhs = self.mapped(rhs)?;
                self.push(block, Op::Cmp { lhs, rhs }, ty)
            }
            Op::SelectCc {
                cc,
                if_true,
                if_false,
            } => {
                let if_true = self.mapped(if_true)?;
                let if_false = self.mapped(if_false)?;
                self.push(
                    block,
                    Op::SelectCc {
                        cc,
                        if_true,
                        if_false,
                    },
                    ty,
                )
            }
            Op::BrCc { cc, target } => self.push(block, Op::BrCc { cc, target }, ty),
            Op::Shift1 { op, value } => {
                let value = self.mapped(value)?;
                self.push(block, Op::Shift1 { op, value }, ty)
            }
        };
        self.set(old, new);
        Ok(())
    }
}
