// This module implements the Z80 calling convention. Arguments are assigned in
// left-to-right order from size-specific register lists (8-bit values use A, E, C;
// 16-bit values use HL, DE, BC) honoring pair aliasing: once E is taken, DE is gone,
// and vice versa. When the lists are exhausted, remaining arguments receive strictly
// increasing stack-memory offsets, each consuming exactly the argument's byte size
// with no padding. Return values are register-only (A for 8-bit, HL for 16-bit, one
// result maximum). Variadic argument lists are rejected outright, and the convention
// never elides the call/return sequence, so tail-call requests degrade to ordinary
// calls. Assignments are computed once per call site or function entry, consumed
// immediately by lowering, then discarded.

//! Z80 calling convention implementation.

use crate::core::error::{CodegenError, CodegenResult};
use crate::core::ir::ValueType;
use crate::z80::registers::{overlaps, Z80Reg};

/// Whether locations are being assigned for a function entry or a call site.
/// The register and stack rules are identical in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// One argument's assigned location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLocation {
    Reg(Z80Reg),
    /// Byte offset into the outgoing/incoming argument area.
    Stack { offset: u32 },
}

/// Trait for calling convention argument assignment.
pub trait CcAssigner {
    /// Assign the next argument according to the calling convention.
    fn assign_arg(&mut self, ty: ValueType) -> CodegenResult<ArgLocation>;

    /// Assign the next return value. Register-only.
    fn assign_ret(&mut self, ty: ValueType) -> CodegenResult<ArgLocation>;

    /// Total stack space consumed by assigned arguments.
    fn stack_bytes(&self) -> u32;

    /// Reset state for a new signature.
    fn reset(&mut self);
}

/// The Z80 C calling convention assigner.
pub struct Z80Assigner {
    used: Vec<Z80Reg>,
    stack: u32,
    rets_assigned: usize,
}

impl Default for Z80Assigner {
    fn default() -> Self {
        Self {
            used: Vec::new(),
            stack: 0,
            rets_assigned: 0,
        }
    }
}

impl Z80Assigner {
    /// 8-bit argument registers, in assignment order.
    const ARG_REGS_8: [Z80Reg; 3] = [Z80Reg::A, Z80Reg::E, Z80Reg::C];

    /// 16-bit argument registers, in assignment order.
    const ARG_REGS_16: [Z80Reg; 3] = [Z80Reg::HL, Z80Reg::DE, Z80Reg::BC];

    /// Return registers by size.
    const RET_REG_8: Z80Reg = Z80Reg::A;
    const RET_REG_16: Z80Reg = Z80Reg::HL;

    pub fn new() -> Self {
        Self::default()
    }

    /// The convention never elides the call/return sequence.
    pub fn supports_tail_calls() -> bool {
        false
    }

    fn is_available(&self, reg: Z80Reg) -> bool {
        self.used.iter().all(|&u| !overlaps(u, reg))
    }

    fn take_first_available(&mut self, list: &[Z80Reg]) -> Option<Z80Reg> {
        let reg = list.iter().copied().find(|&r| self.is_available(r))?;
        self.used.push(reg);
        Some(reg)
    }
}

impl CcAssigner for Z80Assigner {
    fn assign_arg(&mut self, ty: ValueType) -> CodegenResult<ArgLocation> {
        let list: &[Z80Reg] = match ty {
            ValueType::I8 => &Self::ARG_REGS_8,
            ValueType::I16 | ValueType::Ptr => &Self::ARG_REGS_16,
        };
        if let Some(reg) = self.take_first_available(list) {
            return Ok(ArgLocation::Reg(reg));
        }
        let offset = self.stack;
        self.stack += ty.byte_size();
        Ok(ArgLocation::Stack { offset })
    }

    fn assign_ret(&mut self, ty: ValueType) -> CodegenResult<ArgLocation> {
        if self.rets_assigned >= 1 {
            return Err(CodegenError::Unimplemented {
                feature: "multiple return values",
            });
        }
        self.rets_assigned += 1;
        let reg = match ty {
            ValueType::I8 => Self::RET_REG_8,
            ValueType::I16 | ValueType::Ptr => Self::RET_REG_16,
        };
        Ok(ArgLocation::Reg(reg))
    }

    fn stack_bytes(&self) -> u32 {
        self.stack
    }

    fn reset(&mut self) {
        self.used.clear();
        self.stack = 0;
        self.rets_assigned = 0;
    }
}

/// Assign one location per argument in left-to-right order.
///
/// Returns the locations plus the total stack bytes consumed. Variadic
/// argument lists are not supported.
pub fn analyze_arguments(
    types: &[ValueType],
    _dir: Direction,
    variadic: bool,
) -> CodegenResult<(Vec<ArgLocation>, u32)> {
    if variadic {
        return Err(CodegenError::Unimplemented {
            feature: "variadic argument lists",
        });
    }
    let mut assigner = Z80Assigner::new();
    let mut locs = Vec::with_capacity(types.len());
    for &ty in types {
        locs.push(assigner.assign_arg(ty)?);
    }
    Ok((locs, assigner.stack_bytes()))
}

/// Assign return-value locations. Register-only; one result maximum.
pub fn analyze_returns(types: &[ValueType]) -> CodegenResult<Vec<ArgLocation>> {
    let mut assigner = Z80Assigner::new();
    let mut locs = Vec::with_capacity(types.len());
    for &ty in types {
        locs.push(assigner.assign_ret(ty)?);
    }
    Ok(locs)
}
