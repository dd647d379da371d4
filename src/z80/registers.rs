// This module contains the Z80 register model: register identities, the class
// structure the allocator sees (8-bit general, 16-bit general, accumulator-only,
// index), sub-register relations between the general-purpose pairs and their 8-bit
// halves, and the reserved set. The program counter, stack pointer and flags register
// are never allocatable as general-purpose operands. The two index registers are
// 16-bit-only: their halves are not independently addressable, so copies involving
// them must move the whole register (push/pop). All queries here are pure reads of
// static tables.

//! Z80 registers, register classes and sub-register relations.

use crate::core::error::{CodegenError, CodegenResult};

/// Physical Z80 registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Z80Reg {
    // 8-bit general purpose
    A,
    B,
    C,
    D,
    E,
    H,
    L,
    // 16-bit pairs
    BC,
    DE,
    HL,
    // 16-bit index registers
    IX,
    IY,
    // Reserved
    SP,
    PC,
    FLAGS,
}

impl Z80Reg {
    /// Canonical lower-case assembly name.
    pub fn name(self) -> &'static str {
        match self {
            Z80Reg::A => "a",
            Z80Reg::B => "b",
            Z80Reg::C => "c",
            Z80Reg::D => "d",
            Z80Reg::E => "e",
            Z80Reg::H => "h",
            Z80Reg::L => "l",
            Z80Reg::BC => "bc",
            Z80Reg::DE => "de",
            Z80Reg::HL => "hl",
            Z80Reg::IX => "ix",
            Z80Reg::IY => "iy",
            Z80Reg::SP => "sp",
            Z80Reg::PC => "pc",
            Z80Reg::FLAGS => "f",
        }
    }

    pub fn is_index(self) -> bool {
        matches!(self, Z80Reg::IX | Z80Reg::IY)
    }
}

/// Low or high half of a 16-bit register pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubRegPart {
    Low,
    High,
}

/// Register classes: sets of interchangeable registers sharing allocation
/// constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    /// 8-bit general purpose: A, B, C, D, E, H, L.
    GR8,
    /// 16-bit general purpose: BC, DE, HL, IX, IY.
    GR16,
    /// Accumulator only.
    Acc,
    /// Index registers only: IX, IY.
    Index,
}

impl RegClass {
    pub fn contains(self, reg: Z80Reg) -> bool {
        match self {
            RegClass::GR8 => matches!(
                reg,
                Z80Reg::A | Z80Reg::B | Z80Reg::C | Z80Reg::D | Z80Reg::E | Z80Reg::H | Z80Reg::L
            ),
            RegClass::GR16 => matches!(
                reg,
                Z80Reg::BC | Z80Reg::DE | Z80Reg::HL | Z80Reg::IX | Z80Reg::IY
            ),
            RegClass::Acc => reg == Z80Reg::A,
            RegClass::Index => reg.is_index(),
        }
    }
}

/// Registers never allocatable as general-purpose operands.
pub fn reserved_registers() -> &'static [Z80Reg] {
    &[Z80Reg::PC, Z80Reg::SP, Z80Reg::FLAGS]
}

/// This convention preserves nothing across calls.
pub fn callee_saved_registers() -> &'static [Z80Reg] {
    &[]
}

/// The low or high 8-bit identity of a 16-bit general-purpose pair.
///
/// Defined only for BC, DE and HL; asking for a half of an index register or
/// of an 8-bit register is a contract violation.
pub fn sub_register(reg: Z80Reg, part: SubRegPart) -> CodegenResult<Z80Reg> {
    let halves = match reg {
        Z80Reg::BC => (Z80Reg::C, Z80Reg::B),
        Z80Reg::DE => (Z80Reg::E, Z80Reg::D),
        Z80Reg::HL => (Z80Reg::L, Z80Reg::H),
        Z80Reg::IX | Z80Reg::IY => {
            return Err(CodegenError::internal(format!(
                "index register {} has no addressable halves",
                reg.name()
            )))
        }
        other => {
            return Err(CodegenError::internal(format!(
                "register {} has no sub-registers",
                other.name()
            )))
        }
    };
    Ok(match part {
        SubRegPart::Low => halves.0,
        SubRegPart::High => halves.1,
    })
}

/// The 16-bit pair an 8-bit register belongs to, if any.
pub fn pair_of(reg: Z80Reg) -> Option<Z80Reg> {
    match reg {
        Z80Reg::B | Z80Reg::C => Some(Z80Reg::BC),
        Z80Reg::D | Z80Reg::E => Some(Z80Reg::DE),
        Z80Reg::H | Z80Reg::L => Some(Z80Reg::HL),
        _ => None,
    }
}

/// Whether two registers occupy overlapping storage.
pub fn overlaps(a: Z80Reg, b: Z80Reg) -> bool {
    if a == b {
        return true;
    }
    pair_of(a) == Some(b) || pair_of(b) == Some(a)
}
