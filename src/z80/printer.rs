// This module renders finalized instructions as textual assembly. It is pure: nothing
// here mutates the program. Register operands print their canonical name, optionally
// narrowed to a low/high half under the sub-register modifiers; immediates print in
// decimal, optionally masked or shifted to one byte; memory operands print as a
// parenthesized expression for symbolic bases or as (register+/-displacement) for
// register bases, with an optional integer modifier added to the displacement first;
// condition codes print their two-letter mnemonics. Modifier strings originate in
// assembly templates, so an unrecognized modifier is a fatal contract violation.
// Each instruction renders as one line plus an optional trailing annotation comment.

//! Instruction printing.

use crate::core::error::{CodegenError, CodegenResult};
use crate::mir::{
    CondCode, MachineFunction, MachineInst, MemBase, Opcode, Operand, Reg,
};
use crate::z80::registers::{sub_register, SubRegPart};

/// Z80 assembly printer.
pub struct Z80InstPrinter;

impl Z80InstPrinter {
    /// Render a register, immediate or symbol operand.
    ///
    /// Register modifiers `sub_8bit_low`/`sub_8bit_hi` narrow a 16-bit pair
    /// to a half; immediate modifiers `8bit_low`/`8bit_hi` select one byte of
    /// the value. Unrecognized modifiers are fatal.
    pub fn print_operand(op: &Operand<'_>, modifier: Option<&str>) -> CodegenResult<String> {
        match *op {
            Operand::Reg(Reg::Phys(reg)) => {
                let reg = match modifier {
                    None => reg,
                    Some("sub_8bit_low") => sub_register(reg, SubRegPart::Low)?,
                    Some("sub_8bit_hi") => sub_register(reg, SubRegPart::High)?,
                    Some(other) => {
                        return Err(CodegenError::InvalidModifier {
                            kind: "register",
                            modifier: other.to_string(),
                        })
                    }
                };
                Ok(reg.name().to_string())
            }
            Operand::Reg(Reg::Virt(v)) => {
                if let Some(modifier) = modifier {
                    return Err(CodegenError::internal(format!(
                        "modifier {} on unallocated register v{}",
                        modifier, v.id
                    )));
                }
                Ok(format!("%v{}", v.id))
            }
            Operand::Imm(value) => {
                let value = match modifier {
                    None => value,
                    Some("8bit_low") => value & 0xff,
                    Some("8bit_hi") => (value >> 8) & 0xff,
                    Some(other) => {
                        return Err(CodegenError::InvalidModifier {
                            kind: "immediate",
                            modifier: other.to_string(),
                        })
                    }
                };
                Ok(value.to_string())
            }
            Operand::Sym(sym) => Ok(sym.to_string()),
            ref other => Err(CodegenError::internal(format!(
                "operand {:?} is not printable here",
                other
            ))),
        }
    }

    /// Render a memory operand. The optional integer modifier is added to the
    /// displacement before printing.
    pub fn print_mem_operand(op: &Operand<'_>, modifier: Option<i64>) -> CodegenResult<String> {
        let Operand::Mem { base, disp } = *op else {
            return Err(CodegenError::internal(format!(
                "operand {:?} is not a memory reference",
                op
            )));
        };
        match base {
            MemBase::Sym(sym) => Ok(format!("({})", sym)),
            MemBase::Reg(reg) => {
                let name = Self::print_operand(&Operand::Reg(reg), None)?;
                let disp = disp as i64 + modifier.unwrap_or(0);
                let sign = if disp >= 0 { '+' } else { '-' };
                Ok(format!("({}{}{})", name, sign, disp.abs()))
            }
            MemBase::Frame(index) => Err(CodegenError::internal(format!(
                "unresolved frame index {} reached the printer",
                index.0
            ))),
        }
    }

    /// Two-letter mnemonic for a condition code.
    pub fn print_cc_operand(cc: CondCode) -> &'static str {
        match cc {
            CondCode::Nz => "nz",
            CondCode::Z => "z",
            CondCode::Nc => "nc",
            CondCode::C => "c",
            CondCode::Po => "po",
            CondCode::Pe => "pe",
            CondCode::P => "p",
            CondCode::M => "m",
        }
    }

    fn block_label(op: &Operand<'_>) -> CodegenResult<String> {
        let Operand::Block(id) = *op else {
            return Err(CodegenError::internal(format!(
                "operand {:?} is not a block target",
                op
            )));
        };
        Ok(format!(".LBB_{}", id.0))
    }

    fn cc_of(op: &Operand<'_>) -> CodegenResult<CondCode> {
        let Operand::Cond(cc) = *op else {
            return Err(CodegenError::internal(format!(
                "operand {:?} is not a condition code",
                op
            )));
        };
        Ok(cc)
    }

    /// Render one instruction as a line of assembly, without the trailing
    /// newline. The optional annotation renders as a trailing comment.
    pub fn print_inst(inst: &MachineInst<'_>) -> CodegenResult<String> {
        let ops = &inst.operands;
        let operand = |i: usize| -> CodegenResult<String> {
            Self::print_operand(
                ops.get(i).ok_or_else(|| {
                    CodegenError::internal(format!("missing operand {} on {:?}", i, inst.opcode))
                })?,
                None,
            )
        };
        let operand_mod = |i: usize, m: &str| -> CodegenResult<String> {
            Self::print_operand(
                ops.get(i).ok_or_else(|| {
                    CodegenError::internal(format!("missing operand {} on {:?}", i, inst.opcode))
                })?,
                Some(m),
            )
        };
        let mem = |i: usize| -> CodegenResult<String> {
            Self::print_mem_operand(
                ops.get(i).ok_or_else(|| {
                    CodegenError::internal(format!("missing operand {} on {:?}", i, inst.opcode))
                })?,
                None,
            )
        };

        let mnemonic = inst.opcode.mnemonic();
        let text = match inst.opcode {
            Opcode::Ld8rr | Opcode::Ld16rr | Opcode::Ld8ri | Opcode::Ld16ri => {
                format!("ld {}, {}", operand(0)?, operand(1)?)
            }
            Opcode::Ld8rm | Opcode::Ld16rm => format!("ld {}, {}", operand(0)?, mem(1)?),
            Opcode::Ld8mr | Opcode::Ld16mr | Opcode::Ld8mi => {
                format!("ld {}, {}", mem(0)?, operand(1)?)
            }
            Opcode::ExtLo8 => format!("ld {}, {}", operand(0)?, operand_mod(1, "sub_8bit_low")?),
            Opcode::ExtHi8 => format!("ld {}, {}", operand(0)?, operand_mod(1, "sub_8bit_hi")?),
            Opcode::InsLo8 => format!("ld {}, {}", operand_mod(0, "sub_8bit_low")?, operand(1)?),
            Opcode::InsHi8 => format!("ld {}, {}", operand_mod(0, "sub_8bit_hi")?, operand(1)?),
            Opcode::Add8rr | Opcode::Add8ri => {
                format!("add {}, {}", operand(0)?, operand(1)?)
            }
            // Accumulator-implicit ALU forms.
            Opcode::Sub8rr
            | Opcode::Sub8ri
            | Opcode::And8rr
            | Opcode::And8ri
            | Opcode::Or8rr
            | Opcode::Or8ri
            | Opcode::Xor8rr
            | Opcode::Xor8ri
            | Opcode::Cp8r
            | Opcode::Cp8i => format!("{} {}", mnemonic, operand(1)?),
            Opcode::Sbc8aa => "sbc a, a".to_string(),
            Opcode::Rl8r | Opcode::Sla8r | Opcode::Sra8r | Opcode::Srl8r => {
                format!("{} {}", mnemonic, operand(0)?)
            }
            Opcode::Add16rr => format!("add {}, {}", operand(0)?, operand(2)?),
            Opcode::Push16r => format!("push {}", operand(0)?),
            Opcode::Pop16r => format!("pop {}", operand(0)?),
            Opcode::Jp => format!("jp {}", Self::block_label(&ops[0])?),
            Opcode::Jpcc => format!(
                "jp {}, {}",
                Self::print_cc_operand(Self::cc_of(&ops[0])?),
                Self::block_label(&ops[1])?
            ),
            Opcode::Call => format!("call {}", operand(0)?),
            Opcode::Ret => "ret".to_string(),
            Opcode::Select8
            | Opcode::Phi
            | Opcode::AdjCallStackDown
            | Opcode::AdjCallStackUp
            | Opcode::DbgValue => {
                return Err(CodegenError::internal(format!(
                    "pseudo instruction {:?} reached the printer",
                    inst.opcode
                )))
            }
        };

        Ok(match inst.annotation {
            Some(note) => format!("\t{}\t; {}", text, note),
            None => format!("\t{}", text),
        })
    }

    /// Render a whole function as an assembly stream, one line per
    /// instruction, with block labels.
    pub fn print_function(func: &MachineFunction<'_>) -> CodegenResult<String> {
        let mut out = String::new();
        out.push_str(&format!("\t.globl {}\n{}:\n", func.name, func.name));
        let entry = func.entry_block()?;
        for block in func.blocks() {
            if block.id != entry {
                out.push_str(&format!(".LBB_{}:\n", block.id.0));
            }
            for inst in &block.insts {
                out.push_str(&Self::print_inst(inst)?);
                out.push('\n');
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BlockId, FrameIndex, VReg};
    use crate::z80::registers::{RegClass, Z80Reg};

    #[test]
    fn test_register_operand_and_sub_register_modifiers() {
        let hl = Operand::Reg(Reg::Phys(Z80Reg::HL));
        assert_eq!(Z80InstPrinter::print_operand(&hl, None).unwrap(), "hl");
        assert_eq!(
            Z80InstPrinter::print_operand(&hl, Some("sub_8bit_low")).unwrap(),
            "l"
        );
        assert_eq!(
            Z80InstPrinter::print_operand(&hl, Some("sub_8bit_hi")).unwrap(),
            "h"
        );
    }

    #[test]
    fn test_unknown_register_modifier_is_fatal() {
        let bc = Operand::Reg(Reg::Phys(Z80Reg::BC));
        let err = Z80InstPrinter::print_operand(&bc, Some("sub_16bit")).unwrap_err();
        assert!(matches!(err, CodegenError::InvalidModifier { .. }));
    }

    #[test]
    fn test_sub_register_modifier_on_index_register_is_fatal() {
        let ix = Operand::Reg(Reg::Phys(Z80Reg::IX));
        assert!(Z80InstPrinter::print_operand(&ix, Some("sub_8bit_low")).is_err());
    }

    #[test]
    fn test_immediate_modifiers() {
        let imm = Operand::Imm(0x1234);
        assert_eq!(Z80InstPrinter::print_operand(&imm, None).unwrap(), "4660");
        assert_eq!(
            Z80InstPrinter::print_operand(&imm, Some("8bit_low")).unwrap(),
            "52"
        );
        assert_eq!(
            Z80InstPrinter::print_operand(&imm, Some("8bit_hi")).unwrap(),
            "18"
        );
        assert!(Z80InstPrinter::print_operand(&imm, Some("16bit")).is_err());
    }

    #[test]
    fn test_symbol_operand() {
        let sym = Operand::Sym("_mathLib_MULi8");
        assert_eq!(
            Z80InstPrinter::print_operand(&sym, None).unwrap(),
            "_mathLib_MULi8"
        );
    }

    #[test]
    fn test_memory_operand_signs() {
        let pos = Operand::mem_reg(Reg::Phys(Z80Reg::IX), 4);
        assert_eq!(
            Z80InstPrinter::print_mem_operand(&pos, None).unwrap(),
            "(ix+4)"
        );
        let neg = Operand::mem_reg(Reg::Phys(Z80Reg::IX), -2);
        assert_eq!(
            Z80InstPrinter::print_mem_operand(&neg, None).unwrap(),
            "(ix-2)"
        );
    }

    #[test]
    fn test_memory_operand_modifier_adds_to_displacement() {
        let mem = Operand::mem_reg(Reg::Phys(Z80Reg::IY), 1);
        assert_eq!(
            Z80InstPrinter::print_mem_operand(&mem, Some(3)).unwrap(),
            "(iy+4)"
        );
        assert_eq!(
            Z80InstPrinter::print_mem_operand(&mem, Some(-3)).unwrap(),
            "(iy-2)"
        );
    }

    #[test]
    fn test_symbolic_memory_base() {
        let mem = Operand::mem_sym("counter");
        assert_eq!(
            Z80InstPrinter::print_mem_operand(&mem, None).unwrap(),
            "(counter)"
        );
    }

    #[test]
    fn test_unresolved_frame_index_is_fatal() {
        let mem = Operand::frame(FrameIndex(0), 0);
        assert!(Z80InstPrinter::print_mem_operand(&mem, None).is_err());
    }

    #[test]
    fn test_condition_mnemonics() {
        let table = [
            (CondCode::Nz, "nz"),
            (CondCode::Z, "z"),
            (CondCode::Nc, "nc"),
            (CondCode::C, "c"),
            (CondCode::Po, "po"),
            (CondCode::Pe, "pe"),
            (CondCode::P, "p"),
            (CondCode::M, "m"),
        ];
        for (cc, text) in table {
            assert_eq!(Z80InstPrinter::print_cc_operand(cc), text);
        }
    }

    #[test]
    fn test_instruction_rendering() {
        let a = Operand::Reg(Reg::Phys(Z80Reg::A));
        let b = Operand::Reg(Reg::Phys(Z80Reg::B));

        let cases = [
            (
                MachineInst::new(Opcode::Ld8rr, vec![a, b]),
                "\tld a, b",
            ),
            (
                MachineInst::new(Opcode::Add8ri, vec![a, Operand::Imm(5)]),
                "\tadd a, 5",
            ),
            (
                MachineInst::new(Opcode::Cp8r, vec![a, b]),
                "\tcp b",
            ),
            (
                MachineInst::new(Opcode::Sbc8aa, vec![a]),
                "\tsbc a, a",
            ),
            (
                MachineInst::new(Opcode::Push16r, vec![Operand::Reg(Reg::Phys(Z80Reg::IX))]),
                "\tpush ix",
            ),
            (
                MachineInst::new(
                    Opcode::Jpcc,
                    vec![Operand::Cond(CondCode::Nz), Operand::Block(BlockId(2))],
                ),
                "\tjp nz, .LBB_2",
            ),
            (
                MachineInst::new(Opcode::Call, vec![Operand::Sym("_mathLib_UDIVi8")]),
                "\tcall _mathLib_UDIVi8",
            ),
            (
                MachineInst::new(
                    Opcode::Ld8mr,
                    vec![Operand::mem_reg(Reg::Phys(Z80Reg::IX), 4), a],
                ),
                "\tld (ix+4), a",
            ),
            (
                MachineInst::new(
                    Opcode::Add16rr,
                    vec![
                        Operand::Reg(Reg::Phys(Z80Reg::IX)),
                        Operand::Reg(Reg::Phys(Z80Reg::IX)),
                        Operand::Reg(Reg::Phys(Z80Reg::SP)),
                    ],
                ),
                "\tadd ix, sp",
            ),
            (MachineInst::new(Opcode::Ret, vec![]), "\tret"),
        ];
        for (inst, expect) in cases {
            assert_eq!(Z80InstPrinter::print_inst(&inst).unwrap(), expect);
        }
    }

    #[test]
    fn test_sub_register_rendering_in_half_moves() {
        let hl = Operand::Reg(Reg::Phys(Z80Reg::HL));
        let a = Operand::Reg(Reg::Phys(Z80Reg::A));
        let ext = MachineInst::new(Opcode::ExtLo8, vec![a, hl]);
        assert_eq!(Z80InstPrinter::print_inst(&ext).unwrap(), "\tld a, l");
        let ins = MachineInst::new(Opcode::InsHi8, vec![hl, a]);
        assert_eq!(Z80InstPrinter::print_inst(&ins).unwrap(), "\tld h, a");
    }

    #[test]
    fn test_annotation_renders_as_trailing_comment() {
        let inst = MachineInst::new(
            Opcode::Ld8ri,
            vec![Operand::Reg(Reg::Phys(Z80Reg::A)), Operand::Imm(0)],
        )
        .with_annotation("zero high byte");
        assert_eq!(
            Z80InstPrinter::print_inst(&inst).unwrap(),
            "\tld a, 0\t; zero high byte"
        );
    }

    #[test]
    fn test_pseudo_instruction_is_fatal() {
        let inst = MachineInst::new(Opcode::AdjCallStackDown, vec![Operand::Imm(2)]);
        assert!(Z80InstPrinter::print_inst(&inst).is_err());
    }

    #[test]
    fn test_virtual_register_rendering() {
        let v = Operand::Reg(Reg::Virt(VReg {
            id: 7,
            class: RegClass::GR8,
        }));
        assert_eq!(Z80InstPrinter::print_operand(&v, None).unwrap(), "%v7");
        assert!(Z80InstPrinter::print_operand(&v, Some("sub_8bit_low")).is_err());
    }
}
