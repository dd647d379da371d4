// This module provides the mutable per-function machine state: basic blocks with
// successor sets, the function's stable block layout (ids survive block insertion),
// the virtual-register counter, the frame layout (one per function, computed once and
// consumed by every frame-relative operand), and application of the external register
// allocator's vreg-to-physical assignment. Blocks own their instructions from emission
// until the branch rewriter erases them or the printer consumes them.

//! Machine basic blocks, functions and frame layout.

use hashbrown::HashMap;

use crate::core::error::{CodegenError, CodegenResult};
use crate::mir::inst::MachineInst;
use crate::mir::operand::{BlockId, FrameIndex, MemBase, Operand, Reg, VReg};
use crate::z80::registers::{RegClass, Z80Reg};

/// An ordered instruction sequence with a successor set.
///
/// Invariant: the block's terminators must accurately reflect the successor
/// set; a block with no terminator falls through to the next block in layout
/// order, which must then be its only successor.
#[derive(Debug, Clone)]
pub struct MachineBlock<'a> {
    pub id: BlockId,
    pub insts: Vec<MachineInst<'a>>,
    pub succs: Vec<BlockId>,
}

impl<'a> MachineBlock<'a> {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            insts: Vec::new(),
            succs: Vec::new(),
        }
    }

    pub fn push(&mut self, inst: MachineInst<'a>) {
        self.insts.push(inst);
    }

    pub fn add_successor(&mut self, succ: BlockId) {
        if !self.succs.contains(&succ) {
            self.succs.push(succ);
        }
    }

    pub fn remove_successor(&mut self, succ: BlockId) {
        self.succs.retain(|&s| s != succ);
    }

    /// Position of the last instruction that is not a debug marker.
    pub fn last_non_debug(&self) -> Option<usize> {
        self.insts.iter().rposition(|i| !i.is_debug())
    }
}

/// A fixed-size stack-resident local object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameObject {
    pub offset: i32,
    pub size: u32,
}

/// Signed-offset space of fixed-size local objects.
///
/// Objects receive decreasing negative offsets in creation order; the first
/// object of size `s` lands at `-s`. One layout exists per function and is
/// computed once before any frame-relative operand is resolved.
#[derive(Debug, Clone, Default)]
pub struct FrameLayout {
    objects: Vec<FrameObject>,
    stack_size: u32,
    var_sized: bool,
    frame_address_taken: bool,
}

impl FrameLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new local object and return its frame index.
    pub fn create_object(&mut self, size: u32) -> FrameIndex {
        self.stack_size += size;
        let offset = -(self.stack_size as i32);
        let index = FrameIndex(self.objects.len() as u32);
        self.objects.push(FrameObject { offset, size });
        index
    }

    pub fn object_offset(&self, index: FrameIndex) -> CodegenResult<i32> {
        self.objects
            .get(index.0 as usize)
            .map(|o| o.offset)
            .ok_or_else(|| CodegenError::internal(format!("unknown frame index {}", index.0)))
    }

    /// Total bytes of local objects.
    pub fn stack_size(&self) -> u32 {
        self.stack_size
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn has_var_sized_objects(&self) -> bool {
        self.var_sized
    }

    pub fn set_has_var_sized_objects(&mut self) {
        self.var_sized = true;
    }

    pub fn is_frame_address_taken(&self) -> bool {
        self.frame_address_taken
    }

    pub fn set_frame_address_taken(&mut self) {
        self.frame_address_taken = true;
    }
}

/// A function under compilation: blocks in layout order plus frame state.
#[derive(Debug, Clone)]
pub struct MachineFunction<'a> {
    pub name: &'a str,
    pub frame: FrameLayout,
    /// Disables frame-pointer elimination, forcing the dedicated-base path.
    pub disable_fp_elim: bool,
    blocks: Vec<MachineBlock<'a>>,
    next_block: u32,
    next_vreg: u32,
}

impl<'a> MachineFunction<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            frame: FrameLayout::new(),
            disable_fp_elim: false,
            blocks: Vec::new(),
            next_block: 0,
            next_vreg: 0,
        }
    }

    /// Append a new block at the end of the layout.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.push(MachineBlock::new(id));
        id
    }

    /// Insert a new block into the layout immediately after `after`.
    pub fn insert_block_after(&mut self, after: BlockId) -> CodegenResult<BlockId> {
        let pos = self.layout_position(after)?;
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.insert(pos + 1, MachineBlock::new(id));
        Ok(id)
    }

    pub fn block(&self, id: BlockId) -> CodegenResult<&MachineBlock<'a>> {
        self.blocks
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| CodegenError::internal(format!("unknown block {}", id.0)))
    }

    pub fn block_mut(&mut self, id: BlockId) -> CodegenResult<&mut MachineBlock<'a>> {
        self.blocks
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| CodegenError::internal(format!("unknown block {}", id.0)))
    }

    pub fn blocks(&self) -> impl Iterator<Item = &MachineBlock<'a>> {
        self.blocks.iter()
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut MachineBlock<'a>> {
        self.blocks.iter_mut()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn entry_block(&self) -> CodegenResult<BlockId> {
        self.blocks
            .first()
            .map(|b| b.id)
            .ok_or_else(|| CodegenError::internal("function has no blocks"))
    }

    pub fn layout_position(&self, id: BlockId) -> CodegenResult<usize> {
        self.blocks
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| CodegenError::internal(format!("unknown block {}", id.0)))
    }

    /// The block immediately following `id` in layout order, if any.
    pub fn next_in_layout(&self, id: BlockId) -> Option<BlockId> {
        let pos = self.blocks.iter().position(|b| b.id == id)?;
        self.blocks.get(pos + 1).map(|b| b.id)
    }

    /// Allocate a fresh virtual register of the given class.
    pub fn new_vreg(&mut self, class: RegClass) -> Reg {
        let id = self.next_vreg;
        self.next_vreg += 1;
        Reg::Virt(VReg { id, class })
    }

    pub fn vreg_count(&self) -> u32 {
        self.next_vreg
    }
}

/// The external register allocator's output: virtual id to physical register.
#[derive(Debug, Clone, Default)]
pub struct RegisterMap {
    map: HashMap<u32, Z80Reg>,
}

impl RegisterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, vreg: u32, phys: Z80Reg) {
        self.map.insert(vreg, phys);
    }

    pub fn get(&self, vreg: u32) -> Option<Z80Reg> {
        self.map.get(&vreg).copied()
    }
}

fn resolve_reg(map: &RegisterMap, reg: Reg) -> CodegenResult<Reg> {
    match reg {
        Reg::Phys(_) => Ok(reg),
        Reg::Virt(v) => {
            let phys = map
                .get(v.id)
                .ok_or(CodegenError::UnallocatedRegister { vreg: v.id })?;
            if !v.class.contains(phys) {
                return Err(CodegenError::internal(format!(
                    "register {} is not in class {:?} required by v{}",
                    phys.name(),
                    v.class,
                    v.id
                )));
            }
            Ok(Reg::Phys(phys))
        }
    }
}

/// Rewrite every virtual register in the function with its physical
/// assignment, enforcing class compatibility.
pub fn apply_register_map(func: &mut MachineFunction<'_>, map: &RegisterMap) -> CodegenResult<()> {
    for block in func.blocks.iter_mut() {
        for inst in &mut block.insts {
            for operand in &mut inst.operands {
                match operand {
                    Operand::Reg(r) => *r = resolve_reg(map, *r)?,
                    Operand::Mem {
                        base: MemBase::Reg(r),
                        ..
                    } => *r = resolve_reg(map, *r)?,
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::inst::Opcode;

    #[test]
    fn test_frame_layout_offsets() {
        let mut frame = FrameLayout::new();
        let a = frame.create_object(2);
        let b = frame.create_object(1);
        let c = frame.create_object(2);

        assert_eq!(frame.object_offset(a).unwrap(), -2);
        assert_eq!(frame.object_offset(b).unwrap(), -3);
        assert_eq!(frame.object_offset(c).unwrap(), -5);
        assert_eq!(frame.stack_size(), 5);
    }

    #[test]
    fn test_block_layout_and_insertion() {
        let mut f = MachineFunction::new("f");
        let b0 = f.create_block();
        let b1 = f.create_block();
        assert_eq!(f.next_in_layout(b0), Some(b1));

        let mid = f.insert_block_after(b0).unwrap();
        assert_eq!(f.next_in_layout(b0), Some(mid));
        assert_eq!(f.next_in_layout(mid), Some(b1));
        // Ids are stable across insertion.
        assert!(f.block(b1).is_ok());
    }

    #[test]
    fn test_successor_dedup() {
        let mut f = MachineFunction::new("f");
        let b0 = f.create_block();
        let b1 = f.create_block();
        let blk = f.block_mut(b0).unwrap();
        blk.add_successor(b1);
        blk.add_successor(b1);
        assert_eq!(blk.succs.len(), 1);
    }

    #[test]
    fn test_apply_register_map() {
        let mut f = MachineFunction::new("f");
        let b = f.create_block();
        let v = f.new_vreg(RegClass::GR8);
        let vid = match v {
            Reg::Virt(vr) => vr.id,
            _ => unreachable!(),
        };
        f.block_mut(b).unwrap().push(MachineInst::new(
            Opcode::Ld8rr,
            vec![Operand::Reg(v), Operand::Reg(Reg::Phys(Z80Reg::A))],
        ));

        let mut map = RegisterMap::new();
        map.assign(vid, Z80Reg::B);
        apply_register_map(&mut f, &map).unwrap();

        let inst = &f.block(b).unwrap().insts[0];
        assert_eq!(inst.operands[0], Operand::Reg(Reg::Phys(Z80Reg::B)));
    }

    #[test]
    fn test_apply_register_map_class_mismatch() {
        let mut f = MachineFunction::new("f");
        let b = f.create_block();
        let v = f.new_vreg(RegClass::GR16);
        f.block_mut(b)
            .unwrap()
            .push(MachineInst::new(Opcode::Push16r, vec![Operand::Reg(v)]));

        let mut map = RegisterMap::new();
        map.assign(0, Z80Reg::A); // 8-bit register for a 16-bit class
        assert!(apply_register_map(&mut f, &map).is_err());
    }

    #[test]
    fn test_apply_register_map_missing_assignment() {
        let mut f = MachineFunction::new("f");
        let b = f.create_block();
        let v = f.new_vreg(RegClass::GR8);
        f.block_mut(b).unwrap().push(MachineInst::new(
            Opcode::Ld8rr,
            vec![Operand::Reg(v), Operand::Reg(Reg::Phys(Z80Reg::A))],
        ));

        let map = RegisterMap::new();
        let err = apply_register_map(&mut f, &map).unwrap_err();
        assert!(matches!(
            err,
            crate::core::error::CodegenError::UnallocatedRegister { vreg: 0 }
        ));
    }
}
