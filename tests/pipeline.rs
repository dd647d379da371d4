//! End-to-end pipeline test: legalization, selection, register-map
//! application, call-frame and frame-index elimination, branch cleanup and
//! printing of a small function with a frame slot, a runtime-library call and
//! a conditional branch.

use bumpalo::Bump;
use z80gen::core::{
    initialize_targets, CodegenSession, IrFunction, Op, Predicate, Signature, TargetRegistry,
    ValueType,
};
use z80gen::mir::{apply_register_map, MachineFunction, MemBase, Operand, Reg, RegisterMap};
use z80gen::z80::isel::select_function;
use z80gen::z80::printer::Z80InstPrinter;
use z80gen::z80::Z80FrameLowering;
use z80gen::{RegClass, Z80Reg};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Assign every virtual register a physical register of its class. The
/// real allocator is external; this stand-in only has to respect classes.
fn allocate_everything(func: &MachineFunction<'_>) -> RegisterMap {
    let gr8 = [Z80Reg::B, Z80Reg::C, Z80Reg::D];
    let gr16 = [Z80Reg::HL, Z80Reg::DE, Z80Reg::BC];
    let mut map = RegisterMap::new();
    let mut gr8_next = 0usize;
    let mut gr16_next = 0usize;

    let mut assign = |reg: &Reg, map: &mut RegisterMap| {
        if let Reg::Virt(v) = reg {
            if map.get(v.id).is_some() {
                return;
            }
            let phys = match v.class {
                RegClass::Acc => Z80Reg::A,
                RegClass::GR8 => {
                    let r = gr8[gr8_next % gr8.len()];
                    gr8_next += 1;
                    r
                }
                RegClass::GR16 => {
                    let r = gr16[gr16_next % gr16.len()];
                    gr16_next += 1;
                    r
                }
                RegClass::Index => Z80Reg::IY,
            };
            map.assign(v.id, phys);
        }
    };

    for block in func.blocks() {
        for inst in &block.insts {
            for operand in &inst.operands {
                match operand {
                    Operand::Reg(r) => assign(r, &mut map),
                    Operand::Mem {
                        base: MemBase::Reg(r),
                        ..
                    } => assign(r, &mut map),
                    _ => {}
                }
            }
        }
    }
    map
}

#[test]
fn test_full_pipeline() {
    init_logging();
    let arena = Bump::new();
    let session = CodegenSession::new(&arena);

    let mut registry = TargetRegistry::new();
    initialize_targets(&mut registry);
    let target = registry.lookup("z80").expect("z80 target registered");

    // fn f(a: i8, b: i8) -> i8 {
    //   local = a * b;            // runtime-library multiply
    //   if a > b goto exit;       // swapped-operand carry compare
    //   (empty fallthrough block)
    //   exit: return local;
    // }
    let mut ir = IrFunction::new(
        "mul_smaller",
        Signature {
            args: vec![ValueType::I8, ValueType::I8],
            results: vec![ValueType::I8],
            ..Default::default()
        },
    );
    let entry = ir.add_block();
    let mid = ir.add_block();
    let exit = ir.add_block();

    let a = ir.push(entry, Op::Arg(0), ValueType::I8);
    let b = ir.push(entry, Op::Arg(1), ValueType::I8);
    let product = ir.push(
        entry,
        Op::Binary {
            op: z80gen::core::BinaryOp::Mul,
            lhs: a,
            rhs: b,
        },
        ValueType::I8,
    );
    let slot = ir.push(entry, Op::FrameSlot { size: 1 }, ValueType::Ptr);
    ir.push(
        entry,
        Op::Store {
            value: product,
            addr: slot,
        },
        ValueType::I8,
    );
    ir.push(
        entry,
        Op::BrCond {
            pred: Predicate::UGt,
            lhs: a,
            rhs: b,
            target: exit,
        },
        ValueType::I8,
    );
    ir.push(mid, Op::Br { target: exit }, ValueType::I8);
    let loaded = ir.push(exit, Op::Load { addr: slot }, ValueType::I8);
    ir.push(exit, Op::Ret { value: Some(loaded) }, ValueType::I8);

    // Legalize and select.
    let legal = target.lowering.legalize(&session, &ir).unwrap();
    let mut mf = select_function(&session, &legal).unwrap();
    assert_eq!(mf.block_count(), 3);
    assert_eq!(mf.frame.stack_size(), 1);

    // External register allocation.
    let map = allocate_everything(&mf);
    apply_register_map(&mut mf, &map).unwrap();

    // Branch cleanup: the jump to the next block in layout disappears; the
    // returning block is reported unanalyzable and left alone.
    let block_ids: Vec<_> = mf.blocks().map(|b| b.id).collect();
    let mut simplified = 0;
    for id in block_ids {
        match target.instrs.analyze_branch(&mut mf, id, true) {
            Ok(Some(_)) => simplified += 1,
            Ok(None) => {}
            Err(e) => panic!("branch analysis failed: {}", e),
        }
    }
    assert_eq!(simplified, 2);
    let mid_block = mf.blocks().nth(1).unwrap();
    assert!(mid_block.insts.is_empty(), "fallthrough jump deleted");

    // Frame finalization.
    target.frames.eliminate_call_frame_pseudos(&mut mf).unwrap();
    target.frames.emit_prologue(&mut mf).unwrap();
    let ret_block = mf.blocks().last().unwrap().id;
    target.frames.emit_epilogue(&mut mf, ret_block).unwrap();
    target.frames.eliminate_frame_indices(&mut mf).unwrap();

    let text = Z80InstPrinter::print_function(&mf).unwrap();
    log::debug!("generated assembly:\n{}", text);

    // Prologue and epilogue bracket the body.
    let expected_order = [
        "push ix",
        "ld ix, -1",
        "add ix, sp",
        "ld sp, ix",
        "call _mathLib_MULi8",
        "ld (ix+2), ",
        "jp c, .LBB_2",
        ".LBB_1:",
        ".LBB_2:",
        "ld ix, 1",
        "pop ix",
        "ret",
    ];
    let mut cursor = 0;
    for needle in expected_order {
        match text[cursor..].find(needle) {
            Some(at) => cursor += at + needle.len(),
            None => panic!("missing `{}` after byte {} in:\n{}", needle, cursor, text),
        }
    }

    // The local resolves to (ix+2): offset -1 + frame size 1 + 2 for the
    // saved base register.
    assert!(text.contains("ld (ix+2), "));
    // The compare uses swapped operands for the greater-than predicate, so
    // the accumulator holds b.
    assert!(text.contains("cp "));
    // No pseudo instructions or unresolved frame indices survived.
    assert!(!text.contains("adjcallstack"));
    assert!(!text.contains("select8"));

    let stats = session.stats();
    assert_eq!(stats.functions_selected, 1);
    assert_eq!(stats.libcalls_emitted, 1);
    assert!(stats.instructions_selected > 0);
}

#[test]
fn test_pipeline_rejects_variadic_functions() {
    init_logging();
    let arena = Bump::new();
    let session = CodegenSession::new(&arena);

    let mut ir = IrFunction::new(
        "printf_like",
        Signature {
            args: vec![ValueType::Ptr],
            variadic: true,
            ..Default::default()
        },
    );
    let entry = ir.add_block();
    ir.push(entry, Op::Ret { value: None }, ValueType::I8);

    let rules = z80gen::z80::Z80Lowering::new();
    let legal = rules.legalize(&session, &ir).unwrap();
    let err = select_function(&session, &legal).unwrap_err();
    assert!(matches!(
        err,
        z80gen::core::CodegenError::Unimplemented { .. }
    ));
}

#[test]
fn test_pipeline_zero_frame_has_no_prologue() {
    init_logging();
    let arena = Bump::new();
    let session = CodegenSession::new(&arena);

    let mut ir = IrFunction::new(
        "identity",
        Signature {
            args: vec![ValueType::I8],
            results: vec![ValueType::I8],
            ..Default::default()
        },
    );
    let entry = ir.add_block();
    let a = ir.push(entry, Op::Arg(0), ValueType::I8);
    ir.push(entry, Op::Ret { value: Some(a) }, ValueType::I8);

    let rules = z80gen::z80::Z80Lowering::new();
    let legal = rules.legalize(&session, &ir).unwrap();
    let mut mf = select_function(&session, &legal).unwrap();
    let map = allocate_everything(&mf);
    apply_register_map(&mut mf, &map).unwrap();

    Z80FrameLowering::emit_prologue(&mut mf).unwrap();
    let entry_mb = mf.entry_block().unwrap();
    Z80FrameLowering::emit_epilogue(&mut mf, entry_mb).unwrap();

    let text = Z80InstPrinter::print_function(&mf).unwrap();
    assert!(!text.contains("push ix"));
    assert!(!text.contains("pop ix"));
    assert!(text.trim_end().ends_with("ret"));
}
