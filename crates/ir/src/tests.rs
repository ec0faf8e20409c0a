use crate::{Op, RegFunc, RegInstr};

#[test]
fn reg_instr_is_one_word() {
    assert_eq!(core::mem::size_of::<RegInstr>(), 8);
}

#[test]
fn rs2_is_operand_low_byte() {
    let instr = RegInstr::new(Op::I32Add, 3, 1, 2);
    assert_eq!(instr.rd(), 3);
    assert_eq!(instr.rs1(), 1);
    assert_eq!(instr.rs2(), 2);
}

#[test]
fn data_word_roundtrips_four_arg_registers() {
    let word = RegInstr::data_word([4, 5, 6, 7]);
    assert_eq!(word.op().unwrap(), Op::Nop);
    assert_eq!(word.as_data_word(), [4, 5, 6, 7]);
}

#[test]
fn branch_target_patching() {
    let mut instr = RegInstr::new(Op::Br, 0, 0, 0);
    assert_eq!(instr.target_pc(), 0);
    instr.patch_target(42);
    assert_eq!(instr.target_pc(), 42);
}

#[test]
fn superinstruction_range_is_recognized() {
    assert!(Op::AddImmI32.is_superinstruction());
    assert!(Op::LtSLocalsI32.is_superinstruction());
    assert!(!Op::I32Add.is_superinstruction());
}

#[test]
fn reg_func_frame_size_includes_reserved_slots() {
    let func = RegFunc::new(alloc::vec![], alloc::vec![], 10, 3);
    assert_eq!(func.frame_size(), 10 + crate::FRAME_RESERVED_SLOTS as u32);
    assert_eq!(func.local_count(), 3);
}

#[test]
fn invalid_opcode_is_rejected() {
    let instr = RegInstr::new(Op::I32Add, 0, 0, 0);
    // Reconstruct with a bogus opcode to exercise the decode-error path.
    let bytes = unsafe { core::mem::transmute::<RegInstr, [u8; 8]>(instr) };
    let mut bytes = bytes;
    bytes[0] = 0xff;
    bytes[1] = 0xff;
    let corrupt: RegInstr = unsafe { core::mem::transmute(bytes) };
    assert!(corrupt.op().is_err());
}
