//! Bare AArch64 instruction word encoders. Each function returns one `u32`
//! machine word in little-endian instruction order; `codegen` is the only
//! caller and is responsible for sequencing and branch-target patching.
//!
//! Only the encodings `codegen` actually emits are here — this is not a
//! general assembler.

#![allow(clippy::unusual_byte_groupings)]

pub const XZR: u8 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    LtS,
    LeS,
    GtS,
    GeS,
    LtU,
    LeU,
    GtU,
    GeU,
}

impl Cond {
    fn encoding(self) -> u32 {
        match self {
            Cond::Eq => 0b0000,
            Cond::Ne => 0b0001,
            Cond::LtU => 0b0011, // CC/LO
            Cond::GeU => 0b0010, // CS/HS
            Cond::GtU => 0b1000, // HI
            Cond::LeU => 0b1001, // LS
            Cond::LtS => 0b1011, // LT
            Cond::GeS => 0b1010, // GE
            Cond::GtS => 0b1100, // GT
            Cond::LeS => 0b1101, // LE
        }
    }

    fn inverted(self) -> u32 {
        self.encoding() ^ 0b0001
    }
}

pub fn movz(rd: u8, imm16: u16, shift_words: u8) -> u32 {
    0xD280_0000 | (u32::from(shift_words) << 21) | (u32::from(imm16) << 5) | u32::from(rd)
}

pub fn movk(rd: u8, imm16: u16, shift_words: u8) -> u32 {
    0xF280_0000 | (u32::from(shift_words) << 21) | (u32::from(imm16) << 5) | u32::from(rd)
}

/// Four `movz`/`movk` words, always emitted in full (even for zero chunks)
/// so a caller doing branch-target fixups can rely on a fixed instruction
/// count per immediate load.
pub fn load_imm64_fixed(rd: u8, value: u64, out: &mut alloc::vec::Vec<u32>) {
    out.push(movz(rd, value as u16, 0));
    for shift in 1..4u8 {
        out.push(movk(rd, (value >> (shift * 16)) as u16, shift));
    }
}

/// Two words (`movz`+`movk`) for a 32-bit immediate.
pub fn load_imm32_fixed(rd: u8, value: u32, out: &mut alloc::vec::Vec<u32>) {
    out.push(movz(rd, value as u16, 0));
    out.push(movk(rd, (value >> 16) as u16, 1));
}

/// `csel rd, rn, rm, cond`.
pub fn csel(rd: u8, rn: u8, rm: u8, cond: Cond) -> u32 {
    0x9A80_0000 | (u32::from(rm) << 16) | (cond.encoding() << 12) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn add_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    0x8B00_0000 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn sub_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    0xCB00_0000 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

/// `adds xd, xn, xm` — like [`add_reg`] but sets flags; `Cond::GeU` (carry
/// set) after this holds iff the unsigned 64-bit addition overflowed.
pub fn adds_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    0xAB00_0000 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn mul(rd: u8, rn: u8, rm: u8) -> u32 {
    0x9B00_7C00 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn sdiv(rd: u8, rn: u8, rm: u8) -> u32 {
    0x9AC0_0C00 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn udiv(rd: u8, rn: u8, rm: u8) -> u32 {
    0x9AC0_0800 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn and_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    0x8A00_0000 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn orr_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    0xAA00_0000 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn eor_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    0xCA00_0000 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn lslv(rd: u8, rn: u8, rm: u8) -> u32 {
    0x9AC0_2000 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn lsrv(rd: u8, rn: u8, rm: u8) -> u32 {
    0x9AC0_2400 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn asrv(rd: u8, rn: u8, rm: u8) -> u32 {
    0x9AC0_2800 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn rorv(rd: u8, rn: u8, rm: u8) -> u32 {
    0x9AC0_2C00 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

/// `mov rd, rm` (alias of `orr rd, xzr, rm`).
pub fn mov_reg(rd: u8, rm: u8) -> u32 {
    orr_reg(rd, XZR, rm)
}

/// `cmp rn, rm` (alias of `subs xzr, rn, rm`).
pub fn cmp(rn: u8, rm: u8) -> u32 {
    0xEB00_001F | (u32::from(rm) << 16) | (u32::from(rn) << 5)
}

/// `cset rd, cond` (alias of `csinc rd, xzr, xzr, invert(cond)`).
pub fn cset(rd: u8, cond: Cond) -> u32 {
    0x9A9F_07E0 | (cond.inverted() << 12) | u32::from(rd)
}

/// `ldr xt, [xn, #(imm12*8)]`.
pub fn ldr64_imm(rt: u8, rn: u8, imm12: u16) -> u32 {
    0xF940_0000 | (u32::from(imm12) << 10) | (u32::from(rn) << 5) | u32::from(rt)
}

/// `str xt, [xn, #(imm12*8)]`.
pub fn str64_imm(rt: u8, rn: u8, imm12: u16) -> u32 {
    0xF900_0000 | (u32::from(imm12) << 10) | (u32::from(rn) << 5) | u32::from(rt)
}

/// `ldr wt, [xn, #(imm12*4)]`.
pub fn ldr32_imm(rt: u8, rn: u8, imm12: u16) -> u32 {
    0xB940_0000 | (u32::from(imm12) << 10) | (u32::from(rn) << 5) | u32::from(rt)
}

/// `str wt, [xn, #(imm12*4)]`.
pub fn str32_imm(rt: u8, rn: u8, imm12: u16) -> u32 {
    0xB900_0000 | (u32::from(imm12) << 10) | (u32::from(rn) << 5) | u32::from(rt)
}

/// Unconditional branch, PC-relative in instruction words (not bytes).
pub fn b(imm26: i32) -> u32 {
    0x1400_0000 | (imm26 as u32 & 0x03FF_FFFF)
}

pub fn b_cond(imm19: i32, cond: Cond) -> u32 {
    0x5400_0000 | ((imm19 as u32 & 0x7_FFFF) << 5) | cond.encoding()
}

/// `blr xn`.
pub fn blr(rn: u8) -> u32 {
    0xD63F_0000 | (u32::from(rn) << 5)
}

/// `ldr xt, [xn, xm]` (register offset, `LSL #0`).
pub fn ldr64_reg(rt: u8, rn: u8, rm: u8) -> u32 {
    0xF860_6800 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rt)
}

/// `str xt, [xn, xm]`.
pub fn str64_reg(rt: u8, rn: u8, rm: u8) -> u32 {
    0xF820_6800 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rt)
}

/// `ldr wt, [xn, xm]`.
pub fn ldr32_reg(rt: u8, rn: u8, rm: u8) -> u32 {
    0xB860_6800 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rt)
}

/// `str wt, [xn, xm]`.
pub fn str32_reg(rt: u8, rn: u8, rm: u8) -> u32 {
    0xB820_6800 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rt)
}

/// `ldrh wt, [xn, xm]` (zero-extending).
pub fn ldrh_reg(rt: u8, rn: u8, rm: u8) -> u32 {
    0x7860_6800 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rt)
}

/// `strh wt, [xn, xm]`.
pub fn strh_reg(rt: u8, rn: u8, rm: u8) -> u32 {
    0x7820_6800 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rt)
}

/// `ldrb wt, [xn, xm]` (zero-extending).
pub fn ldrb_reg(rt: u8, rn: u8, rm: u8) -> u32 {
    0x3860_6800 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rt)
}

/// `strb wt, [xn, xm]`.
pub fn strb_reg(rt: u8, rn: u8, rm: u8) -> u32 {
    0x3820_6800 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rt)
}

/// `sxtb wd, wn` (alias of `sbfm wd, wn, #0, #7`).
pub fn sxtb(rd: u8, rn: u8) -> u32 {
    0x1300_1C00 | (u32::from(rn) << 5) | u32::from(rd)
}

/// `sxth wd, wn` (alias of `sbfm wd, wn, #0, #15`).
pub fn sxth(rd: u8, rn: u8) -> u32 {
    0x1300_3C00 | (u32::from(rn) << 5) | u32::from(rd)
}

/// `sxtw xd, wn` (alias of `sbfm xd, xn, #0, #31`); widens a 32-bit signed
/// value already resident in `wn` to a full 64-bit sign extension in `xd`.
pub fn sxtw(rd: u8, rn: u8) -> u32 {
    0x9340_7C00 | (u32::from(rn) << 5) | u32::from(rd)
}

/// `msub rd, rn, rm, ra` (`rd = ra - rn*rm`), used to compute a remainder
/// from a quotient already produced by `sdiv`/`udiv`.
pub fn msub(rd: u8, rn: u8, rm: u8, ra: u8) -> u32 {
    0x9B00_8000 | (u32::from(rm) << 16) | (u32::from(ra) << 10) | (u32::from(rn) << 5) | u32::from(rd)
}

/// `ret` (implicitly via `x30`).
pub fn ret() -> u32 {
    0xD65F_03C0
}
