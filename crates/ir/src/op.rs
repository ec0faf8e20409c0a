use core::fmt::{self, Display};

/// An invalid [`Op`] ordinal, surfaced when decoding a corrupt RegIR stream.
#[derive(Debug, Copy, Clone)]
pub struct InvalidOp(pub u16);

macro_rules! for_each_op {
    ($mac:ident) => {
        $mac! {
            // ---- control (§4.3) ----
            Unreachable = 0x0000,
            /// Sentinel opcode marking a "data word": a [`crate::RegInstr`]
            /// slot that carries overflow call-argument register indices
            /// rather than an executable instruction (§3, `RegInstr`).
            Nop = 0x0001,
            Br = 0x0002,
            BrIfTrue = 0x0003,
            BrIfFalse = 0x0004,
            BrTable = 0x0005,
            Return = 0x0006,
            ReturnCall = 0x0007,
            ReturnCallIndirect = 0x0008,
            Call = 0x0009,
            CallIndirect = 0x000a,
            Trap = 0x000b,

            // ---- locals / constants / copies ----
            I32Const = 0x0010,
            I64Const = 0x0011,
            F32Const = 0x0012,
            F64Const = 0x0013,
            RefNull = 0x0014,
            RefFunc = 0x0015,
            Copy = 0x0016,
            Select = 0x0017,
            Drop = 0x0018,

            // ---- globals ----
            GlobalGet = 0x0020,
            GlobalSet = 0x0021,

            // ---- i32 unary/binary ----
            I32Eqz = 0x0030,
            I32Clz = 0x0031,
            I32Ctz = 0x0032,
            I32Popcnt = 0x0033,
            I32Add = 0x0034,
            I32Sub = 0x0035,
            I32Mul = 0x0036,
            I32DivS = 0x0037,
            I32DivU = 0x0038,
            I32RemS = 0x0039,
            I32RemU = 0x003a,
            I32And = 0x003b,
            I32Or = 0x003c,
            I32Xor = 0x003d,
            I32Shl = 0x003e,
            I32ShrS = 0x003f,
            I32ShrU = 0x0040,
            I32Rotl = 0x0041,
            I32Rotr = 0x0042,
            I32Eq = 0x0043,
            I32Ne = 0x0044,
            I32LtS = 0x0045,
            I32LtU = 0x0046,
            I32GtS = 0x0047,
            I32GtU = 0x0048,
            I32LeS = 0x0049,
            I32LeU = 0x004a,
            I32GeS = 0x004b,
            I32GeU = 0x004c,
            I32Extend8S = 0x004d,
            I32Extend16S = 0x004e,

            // ---- i64 unary/binary ----
            I64Eqz = 0x0050,
            I64Clz = 0x0051,
            I64Ctz = 0x0052,
            I64Popcnt = 0x0053,
            I64Add = 0x0054,
            I64Sub = 0x0055,
            I64Mul = 0x0056,
            I64DivS = 0x0057,
            I64DivU = 0x0058,
            I64RemS = 0x0059,
            I64RemU = 0x005a,
            I64And = 0x005b,
            I64Or = 0x005c,
            I64Xor = 0x005d,
            I64Shl = 0x005e,
            I64ShrS = 0x005f,
            I64ShrU = 0x0060,
            I64Rotl = 0x0061,
            I64Rotr = 0x0062,
            I64Eq = 0x0063,
            I64Ne = 0x0064,
            I64LtS = 0x0065,
            I64LtU = 0x0066,
            I64GtS = 0x0067,
            I64GtU = 0x0068,
            I64LeS = 0x0069,
            I64LeU = 0x006a,
            I64GeS = 0x006b,
            I64GeU = 0x006c,
            I64Extend8S = 0x006d,
            I64Extend16S = 0x006e,
            I64Extend32S = 0x006f,

            // ---- f32/f64 unary/binary/compare ----
            F32Abs = 0x0080,
            F32Neg = 0x0081,
            F32Ceil = 0x0082,
            F32Floor = 0x0083,
            F32Trunc = 0x0084,
            F32Nearest = 0x0085,
            F32Sqrt = 0x0086,
            F32Add = 0x0087,
            F32Sub = 0x0088,
            F32Mul = 0x0089,
            F32Div = 0x008a,
            F32Min = 0x008b,
            F32Max = 0x008c,
            F32Copysign = 0x008d,
            F32Eq = 0x008e,
            F32Ne = 0x008f,
            F32Lt = 0x0090,
            F32Gt = 0x0091,
            F32Le = 0x0092,
            F32Ge = 0x0093,

            F64Abs = 0x00a0,
            F64Neg = 0x00a1,
            F64Ceil = 0x00a2,
            F64Floor = 0x00a3,
            F64Trunc = 0x00a4,
            F64Nearest = 0x00a5,
            F64Sqrt = 0x00a6,
            F64Add = 0x00a7,
            F64Sub = 0x00a8,
            F64Mul = 0x00a9,
            F64Div = 0x00aa,
            F64Min = 0x00ab,
            F64Max = 0x00ac,
            F64Copysign = 0x00ad,
            F64Eq = 0x00ae,
            F64Ne = 0x00af,
            F64Lt = 0x00b0,
            F64Gt = 0x00b1,
            F64Le = 0x00b2,
            F64Ge = 0x00b3,

            // ---- conversions ----
            I32WrapI64 = 0x00c0,
            I64ExtendI32S = 0x00c1,
            I64ExtendI32U = 0x00c2,
            I32TruncF32S = 0x00c3,
            I32TruncF32U = 0x00c4,
            I32TruncF64S = 0x00c5,
            I32TruncF64U = 0x00c6,
            I64TruncF32S = 0x00c7,
            I64TruncF32U = 0x00c8,
            I64TruncF64S = 0x00c9,
            I64TruncF64U = 0x00ca,
            F32ConvertI32S = 0x00cb,
            F32ConvertI32U = 0x00cc,
            F32ConvertI64S = 0x00cd,
            F32ConvertI64U = 0x00ce,
            F32DemoteF64 = 0x00cf,
            F64ConvertI32S = 0x00d0,
            F64ConvertI32U = 0x00d1,
            F64ConvertI64S = 0x00d2,
            F64ConvertI64U = 0x00d3,
            F64PromoteF32 = 0x00d4,
            I32ReinterpretF32 = 0x00d5,
            I64ReinterpretF64 = 0x00d6,
            F32ReinterpretI32 = 0x00d7,
            F64ReinterpretI64 = 0x00d8,
            I32TruncSatF32S = 0x00d9,
            I32TruncSatF32U = 0x00da,
            I32TruncSatF64S = 0x00db,
            I32TruncSatF64U = 0x00dc,
            I64TruncSatF32S = 0x00dd,
            I64TruncSatF32U = 0x00de,
            I64TruncSatF64S = 0x00df,

            // ---- memory (§3 LinearMemory, §4.5.1) ----
            I32Load = 0x0100,
            I64Load = 0x0101,
            F32Load = 0x0102,
            F64Load = 0x0103,
            I32Load8S = 0x0104,
            I32Load8U = 0x0105,
            I32Load16S = 0x0106,
            I32Load16U = 0x0107,
            I64Load8S = 0x0108,
            I64Load8U = 0x0109,
            I64Load16S = 0x010a,
            I64Load16U = 0x010b,
            I64Load32S = 0x010c,
            I64Load32U = 0x010d,
            I32Store = 0x0110,
            I64Store = 0x0111,
            F32Store = 0x0112,
            F64Store = 0x0113,
            I32Store8 = 0x0114,
            I32Store16 = 0x0115,
            I64Store8 = 0x0116,
            I64Store16 = 0x0117,
            I64Store32 = 0x0118,
            MemorySize = 0x0120,
            MemoryGrow = 0x0121,
            MemoryCopy = 0x0122,
            MemoryFill = 0x0123,
            MemoryInit = 0x0124,
            DataDrop = 0x0125,

            // ---- table (§3 Table) ----
            TableGet = 0x0130,
            TableSet = 0x0131,
            TableSize = 0x0132,
            TableGrow = 0x0133,
            TableCopy = 0x0134,
            TableFill = 0x0135,
            TableInit = 0x0136,
            ElemDrop = 0x0137,
            RefIsNull = 0x0138,
            /// Completes the `trunc_sat` family outside the `0xc0..=0xdf`
            /// conversions block, which runs up against the reserved
            /// superinstruction range before reaching it.
            I64TruncSatF64U = 0x0139,

            // ---- superinstructions (§4.3): reserved range 0xE0..=0xEF ----
            /// `local.get $l; i32.const $c; i32.add` fused: `rd = reg[rs1] + imm`.
            AddImmI32 = 0x00e0,
            /// `local.get $l; i32.const $c; i32.sub` fused: `rd = reg[rs1] - imm`.
            SubImmI32 = 0x00e1,
            /// `local.get $l; i32.const $c; i32.lt_s` fused.
            LtSImmI32 = 0x00e2,
            /// `local.get $l; i32.const $c; i32.lt_u` fused.
            LtUImmI32 = 0x00e3,
            /// `local.get $l; i32.const $c; i32.eq` fused.
            EqImmI32 = 0x00e4,
            /// `local.get $a; local.get $b; i32.add` fused, both sources locals.
            AddLocalsI32 = 0x00e5,
            /// `local.get $a; local.get $b; i32.lt_s` fused, both sources locals.
            LtSLocalsI32 = 0x00e6,
            /// `i32.const $c; <binop>` with the constant folded into `operand`
            /// and the single runtime operand in `rs1`.
            AddImmI32Rev = 0x00e7,

            // ---- v128 (§4.3, bounded SIMD subset) ----
            /// `rd` receives a slab index for a 16-byte immediate (`operand`
            /// is the pool64 index of the constant's two halves).
            V128Const = 0x0200,
            V128Load = 0x0201,
            V128Store = 0x0202,
            V128Not = 0x0203,
            V128And = 0x0204,
            V128Or = 0x0205,
            V128Xor = 0x0206,
            I32x4Add = 0x0207,
            I32x4Sub = 0x0208,
            I32x4Mul = 0x0209,
            I64x2Add = 0x020a,
            I64x2Sub = 0x020b,
            I64x2Mul = 0x020c,
            F32x4Add = 0x020d,
            F32x4Sub = 0x020e,
            F32x4Mul = 0x020f,
            F64x2Add = 0x0210,
            F64x2Sub = 0x0211,
            F64x2Mul = 0x0212,
        }
    };
}

macro_rules! define_op {
    ( $( $(#[$attr:meta])* $ident:ident = $discr:literal ),* $(,)? ) => {
        /// The primary 16-bit opcode of a [`crate::RegInstr`] (§3). Values
        /// `0xE0..=0xEF` are superinstructions recognized identically by
        /// the interpreter and the JIT (§4.3, §9 "Superinstructions").
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Op {
            $( $(#[$attr])* $ident = $discr ),*
        }

        impl Op {
            #[must_use]
            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$ident => stringify!($ident), )*
                }
            }
        }

        impl From<Op> for u16 {
            fn from(op: Op) -> Self {
                op as _
            }
        }

        impl TryFrom<u16> for Op {
            type Error = InvalidOp;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $( $discr => Ok(Op::$ident), )*
                    other => Err(InvalidOp(other)),
                }
            }
        }
    };
}

for_each_op!(define_op);

impl Op {
    /// Whether this opcode is one of the fused superinstructions from the
    /// reserved `0xE0..=0xEF` range.
    #[must_use]
    pub fn is_superinstruction(&self) -> bool {
        (u16::from(*self) & 0xfff0) == 0x00e0
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Display for InvalidOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid RegIR opcode 0x{:04x}", self.0)
    }
}
