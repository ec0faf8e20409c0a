use crate::instr::{Pc, RegInstr};
use alloc::vec::Vec;

/// Default virtual register budget; indices are `u8` so this is also the
/// hard ceiling (§3: `0..=MAX_VREG`).
pub const MAX_VREG: usize = 256;

/// Lowered per-function RegIR (§4.3). Produced once by the translator and
/// never mutated afterwards; both Tier 2 and Tier 3 read it immutably.
#[derive(Debug, Clone, Default)]
pub struct RegFunc {
    code: Vec<RegInstr>,
    /// Out-of-line pool for 64-bit immediates (`i64.const`, `f64.const`)
    /// too wide for `RegInstr::operand` (§3).
    pool64: Vec<u64>,
    /// Out-of-line storage for `br_table` target lists: at offset `o`,
    /// `jump_tables[o]` is the target count `n`, `jump_tables[o+1]` is the
    /// default target, and `jump_tables[o+2..o+2+n]` are the indexed
    /// targets. `BrTable::operand` is the offset `o`.
    jump_tables: Vec<Pc>,
    reg_count: u16,
    local_count: u16,
}

impl RegFunc {
    #[must_use]
    pub fn new(code: Vec<RegInstr>, pool64: Vec<u64>, reg_count: u16, local_count: u16) -> Self {
        Self::with_jump_tables(code, pool64, Vec::new(), reg_count, local_count)
    }

    #[must_use]
    pub fn with_jump_tables(
        code: Vec<RegInstr>,
        pool64: Vec<u64>,
        jump_tables: Vec<Pc>,
        reg_count: u16,
        local_count: u16,
    ) -> Self {
        debug_assert!(local_count <= reg_count);
        Self {
            code,
            pool64,
            jump_tables,
            reg_count,
            local_count,
        }
    }

    #[must_use]
    pub fn jump_table(&self, offset: u32) -> (Pc, &[Pc]) {
        let offset = offset as usize;
        let count = self.jump_tables[offset] as usize;
        let default = self.jump_tables[offset + 1];
        (default, &self.jump_tables[offset + 2..offset + 2 + count])
    }

    #[must_use]
    pub fn code(&self) -> &[RegInstr] {
        &self.code
    }

    #[must_use]
    pub fn pool64(&self) -> &[u64] {
        &self.pool64
    }

    /// Tight upper bound on virtual register indices used by this function;
    /// the interpreter and JIT reserve exactly `reg_count + 4` register
    /// stack slots per active call (§3 "Execution frame").
    #[must_use]
    pub fn reg_count(&self) -> u16 {
        self.reg_count
    }

    /// Number of leading virtual registers bound to Wasm locals (params
    /// first, then declared locals); `local_count <= reg_count`.
    #[must_use]
    pub fn local_count(&self) -> u16 {
        self.local_count
    }

    #[must_use]
    pub fn instr_at(&self, pc: Pc) -> Option<&RegInstr> {
        self.code.get(pc as usize)
    }

    #[must_use]
    pub fn pool64_at(&self, index: usize) -> u64 {
        self.pool64[index]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// The four reserved register-stack slots following a frame's virtual
/// registers (§3 "Execution frame"): memory base cache, memory size cache,
/// VM pointer, Instance pointer.
pub const FRAME_RESERVED_SLOTS: u16 = 4;

impl RegFunc {
    /// Total register-stack slots this function's frame occupies,
    /// `reg_count + FRAME_RESERVED_SLOTS`.
    #[must_use]
    pub fn frame_size(&self) -> u32 {
        u32::from(self.reg_count) + u32::from(FRAME_RESERVED_SLOTS)
    }
}
