//! §3 `Store`: exclusive owner of every memory, table, global and function
//! record. Instances never hold these directly, only indices into the
//! arenas here, so instances can be dropped and recreated without
//! disturbing anything another instance still references (e.g. a shared
//! imported memory).

use zwasm_collections::{define_index, Arena};

use crate::config::Config;
use crate::func::FuncRecord;
use crate::global::GlobalInstance;
use crate::instance::Instance;
use crate::memory::LinearMemory;
use crate::table::Table;

define_index!(pub struct MemoryIdx;);
define_index!(pub struct TableIdx;);
define_index!(pub struct GlobalIdx;);
define_index!(pub struct FuncIdx;);
define_index!(pub struct InstanceIdx;);

/// Owns every live Wasm object. One `Store` can back many `Instance`s
/// (imports are resolved by handing another instance's indices to a new
/// one at instantiation time, never by copying data).
pub struct Store {
    config: Config,
    memories: Arena<MemoryIdx, LinearMemory>,
    tables: Arena<TableIdx, Table>,
    globals: Arena<GlobalIdx, GlobalInstance>,
    funcs: Arena<FuncIdx, FuncRecord>,
    instances: Arena<InstanceIdx, Instance>,
    /// Side table of 128-bit payloads. A `v128` register value is the u32
    /// index into this table, not the bits themselves — the register file
    /// is one u64 slot per value, same trick as [`crate::table::RefValue`].
    /// Lives on the `Store`, not the per-call `Vm`, so a `v128` crossing
    /// `invoke`'s return boundary stays valid.
    v128_pool: Vec<u128>,
}

impl Store {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            memories: Arena::new(),
            tables: Arena::new(),
            globals: Arena::new(),
            funcs: Arena::new(),
            instances: Arena::new(),
            v128_pool: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn alloc_memory(&mut self, memory: LinearMemory) -> MemoryIdx {
        self.memories.alloc(memory)
    }

    pub fn alloc_table(&mut self, table: Table) -> TableIdx {
        self.tables.alloc(table)
    }

    pub fn alloc_global(&mut self, global: GlobalInstance) -> GlobalIdx {
        self.globals.alloc(global)
    }

    pub fn alloc_func(&mut self, func: FuncRecord) -> FuncIdx {
        self.funcs.alloc(func)
    }

    pub fn alloc_instance(&mut self, instance: Instance) -> InstanceIdx {
        self.instances.alloc(instance)
    }

    #[must_use]
    pub fn memory(&self, idx: MemoryIdx) -> Option<&LinearMemory> {
        self.memories.get(idx)
    }

    pub fn memory_mut(&mut self, idx: MemoryIdx) -> Option<&mut LinearMemory> {
        self.memories.get_mut(idx)
    }

    #[must_use]
    pub fn table(&self, idx: TableIdx) -> Option<&Table> {
        self.tables.get(idx)
    }

    pub fn table_mut(&mut self, idx: TableIdx) -> Option<&mut Table> {
        self.tables.get_mut(idx)
    }

    /// Two distinct tables, mutably, for `table.copy` between different
    /// tables. Returns `None` if either index is missing, or if `a == b`
    /// (callers fall back to [`Store::table_mut`] + `Table::copy_within`
    /// for the same-table case).
    pub fn table_pair_mut(&mut self, a: TableIdx, b: TableIdx) -> Option<(&mut Table, &mut Table)> {
        self.tables.get_pair_mut(a, b)
    }

    #[must_use]
    pub fn global(&self, idx: GlobalIdx) -> Option<&GlobalInstance> {
        self.globals.get(idx)
    }

    pub fn global_mut(&mut self, idx: GlobalIdx) -> Option<&mut GlobalInstance> {
        self.globals.get_mut(idx)
    }

    #[must_use]
    pub fn func(&self, idx: FuncIdx) -> Option<&FuncRecord> {
        self.funcs.get(idx)
    }

    #[must_use]
    pub fn instance(&self, idx: InstanceIdx) -> Option<&Instance> {
        self.instances.get(idx)
    }

    pub fn instance_mut(&mut self, idx: InstanceIdx) -> Option<&mut Instance> {
        self.instances.get_mut(idx)
    }

    /// Interns a 128-bit value, returning its slab index for use as a
    /// register value.
    pub fn alloc_v128(&mut self, value: u128) -> u32 {
        let idx = u32::try_from(self.v128_pool.len()).expect("v128 pool overflow");
        self.v128_pool.push(value);
        idx
    }

    #[must_use]
    pub fn v128(&self, idx: u32) -> Option<u128> {
        self.v128_pool.get(idx as usize).copied()
    }

    pub fn set_v128(&mut self, idx: u32, value: u128) {
        self.v128_pool[idx as usize] = value;
    }
}
