//! §4.4 Tier 2: the RegIR dispatch loop, call sequencing and tiering
//! decisions. Everything above this module reaches execution only through
//! [`invoke`] or [`call_function`] — decoding, validating and lowering a
//! module never runs a single instruction.

mod caller;
mod numeric;

extern crate alloc;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ffi::c_void;

use zwasm_core::{Fuel, Trap, TrapCode};
use zwasm_ir::{Op, Pc, RegFunc, RegInstr};

use crate::func::FuncRecord;
use crate::store::{FuncIdx, InstanceIdx, MemoryIdx, Store};
use crate::table::{RefValue, Table};

pub use caller::Caller;

/// Hard ceiling on the register stack, in 64-bit slots (8 MiB). Fixed up
/// front and never reallocated: a JIT call hands out a raw pointer into
/// this buffer, and a nested trampoline call may push more Tier 2 frames
/// onto the same `Vec` while that pointer is still live, so growth would
/// invalidate it (§4.5/§4.6).
pub const MAX_STACK_SLOTS: usize = 1 << 20;

/// One call stack's worth of register-stack storage plus its fuel meter.
/// Created once per top-level [`invoke`] and threaded through every nested
/// [`call_function`] so recursive calls share the same backing buffer.
pub struct Vm {
    stack: Vec<u64>,
    fuel: Option<Fuel>,
}

impl Vm {
    #[must_use]
    pub fn new(fuel: Option<u64>) -> Self {
        Self {
            stack: Vec::with_capacity(MAX_STACK_SLOTS),
            fuel: fuel.map(Fuel::new),
        }
    }

    #[must_use]
    pub fn fuel_remaining(&self) -> Option<u64> {
        self.fuel.as_ref().map(Fuel::remaining)
    }

    fn reserve_frame(&mut self, frame_size: u32) -> Result<usize, Trap> {
        let base = self.stack.len();
        let new_len = base + frame_size as usize;
        if new_len > self.stack.capacity() {
            return Err(Trap::from(TrapCode::StackOverflow));
        }
        self.stack.resize(new_len, 0);
        Ok(base)
    }

    fn release_frame(&mut self, base: usize) {
        self.stack.truncate(base);
    }
}

/// Calls an instance's exported/local function from outside any running
/// Wasm, allocating a fresh [`Vm`]. Used by instantiation's start-function
/// call and by embedder code invoking an export.
///
/// # Errors
///
/// Propagates any [`Trap`] the callee (or something it calls) raises.
pub fn invoke(
    store: &mut Store,
    instance: InstanceIdx,
    func_idx: FuncIdx,
    args: &[u64],
    results: &mut [u64],
) -> Result<(), Trap> {
    let mut vm = Vm::new(store.config().fuel);
    call_function(store, &mut vm, func_idx, args, results, instance)
}

/// Calls `func_idx`, dispatching to a host callback or the Wasm function's
/// current tier. `caller_instance` is the instance of the *calling* frame;
/// it is only observed for host calls (a [`Caller`] needs some instance to
/// resolve module-relative indices against) since a Wasm callee carries its
/// own.
///
/// # Errors
///
/// Propagates a [`Trap`] from the callee, or [`TrapCode::StackOverflow`] if
/// the register stack has no room for the callee's frame.
pub fn call_function(
    store: &mut Store,
    vm: &mut Vm,
    func_idx: FuncIdx,
    args: &[u64],
    results: &mut [u64],
    caller_instance: InstanceIdx,
) -> Result<(), Trap> {
    let record = store.func(func_idx).ok_or(Trap::from(TrapCode::UndefinedElement))?;
    match record {
        FuncRecord::Host(host) => {
            let func = host.func_arc();
            let caller = Caller::new(store, caller_instance);
            func.call(caller, args, results)
        }
        FuncRecord::Wasm(wasm) => {
            wasm.bump_call_count();
            maybe_promote(store.config(), wasm);
            let instance = wasm.instance();
            let jit = wasm.jit_code();
            let code = wasm.code_arc();
            match jit {
                Some(jit) => run_jit(store, vm, &jit, &code, instance, args, results),
                None => run_interpreted(store, vm, &code, instance, args, results),
            }
        }
    }
}

/// Attempts Tier 3 promotion once a function crosses its call-count
/// threshold (§4.4). A function that profiling has touched, or that the
/// embedder disabled JIT for, or that already failed to compile, is left
/// alone — interior mutability on [`crate::func::WasmFunc`] means this only
/// ever needs a shared borrow of the `Store`.
fn maybe_promote(config: &crate::config::Config, wasm: &crate::func::WasmFunc) {
    if !config.jit_enabled || config.trace.profile || wasm.jit_attempted() {
        return;
    }
    if wasm.call_count() < config.hot_call_threshold {
        return;
    }
    let trampolines = crate::trampoline::trampolines();
    match zwasm_jit::compile(wasm.code(), &trampolines) {
        Ok(code) => {
            if config.trace.log_tiering {
                log::debug!("promoted function to tier 3 ({} bytes native code)", code.code_size());
            }
            wasm.set_jit_code(code);
        }
        Err(err) => {
            if config.trace.log_tiering {
                log::debug!("tier 3 promotion declined: {err}");
            }
            wasm.mark_jit_failed();
        }
    }
}

fn run_jit(
    store: &mut Store,
    vm: &mut Vm,
    jit: &zwasm_jit::JitCode,
    code: &RegFunc,
    instance: InstanceIdx,
    args: &[u64],
    results: &mut [u64],
) -> Result<(), Trap> {
    let base = vm.reserve_frame(code.frame_size())?;
    vm.stack[base..base + args.len()].copy_from_slice(args);

    let mut ctx = crate::trampoline::Ctx::new(store, vm, instance);
    let ctx_ptr = core::ptr::addr_of_mut!(ctx).cast::<c_void>();
    // SAFETY: `regs_ptr` points `code.frame_size()` live slots into `vm`'s
    // preallocated (never-reallocating) stack; `ctx_ptr` outlives the call
    // and is only ever read back through `Ctx::from_raw` by the
    // trampolines `jit` was compiled against.
    let trap_ordinal = unsafe {
        let regs_ptr = vm.stack.as_mut_ptr().add(base);
        jit.call(regs_ptr, ctx_ptr, ctx_ptr)
    };

    let outcome = match trap_ordinal {
        0 => {
            let n = results.len();
            results.copy_from_slice(&vm.stack[base..base + n]);
            Ok(())
        }
        ordinal => {
            let code = u8::try_from(ordinal).ok().and_then(|o| TrapCode::try_from(o).ok());
            Err(Trap::from(code.unwrap_or(TrapCode::Unreachable)))
        }
    };
    vm.release_frame(base);
    outcome
}

fn run_interpreted(
    store: &mut Store,
    vm: &mut Vm,
    code: &RegFunc,
    instance: InstanceIdx,
    args: &[u64],
    results: &mut [u64],
) -> Result<(), Trap> {
    let base = vm.reserve_frame(code.frame_size())?;
    vm.stack[base..base + args.len()].copy_from_slice(args);

    let outcome = dispatch(store, vm, code, instance, base);
    let result = match outcome {
        Ok(result_count) => {
            let n = result_count.min(results.len());
            results[..n].copy_from_slice(&vm.stack[base..base + n]);
            Ok(())
        }
        Err(trap) => Err(trap),
    };
    vm.release_frame(base);
    result
}

#[inline]
fn f32r(v: u64) -> f32 {
    f32::from_bits(v as u32)
}
#[inline]
fn f64r(v: u64) -> f64 {
    f64::from_bits(v)
}
#[inline]
fn put_f32(v: f32) -> u64 {
    u64::from(v.to_bits())
}
#[inline]
fn put_f64(v: f64) -> u64 {
    v.to_bits()
}
#[inline]
fn put_bool(v: bool) -> u64 {
    u64::from(v)
}

fn memory0(store: &Store, instance: InstanceIdx) -> Result<MemoryIdx, Trap> {
    store
        .instance(instance)
        .expect("live instance")
        .memory(0)
        .ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))
}

fn ref_to_reg(v: RefValue) -> u64 {
    match v {
        RefValue::Null => u64::from(u32::MAX),
        RefValue::Func(i) | RefValue::Extern(i) => u64::from(i),
    }
}

pub(crate) fn reg_to_ref(value: u64, elem: zwasm_core::RefType) -> RefValue {
    let raw = value as u32;
    if raw == u32::MAX {
        return RefValue::Null;
    }
    if elem == zwasm_core::RefType::Extern {
        RefValue::Extern(raw)
    } else {
        RefValue::Func(raw)
    }
}

/// The per-function RegIR interpreter loop. Returns the number of result
/// values placed at `vm.stack[base..]` on a normal return.
///
/// # Errors
///
/// Any [`Trap`] raised by this function, a nested call, or fuel exhaustion.
#[allow(clippy::too_many_lines)]
fn dispatch(
    store: &mut Store,
    vm: &mut Vm,
    code: &RegFunc,
    instance: InstanceIdx,
    base: usize,
) -> Result<usize, Trap> {
    let mut pc: Pc = 0;
    loop {
        let instr: RegInstr = *code.instr_at(pc).expect("pc always addresses live RegIR");
        if let Some(fuel) = vm.fuel.as_mut() {
            fuel.consume().map_err(|_| Trap::from(TrapCode::OutOfFuel))?;
        }
        let op = instr.op().unwrap_or(Op::Trap);
        if store.config().trace.log_opcodes {
            log::trace!("pc={pc} {op}");
        }

        let rd = instr.rd() as usize;
        let rs1 = instr.rs1() as usize;

        match op {
            Op::Unreachable => return Err(Trap::from(TrapCode::Unreachable)),
            Op::Trap => return Err(Trap::from(TrapCode::Unreachable)),
            Op::Nop | Op::Drop => {}

            Op::Br => {
                pc = instr.target_pc();
                continue;
            }
            Op::BrIfTrue => {
                if vm.stack[base + rs1] != 0 {
                    pc = instr.target_pc();
                    continue;
                }
            }
            Op::BrIfFalse => {
                if vm.stack[base + rs1] == 0 {
                    pc = instr.target_pc();
                    continue;
                }
            }
            Op::BrTable => {
                let selector = vm.stack[base + rs1] as u32;
                let (default, targets) = code.jump_table(instr.operand());
                pc = targets.get(selector as usize).copied().unwrap_or(default);
                continue;
            }
            Op::Return => return Ok(rd),
            Op::ReturnCall => {
                let (first_result, result_count) = exec_call(store, vm, instance, base, &instr)?;
                vm.stack.copy_within(base + first_result..base + first_result + result_count, base);
                return Ok(result_count);
            }
            Op::ReturnCallIndirect => {
                let (first_result, result_count) = exec_call_indirect(store, vm, instance, base, &instr, code)?;
                vm.stack.copy_within(base + first_result..base + first_result + result_count, base);
                return Ok(result_count);
            }
            Op::Call => {
                exec_call(store, vm, instance, base, &instr)?;
            }
            Op::CallIndirect => {
                exec_call_indirect(store, vm, instance, base, &instr, code)?;
            }

            Op::I32Const | Op::F32Const => vm.stack[base + rd] = u64::from(instr.operand()),
            Op::I64Const | Op::F64Const => vm.stack[base + rd] = code.pool64_at(instr.pool_index()),
            Op::RefNull => vm.stack[base + rd] = u64::from(u32::MAX),
            Op::RefFunc => {
                let inst = store.instance(instance).expect("live instance");
                let func_idx = inst.func(instr.operand()).expect("validator-checked func index");
                vm.stack[base + rd] = u64::from(func_idx.into_u32());
            }
            Op::Copy => vm.stack[base + rd] = vm.stack[base + rs1],
            Op::Select => {
                let cond = vm.stack[base + rs1];
                let true_v = (instr.operand() & 0xff) as usize;
                let false_v = ((instr.operand() >> 8) & 0xff) as usize;
                vm.stack[base + rd] = if cond != 0 { vm.stack[base + true_v] } else { vm.stack[base + false_v] };
            }

            Op::GlobalGet => {
                let global_idx = store
                    .instance(instance)
                    .expect("live instance")
                    .global(instr.operand())
                    .expect("validator-checked global index");
                vm.stack[base + rd] = store.global(global_idx).expect("live global").get();
            }
            Op::GlobalSet => {
                let global_idx = store
                    .instance(instance)
                    .expect("live instance")
                    .global(instr.operand())
                    .expect("validator-checked global index");
                let value = vm.stack[base + rs1];
                store.global_mut(global_idx).expect("live global").set(value);
            }

            // ---- i32 ----
            Op::I32Eqz => vm.stack[base + rd] = put_bool(vm.stack[base + rs1] as u32 == 0),
            Op::I32Clz => vm.stack[base + rd] = u64::from((vm.stack[base + rs1] as u32).leading_zeros()),
            Op::I32Ctz => vm.stack[base + rd] = u64::from((vm.stack[base + rs1] as u32).trailing_zeros()),
            Op::I32Popcnt => vm.stack[base + rd] = u64::from((vm.stack[base + rs1] as u32).count_ones()),
            Op::I32Extend8S => vm.stack[base + rd] = (vm.stack[base + rs1] as u8 as i8 as i32 as u32) as u64,
            Op::I32Extend16S => vm.stack[base + rd] = (vm.stack[base + rs1] as u16 as i16 as i32 as u32) as u64,
            Op::I32Add | Op::I32Sub | Op::I32Mul | Op::I32And | Op::I32Or | Op::I32Xor | Op::I32Shl
            | Op::I32ShrS | Op::I32ShrU | Op::I32Rotl | Op::I32Rotr | Op::I32Eq | Op::I32Ne | Op::I32LtS
            | Op::I32LtU | Op::I32GtS | Op::I32GtU | Op::I32LeS | Op::I32LeU | Op::I32GeS | Op::I32GeU => {
                let lhs = vm.stack[base + rs1] as u32;
                let rhs = vm.stack[base + instr.rs2() as usize] as u32;
                let (lhs_s, rhs_s) = (lhs as i32, rhs as i32);
                vm.stack[base + rd] = match op {
                    Op::I32Add => u64::from(lhs.wrapping_add(rhs)),
                    Op::I32Sub => u64::from(lhs.wrapping_sub(rhs)),
                    Op::I32Mul => u64::from(lhs.wrapping_mul(rhs)),
                    Op::I32And => u64::from(lhs & rhs),
                    Op::I32Or => u64::from(lhs | rhs),
                    Op::I32Xor => u64::from(lhs ^ rhs),
                    Op::I32Shl => u64::from(lhs.wrapping_shl(rhs)),
                    Op::I32ShrS => (lhs_s.wrapping_shr(rhs)) as u32 as u64,
                    Op::I32ShrU => u64::from(lhs.wrapping_shr(rhs)),
                    Op::I32Rotl => u64::from(lhs.rotate_left(rhs)),
                    Op::I32Rotr => u64::from(lhs.rotate_right(rhs)),
                    Op::I32Eq => put_bool(lhs == rhs),
                    Op::I32Ne => put_bool(lhs != rhs),
                    Op::I32LtS => put_bool(lhs_s < rhs_s),
                    Op::I32LtU => put_bool(lhs < rhs),
                    Op::I32GtS => put_bool(lhs_s > rhs_s),
                    Op::I32GtU => put_bool(lhs > rhs),
                    Op::I32LeS => put_bool(lhs_s <= rhs_s),
                    Op::I32LeU => put_bool(lhs <= rhs),
                    Op::I32GeS => put_bool(lhs_s >= rhs_s),
                    Op::I32GeU => put_bool(lhs >= rhs),
                    _ => unreachable!(),
                };
            }
            Op::I32DivS | Op::I32DivU | Op::I32RemS | Op::I32RemU => {
                let lhs = vm.stack[base + rs1] as u32 as i32;
                let rhs = vm.stack[base + instr.rs2() as usize] as u32 as i32;
                if rhs == 0 {
                    return Err(Trap::from(TrapCode::DivisionByZero));
                }
                let overflow = lhs == i32::MIN && rhs == -1;
                vm.stack[base + rd] = match op {
                    Op::I32DivS => {
                        if overflow {
                            return Err(Trap::from(TrapCode::IntegerOverflow));
                        }
                        (lhs / rhs) as u32 as u64
                    }
                    Op::I32DivU => ((lhs as u32) / (rhs as u32)) as u64,
                    Op::I32RemS => {
                        if overflow {
                            0
                        } else {
                            (lhs % rhs) as u32 as u64
                        }
                    }
                    Op::I32RemU => u64::from((lhs as u32) % (rhs as u32)),
                    _ => unreachable!(),
                };
            }

            // ---- i64 ----
            Op::I64Eqz => vm.stack[base + rd] = put_bool(vm.stack[base + rs1] == 0),
            Op::I64Clz => vm.stack[base + rd] = u64::from(vm.stack[base + rs1].leading_zeros()),
            Op::I64Ctz => vm.stack[base + rd] = u64::from(vm.stack[base + rs1].trailing_zeros()),
            Op::I64Popcnt => vm.stack[base + rd] = u64::from(vm.stack[base + rs1].count_ones()),
            Op::I64Extend8S => vm.stack[base + rd] = (vm.stack[base + rs1] as u8 as i8 as i64) as u64,
            Op::I64Extend16S => vm.stack[base + rd] = (vm.stack[base + rs1] as u16 as i16 as i64) as u64,
            Op::I64Extend32S => vm.stack[base + rd] = (vm.stack[base + rs1] as u32 as i32 as i64) as u64,
            Op::I64Add | Op::I64Sub | Op::I64Mul | Op::I64And | Op::I64Or | Op::I64Xor | Op::I64Shl
            | Op::I64ShrS | Op::I64ShrU | Op::I64Rotl | Op::I64Rotr | Op::I64Eq | Op::I64Ne | Op::I64LtS
            | Op::I64LtU | Op::I64GtS | Op::I64GtU | Op::I64LeS | Op::I64LeU | Op::I64GeS | Op::I64GeU => {
                let lhs = vm.stack[base + rs1];
                let rhs = vm.stack[base + instr.rs2() as usize];
                let (lhs_s, rhs_s) = (lhs as i64, rhs as i64);
                let shift = (rhs & 0x3f) as u32;
                vm.stack[base + rd] = match op {
                    Op::I64Add => lhs.wrapping_add(rhs),
                    Op::I64Sub => lhs.wrapping_sub(rhs),
                    Op::I64Mul => lhs.wrapping_mul(rhs),
                    Op::I64And => lhs & rhs,
                    Op::I64Or => lhs | rhs,
                    Op::I64Xor => lhs ^ rhs,
                    Op::I64Shl => lhs.wrapping_shl(shift),
                    Op::I64ShrS => lhs_s.wrapping_shr(shift) as u64,
                    Op::I64ShrU => lhs.wrapping_shr(shift),
                    Op::I64Rotl => lhs.rotate_left(shift),
                    Op::I64Rotr => lhs.rotate_right(shift),
                    Op::I64Eq => put_bool(lhs == rhs),
                    Op::I64Ne => put_bool(lhs != rhs),
                    Op::I64LtS => put_bool(lhs_s < rhs_s),
                    Op::I64LtU => put_bool(lhs < rhs),
                    Op::I64GtS => put_bool(lhs_s > rhs_s),
                    Op::I64GtU => put_bool(lhs > rhs),
                    Op::I64LeS => put_bool(lhs_s <= rhs_s),
                    Op::I64LeU => put_bool(lhs <= rhs),
                    Op::I64GeS => put_bool(lhs_s >= rhs_s),
                    Op::I64GeU => put_bool(lhs >= rhs),
                    _ => unreachable!(),
                };
            }
            Op::I64DivS | Op::I64DivU | Op::I64RemS | Op::I64RemU => {
                let lhs = vm.stack[base + rs1] as i64;
                let rhs = vm.stack[base + instr.rs2() as usize] as i64;
                if rhs == 0 {
                    return Err(Trap::from(TrapCode::DivisionByZero));
                }
                let overflow = lhs == i64::MIN && rhs == -1;
                vm.stack[base + rd] = match op {
                    Op::I64DivS => {
                        if overflow {
                            return Err(Trap::from(TrapCode::IntegerOverflow));
                        }
                        (lhs / rhs) as u64
                    }
                    Op::I64DivU => ((lhs as u64) / (rhs as u64)),
                    Op::I64RemS => {
                        if overflow {
                            0
                        } else {
                            (lhs % rhs) as u64
                        }
                    }
                    Op::I64RemU => (lhs as u64) % (rhs as u64),
                    _ => unreachable!(),
                };
            }

            // ---- f32 ----
            Op::F32Abs => vm.stack[base + rd] = put_f32(f32r(vm.stack[base + rs1]).abs()),
            Op::F32Neg => vm.stack[base + rd] = put_f32(-f32r(vm.stack[base + rs1])),
            Op::F32Ceil => vm.stack[base + rd] = put_f32(numeric::f32_ceil(f32r(vm.stack[base + rs1]))),
            Op::F32Floor => vm.stack[base + rd] = put_f32(numeric::f32_floor(f32r(vm.stack[base + rs1]))),
            Op::F32Trunc => vm.stack[base + rd] = put_f32(numeric::f32_trunc(f32r(vm.stack[base + rs1]))),
            Op::F32Nearest => vm.stack[base + rd] = put_f32(numeric::f32_nearest(f32r(vm.stack[base + rs1]))),
            Op::F32Sqrt => vm.stack[base + rd] = put_f32(numeric::f32_sqrt(f32r(vm.stack[base + rs1]))),
            Op::F32Add | Op::F32Sub | Op::F32Mul | Op::F32Div | Op::F32Min | Op::F32Max | Op::F32Copysign
            | Op::F32Eq | Op::F32Ne | Op::F32Lt | Op::F32Gt | Op::F32Le | Op::F32Ge => {
                let lhs = f32r(vm.stack[base + rs1]);
                let rhs = f32r(vm.stack[base + instr.rs2() as usize]);
                vm.stack[base + rd] = match op {
                    Op::F32Add => put_f32(lhs + rhs),
                    Op::F32Sub => put_f32(lhs - rhs),
                    Op::F32Mul => put_f32(lhs * rhs),
                    Op::F32Div => put_f32(lhs / rhs),
                    Op::F32Min => put_f32(numeric::f32_min(lhs, rhs)),
                    Op::F32Max => put_f32(numeric::f32_max(lhs, rhs)),
                    Op::F32Copysign => put_f32(lhs.copysign(rhs)),
                    Op::F32Eq => put_bool(lhs == rhs),
                    Op::F32Ne => put_bool(lhs != rhs),
                    Op::F32Lt => put_bool(lhs < rhs),
                    Op::F32Gt => put_bool(lhs > rhs),
                    Op::F32Le => put_bool(lhs <= rhs),
                    Op::F32Ge => put_bool(lhs >= rhs),
                    _ => unreachable!(),
                };
            }

            // ---- f64 ----
            Op::F64Abs => vm.stack[base + rd] = put_f64(f64r(vm.stack[base + rs1]).abs()),
            Op::F64Neg => vm.stack[base + rd] = put_f64(-f64r(vm.stack[base + rs1])),
            Op::F64Ceil => vm.stack[base + rd] = put_f64(numeric::f64_ceil(f64r(vm.stack[base + rs1]))),
            Op::F64Floor => vm.stack[base + rd] = put_f64(numeric::f64_floor(f64r(vm.stack[base + rs1]))),
            Op::F64Trunc => vm.stack[base + rd] = put_f64(numeric::f64_trunc(f64r(vm.stack[base + rs1]))),
            Op::F64Nearest => vm.stack[base + rd] = put_f64(numeric::f64_nearest(f64r(vm.stack[base + rs1]))),
            Op::F64Sqrt => vm.stack[base + rd] = put_f64(numeric::f64_sqrt(f64r(vm.stack[base + rs1]))),
            Op::F64Add | Op::F64Sub | Op::F64Mul | Op::F64Div | Op::F64Min | Op::F64Max | Op::F64Copysign
            | Op::F64Eq | Op::F64Ne | Op::F64Lt | Op::F64Gt | Op::F64Le | Op::F64Ge => {
                let lhs = f64r(vm.stack[base + rs1]);
                let rhs = f64r(vm.stack[base + instr.rs2() as usize]);
                vm.stack[base + rd] = match op {
                    Op::F64Add => put_f64(lhs + rhs),
                    Op::F64Sub => put_f64(lhs - rhs),
                    Op::F64Mul => put_f64(lhs * rhs),
                    Op::F64Div => put_f64(lhs / rhs),
                    Op::F64Min => put_f64(numeric::f64_min(lhs, rhs)),
                    Op::F64Max => put_f64(numeric::f64_max(lhs, rhs)),
                    Op::F64Copysign => put_f64(lhs.copysign(rhs)),
                    Op::F64Eq => put_bool(lhs == rhs),
                    Op::F64Ne => put_bool(lhs != rhs),
                    Op::F64Lt => put_bool(lhs < rhs),
                    Op::F64Gt => put_bool(lhs > rhs),
                    Op::F64Le => put_bool(lhs <= rhs),
                    Op::F64Ge => put_bool(lhs >= rhs),
                    _ => unreachable!(),
                };
            }

            // ---- conversions ----
            Op::I32WrapI64 => vm.stack[base + rd] = u64::from(vm.stack[base + rs1] as u32),
            Op::I64ExtendI32S => vm.stack[base + rd] = (vm.stack[base + rs1] as u32 as i32 as i64) as u64,
            Op::I64ExtendI32U => vm.stack[base + rd] = u64::from(vm.stack[base + rs1] as u32),
            Op::I32TruncF32S => vm.stack[base + rd] = u64::from(numeric::i32_trunc_f32_s(f32r(vm.stack[base + rs1]))? as u32),
            Op::I32TruncF32U => vm.stack[base + rd] = u64::from(numeric::i32_trunc_f32_u(f32r(vm.stack[base + rs1]))?),
            Op::I32TruncF64S => vm.stack[base + rd] = u64::from(numeric::i32_trunc_f64_s(f64r(vm.stack[base + rs1]))? as u32),
            Op::I32TruncF64U => vm.stack[base + rd] = u64::from(numeric::i32_trunc_f64_u(f64r(vm.stack[base + rs1]))?),
            Op::I64TruncF32S => vm.stack[base + rd] = numeric::i64_trunc_f32_s(f32r(vm.stack[base + rs1]))? as u64,
            Op::I64TruncF32U => vm.stack[base + rd] = numeric::i64_trunc_f32_u(f32r(vm.stack[base + rs1]))?,
            Op::I64TruncF64S => vm.stack[base + rd] = numeric::i64_trunc_f64_s(f64r(vm.stack[base + rs1]))? as u64,
            Op::I64TruncF64U => vm.stack[base + rd] = numeric::i64_trunc_f64_u(f64r(vm.stack[base + rs1]))?,
            Op::F32ConvertI32S => vm.stack[base + rd] = put_f32((vm.stack[base + rs1] as u32 as i32) as f32),
            Op::F32ConvertI32U => vm.stack[base + rd] = put_f32((vm.stack[base + rs1] as u32) as f32),
            Op::F32ConvertI64S => vm.stack[base + rd] = put_f32((vm.stack[base + rs1] as i64) as f32),
            Op::F32ConvertI64U => vm.stack[base + rd] = put_f32((vm.stack[base + rs1]) as f32),
            Op::F32DemoteF64 => vm.stack[base + rd] = put_f32(f64r(vm.stack[base + rs1]) as f32),
            Op::F64ConvertI32S => vm.stack[base + rd] = put_f64(f64::from(vm.stack[base + rs1] as u32 as i32)),
            Op::F64ConvertI32U => vm.stack[base + rd] = put_f64(f64::from(vm.stack[base + rs1] as u32)),
            Op::F64ConvertI64S => vm.stack[base + rd] = put_f64((vm.stack[base + rs1] as i64) as f64),
            Op::F64ConvertI64U => vm.stack[base + rd] = put_f64((vm.stack[base + rs1]) as f64),
            Op::F64PromoteF32 => vm.stack[base + rd] = put_f64(f64::from(f32r(vm.stack[base + rs1]))),
            Op::I32ReinterpretF32 | Op::I64ReinterpretF64 | Op::F32ReinterpretI32 | Op::F64ReinterpretI64 => {
                vm.stack[base + rd] = vm.stack[base + rs1];
            }
            Op::I32TruncSatF32S => vm.stack[base + rd] = u64::from(numeric::i32_trunc_sat_f32_s(f32r(vm.stack[base + rs1])) as u32),
            Op::I32TruncSatF32U => vm.stack[base + rd] = u64::from(numeric::i32_trunc_sat_f32_u(f32r(vm.stack[base + rs1]))),
            Op::I32TruncSatF64S => vm.stack[base + rd] = u64::from(numeric::i32_trunc_sat_f64_s(f64r(vm.stack[base + rs1])) as u32),
            Op::I32TruncSatF64U => vm.stack[base + rd] = u64::from(numeric::i32_trunc_sat_f64_u(f64r(vm.stack[base + rs1]))),
            Op::I64TruncSatF32S => vm.stack[base + rd] = numeric::i64_trunc_sat_f32_s(f32r(vm.stack[base + rs1])) as u64,
            Op::I64TruncSatF32U => vm.stack[base + rd] = numeric::i64_trunc_sat_f32_u(f32r(vm.stack[base + rs1])),
            Op::I64TruncSatF64S => vm.stack[base + rd] = numeric::i64_trunc_sat_f64_s(f64r(vm.stack[base + rs1])) as u64,
            Op::I64TruncSatF64U => vm.stack[base + rd] = numeric::i64_trunc_sat_f64_u(f64r(vm.stack[base + rs1])),

            // ---- memory ----
            Op::I32Load => load(store, instance, vm, base, code, &instr, 4, |b| u64::from(u32::from_le_bytes(b.try_into().unwrap())))?,
            Op::I32Load8S => load(store, instance, vm, base, code, &instr, 1, |b| (b[0] as i8 as i32 as u32) as u64)?,
            Op::I32Load8U => load(store, instance, vm, base, code, &instr, 1, |b| u64::from(b[0]))?,
            Op::I32Load16S => load(store, instance, vm, base, code, &instr, 2, |b| {
                (u16::from_le_bytes(b.try_into().unwrap()) as i16 as i32 as u32) as u64
            })?,
            Op::I32Load16U => load(store, instance, vm, base, code, &instr, 2, |b| {
                u64::from(u16::from_le_bytes(b.try_into().unwrap()))
            })?,
            Op::I64Load => load(store, instance, vm, base, code, &instr, 8, |b| u64::from_le_bytes(b.try_into().unwrap()))?,
            Op::I64Load8S => load(store, instance, vm, base, code, &instr, 1, |b| (b[0] as i8 as i64) as u64)?,
            Op::I64Load8U => load(store, instance, vm, base, code, &instr, 1, |b| u64::from(b[0]))?,
            Op::I64Load16S => load(store, instance, vm, base, code, &instr, 2, |b| {
                (u16::from_le_bytes(b.try_into().unwrap()) as i16 as i64) as u64
            })?,
            Op::I64Load16U => load(store, instance, vm, base, code, &instr, 2, |b| {
                u64::from(u16::from_le_bytes(b.try_into().unwrap()))
            })?,
            Op::I64Load32S => load(store, instance, vm, base, code, &instr, 4, |b| {
                (u32::from_le_bytes(b.try_into().unwrap()) as i32 as i64) as u64
            })?,
            Op::I64Load32U => load(store, instance, vm, base, code, &instr, 4, |b| {
                u64::from(u32::from_le_bytes(b.try_into().unwrap()))
            })?,
            Op::F32Load => load(store, instance, vm, base, code, &instr, 4, |b| {
                u64::from(u32::from_le_bytes(b.try_into().unwrap()))
            })?,
            Op::F64Load => load(store, instance, vm, base, code, &instr, 8, |b| u64::from_le_bytes(b.try_into().unwrap()))?,

            Op::I32Store | Op::F32Store => store_mem(store, instance, vm, base, code, &instr, 4)?,
            Op::I64Store | Op::F64Store => store_mem(store, instance, vm, base, code, &instr, 8)?,
            Op::I32Store8 | Op::I64Store8 => store_mem(store, instance, vm, base, code, &instr, 1)?,
            Op::I32Store16 | Op::I64Store16 => store_mem(store, instance, vm, base, code, &instr, 2)?,
            Op::I64Store32 => store_mem(store, instance, vm, base, code, &instr, 4)?,

            Op::MemorySize => {
                let mem = memory0(store, instance)?;
                vm.stack[base + rd] = store.memory(mem).expect("live memory").pages();
            }
            Op::MemoryGrow => {
                let mem = memory0(store, instance)?;
                let delta = vm.stack[base + rs1];
                let max = store.config().max_memory_pages;
                vm.stack[base + rd] = match store.memory_mut(mem).expect("live memory").grow(delta, max) {
                    Some(prev) => prev,
                    None => u64::MAX,
                };
            }
            Op::MemoryCopy => {
                let mem = memory0(store, instance)?;
                let dst = vm.stack[base + rd];
                let src = vm.stack[base + rd + 1];
                let len = vm.stack[base + rd + 2];
                store.memory_mut(mem).expect("live memory").copy_within(dst, src, len).map_err(Trap::from)?;
            }
            Op::MemoryFill => {
                let mem = memory0(store, instance)?;
                let dst = vm.stack[base + rd];
                let value = vm.stack[base + rd + 1] as u8;
                let len = vm.stack[base + rd + 2];
                store.memory_mut(mem).expect("live memory").fill(dst, value, len).map_err(Trap::from)?;
            }
            Op::MemoryInit => {
                let mem = memory0(store, instance)?;
                let data_idx = code.pool64_at(instr.pool_index()) as u32;
                let inst = store.instance(instance).expect("live instance");
                let dst = vm.stack[base + rd];
                let src = vm.stack[base + rd + 1];
                let len = vm.stack[base + rd + 2];
                if inst.is_data_dropped(data_idx) {
                    if len != 0 {
                        return Err(Trap::from(TrapCode::OutOfBoundsMemoryAccess));
                    }
                } else {
                    let src_end = src.checked_add(len).ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))?;
                    let segment = inst
                        .module()
                        .data
                        .get(data_idx as usize)
                        .ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))?;
                    let slice = segment
                        .bytes
                        .get(src as usize..src_end as usize)
                        .ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))?
                        .to_vec();
                    store.memory_mut(mem).expect("live memory").write(dst, &slice).map_err(Trap::from)?;
                }
            }
            Op::DataDrop => {
                store.instance_mut(instance).expect("live instance").drop_data(instr.operand());
            }

            // ---- table ----
            Op::TableGet => {
                let table_id = store
                    .instance(instance)
                    .expect("live instance")
                    .table(instr.operand())
                    .ok_or(Trap::from(TrapCode::UndefinedElement))?;
                let index = vm.stack[base + rs1] as u32;
                let value = store.table(table_id).expect("live table").get(index).map_err(Trap::from)?;
                vm.stack[base + rd] = ref_to_reg(value);
            }
            Op::TableSet => {
                let table_id = store
                    .instance(instance)
                    .expect("live instance")
                    .table(instr.operand())
                    .ok_or(Trap::from(TrapCode::UndefinedElement))?;
                let index = vm.stack[base + rd] as u32;
                let value_raw = vm.stack[base + rs1];
                let elem = store.table(table_id).expect("live table").ty().element;
                let value = reg_to_ref(value_raw, elem);
                store.table_mut(table_id).expect("live table").set(index, value).map_err(Trap::from)?;
            }
            Op::TableSize => {
                let table_id = store
                    .instance(instance)
                    .expect("live instance")
                    .table(instr.operand())
                    .ok_or(Trap::from(TrapCode::UndefinedElement))?;
                vm.stack[base + rd] = u64::from(store.table(table_id).expect("live table").size());
            }
            Op::TableGrow => {
                let table_id = store
                    .instance(instance)
                    .expect("live instance")
                    .table(instr.operand())
                    .ok_or(Trap::from(TrapCode::UndefinedElement))?;
                let delta = vm.stack[base + rs1] as u32;
                let init_slot = rs1.checked_sub(1).expect("init vreg precedes delta vreg");
                let init_raw = vm.stack[base + init_slot];
                let elem = store.table(table_id).expect("live table").ty().element;
                let init = reg_to_ref(init_raw, elem);
                vm.stack[base + rd] = match store.table_mut(table_id).expect("live table").grow(delta, init) {
                    Some(prev) => u64::from(prev),
                    None => u64::from(u32::MAX),
                };
            }
            Op::TableCopy => {
                let packed = code.pool64_at(instr.pool_index());
                let dst_mod = (packed & 0xffff_ffff) as u32;
                let src_mod = (packed >> 32) as u32;
                let inst = store.instance(instance).expect("live instance");
                let dst_table = inst.table(dst_mod).ok_or(Trap::from(TrapCode::UndefinedElement))?;
                let src_table = inst.table(src_mod).ok_or(Trap::from(TrapCode::UndefinedElement))?;
                let dst = vm.stack[base + rd] as u32;
                let src = vm.stack[base + rd + 1] as u32;
                let len = vm.stack[base + rd + 2] as u32;
                table_copy(store, dst_table, src_table, dst, src, len)?;
            }
            Op::TableFill => {
                let table_id = store
                    .instance(instance)
                    .expect("live instance")
                    .table(instr.operand())
                    .ok_or(Trap::from(TrapCode::UndefinedElement))?;
                let dst = vm.stack[base + rd] as u32;
                let value_raw = vm.stack[base + rd + 1];
                let len = vm.stack[base + rd + 2] as u32;
                let elem = store.table(table_id).expect("live table").ty().element;
                let value = reg_to_ref(value_raw, elem);
                store.table_mut(table_id).expect("live table").fill(dst, value, len).map_err(Trap::from)?;
            }
            Op::TableInit => {
                let packed = code.pool64_at(instr.pool_index());
                let table_mod = (packed & 0xffff_ffff) as u32;
                let elem_idx = (packed >> 32) as u32;
                let table_id = store
                    .instance(instance)
                    .expect("live instance")
                    .table(table_mod)
                    .ok_or(Trap::from(TrapCode::UndefinedElement))?;
                let dst = vm.stack[base + rd] as u32;
                let src = vm.stack[base + rd + 1] as u32;
                let len = vm.stack[base + rd + 2] as u32;
                let inst = store.instance(instance).expect("live instance");
                if inst.is_elem_dropped(elem_idx) {
                    if len != 0 {
                        return Err(Trap::from(TrapCode::UndefinedElement));
                    }
                } else {
                    let src_end = src.checked_add(len).ok_or(Trap::from(TrapCode::UndefinedElement))?;
                    let items = inst.element_segment(elem_idx).ok_or(Trap::from(TrapCode::UndefinedElement))?;
                    let slice = items
                        .get(src as usize..src_end as usize)
                        .ok_or(Trap::from(TrapCode::UndefinedElement))?
                        .to_vec();
                    let table = store.table_mut(table_id).expect("live table");
                    for (i, value) in slice.into_iter().enumerate() {
                        table.set(dst + i as u32, value).map_err(Trap::from)?;
                    }
                }
            }
            Op::ElemDrop => {
                store.instance_mut(instance).expect("live instance").drop_elem(instr.operand());
            }
            Op::RefIsNull => {
                vm.stack[base + rd] = put_bool(vm.stack[base + rs1] as u32 == u32::MAX);
            }

            // ---- v128 (bounded subset) ----
            Op::V128Const => {
                let lo = code.pool64_at(instr.pool_index());
                let hi = code.pool64_at(instr.pool_index() + 1);
                let value = (u128::from(hi) << 64) | u128::from(lo);
                vm.stack[base + rd] = u64::from(store.alloc_v128(value));
            }
            Op::V128Load => v128_load(store, instance, vm, base, code, &instr)?,
            Op::V128Store => v128_store(store, instance, vm, base, code, &instr)?,
            Op::V128Not => {
                let v = v128_of(store, vm, base + rs1);
                vm.stack[base + rd] = u64::from(store.alloc_v128(!v));
            }
            Op::V128And | Op::V128Or | Op::V128Xor => {
                let lhs = v128_of(store, vm, base + rs1);
                let rhs = v128_of(store, vm, base + instr.rs2() as usize);
                let result = match op {
                    Op::V128And => lhs & rhs,
                    Op::V128Or => lhs | rhs,
                    _ => lhs ^ rhs,
                };
                vm.stack[base + rd] = u64::from(store.alloc_v128(result));
            }
            Op::I32x4Add | Op::I32x4Sub | Op::I32x4Mul => {
                let lhs = lanes_i32x4(v128_of(store, vm, base + rs1));
                let rhs = lanes_i32x4(v128_of(store, vm, base + instr.rs2() as usize));
                let mut out = [0i32; 4];
                for i in 0..4 {
                    out[i] = match op {
                        Op::I32x4Add => lhs[i].wrapping_add(rhs[i]),
                        Op::I32x4Sub => lhs[i].wrapping_sub(rhs[i]),
                        _ => lhs[i].wrapping_mul(rhs[i]),
                    };
                }
                vm.stack[base + rd] = u64::from(store.alloc_v128(from_lanes_i32x4(out)));
            }
            Op::I64x2Add | Op::I64x2Sub | Op::I64x2Mul => {
                let lhs = lanes_i64x2(v128_of(store, vm, base + rs1));
                let rhs = lanes_i64x2(v128_of(store, vm, base + instr.rs2() as usize));
                let mut out = [0i64; 2];
                for i in 0..2 {
                    out[i] = match op {
                        Op::I64x2Add => lhs[i].wrapping_add(rhs[i]),
                        Op::I64x2Sub => lhs[i].wrapping_sub(rhs[i]),
                        _ => lhs[i].wrapping_mul(rhs[i]),
                    };
                }
                vm.stack[base + rd] = u64::from(store.alloc_v128(from_lanes_i64x2(out)));
            }
            Op::F32x4Add | Op::F32x4Sub | Op::F32x4Mul => {
                let lhs = lanes_f32x4(v128_of(store, vm, base + rs1));
                let rhs = lanes_f32x4(v128_of(store, vm, base + instr.rs2() as usize));
                let mut out = [0f32; 4];
                for i in 0..4 {
                    out[i] = match op {
                        Op::F32x4Add => lhs[i] + rhs[i],
                        Op::F32x4Sub => lhs[i] - rhs[i],
                        _ => lhs[i] * rhs[i],
                    };
                }
                vm.stack[base + rd] = u64::from(store.alloc_v128(from_lanes_f32x4(out)));
            }
            Op::F64x2Add | Op::F64x2Sub | Op::F64x2Mul => {
                let lhs = lanes_f64x2(v128_of(store, vm, base + rs1));
                let rhs = lanes_f64x2(v128_of(store, vm, base + instr.rs2() as usize));
                let mut out = [0f64; 2];
                for i in 0..2 {
                    out[i] = match op {
                        Op::F64x2Add => lhs[i] + rhs[i],
                        Op::F64x2Sub => lhs[i] - rhs[i],
                        _ => lhs[i] * rhs[i],
                    };
                }
                vm.stack[base + rd] = u64::from(store.alloc_v128(from_lanes_f64x2(out)));
            }

            // ---- superinstructions (§4.3) ----
            Op::AddImmI32 | Op::AddImmI32Rev => {
                let lhs = vm.stack[base + rs1] as u32;
                vm.stack[base + rd] = u64::from(lhs.wrapping_add(instr.operand()));
            }
            Op::SubImmI32 => {
                let lhs = vm.stack[base + rs1] as u32;
                vm.stack[base + rd] = u64::from(lhs.wrapping_sub(instr.operand()));
            }
            Op::LtSImmI32 | Op::LtUImmI32 | Op::EqImmI32 => {
                let lhs = vm.stack[base + rs1] as u32;
                let rhs = instr.operand();
                let result = match op {
                    Op::LtSImmI32 => (lhs as i32) < (rhs as i32),
                    Op::LtUImmI32 => lhs < rhs,
                    _ => lhs == rhs,
                };
                vm.stack[base + rd] = put_bool(result);
            }
            Op::AddLocalsI32 => {
                let lhs = vm.stack[base + rs1] as u32;
                let rhs = vm.stack[base + instr.rs2() as usize] as u32;
                vm.stack[base + rd] = u64::from(lhs.wrapping_add(rhs));
            }
            Op::LtSLocalsI32 => {
                let lhs = vm.stack[base + rs1] as u32;
                let rhs = vm.stack[base + instr.rs2() as usize] as u32;
                vm.stack[base + rd] = put_bool((lhs as i32) < (rhs as i32));
            }

            _ => unreachable!("RegIR superinstruction {op} is never emitted by the translator"),
        }
        pc += 1;
    }
}

fn load(
    store: &mut Store,
    instance: InstanceIdx,
    vm: &mut Vm,
    base: usize,
    code: &RegFunc,
    instr: &RegInstr,
    width: usize,
    decode: impl Fn(&[u8]) -> u64,
) -> Result<(), Trap> {
    let mem = memory0(store, instance)?;
    let offset = code.pool64_at(instr.pool_index());
    let addr = vm.stack[base + instr.rs1() as usize];
    let ea = addr.checked_add(offset).ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))?;
    let mut buf = [0u8; 8];
    store.memory(mem).expect("live memory").read(ea, &mut buf[..width]).map_err(Trap::from)?;
    vm.stack[base + instr.rd() as usize] = decode(&buf[..width]);
    Ok(())
}

fn store_mem(
    store: &mut Store,
    instance: InstanceIdx,
    vm: &mut Vm,
    base: usize,
    code: &RegFunc,
    instr: &RegInstr,
    width: usize,
) -> Result<(), Trap> {
    let mem = memory0(store, instance)?;
    let offset = code.pool64_at(instr.pool_index());
    let value = vm.stack[base + instr.rs1() as usize];
    let addr = vm.stack[base + instr.rd() as usize];
    let ea = addr.checked_add(offset).ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))?;
    let bytes = value.to_le_bytes();
    store.memory_mut(mem).expect("live memory").write(ea, &bytes[..width]).map_err(Trap::from)?;
    Ok(())
}

fn v128_load(store: &mut Store, instance: InstanceIdx, vm: &mut Vm, base: usize, code: &RegFunc, instr: &RegInstr) -> Result<(), Trap> {
    let mem = memory0(store, instance)?;
    let offset = code.pool64_at(instr.pool_index());
    let addr = vm.stack[base + instr.rs1() as usize];
    let ea = addr.checked_add(offset).ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))?;
    let mut buf = [0u8; 16];
    store.memory(mem).expect("live memory").read(ea, &mut buf).map_err(Trap::from)?;
    let value = u128::from_le_bytes(buf);
    vm.stack[base + instr.rd() as usize] = u64::from(store.alloc_v128(value));
    Ok(())
}

fn v128_store(store: &mut Store, instance: InstanceIdx, vm: &mut Vm, base: usize, code: &RegFunc, instr: &RegInstr) -> Result<(), Trap> {
    let mem = memory0(store, instance)?;
    let offset = code.pool64_at(instr.pool_index());
    let value_idx = vm.stack[base + instr.rs1() as usize] as u32;
    let value = store.v128(value_idx).expect("v128 register holds a live slab index");
    let addr = vm.stack[base + instr.rd() as usize];
    let ea = addr.checked_add(offset).ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))?;
    store.memory_mut(mem).expect("live memory").write(ea, &value.to_le_bytes()).map_err(Trap::from)?;
    Ok(())
}

fn v128_of(store: &Store, vm: &Vm, reg: usize) -> u128 {
    let idx = vm.stack[reg] as u32;
    store.v128(idx).expect("v128 register holds a live slab index")
}

fn lanes_i32x4(v: u128) -> [i32; 4] {
    let bytes = v.to_le_bytes();
    core::array::from_fn(|i| i32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap()))
}
fn from_lanes_i32x4(lanes: [i32; 4]) -> u128 {
    let mut bytes = [0u8; 16];
    for (i, lane) in lanes.iter().enumerate() {
        bytes[i * 4..i * 4 + 4].copy_from_slice(&lane.to_le_bytes());
    }
    u128::from_le_bytes(bytes)
}
fn lanes_i64x2(v: u128) -> [i64; 2] {
    let bytes = v.to_le_bytes();
    core::array::from_fn(|i| i64::from_le_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap()))
}
fn from_lanes_i64x2(lanes: [i64; 2]) -> u128 {
    let mut bytes = [0u8; 16];
    for (i, lane) in lanes.iter().enumerate() {
        bytes[i * 8..i * 8 + 8].copy_from_slice(&lane.to_le_bytes());
    }
    u128::from_le_bytes(bytes)
}
fn lanes_f32x4(v: u128) -> [f32; 4] {
    lanes_i32x4(v).map(|bits| f32::from_bits(bits as u32))
}
fn from_lanes_f32x4(lanes: [f32; 4]) -> u128 {
    from_lanes_i32x4(lanes.map(|f| f.to_bits() as i32))
}
fn lanes_f64x2(v: u128) -> [f64; 2] {
    lanes_i64x2(v).map(|bits| f64::from_bits(bits as u64))
}
fn from_lanes_f64x2(lanes: [f64; 2]) -> u128 {
    from_lanes_i64x2(lanes.map(|f| f.to_bits() as i64))
}

fn table_copy(store: &mut Store, dst_id: crate::store::TableIdx, src_id: crate::store::TableIdx, dst: u32, src: u32, len: u32) -> Result<(), Trap> {
    if dst_id == src_id {
        return store.table_mut(dst_id).expect("live table").copy_within(dst, src, len).map_err(Trap::from);
    }
    let (dst_t, src_t) = store.table_pair_mut(dst_id, src_id).expect("live tables");
    let in_bounds = |t: &Table, start: u32| start.checked_add(len).is_some_and(|e| e <= t.size());
    if !in_bounds(dst_t, dst) || !in_bounds(src_t, src) {
        return Err(Trap::from(TrapCode::UndefinedElement));
    }
    for i in 0..len {
        let v = src_t.get(src + i).map_err(Trap::from)?;
        dst_t.set(dst + i, v).map_err(Trap::from)?;
    }
    Ok(())
}

fn exec_call(store: &mut Store, vm: &mut Vm, instance: InstanceIdx, base: usize, instr: &RegInstr) -> Result<(usize, usize), Trap> {
    let func_idx_mod = instr.operand();
    let func_idx = store
        .instance(instance)
        .expect("live instance")
        .func(func_idx_mod)
        .expect("validator-checked function index");
    let ty = store.func(func_idx).expect("live function").ty().clone();
    let arg_count = ty.params().len();
    let result_count = ty.results().len();
    let first_arg = instr.rs1() as usize;
    let args: Vec<u64> = vm.stack[base + first_arg..base + first_arg + arg_count].to_vec();
    let first_result = instr.rd() as usize;
    let mut results = alloc::vec![0u64; result_count];
    call_function(store, vm, func_idx, &args, &mut results, instance)?;
    vm.stack[base + first_result..base + first_result + result_count].copy_from_slice(&results);
    Ok((first_result, result_count))
}

fn exec_call_indirect(
    store: &mut Store,
    vm: &mut Vm,
    instance: InstanceIdx,
    base: usize,
    instr: &RegInstr,
    code: &RegFunc,
) -> Result<(usize, usize), Trap> {
    let packed = code.pool64_at(instr.pool_index());
    let table_idx_mod = (packed >> 32) as u32;
    let type_idx_mod = (packed & 0xffff_ffff) as u32;

    let inst = store.instance(instance).expect("live instance");
    let table_id = inst.table(table_idx_mod).ok_or(Trap::from(TrapCode::UndefinedElement))?;
    let expected_ty = inst
        .module()
        .types
        .get(type_idx_mod as usize)
        .cloned()
        .ok_or(Trap::from(TrapCode::MismatchedSignatures))?;

    let elem_reg = instr.rs1() as usize;
    let elem_val = vm.stack[base + elem_reg] as u32;

    let entry = store.table(table_id).ok_or(Trap::from(TrapCode::UndefinedElement))?.get(elem_val).map_err(Trap::from)?;
    let func_idx = match entry {
        RefValue::Func(raw) => FuncIdx::new(raw),
        _ => return Err(Trap::from(TrapCode::UndefinedElement)),
    };

    let actual_ty = store.func(func_idx).ok_or(Trap::from(TrapCode::UndefinedElement))?.ty();
    if *actual_ty != expected_ty {
        return Err(Trap::from(TrapCode::MismatchedSignatures));
    }

    let arg_count = expected_ty.params().len();
    let result_count = expected_ty.results().len();
    let first_arg = elem_reg.checked_sub(arg_count).expect("callee index vreg follows its argument block");
    let args: Vec<u64> = vm.stack[base + first_arg..base + first_arg + arg_count].to_vec();
    let first_result = instr.rd() as usize;
    let mut results = alloc::vec![0u64; result_count];
    call_function(store, vm, func_idx, &args, &mut results, instance)?;
    vm.stack[base + first_result..base + first_result + result_count].copy_from_slice(&results);
    Ok((first_result, result_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled_module::CompiledModule;
    use crate::config::Config;
    use crate::instance::{Extern, Imports};
    use crate::module::test_encode::ModuleBuilder;
    use zwasm_core::ValType;

    fn instantiate(b: &ModuleBuilder, config: Config) -> (Store, InstanceIdx) {
        let compiled = CompiledModule::new(&b.finish()).expect("module must compile");
        let mut store = Store::new(config);
        let instance = compiled.instantiate(&mut store, &Imports::new()).expect("module must instantiate");
        (store, instance)
    }

    fn exported_func(store: &Store, instance: InstanceIdx, name: &str) -> FuncIdx {
        match store.instance(instance).unwrap().export(name).unwrap() {
            Extern::Func(f) => f,
            other => panic!("export {name} is not a function: {other:?}"),
        }
    }

    #[test]
    fn invokes_an_exported_add_function_on_tier_2() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32, ValType::I32], &[ValType::I32]);
        b.add_function(ty, &[], alloc::vec![0x20, 0x00, 0x20, 0x01, 0x6a]); // local.get 0; local.get 1; i32.add
        b.export_func("add", 0);
        let (mut store, instance) = instantiate(&b, Config::new().with_jit_enabled(false));
        let func = exported_func(&store, instance, "add");

        let mut results = [0u64];
        invoke(&mut store, instance, func, &[7, 35], &mut results).unwrap();
        assert_eq!(results[0] as u32, 42);
    }

    #[test]
    fn traps_on_integer_division_by_zero() {
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32, ValType::I32], &[ValType::I32]);
        b.add_function(ty, &[], alloc::vec![0x20, 0x00, 0x20, 0x01, 0x6d]); // i32.div_s
        b.export_func("div", 0);
        let (mut store, instance) = instantiate(&b, Config::new().with_jit_enabled(false));
        let func = exported_func(&store, instance, "div");

        let mut results = [0u64];
        let err = invoke(&mut store, instance, func, &[1, 0], &mut results).unwrap_err();
        assert_eq!(err.trap_code(), Some(TrapCode::DivisionByZero));
    }

    #[test]
    fn release_frame_restores_the_stack_pointer_after_a_call() {
        // §8 property 5: the register stack returns to its pre-call depth
        // whether the callee returns normally or traps.
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32], &[ValType::I32]);
        b.add_function(ty, &[], alloc::vec![0x20, 0x00]); // local.get 0
        b.export_func("id", 0);
        let (mut store, instance) = instantiate(&b, Config::new().with_jit_enabled(false));
        let func = exported_func(&store, instance, "id");

        let mut vm = Vm::new(None);
        assert_eq!(vm.stack.len(), 0);
        let mut results = [0u64];
        call_function(&mut store, &mut vm, func, &[9], &mut results, instance).unwrap();
        assert_eq!(results[0] as u32, 9);
        assert_eq!(vm.stack.len(), 0, "a completed call must release its whole frame");
    }

    #[test]
    fn runs_a_fused_superinstruction_the_same_as_the_unfused_form() {
        // `local.get 0; i32.const 5; i32.add` lowers to `AddImmI32`; confirm
        // Tier 2 actually executes it rather than hitting the superinstruction
        // catch-all.
        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32], &[ValType::I32]);
        b.add_function(ty, &[], alloc::vec![0x20, 0x00, 0x41, 0x05, 0x6a]);
        b.export_func("add5", 0);
        let (mut store, instance) = instantiate(&b, Config::new().with_jit_enabled(false));
        let func = exported_func(&store, instance, "add5");

        let mut results = [0u64];
        invoke(&mut store, instance, func, &[37], &mut results).unwrap();
        assert_eq!(results[0] as u32, 42);
    }

    #[test]
    fn branch_table_selects_the_matching_target() {
        // Three nested void blocks ($outer > $b1 > $b0); `br_table` can only
        // target 0-result labels (the translator rejects anything else), so
        // the picked value is threaded through local 1 instead of the Wasm
        // operand stack:
        //
        //   block $outer {
        //     block $b1 {
        //       block $b0 {
        //         local.get 0
        //         br_table $b0 $b1 default=$outer
        //       }
        //       i32.const 100; local.set 1; br $outer
        //     }
        //     i32.const 200; local.set 1
        //   }
        //   local.get 1
        let mut body = alloc::vec![
            0x02, 0x40, // block $outer
            0x02, 0x40, //   block $b1
            0x02, 0x40, //     block $b0
            0x20, 0x00, //       local.get 0
            0x0e, 0x02, 0x00, 0x01, 0x02, //       br_table [0, 1] default 2
            0x0b, //     end $b0
            0x41, //     i32.const
        ];
        crate::module::test_encode::sleb(100, &mut body);
        body.extend([
            0x21, 0x01, //     local.set 1
            0x0c, 0x01, //     br $outer (depth 1 from here: $b1=0, $outer=1)
            0x0b, //   end $b1
            0x41, //   i32.const
        ]);
        crate::module::test_encode::sleb(200, &mut body);
        body.extend([
            0x21, 0x01, //   local.set 1
            0x0b, // end $outer
            0x20, 0x01, // local.get 1
        ]);

        let mut b = ModuleBuilder::new();
        let ty = b.add_type(&[ValType::I32], &[ValType::I32]);
        b.add_function(ty, &[(1, ValType::I32)], body);
        b.export_func("pick", 0);
        let (mut store, instance) = instantiate(&b, Config::new().with_jit_enabled(false));
        let func = exported_func(&store, instance, "pick");

        let mut results = [0u64];
        invoke(&mut store, instance, func, &[0], &mut results).unwrap();
        assert_eq!(results[0] as u32, 100);
        invoke(&mut store, instance, func, &[1], &mut results).unwrap();
        assert_eq!(results[0] as u32, 200);
    }
}
