//! §6 "Host-call ABI (WASI)": the typed host functions themselves, one
//! [`WasiFn`] per `wasi_snapshot_preview1` export, and [`resolve`], which
//! turns a module's `(module, name)` import pair into a [`zwasm::Extern`]
//! the CLI's linker can hand back to [`zwasm::instance::instantiate`].

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path};
use std::sync::Arc;

use zwasm::{Caller, FuncRecord, FuncType, HostFunc, HostFuncRecord, Store, Trap, TrapCode, ValType};

use crate::ctx::{FdEntry, WasiCtx};
use crate::errno;

fn mem_read_u32(caller: &Caller<'_>, addr: u32) -> Result<u32, Trap> {
    let mem = caller.memory(0).ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))?;
    let mut buf = [0u8; 4];
    mem.read(u64::from(addr), &mut buf).map_err(Trap::from)?;
    Ok(u32::from_le_bytes(buf))
}

fn mem_write_u32(caller: &mut Caller<'_>, addr: u32, value: u32) -> Result<(), Trap> {
    let mem = caller.memory_mut(0).ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))?;
    mem.write(u64::from(addr), &value.to_le_bytes()).map_err(Trap::from)
}

fn mem_write_u64(caller: &mut Caller<'_>, addr: u32, value: u64) -> Result<(), Trap> {
    let mem = caller.memory_mut(0).ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))?;
    mem.write(u64::from(addr), &value.to_le_bytes()).map_err(Trap::from)
}

fn mem_read_bytes(caller: &Caller<'_>, addr: u32, len: u32) -> Result<Vec<u8>, Trap> {
    let mem = caller.memory(0).ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))?;
    let mut buf = vec![0u8; len as usize];
    mem.read(u64::from(addr), &mut buf).map_err(Trap::from)?;
    Ok(buf)
}

fn mem_write_bytes(caller: &mut Caller<'_>, addr: u32, bytes: &[u8]) -> Result<(), Trap> {
    let mem = caller.memory_mut(0).ok_or(Trap::from(TrapCode::OutOfBoundsMemoryAccess))?;
    mem.write(u64::from(addr), bytes).map_err(Trap::from)
}

#[derive(Clone, Copy)]
enum Op {
    ArgsSizesGet,
    ArgsGet,
    EnvironSizesGet,
    EnvironGet,
    ClockTimeGet,
    RandomGet,
    ProcExit,
    FdWrite,
    FdRead,
    FdClose,
    FdSeek,
    FdFdstatGet,
    FdPrestatGet,
    FdPrestatDirName,
    PathOpen,
}

struct WasiFn {
    ctx: Arc<WasiCtx>,
    op: Op,
}

/// `(params, results)`, params/results counted in WASI's `i32`/`i64` terms
/// (every one of these functions only ever uses those two value types).
fn signature(op: Op) -> FuncType {
    use ValType::{I32, I64};
    match op {
        Op::ArgsSizesGet | Op::EnvironSizesGet => FuncType::new([I32, I32], [I32]),
        Op::ArgsGet | Op::EnvironGet => FuncType::new([I32, I32], [I32]),
        Op::ClockTimeGet => FuncType::new([I32, I64, I32], [I32]),
        Op::RandomGet => FuncType::new([I32, I32], [I32]),
        Op::ProcExit => FuncType::new([I32], []),
        Op::FdWrite | Op::FdRead => FuncType::new([I32, I32, I32, I32], [I32]),
        Op::FdClose => FuncType::new([I32], [I32]),
        Op::FdSeek => FuncType::new([I32, I64, I32, I32], [I32]),
        Op::FdFdstatGet | Op::FdPrestatGet => FuncType::new([I32, I32], [I32]),
        Op::FdPrestatDirName => FuncType::new([I32, I32, I32], [I32]),
        Op::PathOpen => FuncType::new([I32, I32, I32, I32, I32, I64, I64, I32, I32], [I32]),
    }
}

fn name_to_op(name: &str) -> Option<Op> {
    Some(match name {
        "args_sizes_get" => Op::ArgsSizesGet,
        "args_get" => Op::ArgsGet,
        "environ_sizes_get" => Op::EnvironSizesGet,
        "environ_get" => Op::EnvironGet,
        "clock_time_get" => Op::ClockTimeGet,
        "random_get" => Op::RandomGet,
        "proc_exit" => Op::ProcExit,
        "fd_write" => Op::FdWrite,
        "fd_read" => Op::FdRead,
        "fd_close" => Op::FdClose,
        "fd_seek" => Op::FdSeek,
        "fd_fdstat_get" => Op::FdFdstatGet,
        "fd_prestat_get" => Op::FdPrestatGet,
        "fd_prestat_dir_name" => Op::FdPrestatDirName,
        "path_open" => Op::PathOpen,
        _ => return None,
    })
}

/// Resolves one module import against the WASI namespace. Returns `None`
/// for anything outside `wasi_snapshot_preview1` or an unimplemented
/// function name, leaving the caller free to try another linker (§6).
#[must_use]
pub fn resolve(store: &mut Store, ctx: &Arc<WasiCtx>, module: &str, name: &str) -> Option<zwasm::Extern> {
    if module != "wasi_snapshot_preview1" {
        return None;
    }
    let Some(op) = name_to_op(name) else {
        log::debug!("unresolved wasi_snapshot_preview1 import: {name}");
        return None;
    };
    let record = HostFuncRecord::new(signature(op), Arc::new(WasiFn { ctx: ctx.clone(), op }));
    let idx = store.alloc_func(FuncRecord::Host(record));
    Some(zwasm::Extern::Func(idx))
}

fn urandom(buf: &mut [u8]) {
    if std::fs::File::open("/dev/urandom").and_then(|mut f| f.read_exact(buf)).is_ok() {
        return;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0x2545_f491_4f6c_dd1d, |d| d.as_nanos() as u64)
        | 1;
    for b in buf.iter_mut() {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        *b = x as u8;
    }
}

/// Joins `rel` onto a preopened directory's host path, rejecting anything
/// that tries to escape it (`..`, an absolute path).
fn resolve_guest_path(host_root: &Path, rel: &str) -> Result<std::path::PathBuf, u32> {
    let mut out = host_root.to_path_buf();
    for comp in Path::new(rel).components() {
        match comp {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return Err(errno::NOTCAPABLE),
        }
    }
    Ok(out)
}

impl HostFunc for WasiFn {
    fn call(&self, mut caller: Caller<'_>, args: &[u64], results: &mut [u64]) -> Result<(), Trap> {
        let code = self.dispatch(&mut caller, args)?;
        if !results.is_empty() {
            results[0] = u64::from(code);
        }
        Ok(())
    }
}

impl WasiFn {
    fn dispatch(&self, caller: &mut Caller<'_>, args: &[u64]) -> Result<u32, Trap> {
        match self.op {
            Op::ArgsSizesGet => {
                let argc = self.ctx.args.len() as u32;
                let buf_size: u32 = self.ctx.args.iter().map(|a| a.len() as u32 + 1).sum();
                mem_write_u32(caller, args[0] as u32, argc)?;
                mem_write_u32(caller, args[1] as u32, buf_size)?;
                Ok(errno::SUCCESS)
            }
            Op::ArgsGet => {
                let argv_ptr = args[0] as u32;
                let mut offset = args[1] as u32;
                for (i, a) in self.ctx.args.iter().enumerate() {
                    mem_write_u32(caller, argv_ptr + i as u32 * 4, offset)?;
                    let mut bytes = a.clone().into_bytes();
                    bytes.push(0);
                    mem_write_bytes(caller, offset, &bytes)?;
                    offset += bytes.len() as u32;
                }
                Ok(errno::SUCCESS)
            }
            Op::EnvironSizesGet => {
                let count = self.ctx.env.len() as u32;
                let buf_size: u32 = self.ctx.env.iter().map(|(k, v)| (k.len() + 1 + v.len() + 1) as u32).sum();
                mem_write_u32(caller, args[0] as u32, count)?;
                mem_write_u32(caller, args[1] as u32, buf_size)?;
                Ok(errno::SUCCESS)
            }
            Op::EnvironGet => {
                let environ_ptr = args[0] as u32;
                let mut offset = args[1] as u32;
                for (i, (k, v)) in self.ctx.env.iter().enumerate() {
                    mem_write_u32(caller, environ_ptr + i as u32 * 4, offset)?;
                    let mut bytes = format!("{k}={v}").into_bytes();
                    bytes.push(0);
                    mem_write_bytes(caller, offset, &bytes)?;
                    offset += bytes.len() as u32;
                }
                Ok(errno::SUCCESS)
            }
            Op::ClockTimeGet => {
                let time_ptr = args[2] as u32;
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0);
                mem_write_u64(caller, time_ptr, nanos)?;
                Ok(errno::SUCCESS)
            }
            Op::RandomGet => {
                let ptr = args[0] as u32;
                let len = args[1] as u32;
                let mut buf = vec![0u8; len as usize];
                urandom(&mut buf);
                mem_write_bytes(caller, ptr, &buf)?;
                Ok(errno::SUCCESS)
            }
            Op::ProcExit => {
                let code = args[0] as u32 as i32;
                log::debug!("guest called proc_exit({code})");
                Err(Trap::exit(code))
            }
            Op::FdWrite => self.fd_write(caller, args),
            Op::FdRead => self.fd_read(caller, args),
            Op::FdClose => self.fd_close(args),
            Op::FdSeek => self.fd_seek(caller, args),
            Op::FdFdstatGet => self.fd_fdstat_get(caller, args),
            Op::FdPrestatGet => self.fd_prestat_get(caller, args),
            Op::FdPrestatDirName => self.fd_prestat_dir_name(caller, args),
            Op::PathOpen => self.path_open(caller, args),
        }
    }

    fn fd_write(&self, caller: &mut Caller<'_>, args: &[u64]) -> Result<u32, Trap> {
        let fd = args[0] as u32;
        let iovs_ptr = args[1] as u32;
        let iovs_len = args[2] as u32;
        let nwritten_ptr = args[3] as u32;

        let mut chunks = Vec::with_capacity(iovs_len as usize);
        for i in 0..iovs_len {
            let base = iovs_ptr + i * 8;
            let ptr = mem_read_u32(caller, base)?;
            let len = mem_read_u32(caller, base + 4)?;
            chunks.push(mem_read_bytes(caller, ptr, len)?);
        }
        let total: u32 = chunks.iter().map(|c| c.len() as u32).sum();

        let mut fds = self.ctx.fds.lock().expect("fd table mutex poisoned");
        let Some(entry) = fds.get_mut(fd as usize) else {
            return Ok(errno::BADF);
        };
        let io_result = match entry {
            FdEntry::Stdout => chunks.iter().try_for_each(|c| std::io::stdout().write_all(c)),
            FdEntry::Stderr => chunks.iter().try_for_each(|c| std::io::stderr().write_all(c)),
            FdEntry::File(f) => {
                if !self.ctx.capabilities.allow_write {
                    return Ok(errno::NOTCAPABLE);
                }
                chunks.iter().try_for_each(|c| f.write_all(c))
            }
            FdEntry::Stdin | FdEntry::PreopenDir { .. } | FdEntry::Closed => return Ok(errno::BADF),
        };
        drop(fds);
        if io_result.is_err() {
            return Ok(errno::IO);
        }
        mem_write_u32(caller, nwritten_ptr, total)?;
        Ok(errno::SUCCESS)
    }

    fn fd_read(&self, caller: &mut Caller<'_>, args: &[u64]) -> Result<u32, Trap> {
        let fd = args[0] as u32;
        let iovs_ptr = args[1] as u32;
        let iovs_len = args[2] as u32;
        let nread_ptr = args[3] as u32;

        let mut total = 0u32;
        for i in 0..iovs_len {
            let base = iovs_ptr + i * 8;
            let ptr = mem_read_u32(caller, base)?;
            let len = mem_read_u32(caller, base + 4)?;
            let mut buf = vec![0u8; len as usize];

            let mut fds = self.ctx.fds.lock().expect("fd table mutex poisoned");
            let Some(entry) = fds.get_mut(fd as usize) else {
                return Ok(errno::BADF);
            };
            let n = match entry {
                FdEntry::Stdin => std::io::stdin().read(&mut buf),
                FdEntry::File(f) => {
                    if !self.ctx.capabilities.allow_read {
                        return Ok(errno::NOTCAPABLE);
                    }
                    f.read(&mut buf)
                }
                FdEntry::Stdout | FdEntry::Stderr | FdEntry::PreopenDir { .. } | FdEntry::Closed => return Ok(errno::BADF),
            };
            drop(fds);
            let Ok(n) = n else { return Ok(errno::IO) };
            mem_write_bytes(caller, ptr, &buf[..n])?;
            total += n as u32;
            if n < buf.len() {
                break;
            }
        }
        mem_write_u32(caller, nread_ptr, total)?;
        Ok(errno::SUCCESS)
    }

    fn fd_close(&self, args: &[u64]) -> Result<u32, Trap> {
        let fd = args[0] as u32;
        let mut fds = self.ctx.fds.lock().expect("fd table mutex poisoned");
        let Some(entry) = fds.get_mut(fd as usize) else {
            return Ok(errno::BADF);
        };
        if matches!(entry, FdEntry::Closed) {
            return Ok(errno::BADF);
        }
        *entry = FdEntry::Closed;
        Ok(errno::SUCCESS)
    }

    fn fd_seek(&self, caller: &mut Caller<'_>, args: &[u64]) -> Result<u32, Trap> {
        let fd = args[0] as u32;
        let offset = args[1] as i64;
        let whence = args[2] as u32;
        let newoffset_ptr = args[3] as u32;

        let pos = match whence {
            0 => SeekFrom::Start(offset as u64),
            1 => SeekFrom::Current(offset),
            2 => SeekFrom::End(offset),
            _ => return Ok(errno::INVAL),
        };
        let mut fds = self.ctx.fds.lock().expect("fd table mutex poisoned");
        let Some(FdEntry::File(f)) = fds.get_mut(fd as usize) else {
            return Ok(errno::BADF);
        };
        let Ok(new_pos) = f.seek(pos) else {
            return Ok(errno::IO);
        };
        drop(fds);
        mem_write_u64(caller, newoffset_ptr, new_pos)?;
        Ok(errno::SUCCESS)
    }

    fn fd_fdstat_get(&self, caller: &mut Caller<'_>, args: &[u64]) -> Result<u32, Trap> {
        let fd = args[0] as u32;
        let stat_ptr = args[1] as u32;
        let fds = self.ctx.fds.lock().expect("fd table mutex poisoned");
        let Some(entry) = fds.get(fd as usize) else {
            return Ok(errno::BADF);
        };
        let filetype: u8 = match entry {
            FdEntry::Stdin | FdEntry::Stdout | FdEntry::Stderr => 2, // character_device
            FdEntry::PreopenDir { .. } => 3,                        // directory
            FdEntry::File(_) => 4,                                  // regular_file
            FdEntry::Closed => return Ok(errno::BADF),
        };
        drop(fds);
        let mut buf = [0u8; 24];
        buf[0] = filetype;
        buf[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
        buf[16..24].copy_from_slice(&u64::MAX.to_le_bytes());
        mem_write_bytes(caller, stat_ptr, &buf)?;
        Ok(errno::SUCCESS)
    }

    fn fd_prestat_get(&self, caller: &mut Caller<'_>, args: &[u64]) -> Result<u32, Trap> {
        let fd = args[0] as u32;
        let prestat_ptr = args[1] as u32;
        let fds = self.ctx.fds.lock().expect("fd table mutex poisoned");
        let Some(FdEntry::PreopenDir { guest_path, .. }) = fds.get(fd as usize) else {
            return Ok(errno::BADF);
        };
        let name_len = guest_path.len() as u32;
        drop(fds);
        let mut buf = [0u8; 8];
        buf[4..8].copy_from_slice(&name_len.to_le_bytes());
        mem_write_bytes(caller, prestat_ptr, &buf)?;
        Ok(errno::SUCCESS)
    }

    fn fd_prestat_dir_name(&self, caller: &mut Caller<'_>, args: &[u64]) -> Result<u32, Trap> {
        let fd = args[0] as u32;
        let path_ptr = args[1] as u32;
        let path_len = args[2] as u32;
        let fds = self.ctx.fds.lock().expect("fd table mutex poisoned");
        let Some(FdEntry::PreopenDir { guest_path, .. }) = fds.get(fd as usize) else {
            return Ok(errno::BADF);
        };
        let bytes = guest_path.as_bytes();
        if bytes.len() as u32 > path_len {
            return Ok(errno::TOOBIG);
        }
        let bytes = bytes.to_vec();
        drop(fds);
        mem_write_bytes(caller, path_ptr, &bytes)?;
        Ok(errno::SUCCESS)
    }

    fn path_open(&self, caller: &mut Caller<'_>, args: &[u64]) -> Result<u32, Trap> {
        if !self.ctx.capabilities.allow_path {
            return Ok(errno::NOTCAPABLE);
        }
        let dirfd = args[0] as u32;
        let path_ptr = args[2] as u32;
        let path_len = args[3] as u32;
        let oflags = args[4] as u32;
        let fs_rights_base = args[5] as u64;
        let opened_fd_ptr = args[8] as u32;

        const OFLAGS_CREAT: u32 = 1 << 0;
        const OFLAGS_EXCL: u32 = 1 << 2;
        const OFLAGS_TRUNC: u32 = 1 << 3;
        const RIGHTS_FD_WRITE: u64 = 1 << 6;

        let wants_write = oflags & (OFLAGS_CREAT | OFLAGS_TRUNC) != 0 || fs_rights_base & RIGHTS_FD_WRITE != 0;
        if wants_write && !self.ctx.capabilities.allow_write {
            return Ok(errno::NOTCAPABLE);
        }
        if !wants_write && !self.ctx.capabilities.allow_read {
            return Ok(errno::NOTCAPABLE);
        }

        let rel = String::from_utf8(mem_read_bytes(caller, path_ptr, path_len)?)
            .map_err(|_| Trap::from(TrapCode::Unreachable))?;

        let host_path = {
            let fds = self.ctx.fds.lock().expect("fd table mutex poisoned");
            let Some(FdEntry::PreopenDir { host_path, .. }) = fds.get(dirfd as usize) else {
                return Ok(errno::BADF);
            };
            match resolve_guest_path(host_path, &rel) {
                Ok(p) => p,
                Err(code) => return Ok(code),
            }
        };

        let mut opts = std::fs::OpenOptions::new();
        opts.read(!wants_write || fs_rights_base & 0x2 != 0).write(wants_write);
        opts.create(oflags & OFLAGS_CREAT != 0);
        opts.create_new(oflags & OFLAGS_CREAT != 0 && oflags & OFLAGS_EXCL != 0);
        opts.truncate(oflags & OFLAGS_TRUNC != 0);

        let file = match opts.open(&host_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(errno::NOENT),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => return Ok(errno::ACCES),
            Err(_) => return Ok(errno::IO),
        };

        let new_fd = {
            let mut fds = self.ctx.fds.lock().expect("fd table mutex poisoned");
            fds.push(FdEntry::File(file));
            (fds.len() - 1) as u32
        };
        mem_write_u32(caller, opened_fd_ptr, new_fd)?;
        Ok(errno::SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_implemented_name_round_trips_through_name_to_op() {
        for name in [
            "args_sizes_get",
            "args_get",
            "environ_sizes_get",
            "environ_get",
            "clock_time_get",
            "random_get",
            "proc_exit",
            "fd_write",
            "fd_read",
            "fd_close",
            "fd_seek",
            "fd_fdstat_get",
            "fd_prestat_get",
            "fd_prestat_dir_name",
            "path_open",
        ] {
            assert!(name_to_op(name).is_some(), "{name} should resolve to an Op");
        }
    }

    #[test]
    fn unknown_import_name_resolves_to_none() {
        assert!(name_to_op("sock_accept").is_none());
    }

    #[test]
    fn resolve_rejects_imports_outside_the_wasi_namespace() {
        let mut store = Store::new(zwasm::Config::new().with_jit_enabled(false));
        let ctx = Arc::new(
            crate::ctx::WasiBuilder::new().build(),
        );
        assert!(resolve(&mut store, &ctx, "env", "fd_write").is_none());
        assert!(resolve(&mut store, &ctx, "wasi_snapshot_preview1", "sock_accept").is_none());
    }

    #[test]
    fn resolve_guest_path_joins_a_relative_path_onto_the_root() {
        let root = Path::new("/preopened");
        let joined = resolve_guest_path(root, "a/b.txt").unwrap();
        assert_eq!(joined, Path::new("/preopened/a/b.txt"));
    }

    #[test]
    fn resolve_guest_path_rejects_parent_dir_escape() {
        let root = Path::new("/preopened");
        let err = resolve_guest_path(root, "../etc/passwd").unwrap_err();
        assert_eq!(err, errno::NOTCAPABLE);
    }

    #[test]
    fn resolve_guest_path_rejects_an_absolute_path() {
        let root = Path::new("/preopened");
        let err = resolve_guest_path(root, "/etc/passwd").unwrap_err();
        assert_eq!(err, errno::NOTCAPABLE);
    }

    #[test]
    fn resolve_guest_path_ignores_current_dir_components() {
        let root = Path::new("/preopened");
        let joined = resolve_guest_path(root, "./a/./b").unwrap();
        assert_eq!(joined, Path::new("/preopened/a/b"));
    }
}
