//! W^X-respecting executable memory: code is written into a read/write
//! mapping, then flipped to read/execute before any `JitFn` pointer into it
//! is handed out, per §4.7's "the process never holds a writable and
//! executable mapping of the same page at once" requirement.

use region::Protection;

#[derive(Debug)]
pub struct BufferError(pub region::Error);

impl core::fmt::Display for BufferError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "executable buffer allocation failed: {}", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BufferError {}

/// A finished, page-backed blob of native code. Dropping it unmaps the
/// pages; callers must not keep a `JitFn` alive past the buffer's lifetime.
pub struct ExecutableBuffer {
    alloc: region::Allocation,
    len: usize,
}

impl ExecutableBuffer {
    /// Allocates `code.len()` bytes, copies `code` in while the mapping is
    /// still writable, then makes it executable and non-writable.
    pub fn new(code: &[u8]) -> Result<Self, BufferError> {
        let mut alloc = region::alloc(code.len().max(1), Protection::READ_WRITE).map_err(BufferError)?;
        // SAFETY: `alloc` was just allocated with WRITE permission and is
        // exclusively owned here; `code.len()` was the requested size.
        unsafe {
            core::ptr::copy_nonoverlapping(code.as_ptr(), alloc.as_mut_ptr::<u8>(), code.len());
        }
        // SAFETY: `alloc`'s address range was sized to cover exactly the
        // bytes we just wrote.
        unsafe {
            region::protect(alloc.as_ptr::<u8>(), alloc.len(), Protection::READ_EXECUTE).map_err(BufferError)?;
        }
        flush_icache(alloc.as_ptr::<u8>(), code.len());
        Ok(Self { alloc, len: code.len() })
    }

    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.alloc.as_ptr::<u8>()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// SAFETY: the underlying mapping is never mutated again after `new`
// returns (it is read/execute only), so sharing `&ExecutableBuffer` across
// threads is sound; `region::Allocation` itself is not `Sync` only because
// its API exposes `protect`, which we never call again.
unsafe impl Sync for ExecutableBuffer {}
unsafe impl Send for ExecutableBuffer {}

#[cfg(target_arch = "aarch64")]
fn flush_icache(ptr: *const u8, len: usize) {
    extern "C" {
        fn __clear_cache(begin: *mut core::ffi::c_char, end: *mut core::ffi::c_char);
    }
    // SAFETY: `ptr..ptr+len` is the region we just wrote native code into;
    // `__clear_cache` is provided by compiler-rt/libgcc on every aarch64
    // target we build for and only ever reads instruction/data cache line
    // sizes, it does not dereference the range itself.
    unsafe {
        let begin = ptr as *mut core::ffi::c_char;
        let end = ptr.add(len) as *mut core::ffi::c_char;
        __clear_cache(begin, end);
    }
}

#[cfg(not(target_arch = "aarch64"))]
fn flush_icache(_ptr: *const u8, _len: usize) {}
