//! Linear memory (§3 `LinearMemory`): paged growth, bounds checking, bulk
//! operations and an optional guard-page reservation for the JIT's
//! bounds-check elision (§4.7).

use alloc::vec::Vec;
use zwasm_core::TrapCode;

use crate::module::MemoryType;

/// 4 GiB virtual reservation used when guard pages are enabled; only the
/// committed pages are meaningfully readable/writable, the remainder
/// faults via the OS (§4.7).
pub const GUARD_ZONE_BYTES: u64 = 1 << 32;

/// A single Wasm linear memory instance.
///
/// Invariants (§3): `committed_bytes() == pages * page_size`; `grow` is
/// atomic (either the new page count holds or the memory is unchanged
/// entirely).
pub struct LinearMemory {
    data: Vec<u8>,
    pages: u64,
    min_pages: u64,
    max_pages: Option<u64>,
    page_size: u32,
    /// When `true`, the embedder promised a 4 GiB virtual reservation
    /// exists around `data` (in a real OS-memory backend this would be an
    /// actual `mmap` guard region; the portable `Vec`-backed fallback here
    /// only tracks the *intent* so the JIT knows it may elide bounds
    /// checks and must rely on the shared-resource guard-page machinery
    /// described in §4.7/§5 instead).
    guard_pages: bool,
}

impl LinearMemory {
    /// # Errors
    ///
    /// Returns [`TrapCode::GrowthLimited`] if `ty.limits.min` exceeds
    /// `max_memory_pages` (an embedder ceiling, not part of the module).
    pub fn new(ty: &MemoryType, max_memory_pages: Option<u64>, guard_pages: bool) -> Result<Self, TrapCode> {
        if let Some(ceiling) = max_memory_pages {
            if ty.limits.min > ceiling {
                return Err(TrapCode::GrowthLimited);
            }
        }
        let page_size = u64::from(ty.page_size);
        let byte_len = usize::try_from(ty.limits.min.saturating_mul(page_size))
            .map_err(|_| TrapCode::GrowthLimited)?;
        Ok(Self {
            data: alloc::vec![0u8; byte_len],
            pages: ty.limits.min,
            min_pages: ty.limits.min,
            max_pages: ty.limits.max,
            page_size: ty.page_size,
            guard_pages,
        })
    }

    #[must_use]
    pub fn pages(&self) -> u64 {
        self.pages
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn committed_bytes(&self) -> u64 {
        self.pages * u64::from(self.page_size)
    }

    #[must_use]
    pub fn guard_pages_enabled(&self) -> bool {
        self.guard_pages
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    pub fn base_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }

    /// Grows the memory by `delta` pages. Returns the previous page count
    /// on success, or `None` if the growth would exceed the declared
    /// maximum / embedder ceiling — per §9 "Open Questions": the ceiling is
    /// enforced before any allocation is attempted, so a rejected `grow`
    /// never touches the allocator.
    pub fn grow(&mut self, delta: u64, max_memory_pages: Option<u64>) -> Option<u64> {
        let new_pages = self.pages.checked_add(delta)?;
        if let Some(max) = self.max_pages {
            if new_pages > max {
                return None;
            }
        }
        if let Some(ceiling) = max_memory_pages {
            if new_pages > ceiling {
                return None;
            }
        }
        let new_len = usize::try_from(new_pages.checked_mul(u64::from(self.page_size))?).ok()?;
        // Atomic w.r.t. the caller: `try_reserve` either succeeds (and we
        // commit) or fails and `self` is left untouched (§3 invariant).
        if self.data.try_reserve(new_len - self.data.len()).is_err() {
            return None;
        }
        let previous = self.pages;
        self.data.resize(new_len, 0);
        self.pages = new_pages;
        Some(previous)
    }

    /// Minimum page count the module declared; `grow` can never take the
    /// memory below this.
    #[must_use]
    pub fn min_pages(&self) -> u64 {
        self.min_pages
    }

    fn checked_range(&self, offset: u64, len: u64) -> Result<core::ops::Range<usize>, TrapCode> {
        let end = offset.checked_add(len).ok_or(TrapCode::OutOfBoundsMemoryAccess)?;
        if end > self.committed_bytes() {
            return Err(TrapCode::OutOfBoundsMemoryAccess);
        }
        Ok(offset as usize..end as usize)
    }

    /// # Errors
    ///
    /// [`TrapCode::OutOfBoundsMemoryAccess`] if `[offset, offset+buf.len())`
    /// is not fully within `[0, committed_bytes())` (§8 property 4: a read
    /// at `committed_bytes - 1` succeeds, at `committed_bytes` traps).
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), TrapCode> {
        let range = self.checked_range(offset, buf.len() as u64)?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    /// # Errors
    ///
    /// See [`LinearMemory::read`].
    pub fn write(&mut self, offset: u64, buf: &[u8]) -> Result<(), TrapCode> {
        let range = self.checked_range(offset, buf.len() as u64)?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }

    /// `memory.fill`.
    pub fn fill(&mut self, offset: u64, value: u8, len: u64) -> Result<(), TrapCode> {
        let range = self.checked_range(offset, len)?;
        self.data[range].fill(value);
        Ok(())
    }

    /// `memory.copy`, correct for overlapping source/destination ranges.
    pub fn copy_within(&mut self, dst: u64, src: u64, len: u64) -> Result<(), TrapCode> {
        let dst_range = self.checked_range(dst, len)?;
        let _ = self.checked_range(src, len)?;
        self.data.copy_within(src as usize..src as usize + len as usize, dst_range.start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Limits, MemoryType};

    fn mem_type(min: u64, max: Option<u64>) -> MemoryType {
        MemoryType { limits: Limits { min, max }, is_64: false, page_size: 65536 }
    }

    #[test]
    fn new_memory_is_zeroed_and_sized_to_min_pages() {
        let mem = LinearMemory::new(&mem_type(2, None), None, false).unwrap();
        assert_eq!(mem.pages(), 2);
        assert_eq!(mem.committed_bytes(), 2 * 65536);
        assert!(mem.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn new_memory_rejects_min_above_embedder_ceiling() {
        let err = LinearMemory::new(&mem_type(10, None), Some(4), false).unwrap_err();
        assert_eq!(err, TrapCode::GrowthLimited);
    }

    #[test]
    fn grow_returns_previous_page_count() {
        let mut mem = LinearMemory::new(&mem_type(1, Some(4)), None, false).unwrap();
        let previous = mem.grow(2, None).unwrap();
        assert_eq!(previous, 1);
        assert_eq!(mem.pages(), 3);
        assert_eq!(mem.committed_bytes(), 3 * 65536);
    }

    #[test]
    fn grow_past_declared_max_fails_and_leaves_memory_unchanged() {
        let mut mem = LinearMemory::new(&mem_type(1, Some(2)), None, false).unwrap();
        assert_eq!(mem.grow(5, None), None);
        assert_eq!(mem.pages(), 1, "a rejected grow must not partially apply");
    }

    #[test]
    fn grow_past_embedder_ceiling_fails_even_within_declared_max() {
        let mut mem = LinearMemory::new(&mem_type(1, Some(100)), Some(2), false).unwrap();
        assert_eq!(mem.grow(5, Some(2)), None);
        assert_eq!(mem.pages(), 1);
    }

    #[test]
    fn read_and_write_round_trip_within_bounds() {
        let mut mem = LinearMemory::new(&mem_type(1, None), None, false).unwrap();
        mem.write(10, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        mem.read(10, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn access_ending_exactly_at_committed_bytes_succeeds() {
        let mem = LinearMemory::new(&mem_type(1, None), None, false).unwrap();
        let mut buf = [0u8; 1];
        let last_byte = mem.committed_bytes() - 1;
        assert!(mem.read(last_byte, &mut buf).is_ok());
    }

    #[test]
    fn access_one_byte_past_committed_bytes_traps() {
        let mem = LinearMemory::new(&mem_type(1, None), None, false).unwrap();
        let mut buf = [0u8; 1];
        let err = mem.read(mem.committed_bytes(), &mut buf).unwrap_err();
        assert_eq!(err, TrapCode::OutOfBoundsMemoryAccess);
    }

    #[test]
    fn offset_plus_len_overflow_traps_rather_than_wrapping() {
        let mem = LinearMemory::new(&mem_type(1, None), None, false).unwrap();
        let mut buf = [0u8; 8];
        let err = mem.read(u64::MAX, &mut buf).unwrap_err();
        assert_eq!(err, TrapCode::OutOfBoundsMemoryAccess);
    }

    #[test]
    fn fill_sets_every_byte_in_range() {
        let mut mem = LinearMemory::new(&mem_type(1, None), None, false).unwrap();
        mem.fill(0, 0xab, 16).unwrap();
        assert!(mem.data()[0..16].iter().all(|&b| b == 0xab));
        assert_eq!(mem.data()[16], 0);
    }

    #[test]
    fn copy_within_handles_forward_overlap() {
        let mut mem = LinearMemory::new(&mem_type(1, None), None, false).unwrap();
        mem.write(0, &[1, 2, 3, 4, 5]).unwrap();
        // dst overlaps src, shifted right by 2: must read the old bytes
        // before overwriting them, i.e. behave like `memmove`.
        mem.copy_within(2, 0, 5).unwrap();
        let mut buf = [0u8; 7];
        mem.read(0, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn copy_within_rejects_when_either_range_is_out_of_bounds() {
        let mut mem = LinearMemory::new(&mem_type(1, None), None, false).unwrap();
        let past_end = mem.committed_bytes();
        let err = mem.copy_within(past_end, 0, 1).unwrap_err();
        assert_eq!(err, TrapCode::OutOfBoundsMemoryAccess);
    }
}
