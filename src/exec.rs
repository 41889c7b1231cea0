//! Execution backends: the two primitives the build passes are written
//! against (parallel-for over an index range, exclusive prefix sum), with a
//! serial reference implementation and a rayon-backed one.

use std::marker::PhantomData;

use rayon::prelude::*;

/// Tasks per worker thread when chunking an index range. Keeps stealing
/// granularity coarse enough that small per-index bodies are not dominated
/// by scheduling.
const TASKS_PER_THREAD: usize = 4;

/// The execution surface the build passes use. Implementations may run `f`
/// from any thread, in any order, concurrently; callers only hand over
/// bodies whose shared writes are atomic or provably disjoint.
pub(crate) trait Backend: Sync {
    /// Run `f` for every index in `0..n`.
    fn for_each<F>(&self, n: usize, f: F)
    where
        F: Fn(usize) + Sync;

    /// Per-index map over `0..n`, collected in index order.
    fn map_u32<F>(&self, n: usize, f: F) -> Vec<u32>
    where
        F: Fn(usize) -> u32 + Sync;

    /// Exclusive prefix sum of `counts`.
    ///
    /// Returns the offsets array (length `counts.len() + 1`, saturating at
    /// `u32::MAX`) together with the exact total as u64. Callers must
    /// range-check the total before trusting the offsets.
    fn exclusive_scan(&self, counts: &[u32]) -> (Vec<u32>, u64) {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        let mut sum = 0u64;
        offsets.push(0);
        for &count in counts {
            sum += u64::from(count);
            offsets.push(sum.min(u64::from(u32::MAX)) as u32);
        }
        (offsets, sum)
    }
}

/// Single-threaded backend: plain loops, index order, deterministic. Doubles
/// as the reference the threaded backend is tested against.
pub(crate) struct Serial;

impl Backend for Serial {
    fn for_each<F>(&self, n: usize, f: F)
    where
        F: Fn(usize) + Sync,
    {
        for i in 0..n {
            f(i);
        }
    }

    fn map_u32<F>(&self, n: usize, f: F) -> Vec<u32>
    where
        F: Fn(usize) -> u32 + Sync,
    {
        (0..n).map(f).collect()
    }
}

/// Rayon-backed backend. The index range is split into at most
/// `threads * TASKS_PER_THREAD` chunks.
pub(crate) struct Threaded;

impl Threaded {
    #[inline]
    fn min_len(n: usize) -> usize {
        (n / (rayon::current_num_threads() * TASKS_PER_THREAD)).max(1)
    }
}

impl Backend for Threaded {
    fn for_each<F>(&self, n: usize, f: F)
    where
        F: Fn(usize) + Sync,
    {
        (0..n)
            .into_par_iter()
            .with_min_len(Self::min_len(n))
            .for_each(|i| f(i));
    }

    fn map_u32<F>(&self, n: usize, f: F) -> Vec<u32>
    where
        F: Fn(usize) -> u32 + Sync,
    {
        (0..n)
            .into_par_iter()
            .with_min_len(Self::min_len(n))
            .map(|i| f(i))
            .collect()
    }
}

/// Shared view of a mutable slice for parallel writes at indices the caller
/// guarantees are disjoint across tasks.
///
/// Both users in this crate derive disjointness from a prefix sum: every
/// destination slot is handed out exactly once, either by index or by an
/// atomic cursor.
pub(crate) struct DisjointSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    _lifetime: PhantomData<&'a mut [T]>,
}

unsafe impl<T: Send> Send for DisjointSlice<'_, T> {}
unsafe impl<T: Send> Sync for DisjointSlice<'_, T> {}

impl<'a, T> DisjointSlice<'a, T> {
    pub fn new(slice: &'a mut [T]) -> Self {
        DisjointSlice {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _lifetime: PhantomData,
        }
    }

    /// Write `value` at `index`.
    ///
    /// # Safety
    /// `index` must be in bounds, and no other task may touch `index` for
    /// the duration of the parallel region.
    #[inline]
    pub unsafe fn write(&self, index: usize, value: T) {
        debug_assert!(index < self.len);
        unsafe { self.ptr.add(index).write(value) };
    }
}
