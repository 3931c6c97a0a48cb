//! Parallel or sequential execution over batch units.
//!
//! Every stage of the pipeline maps a pure function over independent units
//! (dates, or date and characteristic pairs). These helpers hide the choice
//! between rayon's work-stealing pool and the calling thread. Results come
//! back in input order either way, so output assembly never depends on
//! completion order.

use rayon::prelude::*;

/// Map a function over a slice, in parallel unless `force_sequential` is set.
///
/// Returns a Vec of results in the same order as input.
#[inline]
pub fn map_slice<T, F, R>(slice: &[T], f: F, force_sequential: bool) -> Vec<R>
where
    T: Sync,
    F: Fn(&T) -> R + Sync + Send,
    R: Send,
{
    if force_sequential {
        slice.iter().map(f).collect()
    } else {
        slice.par_iter().map(f).collect()
    }
}

/// Map a function over every index in `0..len`, in input order.
#[inline]
pub fn map_range<F, R>(len: usize, f: F, force_sequential: bool) -> Vec<R>
where
    F: Fn(usize) -> R + Sync + Send,
    R: Send,
{
    if force_sequential {
        (0..len).map(f).collect()
    } else {
        (0..len).into_par_iter().map(f).collect()
    }
}
