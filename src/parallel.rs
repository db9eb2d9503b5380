//! Parallelism over independent images
//!
//! With the `parallel` feature, work fans out over rayon's pool; without it
//! the same functions run sequentially. Results always come back in index
//! order, and counts are combined with a plain sum, so evaluation output
//! does not depend on scheduling.

use crate::error::PatchNetResult;
#[cfg(feature = "parallel")]
use crate::trace_event;

/// Configure the global thread pool with the specified number of threads.
///
/// Only the first successful call takes effect (rayon limitation); later
/// calls report the pool that is already running.
///
/// # Arguments
///
/// * `num_threads` - Number of threads to use. If None, uses rayon's default
///   (typically the number of logical CPUs).
#[cfg(feature = "parallel")]
pub fn configure_thread_pool(num_threads: Option<u32>) -> PatchNetResult<usize> {
    use rayon::ThreadPoolBuilder;

    let builder = ThreadPoolBuilder::new();
    let builder = if let Some(n) = num_threads {
        builder.num_threads(n as usize)
    } else {
        builder
    };

    match builder.build_global() {
        Ok(()) => Ok(rayon::current_num_threads()),
        Err(_err) => {
            // Pool already initialized, keep it
            trace_event!(error = %_err, "thread pool already configured");
            Ok(rayon::current_num_threads())
        }
    }
}

/// Sequential fallback - no thread pool to configure.
#[cfg(not(feature = "parallel"))]
pub fn configure_thread_pool(num_threads: Option<u32>) -> PatchNetResult<usize> {
    let _ = num_threads;
    Ok(1)
}

/// Map that collects Results, stopping at the first error.
#[cfg(feature = "parallel")]
pub fn parallel_try_map<T, F>(range: std::ops::Range<usize>, f: F) -> PatchNetResult<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> PatchNetResult<T> + Send + Sync,
{
    use rayon::prelude::*;
    range.into_par_iter().map(f).collect()
}

/// Sequential fallback for try_map.
#[cfg(not(feature = "parallel"))]
pub fn parallel_try_map<T, F>(range: std::ops::Range<usize>, f: F) -> PatchNetResult<Vec<T>>
where
    F: Fn(usize) -> PatchNetResult<T>,
{
    range.map(f).collect()
}

/// Count the indices for which `f` returns `Ok(true)`.
///
/// Fails with the first error encountered.
#[cfg(feature = "parallel")]
pub fn parallel_count<F>(range: std::ops::Range<usize>, f: F) -> PatchNetResult<usize>
where
    F: Fn(usize) -> PatchNetResult<bool> + Send + Sync,
{
    use rayon::prelude::*;
    range
        .into_par_iter()
        .map(|i| f(i).map(usize::from))
        .try_reduce(|| 0, |a, b| Ok(a + b))
}

/// Sequential fallback for count.
#[cfg(not(feature = "parallel"))]
pub fn parallel_count<F>(range: std::ops::Range<usize>, f: F) -> PatchNetResult<usize>
where
    F: Fn(usize) -> PatchNetResult<bool>,
{
    range.map(|i| f(i).map(usize::from)).sum()
}
