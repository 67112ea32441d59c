//! Parallelism configuration shared by batch prediction.

use rayon::prelude::*;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// Batch prediction takes this flag instead of managing a thread pool; the
/// pool itself is set up by [`run_with_threads`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Map a requested thread count onto a flag for the batch predictor.
    ///
    /// Only an explicit count of 1, or 0 inside a single-threaded pool, keeps
    /// row blocks on the calling thread.
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Score row blocks, one `init` state per worker.
    ///
    /// Returns the first decoding error; with several failing blocks in
    /// parallel mode any one of them may be reported.
    #[inline]
    pub fn maybe_par_bridge_try_for_each_init<T, E, I, INIT, S, F>(
        self,
        iter: I,
        init: INIT,
        f: F,
    ) -> Result<(), E>
    where
        T: Send,
        E: Send,
        I: Iterator<Item = T> + Send,
        INIT: Fn() -> S + Sync + Send,
        F: Fn(&mut S, T) -> Result<(), E> + Sync + Send,
    {
        if self.is_parallel() {
            iter.par_bridge().try_for_each_init(init, f)
        } else {
            let mut state = init();
            iter.into_iter().try_for_each(|item| f(&mut state, item))
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run batch prediction (or anything else taking a [`Parallelism`]) with
/// `n_threads` workers.
///
/// `0` reuses the ambient rayon pool, `1` stays on the calling thread, and
/// any larger count gets a dedicated pool of that size.
///
/// # Example
///
/// ```
/// use compact_trees::{run_with_threads, Parallelism};
///
/// let sequential = run_with_threads(1, |parallelism| parallelism);
/// assert_eq!(sequential, Parallelism::Sequential);
/// ```
#[inline]
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    let parallelism = Parallelism::from_threads(n_threads);

    match parallelism {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel if n_threads == 0 => f(Parallelism::Parallel),
        Parallelism::Parallel => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build()
                .expect("Failed to create thread pool");
            pool.install(|| f(Parallelism::Parallel))
        }
    }
}
