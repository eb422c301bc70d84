//! Bounded parallel execution with per-item failure isolation.
//!
//! # Overview
//!
//! Every fingerprinting and comparison step runs through a
//! [`ParallelExecutor`]. It owns a dedicated rayon thread pool and maps a
//! worker over a slice of items, keeping only the successful results:
//!
//! - A worker returning `Err` is logged at debug level and skipped.
//! - A worker that panics is caught, logged as a warning and skipped.
//! - Once the shutdown flag is raised, remaining items are not started.
//!
//! The relative order of results is not meaningful; callers that need
//! determinism sort afterwards.
//!
//! # Example
//!
//! ```
//! use photodupe::duplicates::ParallelExecutor;
//!
//! let executor = ParallelExecutor::new(Some(2)).unwrap();
//! let mut squares = executor.map_parallel(&[1u64, 2, 3], |n| {
//!     if *n == 2 {
//!         Err("skip two")
//!     } else {
//!         Ok(n * n)
//!     }
//! });
//! squares.sort_unstable();
//! assert_eq!(squares, vec![1, 9]);
//! ```

use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::progress::ProgressCallback;

/// Errors raised while setting up the executor.
#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    /// A worker count of zero was requested.
    #[error("Worker count must be at least 1")]
    ZeroThreads,

    /// The thread pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),
}

/// Runs independent units of work on a bounded pool of workers.
pub struct ParallelExecutor {
    pool: rayon::ThreadPool,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ParallelExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelExecutor")
            .field("threads", &self.pool.current_num_threads())
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ParallelExecutor {
    /// Create an executor with `threads` workers.
    ///
    /// `None` uses one worker per available CPU core.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ZeroThreads`] for `Some(0)` and
    /// [`ExecutorError::PoolBuild`] if the OS refuses to spawn the workers.
    pub fn new(threads: Option<usize>) -> Result<Self, ExecutorError> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("photodupe-worker-{i}"));
        match threads {
            Some(0) => return Err(ExecutorError::ZeroThreads),
            Some(n) => builder = builder.num_threads(n),
            None => {}
        }

        let pool = builder.build()?;
        log::debug!(
            "Executor started with {} workers",
            pool.current_num_threads()
        );

        Ok(Self {
            pool,
            shutdown_flag: None,
            progress_callback: None,
        })
    }

    /// Set the shutdown flag checked before each unit of work.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback used by [`map_parallel_reporting`](Self::map_parallel_reporting).
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Number of workers in the pool.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Check if shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Apply `worker` to every item concurrently and collect the successes.
    ///
    /// Failures and panics are logged and dropped; they never abort the
    /// batch.
    pub fn map_parallel<T, R, E, F>(&self, items: &[T], worker: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        E: Display,
        F: Fn(&T) -> Result<R, E> + Sync,
    {
        self.run(items, None, worker)
    }

    /// Like [`map_parallel`](Self::map_parallel), reporting one progress tick
    /// per finished item under the given phase name.
    pub fn map_parallel_reporting<T, R, E, F>(&self, phase: &str, items: &[T], worker: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        E: Display,
        F: Fn(&T) -> Result<R, E> + Sync,
    {
        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_start(phase, items.len());
        }

        let results = self.run(items, Some(phase), worker);

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_end(phase);
        }
        results
    }

    fn run<T, R, E, F>(&self, items: &[T], phase: Option<&str>, worker: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        E: Display,
        F: Fn(&T) -> Result<R, E> + Sync,
    {
        let completed = AtomicUsize::new(0);
        let label = phase.unwrap_or("work");

        self.pool.install(|| {
            items
                .par_iter()
                .filter_map(|item| {
                    if self.is_shutdown_requested() {
                        return None;
                    }

                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker(item)));

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if phase.is_some() {
                        if let Some(ref callback) = self.progress_callback {
                            callback.on_progress(done, label);
                        }
                    }

                    match outcome {
                        Ok(Ok(result)) => Some(result),
                        Ok(Err(e)) => {
                            log::debug!("{label}: item skipped: {e}");
                            None
                        }
                        Err(payload) => {
                            log::warn!("{label}: worker panicked: {}", panic_message(payload.as_ref()));
                            None
                        }
                    }
                })
                .collect()
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
