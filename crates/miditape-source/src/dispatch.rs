//! Run independent per-source jobs inline or on a small thread pool.
//!
//! Each task covers exactly one source, so two threads never work on the same
//! source at once. No ordering is imposed between tasks.

use crate::source::MidiSource;
use crate::{Error, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

pub struct TaskList {
    pool: Option<ThreadPool>,
}

impl TaskList {
    /// Runs every task on the calling thread.
    pub fn inline() -> Self {
        Self { pool: None }
    }

    /// A pool of `threads` workers; zero means inline.
    pub fn with_threads(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Ok(Self::inline());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("miditape-io-{i}"))
            .build()
            .map_err(|e| Error::Dispatch(e.to_string()))?;
        debug!("Task pool started with {} threads", threads);
        Ok(Self { pool: Some(pool) })
    }

    #[inline]
    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Run all tasks and return their results in submission order.
    pub fn run<F>(&self, tasks: Vec<F>) -> Vec<Result<()>>
    where
        F: FnOnce() -> Result<()> + Send,
    {
        match &self.pool {
            None => tasks.into_iter().map(|task| task()).collect(),
            Some(pool) => pool.install(|| tasks.into_par_iter().map(|task| task()).collect()),
        }
    }
}

impl Default for TaskList {
    fn default() -> Self {
        Self::inline()
    }
}

/// Flush every source, one task each.
pub fn flush_all(tasks: &TaskList, sources: &[&MidiSource]) -> Vec<Result<()>> {
    tasks.run(
        sources
            .iter()
            .map(|source| {
                move || {
                    let mut lock = source.lock();
                    source.flush_midi(&mut lock)
                }
            })
            .collect(),
    )
}

/// Load the model of every source, one task each.
pub fn load_all(tasks: &TaskList, sources: &[&MidiSource], force: bool) -> Vec<Result<()>> {
    tasks.run(
        sources
            .iter()
            .map(|source| {
                move || {
                    let mut lock = source.lock();
                    source.load(&mut lock, force)
                }
            })
            .collect(),
    )
}
