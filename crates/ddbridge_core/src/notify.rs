//! Change delivery.
//!
//! Commit mode fans a delta out to the commit handler from up to `workers`
//! threads; a record whose weight is `w` is reported `|w|` times. Delta
//! mode and table dumps run the caller's handler on one internal thread,
//! in delta order.
//!
//! All threads are scoped to the delivering call, so the borrowed records
//! handed to handlers never outlive it. A handler panic is caught when the
//! thread is joined and reported as [`CoreError::CallbackPanicked`].

use crate::engine::Engine;
use crate::error::{CoreError, CoreResult};
use crate::types::{ChangeEvent, DeltaEntry, TableId};
use ddbridge_record::Record;
use std::sync::Arc;
use std::thread;
use tracing::warn;

/// Handler invoked for every change of a committed transaction.
pub type CommitHandler = Arc<dyn Fn(ChangeEvent<'_>) + Send + Sync>;

/// Delivers committed changes to handlers.
pub struct ChangeNotifier {
    workers: usize,
    on_commit: Option<CommitHandler>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("workers", &self.workers)
            .field("on_commit", &self.on_commit.is_some())
            .finish()
    }
}

impl ChangeNotifier {
    /// Creates a notifier fanning out to `workers` threads.
    pub fn new(workers: usize, on_commit: Option<CommitHandler>) -> Self {
        Self {
            workers: workers.max(1),
            on_commit,
        }
    }

    /// Returns true if a commit handler is registered.
    pub fn has_commit_handler(&self) -> bool {
        self.on_commit.is_some()
    }

    /// Runs the commit handler over `delta`.
    ///
    /// Returns the number of handler invocations.
    pub fn deliver_commit(&self, delta: &[DeltaEntry]) -> CoreResult<u64> {
        let Some(handler) = &self.on_commit else {
            return Ok(0);
        };
        if delta.is_empty() {
            return Ok(0);
        }

        let workers = self.workers.min(delta.len());
        let chunk = delta.len().div_ceil(workers);
        let results: Vec<thread::Result<u64>> = thread::scope(|s| {
            let handles: Vec<_> = delta
                .chunks(chunk)
                .map(|part| {
                    s.spawn(move || {
                        let mut calls = 0u64;
                        for entry in part {
                            let event = entry.as_event();
                            for _ in 0..entry.weight.unsigned_abs() {
                                handler(event);
                                calls += 1;
                            }
                        }
                        calls
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let mut total = 0;
        let mut panicked = 0;
        for result in results {
            match result {
                Ok(calls) => total += calls,
                Err(_) => panicked += 1,
            }
        }
        if panicked > 0 {
            warn!(panicked, "commit handler panicked on worker threads");
            return Err(CoreError::callback_panicked("commit"));
        }
        Ok(total)
    }

    /// Runs `handler` once per delta entry on a single internal thread.
    ///
    /// Returns the number of handler invocations.
    pub fn deliver_delta<F>(&self, delta: &[DeltaEntry], handler: F) -> CoreResult<u64>
    where
        F: FnMut(ChangeEvent<'_>) + Send,
    {
        thread::scope(|s| {
            s.spawn(move || {
                let mut handler = handler;
                for entry in delta {
                    handler(entry.as_event());
                }
                delta.len() as u64
            })
            .join()
        })
        .map_err(|_| {
            warn!("delta handler panicked");
            CoreError::callback_panicked("delta")
        })
    }
}

/// Streams the stored records of `table` to `handler` on one internal
/// thread. `handler` returning `false` ends the dump early.
pub fn deliver_dump<F>(engine: &dyn Engine, table: TableId, handler: F) -> CoreResult<()>
where
    F: FnMut(&Record) -> bool + Send,
{
    thread::scope(|s| {
        s.spawn(move || {
            let mut handler = handler;
            engine.for_each_stored(table, &mut handler)
        })
        .join()
    })
    .map_err(|_| {
        warn!(%table, "dump handler panicked");
        CoreError::callback_panicked("dump")
    })?
}
