//! The engine seam.
//!
//! A [`Program`] is a compiled computation that can be instantiated into a
//! running [`Engine`]. The bridge drives the engine through this trait and
//! never looks at how it computes: it only submits commands, asks for
//! commits and receives weighted deltas back.
//!
//! [`memory`] provides an in-process engine used by tests and tools.

pub mod memory;

use crate::buffer::FlatBuffer;
use crate::command::Command;
use crate::config::Config;
use crate::error::CoreResult;
use crate::recording::Snapshot;
use crate::types::{ClearStatus, DeltaEntry, TableId};
use ddbridge_record::Record;

pub use memory::{MemoryEngine, MemoryProgram};

/// A compiled program that can be started.
pub trait Program {
    /// Creates a running engine.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Engine` if initialisation fails.
    fn instantiate(&self, config: &Config) -> CoreResult<Box<dyn Engine>>;
}

/// A running engine instance.
///
/// Transaction bookkeeping on the bridge side guarantees the engine only
/// sees calls in a legal order: `transaction_start` before updates and
/// commits, and no nested transactions.
pub trait Engine: Send + Sync {
    /// Resolves a relation name.
    fn relation_id(&self, name: &str) -> Option<TableId>;

    /// Opens a transaction.
    fn transaction_start(&mut self) -> CoreResult<()>;

    /// Applies a batch of commands atomically.
    fn apply_updates(&mut self, commands: Vec<Command>) -> CoreResult<()>;

    /// Decodes and applies a batch encoded in `bytes[position..]`.
    fn apply_updates_from_buffer(&mut self, bytes: &[u8], position: usize) -> CoreResult<()>;

    /// Removes every fact from an input relation.
    fn clear_relation(&mut self, table: TableId) -> CoreResult<ClearStatus>;

    /// Commits and returns the output delta, ordered by table then record.
    fn commit(&mut self) -> CoreResult<Vec<DeltaEntry>>;

    /// Commits and returns the output delta encoded in a flat buffer.
    fn commit_to_buffer(&mut self) -> CoreResult<FlatBuffer>;

    /// Takes back a buffer issued by `commit_to_buffer`.
    fn release_buffer(&mut self, buffer: FlatBuffer) -> CoreResult<()>;

    /// Discards the open transaction.
    fn rollback(&mut self) -> CoreResult<()>;

    /// Calls `visit` for every stored record of `table` until it returns
    /// `false`.
    fn for_each_stored(
        &self,
        table: TableId,
        visit: &mut dyn FnMut(&Record) -> bool,
    ) -> CoreResult<()>;

    /// Copies every input relation.
    fn input_snapshot(&self) -> CoreResult<Snapshot>;

    /// Returns a human-readable profile.
    fn profile(&self) -> String;

    /// Turns CPU profiling on or off.
    fn enable_cpu_profiling(&mut self, enable: bool) -> CoreResult<()>;

    /// Releases engine resources. No other call follows.
    fn stop(&mut self) -> CoreResult<()>;
}
