//! The engine handle: the control surface of the bridge.

use crate::buffer::FlatBuffer;
use crate::command::Command;
use crate::config::Config;
use crate::engine::{Engine, Program};
use crate::error::{CoreError, CoreResult};
use crate::notify::{self, ChangeNotifier, CommitHandler};
use crate::recording::{self, LogEntry, Recorder};
use crate::registry::TableRegistry;
use crate::stats::{BridgeStats, StatsSnapshot};
use crate::transaction::{TransactionController, TxnState};
use crate::types::{ChangeEvent, ClearStatus, TableId};
use ddbridge_record::Record;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A running engine together with its transaction state, change
/// notification and optional command recording.
///
/// Control operations take `&mut self`, so calls on one handle are
/// serialised by the borrow checker. [`EngineHandle::stop`] consumes the
/// handle; dropping a live handle stops it as well.
///
/// # Example
///
/// ```
/// use ddbridge_core::{Command, Config, EngineHandle, MemoryProgram};
/// use ddbridge_record::Record;
///
/// let program = MemoryProgram::new()
///     .input("Edge")
///     .output("Source")
///     .rule("Edge", "Source", |e| vec![e.tuple_field(0).unwrap().clone()]);
///
/// let mut handle = EngineHandle::start_with_handler(&program, Config::new().workers(2), |event| {
///     println!("{:?} {}", event.kind, event.record);
/// })
/// .unwrap();
///
/// let edge = handle.get_table_id("Edge").unwrap();
/// handle.transaction_start().unwrap();
/// handle
///     .apply_updates(vec![Command::insert(
///         edge,
///         Record::tuple(vec![Record::i64(1), Record::i64(2)]),
///     )])
///     .unwrap();
/// handle.transaction_commit().unwrap();
/// handle.stop().unwrap();
/// ```
pub struct EngineHandle {
    engine: Box<dyn Engine>,
    config: Config,
    registry: TableRegistry,
    txn: TransactionController,
    notifier: ChangeNotifier,
    recorder: Option<Recorder>,
    stats: BridgeStats,
    stopped: bool,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("config", &self.config)
            .field("state", &self.txn.state())
            .field("notifier", &self.notifier)
            .field("recording", &self.recorder.as_ref().map(Recorder::path))
            .finish_non_exhaustive()
    }
}

impl EngineHandle {
    /// Starts an engine without a commit handler.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Engine` if the engine fails to start, for
    /// instance when `config.workers` is zero.
    pub fn start(program: &dyn Program, config: Config) -> CoreResult<Self> {
        Self::launch(program, config, None)
    }

    /// Starts an engine whose commits are reported to `handler`.
    ///
    /// The handler runs concurrently on up to `config.workers` threads.
    pub fn start_with_handler<F>(program: &dyn Program, config: Config, handler: F) -> CoreResult<Self>
    where
        F: Fn(ChangeEvent<'_>) + Send + Sync + 'static,
    {
        let handler: CommitHandler = Arc::new(handler);
        Self::launch(program, config, Some(handler))
    }

    fn launch(
        program: &dyn Program,
        config: Config,
        on_commit: Option<CommitHandler>,
    ) -> CoreResult<Self> {
        if config.workers == 0 {
            return Err(CoreError::engine("workers must be at least 1"));
        }
        let engine = program.instantiate(&config)?;
        let notifier = ChangeNotifier::new(config.workers, on_commit);
        info!(
            workers = config.workers,
            store_data = config.store_data,
            commit_handler = notifier.has_commit_handler(),
            "engine started"
        );
        Ok(Self {
            engine,
            notifier,
            config,
            registry: TableRegistry::new(),
            txn: TransactionController::new(),
            recorder: None,
            stats: BridgeStats::new(),
            stopped: false,
        })
    }

    /// Stops the engine, flushing any active recording.
    pub fn stop(mut self) -> CoreResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> CoreResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        let recording = match self.recorder.take() {
            Some(recorder) => recorder.finish(),
            None => Ok(()),
        };
        let engine = self.engine.stop();
        info!("engine stopped");
        recording.and(engine)
    }

    /// Returns the number of worker threads.
    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Returns whether table contents are retained.
    pub fn store_data(&self) -> bool {
        self.config.store_data
    }

    /// Returns the transaction state.
    pub fn state(&self) -> TxnState {
        self.txn.state()
    }

    /// Returns true while commands are being recorded.
    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    /// Returns the bridge counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Resolves a table name, asking the engine at most once per name.
    pub fn get_table_id(&self, name: &str) -> CoreResult<TableId> {
        self.registry
            .resolve(name, |name| self.engine.relation_id(name))
    }

    fn record(&mut self, entry: LogEntry) -> CoreResult<()> {
        match self.recorder.as_mut() {
            Some(recorder) => recorder.append(&entry),
            None => Ok(()),
        }
    }

    /// Opens a transaction.
    pub fn transaction_start(&mut self) -> CoreResult<()> {
        self.txn.begin("transaction_start")?;
        if let Err(e) = self.engine.transaction_start() {
            self.txn.abort();
            return Err(e);
        }
        self.stats.record_start();
        debug!("transaction started");
        self.record(LogEntry::Start)
    }

    /// Commits the open transaction and reports the changes to the commit
    /// handler, if one was registered at start.
    ///
    /// A handler panic is reported after every worker has finished; the
    /// commit has been applied by then.
    pub fn transaction_commit(&mut self) -> CoreResult<()> {
        self.txn.finish("transaction_commit")?;
        let delta = self.engine.commit()?;
        self.stats.record_commit();
        debug!(changes = delta.len(), "transaction committed");

        let delivered = self.notifier.deliver_commit(&delta);
        if let Ok(calls) = &delivered {
            self.stats.record_changes(*calls);
        }
        self.record(LogEntry::Commit)?;
        delivered.map(|_| ())
    }

    /// Commits the open transaction and reports each changed record once
    /// to `handler`, in (table, record) order, from a single thread.
    ///
    /// The commit handler is not invoked for this commit.
    pub fn transaction_commit_dump_changes<F>(&mut self, handler: F) -> CoreResult<()>
    where
        F: FnMut(ChangeEvent<'_>) + Send,
    {
        self.txn.finish("transaction_commit_dump_changes")?;
        let delta = self.engine.commit()?;
        self.stats.record_commit();
        debug!(changes = delta.len(), "transaction committed, dumping changes");

        let delivered = self.notifier.deliver_delta(&delta, handler);
        if let Ok(calls) = &delivered {
            self.stats.record_changes(*calls);
        }
        self.record(LogEntry::CommitDumpChanges)?;
        delivered.map(|_| ())
    }

    /// Commits the open transaction and returns the engine-encoded delta.
    ///
    /// Release the buffer with [`EngineHandle::flatbuf_free`].
    pub fn transaction_commit_dump_changes_to_buffer(&mut self) -> CoreResult<FlatBuffer> {
        self.txn
            .finish("transaction_commit_dump_changes_to_buffer")?;
        let buffer = self.engine.commit_to_buffer()?;
        self.stats.record_commit();
        debug!(size = buffer.size(), "transaction committed to buffer");
        self.record(LogEntry::CommitDumpChanges)?;
        Ok(buffer)
    }

    /// Discards the open transaction.
    pub fn transaction_rollback(&mut self) -> CoreResult<()> {
        self.txn.finish("transaction_rollback")?;
        self.engine.rollback()?;
        self.stats.record_rollback();
        debug!("transaction rolled back");
        self.record(LogEntry::Rollback)
    }

    /// Applies a batch of commands atomically.
    ///
    /// The commands are consumed whether or not the batch succeeds.
    pub fn apply_updates(&mut self, commands: Vec<Command>) -> CoreResult<()> {
        self.txn.require_active("apply_updates")?;
        let count = commands.len() as u64;
        let logged = self.recorder.is_some().then(|| commands.clone());

        self.engine.apply_updates(commands)?;
        self.stats.record_commands(count);
        match logged {
            Some(commands) => self.record(LogEntry::Updates(commands)),
            None => Ok(()),
        }
    }

    /// Applies a batch encoded by the engine's buffer format, starting at
    /// `position` within `bytes`.
    pub fn apply_updates_from_buffer(&mut self, bytes: &[u8], position: usize) -> CoreResult<()> {
        self.txn.require_active("apply_updates_from_buffer")?;
        self.engine.apply_updates_from_buffer(bytes, position)?;
        if self.recorder.is_some() {
            let message = bytes.get(position..).map(<[u8]>::to_vec).unwrap_or_default();
            self.record(LogEntry::UpdatesFromBuffer(message))?;
        }
        Ok(())
    }

    /// Removes every fact of an input relation.
    ///
    /// Ids that do not name an input relation yield
    /// [`ClearStatus::NotInputRelation`].
    pub fn clear_relation(&mut self, table: TableId) -> CoreResult<ClearStatus> {
        self.txn.require_active("clear_relation")?;
        let status = self.engine.clear_relation(table)?;
        match status {
            ClearStatus::Cleared => self.record(LogEntry::ClearRelation(table))?,
            ClearStatus::NotInputRelation => {
                debug!(%table, "clear_relation on a non-input relation");
            }
        }
        Ok(status)
    }

    /// Streams the stored contents of table `name` to `handler`.
    ///
    /// The handler runs on one internal thread; returning `false` stops
    /// the dump early.
    ///
    /// # Errors
    ///
    /// `UnknownTable` if the name does not resolve, `FeatureDisabled` if the
    /// engine was started without `store_data`.
    pub fn dump_table<F>(&self, name: &str, handler: F) -> CoreResult<()>
    where
        F: FnMut(&Record) -> bool + Send,
    {
        let table = self.get_table_id(name)?;
        if !self.config.store_data {
            return Err(CoreError::feature_disabled("dump_table requires store_data"));
        }
        notify::deliver_dump(&*self.engine, table, handler)?;
        self.stats.record_dump();
        Ok(())
    }

    /// Starts, replaces or stops (with `None`) the command recording.
    ///
    /// An active recording is flushed and closed first.
    pub fn record_commands(&mut self, path: Option<&Path>, append: bool) -> CoreResult<()> {
        if let Some(previous) = self.recorder.take() {
            let entries = previous.entries();
            let file = previous.path().display().to_string();
            previous.finish()?;
            info!(file = %file, entries, "command recording stopped");
        }
        if let Some(path) = path {
            self.recorder = Some(Recorder::open(path, append)?);
            info!(file = %path.display(), append, "command recording started");
        }
        Ok(())
    }

    /// Writes a copy of every input relation to `path`.
    pub fn dump_input_snapshot(&self, path: &Path, append: bool) -> CoreResult<()> {
        let snapshot = self.engine.input_snapshot()?;
        recording::write_snapshot(path, append, &snapshot)?;
        info!(
            file = %path.display(),
            relations = snapshot.relations.len(),
            "input snapshot written"
        );
        Ok(())
    }

    /// Returns the engine profile followed by the bridge counters.
    pub fn profile(&self) -> String {
        format!("{}\n{}", self.engine.profile(), self.stats.snapshot())
    }

    /// Turns engine CPU profiling on or off.
    pub fn enable_cpu_profiling(&mut self, enable: bool) -> CoreResult<()> {
        self.engine.enable_cpu_profiling(enable)?;
        self.config.cpu_profiling = enable;
        Ok(())
    }

    /// Hands a buffer from
    /// [`EngineHandle::transaction_commit_dump_changes_to_buffer`] back to
    /// the engine.
    ///
    /// # Errors
    ///
    /// `CoreError::Engine` if the buffer, size and offset do not match what
    /// the engine issued.
    pub fn flatbuf_free(&mut self, buffer: FlatBuffer) -> CoreResult<()> {
        self.engine.release_buffer(buffer)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "engine shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryProgram;

    fn program() -> MemoryProgram {
        MemoryProgram::new()
            .input("Edge")
            .output("Source")
            .rule("Edge", "Source", |e| vec![e.tuple_field(0).unwrap().clone()])
    }

    fn edge(a: i64, b: i64) -> Record {
        Record::tuple(vec![Record::i64(a), Record::i64(b)])
    }

    #[test]
    fn zero_workers_fail_to_start() {
        let result = EngineHandle::start(&program(), Config::new().workers(0));
        assert!(matches!(result, Err(CoreError::Engine { .. })));
    }

    #[test]
    fn accessors_reflect_config() {
        let handle =
            EngineHandle::start(&program(), Config::new().workers(3).store_data(false)).unwrap();
        assert_eq!(handle.workers(), 3);
        assert!(!handle.store_data());
        assert_eq!(handle.state(), TxnState::Idle);
        assert!(!handle.is_recording());
    }

    #[test]
    fn updates_outside_transaction_are_rejected() {
        let mut handle = EngineHandle::start(&program(), Config::new().workers(1)).unwrap();
        let table = handle.get_table_id("Edge").unwrap();

        let err = handle
            .apply_updates(vec![Command::insert(table, edge(1, 2))])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
        assert!(matches!(
            handle.clear_relation(table),
            Err(CoreError::InvalidState { .. })
        ));
        assert!(matches!(
            handle.apply_updates_from_buffer(&[], 0),
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn rejected_batch_keeps_transaction_open() {
        let mut handle = EngineHandle::start(&program(), Config::new().workers(1)).unwrap();
        let table = handle.get_table_id("Edge").unwrap();
        handle.transaction_start().unwrap();
        assert!(handle
            .apply_updates(vec![Command::insert(TableId::new(77), edge(1, 2))])
            .is_err());
        assert_eq!(handle.state(), TxnState::InTransaction);

        handle
            .apply_updates(vec![Command::insert(table, edge(1, 2))])
            .unwrap();
        handle.transaction_commit().unwrap();
        assert_eq!(handle.state(), TxnState::Idle);
    }

    #[test]
    fn profile_includes_counters() {
        let mut handle = EngineHandle::start(&program(), Config::new().workers(1)).unwrap();
        handle.enable_cpu_profiling(true).unwrap();
        handle.transaction_start().unwrap();
        handle.transaction_rollback().unwrap();

        let text = handle.profile();
        assert!(text.contains("cpu profiling: on"));
        assert!(text.contains("transactions rolled back: 1"));
    }

    #[test]
    fn drop_stops_the_engine() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cmds.rec");
        {
            let mut handle = EngineHandle::start(&program(), Config::new().workers(1)).unwrap();
            handle.record_commands(Some(&path), false).unwrap();
            handle.transaction_start().unwrap();
        }
        assert_eq!(recording::read_log(&path).unwrap(), vec![LogEntry::Start]);
    }
}
