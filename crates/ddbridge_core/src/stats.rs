//! Bridge-side counters reported by `profile()`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for control operations and delivered changes.
///
/// All counters are atomic; commit-mode handlers bump `changes_delivered`
/// from several worker threads at once.
#[derive(Debug, Default)]
pub struct BridgeStats {
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    commands_applied: AtomicU64,
    changes_delivered: AtomicU64,
    tables_dumped: AtomicU64,
}

impl BridgeStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commands(&self, count: u64) {
        self.commands_applied.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_changes(&self, count: u64) {
        self.changes_delivered.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_dump(&self) {
        self.tables_dumped.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
            commands_applied: self.commands_applied.load(Ordering::Relaxed),
            changes_delivered: self.changes_delivered.load(Ordering::Relaxed),
            tables_dumped: self.tables_dumped.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`BridgeStats`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Transactions started.
    pub transactions_started: u64,
    /// Transactions committed (any commit mode).
    pub transactions_committed: u64,
    /// Transactions rolled back.
    pub transactions_rolled_back: u64,
    /// Commands accepted by `apply_updates`.
    pub commands_applied: u64,
    /// Handler invocations for commit and delta delivery.
    pub changes_delivered: u64,
    /// Completed table dumps.
    pub tables_dumped: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "transactions started:     {}", self.transactions_started)?;
        writeln!(f, "transactions committed:   {}", self.transactions_committed)?;
        writeln!(f, "transactions rolled back: {}", self.transactions_rolled_back)?;
        writeln!(f, "commands applied:         {}", self.commands_applied)?;
        writeln!(f, "changes delivered:        {}", self.changes_delivered)?;
        write!(f, "tables dumped:            {}", self.tables_dumped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = BridgeStats::new();
        stats.record_start();
        stats.record_commit();
        stats.record_start();
        stats.record_rollback();
        stats.record_commands(5);
        stats.record_changes(3);
        stats.record_dump();

        let snap = stats.snapshot();
        assert_eq!(snap.transactions_started, 2);
        assert_eq!(snap.transactions_committed, 1);
        assert_eq!(snap.transactions_rolled_back, 1);
        assert_eq!(snap.commands_applied, 5);
        assert_eq!(snap.changes_delivered, 3);
        assert_eq!(snap.tables_dumped, 1);
    }

    #[test]
    fn display_lists_every_counter() {
        let text = StatsSnapshot::default().to_string();
        assert_eq!(text.lines().count(), 6);
        assert!(text.contains("changes delivered"));
    }
}
