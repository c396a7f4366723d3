//! Update commands.

use crate::types::TableId;
use ddbridge_record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a command does to its relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Add the record.
    Insert,
    /// Remove the record with exactly this value.
    DeleteByValue,
    /// Remove the record whose primary key equals this record.
    DeleteByKey,
}

/// A single update addressed to an input relation.
///
/// The record is moved into the command and consumed when the command
/// is submitted with `apply_updates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Kind of update.
    pub kind: CommandKind,
    /// Target relation.
    pub table: TableId,
    /// Record value (or key, for `DeleteByKey`).
    pub record: Record,
}

impl Command {
    /// Creates an insert command.
    pub fn insert(table: TableId, record: Record) -> Self {
        Self {
            kind: CommandKind::Insert,
            table,
            record,
        }
    }

    /// Creates a delete-by-value command.
    pub fn delete_val(table: TableId, record: Record) -> Self {
        Self {
            kind: CommandKind::DeleteByValue,
            table,
            record,
        }
    }

    /// Creates a delete-by-key command; `key` is the primary key value.
    pub fn delete_key(table: TableId, key: Record) -> Self {
        Self {
            kind: CommandKind::DeleteByKey,
            table,
            record: key,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            CommandKind::Insert => "insert",
            CommandKind::DeleteByValue => "delete",
            CommandKind::DeleteByKey => "delete_key",
        };
        write!(f, "{verb} {}[{}]", self.table, self.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kind() {
        let t = TableId::new(2);
        assert_eq!(
            Command::insert(t, Record::i64(1)).kind,
            CommandKind::Insert
        );
        assert_eq!(
            Command::delete_val(t, Record::i64(1)).kind,
            CommandKind::DeleteByValue
        );
        assert_eq!(
            Command::delete_key(t, Record::i64(1)).kind,
            CommandKind::DeleteByKey
        );
    }

    #[test]
    fn display() {
        let cmd = Command::insert(
            TableId::new(0),
            Record::structure("Edge", vec![Record::i64(1), Record::i64(2)]),
        );
        assert_eq!(cmd.to_string(), "insert rel:0[Edge{1, 2}]");
    }
}
