//! Core type definitions for ddbridge.

use ddbridge_record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier of a relation (table) inside the engine.
///
/// Ids are assigned by the engine and stable for its lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TableId(pub u32);

impl TableId {
    /// Creates a new table ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel:{}", self.0)
    }
}

/// Direction of a reported change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Record was added.
    Insert,
    /// Record was removed.
    DeleteVal,
}

impl ChangeKind {
    /// Maps a signed weight to a change direction.
    #[must_use]
    pub fn from_weight(weight: i64) -> Self {
        if weight > 0 {
            ChangeKind::Insert
        } else {
            ChangeKind::DeleteVal
        }
    }

    /// Returns true for insertions.
    #[must_use]
    pub fn polarity(self) -> bool {
        self == ChangeKind::Insert
    }
}

/// A change handed to commit and delta handlers.
///
/// The record is borrowed from the engine and only valid for the
/// duration of the handler call; clone it to keep it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeEvent<'a> {
    /// Output relation that changed.
    pub table: TableId,
    /// Whether the record was added or removed.
    pub kind: ChangeKind,
    /// The changed record.
    pub record: &'a Record,
}

/// One entry of a committed delta: a record and its net weight change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaEntry {
    /// Output relation.
    pub table: TableId,
    /// Changed record.
    pub record: Record,
    /// Net multiplicity change; never zero.
    pub weight: i64,
}

impl DeltaEntry {
    /// Borrows this entry as a change event.
    #[must_use]
    pub fn as_event(&self) -> ChangeEvent<'_> {
        ChangeEvent {
            table: self.table,
            kind: ChangeKind::from_weight(self.weight),
            record: &self.record,
        }
    }
}

/// Outcome of clearing a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearStatus {
    /// All facts were removed.
    Cleared,
    /// The id does not name an input relation; nothing happened.
    NotInputRelation,
}

impl ClearStatus {
    /// Returns the numeric status code (`0` on success, `-1` otherwise).
    #[must_use]
    pub const fn as_code(self) -> i32 {
        match self {
            ClearStatus::Cleared => 0,
            ClearStatus::NotInputRelation => -1,
        }
    }
}

/// Role of a relation in the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationRole {
    /// Facts are supplied by the host.
    Input,
    /// Facts are derived by the engine.
    Output,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_id_display() {
        assert_eq!(format!("{}", TableId::new(7)), "rel:7");
        assert!(TableId::new(1) < TableId::new(2));
    }

    #[test]
    fn weight_to_kind() {
        assert_eq!(ChangeKind::from_weight(3), ChangeKind::Insert);
        assert_eq!(ChangeKind::from_weight(-1), ChangeKind::DeleteVal);
        assert!(ChangeKind::Insert.polarity());
        assert!(!ChangeKind::DeleteVal.polarity());
    }

    #[test]
    fn clear_status_codes() {
        assert_eq!(ClearStatus::Cleared.as_code(), 0);
        assert_eq!(ClearStatus::NotInputRelation.as_code(), -1);
    }
}
