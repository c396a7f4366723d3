//! Command recording and input snapshots.
//!
//! A recording is an append-only file holding one entry per state-changing
//! control operation. A snapshot file holds full copies of every input
//! relation, one per `dump_input_snapshot` call. Both are sequences of
//! CBOR items; the layout is private to this crate.

use crate::command::Command;
use crate::error::{CoreError, CoreResult};
use crate::types::TableId;
use ddbridge_record::Record;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One recorded control operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    /// `transaction_start`.
    Start,
    /// A batch accepted by `apply_updates`.
    Updates(Vec<Command>),
    /// A batch accepted by `apply_updates_from_buffer` (encoded message).
    UpdatesFromBuffer(Vec<u8>),
    /// `clear_relation` on an input relation.
    ClearRelation(TableId),
    /// `transaction_commit`.
    Commit,
    /// `transaction_commit_dump_changes` or its buffer variant.
    CommitDumpChanges,
    /// `transaction_rollback`.
    Rollback,
}

/// Contents of one relation in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSnapshot {
    /// Relation id.
    pub table: TableId,
    /// Relation name.
    pub name: String,
    /// Stored records.
    pub records: Vec<Record>,
}

/// A full copy of all input relations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// One entry per input relation.
    pub relations: Vec<RelationSnapshot>,
}

fn open(path: &Path, append: bool) -> CoreResult<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options.open(path).map_err(|e| CoreError::io(path, e))
}

fn write_item<T: Serialize>(path: &Path, writer: &mut impl Write, item: &T) -> CoreResult<()> {
    ciborium::into_writer(item, &mut *writer).map_err(|e| match e {
        ciborium::ser::Error::Io(source) => CoreError::io(path, source),
        ciborium::ser::Error::Value(message) => CoreError::encoding(message),
    })?;
    writer.flush().map_err(|e| CoreError::io(path, e))
}

fn read_items<T: DeserializeOwned>(path: &Path) -> CoreResult<Vec<T>> {
    let bytes = std::fs::read(path).map_err(|e| CoreError::io(path, e))?;
    let mut rest = bytes.as_slice();
    let mut items = Vec::new();
    while !rest.is_empty() {
        let item = ciborium::from_reader(&mut rest).map_err(|e| {
            CoreError::encoding(format!("{}: {e}", path.display()))
        })?;
        items.push(item);
    }
    Ok(items)
}

/// Active command recording.
#[derive(Debug)]
pub struct Recorder {
    path: PathBuf,
    writer: BufWriter<File>,
    entries: u64,
}

impl Recorder {
    /// Opens `path`, appending or truncating.
    pub fn open(path: &Path, append: bool) -> CoreResult<Self> {
        let file = open(path, append)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            entries: 0,
        })
    }

    /// Appends one entry and flushes it to the file.
    pub fn append(&mut self, entry: &LogEntry) -> CoreResult<()> {
        write_item(&self.path, &mut self.writer, entry)?;
        self.entries += 1;
        Ok(())
    }

    /// Returns the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of entries written by this recorder.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Flushes and closes the file.
    pub fn finish(mut self) -> CoreResult<()> {
        self.writer
            .flush()
            .map_err(|e| CoreError::io(&self.path, e))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| CoreError::io(&self.path, e))
    }
}

/// Writes `snapshot` to `path`, appending or truncating.
pub fn write_snapshot(path: &Path, append: bool, snapshot: &Snapshot) -> CoreResult<()> {
    let mut writer = BufWriter::new(open(path, append)?);
    write_item(path, &mut writer, snapshot)
}

/// Reads every entry of a recording.
pub fn read_log(path: &Path) -> CoreResult<Vec<LogEntry>> {
    read_items(path)
}

/// Reads every snapshot stored in `path`, oldest first.
pub fn read_snapshots(path: &Path) -> CoreResult<Vec<Snapshot>> {
    read_items(path)
}
