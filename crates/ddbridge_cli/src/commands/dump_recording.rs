//! Dump recording command implementation.

use ddbridge_core::recording::read_log;
use ddbridge_core::LogEntry;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Recording entry representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Position in the recording.
    pub index: usize,
    /// Operation name.
    pub operation: &'static str,
    /// Rendered commands, for update batches.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    /// Cleared relation id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<u32>,
    /// Encoded batch size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,
}

impl EntryInfo {
    fn from_entry(index: usize, entry: &LogEntry) -> Self {
        let mut info = Self {
            index,
            operation: "",
            commands: Vec::new(),
            table: None,
            buffer_size: None,
        };
        info.operation = match entry {
            LogEntry::Start => "start",
            LogEntry::Updates(commands) => {
                info.commands = commands.iter().map(ToString::to_string).collect();
                "updates"
            }
            LogEntry::UpdatesFromBuffer(bytes) => {
                info.buffer_size = Some(bytes.len());
                "updates_from_buffer"
            }
            LogEntry::ClearRelation(table) => {
                info.table = Some(table.as_u32());
                "clear_relation"
            }
            LogEntry::Commit => "commit",
            LogEntry::CommitDumpChanges => "commit_dump_changes",
            LogEntry::Rollback => "rollback",
        };
        info
    }
}

/// Runs the dump-recording command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let entries = collect(path, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            print_text_output(&entries);
        }
    }

    Ok(())
}

fn collect(path: &Path, limit: Option<usize>) -> Result<Vec<EntryInfo>, Box<dyn std::error::Error>> {
    let entries = read_log(path)?;
    debug!(file = %path.display(), entries = entries.len(), "recording loaded");

    Ok(entries
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(index, entry)| EntryInfo::from_entry(index, entry))
        .collect())
}

fn print_text_output(entries: &[EntryInfo]) {
    println!("Recording ({} entries)", entries.len());
    println!("================");
    println!();

    for entry in entries {
        print!("[{:06}] {}", entry.index, entry.operation);
        if let Some(table) = entry.table {
            print!(" rel:{table}");
        }
        if let Some(size) = entry.buffer_size {
            print!(" {size} bytes");
        }
        println!();
        for command in &entry.commands {
            println!("         {command}");
        }
    }
}
