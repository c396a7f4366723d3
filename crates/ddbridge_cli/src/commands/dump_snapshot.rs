//! Dump snapshot command implementation.

use ddbridge_core::recording::read_snapshots;
use serde::Serialize;
use std::path::Path;

/// Relation contents for output.
#[derive(Debug, Serialize)]
pub struct RelationInfo {
    /// Relation id.
    pub table: u32,
    /// Relation name.
    pub name: String,
    /// Rendered records.
    pub records: Vec<String>,
}

/// One snapshot for output.
#[derive(Debug, Serialize)]
pub struct SnapshotInfo {
    /// Position in the file, oldest first.
    pub index: usize,
    /// Input relations.
    pub relations: Vec<RelationInfo>,
}

/// Runs the dump-snapshot command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let snapshots = collect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        }
        _ => {
            print_text_output(&snapshots);
        }
    }

    Ok(())
}

fn collect(path: &Path) -> Result<Vec<SnapshotInfo>, Box<dyn std::error::Error>> {
    Ok(read_snapshots(path)?
        .into_iter()
        .enumerate()
        .map(|(index, snapshot)| SnapshotInfo {
            index,
            relations: snapshot
                .relations
                .into_iter()
                .map(|r| RelationInfo {
                    table: r.table.as_u32(),
                    name: r.name,
                    records: r.records.iter().map(ToString::to_string).collect(),
                })
                .collect(),
        })
        .collect())
}

fn print_text_output(snapshots: &[SnapshotInfo]) {
    for snapshot in snapshots {
        println!("Snapshot #{}", snapshot.index);
        println!("================");
        for relation in &snapshot.relations {
            println!(
                "{} (rel:{}): {} records",
                relation.name,
                relation.table,
                relation.records.len()
            );
            for record in &relation.records {
                println!("    {record}");
            }
        }
        println!();
    }
}
