//! CLI command implementations.

pub mod dump_recording;
pub mod dump_snapshot;
