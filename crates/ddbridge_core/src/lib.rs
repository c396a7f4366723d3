//! # ddbridge Core
//!
//! Control layer between a host process and an incremental computation
//! engine.
//!
//! This crate provides:
//! - the [`EngineHandle`] control surface: start/stop, transactions and
//!   batched updates
//! - change notification, either concurrently per change (commit mode) or
//!   once per changed record from a single thread (delta mode)
//! - table dumps, command recording and input snapshots
//! - the process-wide engine logging registry ([`logging`])
//! - the [`Engine`] seam and an in-memory reference engine
//!
//! Values crossing the boundary are [`ddbridge_record::Record`]s.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod logging;
pub mod notify;
pub mod recording;
pub mod registry;
pub mod stats;
pub mod transaction;
pub mod types;

pub use buffer::FlatBuffer;
pub use command::{Command, CommandKind};
pub use config::Config;
pub use engine::{Engine, MemoryEngine, MemoryProgram, Program};
pub use error::{CoreError, CoreResult};
pub use handle::EngineHandle;
pub use notify::CommitHandler;
pub use recording::{LogEntry, RelationSnapshot, Snapshot};
pub use stats::StatsSnapshot;
pub use transaction::TxnState;
pub use types::{ChangeEvent, ChangeKind, ClearStatus, DeltaEntry, RelationRole, TableId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
