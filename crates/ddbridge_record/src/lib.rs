//! # ddbridge Record
//!
//! Dynamic, recursively typed values exchanged with a differential
//! computation engine.
//!
//! A [`Record`] is one of:
//! - scalars: `Bool`, `I64`, arbitrary precision `Int`, `String`
//! - composites: `Tuple`, `Vector`, `Set`, `Map`, `Struct`
//!
//! Composite constructors consume their children, so a record moved into
//! a composite (or into a command) can no longer be used on its own.
//!
//! ## Usage
//!
//! ```
//! use ddbridge_record::Record;
//!
//! let pair = Record::structure("Pair", vec![Record::i64(1), Record::i64(2)]);
//! assert!(pair.is_struct());
//! assert_eq!(pair.constructor().unwrap(), "Pair");
//! assert_eq!(pair.struct_field(1).unwrap().get_i64().unwrap(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod record;

pub use error::{RecordError, RecordResult};
pub use record::{Record, RecordKind};
