//! # ddbridge FFI
//!
//! Stable C ABI over ddbridge records, commands and engines.
//!
//! Conventions:
//! - constructors return owned handles; composite and command
//!   constructors take ownership of the handles passed to them
//! - accessors return handles borrowed from their parent, never freed
//! - fallible functions return [`DdResult`] and set a thread-local message
//!   readable with `ddbridge_get_last_error`
//! - strings and buffers returned to C are released with
//!   `ddbridge_free_string` / `ddbridge_free_buffer`; delta regions go
//!   back to their engine through `ddbridge_flatbuf_free`
//! - engines are started from a program with `ddbridge_start` and freed by
//!   `ddbridge_stop`
//!
//! Using a handle after it was freed or consumed is undefined behaviour.

#![warn(missing_docs)]

mod buffer;
mod command;
mod engine;
mod error;
mod logging;
mod record;
mod types;

pub use buffer::*;
pub use command::*;
pub use engine::*;
pub use error::*;
pub use logging::*;
pub use record::*;
pub use types::{DdCommand, DdEngine, DdProgram, DdRecord};

/// Returns the library version as a static null-terminated string.
#[no_mangle]
pub extern "C" fn ddbridge_version() -> *const std::ffi::c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr().cast()
}
