//! Engine logging callbacks for C hosts.

use ddbridge_core::logging::{self, LogSink};
use std::ffi::{c_char, CString};
use std::sync::Arc;

/// C logging callback: receives the opaque `arg` given at registration,
/// the level and a null-terminated message valid for the call only.
pub type DdLogCallback = unsafe extern "C" fn(arg: usize, level: i32, message: *const c_char);

/// Installs, replaces or (with a null callback) removes the logging sink
/// for `module`. Messages with a level above `max_level` are dropped.
///
/// # Safety
///
/// `callback` must stay callable from any thread until it is replaced or
/// removed, and `arg` must remain meaningful to it for as long. This call
/// returns only after running invocations of the previous callback have
/// finished, so `arg` may be freed as soon as it returns. A callback must
/// not call this function.
#[no_mangle]
pub unsafe extern "C" fn ddbridge_log_set_callback(
    module: i32,
    callback: Option<DdLogCallback>,
    arg: usize,
    max_level: i32,
) {
    let sink = callback.map(|cb| -> LogSink {
        Arc::new(move |level: i32, message: &str| {
            if let Ok(message) = CString::new(message) {
                // Safety: the host promised `cb` stays valid while installed
                unsafe { cb(arg, level, message.as_ptr()) };
            }
        })
    });
    logging::log_set_callback(module, sink, max_level);
}
