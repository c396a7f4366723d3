//! Engine logging callbacks.
//!
//! Engines emit log messages tagged with a module id and a level. The
//! host installs at most one sink per module with [`log_set_callback`];
//! messages above the module's maximum level are dropped before the sink
//! is called.
//!
//! All modules share one process-wide registry behind a single lock.
//! Replacing a sink swaps the module's bookkeeping entry and frees the
//! previous one exactly once. Sinks run under the shared side of the lock,
//! so [`log_set_callback`] returns only after every call into the sink it
//! replaced has finished. A sink may log, but must not install or remove
//! sinks itself.
//!
//! ```
//! use ddbridge_core::logging::{self, LogSink, LOG_INFO};
//! use std::sync::Arc;
//!
//! let sink: LogSink = Arc::new(|level: i32, msg: &str| println!("[{level}] {msg}"));
//! logging::log_set_callback(42, Some(sink), LOG_INFO);
//! logging::log(42, LOG_INFO, "hello");
//! logging::log_set_callback(42, None, LOG_INFO);
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Critical messages.
pub const LOG_CRITICAL: i32 = 0;
/// Errors.
pub const LOG_ERROR: i32 = 1;
/// Warnings.
pub const LOG_WARNING: i32 = 2;
/// Informational messages.
pub const LOG_INFO: i32 = 3;
/// Debug messages.
pub const LOG_DEBUG: i32 = 4;

/// Default module id for engine messages; see `Config::log_module`.
pub const ENGINE_LOG_MODULE: i32 = 0;

/// A logging sink: receives the level and the message.
pub type LogSink = Arc<dyn Fn(i32, &str) + Send + Sync>;

/// Bookkeeping entry owned by the registry for one module.
struct CallbackInfo {
    sink: LogSink,
    max_level: i32,
}

impl fmt::Debug for CallbackInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackInfo")
            .field("max_level", &self.max_level)
            .finish_non_exhaustive()
    }
}

static CALLBACKS: LazyLock<RwLock<HashMap<i32, Arc<CallbackInfo>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Installs, replaces or removes the sink for `module`.
///
/// Passing `None` disables logging for the module. The previous entry, if
/// any, is released after the new one is in place; disabling a module that
/// has no sink does nothing. Blocks while any sink is running.
pub fn log_set_callback(module: i32, sink: Option<LogSink>, max_level: i32) {
    let previous = {
        let mut callbacks = CALLBACKS.write();
        let previous = callbacks.remove(&module);
        if let Some(sink) = sink {
            callbacks.insert(module, Arc::new(CallbackInfo { sink, max_level }));
        }
        previous
    };
    // Dropped outside the lock so a sink's destructor may log.
    drop(previous);
}

/// Emits a message on behalf of the engine.
pub fn log(module: i32, level: i32, message: &str) {
    // Recursive read so a sink that logs cannot deadlock behind a waiting writer.
    let callbacks = CALLBACKS.read_recursive();
    if let Some(info) = callbacks.get(&module) {
        if level <= info.max_level {
            (info.sink)(level, message);
        }
    }
}

/// Returns true if `module` currently has a sink.
pub fn is_enabled(module: i32) -> bool {
    CALLBACKS.read().contains_key(&module)
}

/// Builds a sink that forwards engine messages to `tracing`.
pub fn tracing_sink(module: i32) -> LogSink {
    Arc::new(move |level: i32, message: &str| match level {
        l if l <= LOG_ERROR => tracing::error!(target: "ddbridge::engine", module, "{message}"),
        LOG_WARNING => tracing::warn!(target: "ddbridge::engine", module, "{message}"),
        LOG_INFO => tracing::info!(target: "ddbridge::engine", module, "{message}"),
        _ => tracing::debug!(target: "ddbridge::engine", module, level, "{message}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn counting_sink(counter: Arc<AtomicUsize>) -> LogSink {
        Arc::new(move |_level: i32, _msg: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn messages_above_max_level_are_dropped() {
        let module = 1001;
        let hits = Arc::new(AtomicUsize::new(0));
        log_set_callback(module, Some(counting_sink(Arc::clone(&hits))), LOG_WARNING);

        log(module, LOG_ERROR, "kept");
        log(module, LOG_WARNING, "kept");
        log(module, LOG_DEBUG, "dropped");
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        log_set_callback(module, None, LOG_WARNING);
    }

    #[test]
    fn disabling_twice_releases_once() {
        let module = 1002;
        let hits = Arc::new(AtomicUsize::new(0));
        log_set_callback(module, Some(counting_sink(Arc::clone(&hits))), LOG_DEBUG);
        assert_eq!(Arc::strong_count(&hits), 2);

        log_set_callback(module, None, LOG_DEBUG);
        assert_eq!(Arc::strong_count(&hits), 1);
        log_set_callback(module, None, LOG_DEBUG);
        assert_eq!(Arc::strong_count(&hits), 1);

        log(module, LOG_CRITICAL, "nobody listens");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!is_enabled(module));
    }

    #[test]
    fn replacing_releases_previous_sink() {
        let module = 1003;
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        log_set_callback(module, Some(counting_sink(Arc::clone(&first))), LOG_DEBUG);
        log_set_callback(module, Some(counting_sink(Arc::clone(&second))), LOG_DEBUG);
        assert_eq!(Arc::strong_count(&first), 1);

        log(module, LOG_INFO, "to second");
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        log_set_callback(module, None, LOG_DEBUG);
    }

    #[test]
    fn concurrent_replacement_never_leaks() {
        let module = 1004;
        let token = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|s| {
            for _ in 0..8 {
                let token = Arc::clone(&token);
                s.spawn(move || {
                    for i in 0..100 {
                        let sink = (i % 2 == 0).then(|| counting_sink(Arc::clone(&token)));
                        log_set_callback(module, sink, LOG_DEBUG);
                        log(module, LOG_INFO, "tick");
                    }
                });
            }
        });

        log_set_callback(module, None, LOG_DEBUG);
        assert_eq!(Arc::strong_count(&token), 1);
    }

    #[test]
    fn removal_waits_for_running_sink() {
        let module = 1007;
        let finished = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = mpsc::channel();
        let entered_tx = parking_lot::Mutex::new(entered_tx);
        let done = Arc::clone(&finished);
        let slow: LogSink = Arc::new(move |_level: i32, _msg: &str| {
            let _ = entered_tx.lock().send(());
            std::thread::sleep(Duration::from_millis(100));
            done.store(true, Ordering::SeqCst);
        });
        log_set_callback(module, Some(slow), LOG_DEBUG);

        std::thread::scope(|s| {
            s.spawn(|| log(module, LOG_INFO, "slow"));
            entered_rx.recv().unwrap();
            log_set_callback(module, None, LOG_DEBUG);
            assert!(finished.load(Ordering::SeqCst));
        });
        assert!(!is_enabled(module));
    }

    #[test]
    fn sink_may_log_reentrantly() {
        let module = 1005;
        let inner = 1006;
        let hits = Arc::new(AtomicUsize::new(0));
        log_set_callback(inner, Some(counting_sink(Arc::clone(&hits))), LOG_DEBUG);
        let forward: LogSink = Arc::new(move |level: i32, msg: &str| log(inner, level, msg));
        log_set_callback(module, Some(forward), LOG_DEBUG);

        log(module, LOG_INFO, "forwarded");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        log_set_callback(module, None, LOG_DEBUG);
        log_set_callback(inner, None, LOG_DEBUG);
    }
}
