//! Engine configuration.

use crate::logging::ENGINE_LOG_MODULE;

/// Configuration for starting an engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of worker threads; must be at least 1.
    pub workers: usize,

    /// Whether the engine keeps a copy of every table.
    ///
    /// Required by `dump_table`. Disabling it saves memory.
    pub store_data: bool,

    /// Whether CPU profiling starts enabled.
    pub cpu_profiling: bool,

    /// Logging module id the engine emits its messages under.
    pub log_module: i32,
}

impl Default for Config {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            workers,
            store_data: true,
            cpu_profiling: false,
            log_module: ENGINE_LOG_MODULE,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets whether table contents are retained.
    #[must_use]
    pub const fn store_data(mut self, value: bool) -> Self {
        self.store_data = value;
        self
    }

    /// Sets whether CPU profiling starts enabled.
    #[must_use]
    pub const fn cpu_profiling(mut self, value: bool) -> Self {
        self.cpu_profiling = value;
        self
    }

    /// Sets the logging module id used for engine messages.
    #[must_use]
    pub const fn log_module(mut self, module: i32) -> Self {
        self.log_module = module;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.workers >= 1);
        assert!(config.store_data);
        assert!(!config.cpu_profiling);
        assert_eq!(config.log_module, ENGINE_LOG_MODULE);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .workers(4)
            .store_data(false)
            .cpu_profiling(true)
            .log_module(7);

        assert_eq!(config.workers, 4);
        assert!(!config.store_data);
        assert!(config.cpu_profiling);
        assert_eq!(config.log_module, 7);
    }
}
