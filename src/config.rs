//! Backend configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a [`FileBackend`](crate::FileBackend).
///
/// Every field has a serde default, so host applications can embed the struct
/// in their own configuration files and override only what they need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// How often buffered log data is flushed and synced to disk (default: 3s)
    ///
    /// Changeable at runtime via
    /// [`set_flush_interval`](crate::FileBackend::set_flush_interval).
    #[serde(default = "default_flush_interval")]
    pub flush_interval: Duration,

    /// How often writer slots are checked for externally removed files (default: 5s)
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval: Duration,

    /// How often the hourly rotation check runs (default: 1s)
    #[serde(default = "default_rotate_check_interval")]
    pub rotate_check_interval: Duration,

    /// In-memory buffer capacity per level writer, in bytes (default: 256 KiB)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Whether hourly rotation starts enabled (default: false)
    #[serde(default)]
    pub rotate_hourly: bool,

    /// Hours an archive must age before the retention sweep may delete it;
    /// zero or negative keeps archives forever (default: 0)
    #[serde(default)]
    pub keep_hours: i64,
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_rotate_check_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_buffer_size() -> usize {
    256 * 1024
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            flush_interval: default_flush_interval(),
            monitor_interval: default_monitor_interval(),
            rotate_check_interval: default_rotate_check_interval(),
            buffer_size: default_buffer_size(),
            rotate_hourly: false,
            keep_hours: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BackendConfig::default();
        assert_eq!(config.flush_interval, Duration::from_secs(3));
        assert_eq!(config.monitor_interval, Duration::from_secs(5));
        assert_eq!(config.rotate_check_interval, Duration::from_secs(1));
        assert_eq!(config.buffer_size, 256 * 1024);
        assert!(!config.rotate_hourly);
        assert_eq!(config.keep_hours, 0);
    }
}
