#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

/// Deadlines applied to background units. Expiry surfaces as a plain API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub list: Duration,
    pub sync: Duration,
    pub diff: Duration,
    pub metadata: Duration,
    pub history: Duration,
    pub rollback: Duration,
    pub resources: Duration,
    pub version: Duration,
    pub refresh: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            list: Duration::from_secs(30),
            sync: Duration::from_secs(60),
            diff: Duration::from_secs(45),
            metadata: Duration::from_secs(10),
            history: Duration::from_secs(30),
            rollback: Duration::from_secs(60),
            resources: Duration::from_secs(30),
            version: Duration::from_secs(10),
            refresh: Duration::from_secs(30),
            delete: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub timeouts: Timeouts,
    /// Slots between the watch stream and the update loop; a full queue stalls the producer.
    pub watch_queue_capacity: usize,
    pub escape_debounce: Duration,
    pub double_tap_window: Duration,
    pub log_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            watch_queue_capacity: 100,
            escape_debounce: Duration::from_millis(100),
            double_tap_window: Duration::from_millis(500),
            log_file: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `FLEET_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = |key: &str, dflt: Duration| {
            lookup(key).and_then(|s| s.trim().parse::<u64>().ok()).map(Duration::from_secs).unwrap_or(dflt)
        };
        let millis = |key: &str, dflt: Duration| {
            lookup(key).and_then(|s| s.trim().parse::<u64>().ok()).map(Duration::from_millis).unwrap_or(dflt)
        };
        let d = Self::default();
        let t = d.timeouts;
        Self {
            timeouts: Timeouts {
                list: secs("FLEET_LIST_TIMEOUT_SECS", t.list),
                sync: secs("FLEET_SYNC_TIMEOUT_SECS", t.sync),
                diff: secs("FLEET_DIFF_TIMEOUT_SECS", t.diff),
                metadata: secs("FLEET_METADATA_TIMEOUT_SECS", t.metadata),
                history: secs("FLEET_HISTORY_TIMEOUT_SECS", t.history),
                rollback: secs("FLEET_ROLLBACK_TIMEOUT_SECS", t.rollback),
                resources: secs("FLEET_RESOURCES_TIMEOUT_SECS", t.resources),
                version: secs("FLEET_VERSION_TIMEOUT_SECS", t.version),
                refresh: secs("FLEET_REFRESH_TIMEOUT_SECS", t.refresh),
                delete: secs("FLEET_DELETE_TIMEOUT_SECS", t.delete),
            },
            watch_queue_capacity: lookup("FLEET_WATCH_QUEUE_CAP")
                .and_then(|s| s.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(d.watch_queue_capacity),
            escape_debounce: millis("FLEET_ESC_DEBOUNCE_MS", d.escape_debounce),
            double_tap_window: millis("FLEET_DOUBLE_TAP_MS", d.double_tap_window),
            log_file: lookup("FLEET_LOG_FILE").filter(|s| !s.trim().is_empty()).map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let env: HashMap<&str, &str> = [
            ("FLEET_SYNC_TIMEOUT_SECS", "5"),
            ("FLEET_WATCH_QUEUE_CAP", "0"),
            ("FLEET_ESC_DEBOUNCE_MS", "abc"),
            ("FLEET_LOG_FILE", "/tmp/fleet.log"),
        ]
        .into_iter()
        .collect();
        let cfg = EngineConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.timeouts.sync, Duration::from_secs(5));
        assert_eq!(cfg.timeouts.list, Duration::from_secs(30));
        assert_eq!(cfg.watch_queue_capacity, 100);
        assert_eq!(cfg.escape_debounce, Duration::from_millis(100));
        assert_eq!(cfg.log_file, Some(PathBuf::from("/tmp/fleet.log")));
    }
}
