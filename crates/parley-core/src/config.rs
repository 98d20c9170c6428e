use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root of `config.toml`. Only the `[history]` table is read by the engine;
/// other tables belong to the host application and are ignored.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct RootConfig {
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Calendar days walked by `before`/`after` queries, not counting the reference day.
    pub before_lookback_days: u32,
    /// Calendar days walked by `latest` queries, not counting the newest partition.
    pub latest_lookback_days: u32,
    /// Coalescing window of the update batcher.
    pub batch_interval_ms: u64,
    /// Extension of record files inside a partition.
    pub file_extension: String,
    /// Upper bound on cached messageId resolutions.
    pub resolve_cache_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            before_lookback_days: 7,
            latest_lookback_days: 30,
            batch_interval_ms: 16,
            file_extension: "yaml".to_string(),
            resolve_cache_capacity: 1024,
        }
    }
}

impl HistoryConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_table_keeps_defaults() {
        let root: RootConfig = toml::from_str(
            r#"
            [history]
            latest_lookback_days = 90
            "#,
        )
        .unwrap();

        assert_eq!(root.history.latest_lookback_days, 90);
        assert_eq!(root.history.before_lookback_days, 7);
        assert_eq!(root.history.batch_interval(), Duration::from_millis(16));
    }

    #[test]
    fn test_missing_table_is_default() {
        let root: RootConfig = toml::from_str("[ui]\ntheme = \"dark\"\n").unwrap();
        assert_eq!(root.history, HistoryConfig::default());
    }
}
