use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval for the periodic full autosave (2 minutes).
const DEFAULT_AUTOSAVE_INTERVAL_MS: u64 = 120_000;

/// Default settle delay for the debounced field autosave (1.5 seconds).
const DEFAULT_FIELD_DEBOUNCE_MS: u64 = 1_500;

/// Timing configuration for an editing session's autosave timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Period of the full autosave tick, in milliseconds.
    pub autosave_interval_ms: u64,
    /// Settle delay for debounced single-field saves, in milliseconds.
    pub field_debounce_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            autosave_interval_ms: DEFAULT_AUTOSAVE_INTERVAL_MS,
            field_debounce_ms: DEFAULT_FIELD_DEBOUNCE_MS,
        }
    }
}

impl EditorConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }

    pub fn field_debounce(&self) -> Duration {
        Duration::from_millis(self.field_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intervals() {
        let config = EditorConfig::default();
        assert_eq!(config.autosave_interval(), Duration::from_secs(120));
        assert_eq!(config.field_debounce(), Duration::from_millis(1500));
    }
}
