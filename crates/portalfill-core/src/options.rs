use portalfill_browser::LaunchOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TEXT_CAP: usize = 20_000;
pub const DEFAULT_EPISODE_LIMIT: usize = 10;

/// Fixed delays and wait bounds, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Upper bound on waiting for the portal document to load.
    pub ready_timeout_ms: u64,
    /// Pause after submitting the patient search.
    pub search_settle_ms: u64,
    /// How long a trigger click may take to change the URL.
    pub navigation_timeout_ms: u64,
    /// Fixed wait raced against the URL change.
    pub open_settle_ms: u64,
    /// Pause after restoring the list, before the next trigger.
    pub between_episodes_ms: u64,
    pub keystroke_delay_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 15_000,
            search_settle_ms: 1_200,
            navigation_timeout_ms: 2_500,
            open_settle_ms: 800,
            between_episodes_ms: 300,
            keystroke_delay_ms: 1,
        }
    }
}

impl Timings {
    /// Zero delays; useful against in-memory pages.
    pub fn immediate() -> Self {
        Self {
            ready_timeout_ms: 1_000,
            search_settle_ms: 0,
            navigation_timeout_ms: 0,
            open_settle_ms: 0,
            between_episodes_ms: 0,
            keystroke_delay_ms: 0,
        }
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn search_settle(&self) -> Duration {
        Duration::from_millis(self.search_settle_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }

    pub fn between_episodes(&self) -> Duration {
        Duration::from_millis(self.between_episodes_ms)
    }

    pub fn keystroke_delay(&self) -> Duration {
        Duration::from_millis(self.keystroke_delay_ms)
    }
}

/// Everything a session needs besides the mapping config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationOptions {
    pub timings: Timings,
    /// Maximum characters kept from one episode's text.
    pub text_cap: usize,
    pub default_limit: usize,
    pub launch: LaunchOptions,
}

impl Default for AutomationOptions {
    fn default() -> Self {
        Self {
            timings: Timings::default(),
            text_cap: DEFAULT_TEXT_CAP,
            default_limit: DEFAULT_EPISODE_LIMIT,
            launch: LaunchOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_timings_keep_defaults() {
        let timings: Timings = serde_json::from_str(r#"{"search_settle_ms": 50}"#).unwrap();
        assert_eq!(timings.search_settle(), Duration::from_millis(50));
        assert_eq!(timings.navigation_timeout(), Duration::from_millis(2_500));
        assert_eq!(timings.open_settle(), Duration::from_millis(800));
        assert_eq!(timings.between_episodes(), Duration::from_millis(300));
    }

    #[test]
    fn defaults() {
        let options = AutomationOptions::default();
        assert_eq!(options.text_cap, 20_000);
        assert_eq!(options.default_limit, 10);
        assert_eq!(options.timings.keystroke_delay_ms, 1);
    }
}
