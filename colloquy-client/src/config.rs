use std::time::Duration;

use anyhow::Context;

const DEFAULT_ESTIMATED_ROW_HEIGHT: f64 = 120.0;
const DEFAULT_OVERSCAN: usize = 3;
// Past this, overscan mounts whole pages of rows nobody sees
const MAX_OVERSCAN: usize = 100;
// How long a deep-linked comment stays highlighted
const DEFAULT_FLASH_DURATION_MS: u64 = 1500;
// How long to wait after opening a reply list before looking the reply up
const DEFAULT_SETTLE_DELAY_MS: u64 = 300;
// Spacing between two attempts at fetching a page that is already being fetched
const DEFAULT_FETCH_RETRY_DELAY_MS: u64 = 50;

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Height assumed for rows that have not been laid out yet, in pixels
    pub estimated_row_height: f64,

    /// Number of extra rows mounted above and below the visible ones
    pub overscan: usize,

    pub flash_duration_ms: u64,
    pub settle_delay_ms: u64,
    pub fetch_retry_delay_ms: u64,
}

impl Default for ThreadConfig {
    fn default() -> ThreadConfig {
        ThreadConfig {
            estimated_row_height: DEFAULT_ESTIMATED_ROW_HEIGHT,
            overscan: DEFAULT_OVERSCAN,
            flash_duration_ms: DEFAULT_FLASH_DURATION_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            fetch_retry_delay_ms: DEFAULT_FETCH_RETRY_DELAY_MS,
        }
    }
}

impl ThreadConfig {
    pub fn from_json(json: &str) -> anyhow::Result<ThreadConfig> {
        let config: ThreadConfig =
            serde_json::from_str(json).context("parsing thread configuration")?;
        anyhow::ensure!(
            config.estimated_row_height > 0.0,
            "estimated_row_height must be positive, got {}",
            config.estimated_row_height,
        );
        anyhow::ensure!(
            config.overscan <= MAX_OVERSCAN,
            "overscan must be at most {MAX_OVERSCAN} rows, got {}",
            config.overscan,
        );
        Ok(config)
    }

    pub fn flash_duration(&self) -> Duration {
        Duration::from_millis(self.flash_duration_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }
}
