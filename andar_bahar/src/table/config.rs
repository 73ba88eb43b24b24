//! Table configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::game::constants::{
    DEFAULT_DRAW_INTERVAL_MS, DEFAULT_LOBBY_SECONDS, DEFAULT_SETTLE_SECONDS,
};

/// Cadence configuration for the repeating round cycle.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TableConfig {
    /// Table name, for logs.
    pub name: String,

    /// Seconds the betting lobby stays open.
    pub lobby_seconds: u32,

    /// Milliseconds between card draws.
    pub draw_interval_ms: u64,

    /// Seconds the results phase lingers before the next lobby.
    pub settle_seconds: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "Main Table".to_string(),
            lobby_seconds: DEFAULT_LOBBY_SECONDS,
            draw_interval_ms: DEFAULT_DRAW_INTERVAL_MS,
            settle_seconds: DEFAULT_SETTLE_SECONDS,
        }
    }
}

impl TableConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.lobby_seconds == 0 {
            return Err("lobby_seconds must be at least 1".to_string());
        }
        if self.draw_interval_ms < 50 {
            return Err("draw_interval_ms must be at least 50".to_string());
        }
        if self.settle_seconds == 0 {
            return Err("settle_seconds must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn draw_interval(&self) -> Duration {
        Duration::from_millis(self.draw_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_seconds)
    }
}
