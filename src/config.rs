//! Configuration for the manager and the position tracker.

use crate::error::Result;
use crate::subscriptions::Priority;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Subscription manager configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Name of the service-context worker thread.
    pub worker_name: String,

    /// Start connecting as soon as the manager is created.
    pub connect_on_start: bool,

    /// Buffered events for a channel consumer before new ones are dropped.
    pub event_buffer: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            worker_name: "location-service".to_string(),
            connect_on_start: true,
            event_buffer: 256,
        }
    }
}

impl ManagerConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Position tracker configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub manager: ManagerConfig,

    /// Accuracy class for regular and one-shot requests.
    pub priority: Priority,

    /// Desired interval of regular updates.
    pub interval: Duration,

    /// Fastest interval of regular updates.
    pub fastest_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            manager: ManagerConfig::default(),
            priority: Priority::HighAccuracy,
            interval: Duration::from_secs(1),
            fastest_interval: Duration::from_millis(500),
        }
    }
}

impl TrackerConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
