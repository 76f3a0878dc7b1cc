//! Engine configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Engine configuration, loaded from .kbs/config.yaml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scan/fire cycles before a run is aborted (0 = unlimited)
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u64,

    /// Deadline for queries that do not declare their own
    pub query_timeout_ms: Option<u64>,

    /// Capacity of the channel client's request queue
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How often a blocked query re-checks cancellation and its deadline
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Run event log
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// JSONL file (relative to the project root)
    #[serde(default = "default_events_path")]
    pub path: PathBuf,
}

fn default_max_cycles() -> u64 {
    10_000
}
fn default_channel_capacity() -> usize {
    1
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_events_path() -> PathBuf {
    PathBuf::from(".kbs/events.jsonl")
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_events_path(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            query_timeout_ms: None,
            channel_capacity: default_channel_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
            events: EventsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok(config)
    }

    /// Load from project root (looks for .kbs/config.yaml)
    pub fn load_from_project(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(".kbs/config.yaml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve paths relative to project root
    pub fn resolve_paths(&mut self, project_root: &Path) {
        self.events.path = project_root.join(&self.events.path);
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
