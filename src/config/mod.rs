//! Configuration system (layered: defaults < TOML file < environment).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

const ENV_PREFIX: &str = "MODELBRIDGE_";

/// Runtime configuration for the loop, the response manager and the reference backend.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Upper bound on provider rounds for one tool-using turn.
    pub max_tool_rounds: usize,
    /// Capacity of the bounded channel between a stream producer and its consumer.
    pub stream_buffer: usize,
    /// Stop the loop on the first failing tool instead of feeding the failure back.
    pub stop_on_tool_error: bool,
    pub poll_interval_ms: u64,
    pub get_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    pub retention_ms: u64,
    /// Deadline for detached background work.
    pub background_timeout_ms: u64,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("max_tool_rounds", &self.max_tool_rounds)
            .field("stream_buffer", &self.stream_buffer)
            .field("stop_on_tool_error", &self.stop_on_tool_error)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("get_timeout_ms", &self.get_timeout_ms)
            .field("sweep_interval_ms", &self.sweep_interval_ms)
            .field("retention_ms", &self.retention_ms)
            .field("background_timeout_ms", &self.background_timeout_ms)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .finish()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 20,
            stream_buffer: 50,
            stop_on_tool_error: false,
            poll_interval_ms: 100,
            get_timeout_ms: 30_000,
            sweep_interval_ms: 60_000,
            retention_ms: 15 * 60_000,
            background_timeout_ms: 10 * 60_000,
            model: None,
            base_url: None,
            api_key: None,
        }
    }
}

impl BridgeConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env()?;
        config.validate()
    }

    /// Defaults plus environment overrides (`MODELBRIDGE_*`, `.env` honored).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()
    }

    fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("MAX_TOOL_ROUNDS") {
            self.max_tool_rounds = parse_var("MAX_TOOL_ROUNDS", &v)?;
        }
        if let Some(v) = lookup("STREAM_BUFFER") {
            self.stream_buffer = parse_var("STREAM_BUFFER", &v)?;
        }
        if let Some(v) = lookup("STOP_ON_TOOL_ERROR") {
            self.stop_on_tool_error = matches!(v.as_str(), "1" | "true" | "TRUE");
        }
        if let Some(v) = lookup("POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_var("POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("GET_TIMEOUT_MS") {
            self.get_timeout_ms = parse_var("GET_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SWEEP_INTERVAL_MS") {
            self.sweep_interval_ms = parse_var("SWEEP_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("RETENTION_MS") {
            self.retention_ms = parse_var("RETENTION_MS", &v)?;
        }
        if let Some(v) = lookup("BACKGROUND_TIMEOUT_MS") {
            self.background_timeout_ms = parse_var("BACKGROUND_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("MODEL") {
            self.model = Some(v);
        }
        if let Some(v) = lookup("BASE_URL") {
            self.base_url = Some(v);
        }
        if let Some(v) = lookup("API_KEY") {
            self.api_key = Some(v);
        }
        Ok(())
    }

    fn validate(self) -> Result<Self> {
        if self.max_tool_rounds == 0 {
            return Err(BridgeError::Configuration(
                "max_tool_rounds must be at least 1".into(),
            ));
        }
        if self.stream_buffer == 0 {
            return Err(BridgeError::Configuration(
                "stream_buffer must be at least 1".into(),
            ));
        }
        if self.poll_interval_ms == 0 || self.sweep_interval_ms == 0 {
            return Err(BridgeError::Configuration(
                "poll and sweep intervals must be non-zero".into(),
            ));
        }
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    pub fn background_timeout(&self) -> Duration {
        Duration::from_millis(self.background_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        BridgeError::Configuration(format!("{ENV_PREFIX}{key} has invalid value '{value}'"))
    })
}
