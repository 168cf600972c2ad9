// Engine configuration for Verdict
// Loaded from config/engine.json, then overridden by VERDICT_* environment variables

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/engine.json";

/// How map-valued outputs are compared.
///
/// `Sensitive` keeps the legacy behavior where `{"a":1,"b":2}` and
/// `{"b":2,"a":1}` differ because both sides are compared as serialized text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyOrder {
    #[default]
    Sensitive,
    Insensitive,
}

impl FromStr for KeyOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sensitive" => Ok(KeyOrder::Sensitive),
            "insensitive" => Ok(KeyOrder::Insensitive),
            other => bail!("Invalid key order '{}': expected sensitive or insensitive", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline for each timed unit of work (definition run or one test case)
    pub timeout_ms: u64,
    /// V8 heap ceiling per execution context
    pub max_heap_mb: usize,
    /// Contexts allowed to exist at the same time
    pub max_concurrent: usize,
    pub max_source_bytes: usize,
    pub max_input_bytes: usize,
    pub key_order: KeyOrder,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_heap_mb: 64,
            max_concurrent: 8,
            max_source_bytes: 1024 * 1024,     // 1MB
            max_input_bytes: 10 * 1024 * 1024, // 10MB
            key_order: KeyOrder::Sensitive,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Engine config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, defaults otherwise, then apply
    /// environment overrides.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            Self::load(config_path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load with default path (config/engine.json)
    pub fn load_default() -> Result<Self> {
        Self::load_or_default(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Apply `VERDICT_*` overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("VERDICT_TIMEOUT_MS") {
            self.timeout_ms = parse_override("VERDICT_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("VERDICT_MAX_HEAP_MB") {
            self.max_heap_mb = parse_override("VERDICT_MAX_HEAP_MB", &value)?;
        }
        if let Some(value) = lookup("VERDICT_MAX_CONCURRENT") {
            self.max_concurrent = parse_override("VERDICT_MAX_CONCURRENT", &value)?;
        }
        if let Some(value) = lookup("VERDICT_MAX_SOURCE_BYTES") {
            self.max_source_bytes = parse_override("VERDICT_MAX_SOURCE_BYTES", &value)?;
        }
        if let Some(value) = lookup("VERDICT_MAX_INPUT_BYTES") {
            self.max_input_bytes = parse_override("VERDICT_MAX_INPUT_BYTES", &value)?;
        }
        if let Some(value) = lookup("VERDICT_KEY_ORDER") {
            self.key_order = parse_override("VERDICT_KEY_ORDER", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        if self.max_heap_mb == 0 {
            bail!("max_heap_mb must be greater than zero");
        }
        if self.max_concurrent == 0 {
            bail!("max_concurrent must be greater than zero");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_heap_bytes(&self) -> usize {
        self.max_heap_mb * 1024 * 1024
    }
}

fn parse_override<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value '{}' for {}: {}", value, key, e))
}
