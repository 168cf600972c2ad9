// Server settings for the Verdict API, read from the environment

use std::path::PathBuf;
use verdict_common::config::DEFAULT_CONFIG_PATH;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Engine config file; a missing file means engine defaults
    pub config_path: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            bind_addr: lookup("VERDICT_BIND_ADDR")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            config_path: lookup("VERDICT_CONFIG")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        }
    }
}
