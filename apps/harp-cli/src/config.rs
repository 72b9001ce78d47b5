use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::Backend;

/// Defaults for device access, overridable per command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend: Backend,
    pub device: String,
    pub baud: u32,
    pub recv_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Mock,
            device: "mock0".to_string(),
            baud: harp_transport::HARP_BAUD_RATE,
            recv_timeout_ms: 500,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            let contents =
                fs::read_to_string(path).with_context(|| format!("reading config {path}"))?;
            serde_json::from_str(&contents).with_context(|| format!("parsing config {path}"))
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing config {path}"))?;
        Ok(())
    }
}
