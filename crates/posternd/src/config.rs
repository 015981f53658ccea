//! JSON configuration for the Postern daemon.

use std::path::{Path, PathBuf};

use anyhow::Context;
use postern_types::Token;
use serde::Deserialize;

/// Top-level configuration, parsed from a JSON file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Backing store type. Only `"sqlite"` is supported.
    pub db_type: String,

    /// Path to the store (a file path, or `":memory:"` for a throwaway
    /// in-process database).
    pub db_path: String,

    /// Address for the HTTP(S) API, e.g. `"0.0.0.0:8443"`.
    pub listen_addr: String,

    /// The master credential: its 32-hex form is the Basic-auth password
    /// for admin routes.
    pub admin_token: Token,

    /// TLS certificate path (PEM). Required unless `insecure` is set.
    #[serde(default)]
    pub tls_cert: Option<PathBuf>,

    /// TLS key path (PEM). Required unless `insecure` is set.
    #[serde(default)]
    pub tls_key: Option<PathBuf>,

    /// Serve plain HTTP. When set, the TLS fields must be absent.
    #[serde(default)]
    pub insecure: bool,

    /// Log level filter (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a JSON string (used in tests).
    #[cfg(test)]
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.db_type == "sqlite",
            "unsupported db_type {:?} (expected \"sqlite\")",
            self.db_type
        );
        if self.insecure {
            anyhow::ensure!(
                self.tls_cert.is_none() && self.tls_key.is_none(),
                "insecure is set; tls_cert and tls_key must be absent"
            );
        } else {
            anyhow::ensure!(
                self.tls_cert.is_some() && self.tls_key.is_some(),
                "tls_cert and tls_key are required unless insecure is set"
            );
        }
        Ok(())
    }
}
