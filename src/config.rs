//! Configuration management
//!
//! Stores the progress channel endpoint and namespace in
//! `~/.model-installer/config.toml`. Command-line flags and the
//! `MODEL_INSTALLER_ENDPOINT` environment variable take precedence. The
//! script generator service has its own endpoint.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the configured endpoint
pub const ENDPOINT_ENV: &str = "MODEL_INSTALLER_ENDPOINT";

/// Environment variable overriding the configured generator endpoint
pub const GENERATOR_ENV: &str = "MODEL_INSTALLER_GENERATOR";

const DEFAULT_ENDPOINT: &str = "http://localhost:5000";
const DEFAULT_GENERATOR_ENDPOINT: &str = "http://127.0.0.1:5002";
const DEFAULT_NAMESPACE: &str = "/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP(S) address of the remote installer peer
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Socket.IO namespace to join
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// HTTP(S) address of the script generator service
    #[serde(default = "default_generator_endpoint")]
    pub generator_endpoint: String,
    /// Version of config schema
    #[serde(default = "current_version")]
    pub version: u32,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_generator_endpoint() -> String {
    DEFAULT_GENERATOR_ENDPOINT.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn current_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            namespace: default_namespace(),
            generator_endpoint: default_generator_endpoint(),
            version: current_version(),
        }
    }
}

impl Config {
    /// Get the config file path (~/.model-installer/config.toml)
    pub fn path() -> Result<PathBuf> {
        Ok(app_dir()?.join("config.toml"))
    }

    /// Load config from disk, or defaults if no file exists yet
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.namespace = normalize_namespace(&config.namespace);

        Ok(config)
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Apply overrides: flag, then environment, then the stored value
    pub fn with_overrides(
        mut self,
        endpoint: Option<String>,
        namespace: Option<String>,
        env_endpoint: Option<String>,
    ) -> Self {
        if let Some(endpoint) = endpoint.or(env_endpoint).filter(|e| !e.trim().is_empty()) {
            self.endpoint = endpoint.trim().to_string();
        }
        if let Some(namespace) = namespace {
            self.namespace = normalize_namespace(&namespace);
        }
        self
    }

    /// Generator endpoint override: flag, then environment, then stored value
    pub fn with_generator_override(
        mut self,
        endpoint: Option<String>,
        env_endpoint: Option<String>,
    ) -> Self {
        if let Some(endpoint) = endpoint.or(env_endpoint).filter(|e| !e.trim().is_empty()) {
            self.generator_endpoint = endpoint.trim().to_string();
        }
        self
    }
}

/// Namespaces always start with '/'
fn normalize_namespace(namespace: &str) -> String {
    let trimmed = namespace.trim();
    if trimmed.is_empty() {
        DEFAULT_NAMESPACE.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Get the base directory path (~/.model-installer)
pub fn app_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".model-installer"))
}
