// File: src/config.rs
// Purpose: Navigator configuration parsing from silcrow.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level configuration file layout
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub navigation: NavigatorConfig,
}

/// Navigator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigatorConfig {
    /// Path prefix all routes live under (default: "/")
    #[serde(default = "default_basename")]
    pub basename: String,

    /// Whether static segments match case-sensitively (default: false)
    #[serde(default)]
    pub case_sensitive: bool,

    /// Redirects followed by one navigation before it fails
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_basename() -> String {
    "/".to_string()
}

fn default_max_redirects() -> usize {
    20
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            basename: default_basename(),
            case_sensitive: false,
            max_redirects: default_max_redirects(),
        }
    }
}

impl NavigatorConfig {
    pub fn with_basename(mut self, basename: impl Into<String>) -> Self {
        self.basename = basename.into();
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // If file doesn't exist or is empty, return default config
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Load configuration from default path (./silcrow.toml)
    pub fn load_default() -> Result<Self> {
        Self::load("silcrow.toml")
    }
}
