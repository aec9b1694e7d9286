use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HerdError, Result};
use crate::node::Node;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 7117;
const DEFAULT_API_PORT: u16 = 7118;
const DEFAULT_CHECK_SECONDS: u64 = 10;
const DEFAULT_CHECK_URL: &str = "/";

/// Application configuration, loadable from a JSON file.
///
/// Every field has a default so a partial file (or none at all) is fine;
/// command-line flags override whatever the file provided.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default, rename = "query-mode")]
    pub query_mode: QueryMode,
    #[serde(default, rename = "health-check")]
    pub health_check: HealthCheck,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api: ApiConfig::default(),
            query_mode: QueryMode::default(),
            health_check: HealthCheck::default(),
            nodes: Vec::new(),
            auth: None,
        }
    }
}

impl Config {
    /// Reads and parses the config file. A missing file yields the defaults;
    /// a present but malformed file is a hard error.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|err| HerdError::Config(format!("{}: {}", path.display(), err)))
    }

    /// Boot-time validation: every configured node record must be valid.
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            if !node.is_valid() {
                return Err(HerdError::Config(format!(
                    "node '{}' has incorrect values",
                    node.endpoint()
                )));
            }
        }
        Ok(())
    }
}

/// Bind address of the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_api_port(),
        }
    }
}

/// Read-dispatch policy flags.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueryMode {
    #[serde(default, rename = "round-robin")]
    pub round_robin: bool,
    #[serde(default, rename = "by-priority")]
    pub by_priority: bool,
}

/// Health probe parameters: retry interval, probed path and an optional
/// regular expression matched against the probe body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(default = "default_check_seconds")]
    pub seconds: u64,
    #[serde(default = "default_check_url")]
    pub url: String,
    #[serde(default, rename = "regexp")]
    pub pattern: String,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            seconds: default_check_seconds(),
            url: default_check_url(),
            pattern: String::new(),
        }
    }
}

/// Authentication selection. Anything but a known type falls back to the
/// guest authenticator with a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type", default)]
    pub kind: String,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_api_port() -> u16 {
    DEFAULT_API_PORT
}

fn default_check_seconds() -> u64 {
    DEFAULT_CHECK_SECONDS
}

fn default_check_url() -> String {
    DEFAULT_CHECK_URL.to_string()
}
