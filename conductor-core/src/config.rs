// ABOUTME: Configuration parsing from TOML file with environment variable overrides.
// ABOUTME: Covers storage paths, logging, per-backend defaults, tool labels and MCP tools, and metrics.

use crate::paths;
use crate::tools::McpToolInfo;
use anyhow::{Context, Result};
use conductor_agent::BackendKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Defaults merged under each conversation's backend config, keyed by backend type
    #[serde(default)]
    pub backends: HashMap<String, Value>,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// SQLite database, relative to data_dir unless absolute
    #[serde(default = "default_database")]
    pub database: String,
    /// Flat JSON history file, relative to data_dir unless absolute
    #[serde(default = "default_history_file")]
    pub history_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: default_database(),
            history_file: default_history_file(),
        }
    }
}

fn default_data_dir() -> String {
    paths::data_dir().to_string_lossy().to_string()
}

fn default_database() -> String {
    "conversations.db".to_string()
}

fn default_history_file() -> String {
    "history.json".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Unknown log format '{}' (expected 'pretty' or 'json')", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Also write a daily rolling log under data_dir/logs
    #[serde(default)]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Label catalog overlaid on the embedded English labels
    #[serde(default)]
    pub catalog: Option<String>,
    /// MCP tools registered at startup
    #[serde(default)]
    pub mcp: Vec<McpToolInfo>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            catalog: None,
            mcp: Vec::new(),
        }
    }
}

fn default_locale() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Address for the Prometheus exporter, e.g. "127.0.0.1:9090"
    #[serde(default)]
    pub prometheus_listen: Option<String>,
}

impl Config {
    /// Find the config file, checking in order:
    /// 1. CONDUCTOR_CONFIG_PATH env var (if set)
    /// 2. ./conductor.toml
    /// 3. ~/.config/conductor/config.toml
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("CONDUCTOR_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!(path = %env_path, "CONDUCTOR_CONFIG_PATH does not exist, ignoring");
        }

        let local_config = PathBuf::from("conductor.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration with environment variable overrides
    pub fn load() -> Result<Self> {
        let config = match Self::find_config_file() {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration from file");
                Self::from_file(&path)?
            }
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Self::default()
            }
        };
        config.finalize()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration")
    }

    /// Apply env overrides, expand paths, and validate
    pub fn finalize(mut self) -> Result<Self> {
        self.apply_env_overrides()?;

        self.storage.data_dir = paths::expand_tilde(&self.storage.data_dir);
        self.storage.database = paths::expand_tilde(&self.storage.database);
        self.storage.history_file = paths::expand_tilde(&self.storage.history_file);
        self.tools.catalog = self.tools.catalog.as_deref().map(paths::expand_tilde);

        self.validate()?;
        Ok(self)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("CONDUCTOR_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("CONDUCTOR_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("CONDUCTOR_LOG_FORMAT") {
            self.logging.format = val
                .parse()
                .with_context(|| format!("CONDUCTOR_LOG_FORMAT is invalid: {}", val))?;
        }
        if let Ok(val) = std::env::var("CONDUCTOR_LOCALE") {
            self.tools.locale = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.storage.data_dir.trim().is_empty() {
            anyhow::bail!("storage.data_dir must not be empty");
        }
        if self.logging.level.trim().is_empty() {
            anyhow::bail!("logging.level must not be empty");
        }
        for tool in &self.tools.mcp {
            if tool.server_name.trim().is_empty() || tool.name.trim().is_empty() {
                anyhow::bail!("tools.mcp entries need both serverName and name");
            }
            if tool.server_name.contains('/') {
                anyhow::bail!("MCP server name must not contain '/': {}", tool.server_name);
            }
        }
        self.backend_defaults()?;
        if let Some(listen) = &self.metrics.prometheus_listen {
            listen
                .parse::<std::net::SocketAddr>()
                .with_context(|| format!("metrics.prometheus_listen is invalid: {}", listen))?;
        }
        Ok(())
    }

    /// The `[backends.<kind>]` tables keyed by backend kind
    pub fn backend_defaults(&self) -> Result<HashMap<BackendKind, Value>> {
        self.backends
            .iter()
            .map(|(name, value)| {
                let kind = name
                    .parse::<BackendKind>()
                    .with_context(|| format!("Invalid [backends.{}] section", name))?;
                Ok((kind, value.clone()))
            })
            .collect()
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }

    fn resolve_storage_path(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            path
        } else {
            self.data_dir().join(path)
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve_storage_path(&self.storage.database)
    }

    pub fn history_path(&self) -> PathBuf {
        self.resolve_storage_path(&self.storage.history_file)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}
