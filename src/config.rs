//! Configuration loaded from an optional TOML file, then the environment.
//!
//! Lookup order for the file: the `--config` path, else `agent-ingest.toml`
//! in the working directory. Environment variables override file values.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::MAX_CHAT_LOG_BATCH_SIZE;
use crate::models::NamePolicy;

const DEFAULT_CONFIG_FILE: &str = "agent-ingest.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub logging: LoggingConfig,
    pub ingest: IngestConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub name_policy: NamePolicy,
    /// Collect unreadable cells and star-count mismatches instead of only zero-filling them.
    pub strict: bool,
    pub chat_log_batch_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Agents left out of summaries; case-insensitive substring match.
    pub hidden_agents: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            name_policy: NamePolicy::Exact,
            strict: false,
            chat_log_batch_size: 50,
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load_from_file(&fallback)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        info!(config_file = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Applies overrides from `lookup`, which is `std::env::var` outside tests.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(val) = lookup("DATABASE_URL") {
            self.database_url = Some(val);
        }
        if let Some(val) = lookup("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Some(val) = lookup("AGENT_INGEST_NAME_POLICY") {
            self.ingest.name_policy = match val.trim().to_lowercase().as_str() {
                "exact" => NamePolicy::Exact,
                "normalized" => NamePolicy::Normalized,
                other => bail!(
                    "invalid AGENT_INGEST_NAME_POLICY '{other}', expected exact or normalized"
                ),
            };
        }
        if let Some(val) = lookup("AGENT_INGEST_STRICT") {
            self.ingest.strict = val.trim().parse().context("invalid AGENT_INGEST_STRICT")?;
        }
        if let Some(val) = lookup("AGENT_INGEST_CHAT_LOG_BATCH_SIZE") {
            self.ingest.chat_log_batch_size = val
                .trim()
                .parse()
                .context("invalid AGENT_INGEST_CHAT_LOG_BATCH_SIZE")?;
        }
        if let Some(val) = lookup("AGENT_INGEST_HIDDEN_AGENTS") {
            self.display.hidden_agents = val
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CHAT_LOG_BATCH_SIZE).contains(&self.ingest.chat_log_batch_size) {
            bail!(
                "chat_log_batch_size must be between 1 and {MAX_CHAT_LOG_BATCH_SIZE}, got {}",
                self.ingest.chat_log_batch_size
            );
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            bail!(
                "log format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            );
        }
        Ok(())
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }
}
