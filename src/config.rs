//! Configuration loader and validator for the bookshelf client.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub catalog: Catalog,
    pub backend: Backend,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Book search collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    pub base_url: String,
    /// Term the CLI searches for when neither a query nor a category is given.
    pub default_term: String,
}

/// Auth/review/like backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Backend {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn catalog_url(&self) -> Result<Url, ConfigError> {
        parse_base_url(&self.catalog.base_url)
            .ok_or(ConfigError::Invalid("catalog.base_url must be an absolute URL"))
    }

    pub fn backend_url(&self) -> Result<Url, ConfigError> {
        parse_base_url(&self.backend.base_url)
            .ok_or(ConfigError::Invalid("backend.base_url must be an absolute URL"))
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_seconds)
    }

    /// Credential database location, honouring `DATABASE_URL` when set.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/bookshelf.db", self.app.data_dir))
    }
}

/// Relative joins drop the last path segment unless the base ends in `/`.
fn parse_base_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).ok()
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.catalog.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("catalog.base_url must be non-empty"));
    }
    cfg.catalog_url()?;
    if cfg.catalog.default_term.trim().is_empty() {
        return Err(ConfigError::Invalid("catalog.default_term must be non-empty"));
    }

    if cfg.backend.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("backend.base_url must be non-empty"));
    }
    cfg.backend_url()?;
    if cfg.backend.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("backend.timeout_seconds must be > 0"));
    }

    Ok(())
}

/// Returns the documented example configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

catalog:
  base_url: "https://www.googleapis.com/books/v1/"
  default_term: "fiction"

backend:
  base_url: "http://localhost:5000/api/"
  timeout_seconds: 15
"#
}
