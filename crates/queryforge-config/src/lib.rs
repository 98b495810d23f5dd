//! Configuration loading for QueryForge.
//!
//! Values come from, in increasing priority:
//!   1. built-in defaults
//!   2. an optional TOML file (`QUERYFORGE_CONFIG`, default `queryforge.toml`)
//!   3. environment variables (a `.env` file is loaded first if present)
//!
//! The resulting [`Config`] is built once at startup and handed to the server.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("Invalid config file {path}: {source}")]
    Toml { path: String, source: toml::de::Error },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub warehouse: WarehouseConfig,
    pub llm: LlmConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub env: String,
    pub debug: bool,
    pub host: String,
    pub port: u16,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            debug: false,
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Workspace hostname without scheme, e.g. `dbc-123.cloud.databricks.com`.
    pub host: String,
    pub token: Option<SecretString>,
    /// `/sql/1.0/warehouses/<id>`
    pub http_path: String,
    pub catalog: String,
    pub schema: String,
    /// Per-table budget for DESCRIBE + sample rows when building prompt context.
    pub context_timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            token: None,
            http_path: String::new(),
            catalog: "main".to_string(),
            schema: "text_to_sql".to_string(),
            context_timeout_secs: 10,
        }
    }
}

impl WarehouseConfig {
    /// All three credentials present.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && self.token_len() > 0 && !self.http_path.is_empty()
    }

    pub fn token_len(&self) -> usize {
        self.token.as_ref().map(|t| t.expose_secret().len()).unwrap_or(0)
    }

    /// Last segment of the HTTP path.
    pub fn warehouse_id(&self) -> Option<&str> {
        self.http_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
    }

    pub fn base_url(&self) -> String {
        format!("https://{}", self.host)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL. Defaults to `<warehouse host>/serving-endpoints`.
    pub base_url: Option<String>,
    /// Defaults to the warehouse token.
    pub api_key: Option<SecretString>,
    pub default_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            default_model: "databricks-llama-4-maverick".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Fully qualified table name. Defaults to `<catalog>.<schema>.audit_logs`.
    pub table: Option<String>,
    pub queue_capacity: usize,
    /// Run `CREATE TABLE IF NOT EXISTS` at startup.
    pub auto_create: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { table: None, queue_capacity: 1024, auto_create: false }
    }
}

impl Config {
    /// Load `.env`, the optional TOML file, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        let path = std::env::var("QUERYFORGE_CONFIG")
            .unwrap_or_else(|_| "queryforge.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_string(), source })?;
        Self::from_toml_str(&content)
            .map_err(|source| ConfigError::Toml { path: path.to_string(), source })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Config = toml::from_str(content)?;
        config.warehouse.host = normalize_host(&config.warehouse.host);
        Ok(config)
    }

    /// Override fields from environment-style lookups. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ENV") { self.server.env = v; }
        if let Some(v) = get("DEBUG") { self.server.debug = v.eq_ignore_ascii_case("true"); }
        if let Some(v) = get("HOST") { self.server.host = v; }
        if let Some(v) = get("PORT") { self.server.port = parse_value("PORT", v)?; }
        if let Some(v) = get("CORS_ORIGINS") {
            self.server.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = get("STATIC_DIR") { self.server.static_dir = PathBuf::from(v); }

        if let Some(v) = get("DATABRICKS_HOST") { self.warehouse.host = normalize_host(&v); }
        if let Some(v) = get("DATABRICKS_TOKEN") { self.warehouse.token = Some(SecretString::from(v)); }
        if let Some(v) = get("DATABRICKS_HTTP_PATH") { self.warehouse.http_path = v; }
        if let Some(v) = get("DATABRICKS_CATALOG") { self.warehouse.catalog = v; }
        if let Some(v) = get("DATABRICKS_SCHEMA") { self.warehouse.schema = v; }
        if let Some(v) = get("TABLE_CONTEXT_TIMEOUT_SECS") {
            self.warehouse.context_timeout_secs = parse_value("TABLE_CONTEXT_TIMEOUT_SECS", v)?;
        }

        if let Some(v) = get("LLM_BASE_URL") { self.llm.base_url = Some(v.trim_end_matches('/').to_string()); }
        if let Some(v) = get("LLM_API_KEY") { self.llm.api_key = Some(SecretString::from(v)); }
        if let Some(v) = get("LLM_DEFAULT_MODEL") { self.llm.default_model = v; }

        if let Some(v) = get("AUDIT_TABLE") { self.audit.table = Some(v); }
        if let Some(v) = get("AUDIT_QUEUE_CAPACITY") {
            self.audit.queue_capacity = parse_value("AUDIT_QUEUE_CAPACITY", v)?;
        }
        if let Some(v) = get("AUDIT_AUTO_CREATE") { self.audit.auto_create = v.eq_ignore_ascii_case("true"); }

        Ok(())
    }

    pub fn audit_table(&self) -> String {
        self.audit.table.clone().unwrap_or_else(|| {
            format!("{}.{}.audit_logs", self.warehouse.catalog, self.warehouse.schema)
        })
    }

    /// Model-serving base URL, if one can be derived.
    pub fn llm_base_url(&self) -> Option<String> {
        match &self.llm.base_url {
            Some(url) => Some(url.clone()),
            None if !self.warehouse.host.is_empty() => {
                Some(format!("{}/serving-endpoints", self.warehouse.base_url()))
            }
            None => None,
        }
    }

    pub fn llm_api_key(&self) -> Option<&SecretString> {
        self.llm.api_key.as_ref().or(self.warehouse.token.as_ref())
    }
}

fn normalize_host(host: &str) -> String {
    host.trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue { key, value })
}

#[cfg(test)]
mod tests;
