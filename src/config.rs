//! Configuration loading and management.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Address to bind the HTTP server to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to bind the HTTP server to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS allow-list. `*` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Verbose logging when no RUST_LOG is set.
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            debug: false,
        }
    }
}

/// Hosted-model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key for the hosted model. Usually supplied via ANTHROPIC_API_KEY.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name to request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Override the API endpoint (proxies, local test servers).
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: None,
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("taskpilot.db")
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from the default location if present, then apply environment
    /// variable overrides.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::load("taskpilot.yaml").unwrap_or_default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env(&mut self) {
        if let Ok(db_path) = std::env::var("TASKPILOT_DB_PATH") {
            self.server.db_path = PathBuf::from(db_path);
        }
        if let Ok(host) = std::env::var("TASKPILOT_HOST")
            && let Ok(host) = host.parse()
        {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("TASKPILOT_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(debug) = std::env::var("TASKPILOT_DEBUG") {
            self.server.debug = matches!(debug.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
            && !key.is_empty()
        {
            self.model.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("TASKPILOT_MODEL") {
            self.model.model = model;
        }
        if let Ok(base_url) = std::env::var("ANTHROPIC_BASE_URL")
            && !base_url.is_empty()
        {
            self.model.base_url = Some(base_url);
        }
    }

    /// Socket address to bind.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    /// Whether the CORS allow-list permits any origin.
    pub fn allow_any_origin(&self) -> bool {
        self.server.allowed_origins.iter().any(|o| o == "*")
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
