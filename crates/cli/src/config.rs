//! Configuration loading from tiller.toml.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use mcp::ServerConfig;
use runtime::{DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_TIMEOUT, DEFAULT_OLLAMA_URL, OllamaBackend};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Model backend configuration.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Tool server configuration.
    #[serde(default)]
    pub server: ServerSection,
}

/// Ollama backend configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Ollama server URL.
    #[serde(default = "default_url")]
    pub url: String,

    /// Model to use.
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds; 0 disables it.
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature; the model's default when unset.
    pub temperature: Option<f32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            model: default_model(),
            timeout_secs: default_backend_timeout(),
            temperature: None,
        }
    }
}

/// Tool server process configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Extra arguments passed to the server executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the server process.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Per-request timeout in seconds; 0 disables it.
    #[serde(default = "default_server_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            env: HashMap::new(),
            timeout_secs: default_server_timeout(),
        }
    }
}

fn default_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_OLLAMA_MODEL.to_string()
}

fn default_backend_timeout() -> u64 {
    DEFAULT_OLLAMA_TIMEOUT.as_secs()
}

fn default_server_timeout() -> u64 {
    mcp::DEFAULT_TIMEOUT.as_secs()
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply command-line and environment overrides.
    ///
    /// A `--model` flag wins over the file; `OLLAMA_URL` wins over the file.
    pub fn with_overrides(mut self, model: Option<String>, ollama_url: Option<String>) -> Self {
        if let Some(model) = model {
            self.backend.model = model;
        }
        if let Some(url) = ollama_url.filter(|u| !u.is_empty()) {
            self.backend.url = url;
        }
        self
    }

    /// Build the Ollama backend.
    pub fn backend(&self) -> runtime::Result<OllamaBackend> {
        let mut builder = OllamaBackend::builder(&self.backend.model)
            .base_url(&self.backend.url)
            .timeout(seconds(self.backend.timeout_secs));
        if let Some(temperature) = self.backend.temperature {
            builder = builder.temperature(temperature);
        }
        builder.build()
    }

    /// Build the tool server launch configuration.
    pub fn server(&self, command: &str) -> ServerConfig {
        let mut config = ServerConfig::new(command)
            .with_args(self.server.args.iter().cloned())
            .with_timeout(seconds(self.server.timeout_secs));
        config.env = self.server.env.clone();
        config
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
