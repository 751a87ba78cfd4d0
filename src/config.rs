use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::Direction;

/// Source names a connector can be registered under, in default registration order.
pub const KNOWN_SOURCES: &[&str] = &["arxiv", "pubmed", "semanticscholar", "googlescholar"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub citegraph: CitegraphConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// General settings
#[derive(Debug, Clone, Deserialize)]
pub struct CitegraphConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CitegraphConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Connector settings
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Registration order is resolution order.
    #[serde(default = "default_enabled_sources")]
    pub enabled: Vec<String>,
    #[serde(default = "default_semanticscholar_api_key_env")]
    pub semanticscholar_api_key_env: String,
    #[serde(default = "default_pubmed_email")]
    pub pubmed_email: String,
    #[serde(default = "default_pubmed_tool")]
    pub pubmed_tool: String,
    #[serde(default)]
    pub crossref_mailto: Option<String>,
    /// Google Scholar has no API and blocks scrapers; opt-in only.
    #[serde(default)]
    pub google_scholar_enabled: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_sources(),
            semanticscholar_api_key_env: default_semanticscholar_api_key_env(),
            pubmed_email: default_pubmed_email(),
            pubmed_tool: default_pubmed_tool(),
            crossref_mailto: None,
            google_scholar_enabled: false,
        }
    }
}

/// Citation graph traversal settings
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_depth")]
    pub default_depth: usize,
    #[serde(default = "default_max_citations")]
    pub default_max_citations: usize,
    #[serde(default = "default_direction")]
    pub default_direction: String,
    /// Concurrent lookups within one breadth-first level.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Whole-build budget; 0 disables the timeout.
    #[serde(default = "default_build_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
            default_max_citations: default_max_citations(),
            default_direction: default_direction(),
            concurrency: default_concurrency(),
            timeout_secs: default_build_timeout_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Outbound HTTP settings shared by all connectors
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
            max_retries: default_max_retries(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_enabled_sources() -> Vec<String> {
    KNOWN_SOURCES.iter().map(|s| s.to_string()).collect()
}

fn default_semanticscholar_api_key_env() -> String {
    "SEMANTICSCHOLAR_API_KEY".to_string()
}

fn default_pubmed_email() -> String {
    "citegraph@example.com".to_string()
}

fn default_pubmed_tool() -> String {
    "citegraph".to_string()
}

fn default_depth() -> usize {
    1
}

fn default_max_citations() -> usize {
    20
}

fn default_direction() -> String {
    "both".to_string()
}

fn default_concurrency() -> usize {
    8
}

fn default_build_timeout_secs() -> u64 {
    300
}

fn default_cache_capacity() -> usize {
    2048
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("citegraph/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_retries() -> usize {
    2
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in CITEGRAPH_CONFIG environment variable (must exist)
    /// 2. ./citegraph.toml in current directory (defaults are used when absent)
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config = match std::env::var("CITEGRAPH_CONFIG") {
            Ok(path) => Self::from_file(&PathBuf::from(path))?,
            Err(_) => {
                let default_path = PathBuf::from("citegraph.toml");
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    log::debug!("No citegraph.toml found, using built-in defaults");
                    Config::default()
                }
            }
        };

        config.validate()?;

        Ok(config)
    }

    fn from_file(path: &PathBuf) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for source in &self.sources.enabled {
            if !KNOWN_SOURCES.contains(&source.as_str()) {
                anyhow::bail!(
                    "sources.enabled contains unknown source '{}'; expected one of {:?}",
                    source,
                    KNOWN_SOURCES
                );
            }
        }

        if self.graph.concurrency == 0 {
            anyhow::bail!("graph.concurrency must be greater than 0");
        }

        if self.graph.cache_capacity == 0 {
            anyhow::bail!("graph.cache_capacity must be greater than 0");
        }

        if self.http.timeout_secs == 0 {
            anyhow::bail!("http.timeout_secs must be greater than 0");
        }

        self.default_direction()?;

        Ok(())
    }

    pub fn default_direction(&self) -> Result<Direction> {
        self.graph
            .default_direction
            .parse::<Direction>()
            .map_err(|e| anyhow::anyhow!("graph.default_direction: {}", e))
    }

    /// Semantic Scholar API key, if the configured variable is set.
    pub fn semanticscholar_api_key(&self) -> Option<String> {
        std::env::var(&self.sources.semanticscholar_api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    pub fn build_timeout(&self) -> Option<Duration> {
        if self.graph.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.graph.timeout_secs))
        }
    }
}
