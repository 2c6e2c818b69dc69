//! Configuration loader and validator for the character browser core.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable that takes precedence over `llm.api_key`.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub graphql: GraphQl,
    #[serde(default)]
    pub llm: Llm,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Character catalog endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphQl {
    #[serde(default = "default_graphql_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_graphql_timeout")]
    pub timeout_seconds: u64,
}

/// Chat-completion endpoint settings. A blank `api_key` selects the offline stub.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Llm {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl std::fmt::Debug for Llm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Llm")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish_non_exhaustive()
    }
}

fn default_graphql_endpoint() -> String {
    "https://rickandmortyapi.com/graphql".into()
}

fn default_graphql_timeout() -> u64 {
    15
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/".into()
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo".into()
}

fn default_llm_temperature() -> f64 {
    0.3
}

fn default_llm_timeout() -> u64 {
    30
}

impl Default for GraphQl {
    fn default() -> Self {
        Self {
            endpoint: default_graphql_endpoint(),
            timeout_seconds: default_graphql_timeout(),
        }
    }
}

impl Default for Llm {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: default_llm_temperature(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Default SQLite location inside the data dir.
    pub fn database_url(&self) -> String {
        format!(
            "sqlite://{}/rickmorty.db",
            self.app.data_dir.trim_end_matches('/')
        )
    }

    /// Resolve the LLM credential: env var first, then the file. Blank means none.
    pub fn api_key(&self) -> Option<String> {
        let from_env = std::env::var(API_KEY_ENV).ok();
        pick_api_key(from_env.as_deref(), &self.llm.api_key)
    }

    pub fn graphql_timeout(&self) -> Duration {
        Duration::from_secs(self.graphql.timeout_seconds)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_seconds)
    }
}

fn pick_api_key(from_env: Option<&str>, from_file: &str) -> Option<String> {
    [from_env.unwrap_or_default(), from_file]
        .into_iter()
        .map(str::trim)
        .find(|key| !key.is_empty())
        .map(str::to_string)
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

    if Url::parse(cfg.graphql.endpoint.trim()).is_err() {
        return Err(ConfigError::Invalid("graphql.endpoint must be a valid URL"));
    }
    if cfg.graphql.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("graphql.timeout_seconds must be > 0"));
    }

    if Url::parse(cfg.llm.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("llm.base_url must be a valid URL"));
    }
    if cfg.llm.model.trim().is_empty() {
        return Err(ConfigError::Invalid("llm.model must be non-empty"));
    }
    if !(0.0..=2.0).contains(&cfg.llm.temperature) {
        return Err(ConfigError::Invalid("llm.temperature must be within 0.0..=2.0"));
    }
    if cfg.llm.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("llm.timeout_seconds must be > 0"));
    }
    // llm.api_key may be blank; the offline stub answers in that case.

    Ok(())
}

/// Returns a complete example YAML file.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

graphql:
  endpoint: "https://rickandmortyapi.com/graphql"
  timeout_seconds: 15

llm:
  # Leave blank (and unset OPENAI_API_KEY) to use the offline summarizer.
  api_key: ""
  base_url: "https://api.openai.com/"
  model: "gpt-3.5-turbo"
  temperature: 0.3
  timeout_seconds: 30
"#
}
