use crate::store::DEFAULT_STATE_FILE;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty RAG engine.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the Ollama runtime backing the completion provider.
    pub ollama_url: Option<String>,
    /// Completion model identifier passed to the provider.
    pub completion_model: String,
    /// Optional override for the summarization concurrency bound.
    pub max_concurrency: Option<usize>,
    /// Optional override for the persisted state location.
    pub state_file: Option<String>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ollama_url: load_env_optional("RUSTY_RAG_OLLAMA_URL"),
            completion_model: load_env("RUSTY_RAG_COMPLETION_MODEL")?,
            max_concurrency: load_env_optional("RUSTY_RAG_MAX_CONCURRENCY")
                .map(|value| {
                    value.parse().map_err(|_| {
                        ConfigError::InvalidValue("RUSTY_RAG_MAX_CONCURRENCY".to_string())
                    })
                })
                .transpose()?,
            state_file: load_env_optional("RUSTY_RAG_STATE_FILE"),
        })
    }

    /// Resolve the persisted state location: the configured override when
    /// present, the crate default otherwise.
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .as_deref()
            .map_or_else(|| PathBuf::from(DEFAULT_STATE_FILE), PathBuf::from)
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        ollama_url = ?config.ollama_url,
        completion_model = %config.completion_model,
        max_concurrency = ?config.max_concurrency,
        state_file = ?config.state_file,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_env(key: &str, value: &str) {
        // SAFETY: Tests establish configuration before any concurrent reads.
        unsafe { env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        // SAFETY: See `set_env`.
        unsafe { env::remove_var(key) }
    }

    // Environment mutation is process-wide, so the scenarios run in one test
    // to stay deterministic under the parallel test runner.
    #[test]
    fn from_env_validates_variables() {
        remove_env("RUSTY_RAG_COMPLETION_MODEL");
        remove_env("RUSTY_RAG_MAX_CONCURRENCY");
        let error = Config::from_env().expect_err("missing model");
        assert!(matches!(
            error,
            ConfigError::MissingVariable(key) if key.contains("COMPLETION_MODEL")
        ));

        set_env("RUSTY_RAG_COMPLETION_MODEL", "qwen2.5:3b");
        set_env("RUSTY_RAG_MAX_CONCURRENCY", "lots");
        let error = Config::from_env().expect_err("invalid concurrency");
        assert!(matches!(
            error,
            ConfigError::InvalidValue(key) if key.contains("MAX_CONCURRENCY")
        ));

        set_env("RUSTY_RAG_MAX_CONCURRENCY", "3");
        let config = Config::from_env().expect("valid config");
        assert_eq!(config.completion_model, "qwen2.5:3b");
        assert_eq!(config.max_concurrency, Some(3));
        remove_env("RUSTY_RAG_MAX_CONCURRENCY");
    }

    #[test]
    fn state_path_honors_the_override_and_the_default() {
        let mut config = Config {
            ollama_url: None,
            completion_model: "qwen2.5:3b".into(),
            max_concurrency: None,
            state_file: None,
        };
        assert_eq!(config.state_path(), PathBuf::from(DEFAULT_STATE_FILE));

        config.state_file = Some("/var/lib/rusty-rag/state.json".into());
        assert_eq!(
            config.state_path(),
            PathBuf::from("/var/lib/rusty-rag/state.json")
        );
    }
}
