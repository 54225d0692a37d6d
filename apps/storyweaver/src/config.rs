use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::batch::BatchConfig;
use crate::story::engine::EngineConfig;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_model: String,
    /// When unset, translation falls back to the text model.
    pub deepl_api_key: Option<String>,
    pub data_dir: String,
    pub port: u16,
    pub rust_log: String,
    pub max_attempts: u32,
    pub illustrations_per_text: usize,
    pub batch_max_concurrent: usize,
    pub batch_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            openai_api_key: require_env("OPENAI_API_KEY")?,
            openai_model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            deepl_api_key: std::env::var("DEEPL_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "out".to_string()),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            max_attempts: parse_env("MAX_ATTEMPTS", 3)?,
            illustrations_per_text: parse_env("ILLUSTRATIONS_PER_TEXT", 2)?,
            batch_max_concurrent: parse_env("BATCH_MAX_CONCURRENT", 4)?,
            batch_delay_ms: parse_env("BATCH_DELAY_MS", 1000)?,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_attempts: self.max_attempts.max(1),
            illustrations_per_text: self.illustrations_per_text,
            batch: BatchConfig {
                max_concurrent: self.batch_max_concurrent.max(1),
                inter_batch_delay: Duration::from_millis(self.batch_delay_ms),
            },
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            openai_api_key: "sk-test".into(),
            openai_model: "gpt-4o-mini".into(),
            deepl_api_key: None,
            data_dir: "out".into(),
            port: 8080,
            rust_log: "info".into(),
            max_attempts: 0,
            illustrations_per_text: 2,
            batch_max_concurrent: 0,
            batch_delay_ms: 250,
        }
    }

    #[test]
    fn test_engine_config_clamps_zero_values() {
        let engine = config().engine_config();
        assert_eq!(engine.max_attempts, 1);
        assert_eq!(engine.batch.max_concurrent, 1);
        assert_eq!(engine.batch.inter_batch_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_parse_env_uses_default_when_unset() {
        let value: u32 = parse_env("STORYWEAVER_TEST_SURELY_UNSET", 7).unwrap();
        assert_eq!(value, 7);
    }
}
