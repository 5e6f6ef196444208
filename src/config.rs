//! Environment-driven service configuration.
//!
//! All knobs come from the process environment (a `.env` file is honored via
//! `dotenv` in `main`). Every variable has a default so the service starts
//! with zero configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

pub const DEFAULT_MODEL_REPO: &str = "nlptown/bert-base-multilingual-uncased-sentiment";

/// Which classification backend the service is built with at startup.
///
/// Selected exactly once per process; there is no per-request switching and
/// no implicit fallback from one engine to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Transformer checkpoint served through candle.
    Model,
    /// Deterministic keyword heuristic. No downloads, no model files.
    Lexicon,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Model => "model",
            EngineKind::Lexicon => "lexicon",
        }
    }
}

impl FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "model" => Ok(EngineKind::Model),
            "lexicon" => Ok(EngineKind::Lexicon),
            other => bail!("SENTIMENT_ENGINE must be 'model' or 'lexicon', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub engine: EngineKind,
    pub model_repo: String,
    pub inference_timeout: Duration,
    pub reddit_enabled: bool,
    pub reddit_base_url: String,
    pub reddit_user_agent: String,
    pub reddit_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let engine = env_or("SENTIMENT_ENGINE", "model").parse::<EngineKind>()?;

        Ok(Settings {
            host: env_or("HOST", "0.0.0.0"),
            port: env_or("PORT", "8000")
                .parse()
                .context("PORT must be a valid port number")?,
            engine,
            model_repo: env_or("SENTIMENT_MODEL", DEFAULT_MODEL_REPO),
            inference_timeout: Duration::from_secs(
                env_or("INFERENCE_TIMEOUT_SECS", "30")
                    .parse()
                    .context("INFERENCE_TIMEOUT_SECS must be an integer")?,
            ),
            reddit_enabled: parse_bool(&env_or("REDDIT_ENABLED", "true"))?,
            reddit_base_url: env_or("REDDIT_BASE_URL", "https://www.reddit.com"),
            reddit_user_agent: env_or(
                "REDDIT_USER_AGENT",
                concat!("sentiment-api/", env!("CARGO_PKG_VERSION")),
            ),
            reddit_timeout: Duration::from_secs(
                env_or("REDDIT_TIMEOUT_SECS", "20")
                    .parse()
                    .context("REDDIT_TIMEOUT_SECS must be an integer")?,
            ),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean value, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_parsing() {
        assert_eq!("model".parse::<EngineKind>().unwrap(), EngineKind::Model);
        assert_eq!("LEXICON".parse::<EngineKind>().unwrap(), EngineKind::Lexicon);
        assert_eq!(" lexicon ".parse::<EngineKind>().unwrap(), EngineKind::Lexicon);
        assert!("bert".parse::<EngineKind>().is_err());
        assert!("".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("Yes").unwrap());
        assert!(parse_bool("1").unwrap());
        assert!(!parse_bool("false").unwrap());
        assert!(!parse_bool("off").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
