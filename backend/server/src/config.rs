use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub oracle_url: String,
    pub oracle_model: String,
    pub oracle_key: Option<String>,
    pub reader_url: String,
    pub reader_key: Option<String>,
    pub trending_window: usize,
    pub trending_limit: usize,
    pub trending_refresh: Duration,
    pub vote_retries: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            redis_url: try_load("REDIS_URL", "redis://redis:6379")?,
            oracle_url: try_load("ORACLE_URL", "https://api.openai.com/v1")?,
            oracle_model: try_load("ORACLE_MODEL", "gpt-4o-mini")?,
            oracle_key: read_secret("ORACLE_API_KEY"),
            reader_url: try_load("READER_URL", "https://r.jina.ai")?,
            reader_key: read_secret("READER_API_KEY"),
            trending_window: try_load("TRENDING_WINDOW", "1000")?,
            trending_limit: try_load("TRENDING_LIMIT", "20")?,
            trending_refresh: Duration::from_secs(try_load("TRENDING_REFRESH_SECS", "60")?),
            vote_retries: try_load("VOTE_RETRIES", "16")?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        anyhow::anyhow!("Environment misconfigured: {key}={raw}")
    })
}

/// Docker secret first, then a plain environment variable of the same name.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .with_context(|| format!("reading {path}"))
        .or_else(|e| {
            var(secret_name).ok_or_else(|| {
                warn!("Failed to read {secret_name}: {e:#}");
            })
        })
        .ok()
        .filter(|s| !s.is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1111,
            redis_url: "redis://redis:6379".to_string(),
            oracle_url: "https://api.openai.com/v1".to_string(),
            oracle_model: "gpt-4o-mini".to_string(),
            oracle_key: None,
            reader_url: "https://r.jina.ai".to_string(),
            reader_key: None,
            trending_window: 1000,
            trending_limit: 20,
            trending_refresh: Duration::from_secs(60),
            vote_retries: ledger::store::DEFAULT_MAX_ATTEMPTS,
        }
    }
}
