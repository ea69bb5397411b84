use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the analysis service, e.g. `http://localhost:8000`.
    pub analyzer_url: String,
    /// Path of the JSON blob backing the record store.
    pub store_path: PathBuf,
    /// Priority areas to request, in order.
    pub priorities: Vec<String>,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            analyzer_url: require_env("ANALYZER_URL")?,
            store_path: std::env::var("RECORD_STORE_PATH")
                .unwrap_or_else(|_| "analysis_records.json".to_string())
                .into(),
            priorities: std::env::var("ANALYSIS_PRIORITIES")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
