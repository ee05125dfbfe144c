//! Runtime configuration
//!
//! Values come from the environment (optionally seeded from a `.env` file)
//! and can be overridden by command line flags.

use crate::error::{Nl2SqlError, Result};
use crate::generator::{DEFAULT_ROW_COUNT, MAX_ROWS, MIN_ROWS};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// OpenAI API key; `None` means the delegate is unavailable
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Rows generated when a session starts
    pub row_count: usize,
    /// Seed for reproducible datasets
    pub seed: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            row_count: DEFAULT_ROW_COUNT,
            seed: None,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            config.api_key = Some(key.trim().to_string());
        }
        if let Some(model) = lookup("OPENAI_MODEL").filter(|m| !m.trim().is_empty()) {
            config.model = model.trim().to_string();
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|u| !u.trim().is_empty()) {
            config.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(rows) = lookup("NL2SQL_ROWS") {
            let row_count: usize = rows.trim().parse().map_err(|e| {
                Nl2SqlError::Config(format!("NL2SQL_ROWS must be a positive integer, got '{}': {}", rows, e))
            })?;
            if !(MIN_ROWS..=MAX_ROWS).contains(&row_count) {
                return Err(Nl2SqlError::Config(format!(
                    "NL2SQL_ROWS must be between {} and {}, got {}",
                    MIN_ROWS, MAX_ROWS, row_count
                )));
            }
            config.row_count = row_count;
        }
        if let Some(seed) = lookup("NL2SQL_SEED") {
            config.seed = Some(seed.trim().parse().map_err(|e| {
                Nl2SqlError::Config(format!("NL2SQL_SEED must be an unsigned integer, got '{}': {}", seed, e))
            })?);
        }

        Ok(config)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}
