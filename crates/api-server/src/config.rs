use anyhow::{Context, Result};
use std::env;

/// Server configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub models_path: String,
    pub host: String,
    pub port: u16,
    /// Empty means any origin
    pub allowed_origins: Vec<String>,
    /// Raw `key:user_id:role` list
    pub api_keys: String,
    /// `None` seeds the explainer from OS entropy
    pub explainer_seed: Option<u64>,
    pub enable_hsts: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let seed = env::var("EXPLAINER_SEED").unwrap_or_else(|_| "42".to_string());
        let explainer_seed = match seed.trim() {
            "" | "random" => None,
            value => Some(value.parse().context("EXPLAINER_SEED must be an integer")?),
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:predictions.db".to_string()),
            models_path: env::var("MODELS_PATH").unwrap_or_else(|_| "./models".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("PORT must be a valid port number")?,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            api_keys: env::var("API_KEYS").unwrap_or_default(),
            explainer_seed,
            enable_hsts: env::var("ENABLE_HSTS")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
