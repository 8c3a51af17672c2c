//! Application configuration
//!
//! Everything the process needs is read from the environment once at
//! startup; components receive the values they need explicitly instead of
//! reading ambient state.

use anyhow::Context;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// PostgreSQL connection string
    pub database_url: String,
    /// Public frontend origin, used for CORS and checkout success redirects
    pub frontend_url: String,
    /// Comma-separated CORS origin allowlist
    pub allowed_origins: Vec<String>,
    /// LLM proxy endpoint for idea analysis
    pub llm_proxy_url: String,
    pub llm_proxy_key: String,
    pub llm_model: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let frontend_url = std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| format!("http://localhost:5173,{frontend_url}"))
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let llm_proxy_url = std::env::var("LLM_PROXY_URL")
            .unwrap_or_else(|_| "https://llm-proxy.densematrix.ai".to_string());
        let llm_proxy_key = std::env::var("LLM_PROXY_KEY").unwrap_or_default();
        let llm_model = std::env::var("LLM_MODEL")
            .unwrap_or_else(|_| "anthropic/claude-sonnet-4-20250514".to_string());

        Ok(Self {
            bind_address,
            database_url,
            frontend_url,
            allowed_origins,
            llm_proxy_url,
            llm_proxy_key,
            llm_model,
        })
    }
}
