//! Application state

use sqlx::PgPool;

use ideascope_credits::CreditsService;

use crate::analysis::AnalysisClient;
use crate::config::Config;
use crate::reports::ReportStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    /// Entitlement engine, checkout initiation and webhook reconciliation
    pub credits: CreditsService,
    /// LLM collaborator for idea analysis
    pub analyst: AnalysisClient,
    pub reports: ReportStore,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let credits = CreditsService::from_env(pool.clone(), config.frontend_url.clone())
            .map_err(|e| anyhow::anyhow!("credits service init failed: {e}"))?;
        tracing::info!("Credits service initialized");

        let analyst = AnalysisClient::new(&config);
        let reports = ReportStore::new(pool.clone());

        Ok(Self {
            pool,
            config,
            credits,
            analyst,
            reports,
        })
    }
}
