//! Validation report persistence

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::analysis::IdeaAnalysis;

/// A stored validation report
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ValidationReport {
    pub id: Uuid,
    pub idea_title: String,
    pub idea_description: String,
    pub language: String,
    pub overall_score: i32,
    pub market_analysis: serde_json::Value,
    pub competition_analysis: serde_json::Value,
    pub technical_feasibility: serde_json::Value,
    pub business_model: serde_json::Value,
    pub risks: serde_json::Value,
    pub suggestions: serde_json::Value,
    pub summary: String,
    pub device_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct ReportStore {
    pool: PgPool,
}

impl ReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a finished analysis and return the stored row
    pub async fn insert(
        &self,
        device_id: &str,
        idea_title: &str,
        idea_description: &str,
        language: &str,
        analysis: &IdeaAnalysis,
    ) -> Result<ValidationReport, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO validation_reports
                (device_id, idea_title, idea_description, language, overall_score,
                 market_analysis, competition_analysis, technical_feasibility,
                 business_model, risks, suggestions, summary)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id, idea_title, idea_description, language, overall_score,
                      market_analysis, competition_analysis, technical_feasibility,
                      business_model, risks, suggestions, summary, device_id, created_at
            "#,
        )
        .bind(device_id)
        .bind(idea_title)
        .bind(idea_description)
        .bind(language)
        .bind(analysis.overall_score)
        .bind(&analysis.market_analysis)
        .bind(&analysis.competition_analysis)
        .bind(&analysis.technical_feasibility)
        .bind(&analysis.business_model)
        .bind(&analysis.risks)
        .bind(&analysis.suggestions)
        .bind(&analysis.summary)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<ValidationReport>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, idea_title, idea_description, language, overall_score,
                   market_analysis, competition_analysis, technical_feasibility,
                   business_model, risks, suggestions, summary, device_id, created_at
            FROM validation_reports
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }
}
