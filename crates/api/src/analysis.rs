//! LLM-backed idea analysis
//!
//! Client for the chat-completions proxy that produces validation reports.
//! The model's reply is treated as untrusted input: it is stripped of
//! markdown code fences, parsed against an explicit schema, and range-checked
//! before anything is stored. A malformed reply surfaces as a typed failure,
//! never as a silently empty report.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::config::Config;

/// Analysis calls may take a while on large models.
const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(120);

/// Report language requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Zh,
    Ja,
    De,
    Fr,
    Ko,
    Es,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
            Language::Ja => "ja",
            Language::De => "de",
            Language::Fr => "fr",
            Language::Ko => "ko",
            Language::Es => "es",
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Proxy unreachable or returned a non-2xx status
    #[error("analysis request failed: {0}")]
    Request(String),

    /// Reply did not contain a report matching the expected schema
    #[error("malformed analysis response: {0}")]
    Malformed(String),
}

/// Structured validation report returned by the analyst
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaAnalysis {
    pub overall_score: i32,
    pub market_analysis: serde_json::Value,
    pub competition_analysis: serde_json::Value,
    pub technical_feasibility: serde_json::Value,
    pub business_model: serde_json::Value,
    pub risks: serde_json::Value,
    pub suggestions: serde_json::Value,
    pub summary: String,
}

const VALIDATION_PROMPT: &str = r#"You are an expert startup analyst and venture capitalist. Analyze the following startup idea and provide a comprehensive validation report.

**Startup Idea:**
Title: {title}
Description: {description}

**Provide your analysis in the following JSON format:**
{
  "overall_score": <integer 0-100>,
  "market_analysis": {
    "tam": "<Total Addressable Market estimate>",
    "sam": "<Serviceable Available Market estimate>",
    "som": "<Serviceable Obtainable Market estimate>",
    "market_trends": ["<trend 1>", "<trend 2>"],
    "target_customers": "<description of ideal customers>",
    "score": <integer 0-100>
  },
  "competition_analysis": {
    "direct_competitors": ["<competitor 1>", "<competitor 2>"],
    "indirect_competitors": ["<competitor 1>", "<competitor 2>"],
    "competitive_advantages": ["<advantage 1>", "<advantage 2>"],
    "barriers_to_entry": ["<barrier 1>", "<barrier 2>"],
    "score": <integer 0-100>
  },
  "technical_feasibility": {
    "technology_stack": ["<tech 1>", "<tech 2>"],
    "development_complexity": "<low/medium/high>",
    "time_to_mvp": "<estimate in weeks/months>",
    "key_technical_challenges": ["<challenge 1>", "<challenge 2>"],
    "score": <integer 0-100>
  },
  "business_model": {
    "revenue_streams": ["<stream 1>", "<stream 2>"],
    "pricing_strategy": "<description>",
    "unit_economics": "<description>",
    "scalability": "<low/medium/high>",
    "score": <integer 0-100>
  },
  "risks": {
    "market_risks": ["<risk 1>", "<risk 2>"],
    "technical_risks": ["<risk 1>", "<risk 2>"],
    "financial_risks": ["<risk 1>", "<risk 2>"],
    "regulatory_risks": ["<risk 1>", "<risk 2>"],
    "overall_risk_level": "<low/medium/high>"
  },
  "suggestions": {
    "immediate_actions": ["<action 1>", "<action 2>"],
    "improvements": ["<improvement 1>", "<improvement 2>"],
    "pivot_ideas": ["<pivot 1>", "<pivot 2>"],
    "resources_needed": ["<resource 1>", "<resource 2>"]
  },
  "summary": "<2-3 sentence executive summary of the validation>"
}

Respond ONLY with valid JSON. Be specific, actionable, and data-driven in your analysis. Language: {language}"#;

fn build_prompt(title: &str, description: &str, language: Language) -> String {
    VALIDATION_PROMPT
        .replace("{title}", title)
        .replace("{description}", description)
        .replace("{language}", language.as_str())
}

/// Drop markdown code fences the model may have wrapped its JSON in
fn extract_json(content: &str) -> &str {
    if let Some(rest) = content.split_once("```json").map(|(_, rest)| rest) {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    if let Some(rest) = content.split_once("```").map(|(_, rest)| rest) {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    content.trim()
}

/// Parse and validate a model reply into a report
pub fn parse_analysis(content: &str) -> Result<IdeaAnalysis, AnalysisError> {
    let analysis: IdeaAnalysis = serde_json::from_str(extract_json(content))
        .map_err(|e| AnalysisError::Malformed(e.to_string()))?;

    if !(0..=100).contains(&analysis.overall_score) {
        return Err(AnalysisError::Malformed(format!(
            "overall_score out of range: {}",
            analysis.overall_score
        )));
    }

    Ok(analysis)
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Client for the LLM proxy
#[derive(Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnalysisClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.llm_proxy_url.clone(),
            api_key: config.llm_proxy_key.clone(),
            model: config.llm_model.clone(),
        }
    }

    /// Run one idea validation. Leaves no local state behind on failure;
    /// the caller only consumes a credit after this returns successfully.
    pub async fn analyze(
        &self,
        title: &str,
        description: &str,
        language: Language,
    ) -> Result<IdeaAnalysis, AnalysisError> {
        let prompt = build_prompt(title, description, language);

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(ANALYSIS_TIMEOUT)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": 0.7,
                "max_tokens": 4000,
            }))
            .send()
            .await
            .map_err(|e| AnalysisError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Request(format!(
                "analysis proxy returned {status}"
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Malformed(e.to_string()))?;

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| AnalysisError::Malformed("empty choices".to_string()))?;

        parse_analysis(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_json(score: i32) -> String {
        format!(
            r#"{{
                "overall_score": {score},
                "market_analysis": {{"tam": "$1B", "score": 70}},
                "competition_analysis": {{"direct_competitors": [], "score": 60}},
                "technical_feasibility": {{"development_complexity": "medium", "score": 80}},
                "business_model": {{"revenue_streams": ["subscriptions"], "score": 65}},
                "risks": {{"overall_risk_level": "medium"}},
                "suggestions": {{"immediate_actions": ["talk to customers"]}},
                "summary": "A promising idea with real competition."
            }}"#
        )
    }

    #[test]
    fn test_parse_plain_json() {
        let analysis = parse_analysis(&report_json(72)).unwrap();
        assert_eq!(analysis.overall_score, 72);
        assert_eq!(
            analysis.summary,
            "A promising idea with real competition."
        );
    }

    #[test]
    fn test_parse_json_code_fence() {
        let content = format!("```json\n{}\n```", report_json(55));
        let analysis = parse_analysis(&content).unwrap();
        assert_eq!(analysis.overall_score, 55);
    }

    #[test]
    fn test_parse_bare_code_fence() {
        let content = format!("Here is the report:\n```\n{}\n```", report_json(40));
        let analysis = parse_analysis(&content).unwrap();
        assert_eq!(analysis.overall_score, 40);
    }

    #[test]
    fn test_non_json_reply_is_error() {
        let err = parse_analysis("I'm sorry, I can't do that.").unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
    }

    #[test]
    fn test_missing_section_is_error() {
        let err = parse_analysis(r#"{"overall_score": 50, "summary": "partial"}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
    }

    #[test]
    fn test_score_out_of_range_is_error() {
        let err = parse_analysis(&report_json(101)).unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
        let err = parse_analysis(&report_json(-1)).unwrap_err();
        assert!(matches!(err, AnalysisError::Malformed(_)));
    }

    #[test]
    fn test_prompt_substitution() {
        let prompt = build_prompt("Acme", "Rockets for roadrunners", Language::De);
        assert!(prompt.contains("Title: Acme"));
        assert!(prompt.contains("Rockets for roadrunners"));
        assert!(prompt.ends_with("Language: de"));
    }

    fn test_client(base_url: String) -> AnalysisClient {
        AnalysisClient {
            http: reqwest::Client::new(),
            base_url,
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
        }
    }

    #[tokio::test]
    async fn test_analyze_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let completion = serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": format!("```json\n{}\n```", report_json(81)),
                }
            }]
        });
        server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion.to_string())
            .create_async()
            .await;

        let client = test_client(server.url());
        let analysis = client
            .analyze("Acme", "Rockets for roadrunners, sold by subscription.", Language::En)
            .await
            .unwrap();
        assert_eq!(analysis.overall_score, 81);
    }

    #[tokio::test]
    async fn test_analyze_non_2xx_is_request_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let client = test_client(server.url());
        let err = client
            .analyze("Acme", "Rockets.", Language::En)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Request(_)));
    }
}
