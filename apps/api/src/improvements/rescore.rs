//! Rescore: pluggable scoring oracle consulted after a suggestion is applied.
//!
//! Default: `KeywordRescorer` (in-process, deterministic keyword coverage).
//! `HttpRescorer` forwards to an external scoring service when `RESCORE_URL` is set.
//!
//! Neither backend retries. A failed rescore is surfaced to the user, who decides when to
//! try again; retrying here could score a text version that is about to be superseded.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::improvements::models::{
    JobContext, RescoreSummary, ScoreBreakdownItem, SelectionProbability,
};

#[derive(Debug, Error)]
pub enum RescoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Scoring service error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Scoring failed: {0}")]
    Scoring(String),
}

/// Inputs for one rescore call.
#[derive(Debug, Clone, Serialize)]
pub struct RescoreRequest<'a> {
    pub document_text: &'a str,
    pub job_context: &'a JobContext,
    pub baseline_score: f64,
    pub previous_missing_skills: &'a [String],
}

/// Carried as `Arc<dyn Rescorer>` in `AppState` and in every lifecycle manager.
#[async_trait]
pub trait Rescorer: Send + Sync {
    async fn rescore(&self, request: &RescoreRequest<'_>) -> Result<RescoreSummary, RescoreError>;
}

// ────────────────────────────────────────────────────────────────────────────
// KeywordRescorer
// ────────────────────────────────────────────────────────────────────────────

/// Scores the fraction of job keywords present in the document text.
///
/// overall = covered / total × 100 (rounded). No keywords ⇒ 0.
/// Selection probability maps a score linearly onto 0.05 – 0.90.
pub struct KeywordRescorer;

#[async_trait]
impl Rescorer for KeywordRescorer {
    async fn rescore(&self, request: &RescoreRequest<'_>) -> Result<RescoreSummary, RescoreError> {
        if request.document_text.trim().is_empty() {
            return Err(RescoreError::Scoring("document text is empty".to_string()));
        }
        Ok(compute_keyword_rescore(request))
    }
}

fn compute_keyword_rescore(request: &RescoreRequest<'_>) -> RescoreSummary {
    let text = request.document_text.to_lowercase();
    let keywords = &request.job_context.keywords;

    let (covered_skills, missing_skills): (Vec<String>, Vec<String>) = keywords
        .iter()
        .cloned()
        .partition(|kw| text.contains(&kw.to_lowercase()));

    let overall_score = if keywords.is_empty() {
        0.0
    } else {
        ((covered_skills.len() as f64 / keywords.len() as f64) * 100.0).round()
    };

    let closed: Vec<&String> = request
        .previous_missing_skills
        .iter()
        .filter(|skill| covered_skills.contains(skill))
        .collect();

    let mut factors: Vec<String> = closed
        .iter()
        .take(3)
        .map(|skill| format!("Now covers {skill}"))
        .collect();
    factors.extend(
        missing_skills
            .iter()
            .take(3)
            .map(|skill| format!("Still missing {skill}")),
    );

    let score_breakdown = vec![
        ScoreBreakdownItem {
            category: "keyword_coverage".to_string(),
            score: overall_score,
            max_score: 100.0,
        },
        ScoreBreakdownItem {
            category: "gaps_closed".to_string(),
            score: closed.len() as f64,
            max_score: request.previous_missing_skills.len() as f64,
        },
    ];

    RescoreSummary {
        overall_score,
        score_breakdown,
        covered_skills,
        missing_skills,
        selection_probability: SelectionProbability {
            before: selection_probability(request.baseline_score),
            after: selection_probability(overall_score),
            factors,
        },
        delta: None,
    }
}

fn selection_probability(score: f64) -> f64 {
    let p = 0.05 + (score / 100.0).clamp(0.0, 1.0) * 0.85;
    (p * 100.0).round() / 100.0
}

// ────────────────────────────────────────────────────────────────────────────
// HttpRescorer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ScoringServiceError {
    error: String,
}

/// Forwards rescore requests to an external scoring service. Single attempt per call.
#[derive(Clone)]
pub struct HttpRescorer {
    client: Client,
    url: String,
}

impl HttpRescorer {
    pub fn new(url: String, timeout: Duration) -> Result<Self, RescoreError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url,
        })
    }
}

#[async_trait]
impl Rescorer for HttpRescorer {
    async fn rescore(&self, request: &RescoreRequest<'_>) -> Result<RescoreSummary, RescoreError> {
        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ScoringServiceError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(RescoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let summary: RescoreSummary = response.json().await?;
        debug!(
            "Scoring service returned overall_score={} delta={:?}",
            summary.overall_score, summary.delta
        );
        Ok(summary)
    }
}
