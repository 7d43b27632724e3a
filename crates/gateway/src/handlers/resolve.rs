//! Toponym resolution handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;
use validator::Validate;

use crate::AppState;
use toponym_common::{
    errors::{AppError, Result},
    metrics::RequestMetrics,
    EntityClass,
};
use toponym_resolver::{Candidate, Centroid, EntityId, ResolutionResult};

/// Resolve request: tokens are resolved in order with a shared context
#[derive(Debug, Deserialize, Validate)]
pub struct ResolveRequest {
    /// Original free text, echoed back
    #[validate(length(max = 1000))]
    #[serde(default)]
    pub query: Option<String>,

    #[validate(length(min = 1))]
    pub tokens: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub results: Vec<TokenResolution>,
    pub processing_time_ms: u64,
}

/// One token's outcome, flattened for clients
#[derive(Debug, Serialize)]
pub struct TokenResolution {
    pub token: String,
    pub normalized: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_class: Option<EntityClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_country: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Centroid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateView>,
}

#[derive(Debug, Serialize)]
pub struct CandidateView {
    pub entity_id: EntityId,
    pub canonical_name: String,
    pub entity_class: EntityClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_country: Option<EntityId>,
    pub matched: String,
    pub score: f32,
}

impl From<&Candidate> for CandidateView {
    fn from(c: &Candidate) -> Self {
        Self {
            entity_id: c.entity.id,
            canonical_name: c.entity.name.clone(),
            entity_class: c.entity.entity_class,
            parent_country: c.entity.parent_country,
            matched: c.matched.clone(),
            score: c.final_score,
        }
    }
}

impl From<ResolutionResult> for TokenResolution {
    fn from(result: ResolutionResult) -> Self {
        let status = result.status().as_str();
        match result {
            ResolutionResult::Resolved {
                token,
                normalized,
                entity,
                confidence,
                rule,
            } => Self {
                token,
                normalized,
                status,
                canonical_name: Some(entity.name.clone()),
                entity_id: Some(entity.id),
                entity_class: Some(entity.entity_class),
                parent_country: entity.parent_country,
                centroid: Some(entity.centroid),
                confidence: Some(confidence),
                rule: Some(rule.as_str()),
                reason: None,
                candidates: Vec::new(),
            },
            ResolutionResult::ClarificationRequired {
                token,
                normalized,
                candidates,
            } => Self {
                token,
                normalized,
                status,
                canonical_name: None,
                entity_id: None,
                entity_class: None,
                parent_country: None,
                centroid: None,
                confidence: None,
                rule: None,
                reason: None,
                candidates: candidates.iter().map(CandidateView::from).collect(),
            },
            ResolutionResult::Unresolved {
                token,
                normalized,
                reason,
            } => Self {
                token,
                normalized,
                status,
                canonical_name: None,
                entity_id: None,
                entity_class: None,
                parent_country: None,
                centroid: None,
                confidence: None,
                rule: None,
                reason: Some(reason.to_string()),
                candidates: Vec::new(),
            },
        }
    }
}

/// Resolve a batch of tokens
pub async fn resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>> {
    let metrics = RequestMetrics::start("POST", "/v1/resolve");
    let result = run(&state, request).await;
    metrics.finish(match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    });
    result.map(Json)
}

async fn run(state: &AppState, request: ResolveRequest) -> Result<ResolveResponse> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let limit = state.config.server.max_tokens_per_request;
    if request.tokens.len() > limit {
        return Err(AppError::PayloadTooLarge {
            size: request.tokens.len(),
            limit,
        });
    }

    let timeout = state.config.request_timeout();
    let query = request.query.clone().unwrap_or_else(|| request.tokens.join(" "));
    let resolution = tokio::time::timeout(
        timeout,
        state.resolver.resolve_query(&query, &request.tokens),
    )
    .await
    .map_err(|_| AppError::Timeout {
        source_name: "resolve".to_string(),
        timeout_ms: timeout.as_millis() as u64,
    })?;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    info!(
        tokens = request.tokens.len(),
        processing_time_ms,
        "Resolve request completed"
    );

    Ok(ResolveResponse {
        query: request.query,
        results: resolution.results.into_iter().map(TokenResolution::from).collect(),
        processing_time_ms,
    })
}
