//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::Instant;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub gazetteer: CheckResult,
    pub embedding_cache: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn up(latency_ms: Option<u64>) -> Self {
        Self {
            status: "up".to_string(),
            latency_ms,
            error: None,
        }
    }

    fn down(error: impl ToString) -> Self {
        Self {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(error.to_string()),
        }
    }

    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

/// Liveness check - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: toponym_common::VERSION,
    })
}

/// Readiness check - gazetteer reachable and embedding cache built
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let resolver = &state.resolver;

    let start = Instant::now();
    let gazetteer = match resolver.gazetteer().ping().await {
        Ok(()) => CheckResult::up(Some(start.elapsed().as_millis() as u64)),
        Err(e) => CheckResult::down(e),
    };

    let embedding_cache = match resolver.cache().entries().await {
        Some(0) => CheckResult::down("embedding cache is empty"),
        Some(_) => CheckResult::up(None),
        None => CheckResult::down("embedding cache not built"),
    };

    let all_healthy = gazetteer.is_up() && embedding_cache.is_up();
    let status = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
            checks: HealthChecks {
                gazetteer,
                embedding_cache,
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use crate::test_support;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let app = test_support::app().await;
        let response = app
            .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_ready_after_bootstrap() {
        let app = test_support::app().await;
        let response = app
            .oneshot(Request::get("/v1/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["checks"]["gazetteer"]["status"], "up");
        assert_eq!(json["checks"]["embedding_cache"]["status"], "up");
    }
}
