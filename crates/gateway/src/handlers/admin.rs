//! Administrative handlers

use axum::{extract::State, Json};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

use crate::AppState;
use toponym_common::{errors::Result, metrics::RequestMetrics};

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    pub entries: usize,
    pub model: String,
    pub elapsed_ms: u64,
}

/// Recompute the canonical embedding cache from the gazetteer
pub async fn rebuild_embeddings(State(state): State<AppState>) -> Result<Json<RebuildResponse>> {
    let metrics = RequestMetrics::start("POST", "/v1/admin/embeddings/rebuild");
    let start = Instant::now();

    let index = match state.resolver.cache().rebuild().await {
        Ok(index) => index,
        Err(e) => {
            metrics.finish(e.status_code().as_u16());
            return Err(e);
        }
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    info!(entries = index.len(), elapsed_ms, "Embedding cache rebuilt");
    metrics.finish(200);

    Ok(Json(RebuildResponse {
        entries: index.len(),
        model: index.model().to_string(),
        elapsed_ms,
    }))
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
    async fn test_rebuild_reports_entries() {
        let app = test_support::app().await;
        let response = app
            .oneshot(
                Request::post("/v1/admin/embeddings/rebuild")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["entries"].as_u64().unwrap() > 0);
        assert_eq!(json["model"], "hashing-trigram");
    }
}
