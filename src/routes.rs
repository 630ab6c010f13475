use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    engine::DetectionEngine,
    error::{validation_error, AppError},
    types::{ClassifyRequest, ClassifyResponse, FeatureSchemaResponse, FEATURE_COUNT, FEATURE_NAMES},
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DetectionEngine>,
    pub metrics: PrometheusHandle,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/classify", post(classify))
        .route("/features", get(features))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn classify(
    State(state): State<AppState>,
    Json(payload): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, AppError> {
    let url = payload.url.trim();
    if url.is_empty() {
        return Err(validation_error("url must not be empty"));
    }

    info!("Received classify request for {}", url);
    let result = state.engine.classify(url).await;
    Ok(Json(result.into()))
}

pub async fn features() -> Json<FeatureSchemaResponse> {
    Json(FeatureSchemaResponse {
        count: FEATURE_COUNT,
        names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
    })
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let classifier = state.engine.classifier();
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "model": {
            "kind": classifier.kind(),
            "version": classifier.version(),
            "sha256": classifier.fingerprint(),
        }
    }))
}

pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
