mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Json, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use pulse_agents::{top_k, ComplaintService};
use pulse_core::{ComplaintItem, InputError};
use pulse_ml::{ModelInfo, PulseMlStack, StackOptions};
use pulse_observability::{AppMetrics, MetricsSnapshot};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use config::ServiceConfig;

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<ComplaintService>,
    pub metrics: Arc<AppMetrics>,
    pub allowed_origins: Arc<Vec<String>>,
    pub max_body_bytes: usize,
}

impl ApiState {
    pub fn new(ml_stack: PulseMlStack, config: &ServiceConfig) -> Self {
        let metrics = AppMetrics::shared();
        Self {
            service: Arc::new(ComplaintService::new(ml_stack, metrics.clone())),
            metrics,
            allowed_origins: Arc::new(config.allowed_origins.clone()),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TextRequest {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct PredictRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClusterRequest {
    #[serde(default)]
    complaints: Vec<ComplaintItem>,
    #[serde(default)]
    n_clusters: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse<'a> {
    status: &'static str,
    timestamp_utc: String,
    classifier: &'static str,
    model: Option<&'a ModelInfo>,
    metrics: MetricsSnapshot,
}

/// Loads the model stack off the async runtime, then wires the router.
pub async fn build_app(options: StackOptions, config: ServiceConfig) -> Result<Router> {
    let ml_stack = tokio::task::spawn_blocking(move || PulseMlStack::load(&options))
        .await
        .context("model stack loader panicked")?;

    tracing::info!(
        model_loaded = ml_stack.model_loaded(),
        classifier = ml_stack.classifier.primary(),
        "model stack ready"
    );

    Ok(build_router(ApiState::new(ml_stack, &config)))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ml/classify-complaint", post(classify_complaint))
        .route("/ml/predict_category", post(predict_category))
        .route("/predict", post(predict))
        .route("/ml/cluster", post(cluster))
        .route("/ml/labels", get(labels))
        .route("/ml/diagnose", post(diagnose))
        .route("/ml/chat", post(chat))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(state.max_body_bytes))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        classifier: state.service.ml_stack().classifier.primary(),
        model: state.service.model(),
        metrics: state.metrics.snapshot(),
    };
    (StatusCode::OK, Json(payload)).into_response()
}

async fn classify_complaint(
    State(state): State<ApiState>,
    Json(request): Json<TextRequest>,
) -> impl IntoResponse {
    let result = state.service.classify(&request.text);
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "category": result.category,
            "confidence": result.confidence,
            "source": result.source,
            "top_k": top_k(&result),
        })),
    )
        .into_response()
}

async fn predict_category(
    State(state): State<ApiState>,
    Json(request): Json<TextRequest>,
) -> impl IntoResponse {
    match state.service.predict_category(&request.text) {
        Ok(result) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "category": result.category,
                "confidence": result.confidence,
                "source": result.source,
                "candidates": result.ranked,
            })),
        )
            .into_response(),
        Err(error) => input_error(error),
    }
}

async fn predict(
    State(state): State<ApiState>,
    Json(request): Json<PredictRequest>,
) -> impl IntoResponse {
    match state
        .service
        .classify_combined(request.title.as_deref(), request.description.as_deref())
    {
        Ok(prediction) => (StatusCode::OK, Json(prediction)).into_response(),
        Err(error) => input_error(error),
    }
}

async fn cluster(
    State(state): State<ApiState>,
    Json(request): Json<ClusterRequest>,
) -> impl IntoResponse {
    // Zero clusters means "not provided".
    let n_clusters = request.n_clusters.filter(|k| *k > 0);
    let service = state.service.clone();

    // clustering is CPU bound, keep it off the async workers
    let outcome = tokio::task::spawn_blocking(move || {
        service.cluster(&request.complaints, n_clusters)
    })
    .await;

    match outcome {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(error)) => input_error(error),
        Err(error) => {
            tracing::error!(error = %error, "cluster task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "cluster_failed",
                    "message": "clustering task did not complete",
                })),
            )
                .into_response()
        }
    }
}

async fn labels(State(state): State<ApiState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.service.list_labels())).into_response()
}

async fn diagnose(
    State(state): State<ApiState>,
    Json(request): Json<TextRequest>,
) -> impl IntoResponse {
    (StatusCode::OK, Json(state.service.diagnose(&request.text))).into_response()
}

async fn chat(State(state): State<ApiState>, Json(request): Json<ChatRequest>) -> impl IntoResponse {
    let reply = state
        .service
        .advise_chat(request.session_id, &request.message);
    (StatusCode::OK, Json(reply)).into_response()
}

fn input_error(error: InputError) -> Response {
    tracing::debug!(error = %error, "rejected request");
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": error.code(),
            "message": error.to_string(),
        })),
    )
        .into_response()
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
