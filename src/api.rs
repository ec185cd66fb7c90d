use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, Method as HttpMethod, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, warn};

use crate::config::ServerConfig;
use crate::debug;
use crate::error::AnalysisError;
use crate::metrics::Metrics;
use crate::pipeline::InferencePipeline;
use crate::sentiment::{AnalysisResult, Method, Sentiment};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<InferencePipeline>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(pipeline: InferencePipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            started_at: Utc::now(),
        }
    }
}

/// Build the HTTP surface. `/metrics` and `/debug/*` are mounted only when
/// `server.debug_routes` is set.
pub fn router(state: AppState, server: &ServerConfig, metrics: Option<&Metrics>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .route("/analyze/lightweight", post(analyze_lightweight))
        .route("/analyze/batch", post(analyze_batch))
        .with_state(state);

    if server.debug_routes {
        app = app.merge(debug::router());
        if let Some(m) = metrics {
            app = app.merge(m.router());
        }
    }

    app.layer(cors_layer(server))
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    if server.cors_is_permissive() {
        return CorsLayer::very_permissive();
    }
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "skipping invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([HttpMethod::GET, HttpMethod::POST, HttpMethod::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    /// Any JSON value; only a non-blank string is analyzed, everything else
    /// is a validation error rather than a malformed body.
    #[serde(default)]
    pub review: Option<serde_json::Value>,
    /// Kept for history only; never affects scoring.
    #[serde(default, rename = "movieTitle")]
    pub movie_title: Option<String>,
    #[serde(default)]
    pub lightweight: Option<bool>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum BatchEntry {
    Ok(AnalysisResult),
    Err { error: String },
}

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
    model_loaded: bool,
    tokenizer_loaded: bool,
    tokenizer_placeholder: bool,
    started_at: DateTime<Utc>,
    uptime_secs: i64,
    requests_total: u64,
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        match &self {
            AnalysisError::Validation => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            AnalysisError::Unrecoverable(reason) => {
                error!(%reason, "analysis failed; returning error fallback");
                let body = json!({
                    "sentiment": Sentiment::Neutral,
                    "confidence": 0.5,
                    "key_phrases": ["Error in analysis"],
                    "aspect_analysis": {},
                    "error": reason,
                    "method": Method::ErrorFallback,
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    let store = state.pipeline.artifacts();
    Json(HealthResp {
        status: "ok",
        model_loaded: store.model_loaded(),
        tokenizer_loaded: store.tokenizer_loaded(),
        tokenizer_placeholder: store.tokenizer_is_placeholder(),
        started_at: state.started_at,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        requests_total: debug::total_requests(),
    })
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, AnalysisError> {
    handle_one(&state, "analyze", payload, false).await
}

async fn analyze_lightweight(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, AnalysisError> {
    handle_one(&state, "analyze_lightweight", payload, true).await
}

async fn handle_one(
    state: &AppState,
    endpoint: &'static str,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
    force_lightweight: bool,
) -> Result<Json<AnalysisResult>, AnalysisError> {
    counter!("sentiment_requests_total", "endpoint" => endpoint).increment(1);
    let started = Instant::now();

    let outcome = match payload {
        Ok(Json(req)) => {
            let pipeline = state.pipeline.clone();
            tokio::task::spawn_blocking(move || analyze_request(&pipeline, req, force_lightweight))
                .await
                .unwrap_or_else(|e| {
                    Err(AnalysisError::Unrecoverable(format!(
                        "analysis task failed: {e}"
                    )))
                })
        }
        Err(rejection) => Err(AnalysisError::Unrecoverable(rejection.body_text())),
    };

    observe(&outcome, started);
    outcome.map(Json)
}

async fn analyze_batch(
    State(state): State<AppState>,
    payload: Result<Json<Vec<AnalysisRequest>>, JsonRejection>,
) -> Result<Json<Vec<BatchEntry>>, AnalysisError> {
    counter!("sentiment_requests_total", "endpoint" => "analyze_batch").increment(1);
    let Json(items) = payload.map_err(|r| AnalysisError::Unrecoverable(r.body_text()))?;

    let pipeline = state.pipeline.clone();
    let entries = tokio::task::spawn_blocking(move || {
        items
            .into_iter()
            .map(|req| {
                let started = Instant::now();
                let outcome = analyze_request(&pipeline, req, false);
                observe(&outcome, started);
                match outcome {
                    Ok(r) => BatchEntry::Ok(r),
                    Err(e) => BatchEntry::Err { error: e.to_string() },
                }
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| AnalysisError::Unrecoverable(format!("batch task failed: {e}")))?;

    Ok(Json(entries))
}

/// Runs on the blocking pool.
fn analyze_request(
    pipeline: &InferencePipeline,
    req: AnalysisRequest,
    force_lightweight: bool,
) -> Result<AnalysisResult, AnalysisError> {
    let review = match req.review {
        Some(serde_json::Value::String(text)) => text,
        _ => return Err(AnalysisError::Validation),
    };
    let force = force_lightweight || req.lightweight.unwrap_or(false);
    let result = pipeline.analyze(&review, force)?;
    debug::record_analysis(&review, req.movie_title.as_deref(), &result);
    Ok(result)
}

fn observe(outcome: &Result<AnalysisResult, AnalysisError>, started: Instant) {
    let elapsed = started.elapsed();
    histogram!("sentiment_analysis_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
    debug::record_latency(elapsed.as_millis());
    match outcome {
        Ok(r) => {
            counter!("sentiment_results_total", "method" => r.method.as_str()).increment(1);
            debug::record_result(r.method);
        }
        Err(AnalysisError::Validation) => debug::record_rejected(),
        Err(AnalysisError::Unrecoverable(_)) => {
            counter!("sentiment_results_total", "method" => Method::ErrorFallback.as_str())
                .increment(1);
            debug::record_result(Method::ErrorFallback);
        }
    }
}
