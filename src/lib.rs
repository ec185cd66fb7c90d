// src/lib.rs
// Public library surface for integration tests and the Shuttle binary.

pub mod analyze;
pub mod api;
pub mod artifacts;
pub mod config;
pub mod debug;
pub mod error;
pub mod lexicon;
pub mod metrics;
pub mod pipeline;
pub mod sentiment;
pub mod telemetry;
pub mod text;

pub use crate::api::{router, AppState};
pub use crate::pipeline::{InferencePipeline, InferenceSettings};
pub use crate::sentiment::{AnalysisResult, LightweightClassifier, Method, Sentiment};

use anyhow::Context;
use axum::Router;
use std::sync::Arc;
use tracing::info;

use crate::artifacts::ArtifactStore;
use crate::config::ServiceConfig;

/// Load configuration from file + env and build the router the binary serves.
pub async fn app() -> anyhow::Result<Router> {
    let config = ServiceConfig::load()?;
    let store = Arc::new(ArtifactStore::from_paths(
        &config.artifacts.model_path,
        &config.artifacts.tokenizer_path,
    ));

    if config.artifacts.eager_load {
        let s = store.clone();
        tokio::task::spawn_blocking(move || s.warm_up())
            .await
            .context("artifact warm-up task failed")?;
        info!(
            model_loaded = store.model_loaded(),
            tokenizer_placeholder = store.tokenizer_is_placeholder(),
            "artifacts warmed up"
        );
    }

    build_app(&config, store)
}

/// Router over an already constructed artifact store.
pub fn build_app(config: &ServiceConfig, store: Arc<ArtifactStore>) -> anyhow::Result<Router> {
    let metrics = crate::metrics::Metrics::init()?;
    let pipeline = InferencePipeline::new(store, config.inference_settings());
    info!(
        max_sequence_length = config.inference.max_sequence_length,
        thresholds = %config.inference.thresholds,
        debug_routes = config.server.debug_routes,
        "sentiment service configured"
    );
    Ok(api::router(
        AppState::new(pipeline),
        &config.server,
        Some(&metrics),
    ))
}
