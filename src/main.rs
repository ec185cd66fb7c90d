//! Movie Sentiment Service: binary entrypoint
//! Boots the Axum HTTP server under the Shuttle runtime.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    movie_sentiment_service::telemetry::init_tracing();

    let router = movie_sentiment_service::app().await?;
    Ok(router.into())
}
