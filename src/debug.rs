use axum::{extract::Query, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use crate::sentiment::{AnalysisResult, Method, Sentiment};
use crate::telemetry::anon_id;

const HISTORY_CAP: usize = 500;
const LAT_CAP: usize = 200;
const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub at: DateTime<Utc>,
    pub review_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movie_title: Option<String>,
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub method: Method,
}

#[derive(Default, Clone, Serialize)]
pub struct Stats {
    pub total_requests: u64,
    pub full_model: u64,
    pub lightweight: u64,
    pub error_fallback: u64,
    pub rejected: u64,
    pub rolling_avg_ms: Option<f64>,
    pub slowest_recent_ms: Option<u128>,
}

static HISTORY: Lazy<Mutex<VecDeque<AnalysisRecord>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(HISTORY_CAP)));
static STATS: Lazy<Mutex<Stats>> = Lazy::new(|| Mutex::new(Stats::default()));
static LAT_MS: Lazy<Mutex<VecDeque<u128>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(LAT_CAP)));

// Counters stay usable after a panic elsewhere while holding the lock.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/debug/history", get(history))
        .route("/debug/stats", get(stats))
}

/// Count one analysis by outcome method.
pub fn record_result(method: Method) {
    let mut s = lock(&STATS);
    s.total_requests += 1;
    match method {
        Method::FullModel => s.full_model += 1,
        Method::Lightweight => s.lightweight += 1,
        Method::ErrorFallback => s.error_fallback += 1,
    }
}

/// Count a request turned away by validation.
pub fn record_rejected() {
    let mut s = lock(&STATS);
    s.total_requests += 1;
    s.rejected += 1;
}

pub fn total_requests() -> u64 {
    lock(&STATS).total_requests
}

pub fn record_latency(lat_ms: u128) {
    let mut q = lock(&LAT_MS);
    if q.len() >= LAT_CAP {
        q.pop_front();
    }
    q.push_back(lat_ms);

    let mut s = lock(&STATS);
    let sum: u128 = q.iter().copied().sum();
    s.rolling_avg_ms = Some(sum as f64 / q.len() as f64);
    s.slowest_recent_ms = q.iter().copied().max();
}

pub fn record_analysis(review: &str, movie_title: Option<&str>, result: &AnalysisResult) {
    let mut h = lock(&HISTORY);
    if h.len() >= HISTORY_CAP {
        h.pop_front();
    }
    h.push_back(AnalysisRecord {
        at: Utc::now(),
        review_id: anon_id(review),
        movie_title: movie_title.map(str::to_string),
        sentiment: result.sentiment,
        confidence: result.confidence,
        method: result.method,
    });
}

async fn history(Query(q): Query<HistoryQuery>) -> Json<Vec<AnalysisRecord>> {
    let limit = q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let h = lock(&HISTORY);
    let start = h.len().saturating_sub(limit);
    Json(h.iter().skip(start).cloned().collect())
}

async fn stats() -> Json<Stats> {
    Json(lock(&STATS).clone())
}
