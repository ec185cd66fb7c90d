// tests/pipeline_fallback.rs
//
// Degradation behavior of the inference pipeline with in-memory artifacts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use movie_sentiment_service::artifacts::{ArtifactStore, SentimentModel, Tokenizer};
use movie_sentiment_service::error::{AnalysisError, InferenceError};
use movie_sentiment_service::pipeline::{InferencePipeline, InferenceSettings};
use movie_sentiment_service::sentiment::{LightweightClassifier, Method, Sentiment, Thresholds};

/// Returns a fixed score and counts calls.
struct StubModel {
    score: f32,
    calls: AtomicUsize,
}

impl StubModel {
    fn new(score: f32) -> Arc<Self> {
        Arc::new(Self {
            score,
            calls: AtomicUsize::new(0),
        })
    }
}

impl SentimentModel for StubModel {
    fn predict(&self, _sequence: &[u32]) -> Result<f32, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.score)
    }
}

/// Scores 1.0 only for sequences padded to 100 ids.
struct LengthSensitive;

impl SentimentModel for LengthSensitive {
    fn predict(&self, sequence: &[u32]) -> Result<f32, InferenceError> {
        Ok(if sequence.len() == 100 { 1.0 } else { 0.0 })
    }
}

struct Failing;

impl SentimentModel for Failing {
    fn predict(&self, sequence: &[u32]) -> Result<f32, InferenceError> {
        Err(InferenceError::TokenOutOfRange {
            index: sequence.iter().copied().max().unwrap_or(0) as usize,
            vocab: 1,
        })
    }
}

fn vocab() -> Tokenizer {
    let wi: HashMap<String, u32> = ["great", "acting", "plot"]
        .iter()
        .enumerate()
        .map(|(i, w)| (w.to_string(), i as u32 + 1))
        .collect();
    Tokenizer::from_word_index(wi, None, None)
}

fn pipeline_with(model: Option<Arc<dyn SentimentModel>>, settings: InferenceSettings) -> InferencePipeline {
    InferencePipeline::new(
        Arc::new(ArtifactStore::preloaded(model, Some(vocab()))),
        settings,
    )
}

const REVIEWS: &[&str] = &[
    "I loved this film, the acting was great",
    "bad terrible awful",
    "The plot was fine, nothing special",
    "12345 !!! ???",
];

#[test]
fn forced_lightweight_matches_classifier_exactly_and_skips_model() {
    let stub = StubModel::new(0.99);
    let p = pipeline_with(Some(stub.clone()), InferenceSettings::default());
    let classifier = LightweightClassifier::new();

    for review in REVIEWS {
        let r = p.analyze(review, true).expect("non-empty review");
        assert_eq!(r.method, Method::Lightweight);
        assert_eq!(r, classifier.classify(review));
    }
    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unavailable_model_is_transparent_to_the_caller() {
    let p = pipeline_with(None, InferenceSettings::default());
    for review in REVIEWS {
        let r = p.analyze(review, false).expect("degraded, not failed");
        assert_eq!(r.method, Method::Lightweight);
        assert_eq!(r, LightweightClassifier::new().classify(review));
    }
}

#[test]
fn unavailable_tokenizer_also_degrades() {
    let store = ArtifactStore::preloaded(Some(StubModel::new(0.9)), None);
    let p = InferencePipeline::new(Arc::new(store), InferenceSettings::default());
    assert_eq!(p.analyze("great", false).unwrap().method, Method::Lightweight);
}

#[test]
fn inference_error_degrades_per_request() {
    let p = pipeline_with(Some(Arc::new(Failing)), InferenceSettings::default());
    let r = p.analyze("great acting", false).unwrap();
    assert_eq!(r.method, Method::Lightweight);
    assert_eq!(r.sentiment, Sentiment::Positive);
}

#[test]
fn validation_wins_over_everything() {
    let p = pipeline_with(Some(StubModel::new(0.9)), InferenceSettings::default());
    for review in ["", "   ", "\n\t"] {
        for force in [true, false] {
            assert!(matches!(p.analyze(review, force), Err(AnalysisError::Validation)));
        }
    }
}

#[test]
fn model_path_thresholds_are_configurable() {
    let wide = pipeline_with(Some(StubModel::new(0.6)), InferenceSettings::default());
    let narrow = pipeline_with(
        Some(StubModel::new(0.6)),
        InferenceSettings {
            thresholds: Thresholds::NARROW,
            ..InferenceSettings::default()
        },
    );

    let w = wide.analyze("the plot", false).unwrap();
    let n = narrow.analyze("the plot", false).unwrap();
    assert_eq!(w.method, Method::FullModel);
    assert_eq!(w.sentiment, Sentiment::Neutral);
    assert_eq!(n.sentiment, Sentiment::Positive);
    assert!((w.confidence - 0.6).abs() < 1e-6);
}

#[test]
fn lightweight_path_ignores_narrow_thresholds() {
    // 3 positive / 2 negative = 0.6: positive under narrow, neutral under wide
    let review = "great superb excellent but dull boring";
    let narrow = pipeline_with(
        None,
        InferenceSettings {
            thresholds: Thresholds::NARROW,
            ..InferenceSettings::default()
        },
    );
    let r = narrow.analyze(review, false).unwrap();
    assert_eq!(r.method, Method::Lightweight);
    assert_eq!(r.sentiment, Sentiment::Neutral);
}

#[test]
fn sequence_length_is_configurable() {
    let legacy = pipeline_with(
        Some(Arc::new(LengthSensitive)),
        InferenceSettings {
            max_sequence_length: 100,
            ..InferenceSettings::default()
        },
    );
    let default = pipeline_with(Some(Arc::new(LengthSensitive)), InferenceSettings::default());
    assert_eq!(legacy.analyze("great", false).unwrap().confidence, 1.0);
    assert_eq!(default.analyze("great", false).unwrap().confidence, 0.0);
}

#[test]
fn out_of_range_model_scores_are_clamped() {
    let p = pipeline_with(Some(StubModel::new(1.7)), InferenceSettings::default());
    let r = p.analyze("great", false).unwrap();
    assert_eq!(r.method, Method::FullModel);
    assert_eq!(r.confidence, 1.0);
}

#[test]
fn placeholder_tokenizer_degrades_unless_allowed() {
    let stub = StubModel::new(0.1);
    let store = Arc::new(ArtifactStore::preloaded(
        Some(stub.clone()),
        Some(Tokenizer::placeholder()),
    ));
    assert!(store.tokenizer_is_placeholder());

    let strict = InferencePipeline::new(store.clone(), InferenceSettings::default());
    assert_eq!(strict.analyze("great", false).unwrap().method, Method::Lightweight);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);

    let lenient = InferencePipeline::new(
        store,
        InferenceSettings {
            allow_placeholder_tokenizer: true,
            ..InferenceSettings::default()
        },
    );
    assert_eq!(lenient.analyze("great", false).unwrap().method, Method::FullModel);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
}
