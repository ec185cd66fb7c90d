// src/pipeline.rs
//! Review analysis with graceful degradation.
//!
//! The model path is tried first; any missing artifact or inference failure
//! hands the review to the [`LightweightClassifier`] instead. Only an empty
//! review is rejected.

use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::artifacts::{ArtifactStore, SentimentModel, Tokenizer};
use crate::error::{AnalysisError, ArtifactUnavailable, InferenceError};
use crate::sentiment::{AnalysisResult, LightweightClassifier, Method, Thresholds};
use crate::telemetry::anon_id;

pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 200;
/// Sequence length some older model bundles were trained with.
pub const LEGACY_MAX_SEQUENCE_LENGTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceSettings {
    pub max_sequence_length: usize,
    /// Applied to model scores only; the keyword path always uses [`Thresholds::WIDE`].
    pub thresholds: Thresholds,
    /// Run the model even when only the placeholder vocabulary is available.
    pub allow_placeholder_tokenizer: bool,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
            thresholds: Thresholds::WIDE,
            allow_placeholder_tokenizer: false,
        }
    }
}

/// Why a request did not get a model answer.
#[derive(Debug)]
enum Degradation {
    Unavailable(ArtifactUnavailable),
    PlaceholderTokenizer,
    Inference(InferenceError),
}

impl Degradation {
    fn reason(&self) -> &'static str {
        match self {
            Degradation::Unavailable(_) => "artifact_unavailable",
            Degradation::PlaceholderTokenizer => "placeholder_tokenizer",
            Degradation::Inference(_) => "inference_error",
        }
    }
}

#[derive(Clone)]
pub struct InferencePipeline {
    artifacts: Arc<ArtifactStore>,
    settings: InferenceSettings,
    lightweight: LightweightClassifier,
}

impl InferencePipeline {
    pub fn new(artifacts: Arc<ArtifactStore>, settings: InferenceSettings) -> Self {
        Self {
            artifacts,
            settings,
            lightweight: LightweightClassifier::new(),
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    /// Analyze one review. Fails only for blank input.
    pub fn analyze(
        &self,
        review: &str,
        force_lightweight: bool,
    ) -> Result<AnalysisResult, AnalysisError> {
        if review.trim().is_empty() {
            return Err(AnalysisError::Validation);
        }
        if force_lightweight {
            return Ok(self.lightweight.classify(review));
        }
        match self.run_model(review) {
            Ok(result) => Ok(result),
            Err(d) => {
                let review_id = anon_id(review);
                match &d {
                    Degradation::Unavailable(e) => {
                        // Already warned once at load time.
                        debug!(%review_id, reason = d.reason(), error = %e, "lightweight fallback");
                    }
                    Degradation::PlaceholderTokenizer => {
                        warn!(%review_id, reason = d.reason(), "lightweight fallback");
                    }
                    Degradation::Inference(e) => {
                        warn!(%review_id, reason = d.reason(), error = %e, "lightweight fallback");
                    }
                }
                counter!("sentiment_degradations_total", "reason" => d.reason()).increment(1);
                Ok(self.lightweight.classify(review))
            }
        }
    }

    fn run_model(&self, review: &str) -> Result<AnalysisResult, Degradation> {
        // Resolve both so health reflects each artifact after the first request.
        let (model, tokenizer) = (self.artifacts.model(), self.artifacts.tokenizer());
        let model = model.map_err(Degradation::Unavailable)?;
        let tokenizer = tokenizer.map_err(Degradation::Unavailable)?;
        if tokenizer.is_placeholder() && !self.settings.allow_placeholder_tokenizer {
            return Err(Degradation::PlaceholderTokenizer);
        }
        let score = self
            .predict(model.as_ref(), &tokenizer, review)
            .map_err(Degradation::Inference)?;
        let sentiment = self.settings.thresholds.label(score);
        Ok(AnalysisResult::from_score(
            review,
            score,
            sentiment,
            Method::FullModel,
        ))
    }

    fn predict(
        &self,
        model: &dyn SentimentModel,
        tokenizer: &Tokenizer,
        review: &str,
    ) -> Result<f64, InferenceError> {
        let sequence = tokenizer.encode(review, self.settings.max_sequence_length);
        let raw = model.predict(&sequence)?;
        if !raw.is_finite() {
            return Err(InferenceError::NonFinite(raw));
        }
        Ok(f64::from(raw).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::Sentiment;
    use std::collections::HashMap;

    struct Fixed(f32);

    impl SentimentModel for Fixed {
        fn predict(&self, _sequence: &[u32]) -> Result<f32, InferenceError> {
            Ok(self.0)
        }
    }

    struct Broken;

    impl SentimentModel for Broken {
        fn predict(&self, _sequence: &[u32]) -> Result<f32, InferenceError> {
            Err(InferenceError::Shape("kernel rows 3 != 2".to_string()))
        }
    }

    fn vocab() -> Tokenizer {
        let wi: HashMap<String, u32> = [("great", 1), ("acting", 2)]
            .into_iter()
            .map(|(w, i)| (w.to_string(), i))
            .collect();
        Tokenizer::from_word_index(wi, None, None)
    }

    fn pipeline(model: Option<Arc<dyn SentimentModel>>, tok: Option<Tokenizer>) -> InferencePipeline {
        InferencePipeline::new(
            Arc::new(ArtifactStore::preloaded(model, tok)),
            InferenceSettings::default(),
        )
    }

    #[test]
    fn blank_review_is_rejected_on_both_paths() {
        let p = pipeline(None, None);
        for force in [false, true] {
            assert!(matches!(p.analyze("", force), Err(AnalysisError::Validation)));
            assert!(matches!(p.analyze(" \t\n", force), Err(AnalysisError::Validation)));
        }
    }

    #[test]
    fn model_score_is_labelled_with_configured_thresholds() {
        let p = pipeline(Some(Arc::new(Fixed(0.9))), Some(vocab()));
        let r = p.analyze("great acting", false).unwrap();
        assert_eq!(r.method, Method::FullModel);
        assert_eq!(r.sentiment, Sentiment::Positive);
        assert!((r.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn inference_failure_degrades_to_keywords() {
        let p = pipeline(Some(Arc::new(Broken)), Some(vocab()));
        let r = p.analyze("great acting", false).unwrap();
        assert_eq!(r, LightweightClassifier::new().classify("great acting"));
    }

    #[test]
    fn non_finite_score_degrades() {
        let p = pipeline(Some(Arc::new(Fixed(f32::NAN))), Some(vocab()));
        assert_eq!(p.analyze("great", false).unwrap().method, Method::Lightweight);
    }

    #[test]
    fn placeholder_vocabulary_is_opt_in() {
        let p = pipeline(Some(Arc::new(Fixed(0.1))), Some(Tokenizer::placeholder()));
        assert_eq!(p.analyze("great", false).unwrap().method, Method::Lightweight);

        let store = ArtifactStore::preloaded(Some(Arc::new(Fixed(0.1))), Some(Tokenizer::placeholder()));
        let settings = InferenceSettings {
            allow_placeholder_tokenizer: true,
            ..InferenceSettings::default()
        };
        let p = InferencePipeline::new(Arc::new(store), settings);
        let r = p.analyze("great", false).unwrap();
        assert_eq!(r.method, Method::FullModel);
        assert_eq!(r.sentiment, Sentiment::Negative);
    }
}
