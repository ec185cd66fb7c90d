// src/artifacts/mod.rs
//! Process-wide model and tokenizer handles.
//!
//! Each artifact is loaded at most once, on first use or at startup via
//! [`ArtifactStore::warm_up`]. Concurrent first callers block on the same
//! initialization cell, so a bundle is never read twice. The outcome of that
//! single attempt is kept for the process lifetime: a failed load is not
//! retried and every request takes the lightweight path instead.

pub mod legacy;
pub mod model;
pub mod tokenizer;

use metrics::gauge;
use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::error::{ArtifactUnavailable, LoadError};

pub use model::{load_model, SentimentModel, SequenceModel};
pub use tokenizer::{load_tokenizer, Provenance, Tokenizer};

/// One named way of turning artifact bytes into a value.
pub struct Strategy<T> {
    pub name: &'static str,
    pub load: fn(&[u8]) -> Result<T, LoadError>,
}

/// Try `strategies` in order and return the first success with its name.
/// When all fail, the last error that is not [`LoadError::NotApplicable`] is
/// returned.
pub fn load_first<T>(
    bytes: &[u8],
    strategies: &[Strategy<T>],
) -> Result<(T, &'static str), LoadError> {
    let mut reported: Option<LoadError> = None;
    for s in strategies {
        match (s.load)(bytes) {
            Ok(v) => return Ok((v, s.name)),
            Err(e) => {
                tracing::debug!(strategy = s.name, error = %e, "load strategy failed");
                let keep_previous = matches!(e, LoadError::NotApplicable(_))
                    && reported
                        .as_ref()
                        .is_some_and(|r| !matches!(r, LoadError::NotApplicable(_)));
                if !keep_previous {
                    reported = Some(e);
                }
            }
        }
    }
    Err(reported
        .unwrap_or_else(|| LoadError::Incompatible("no load strategy configured".to_string())))
}

pub(crate) fn read_artifact(path: &Path) -> Result<Vec<u8>, LoadError> {
    fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

type ModelSlot = Result<Arc<dyn SentimentModel>, ArtifactUnavailable>;
type TokenizerSlot = Result<Arc<Tokenizer>, ArtifactUnavailable>;
type ModelLoader = fn(&Path) -> Result<Arc<dyn SentimentModel>, LoadError>;
type TokenizerLoader = fn(&Path) -> Tokenizer;

fn load_model_shared(path: &Path) -> Result<Arc<dyn SentimentModel>, LoadError> {
    let model = load_model(path)?;
    Ok(Arc::new(model))
}

/// Shared, read-only model/tokenizer pair.
pub struct ArtifactStore {
    model_path: PathBuf,
    tokenizer_path: PathBuf,
    load_model: ModelLoader,
    load_tokenizer: TokenizerLoader,
    model: OnceCell<ModelSlot>,
    tokenizer: OnceCell<TokenizerSlot>,
}

impl ArtifactStore {
    /// Lazily load both artifacts from disk on first use.
    pub fn from_paths(model_path: impl Into<PathBuf>, tokenizer_path: impl Into<PathBuf>) -> Self {
        Self::with_loaders(model_path, tokenizer_path, load_model_shared, load_tokenizer)
    }

    fn with_loaders(
        model_path: impl Into<PathBuf>,
        tokenizer_path: impl Into<PathBuf>,
        load_model: ModelLoader,
        load_tokenizer: TokenizerLoader,
    ) -> Self {
        Self {
            model_path: model_path.into(),
            tokenizer_path: tokenizer_path.into(),
            load_model,
            load_tokenizer,
            model: OnceCell::new(),
            tokenizer: OnceCell::new(),
        }
    }

    /// Store with artifacts supplied in memory; `None` means permanently unavailable.
    pub fn preloaded(model: Option<Arc<dyn SentimentModel>>, tokenizer: Option<Tokenizer>) -> Self {
        let missing = |artifact| ArtifactUnavailable {
            artifact,
            reason: "not provided".to_string(),
        };
        Self {
            model_path: PathBuf::new(),
            tokenizer_path: PathBuf::new(),
            load_model: load_model_shared,
            load_tokenizer,
            model: OnceCell::with_value(model.ok_or_else(|| missing("model"))),
            tokenizer: OnceCell::with_value(
                tokenizer.map(Arc::new).ok_or_else(|| missing("tokenizer")),
            ),
        }
    }

    pub fn model(&self) -> ModelSlot {
        self.model
            .get_or_init(|| {
                let slot: ModelSlot = (self.load_model)(&self.model_path).map_err(|e| {
                    warn!(
                        path = %self.model_path.display(),
                        error = %e,
                        "model unavailable; serving lightweight analysis only"
                    );
                    ArtifactUnavailable {
                        artifact: "model",
                        reason: e.to_string(),
                    }
                });
                gauge!("sentiment_artifact_loaded", "artifact" => "model")
                    .set(if slot.is_ok() { 1.0 } else { 0.0 });
                slot
            })
            .clone()
    }

    pub fn tokenizer(&self) -> TokenizerSlot {
        self.tokenizer
            .get_or_init(|| {
                let tok = (self.load_tokenizer)(&self.tokenizer_path);
                gauge!("sentiment_artifact_loaded", "artifact" => "tokenizer").set(1.0);
                Ok(Arc::new(tok))
            })
            .clone()
    }

    /// Load both artifacts now instead of on the first request.
    pub fn warm_up(&self) {
        let _ = self.model();
        let _ = self.tokenizer();
    }

    pub fn model_loaded(&self) -> bool {
        matches!(self.model.get(), Some(Ok(_)))
    }

    pub fn tokenizer_loaded(&self) -> bool {
        matches!(self.tokenizer.get(), Some(Ok(_)))
    }

    pub fn tokenizer_is_placeholder(&self) -> bool {
        matches!(self.tokenizer.get(), Some(Ok(t)) if t.is_placeholder())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    struct Fixed(f32);

    impl SentimentModel for Fixed {
        fn predict(&self, _sequence: &[u32]) -> Result<f32, InferenceError> {
            Ok(self.0)
        }
    }

    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_ok(_: &[u8]) -> Result<u32, LoadError> {
        CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(7)
    }

    fn always_err(_: &[u8]) -> Result<u32, LoadError> {
        Err(LoadError::Incompatible("nope".to_string()))
    }

    #[test]
    fn first_success_wins_and_later_strategies_are_skipped() {
        let strategies = [
            Strategy { name: "a", load: always_err },
            Strategy { name: "b", load: counting_ok },
            Strategy { name: "c", load: counting_ok },
        ];
        let before = CALLS.load(Ordering::SeqCst);
        let (v, name) = load_first(b"", &strategies).unwrap();
        assert_eq!((v, name), (7, "b"));
        assert_eq!(CALLS.load(Ordering::SeqCst) - before, 1);
    }

    fn not_applicable(_: &[u8]) -> Result<u32, LoadError> {
        Err(LoadError::NotApplicable("nothing to migrate".to_string()))
    }

    #[test]
    fn exhausted_chain_returns_last_error() {
        let strategies = [Strategy { name: "a", load: always_err }];
        let err = load_first(b"", &strategies).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn inapplicable_strategy_does_not_mask_the_real_error() {
        let strategies = [
            Strategy { name: "a", load: always_err },
            Strategy { name: "b", load: not_applicable },
        ];
        let err = load_first(b"", &strategies).unwrap_err();
        assert!(matches!(err, LoadError::Incompatible(ref m) if m == "nope"), "{err}");

        let only = [Strategy { name: "b", load: not_applicable }];
        let err = load_first(b"", &only).unwrap_err();
        assert!(matches!(err, LoadError::NotApplicable(_)), "{err}");
    }

    #[test]
    fn shape_error_is_the_reported_unavailability_reason() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        // Embedding emits 2 features; the LSTM kernel has a single row.
        let bundle = serde_json::json!({
            "layers": [
                {
                    "class_name": "Embedding",
                    "config": { "input_dim": 2, "output_dim": 2 },
                    "weights": { "embeddings": [[0.0, 0.0], [1.0, 1.0]] }
                },
                {
                    "class_name": "LSTM",
                    "config": { "name": "lstm", "units": 1 },
                    "weights": {
                        "kernel": [[0.5, 0.5, 0.5, 0.5]],
                        "recurrent_kernel": [[0.0, 0.0, 0.0, 0.0]],
                        "bias": [0.0, 0.0, 0.0, 0.0]
                    }
                },
                {
                    "class_name": "Dense",
                    "config": { "units": 1 },
                    "weights": { "kernel": [[1.0]], "bias": [0.0] }
                }
            ]
        });
        std::fs::write(&path, serde_json::to_vec(&bundle).unwrap()).unwrap();

        let store = ArtifactStore::from_paths(&path, dir.path().join("tokenizer.json"));
        let err = store.model().err().expect("bad kernel must not load");
        assert_eq!(err.artifact, "model");
        assert!(err.reason.contains("shape mismatch"), "{}", err.reason);
        assert!(err.reason.contains("lstm"), "{}", err.reason);
    }

    static MODEL_LOADS: AtomicUsize = AtomicUsize::new(0);
    static TOKENIZER_LOADS: AtomicUsize = AtomicUsize::new(0);

    fn slow_counting_model(_: &Path) -> Result<Arc<dyn SentimentModel>, LoadError> {
        MODEL_LOADS.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Ok(Arc::new(Fixed(0.7)))
    }

    fn slow_counting_tokenizer(path: &Path) -> Tokenizer {
        TOKENIZER_LOADS.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        load_tokenizer(path)
    }

    #[test]
    fn concurrent_first_calls_share_one_load() {
        const THREADS: usize = 16;
        let dir = tempfile::tempdir().unwrap();
        let tok_path = dir.path().join("tokenizer.json");
        let tok = serde_json::json!({
            "module": tokenizer::TOKENIZER_MODULE,
            "class_name": tokenizer::TOKENIZER_CLASS,
            "config": { "word_index": { "great": 1 } }
        });
        std::fs::write(&tok_path, serde_json::to_vec(&tok).unwrap()).unwrap();

        let store = ArtifactStore::with_loaders(
            dir.path().join("model.json"),
            &tok_path,
            slow_counting_model,
            slow_counting_tokenizer,
        );
        let barrier = Barrier::new(THREADS);

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        (store.model().unwrap(), store.tokenizer().unwrap())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(MODEL_LOADS.load(Ordering::SeqCst), 1);
        assert_eq!(TOKENIZER_LOADS.load(Ordering::SeqCst), 1);
        let (first_model, first_tok) = &results[0];
        assert!(!first_tok.is_placeholder());
        for (model, tok) in &results {
            assert!(Arc::ptr_eq(model, first_model));
            assert!(Arc::ptr_eq(tok, first_tok));
        }
    }

    #[test]
    fn missing_model_file_is_unavailable_and_not_retried() {
        let store = ArtifactStore::from_paths("no/such/model.json", "no/such/tokenizer.json");
        assert!(!store.model_loaded());
        let first = store.model();
        assert!(first.is_err());
        assert!(store.model.get().is_some(), "failure must be cached");
        assert!(!store.model_loaded());
    }

    #[test]
    fn missing_tokenizer_file_becomes_placeholder() {
        let store = ArtifactStore::from_paths("no/such/model.json", "no/such/tokenizer.json");
        store.warm_up();
        assert!(store.tokenizer_loaded());
        assert!(store.tokenizer_is_placeholder());
    }

    #[test]
    fn preloaded_store_serves_given_artifacts() {
        let store = ArtifactStore::preloaded(Some(Arc::new(Fixed(0.9))), None);
        assert!(store.model_loaded());
        assert!(!store.tokenizer_loaded());
        let model = store.model().unwrap();
        assert_eq!(model.predict(&[]).unwrap(), 0.9);
    }
}
