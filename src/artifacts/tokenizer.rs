//! Word-index tokenizer: encodes a review into a fixed-length id sequence the
//! way the trained vocabulary expects.
//!
//! Loading tries, in order:
//! 1. `standard`: the `(module, class_name)` tag must resolve as-is
//! 2. `migrated`: rewrite the tag through [`legacy::MODULE_MIGRATIONS`] and
//!    decode a string-encoded `word_index`, then resolve
//! 3. placeholder: empty vocabulary capped at [`PLACEHOLDER_VOCAB_CAPACITY`]
//!    words, flagged [`Provenance::Placeholder`]

use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

use super::legacy;
use super::{load_first, read_artifact, Strategy};
use crate::error::LoadError;

pub const TOKENIZER_MODULE: &str = "tensorflow.keras.preprocessing.text";
pub const TOKENIZER_CLASS: &str = "Tokenizer";
pub const PLACEHOLDER_VOCAB_CAPACITY: usize = 5000;

/// Characters replaced by the split string before splitting.
pub const DEFAULT_FILTERS: &str = "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~\t\n";

/// Where the vocabulary in use came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Current-format bundle, loaded as written.
    Trained,
    /// Historical bundle, loaded after tag migration.
    Migrated,
    /// Empty stand-in; does not reproduce the trained encoding.
    Placeholder,
}

#[derive(Debug, Deserialize)]
struct TokenizerBundle {
    module: String,
    class_name: String,
    config: TokenizerConfig,
}

fn default_true() -> bool {
    true
}

fn default_filters() -> String {
    DEFAULT_FILTERS.to_string()
}

fn default_split() -> String {
    " ".to_string()
}

#[derive(Debug, Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    num_words: Option<usize>,
    #[serde(default)]
    oov_token: Option<String>,
    #[serde(default = "default_true")]
    lower: bool,
    #[serde(default = "default_filters")]
    filters: String,
    #[serde(default = "default_split")]
    split: String,
    word_index: HashMap<String, u32>,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    word_index: HashMap<String, u32>,
    num_words: Option<usize>,
    oov_index: Option<u32>,
    lower: bool,
    filters: HashSet<char>,
    split: String,
    provenance: Provenance,
}

/* ----------------------------
Loading
---------------------------- */

const STRATEGIES: &[Strategy<Tokenizer>] = &[
    Strategy {
        name: "standard",
        load: load_standard,
    },
    Strategy {
        name: "migrated",
        load: load_migrated,
    },
];

/// Load the tokenizer at `path`, falling back to a placeholder vocabulary when
/// neither strategy can read it. Never fails; check [`Tokenizer::provenance`].
pub fn load_tokenizer(path: &Path) -> Tokenizer {
    let loaded = read_artifact(path).and_then(|bytes| load_first(&bytes, STRATEGIES));
    match loaded {
        Ok((tokenizer, strategy)) => {
            info!(
                path = %path.display(),
                strategy,
                words = tokenizer.word_index.len(),
                "tokenizer loaded"
            );
            tokenizer
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                capacity = PLACEHOLDER_VOCAB_CAPACITY,
                "tokenizer unreadable; using an empty placeholder vocabulary"
            );
            Tokenizer::placeholder()
        }
    }
}

fn load_standard(bytes: &[u8]) -> Result<Tokenizer, LoadError> {
    let bundle: TokenizerBundle = serde_json::from_slice(bytes)?;
    Tokenizer::from_bundle(bundle, Provenance::Trained)
}

fn load_migrated(bytes: &[u8]) -> Result<Tokenizer, LoadError> {
    let mut raw: Value = serde_json::from_slice(bytes)?;
    migrate_bundle(&mut raw)?;
    let bundle: TokenizerBundle = serde_json::from_value(raw)?;
    Tokenizer::from_bundle(bundle, Provenance::Migrated)
}

/// Rewrite the type tag and unpack a string-encoded `word_index` in place.
fn migrate_bundle(raw: &mut Value) -> Result<(), LoadError> {
    if let Some(module) = raw.get("module").and_then(Value::as_str) {
        let migrated = legacy::migrate_module(module).into_owned();
        raw["module"] = Value::String(migrated);
    }
    if let Some(Value::String(encoded)) = raw.pointer("/config/word_index") {
        let decoded: Value = serde_json::from_str(encoded)?;
        if let Some(slot) = raw.pointer_mut("/config/word_index") {
            *slot = decoded;
        }
    }
    Ok(())
}

impl Tokenizer {
    fn from_bundle(bundle: TokenizerBundle, provenance: Provenance) -> Result<Self, LoadError> {
        if bundle.module != TOKENIZER_MODULE || bundle.class_name != TOKENIZER_CLASS {
            return Err(LoadError::UnknownTypeTag {
                module: bundle.module,
                class_name: bundle.class_name,
            });
        }
        let cfg = bundle.config;
        if cfg.split.is_empty() {
            return Err(LoadError::Incompatible("empty split string".to_string()));
        }
        let oov_index = cfg
            .oov_token
            .as_ref()
            .and_then(|t| cfg.word_index.get(t).copied());
        Ok(Self {
            oov_index,
            num_words: cfg.num_words.filter(|&n| n > 0),
            lower: cfg.lower,
            filters: cfg.filters.chars().collect(),
            split: cfg.split,
            word_index: cfg.word_index,
            provenance,
        })
    }

    /// Empty vocabulary used when no persisted tokenizer can be read.
    pub fn placeholder() -> Self {
        Self {
            word_index: HashMap::new(),
            num_words: Some(PLACEHOLDER_VOCAB_CAPACITY),
            oov_index: None,
            lower: true,
            filters: DEFAULT_FILTERS.chars().collect(),
            split: default_split(),
            provenance: Provenance::Placeholder,
        }
    }

    /// Build a tokenizer directly from a word index (ids start at 1).
    /// A `num_words` of zero means no limit.
    pub fn from_word_index(
        word_index: HashMap<String, u32>,
        num_words: Option<usize>,
        oov_token: Option<&str>,
    ) -> Self {
        let oov_index = oov_token.and_then(|t| word_index.get(t).copied());
        Self {
            word_index,
            num_words: num_words.filter(|&n| n > 0),
            oov_index,
            lower: true,
            filters: DEFAULT_FILTERS.chars().collect(),
            split: default_split(),
            provenance: Provenance::Trained,
        }
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn is_placeholder(&self) -> bool {
        self.provenance == Provenance::Placeholder
    }

    pub fn vocab_len(&self) -> usize {
        self.word_index.len()
    }

    fn words(&self, text: &str) -> Vec<String> {
        let cased = if self.lower {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let mut filtered = String::with_capacity(cased.len());
        for c in cased.chars() {
            if self.filters.contains(&c) {
                filtered.push_str(&self.split);
            } else {
                filtered.push(c);
            }
        }
        filtered
            .split(self.split.as_str())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Ids for each known word. Words outside the vocabulary, or ranked at or
    /// beyond `num_words`, become the OOV id when one is configured and are
    /// dropped otherwise.
    pub fn texts_to_sequence(&self, text: &str) -> Vec<u32> {
        let mut out = Vec::new();
        for w in self.words(text) {
            match self.word_index.get(&w) {
                Some(&i) if self.num_words.is_some_and(|n| i as usize >= n) => {
                    out.extend(self.oov_index);
                }
                Some(&i) => out.push(i),
                None => out.extend(self.oov_index),
            }
        }
        out
    }

    /// Encode and left-pad/left-truncate to exactly `max_len` ids.
    pub fn encode(&self, text: &str, max_len: usize) -> Vec<u32> {
        pad_sequence(&self.texts_to_sequence(text), max_len)
    }
}

/// Zeros in front when short; keeps the last `max_len` ids when long.
pub fn pad_sequence(ids: &[u32], max_len: usize) -> Vec<u32> {
    if ids.len() >= max_len {
        return ids[ids.len() - max_len..].to_vec();
    }
    let mut out = vec![0u32; max_len - ids.len()];
    out.extend_from_slice(ids);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle(module: &str, word_index: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "module": module,
            "class_name": "Tokenizer",
            "config": {
                "num_words": 5,
                "oov_token": "<OOV>",
                "word_index": word_index
            }
        }))
        .unwrap()
    }

    fn index() -> Value {
        json!({ "<OOV>": 1, "the": 2, "great": 3, "acting": 4, "rare": 9 })
    }

    #[test]
    fn current_tag_loads_with_standard_strategy() {
        let (tok, strategy) =
            load_first(&bundle(TOKENIZER_MODULE, index()), STRATEGIES).unwrap();
        assert_eq!(strategy, "standard");
        assert_eq!(tok.provenance(), Provenance::Trained);
    }

    #[test]
    fn legacy_tag_and_string_index_are_migrated() {
        let encoded = Value::String(index().to_string());
        let raw = bundle("keras.src.preprocessing.text", encoded);
        assert!(load_standard(&raw).is_err());
        let (tok, strategy) = load_first(&raw, STRATEGIES).unwrap();
        assert_eq!(strategy, "migrated");
        assert_eq!(tok.provenance(), Provenance::Migrated);
        assert_eq!(tok.vocab_len(), 5);
    }

    #[test]
    fn unknown_class_is_rejected_by_both_strategies() {
        let raw = serde_json::to_vec(&json!({
            "module": "keras.preprocessing.sequence",
            "class_name": "TimeseriesGenerator",
            "config": { "word_index": {} }
        }))
        .unwrap();
        let err = load_first(&raw, STRATEGIES).unwrap_err();
        assert!(matches!(err, LoadError::UnknownTypeTag { .. }), "{err}");
    }

    #[test]
    fn encoding_follows_vocabulary_policy() {
        let (tok, _) = load_first(&bundle(TOKENIZER_MODULE, index()), STRATEGIES).unwrap();
        // "rare" has id 9 >= num_words 5 -> OOV; "unseen" -> OOV
        assert_eq!(
            tok.texts_to_sequence("The GREAT, acting! rare unseen"),
            vec![2, 3, 4, 1, 1]
        );
    }

    #[test]
    fn zero_num_words_means_unlimited() {
        let raw = serde_json::to_vec(&json!({
            "module": TOKENIZER_MODULE,
            "class_name": "Tokenizer",
            "config": { "num_words": 0, "word_index": index() }
        }))
        .unwrap();
        let (tok, _) = load_first(&raw, STRATEGIES).unwrap();
        assert_eq!(tok.texts_to_sequence("great rare"), vec![3, 9]);

        let wi: HashMap<String, u32> = [("great".to_string(), 1)].into_iter().collect();
        let tok = Tokenizer::from_word_index(wi, Some(0), None);
        assert_eq!(tok.encode("great", 2), vec![0, 1]);
    }

    #[test]
    fn without_oov_token_unknown_words_are_dropped() {
        let mut wi = HashMap::new();
        wi.insert("great".to_string(), 1);
        let tok = Tokenizer::from_word_index(wi, None, None);
        assert_eq!(tok.texts_to_sequence("great unseen great"), vec![1, 1]);
    }

    #[test]
    fn padding_is_pre_and_truncation_keeps_the_tail() {
        assert_eq!(pad_sequence(&[7, 8], 4), vec![0, 0, 7, 8]);
        assert_eq!(pad_sequence(&[1, 2, 3, 4, 5], 3), vec![3, 4, 5]);
        assert_eq!(pad_sequence(&[], 2), vec![0, 0]);
    }

    #[test]
    fn missing_file_yields_placeholder() {
        let tok = load_tokenizer(Path::new("definitely/not/here/tokenizer.json"));
        assert!(tok.is_placeholder());
        assert_eq!(tok.encode("great acting", 3), vec![0, 0, 0]);
    }
}
