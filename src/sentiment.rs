//! # Sentiment
//! Result types shared by both analysis paths, the labelling thresholds, and
//! the keyword-ratio [`LightweightClassifier`] used whenever the model path is
//! unavailable, fails, or is bypassed on request.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::analyze::{analyze_aspects, extract_key_phrases};
use crate::{lexicon, text};

/// Overall polarity label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

/// Which path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    FullModel,
    Lightweight,
    ErrorFallback,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::FullModel => "full_model",
            Method::Lightweight => "lightweight",
            Method::ErrorFallback => "error_fallback",
        }
    }
}

/// Score cut-offs: `score > positive_above` is positive, `score < negative_below`
/// is negative, anything in between is neutral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub positive_above: f64,
    pub negative_below: f64,
}

impl Thresholds {
    /// Default for the model path and the only pair the keyword path uses.
    pub const WIDE: Thresholds = Thresholds {
        positive_above: 0.66,
        negative_below: 0.33,
    };
    /// Tighter neutral band; selectable for the model path only.
    pub const NARROW: Thresholds = Thresholds {
        positive_above: 0.55,
        negative_below: 0.45,
    };

    pub fn label(&self, score: f64) -> Sentiment {
        if score > self.positive_above {
            Sentiment::Positive
        } else if score < self.negative_below {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }

    /// Parse a preset name (`wide` | `narrow`), case-insensitive.
    pub fn from_preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "wide" => Some(Self::WIDE),
            "narrow" => Some(Self::NARROW),
            _ => None,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::WIDE
    }
}

/// One named aspect score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AspectScore {
    pub aspect: String,
    pub score: f64,
}

/// Aspect scores in report order. Serialized as a JSON object whose keys keep
/// that order, so radar-style consumers get a stable axis layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AspectScores(pub Vec<AspectScore>);

impl AspectScores {
    pub fn get(&self, aspect: &str) -> Option<f64> {
        self.0.iter().find(|a| a.aspect == aspect).map(|a| a.score)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for AspectScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for a in &self.0 {
            map.serialize_entry(&a.aspect, &a.score)?;
        }
        map.end()
    }
}

/// Per-request analysis outcome returned by `POST /analyze`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub key_phrases: Vec<String>,
    pub aspect_scores: AspectScores,
    pub method: Method,
}

impl AnalysisResult {
    /// Attach heuristics to a score produced by either path.
    pub fn from_score(review: &str, score: f64, sentiment: Sentiment, method: Method) -> Self {
        Self {
            sentiment,
            confidence: score,
            key_phrases: extract_key_phrases(review, sentiment),
            aspect_scores: analyze_aspects(review, score),
            method,
        }
    }
}

/// Keyword-ratio classifier. Needs no artifact and cannot fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightweightClassifier;

impl LightweightClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Returns `(positive_hits, negative_hits)` over the normalized tokens.
    pub fn polarity_counts(&self, review: &str) -> (usize, usize) {
        text::tokens(review)
            .iter()
            .fold((0, 0), |(pos, neg), w| {
                (
                    pos + usize::from(lexicon::is_positive(w)),
                    neg + usize::from(lexicon::is_negative(w)),
                )
            })
    }

    /// Share of positive hits among all polarity hits; 0.5 when there are none.
    pub fn score(&self, review: &str) -> f64 {
        let (pos, neg) = self.polarity_counts(review);
        let total = pos + neg;
        if total == 0 {
            0.5
        } else {
            pos as f64 / total as f64
        }
    }

    pub fn classify(&self, review: &str) -> AnalysisResult {
        let score = self.score(review);
        let sentiment = Thresholds::WIDE.label(score);
        AnalysisResult::from_score(review, score, sentiment, Method::Lightweight)
    }
}
