//! Hand-curated keyword sets tuned to movie reviews.
//!
//! Polarity lexicons drive the lightweight classifier and key-phrase
//! extraction; aspect lexicons drive per-aspect scoring.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::sentiment::Sentiment;

pub const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "amazing", "wonderful", "best", "love", "awesome", "fantastic",
    "enjoyed", "favorite", "perfect", "brilliant", "superb", "outstanding", "masterpiece",
    "beautiful", "recommend",
];

pub const NEGATIVE_WORDS: &[&str] = &[
    "bad", "worst", "terrible", "awful", "boring", "waste", "poor", "disappointing", "horrible",
    "hate", "stupid", "ridiculous", "worse", "dull", "mediocre", "fails", "avoid", "mess",
    "disaster",
];

// "so-so" can never match after normalization strips the hyphen; kept for parity
// with the curated list.
pub const NEUTRAL_WORDS: &[&str] = &[
    "okay", "average", "decent", "fine", "alright", "fair", "moderate", "passable", "acceptable",
    "ordinary", "standard", "middle", "mixed", "balanced", "neutral", "so-so", "neither",
    "somewhat",
];

/// Aspect name and its keyword list, in the order aspects are reported.
pub const ASPECTS: &[(&str, &[&str])] = &[
    (
        "Emotional Impact",
        &[
            "emotional", "moving", "touching", "powerful", "sad", "happy", "feel", "felt", "heart",
            "tears",
        ],
    ),
    (
        "Acting Quality",
        &["acting", "actor", "actress", "performance", "cast", "played", "role", "character"],
    ),
    (
        "Plot & Story",
        &["plot", "story", "script", "screenplay", "narrative", "twist", "ending", "predictable"],
    ),
    (
        "Visual Appeal",
        &["visual", "cinematography", "beautiful", "stunning", "effects", "cgi", "scene", "shot"],
    ),
    (
        "Entertainment Value",
        &["entertaining", "enjoyable", "fun", "boring", "exciting", "thrill", "laugh", "comedy"],
    ),
];

/// Entry reported when no aspect keyword matches.
pub const GENERAL_ASPECT: &str = "General";

fn set_of(words: &'static [&'static str]) -> HashSet<&'static str> {
    words.iter().copied().collect()
}

static POSITIVE: Lazy<HashSet<&'static str>> = Lazy::new(|| set_of(POSITIVE_WORDS));
static NEGATIVE: Lazy<HashSet<&'static str>> = Lazy::new(|| set_of(NEGATIVE_WORDS));
static NEUTRAL: Lazy<HashSet<&'static str>> = Lazy::new(|| set_of(NEUTRAL_WORDS));

#[inline]
pub fn is_positive(word: &str) -> bool {
    POSITIVE.contains(word)
}

#[inline]
pub fn is_negative(word: &str) -> bool {
    NEGATIVE.contains(word)
}

/// Lexicon whose words explain a given label.
pub fn for_sentiment(sentiment: Sentiment) -> &'static HashSet<&'static str> {
    match sentiment {
        Sentiment::Positive => &POSITIVE,
        Sentiment::Negative => &NEGATIVE,
        Sentiment::Neutral => &NEUTRAL,
    }
}
