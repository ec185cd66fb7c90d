//! # Text Normalizer
//! Lowercases, keeps only ASCII letters and whitespace, and drops stopwords.
//!
//! Shared by the key-phrase extractor, the aspect scorer and the lightweight
//! classifier so that all three see exactly the same token stream.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static NON_ALPHA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z\s]").expect("non-alpha regex"));

/// Common English function words plus review noise ("movie", "film", "watch").
pub const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at",
    "by", "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
    "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no", "nor",
    "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will", "just",
    "don", "should", "now",
    // pronouns and auxiliaries
    "i", "me", "my", "we", "our", "you", "your", "he", "him", "his", "she", "her", "it", "its",
    "they", "them", "their", "this", "that", "these", "those", "is", "am", "are", "was", "were",
    "be", "been", "being", "have", "has", "had", "do", "does", "did", "what", "which", "who",
    // domain noise
    "movie", "film", "watch",
];

static STOPWORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOPWORDS.iter().copied().collect());

#[inline]
pub fn is_stopword(word: &str) -> bool {
    STOPWORD_SET.contains(word)
}

/// Normalized, whitespace-joined form of `text`. Empty when nothing survives.
pub fn normalize(text: &str) -> String {
    tokens(text).join(" ")
}

/// Token form of [`normalize`]; callers that count words use this directly.
pub fn tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let letters_only = NON_ALPHA.replace_all(&lowered, "");
    letters_only
        .split_whitespace()
        .filter(|w| !is_stopword(w))
        .map(str::to_string)
        .collect()
}
