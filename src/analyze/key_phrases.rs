//! Key-phrase extraction.
//!
//! Order of the returned phrases:
//! 1. words from the label's lexicon, first occurrence order
//! 2. the ten most frequent words (count desc, ties by first occurrence)
//!    that are not already listed
//!
//! The combined list is truncated to [`MAX_KEY_PHRASES`].

use std::collections::{HashMap, HashSet};

use crate::lexicon;
use crate::sentiment::Sentiment;
use crate::text;

pub const MAX_KEY_PHRASES: usize = 5;
const COMMON_WORDS: usize = 10;

/// Returned alone when the review yields no usable words.
pub const NO_KEY_PHRASES: &str = "No specific key phrases identified.";

pub fn extract_key_phrases(review: &str, sentiment: Sentiment) -> Vec<String> {
    let words = text::tokens(review);
    let target = lexicon::for_sentiment(sentiment);

    let found = words.iter().filter(|w| target.contains(w.as_str()));
    let common = most_common(&words, COMMON_WORDS);

    let mut seen = HashSet::new();
    let phrases: Vec<String> = found
        .chain(common)
        .filter(|w| seen.insert(w.as_str()))
        .take(MAX_KEY_PHRASES)
        .cloned()
        .collect();

    if phrases.is_empty() {
        return vec![NO_KEY_PHRASES.to_string()];
    }
    phrases
}

/// Up to `n` distinct words by descending count; equal counts keep first-seen order.
fn most_common(words: &[String], n: usize) -> impl Iterator<Item = &String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&String> = Vec::new();
    for w in words {
        let c = counts.entry(w.as_str()).or_insert(0);
        if *c == 0 {
            order.push(w);
        }
        *c += 1;
    }
    // stable sort keeps first-occurrence order among ties
    order.sort_by(|a, b| counts[b.as_str()].cmp(&counts[a.as_str()]));
    order.into_iter().take(n)
}
