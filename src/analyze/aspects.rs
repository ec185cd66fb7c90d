//! Per-aspect scoring.
//!
//! Every aspect with at least one keyword hit gets
//! `0.5 + 0.1 * hits` when the base score leans positive (> 0.5) and
//! `0.5 - 0.1 * hits` otherwise, clamped to `[0, 1]`. With no hits at all the
//! result is a single `General` entry carrying the base score.

use crate::lexicon::{ASPECTS, GENERAL_ASPECT};
use crate::sentiment::{AspectScore, AspectScores};
use crate::text;

const STEP_PER_HIT: f64 = 0.1;

pub fn analyze_aspects(review: &str, sentiment_score: f64) -> AspectScores {
    let words = text::tokens(review);

    let scores: Vec<AspectScore> = ASPECTS
        .iter()
        .filter_map(|(aspect, keywords)| {
            let hits = words.iter().filter(|w| keywords.contains(&w.as_str())).count();
            (hits > 0).then(|| AspectScore {
                aspect: (*aspect).to_string(),
                score: aspect_score(sentiment_score, hits),
            })
        })
        .collect();

    if scores.is_empty() {
        return AspectScores(vec![AspectScore {
            aspect: GENERAL_ASPECT.to_string(),
            score: sentiment_score,
        }]);
    }
    AspectScores(scores)
}

fn aspect_score(sentiment_score: f64, hits: usize) -> f64 {
    let delta = STEP_PER_HIT * hits as f64;
    if sentiment_score > 0.5 {
        (0.5 + delta).clamp(0.0, 1.0)
    } else {
        (0.5 - delta).clamp(0.0, 1.0)
    }
}
