// src/analyze/mod.rs
//! Keyword heuristics layered on top of a sentiment label/score:
//! key-phrase extraction and per-aspect scoring. Both are pure functions of
//! the review text and the label/score produced by whichever path ran.

pub mod aspects;
pub mod key_phrases;

pub use crate::analyze::aspects::analyze_aspects;
pub use crate::analyze::key_phrases::{extract_key_phrases, NO_KEY_PHRASES};
