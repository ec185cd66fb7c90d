//! Compatibility tables for artifacts written by older exporters.
//!
//! Both tables are plain data: adding support for another historical layout
//! means adding a row, not a branch.

use serde_json::Value;
use std::borrow::Cow;

/// How a recorded type tag is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatch {
    Exact,
    Prefix,
}

/// Rewrite of an obsolete module path to its current name.
#[derive(Debug, Clone, Copy)]
pub struct TagRewrite {
    pub matches: TagMatch,
    pub from: &'static str,
    pub to: &'static str,
}

/// Module-path migrations, checked in order; the first match wins.
pub const MODULE_MIGRATIONS: &[TagRewrite] = &[
    TagRewrite {
        matches: TagMatch::Exact,
        from: "keras.preprocessing.text",
        to: "tensorflow.keras.preprocessing.text",
    },
    TagRewrite {
        matches: TagMatch::Exact,
        from: "keras.src.preprocessing.text",
        to: "tensorflow.keras.preprocessing.text",
    },
    TagRewrite {
        matches: TagMatch::Exact,
        from: "keras.src.preprocessing",
        to: "tensorflow.keras.preprocessing",
    },
    TagRewrite {
        matches: TagMatch::Prefix,
        from: "keras.src.",
        to: "tensorflow.keras.",
    },
];

/// Rewrite `module` through [`MODULE_MIGRATIONS`]; unknown paths pass through.
pub fn migrate_module(module: &str) -> Cow<'_, str> {
    for rule in MODULE_MIGRATIONS {
        match rule.matches {
            TagMatch::Exact if module == rule.from => return Cow::Borrowed(rule.to),
            TagMatch::Prefix => {
                if let Some(rest) = module.strip_prefix(rule.from) {
                    return Cow::Owned(format!("{}{}", rule.to, rest));
                }
            }
            _ => {}
        }
    }
    Cow::Borrowed(module)
}

/// Layer config fields that older exporters wrote and current layers no longer accept.
pub const DEPRECATED_LAYER_FIELDS: &[(&str, &[&str])] = &[
    ("LSTM", &["time_major"]),
    ("GRU", &["time_major"]),
    ("SimpleRNN", &["time_major"]),
];

/// Remove deprecated config fields from every layer of a model bundle in place.
/// Returns how many fields were dropped.
pub fn strip_deprecated_fields(bundle: &mut Value) -> usize {
    let Some(layers) = bundle.get_mut("layers").and_then(Value::as_array_mut) else {
        return 0;
    };

    let mut dropped = 0;
    for layer in layers {
        let class_name = layer
            .get("class_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let Some((_, fields)) = DEPRECATED_LAYER_FIELDS
            .iter()
            .find(|(class, _)| *class == class_name)
        else {
            continue;
        };
        if let Some(config) = layer.get_mut("config").and_then(Value::as_object_mut) {
            for field in *fields {
                if config.remove(*field).is_some() {
                    dropped += 1;
                }
            }
        }
    }
    dropped
}
