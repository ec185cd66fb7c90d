// src/config/service.rs
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::pipeline::{InferenceSettings, DEFAULT_MAX_SEQUENCE_LENGTH};
use crate::sentiment::Thresholds;

pub const DEFAULT_CONFIG_PATH: &str = "config/service.toml";
pub const ENV_CONFIG_PATH: &str = "SENTIMENT_CONFIG_PATH";

fn default_model_path() -> PathBuf {
    PathBuf::from("artifacts/sentiment_model.json")
}
fn default_tokenizer_path() -> PathBuf {
    PathBuf::from("artifacts/tokenizer.json")
}
fn default_max_sequence_length() -> usize {
    DEFAULT_MAX_SEQUENCE_LENGTH
}
fn default_thresholds() -> String {
    "wide".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "https://movie-sentiment-predictor.vercel.app".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_tokenizer_path")]
    pub tokenizer_path: PathBuf,
    /// Load both artifacts at startup instead of on the first request.
    #[serde(default)]
    pub eager_load: bool,
    #[serde(default)]
    pub allow_placeholder_tokenizer: bool,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            tokenizer_path: default_tokenizer_path(),
            eager_load: false,
            allow_placeholder_tokenizer: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,
    /// "wide" (0.66/0.33) | "narrow" (0.55/0.45). Model path only.
    #[serde(default = "default_thresholds")]
    pub thresholds: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_sequence_length: default_max_sequence_length(),
            thresholds: default_thresholds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Empty or containing "*" means any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub debug_routes: bool,
}

impl ServerConfig {
    pub fn cors_is_permissive(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o.trim() == "*")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cors_origins: default_cors_origins(),
            debug_routes: false,
        }
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

impl ServiceConfig {
    /// File from `SENTIMENT_CONFIG_PATH` (or the default path), then env overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut cfg = Self::load_from_file(&path)?;
        cfg.apply_overrides(|key| env::var(key).ok());
        cfg.sanitize();
        Ok(cfg)
    }

    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = match fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no service config file; using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read service config at {}", path.display())))
            }
        };
        let mut cfg = Self::from_toml_str(&data)
            .with_context(|| format!("Malformed service config at {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Apply `MODEL_PATH`, `TOKENIZER_PATH`, `MAX_SEQUENCE_LENGTH`,
    /// `SENTIMENT_THRESHOLDS`, `EAGER_LOAD` and `DEBUG_ROUTES` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(p) = lookup("MODEL_PATH").filter(|p| !p.trim().is_empty()) {
            self.artifacts.model_path = PathBuf::from(p);
        }
        if let Some(p) = lookup("TOKENIZER_PATH").filter(|p| !p.trim().is_empty()) {
            self.artifacts.tokenizer_path = PathBuf::from(p);
        }
        if let Some(v) = lookup("MAX_SEQUENCE_LENGTH") {
            match v.trim().parse::<usize>() {
                Ok(n) => self.inference.max_sequence_length = n,
                Err(_) => warn!(value = %v, "ignoring non-numeric MAX_SEQUENCE_LENGTH"),
            }
        }
        if let Some(v) = lookup("SENTIMENT_THRESHOLDS") {
            self.inference.thresholds = v;
        }
        if let Some(v) = lookup("EAGER_LOAD") {
            match parse_flag(&v) {
                Some(b) => self.artifacts.eager_load = b,
                None => warn!(value = %v, "ignoring unrecognized EAGER_LOAD"),
            }
        }
        if let Some(v) = lookup("DEBUG_ROUTES") {
            match parse_flag(&v) {
                Some(b) => self.server.debug_routes = b,
                None => warn!(value = %v, "ignoring unrecognized DEBUG_ROUTES"),
            }
        }
    }

    fn sanitize(&mut self) {
        if self.inference.max_sequence_length == 0 {
            self.inference.max_sequence_length = DEFAULT_MAX_SEQUENCE_LENGTH;
        }
        if Thresholds::from_preset(&self.inference.thresholds).is_none() {
            warn!(
                preset = %self.inference.thresholds,
                "unknown threshold preset; using wide"
            );
            self.inference.thresholds = default_thresholds();
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from_preset(&self.inference.thresholds).unwrap_or_default()
    }

    pub fn inference_settings(&self) -> InferenceSettings {
        InferenceSettings {
            max_sequence_length: self.inference.max_sequence_length,
            thresholds: self.thresholds(),
            allow_placeholder_tokenizer: self.artifacts.allow_placeholder_tokenizer,
        }
    }
}
