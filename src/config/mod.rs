// src/config/mod.rs
pub mod service;

pub use service::{ArtifactsConfig, InferenceConfig, ServerConfig, ServiceConfig};
