//! Core engine settings

pub mod config;

pub use config::{EngineConfig, LoggingConfig, PickingConfig, RendererConfig, ShadowMapConfig};
