//! # Unified Configuration System
//!
//! Typed settings for the renderer, the raycaster and logging, grouped under
//! [`EngineConfig`]. Every section has sensible defaults, so a partial file
//! (or no file at all) is valid.
//!
//! ## Configuration Categories
//!
//! - **Renderer Config**: output color space, tone mapping, sorting, shadows
//! - **Picking Config**: raycaster defaults
//! - **Logging Config**: logger filter

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};
use crate::render::constants::{ColorSpace, Precision, ShadowMapType, ToneMapping};

/// Shadow map settings
///
/// Shadow passes are not rendered by this crate; these values only select
/// shader variants for receiving materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowMapConfig {
    /// Whether shadow sampling code is compiled in
    pub enabled: bool,
    /// Filtering technique
    pub kind: ShadowMapType,
}

/// # Renderer Configuration
///
/// Output and quality settings that apply to every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Color space of the output framebuffer
    pub output_color_space: ColorSpace,
    /// Tone mapping operator
    pub tone_mapping: ToneMapping,
    /// Exposure used by tone mapping
    pub tone_mapping_exposure: f32,
    /// Sort render lists (disable to draw in traversal order)
    pub sort_objects: bool,
    /// Honor per-material clipping planes
    pub local_clipping_enabled: bool,
    /// Shadow settings
    pub shadow_map: ShadowMapConfig,
    /// Shader float precision
    pub precision: Precision,
    /// Let the backend compile programs asynchronously
    pub parallel_shader_compile: bool,
    /// Clear color/depth/stencil at the start of each frame
    pub auto_clear: bool,
    /// RGBA clear color
    pub clear_color: [f32; 4],
    /// Device pixel ratio applied to the drawing buffer size
    pub pixel_ratio: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            output_color_space: ColorSpace::Srgb,
            tone_mapping: ToneMapping::None,
            tone_mapping_exposure: 1.0,
            sort_objects: true,
            local_clipping_enabled: false,
            shadow_map: ShadowMapConfig::default(),
            precision: Precision::High,
            parallel_shader_compile: false,
            auto_clear: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            pixel_ratio: 1.0,
        }
    }
}

impl RendererConfig {
    /// Set tone mapping operator and exposure
    pub fn with_tone_mapping(mut self, tone_mapping: ToneMapping, exposure: f32) -> Self {
        self.tone_mapping = tone_mapping;
        self.tone_mapping_exposure = exposure;
        self
    }

    /// Set output color space
    pub fn with_output_color_space(mut self, color_space: ColorSpace) -> Self {
        self.output_color_space = color_space;
        self
    }

    /// Enable shadow sampling with the given filter
    pub fn with_shadows(mut self, kind: ShadowMapType) -> Self {
        self.shadow_map = ShadowMapConfig { enabled: true, kind };
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.pixel_ratio.is_nan() || self.pixel_ratio <= 0.0 {
            return Err(format!("Pixel ratio must be positive, got {}", self.pixel_ratio));
        }
        if self.tone_mapping_exposure.is_nan() || self.tone_mapping_exposure < 0.0 {
            return Err(format!("Exposure must be non-negative, got {}", self.tone_mapping_exposure));
        }
        Ok(())
    }
}

/// Raycaster defaults
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickingConfig {
    /// Minimum hit distance
    pub near: f32,
    /// Maximum hit distance
    pub far: f32,
    /// World-space distance within which a line counts as hit
    pub line_threshold: f32,
    /// World-space distance within which a point counts as hit
    pub points_threshold: f32,
}

impl Default for PickingConfig {
    fn default() -> Self {
        Self {
            near: 0.0,
            far: f32::INFINITY,
            line_threshold: 1.0,
            points_threshold: 1.0,
        }
    }
}

impl PickingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.near < 0.0 || self.far < self.near {
            return Err(format!("Invalid picking range {}..{}", self.near, self.far));
        }
        if self.line_threshold < 0.0 || self.points_threshold < 0.0 {
            return Err("Picking thresholds must be non-negative".to_string());
        }
        Ok(())
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter in `RUST_LOG` syntax
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "info".to_string() }
    }
}

/// # Engine Configuration
///
/// Aggregate of every settings section; loadable from TOML or RON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Renderer settings
    pub renderer: RendererConfig,
    /// Raycaster defaults
    pub picking: PickingConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.renderer.validate().map_err(ConfigError::Invalid)?;
        self.picking.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}
