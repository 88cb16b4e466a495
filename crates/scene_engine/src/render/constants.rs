//! Renderer-wide output and quality settings
//!
//! Every value here feeds the program cache key, so all of them have a
//! short stable tag used when the key string is built.

use serde::{Deserialize, Serialize};

/// Color space of the final framebuffer output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    /// Linear output, no transfer function
    Linear,
    /// sRGB transfer function applied in the fragment shader
    #[default]
    Srgb,
}

impl ColorSpace {
    /// Stable tag used in program keys
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Srgb => "srgb",
        }
    }
}

/// Tone mapping operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ToneMapping {
    /// No tone mapping
    #[default]
    None,
    /// Exposure scale only
    Linear,
    /// Reinhard operator
    Reinhard,
    /// Cineon filmic curve
    Cineon,
    /// ACES filmic approximation
    AcesFilmic,
    /// AgX
    AgX,
    /// Khronos PBR neutral
    Neutral,
}

impl ToneMapping {
    /// Stable tag used in program keys
    pub const fn tag(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Linear => "linear",
            Self::Reinhard => "reinhard",
            Self::Cineon => "cineon",
            Self::AcesFilmic => "aces",
            Self::AgX => "agx",
            Self::Neutral => "neutral",
        }
    }
}

/// Shadow map filtering technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShadowMapType {
    /// Single depth comparison
    Basic,
    /// Percentage-closer filtering
    #[default]
    Pcf,
    /// Soft PCF
    PcfSoft,
    /// Variance shadow maps
    Vsm,
}

impl ShadowMapType {
    /// Stable tag used in program keys
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Pcf => "pcf",
            Self::PcfSoft => "pcfsoft",
            Self::Vsm => "vsm",
        }
    }
}

/// Shader floating point precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Precision {
    /// lowp
    Low,
    /// mediump
    Medium,
    /// highp
    #[default]
    High,
}

impl Precision {
    /// GLSL qualifier
    pub const fn qualifier(self) -> &'static str {
        match self {
            Self::Low => "lowp",
            Self::Medium => "mediump",
            Self::High => "highp",
        }
    }
}
