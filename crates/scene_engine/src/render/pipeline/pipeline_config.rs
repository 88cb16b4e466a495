//! Pipeline configuration and type definitions
//!
//! Backend-neutral enums for every piece of fixed-function state a draw can
//! change. Backends map each variant 1:1 onto their own constants.

use serde::{Deserialize, Serialize};

/// Which faces of a triangle a material renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Side {
    /// Front faces only
    #[default]
    Front,
    /// Back faces only
    Back,
    /// Both faces
    Double,
}

/// Blend equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendEquation {
    /// src + dst
    Add,
    /// src - dst
    Subtract,
    /// dst - src
    ReverseSubtract,
    /// min(src, dst)
    Min,
    /// max(src, dst)
    Max,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    DstColor,
    OneMinusDstColor,
    SrcAlphaSaturate,
}

/// Blending modes for different rendering effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Blending {
    /// Blending disabled
    None,
    /// Standard alpha blending
    #[default]
    Normal,
    /// Additive blending for particles and lights
    Additive,
    /// Subtract source from destination
    Subtractive,
    /// Multiply source and destination
    Multiply,
    /// Explicit equation and factors
    Custom {
        /// Blend equation
        equation: BlendEquation,
        /// Source factor
        src: BlendFactor,
        /// Destination factor
        dst: BlendFactor,
    },
}

/// Depth comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum DepthFunc {
    Never,
    Always,
    Less,
    #[default]
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
    NotEqual,
}

/// Stencil comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum StencilFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

/// Stencil buffer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    Increment,
    IncrementWrap,
    Decrement,
    DecrementWrap,
    Invert,
}

/// Stencil test configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StencilState {
    /// Enable the stencil test
    pub enabled: bool,
    /// Comparison function
    pub func: StencilFunc,
    /// Reference value
    pub reference: u32,
    /// Mask applied to both reference and stored value
    pub func_mask: u32,
    /// Mask applied on write
    pub write_mask: u32,
    /// Operation when the stencil test fails
    pub fail: StencilOp,
    /// Operation when the depth test fails
    pub z_fail: StencilOp,
    /// Operation when both tests pass
    pub z_pass: StencilOp,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            enabled: false,
            func: StencilFunc::Always,
            reference: 0,
            func_mask: 0xff,
            write_mask: 0xff,
            fail: StencilOp::Keep,
            z_fail: StencilOp::Keep,
            z_pass: StencilOp::Keep,
        }
    }
}

/// Depth bias configuration to prevent z-fighting
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PolygonOffset {
    /// Enable depth bias
    pub enabled: bool,
    /// Slope-scaled depth bias factor
    pub factor: f32,
    /// Constant depth bias in depth units
    pub units: f32,
}

/// Face culling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    #[default]
    Back,
}

/// Winding order that counts as front-facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrontFace {
    /// Counter-clockwise
    #[default]
    CounterClockwise,
    /// Clockwise
    Clockwise,
}

/// Polygon rendering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PolygonMode {
    /// Normal solid rendering
    #[default]
    Fill,
    /// Wireframe mode
    Line,
    /// Point cloud mode
    Point,
}

/// Complete fixed-function state for one draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineState {
    /// Blend mode
    pub blending: Blending,
    /// Source color is premultiplied by alpha
    pub premultiplied_alpha: bool,
    /// Enable depth testing
    pub depth_test: bool,
    /// Enable depth writing
    pub depth_write: bool,
    /// Depth comparison
    pub depth_func: DepthFunc,
    /// Stencil configuration
    pub stencil: StencilState,
    /// Cull mode for backface culling
    pub cull_mode: CullMode,
    /// Front-face winding
    pub front_face: FrontFace,
    /// Depth bias
    pub polygon_offset: PolygonOffset,
    /// Fill, wireframe or points
    pub polygon_mode: PolygonMode,
    /// Color channel write mask
    pub color_write: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            blending: Blending::None,
            premultiplied_alpha: false,
            depth_test: true,
            depth_write: true,
            depth_func: DepthFunc::LessEqual,
            stencil: StencilState::default(),
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            polygon_offset: PolygonOffset::default(),
            polygon_mode: PolygonMode::Fill,
            color_write: true,
        }
    }
}

impl Side {
    /// Cull mode for this side; a mirrored world matrix swaps front and back
    pub const fn cull_mode(self) -> CullMode {
        match self {
            Self::Front => CullMode::Back,
            Self::Back => CullMode::Front,
            Self::Double => CullMode::None,
        }
    }
}
