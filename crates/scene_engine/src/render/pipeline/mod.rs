//! Fixed-function pipeline state

pub mod pipeline_config;

pub use pipeline_config::{
    BlendEquation, BlendFactor, Blending, CullMode, DepthFunc, FrontFace, PipelineState,
    PolygonMode, PolygonOffset, Side, StencilFunc, StencilOp, StencilState,
};
