//! Public rendering API
//!
//! The backend trait the renderer drives, and the value types that cross it.

pub mod render_backend;

pub use render_backend::{
    AttributeBinding, BackendResult, BufferHandle, BufferTarget, ClearFlags, DrawCall, DrawMode,
    GpuBackend, ProgramHandle, ProgramSources, ProgramStatus, UniformValue, Viewport,
};
