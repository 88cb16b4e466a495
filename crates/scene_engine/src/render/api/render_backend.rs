//! Backend abstraction traits for the rendering system
//!
//! The renderer talks to the GPU only through [`GpuBackend`]. Every enum it
//! passes across this boundary is engine-owned; a backend maps each variant
//! 1:1 onto its API's constants.

use bitflags::bitflags;

use crate::foundation::math::{Mat3, Mat4, Vec2, Vec3, Vec4};
use crate::geometry::ComponentType;
use crate::render::pipeline::{
    Blending, CullMode, DepthFunc, FrontFace, PolygonMode, PolygonOffset, StencilState,
};
use crate::render::resources::materials::TextureHandle;
use crate::render::RenderError;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Handle to a program stored in the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u64);

/// Handle to a buffer stored in the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

bitflags! {
    /// Framebuffer planes cleared at the start of a frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        /// Color buffer
        const COLOR = 1 << 0;
        /// Depth buffer
        const DEPTH = 1 << 1;
        /// Stencil buffer
        const STENCIL = 1 << 2;
    }
}

/// Output rectangle in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    /// Left edge
    pub x: u32,
    /// Bottom edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

/// Synthesized program sources
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramSources {
    /// Debug name
    pub name: String,
    /// Vertex stage
    pub vertex: String,
    /// Fragment stage
    pub fragment: String,
}

/// Compile/link state reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramStatus {
    /// Still compiling in the background
    Pending,
    /// Linked and usable
    Ready,
    /// Compile or link failed
    Failed {
        /// Compiler/linker log
        log: String,
    },
}

/// Buffer binding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Vertex,
    /// Element indices
    Index,
}

/// Source of one vertex input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeBinding {
    /// Buffer holding the data
    pub buffer: BufferHandle,
    /// Components per vertex
    pub item_size: usize,
    /// Component storage type
    pub component_type: ComponentType,
    /// Integer data is mapped to `[0, 1]` / `[-1, 1]`
    pub normalized: bool,
    /// Bytes between consecutive elements, 0 for tightly packed
    pub stride: usize,
    /// Byte offset of the first element
    pub offset: usize,
    /// 0 for per-vertex data, 1 for per-instance data
    pub divisor: u32,
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    /// Independent triangles
    Triangles,
    /// Independent segments
    Lines,
    /// Connected segments
    LineStrip,
    /// Connected segments closed back to the start
    LineLoop,
    /// Points
    Points,
}

/// One draw submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    /// Primitive assembly
    pub mode: DrawMode,
    /// First vertex or index
    pub first: usize,
    /// Number of vertices or indices
    pub count: usize,
    /// Index type when drawing from the bound index buffer
    pub index_type: Option<ComponentType>,
    /// Instance count for instanced draws
    pub instance_count: Option<usize>,
}

/// Value of a program uniform
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    Texture(TextureHandle),
    FloatArray(Vec<f32>),
    Vec3Array(Vec<Vec3>),
    Vec4Array(Vec<Vec4>),
}

/// GPU API collaborator
///
/// Stateful in the way GL-style APIs are: `use_program`, attribute and
/// fixed-function calls affect every following draw until changed.
pub trait GpuBackend {
    /// Start a frame on the given viewport
    fn begin_frame(&mut self, viewport: Viewport) -> BackendResult<()>;

    /// Finish and present the frame
    fn end_frame(&mut self) -> BackendResult<()>;

    /// Clear the selected planes
    fn clear(&mut self, flags: ClearFlags, color: [f32; 4]);

    /// Submit sources for compilation; the result may still be pending
    fn compile_program(&mut self, sources: &ProgramSources) -> BackendResult<ProgramHandle>;

    /// Poll compile/link status
    fn poll_program(&mut self, program: ProgramHandle) -> ProgramStatus;

    /// Active vertex inputs of a linked program and their locations
    fn attribute_locations(&self, program: ProgramHandle) -> Vec<(String, u32)>;

    /// Free a program
    fn delete_program(&mut self, program: ProgramHandle);

    /// Make a program current
    fn use_program(&mut self, program: ProgramHandle);

    /// Create a buffer from bytes
    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> BackendResult<BufferHandle>;

    /// Replace a buffer's contents
    fn update_buffer(&mut self, buffer: BufferHandle, data: &[u8]) -> BackendResult<()>;

    /// Free a buffer
    fn delete_buffer(&mut self, buffer: BufferHandle);

    /// Feed a vertex input from a buffer
    fn bind_attribute(&mut self, location: u32, binding: &AttributeBinding);

    /// Feed a vertex input a constant value
    fn set_default_attribute(&mut self, location: u32, value: Vec4);

    /// Stop feeding a vertex input
    fn disable_attribute(&mut self, location: u32);

    /// Bind the element buffer for indexed draws
    fn bind_index_buffer(&mut self, buffer: BufferHandle);

    /// Blend mode
    fn set_blending(&mut self, blending: Blending, premultiplied_alpha: bool);

    /// Depth test, write mask and comparison
    fn set_depth(&mut self, test: bool, write: bool, func: DepthFunc);

    /// Stencil configuration
    fn set_stencil(&mut self, stencil: &StencilState);

    /// Face culling and winding
    fn set_cull(&mut self, cull: CullMode, front_face: FrontFace);

    /// Depth bias
    fn set_polygon_offset(&mut self, offset: PolygonOffset);

    /// Fill mode
    fn set_polygon_mode(&mut self, mode: PolygonMode);

    /// Color write mask
    fn set_color_write(&mut self, enabled: bool);

    /// Upload a uniform to the current program
    fn set_uniform(&mut self, name: &str, value: &UniformValue);

    /// Issue a draw
    fn draw(&mut self, call: &DrawCall) -> BackendResult<()>;
}
