//! # Rendering System
//!
//! API-independent render core. A [`Renderer`] turns a [`Scene`](crate::scene::Scene)
//! into backend calls once per frame:
//!
//! 1. disposals queued by the scene are applied and GPU references held
//!    for destroyed nodes are released
//! 2. world matrices are refreshed and the visible drawables are projected
//!    into a bucketed [`RenderList`] (lights are collected on the way)
//! 3. the list is sorted and each entry resolves its program through the
//!    [`ProgramCache`](resources::programs::ProgramCache)
//! 4. the draw loop binds geometry, diffs fixed-function state against the
//!    previous entry and issues the draw
//!
//! ## Architecture
//!
//! - **Backend**: the [`GpuBackend`](api::GpuBackend) trait is the only
//!   place GPU calls cross; [`HeadlessBackend`](backends::HeadlessBackend)
//!   records them for tests and tools
//! - **Resources**: materials and the program cache that compiles them
//! - **Caches**: geometry buffers and pipeline state, owned by the renderer
//!
//! Compilation may be asynchronous. Entries whose program is still pending
//! are skipped and picked up again on a later frame.

pub mod api;
pub mod backends;
pub mod buffers;
pub mod clipping;
pub mod constants;
pub mod info;
pub mod lighting;
pub mod list_builder;
pub mod pipeline;
pub mod render_list;
pub mod renderer;
pub mod resources;
pub mod state_cache;

pub use api::{GpuBackend, UniformValue};
pub use backends::HeadlessBackend;
pub use constants::{ColorSpace, Precision, ShadowMapType, ToneMapping};
pub use info::RenderInfo;
pub use render_list::{Bucket, RenderItem, RenderItemComparator, RenderList};
pub use renderer::Renderer;

use thiserror::Error;

/// Frame-level and resource errors of the renderer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Renderer initialization failed during setup
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// A frame could not be started, drawn or finished
    ///
    /// Returned from `render` when the backend rejects `begin_frame` or
    /// `end_frame`. Individual draw failures are logged and skipped instead.
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// A GPU resource could not be created or updated
    ///
    /// Raised for buffer uploads of inconsistent geometry or unknown buffer
    /// handles. The entry that needed the resource is skipped.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Backend-specific error
    #[error("Backend error: {0}")]
    BackendError(String),

    /// The node passed as camera is missing or is not a camera
    #[error("Invalid camera: {0}")]
    InvalidCamera(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
