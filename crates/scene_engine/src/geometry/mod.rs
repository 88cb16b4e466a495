//! Geometry data model
//!
//! Named typed vertex attributes, an optional index, material groups and
//! bounding volumes.

pub mod attribute;
pub mod buffer_geometry;

pub use attribute::{AttributeArray, BufferAttribute, BufferUsage, ComponentType};
pub use buffer_geometry::{BufferGeometry, DrawRange, GeometryGroup, IndexSource};

/// Geometry data-integrity errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// The position attribute contains NaN
    #[error("position attribute contains NaN at vertex {vertex}")]
    NanPosition {
        /// First offending vertex
        vertex: usize,
    },

    /// A required attribute is absent
    #[error("missing attribute '{0}'")]
    MissingAttribute(String),

    /// An attribute's vertex count differs from the position attribute
    #[error("attribute '{name}' has {found} items, expected {expected}")]
    AttributeCountMismatch {
        /// Attribute name
        name: String,
        /// Position count
        expected: usize,
        /// Actual count
        found: usize,
    },

    /// An index refers past the last vertex
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        /// Offending index value
        index: usize,
        /// Number of vertices
        vertex_count: usize,
    },
}

/// Result type for geometry operations
pub type GeometryResult<T> = Result<T, GeometryError>;
