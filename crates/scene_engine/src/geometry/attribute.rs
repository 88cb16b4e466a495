//! Typed vertex attribute storage
//!
//! A [`BufferAttribute`] wraps one typed array plus the number of components
//! per vertex. Integer arrays flagged `normalized` are read and written as
//! floats in `[0, 1]` (unsigned) or `[-1, 1]` (signed).

use crate::foundation::math::{Mat3, Mat4, Vec2, Vec3};
use log::error;

/// Element type of an attribute array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// Signed 8-bit
    I8,
    /// Unsigned 8-bit
    U8,
    /// Signed 16-bit
    I16,
    /// Unsigned 16-bit
    U16,
    /// Signed 32-bit
    I32,
    /// Unsigned 32-bit
    U32,
    /// 32-bit float
    F32,
}

impl ComponentType {
    /// Size of one component in bytes
    pub const fn byte_size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
        }
    }

    /// Divisor mapping an integer onto the normalized float range
    const fn normalization_scale(self) -> f64 {
        match self {
            Self::I8 => 127.0,
            Self::U8 => 255.0,
            Self::I16 => 32_767.0,
            Self::U16 => 65_535.0,
            Self::I32 => 2_147_483_647.0,
            Self::U32 => 4_294_967_295.0,
            Self::F32 => 1.0,
        }
    }

    const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32)
    }
}

/// Typed backing array of an attribute
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum AttributeArray {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl AttributeArray {
    /// Number of scalar components stored
    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    /// True when no components are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type
    pub const fn component_type(&self) -> ComponentType {
        match self {
            Self::I8(_) => ComponentType::I8,
            Self::U8(_) => ComponentType::U8,
            Self::I16(_) => ComponentType::I16,
            Self::U16(_) => ComponentType::U16,
            Self::I32(_) => ComponentType::I32,
            Self::U32(_) => ComponentType::U32,
            Self::F32(_) => ComponentType::F32,
        }
    }

    /// Raw bytes for GPU upload
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::I8(v) => bytemuck::cast_slice(v),
            Self::U8(v) => v,
            Self::I16(v) => bytemuck::cast_slice(v),
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::I32(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
            Self::F32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Raw stored value widened to f64
    fn raw(&self, i: usize) -> f64 {
        match self {
            Self::I8(v) => f64::from(v[i]),
            Self::U8(v) => f64::from(v[i]),
            Self::I16(v) => f64::from(v[i]),
            Self::U16(v) => f64::from(v[i]),
            Self::I32(v) => f64::from(v[i]),
            Self::U32(v) => f64::from(v[i]),
            Self::F32(v) => f64::from(v[i]),
        }
    }

    /// Store a value, saturating into the element type
    #[allow(clippy::cast_sign_loss)]
    fn store(&mut self, i: usize, value: f64) {
        match self {
            Self::I8(v) => v[i] = value as i8,
            Self::U8(v) => v[i] = value as u8,
            Self::I16(v) => v[i] = value as i16,
            Self::U16(v) => v[i] = value as u16,
            Self::I32(v) => v[i] = value as i32,
            Self::U32(v) => v[i] = value as u32,
            Self::F32(v) => v[i] = value as f32,
        }
    }

    /// Empty array of the same element type with room for `capacity` components
    fn empty_like(&self, capacity: usize) -> Self {
        match self {
            Self::I8(_) => Self::I8(Vec::with_capacity(capacity)),
            Self::U8(_) => Self::U8(Vec::with_capacity(capacity)),
            Self::I16(_) => Self::I16(Vec::with_capacity(capacity)),
            Self::U16(_) => Self::U16(Vec::with_capacity(capacity)),
            Self::I32(_) => Self::I32(Vec::with_capacity(capacity)),
            Self::U32(_) => Self::U32(Vec::with_capacity(capacity)),
            Self::F32(_) => Self::F32(Vec::with_capacity(capacity)),
        }
    }

    /// Append components `[start, start + len)` of `source` (same element type)
    fn extend_from(&mut self, source: &Self, start: usize, len: usize) {
        let range = start..start + len;
        match (self, source) {
            (Self::I8(d), Self::I8(s)) => d.extend_from_slice(&s[range]),
            (Self::U8(d), Self::U8(s)) => d.extend_from_slice(&s[range]),
            (Self::I16(d), Self::I16(s)) => d.extend_from_slice(&s[range]),
            (Self::U16(d), Self::U16(s)) => d.extend_from_slice(&s[range]),
            (Self::I32(d), Self::I32(s)) => d.extend_from_slice(&s[range]),
            (Self::U32(d), Self::U32(s)) => d.extend_from_slice(&s[range]),
            (Self::F32(d), Self::F32(s)) => d.extend_from_slice(&s[range]),
            _ => {}
        }
    }
}

/// How often an attribute is expected to change; forwarded to buffer creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// Written once
    #[default]
    Static,
    /// Rewritten often
    Dynamic,
    /// Rewritten every frame
    Stream,
}

/// One named vertex attribute (or an index buffer)
#[derive(Debug, Clone, PartialEq)]
pub struct BufferAttribute {
    array: AttributeArray,
    item_size: usize,
    /// Integer values map onto `[0, 1]` / `[-1, 1]`
    pub normalized: bool,
    /// Upload hint
    pub usage: BufferUsage,
    version: u64,
}

impl BufferAttribute {
    /// Wrap a typed array; `item_size` is the number of components per vertex
    pub fn new(array: AttributeArray, item_size: usize, normalized: bool) -> Self {
        Self {
            array,
            item_size: item_size.max(1),
            normalized,
            usage: BufferUsage::Static,
            version: 0,
        }
    }

    /// Float attribute
    pub fn from_f32(data: Vec<f32>, item_size: usize) -> Self {
        Self::new(AttributeArray::F32(data), item_size, false)
    }

    /// Float attribute built from 3-component vectors
    pub fn from_vec3s(data: &[Vec3]) -> Self {
        Self::from_f32(data.iter().flat_map(|v| [v.x, v.y, v.z]).collect(), 3)
    }

    /// Float attribute built from 2-component vectors
    pub fn from_vec2s(data: &[Vec2]) -> Self {
        Self::from_f32(data.iter().flat_map(|v| [v.x, v.y]).collect(), 2)
    }

    /// Backing array
    pub const fn array(&self) -> &AttributeArray {
        &self.array
    }

    /// Replace the backing array and bump the version
    pub fn set_array(&mut self, array: AttributeArray) {
        self.array = array;
        self.mark_needs_update();
    }

    /// Components per vertex
    pub const fn item_size(&self) -> usize {
        self.item_size
    }

    /// Number of vertices (items)
    pub fn count(&self) -> usize {
        self.array.len() / self.item_size
    }

    /// Element type
    pub const fn component_type(&self) -> ComponentType {
        self.array.component_type()
    }

    /// Change counter; the GPU copy is refreshed when it moves
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Flag the data as modified
    pub fn mark_needs_update(&mut self) {
        self.version += 1;
    }

    /// Raw bytes for GPU upload
    pub fn as_bytes(&self) -> &[u8] {
        self.array.as_bytes()
    }

    fn checked_index(&self, index: usize, component: usize) -> Option<usize> {
        if component >= self.item_size || index >= self.count() {
            error!(
                "Attribute access out of range: vertex {} component {} (count {}, item size {})",
                index,
                component,
                self.count(),
                self.item_size
            );
            return None;
        }
        Some(index * self.item_size + component)
    }

    /// Read one component; normalized integers are converted to float
    ///
    /// Out-of-range access is logged and yields 0.
    pub fn get_component(&self, index: usize, component: usize) -> f32 {
        let Some(i) = self.checked_index(index, component) else {
            return 0.0;
        };
        let raw = self.array.raw(i);
        let ty = self.component_type();
        if !self.normalized || ty == ComponentType::F32 {
            return raw as f32;
        }
        let value = raw / ty.normalization_scale();
        if ty.is_signed() {
            value.max(-1.0) as f32
        } else {
            value as f32
        }
    }

    /// Write one component; normalized integers are scaled and rounded
    ///
    /// Out-of-range access is logged and ignored.
    pub fn set_component(&mut self, index: usize, component: usize, value: f32) {
        let Some(i) = self.checked_index(index, component) else {
            return;
        };
        let ty = self.component_type();
        let stored = if !self.normalized || ty == ComponentType::F32 {
            f64::from(value)
        } else {
            (f64::from(value) * ty.normalization_scale()).round()
        };
        self.array.store(i, stored);
        self.mark_needs_update();
    }

    /// First component
    pub fn get_x(&self, index: usize) -> f32 {
        self.get_component(index, 0)
    }

    /// Second component
    pub fn get_y(&self, index: usize) -> f32 {
        self.get_component(index, 1)
    }

    /// Third component
    pub fn get_z(&self, index: usize) -> f32 {
        self.get_component(index, 2)
    }

    /// First two components as a vector
    pub fn get_vec2(&self, index: usize) -> Vec2 {
        Vec2::new(self.get_x(index), self.get_y(index))
    }

    /// First three components as a vector
    pub fn get_vec3(&self, index: usize) -> Vec3 {
        Vec3::new(self.get_x(index), self.get_y(index), self.get_z(index))
    }

    /// Write the first three components
    pub fn set_xyz(&mut self, index: usize, value: &Vec3) {
        self.set_component(index, 0, value.x);
        self.set_component(index, 1, value.y);
        self.set_component(index, 2, value.z);
    }

    /// Transform every item as a point
    pub fn apply_matrix4(&mut self, matrix: &Mat4) {
        for i in 0..self.count() {
            let p = matrix.transform_point(&self.get_vec3(i).into()).coords;
            self.set_xyz(i, &p);
        }
    }

    /// Transform every item as a direction and re-normalize
    pub fn apply_normal_matrix(&mut self, matrix: &Mat3) {
        for i in 0..self.count() {
            let n = (matrix * self.get_vec3(i)).try_normalize(0.0).unwrap_or_else(Vec3::zeros);
            self.set_xyz(i, &n);
        }
    }

    /// New attribute holding the items listed in `indices`, in order
    pub fn gather(&self, indices: &[usize]) -> Self {
        let mut array = self.array.empty_like(indices.len() * self.item_size);
        for &index in indices {
            if index < self.count() {
                array.extend_from(&self.array, index * self.item_size, self.item_size);
            } else {
                error!("Gather index {} out of range (count {})", index, self.count());
            }
        }
        Self {
            array,
            item_size: self.item_size,
            normalized: self.normalized,
            usage: self.usage,
            version: 0,
        }
    }

    /// Read an index value (no normalization)
    pub fn get_index(&self, i: usize) -> Option<usize> {
        if i >= self.array.len() {
            return None;
        }
        Some(self.array.raw(i) as usize)
    }
}
