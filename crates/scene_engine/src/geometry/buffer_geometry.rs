//! Indexed vertex geometry with groups and lazily computed bounds

use std::collections::BTreeMap;

use log::warn;

use super::attribute::{AttributeArray, BufferAttribute};
use super::{GeometryError, GeometryResult};
use crate::foundation::bounds::{BoundingSphere, AABB};
use crate::foundation::math::{normal_matrix, Mat4, Vec3};

/// Largest index value that still fits a 16-bit index buffer
const MAX_U16_INDEX: u32 = 65_534;

/// Input accepted by [`BufferGeometry::set_index`]
#[derive(Debug, Clone)]
pub enum IndexSource {
    /// Plain values; the narrowest suitable width is selected
    Values(Vec<u32>),
    /// Pre-built attribute, stored as is
    Attribute(BufferAttribute),
}

impl From<Vec<u32>> for IndexSource {
    fn from(values: Vec<u32>) -> Self {
        Self::Values(values)
    }
}

impl From<BufferAttribute> for IndexSource {
    fn from(attribute: BufferAttribute) -> Self {
        Self::Attribute(attribute)
    }
}

/// Sub-range of the geometry drawn with one material slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryGroup {
    /// First index (or vertex, when non-indexed)
    pub start: usize,
    /// Number of indices (or vertices)
    pub count: usize,
    /// Slot in the drawable's material list
    pub material_index: usize,
}

/// Portion of the geometry that is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    /// First index (or vertex)
    pub start: usize,
    /// Number of indices (or vertices); `usize::MAX` means "to the end"
    pub count: usize,
}

impl Default for DrawRange {
    fn default() -> Self {
        Self { start: 0, count: usize::MAX }
    }
}

/// Vertex attributes, optional index, groups and bounding volumes
///
/// Bounds are computed on request and never refreshed automatically;
/// call [`Self::compute_bounding_box`] / [`Self::compute_bounding_sphere`]
/// again after editing positions.
#[derive(Debug, Clone, Default)]
pub struct BufferGeometry {
    /// Debug name
    pub name: String,
    attributes: BTreeMap<String, BufferAttribute>,
    index: Option<BufferAttribute>,
    morph_attributes: BTreeMap<String, Vec<BufferAttribute>>,
    /// Morph targets store offsets from the base attribute instead of absolute values
    pub morph_targets_relative: bool,
    groups: Vec<GeometryGroup>,
    draw_range: DrawRange,
    bounding_box: Option<AABB>,
    bounding_sphere: Option<BoundingSphere>,
    version: u64,
}

impl BufferGeometry {
    /// Empty geometry
    pub fn new() -> Self {
        Self::default()
    }

    /// Geometry with a single float `position` attribute
    pub fn from_positions(positions: &[Vec3]) -> Self {
        let mut geometry = Self::new();
        geometry.set_attribute("position", BufferAttribute::from_vec3s(positions));
        geometry
    }

    /// Set the index buffer
    pub fn set_index(&mut self, index: impl Into<IndexSource>) {
        let attribute = match index.into() {
            IndexSource::Attribute(attribute) => attribute,
            IndexSource::Values(values) => {
                let needs_u32 = values.iter().any(|&v| v > MAX_U16_INDEX);
                let array = if needs_u32 {
                    AttributeArray::U32(values)
                } else {
                    AttributeArray::U16(values.into_iter().map(|v| v as u16).collect())
                };
                BufferAttribute::new(array, 1, false)
            }
        };
        self.index = Some(attribute);
        self.version += 1;
    }

    /// Drop the index buffer
    pub fn clear_index(&mut self) {
        self.index = None;
        self.version += 1;
    }

    /// Index buffer, if any
    pub const fn index(&self) -> Option<&BufferAttribute> {
        self.index.as_ref()
    }

    /// Mutable index buffer
    pub fn index_mut(&mut self) -> Option<&mut BufferAttribute> {
        self.index.as_mut()
    }

    /// Attach (or replace) a named attribute
    pub fn set_attribute(&mut self, name: impl Into<String>, attribute: BufferAttribute) {
        self.attributes.insert(name.into(), attribute);
        self.version += 1;
    }

    /// Named attribute
    pub fn get_attribute(&self, name: &str) -> Option<&BufferAttribute> {
        self.attributes.get(name)
    }

    /// Named attribute, mutable
    pub fn get_attribute_mut(&mut self, name: &str) -> Option<&mut BufferAttribute> {
        self.attributes.get_mut(name)
    }

    /// Remove a named attribute
    pub fn delete_attribute(&mut self, name: &str) -> Option<BufferAttribute> {
        let removed = self.attributes.remove(name);
        if removed.is_some() {
            self.version += 1;
        }
        removed
    }

    /// Whether a named attribute exists
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// All attributes in name order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &BufferAttribute)> {
        self.attributes.iter().map(|(name, attribute)| (name.as_str(), attribute))
    }

    /// Set the morph targets for an attribute
    pub fn set_morph_attribute(&mut self, name: impl Into<String>, targets: Vec<BufferAttribute>) {
        self.morph_attributes.insert(name.into(), targets);
        self.version += 1;
    }

    /// Morph targets for an attribute
    pub fn morph_attribute(&self, name: &str) -> Option<&[BufferAttribute]> {
        self.morph_attributes.get(name).map(Vec::as_slice)
    }

    /// Largest number of morph targets on any attribute
    pub fn morph_target_count(&self) -> usize {
        self.morph_attributes.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Add a material group
    pub fn add_group(&mut self, start: usize, count: usize, material_index: usize) {
        self.groups.push(GeometryGroup { start, count, material_index });
    }

    /// Remove every group
    pub fn clear_groups(&mut self) {
        self.groups.clear();
    }

    /// Material groups
    pub fn groups(&self) -> &[GeometryGroup] {
        &self.groups
    }

    /// Restrict drawing to a sub-range
    pub fn set_draw_range(&mut self, start: usize, count: usize) {
        self.draw_range = DrawRange { start, count };
    }

    /// Current draw range
    pub const fn draw_range(&self) -> DrawRange {
        self.draw_range
    }

    /// Number of vertices in the position attribute
    pub fn vertex_count(&self) -> usize {
        self.get_attribute("position").map_or(0, BufferAttribute::count)
    }

    /// Number of elements a full draw covers (indices when indexed, otherwise vertices)
    pub fn element_count(&self) -> usize {
        self.index.as_ref().map_or_else(|| self.vertex_count(), BufferAttribute::count)
    }

    /// Structural change counter, bumped when attributes, morph targets or the index are replaced
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Last computed bounding box
    pub const fn bounding_box(&self) -> Option<&AABB> {
        self.bounding_box.as_ref()
    }

    /// Last computed bounding sphere
    pub const fn bounding_sphere(&self) -> Option<&BoundingSphere> {
        self.bounding_sphere.as_ref()
    }

    /// Forget computed bounds
    pub fn invalidate_bounds(&mut self) {
        self.bounding_box = None;
        self.bounding_sphere = None;
    }

    /// Box around an attribute's items, failing on NaN
    fn attribute_extents(attribute: &BufferAttribute) -> GeometryResult<AABB> {
        let mut aabb = AABB::empty();
        for i in 0..attribute.count() {
            let p = attribute.get_vec3(i);
            if p.iter().any(|c| c.is_nan()) {
                return Err(GeometryError::NanPosition { vertex: i });
            }
            aabb.expand_by_point(&p);
        }
        Ok(aabb)
    }

    /// Extents of the base positions unioned with every morph target
    fn position_extents(&self) -> GeometryResult<AABB> {
        let Some(position) = self.get_attribute("position") else {
            return Ok(AABB::empty());
        };
        let mut aabb = Self::attribute_extents(position)?;

        if let Some(targets) = self.morph_attributes.get("position") {
            let base = aabb;
            for target in targets {
                let target_box = Self::attribute_extents(target)?;
                if self.morph_targets_relative {
                    aabb.expand_by_point(&(base.min + target_box.min));
                    aabb.expand_by_point(&(base.max + target_box.max));
                } else {
                    aabb.expand_by_point(&target_box.min);
                    aabb.expand_by_point(&target_box.max);
                }
            }
        }
        Ok(aabb)
    }

    /// Compute and store the axis-aligned bounding box
    ///
    /// A geometry without positions gets an empty box. NaN positions leave
    /// the box unset; reporting the error is left to the caller.
    pub fn compute_bounding_box(&mut self) -> GeometryResult<AABB> {
        let extents = self.position_extents();
        self.bounding_box = extents.as_ref().ok().copied();
        extents
    }

    /// Compute and store the bounding sphere
    ///
    /// Centered at the bounding box center, radius is the farthest vertex
    /// (morph targets included). Without vertices the sphere is empty; NaN
    /// positions leave it unset.
    pub fn compute_bounding_sphere(&mut self) -> GeometryResult<BoundingSphere> {
        let extents = match self.position_extents() {
            Ok(aabb) => aabb,
            Err(err) => {
                self.bounding_sphere = None;
                return Err(err);
            }
        };

        let Some(position) = self.get_attribute("position").filter(|position| position.count() > 0) else {
            let sphere = BoundingSphere::empty();
            self.bounding_sphere = Some(sphere);
            return Ok(sphere);
        };

        let center = extents.center();
        let mut max_radius_sq: f32 = 0.0;
        for i in 0..position.count() {
            max_radius_sq = max_radius_sq.max((position.get_vec3(i) - center).magnitude_squared());
        }

        if let Some(targets) = self.morph_attributes.get("position") {
            for target in targets {
                for i in 0..target.count() {
                    let mut p = target.get_vec3(i);
                    if self.morph_targets_relative {
                        p += position.get_vec3(i);
                    }
                    max_radius_sq = max_radius_sq.max((p - center).magnitude_squared());
                }
            }
        }

        let sphere = BoundingSphere::new(center, max_radius_sq.sqrt());
        self.bounding_sphere = Some(sphere);
        Ok(sphere)
    }

    /// Bounding sphere, computing it first when missing
    pub fn ensure_bounding_sphere(&mut self) -> GeometryResult<BoundingSphere> {
        match self.bounding_sphere {
            Some(sphere) => Ok(sphere),
            None => self.compute_bounding_sphere(),
        }
    }

    /// Bounding box, computing it first when missing
    pub fn ensure_bounding_box(&mut self) -> GeometryResult<AABB> {
        match self.bounding_box {
            Some(aabb) => Ok(aabb),
            None => self.compute_bounding_box(),
        }
    }

    /// Index values as `usize`
    pub fn index_values(&self) -> Option<Vec<usize>> {
        self.index.as_ref().map(|index| {
            (0..index.count()).filter_map(|i| index.get_index(i)).collect()
        })
    }

    /// Expand an indexed geometry into one vertex per index
    ///
    /// Returns a new geometry; `self` is not modified. Non-indexed input is
    /// returned as a copy.
    pub fn to_non_indexed(&self) -> Self {
        let Some(indices) = self.index_values() else {
            warn!("to_non_indexed on '{}': geometry is already non-indexed", self.name);
            return self.clone();
        };

        let mut geometry = Self {
            name: self.name.clone(),
            morph_targets_relative: self.morph_targets_relative,
            groups: self.groups.clone(),
            ..Self::default()
        };

        for (name, attribute) in &self.attributes {
            geometry.set_attribute(name.clone(), attribute.gather(&indices));
        }
        for (name, targets) in &self.morph_attributes {
            let gathered = targets.iter().map(|target| target.gather(&indices)).collect();
            geometry.set_morph_attribute(name.clone(), gathered);
        }
        geometry
    }

    /// Transform positions and normals in place
    ///
    /// Bounds that were present are recomputed.
    pub fn apply_matrix4(&mut self, matrix: &Mat4) -> GeometryResult<()> {
        if let Some(position) = self.attributes.get_mut("position") {
            position.apply_matrix4(matrix);
        }
        if let Some(normal) = self.attributes.get_mut("normal") {
            normal.apply_normal_matrix(&normal_matrix(matrix));
        }
        if self.bounding_box.is_some() {
            self.compute_bounding_box()?;
        }
        if self.bounding_sphere.is_some() {
            self.compute_bounding_sphere()?;
        }
        Ok(())
    }

    /// Compute smooth (indexed) or flat (non-indexed) vertex normals
    pub fn compute_vertex_normals(&mut self) -> GeometryResult<()> {
        let position = self
            .get_attribute("position")
            .ok_or_else(|| GeometryError::MissingAttribute("position".to_string()))?;
        let count = position.count();
        let mut normals = vec![Vec3::zeros(); count];

        let triangles: Vec<[usize; 3]> = match self.index_values() {
            Some(indices) => indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]]).collect(),
            None => (0..count / 3).map(|t| [t * 3, t * 3 + 1, t * 3 + 2]).collect(),
        };

        for [a, b, c] in triangles {
            if a >= count || b >= count || c >= count {
                return Err(GeometryError::IndexOutOfRange { index: a.max(b).max(c), vertex_count: count });
            }
            let (pa, pb, pc) = (position.get_vec3(a), position.get_vec3(b), position.get_vec3(c));
            let face_normal = (pc - pb).cross(&(pa - pb));
            normals[a] += face_normal;
            normals[b] += face_normal;
            normals[c] += face_normal;
        }

        for n in &mut normals {
            *n = n.try_normalize(0.0).unwrap_or_else(Vec3::zeros);
        }
        self.set_attribute("normal", BufferAttribute::from_vec3s(&normals));
        Ok(())
    }

    /// Check attribute count consistency and index range
    pub fn validate(&self) -> GeometryResult<()> {
        let position = self
            .get_attribute("position")
            .ok_or_else(|| GeometryError::MissingAttribute("position".to_string()))?;
        let expected = position.count();

        for (name, attribute) in &self.attributes {
            if attribute.count() != expected {
                return Err(GeometryError::AttributeCountMismatch {
                    name: name.clone(),
                    expected,
                    found: attribute.count(),
                });
            }
        }
        for (name, targets) in &self.morph_attributes {
            for target in targets {
                if target.count() != expected {
                    return Err(GeometryError::AttributeCountMismatch {
                        name: format!("morph:{name}"),
                        expected,
                        found: target.count(),
                    });
                }
            }
        }
        if let Some(indices) = self.index_values() {
            if let Some(&bad) = indices.iter().find(|&&i| i >= expected) {
                return Err(GeometryError::IndexOutOfRange { index: bad, vertex_count: expected });
            }
        }
        Ok(())
    }
}
