//! Drawable node payload: primitive kind, geometry, materials, instances

use super::{GeometryId, MaterialId};
use crate::foundation::bounds::BoundingSphere;
use crate::foundation::math::{Mat4, Vec2};

/// How line vertices are connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineTopology {
    /// Each vertex connects to the next
    Strip,
    /// Strip closed back to the first vertex
    Loop,
    /// Independent vertex pairs
    Segments,
}

/// Primitive kind, deciding draw mode and raycast algorithm
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    /// Triangles
    Mesh,
    /// Lines
    Line(LineTopology),
    /// Point sprites
    Points,
    /// Camera-facing quad
    Sprite {
        /// Anchor within the quad, `(0.5, 0.5)` is the middle
        center: Vec2,
    },
}

/// One material, or one per geometry group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialSlot {
    /// Single material for the whole geometry
    Single(MaterialId),
    /// Indexed by `GeometryGroup::material_index`
    Multi(Vec<MaterialId>),
}

impl MaterialSlot {
    /// Material for a group slot; missing slots fall back to the first material
    pub fn get(&self, index: usize) -> Option<MaterialId> {
        match self {
            Self::Single(id) => Some(*id),
            Self::Multi(ids) => ids.get(index).or_else(|| ids.first()).copied(),
        }
    }

    /// First material
    pub fn first(&self) -> Option<MaterialId> {
        self.get(0)
    }

    /// Whether per-group materials are used
    pub const fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }

    /// Every referenced material
    pub fn ids(&self) -> Vec<MaterialId> {
        match self {
            Self::Single(id) => vec![*id],
            Self::Multi(ids) => ids.clone(),
        }
    }
}

/// Per-instance transforms drawn with one call
#[derive(Debug, Clone, Default)]
pub struct Instances {
    matrices: Vec<Mat4>,
    /// Cull each instance against the frustum and draw only the visible ones
    pub per_instance_culling: bool,
    version: u64,
}

impl Instances {
    /// Instances from local matrices (relative to the node)
    pub fn new(matrices: Vec<Mat4>) -> Self {
        Self { matrices, per_instance_culling: false, version: 0 }
    }

    /// Number of instances
    pub fn count(&self) -> usize {
        self.matrices.len()
    }

    /// Instance matrices
    pub fn matrices(&self) -> &[Mat4] {
        &self.matrices
    }

    /// Replace one instance matrix
    pub fn set_matrix(&mut self, index: usize, matrix: Mat4) {
        if let Some(slot) = self.matrices.get_mut(index) {
            *slot = matrix;
            self.version += 1;
        } else {
            log::error!("Instance index {} out of range (count {})", index, self.matrices.len());
        }
    }

    /// Replace every instance matrix
    pub fn set_matrices(&mut self, matrices: Vec<Mat4>) {
        self.matrices = matrices;
        self.version += 1;
    }

    /// Change counter for the instance buffer
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Sphere around every instance, given the geometry's own sphere
    pub fn bounding_sphere(&self, geometry_sphere: &BoundingSphere) -> BoundingSphere {
        let mut sphere = BoundingSphere::empty();
        for matrix in &self.matrices {
            sphere.union(&geometry_sphere.transformed(matrix));
        }
        sphere
    }
}

/// Drawable payload of a node
#[derive(Debug, Clone)]
pub struct Drawable {
    /// Primitive kind
    pub primitive: Primitive,
    /// Geometry in the owning scene
    pub geometry: GeometryId,
    /// Material(s) in the owning scene
    pub material: MaterialSlot,
    /// Instancing, if any
    pub instances: Option<Instances>,
    /// Morph target weights
    pub morph_target_influences: Vec<f32>,
    /// Vertex skinning is applied in the vertex shader
    pub skinned: bool,
}

impl Drawable {
    /// Drawable with a single material
    pub fn new(primitive: Primitive, geometry: GeometryId, material: MaterialId) -> Self {
        Self {
            primitive,
            geometry,
            material: MaterialSlot::Single(material),
            instances: None,
            morph_target_influences: Vec::new(),
            skinned: false,
        }
    }

    /// Triangle mesh
    pub fn mesh(geometry: GeometryId, material: MaterialId) -> Self {
        Self::new(Primitive::Mesh, geometry, material)
    }

    /// Triangle mesh with one material per geometry group
    pub fn multi_material_mesh(geometry: GeometryId, materials: Vec<MaterialId>) -> Self {
        Self {
            material: MaterialSlot::Multi(materials),
            ..Self::new(Primitive::Mesh, geometry, MaterialId::default())
        }
    }

    /// Instanced triangle mesh
    pub fn instanced_mesh(geometry: GeometryId, material: MaterialId, instances: Instances) -> Self {
        Self { instances: Some(instances), ..Self::mesh(geometry, material) }
    }

    /// Whether this drawable uses instancing
    pub const fn is_instanced(&self) -> bool {
        self.instances.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    #[test]
    fn test_missing_group_material_falls_back_to_first() {
        let mut keys: SlotMap<MaterialId, ()> = SlotMap::with_key();
        let (a, b) = (keys.insert(()), keys.insert(()));
        let slot = MaterialSlot::Multi(vec![a, b]);

        assert_eq!(slot.get(1), Some(b));
        assert_eq!(slot.get(5), Some(a));
        assert_eq!(MaterialSlot::Multi(Vec::new()).get(0), None);
        assert_eq!(MaterialSlot::Single(b).get(3), Some(b));
    }

    #[test]
    fn test_instance_bounds_cover_every_instance() {
        let instances = Instances::new(vec![
            Mat4::new_translation(&Vec3::new(-5.0, 0.0, 0.0)),
            Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0)),
        ]);
        let sphere = instances.bounding_sphere(&BoundingSphere::new(Vec3::zeros(), 1.0));

        assert_relative_eq!(sphere.center, Vec3::zeros(), epsilon = 1e-6);
        assert_relative_eq!(sphere.radius, 6.0, epsilon = 1e-6);
    }

    #[test]
    fn test_instance_updates_bump_version() {
        let mut instances = Instances::new(vec![Mat4::identity()]);
        instances.set_matrix(0, Mat4::new_scaling(2.0));
        instances.set_matrix(4, Mat4::identity());

        assert_eq!(instances.version(), 1);
    }
}
