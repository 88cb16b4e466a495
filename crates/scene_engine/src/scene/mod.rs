//! Scene container
//!
//! A [`Scene`] owns the node graph together with the geometry and material
//! stores that drawables reference by key. Removing a geometry or material
//! queues a [`Disposal`] that the renderer consumes on its next frame to
//! release the matching GPU resources.
//!
//! ```text
//! Scene
//!  ├── SceneGraph (nodes, parent/child keys)
//!  ├── geometries: GeometryId -> BufferGeometry
//!  ├── materials:  MaterialId -> Material
//!  └── disposals (drained by the renderer)
//! ```

pub mod camera;
pub mod drawable;
pub mod graph;
pub mod light;
pub mod node;

use slotmap::SlotMap;
use thiserror::Error;

use crate::foundation::math::{Vec2, Vec3};
use crate::geometry::{BufferAttribute, BufferGeometry, GeometryError};
use crate::render::resources::materials::{Material, TextureHandle};

pub use camera::{Camera, Projection};
pub use drawable::{Drawable, Instances, LineTopology, MaterialSlot, Primitive};
pub use graph::{NodeEvent, NodeId, SceneGraph};
pub use light::{Light, LightKind};
pub use node::{Layers, Node, NodeKind, TransformState, LAYER_COUNT};

slotmap::new_key_type! {
    /// Key of a geometry stored in a [`Scene`]
    pub struct GeometryId;
    /// Key of a material stored in a [`Scene`]
    pub struct MaterialId;
}

/// Graph misuse errors
///
/// Every variant is also logged where it is produced; callers may ignore the
/// returned error and the graph stays unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    /// A node cannot be its own child
    #[error("node {0:?} cannot be added as a child of itself")]
    SelfParent(NodeId),

    /// The key does not name a live node
    #[error("node {0:?} is not part of this graph")]
    NodeNotFound(NodeId),

    /// The child is an ancestor of the parent
    #[error("adding {child:?} under {parent:?} would create a cycle")]
    CycleDetected {
        /// Requested parent
        parent: NodeId,
        /// Requested child
        child: NodeId,
    },

    /// The key does not name a stored geometry
    #[error("geometry {0:?} is not part of this scene")]
    GeometryNotFound(GeometryId),

    /// The key does not name a stored material
    #[error("material {0:?} is not part of this scene")]
    MaterialNotFound(MaterialId),
}

/// Result type for graph operations
pub type SceneResult<T> = Result<T, SceneError>;

/// Distance fog
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fog {
    /// Linear ramp between `near` and `far`
    Linear {
        /// Fog color
        color: Vec3,
        /// Start distance
        near: f32,
        /// Full-fog distance
        far: f32,
    },
    /// Exponential squared falloff
    Exponential {
        /// Fog color
        color: Vec3,
        /// Density
        density: f32,
    },
}

/// GPU resource release requested by the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    /// Geometry buffers
    Geometry(GeometryId),
    /// Programs acquired for a material
    Material(MaterialId),
}

/// Node graph plus the resources its drawables reference
#[derive(Debug)]
pub struct Scene {
    /// Transform hierarchy
    pub graph: SceneGraph,
    /// Scene fog, if any
    pub fog: Option<Fog>,
    /// Environment map applied to materials without their own
    pub environment: Option<TextureHandle>,
    root: NodeId,
    geometries: SlotMap<GeometryId, BufferGeometry>,
    materials: SlotMap<MaterialId, Material>,
    next_material_serial: u64,
    disposals: Vec<Disposal>,
    sprite_quad: Option<GeometryId>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Empty scene with a root group
    pub fn new() -> Self {
        let mut graph = SceneGraph::new();
        let root = graph.insert(NodeKind::Group);
        if let Some(node) = graph.node_mut(root) {
            node.name = "Scene".to_string();
        }

        Self {
            graph,
            fog: None,
            environment: None,
            root,
            geometries: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            next_material_serial: 0,
            disposals: Vec::new(),
            sprite_quad: None,
        }
    }

    /// Root node
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Recompute every world matrix below the root
    pub fn update_matrix_world(&mut self) {
        self.graph.update_matrix_world(self.root, false);
    }

    /// Store a geometry
    pub fn add_geometry(&mut self, geometry: BufferGeometry) -> GeometryId {
        self.geometries.insert(geometry)
    }

    /// Stored geometry
    pub fn geometry(&self, id: GeometryId) -> Option<&BufferGeometry> {
        self.geometries.get(id)
    }

    /// Stored geometry, mutably
    pub fn geometry_mut(&mut self, id: GeometryId) -> Option<&mut BufferGeometry> {
        self.geometries.get_mut(id)
    }

    /// Remove a geometry and queue its GPU buffers for release
    pub fn remove_geometry(&mut self, id: GeometryId) -> Option<BufferGeometry> {
        let geometry = self.geometries.remove(id)?;
        self.disposals.push(Disposal::Geometry(id));
        Some(geometry)
    }

    /// Compute bounding spheres that are missing; returns the geometries that failed
    pub fn compute_missing_bounds(&mut self) -> Vec<(GeometryId, GeometryError)> {
        self.geometries
            .iter_mut()
            .filter(|(_, geometry)| geometry.bounding_sphere().is_none())
            .filter_map(|(id, geometry)| geometry.compute_bounding_sphere().err().map(|e| (id, e)))
            .collect()
    }

    /// Every stored geometry
    pub fn geometries(&self) -> impl Iterator<Item = (GeometryId, &BufferGeometry)> {
        self.geometries.iter()
    }

    /// Store a material, assigning its creation serial
    pub fn add_material(&mut self, mut material: Material) -> MaterialId {
        material.set_serial(self.next_material_serial);
        self.next_material_serial += 1;
        self.materials.insert(material)
    }

    /// Stored material
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    /// Stored material, mutably
    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id)
    }

    /// Remove a material and queue its programs for release
    pub fn remove_material(&mut self, id: MaterialId) -> Option<Material> {
        let material = self.materials.remove(id)?;
        self.disposals.push(Disposal::Material(id));
        Some(material)
    }

    /// Every stored material
    pub fn materials(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials.iter()
    }

    /// Pending GPU releases, oldest first
    pub fn take_disposals(&mut self) -> Vec<Disposal> {
        std::mem::take(&mut self.disposals)
    }

    /// Insert a node of any kind under `parent`
    pub fn spawn(&mut self, parent: NodeId, kind: NodeKind) -> SceneResult<NodeId> {
        if !self.graph.contains(parent) {
            log::error!("Cannot spawn under missing node {:?}", parent);
            return Err(SceneError::NodeNotFound(parent));
        }
        let id = self.graph.insert(kind);
        self.graph.add(parent, id)?;
        Ok(id)
    }

    /// Empty group under `parent`
    pub fn add_group(&mut self, parent: NodeId) -> SceneResult<NodeId> {
        self.spawn(parent, NodeKind::Group)
    }

    /// Drawable under `parent` after checking its resource keys
    pub fn add_drawable(&mut self, parent: NodeId, drawable: Drawable) -> SceneResult<NodeId> {
        if !self.geometries.contains_key(drawable.geometry) {
            log::error!("Drawable references missing geometry {:?}", drawable.geometry);
            return Err(SceneError::GeometryNotFound(drawable.geometry));
        }
        if let Some(missing) = drawable.material.ids().into_iter().find(|id| !self.materials.contains_key(*id)) {
            log::error!("Drawable references missing material {:?}", missing);
            return Err(SceneError::MaterialNotFound(missing));
        }
        self.spawn(parent, NodeKind::Drawable(drawable))
    }

    /// Triangle mesh under `parent`
    pub fn add_mesh(&mut self, parent: NodeId, geometry: GeometryId, material: MaterialId) -> SceneResult<NodeId> {
        self.add_drawable(parent, Drawable::mesh(geometry, material))
    }

    /// Line under `parent`
    pub fn add_line(
        &mut self,
        parent: NodeId,
        geometry: GeometryId,
        material: MaterialId,
        topology: LineTopology,
    ) -> SceneResult<NodeId> {
        self.add_drawable(parent, Drawable::new(Primitive::Line(topology), geometry, material))
    }

    /// Point cloud under `parent`
    pub fn add_points(&mut self, parent: NodeId, geometry: GeometryId, material: MaterialId) -> SceneResult<NodeId> {
        self.add_drawable(parent, Drawable::new(Primitive::Points, geometry, material))
    }

    /// Camera-facing sprite under `parent`, sharing one quad geometry
    pub fn add_sprite(&mut self, parent: NodeId, material: MaterialId) -> SceneResult<NodeId> {
        let quad = self.sprite_quad();
        let sprite = Drawable::new(Primitive::Sprite { center: Vec2::new(0.5, 0.5) }, quad, material);
        self.add_drawable(parent, sprite)
    }

    /// Camera under `parent`
    pub fn add_camera(&mut self, parent: NodeId, camera: Camera) -> SceneResult<NodeId> {
        self.spawn(parent, NodeKind::Camera(camera))
    }

    /// Light under `parent`
    pub fn add_light(&mut self, parent: NodeId, light: Light) -> SceneResult<NodeId> {
        self.spawn(parent, NodeKind::Light(light))
    }

    fn sprite_quad(&mut self) -> GeometryId {
        if let Some(id) = self.sprite_quad.filter(|id| self.geometries.contains_key(*id)) {
            return id;
        }

        let mut quad = BufferGeometry::from_positions(&[
            Vec3::new(-0.5, -0.5, 0.0),
            Vec3::new(0.5, -0.5, 0.0),
            Vec3::new(0.5, 0.5, 0.0),
            Vec3::new(-0.5, 0.5, 0.0),
        ]);
        quad.name = "sprite_quad".to_string();
        quad.set_attribute(
            "uv",
            BufferAttribute::from_vec2s(&[
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ]),
        );
        quad.set_index(vec![0, 1, 2, 0, 2, 3]);

        let id = self.geometries.insert(quad);
        self.sprite_quad = Some(id);
        id
    }
}
