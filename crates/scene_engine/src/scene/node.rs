//! Transform node: local pose, cached matrices and graph links

use log::error;

use super::camera::Camera;
use super::drawable::Drawable;
use super::graph::NodeId;
use super::light::Light;
use crate::foundation::math::{compose, Euler, EulerOrder, Mat4, Quat, Transform, Vec3};

/// Number of layer channels
pub const LAYER_COUNT: u32 = 32;

/// 32-channel visibility mask
///
/// A node is rendered (and picked) only when its layers share at least one
/// channel with the camera's (or raycaster's) layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layers {
    mask: u32,
}

impl Default for Layers {
    fn default() -> Self {
        Self { mask: 1 }
    }
}

impl Layers {
    /// Layers with only channel 0 enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bit mask
    pub const fn mask(&self) -> u32 {
        self.mask
    }

    fn bit(channel: u32) -> Option<u32> {
        if channel >= LAYER_COUNT {
            error!("Layer channel {} out of range (0..{})", channel, LAYER_COUNT);
            return None;
        }
        Some(1 << channel)
    }

    /// Enable only `channel`
    pub fn set(&mut self, channel: u32) {
        if let Some(bit) = Self::bit(channel) {
            self.mask = bit;
        }
    }

    /// Enable `channel`
    pub fn enable(&mut self, channel: u32) {
        if let Some(bit) = Self::bit(channel) {
            self.mask |= bit;
        }
    }

    /// Disable `channel`
    pub fn disable(&mut self, channel: u32) {
        if let Some(bit) = Self::bit(channel) {
            self.mask &= !bit;
        }
    }

    /// Flip `channel`
    pub fn toggle(&mut self, channel: u32) {
        if let Some(bit) = Self::bit(channel) {
            self.mask ^= bit;
        }
    }

    /// Enable every channel
    pub fn enable_all(&mut self) {
        self.mask = u32::MAX;
    }

    /// Disable every channel
    pub fn disable_all(&mut self) {
        self.mask = 0;
    }

    /// Whether `channel` is enabled
    pub fn is_enabled(&self, channel: u32) -> bool {
        Self::bit(channel).is_some_and(|bit| self.mask & bit != 0)
    }

    /// Whether the two masks share a channel
    pub const fn test(&self, other: &Self) -> bool {
        self.mask & other.mask != 0
    }
}

/// What a node is, beyond its transform
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Pure transform; its render order becomes the group order of its subtree
    Group,
    /// Renderable and raycastable primitive
    Drawable(Drawable),
    /// Light source
    Light(Light),
    /// Viewpoint
    Camera(Camera),
}

/// Where a node's cached matrices stand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformState {
    /// Both matrices are current
    Clean,
    /// Position/rotation/scale changed since the local matrix was composed
    LocalDirty,
    /// Local matrix is current, world matrix is stale
    WorldDirty,
}

/// A node in the scene graph
#[derive(Debug, Clone)]
pub struct Node {
    /// Debug name, searchable with `SceneGraph::get_object_by_name`
    pub name: String,
    id: u64,
    kind: NodeKind,

    position: Vec3,
    quaternion: Quat,
    rotation: Euler,
    scale: Vec3,
    /// Up direction used by `look_at`
    pub up: Vec3,

    local_matrix: Mat4,
    world_matrix: Mat4,
    local_dirty: bool,
    matrix_world_needs_update: bool,
    /// Recompose the local matrix from position/quaternion/scale during updates
    pub matrix_auto_update: bool,
    /// Recompute the world matrix during updates
    pub matrix_world_auto_update: bool,

    /// Hidden nodes and their subtrees are not rendered
    pub visible: bool,
    /// Layer membership
    pub layers: Layers,
    /// Test against the camera frustum before drawing
    pub frustum_culled: bool,
    /// Explicit sort key, lower draws first
    pub render_order: i32,
    /// Casts shadows
    pub cast_shadow: bool,
    /// Receives shadows
    pub receive_shadow: bool,

    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl Node {
    pub(crate) fn new(id: u64, kind: NodeKind) -> Self {
        Self {
            name: String::new(),
            id,
            kind,
            position: Vec3::zeros(),
            quaternion: Quat::identity(),
            rotation: Euler::default(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            up: Vec3::y(),
            local_matrix: Mat4::identity(),
            world_matrix: Mat4::identity(),
            local_dirty: false,
            matrix_world_needs_update: false,
            matrix_auto_update: true,
            matrix_world_auto_update: true,
            visible: true,
            layers: Layers::default(),
            frustum_culled: true,
            render_order: 0,
            cast_shadow: false,
            receive_shadow: false,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Creation serial, unique and increasing within a graph
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Node kind
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Node kind, mutable
    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    /// Drawable payload, if this node is drawable
    pub const fn as_drawable(&self) -> Option<&Drawable> {
        match &self.kind {
            NodeKind::Drawable(drawable) => Some(drawable),
            _ => None,
        }
    }

    /// Drawable payload, mutable
    pub fn as_drawable_mut(&mut self) -> Option<&mut Drawable> {
        match &mut self.kind {
            NodeKind::Drawable(drawable) => Some(drawable),
            _ => None,
        }
    }

    /// Camera payload, if this node is a camera
    pub const fn as_camera(&self) -> Option<&Camera> {
        match &self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    /// Camera payload, mutable
    pub fn as_camera_mut(&mut self) -> Option<&mut Camera> {
        match &mut self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    /// Light payload, if this node is a light
    pub const fn as_light(&self) -> Option<&Light> {
        match &self.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }

    /// Light payload, mutable
    pub fn as_light_mut(&mut self) -> Option<&mut Light> {
        match &mut self.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }

    /// Parent link (non-owning)
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Local position
    pub const fn position(&self) -> &Vec3 {
        &self.position
    }

    /// Set the local position
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.local_dirty = true;
    }

    /// Move along a local axis
    pub fn translate_on_axis(&mut self, axis: &Vec3, distance: f32) {
        let offset = self.quaternion * axis.normalize() * distance;
        self.set_position(self.position + offset);
    }

    /// Local rotation
    pub const fn quaternion(&self) -> &Quat {
        &self.quaternion
    }

    /// Set the local rotation; the Euler view is refreshed
    pub fn set_quaternion(&mut self, quaternion: Quat) {
        self.quaternion = quaternion;
        self.rotation = Euler::from_quaternion(&quaternion, self.rotation.order);
        self.local_dirty = true;
    }

    /// Local rotation as Euler angles (kept in sync with the quaternion)
    pub const fn rotation(&self) -> &Euler {
        &self.rotation
    }

    /// Set the local rotation from Euler angles
    pub fn set_rotation(&mut self, rotation: Euler) {
        self.rotation = rotation;
        self.quaternion = rotation.to_quaternion();
        self.local_dirty = true;
    }

    /// Change the Euler order, keeping the same orientation
    pub fn set_rotation_order(&mut self, order: EulerOrder) {
        self.rotation = Euler::from_quaternion(&self.quaternion, order);
    }

    /// Rotate around a local axis
    pub fn rotate_on_axis(&mut self, axis: &Vec3, angle: f32) {
        let delta = Quat::from_axis_angle(&nalgebra::Unit::new_normalize(*axis), angle);
        self.set_quaternion(self.quaternion * delta);
    }

    /// Local scale
    pub const fn scale(&self) -> &Vec3 {
        &self.scale
    }

    /// Set the local scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.local_dirty = true;
    }

    /// Local matrix as of the last compose
    pub const fn local_matrix(&self) -> &Mat4 {
        &self.local_matrix
    }

    /// World matrix as of the last update
    pub const fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    /// Whether the world matrix is due for recomputation
    pub const fn matrix_world_needs_update(&self) -> bool {
        self.matrix_world_needs_update
    }

    /// Current position in the dirty-state cycle
    pub const fn transform_state(&self) -> TransformState {
        if self.local_dirty {
            TransformState::LocalDirty
        } else if self.matrix_world_needs_update {
            TransformState::WorldDirty
        } else {
            TransformState::Clean
        }
    }

    /// Recompose the local matrix from position/quaternion/scale
    pub fn update_matrix(&mut self) {
        self.local_matrix = compose(&self.position, &self.quaternion, &self.scale);
        self.local_dirty = false;
        self.matrix_world_needs_update = true;
    }

    /// Overwrite the local matrix and decompose it into position/quaternion/scale
    pub fn set_local_matrix(&mut self, matrix: Mat4) {
        let transform = Transform::from_matrix(&matrix);
        self.position = transform.position;
        self.quaternion = transform.rotation;
        self.rotation = Euler::from_quaternion(&transform.rotation, self.rotation.order);
        self.scale = transform.scale;
        self.local_matrix = matrix;
        self.local_dirty = false;
        self.matrix_world_needs_update = true;
    }

    /// Premultiply the local transform by `matrix`
    pub fn apply_matrix4(&mut self, matrix: &Mat4) {
        if self.local_dirty || self.matrix_auto_update {
            self.update_matrix();
        }
        self.set_local_matrix(matrix * self.local_matrix);
    }

    /// Local transform as a [`Transform`]
    pub fn transform(&self) -> Transform {
        Transform { position: self.position, rotation: self.quaternion, scale: self.scale }
    }

    pub(crate) fn mark_world_dirty(&mut self) {
        self.matrix_world_needs_update = true;
    }

    /// Store a freshly computed world matrix; cameras refresh their view matrix
    pub(crate) fn store_world_matrix(&mut self, world: Mat4) {
        self.world_matrix = world;
        self.matrix_world_needs_update = false;
        if let NodeKind::Camera(camera) = &mut self.kind {
            camera.update_view(&world);
        }
    }
}
