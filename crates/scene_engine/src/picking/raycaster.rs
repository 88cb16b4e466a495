//! World-space ray and scene queries

use crate::core::config::PickingConfig;
use crate::foundation::math::{inverse_or_identity, Mat4, Vec2, Vec3, Vec4};
use crate::foundation::ray::Ray;
use crate::scene::{Layers, NodeId, NodeKind, Scene, SceneError, SceneResult};

use super::intersect::{intersect_drawable, Intersection};

/// Per-primitive hit tolerances
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastParams {
    /// Distance within which a line segment counts as hit
    pub line_threshold: f32,
    /// Distance within which a point counts as hit
    pub points_threshold: f32,
}

impl Default for RaycastParams {
    fn default() -> Self {
        Self { line_threshold: 1.0, points_threshold: 1.0 }
    }
}

/// Camera the ray was built from; sprites need it to face the viewer
#[derive(Debug, Clone, Copy)]
pub(crate) struct RayCamera {
    pub(crate) world: Mat4,
    pub(crate) view: Mat4,
    pub(crate) perspective: bool,
}

/// Ray plus the limits and filters applied to its hits
#[derive(Debug, Clone)]
pub struct Raycaster {
    /// World-space ray
    pub ray: Ray,
    /// Hits closer than this are ignored
    pub near: f32,
    /// Hits farther than this are ignored
    pub far: f32,
    /// Only nodes sharing a layer with these are tested
    pub layers: Layers,
    /// Line and point tolerances
    pub params: RaycastParams,
    pub(crate) camera: Option<RayCamera>,
}

impl Default for Raycaster {
    fn default() -> Self {
        Self::from_config(&PickingConfig::default())
    }
}

impl Raycaster {
    /// Ray from `origin` along `direction` (normalized here)
    pub fn new(origin: Vec3, direction: Vec3, near: f32, far: f32) -> Self {
        Self { ray: Ray::new(origin, direction), near, far, ..Self::default() }
    }

    /// Limits and tolerances from configuration; the ray points down -Z
    pub fn from_config(config: &PickingConfig) -> Self {
        Self {
            ray: Ray::default(),
            near: config.near,
            far: config.far,
            layers: Layers::new(),
            params: RaycastParams { line_threshold: config.line_threshold, points_threshold: config.points_threshold },
            camera: None,
        }
    }

    /// Replace the ray
    pub fn set(&mut self, origin: Vec3, direction: Vec3) {
        self.ray = Ray::new(origin, direction);
    }

    /// Ray through `ndc` from the camera node `camera`
    ///
    /// Perspective rays start at the camera; orthographic rays start in the
    /// camera plane and run along the view direction. World matrices must be
    /// current.
    pub fn set_from_camera(&mut self, ndc: Vec2, scene: &Scene, camera: NodeId) -> SceneResult<()> {
        let Some(node) = scene.graph.node(camera) else {
            log::error!("Raycast camera {:?} does not exist", camera);
            return Err(SceneError::NodeNotFound(camera));
        };
        let NodeKind::Camera(lens) = node.kind() else {
            log::error!("Raycast camera {:?} is not a camera", camera);
            return Err(SceneError::NodeNotFound(camera));
        };

        let world = *node.world_matrix();
        let unproject = *lens.projection_matrix_inverse();
        let to_world = |x: f32, y: f32, z: f32| {
            let view = unproject * Vec4::new(x, y, z, 1.0);
            let view = if view.w.abs() > f32::EPSILON { view / view.w } else { view };
            (world * Vec4::new(view.x, view.y, view.z, 1.0)).xyz()
        };

        if lens.is_perspective() {
            let origin = world.column(3).xyz();
            let direction = to_world(ndc.x, ndc.y, 0.5) - origin;
            self.ray = Ray::new(origin, direction);
        } else {
            let (near, far) = (lens.near(), lens.far());
            let origin = to_world(ndc.x, ndc.y, (near + far) / (near - far));
            let direction = world.transform_vector(&-Vec3::z());
            self.ray = Ray::new(origin, direction);
        }

        self.camera = Some(RayCamera { world, view: inverse_or_identity(&world), perspective: lens.is_perspective() });
        Ok(())
    }

    /// Hits on `node` (and its descendants when `recursive`), nearest first
    pub fn intersect_object(&self, scene: &Scene, node: NodeId, recursive: bool) -> Vec<Intersection> {
        let mut hits = Vec::new();
        self.collect(scene, node, recursive, &mut hits);
        sort_hits(&mut hits);
        hits
    }

    /// Hits on every node in `nodes` (and descendants when `recursive`), nearest first
    pub fn intersect_objects(&self, scene: &Scene, nodes: &[NodeId], recursive: bool) -> Vec<Intersection> {
        let mut hits = Vec::new();
        for &node in nodes {
            self.collect(scene, node, recursive, &mut hits);
        }
        sort_hits(&mut hits);
        hits
    }

    /// Layer filtering only; invisible nodes are still tested
    fn collect(&self, scene: &Scene, root: NodeId, recursive: bool, hits: &mut Vec<Intersection>) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = scene.graph.node(id) else {
                continue;
            };
            if node.layers.test(&self.layers) {
                if let Some(drawable) = node.as_drawable() {
                    intersect_drawable(self, scene, id, node, drawable, hits);
                }
            }
            if recursive {
                stack.extend(node.children().iter().rev().copied());
            }
        }
    }
}

fn sort_hits(hits: &mut [Intersection]) {
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BufferGeometry;
    use crate::render::resources::materials::Material;
    use crate::scene::Camera;
    use approx::assert_relative_eq;

    fn quad_scene() -> (Scene, NodeId, NodeId) {
        let mut scene = Scene::new();
        let root = scene.root();
        let geometry = scene.add_geometry(BufferGeometry::from_positions(&[
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]));
        let material = scene.add_material(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        let group = scene.add_group(root).unwrap();
        let mesh = scene.add_mesh(group, geometry, material).unwrap();
        scene.update_matrix_world();
        (scene, group, mesh)
    }

    #[test]
    fn test_perspective_ray_through_center() {
        let mut scene = Scene::new();
        let root = scene.root();
        let camera = scene.add_camera(root, Camera::perspective(60.0, 1.0, 0.1, 100.0)).unwrap();
        scene.graph.node_mut(camera).unwrap().set_position(Vec3::new(0.0, 0.0, 5.0));
        scene.update_matrix_world();

        let mut raycaster = Raycaster::default();
        raycaster.set_from_camera(Vec2::zeros(), &scene, camera).unwrap();

        assert_relative_eq!(raycaster.ray.origin, Vec3::new(0.0, 0.0, 5.0), epsilon = 1e-5);
        assert_relative_eq!(raycaster.ray.direction, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_orthographic_rays_are_parallel() {
        let mut scene = Scene::new();
        let root = scene.root();
        let camera = scene.add_camera(root, Camera::orthographic(-2.0, 2.0, 2.0, -2.0, 0.1, 10.0)).unwrap();
        scene.graph.node_mut(camera).unwrap().set_position(Vec3::new(0.0, 0.0, 5.0));
        scene.update_matrix_world();

        let mut raycaster = Raycaster::default();
        raycaster.set_from_camera(Vec2::new(0.5, -0.5), &scene, camera).unwrap();

        assert_relative_eq!(raycaster.ray.direction, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
        assert_relative_eq!(raycaster.ray.origin.x, 1.0, epsilon = 1e-4);
        assert_relative_eq!(raycaster.ray.origin.y, -1.0, epsilon = 1e-4);
        assert_relative_eq!(raycaster.ray.origin.z, 5.0, epsilon = 1e-4);
    }

    #[test]
    fn test_non_camera_is_rejected() {
        let (scene, group, _) = quad_scene();
        let mut raycaster = Raycaster::default();

        assert_eq!(raycaster.set_from_camera(Vec2::zeros(), &scene, group), Err(SceneError::NodeNotFound(group)));
    }

    #[test]
    fn test_recursive_flag_and_layers() {
        let (mut scene, group, mesh) = quad_scene();
        let raycaster = Raycaster::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::z(), 0.0, f32::INFINITY);

        assert!(raycaster.intersect_object(&scene, group, false).is_empty());
        assert_eq!(raycaster.intersect_object(&scene, group, true).len(), 1);

        scene.graph.node_mut(mesh).unwrap().layers.set(2);
        assert!(raycaster.intersect_object(&scene, group, true).is_empty());

        scene.graph.node_mut(mesh).unwrap().layers.enable(0);
        scene.graph.node_mut(mesh).unwrap().visible = false;
        assert_eq!(raycaster.intersect_objects(&scene, &[mesh], false).len(), 1);
    }

    #[test]
    fn test_equal_distances_keep_traversal_order() {
        let (mut scene, group, first) = quad_scene();
        let geometry = scene.graph.node(first).unwrap().as_drawable().unwrap().geometry;
        let material = scene.add_material(Material::basic(Vec3::new(0.0, 1.0, 0.0)));
        let second = scene.add_mesh(group, geometry, material).unwrap();
        scene.update_matrix_world();
        let raycaster = Raycaster::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::z(), 0.0, f32::INFINITY);

        let in_order: Vec<NodeId> = raycaster.intersect_object(&scene, group, true).iter().map(|hit| hit.node).collect();
        assert_eq!(in_order, vec![first, second]);

        let swapped: Vec<NodeId> =
            raycaster.intersect_objects(&scene, &[second, first], false).iter().map(|hit| hit.node).collect();
        assert_eq!(swapped, vec![second, first]);
    }

    #[test]
    fn test_near_and_far_limits() {
        let (scene, _, mesh) = quad_scene();

        let too_far = Raycaster::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::z(), 0.0, 4.0);
        assert!(too_far.intersect_object(&scene, mesh, false).is_empty());

        let too_near = Raycaster::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::z(), 6.0, 10.0);
        assert!(too_near.intersect_object(&scene, mesh, false).is_empty());
    }
}
