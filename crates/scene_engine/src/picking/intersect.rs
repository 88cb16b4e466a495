//! Per-primitive ray tests
//!
//! Every test follows the same shape: a cheap rejection against the world
//! bounding sphere, then the exact test in the node's local space, then the
//! hit is mapped back to world space and filtered by the raycaster's
//! near/far range.

use crate::foundation::bounds::BoundingSphere;
use crate::foundation::math::{inverse_or_identity, Mat4, Vec2, Vec3};
use crate::foundation::ray::Ray;
use crate::geometry::{BufferAttribute, BufferGeometry};
use crate::render::pipeline::Side;
use crate::render::resources::materials::{Material, MaterialType};
use crate::scene::{Drawable, LineTopology, Node, NodeId, Primitive, Scene};

use super::raycaster::Raycaster;

/// Triangle that was hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face {
    /// First vertex index
    pub a: usize,
    /// Second vertex index
    pub b: usize,
    /// Third vertex index
    pub c: usize,
    /// Geometric normal in local space
    pub normal: Vec3,
    /// Material slot of the group the triangle belongs to
    pub material_index: usize,
}

/// One ray hit
///
/// Fields that do not apply to the primitive that was hit are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Intersection {
    /// Distance from the ray origin to `point`
    pub distance: f32,
    /// Hit point in world space
    pub point: Vec3,
    /// Node that was hit
    pub node: NodeId,
    /// Triangle (meshes)
    pub face: Option<Face>,
    /// Triangle number within the geometry (meshes)
    pub face_index: Option<usize>,
    /// Interpolated `uv` (meshes, sprites)
    pub uv: Option<Vec2>,
    /// Interpolated `uv1` (meshes)
    pub uv1: Option<Vec2>,
    /// Interpolated vertex normal, facing the ray (meshes)
    pub normal: Option<Vec3>,
    /// Barycentric weights of the hit point (meshes)
    pub barycoord: Option<Vec3>,
    /// Element index of the segment start or point (lines, points)
    pub index: Option<usize>,
    /// Distance between the ray and the point (points)
    pub distance_to_ray: Option<f32>,
    /// Closest point on the segment in world space (lines)
    pub point_on_line: Option<Vec3>,
    /// Instance that was hit (instanced meshes)
    pub instance_id: Option<usize>,
}

impl Intersection {
    fn new(distance: f32, point: Vec3, node: NodeId) -> Self {
        Self {
            distance,
            point,
            node,
            face: None,
            face_index: None,
            uv: None,
            uv1: None,
            normal: None,
            barycoord: None,
            index: None,
            distance_to_ray: None,
            point_on_line: None,
            instance_id: None,
        }
    }
}

/// Test one drawable node and append its hits
pub(crate) fn intersect_drawable(
    raycaster: &Raycaster,
    scene: &Scene,
    id: NodeId,
    node: &Node,
    drawable: &Drawable,
    hits: &mut Vec<Intersection>,
) {
    let world = *node.world_matrix();

    if let Primitive::Sprite { center } = drawable.primitive {
        if let Some(material) = drawable.material.first().and_then(|m| scene.material(m)) {
            intersect_sprite(raycaster, id, &world, center, material, hits);
        }
        return;
    }

    let Some(geometry) = scene.geometry(drawable.geometry) else {
        return;
    };

    match drawable.primitive {
        Primitive::Mesh => match &drawable.instances {
            Some(instances) => {
                if let Some(sphere) = geometry.bounding_sphere() {
                    let sphere = instances.bounding_sphere(sphere).transformed(&world);
                    if !raycaster.ray.intersects_sphere(&sphere) {
                        return;
                    }
                }
                for (instance, matrix) in instances.matrices().iter().enumerate() {
                    let first = hits.len();
                    intersect_mesh(raycaster, scene, id, drawable, geometry, &(world * matrix), hits);
                    for hit in &mut hits[first..] {
                        hit.instance_id = Some(instance);
                    }
                }
            }
            None => intersect_mesh(raycaster, scene, id, drawable, geometry, &world, hits),
        },
        Primitive::Line(topology) => intersect_line(raycaster, id, geometry, topology, &world, hits),
        Primitive::Points => intersect_points(raycaster, id, geometry, &world, hits),
        Primitive::Sprite { .. } => {}
    }
}

/// Reads vertex positions with morph targets applied
struct MeshVertices<'a> {
    position: &'a BufferAttribute,
    targets: &'a [BufferAttribute],
    influences: &'a [f32],
    relative: bool,
}

impl<'a> MeshVertices<'a> {
    fn new(geometry: &'a BufferGeometry, drawable: &'a Drawable) -> Option<Self> {
        Some(Self {
            position: geometry.get_attribute("position")?,
            targets: geometry.morph_attribute("position").unwrap_or(&[]),
            influences: &drawable.morph_target_influences,
            relative: geometry.morph_targets_relative,
        })
    }

    fn get(&self, index: usize) -> Vec3 {
        let base = self.position.get_vec3(index);
        let mut offset = Vec3::zeros();
        for (target, &influence) in self.targets.iter().zip(self.influences) {
            if influence == 0.0 {
                continue;
            }
            let value = target.get_vec3(index);
            offset += if self.relative { value * influence } else { (value - base) * influence };
        }
        base + offset
    }
}

/// Rejects the node when the ray misses its world bounding sphere
///
/// A geometry without a computed sphere is never rejected here.
fn misses_sphere(raycaster: &Raycaster, sphere: Option<&BoundingSphere>, world: &Mat4, padding: f32) -> bool {
    let Some(sphere) = sphere else {
        return false;
    };
    let mut sphere = sphere.transformed(world);
    sphere.radius += padding;
    if sphere.contains_point(&raycaster.ray.origin) {
        return false;
    }
    match raycaster.ray.intersect_sphere(&sphere) {
        Some(entry) => {
            let range = raycaster.far - raycaster.near;
            (entry - raycaster.ray.origin).magnitude_squared() > range * range
        }
        None => true,
    }
}

fn within_range(raycaster: &Raycaster, distance: f32) -> bool {
    distance >= raycaster.near && distance <= raycaster.far
}

fn axis_scales(world: &Mat4) -> Vec3 {
    Vec3::new(
        world.column(0).xyz().magnitude(),
        world.column(1).xyz().magnitude(),
        world.column(2).xyz().magnitude(),
    )
}

/// Element ranges to test: the draw range, split by groups for multi-material meshes
fn element_spans(drawable: &Drawable, geometry: &BufferGeometry) -> Vec<(usize, usize, usize)> {
    let range = geometry.draw_range();
    let range_end = range.start.saturating_add(range.count).min(geometry.element_count());

    if drawable.material.is_multi() && !geometry.groups().is_empty() {
        geometry
            .groups()
            .iter()
            .map(|group| {
                let start = group.start.max(range.start);
                let end = group.start.saturating_add(group.count).min(range_end);
                (start, end, group.material_index)
            })
            .collect()
    } else {
        vec![(range.start, range_end, 0)]
    }
}

fn intersect_mesh(
    raycaster: &Raycaster,
    scene: &Scene,
    id: NodeId,
    drawable: &Drawable,
    geometry: &BufferGeometry,
    world: &Mat4,
    hits: &mut Vec<Intersection>,
) {
    if drawable.material.first().and_then(|m| scene.material(m)).is_none() {
        return;
    }
    if misses_sphere(raycaster, geometry.bounding_sphere(), world, 0.0) {
        return;
    }

    let local_ray = raycaster.ray.transformed(&inverse_or_identity(world));
    if let Some(aabb) = geometry.bounding_box() {
        if !local_ray.intersects_box(aabb) {
            return;
        }
    }

    let Some(vertices) = MeshVertices::new(geometry, drawable) else {
        return;
    };
    let index = geometry.index_values();

    for (start, end, material_index) in element_spans(drawable, geometry) {
        let Some(material) = drawable.material.get(material_index).and_then(|m| scene.material(m)) else {
            continue;
        };
        let mut j = start;
        while j + 2 < end {
            let (a, b, c) = match &index {
                Some(values) => (values[j], values[j + 1], values[j + 2]),
                None => (j, j + 1, j + 2),
            };
            let triangle = TriangleHit { a, b, c, face_index: j / 3, material_index };
            if let Some(hit) = triangle.test(raycaster, &local_ray, material, geometry, &vertices, world, id) {
                hits.push(hit);
            }
            j += 3;
        }
    }
}

struct TriangleHit {
    a: usize,
    b: usize,
    c: usize,
    face_index: usize,
    material_index: usize,
}

impl TriangleHit {
    fn test(
        &self,
        raycaster: &Raycaster,
        local_ray: &Ray,
        material: &Material,
        geometry: &BufferGeometry,
        vertices: &MeshVertices<'_>,
        world: &Mat4,
        id: NodeId,
    ) -> Option<Intersection> {
        let (pa, pb, pc) = (vertices.get(self.a), vertices.get(self.b), vertices.get(self.c));

        let local_point = match material.side {
            Side::Back => local_ray.intersect_triangle(&pc, &pb, &pa, true),
            Side::Front => local_ray.intersect_triangle(&pa, &pb, &pc, true),
            Side::Double => local_ray.intersect_triangle(&pa, &pb, &pc, false),
        }?;

        let point = world.transform_point(&local_point.into()).coords;
        let distance = (point - raycaster.ray.origin).magnitude();
        if !within_range(raycaster, distance) {
            return None;
        }

        let mut hit = Intersection::new(distance, point, id);
        let normal = (pb - pa).cross(&(pc - pa));
        let normal = if normal.magnitude_squared() > 0.0 { normal.normalize() } else { normal };
        hit.face = Some(Face { a: self.a, b: self.b, c: self.c, normal, material_index: self.material_index });
        hit.face_index = Some(self.face_index);

        if let Some(weights) = barycoord(&local_point, &pa, &pb, &pc) {
            hit.barycoord = Some(weights);
            hit.uv = geometry.get_attribute("uv").map(|uv| self.interpolate_vec2(uv, &weights));
            hit.uv1 = geometry.get_attribute("uv1").map(|uv| self.interpolate_vec2(uv, &weights));
            hit.normal = geometry.get_attribute("normal").map(|attribute| {
                let normal = attribute.get_vec3(self.a) * weights.x
                    + attribute.get_vec3(self.b) * weights.y
                    + attribute.get_vec3(self.c) * weights.z;
                if normal.dot(&local_ray.direction) > 0.0 {
                    -normal
                } else {
                    normal
                }
            });
        }
        Some(hit)
    }

    fn interpolate_vec2(&self, attribute: &BufferAttribute, weights: &Vec3) -> Vec2 {
        attribute.get_vec2(self.a) * weights.x + attribute.get_vec2(self.b) * weights.y + attribute.get_vec2(self.c) * weights.z
    }
}

/// Weights of `a`, `b` and `c` for `point`; `None` for degenerate triangles
fn barycoord(point: &Vec3, a: &Vec3, b: &Vec3, c: &Vec3) -> Option<Vec3> {
    let v0 = c - a;
    let v1 = b - a;
    let v2 = point - a;

    let dot00 = v0.dot(&v0);
    let dot01 = v0.dot(&v1);
    let dot02 = v0.dot(&v2);
    let dot11 = v1.dot(&v1);
    let dot12 = v1.dot(&v2);

    let denom = dot00 * dot11 - dot01 * dot01;
    if denom == 0.0 {
        return None;
    }
    let inv = 1.0 / denom;
    let u = (dot11 * dot02 - dot01 * dot12) * inv;
    let v = (dot00 * dot12 - dot01 * dot02) * inv;
    Some(Vec3::new(1.0 - u - v, v, u))
}

/// Threshold in world units converted to the node's local space
fn local_threshold(world: &Mat4, threshold: f32) -> f32 {
    let scale = axis_scales(world);
    let average = (scale.x + scale.y + scale.z) / 3.0;
    if average > 0.0 {
        threshold / average
    } else {
        threshold
    }
}

fn element_range(geometry: &BufferGeometry) -> (usize, usize) {
    let range = geometry.draw_range();
    (range.start, range.start.saturating_add(range.count).min(geometry.element_count()))
}

fn intersect_line(
    raycaster: &Raycaster,
    id: NodeId,
    geometry: &BufferGeometry,
    topology: LineTopology,
    world: &Mat4,
    hits: &mut Vec<Intersection>,
) {
    let threshold = raycaster.params.line_threshold;
    if misses_sphere(raycaster, geometry.bounding_sphere(), world, threshold) {
        return;
    }
    let Some(position) = geometry.get_attribute("position") else {
        return;
    };

    let local_ray = raycaster.ray.transformed(&inverse_or_identity(world));
    let threshold_sq = local_threshold(world, threshold).powi(2);
    let index = geometry.index_values();
    let vertex = |i: usize| match &index {
        Some(values) => values[i],
        None => i,
    };

    let (start, end) = element_range(geometry);
    if end <= start {
        return;
    }
    let step = if topology == LineTopology::Segments { 2 } else { 1 };

    let mut test_segment = |from: usize, to: usize, element: usize| {
        let (v0, v1) = (position.get_vec3(vertex(from)), position.get_vec3(vertex(to)));
        let approach = local_ray.distance_sq_to_segment(&v0, &v1);
        if approach.distance_sq > threshold_sq {
            return;
        }
        let on_ray = world.transform_point(&approach.point_on_ray.into()).coords;
        let distance = (on_ray - raycaster.ray.origin).magnitude();
        if !within_range(raycaster, distance) {
            return;
        }
        let on_line = world.transform_point(&approach.point_on_segment.into()).coords;
        let mut hit = Intersection::new(distance, on_line, id);
        hit.point_on_line = Some(on_line);
        hit.index = Some(element);
        hits.push(hit);
    };

    let mut i = start;
    while i + 1 < end {
        test_segment(i, i + 1, i);
        i += step;
    }
    if topology == LineTopology::Loop && end - start > 1 {
        test_segment(end - 1, start, end - 1);
    }
}

fn intersect_points(raycaster: &Raycaster, id: NodeId, geometry: &BufferGeometry, world: &Mat4, hits: &mut Vec<Intersection>) {
    let threshold = raycaster.params.points_threshold;
    if misses_sphere(raycaster, geometry.bounding_sphere(), world, threshold) {
        return;
    }
    let Some(position) = geometry.get_attribute("position") else {
        return;
    };

    let local_ray = raycaster.ray.transformed(&inverse_or_identity(world));
    let threshold_sq = local_threshold(world, threshold).powi(2);
    let index = geometry.index_values();

    let (start, end) = element_range(geometry);
    for element in start..end {
        let vertex = index.as_ref().map_or(element, |values| values[element]);
        let point = position.get_vec3(vertex);
        let ray_distance_sq = local_ray.distance_sq_to_point(&point);
        if ray_distance_sq >= threshold_sq {
            continue;
        }
        let closest = world.transform_point(&local_ray.closest_point_to_point(&point).into()).coords;
        let distance = (closest - raycaster.ray.origin).magnitude();
        if !within_range(raycaster, distance) {
            continue;
        }
        let mut hit = Intersection::new(distance, closest, id);
        hit.distance_to_ray = Some(ray_distance_sq.sqrt());
        hit.index = Some(element);
        hits.push(hit);
    }
}

/// Sprite quad rebuilt facing the camera the ray came from
fn intersect_sprite(
    raycaster: &Raycaster,
    id: NodeId,
    world: &Mat4,
    center: Vec2,
    material: &Material,
    hits: &mut Vec<Intersection>,
) {
    let Some(camera) = raycaster.camera else {
        log::error!("Sprite {:?} needs a raycaster built with set_from_camera", id);
        return;
    };

    let (rotation, size_attenuation) = match material.material_type {
        MaterialType::Sprite { rotation, size_attenuation } => (rotation, size_attenuation),
        _ => (0.0, true),
    };

    let model_view = camera.view * world;
    let mv_position = model_view.column(3).xyz();
    let mut scale = axis_scales(world);
    if camera.perspective && !size_attenuation {
        scale *= -mv_position.z;
    }
    let (sin, cos) = rotation.sin_cos();

    let corner = |x: f32, y: f32| {
        let aligned = Vec2::new((x - center.x + 0.5) * scale.x, (y - center.y + 0.5) * scale.y);
        let rotated = Vec2::new(cos * aligned.x - sin * aligned.y, sin * aligned.x + cos * aligned.y);
        let view = Vec3::new(mv_position.x + rotated.x, mv_position.y + rotated.y, mv_position.z);
        camera.world.transform_point(&view.into()).coords
    };

    let va = corner(-0.5, -0.5);
    let vc = corner(0.5, 0.5);
    let uva = Vec2::new(0.0, 0.0);
    let uvc = Vec2::new(1.0, 1.0);

    let mut vb = corner(0.5, -0.5);
    let mut uvb = Vec2::new(1.0, 0.0);
    let mut point = raycaster.ray.intersect_triangle(&va, &vb, &vc, false);
    if point.is_none() {
        vb = corner(-0.5, 0.5);
        uvb = Vec2::new(0.0, 1.0);
        point = raycaster.ray.intersect_triangle(&va, &vc, &vb, false);
    }
    let Some(point) = point else {
        return;
    };

    let distance = (point - raycaster.ray.origin).magnitude();
    if !within_range(raycaster, distance) {
        return;
    }

    let mut hit = Intersection::new(distance, point, id);
    hit.uv = barycoord(&point, &va, &vb, &vc).map(|w| uva * w.x + uvb * w.y + uvc * w.z);
    hits.push(hit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Instances;
    use approx::assert_relative_eq;
    use nalgebra::Translation3;

    fn triangle() -> BufferGeometry {
        let mut geometry = BufferGeometry::from_positions(&[
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]);
        geometry.compute_bounding_sphere().unwrap();
        geometry
    }

    fn down_z(x: f32, y: f32) -> Raycaster {
        Raycaster::new(Vec3::new(x, y, 5.0), -Vec3::z(), 0.0, f32::INFINITY)
    }

    fn sided(side: Side) -> Material {
        let mut material = Material::basic(Vec3::new(1.0, 1.0, 1.0));
        material.side = side;
        material
    }

    fn mesh_scene(geometry: BufferGeometry, material: Material) -> (Scene, NodeId) {
        let mut scene = Scene::new();
        let root = scene.root();
        let geometry = scene.add_geometry(geometry);
        let material = scene.add_material(material);
        let mesh = scene.add_mesh(root, geometry, material).unwrap();
        scene.update_matrix_world();
        (scene, mesh)
    }

    #[test]
    fn test_triangle_hit_distance_point_and_attributes() {
        let mut geometry = triangle();
        geometry.set_attribute(
            "uv",
            BufferAttribute::from_vec2s(&[Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.5, 1.0)]),
        );
        let (scene, mesh) = mesh_scene(geometry, Material::basic(Vec3::new(1.0, 1.0, 1.0)));

        let hits = down_z(0.0, 0.0).intersect_object(&scene, mesh, false);

        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.node, mesh);
        assert_relative_eq!(hit.distance, 5.0, epsilon = 1e-5);
        assert_relative_eq!(hit.point, Vec3::zeros(), epsilon = 1e-5);
        assert_eq!(hit.face_index, Some(0));
        let face = hit.face.unwrap();
        assert_eq!((face.a, face.b, face.c), (0, 1, 2));
        assert_relative_eq!(face.normal, Vec3::z(), epsilon = 1e-5);
        assert_relative_eq!(hit.barycoord.unwrap(), Vec3::new(0.25, 0.25, 0.5), epsilon = 1e-5);
        assert_relative_eq!(hit.uv.unwrap(), Vec2::new(0.5, 0.5), epsilon = 1e-5);
        assert!(hit.uv1.is_none());
    }

    #[test]
    fn test_hits_are_sorted_nearest_first() {
        let mut scene = Scene::new();
        let root = scene.root();
        let geometry = scene.add_geometry(triangle());
        let material = scene.add_material(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        let far = scene.add_mesh(root, geometry, material).unwrap();
        let near = scene.add_mesh(root, geometry, material).unwrap();
        scene.graph.node_mut(far).unwrap().set_position(Vec3::new(0.0, 0.0, -2.0));
        scene.graph.node_mut(near).unwrap().set_position(Vec3::new(0.0, 0.0, 1.0));
        scene.update_matrix_world();

        let hits = down_z(0.0, 0.0).intersect_object(&scene, root, true);

        assert_eq!(hits.iter().map(|h| h.node).collect::<Vec<_>>(), vec![near, far]);
        assert_relative_eq!(hits[0].distance, 4.0, epsilon = 1e-5);
        assert_relative_eq!(hits[1].distance, 7.0, epsilon = 1e-5);
    }

    #[test]
    fn test_material_side_decides_back_face_hits() {
        let from_behind = Raycaster::new(Vec3::new(0.0, 0.0, -5.0), Vec3::z(), 0.0, f32::INFINITY);

        for (side, expected) in [(Side::Front, 0), (Side::Back, 1), (Side::Double, 1)] {
            let (scene, mesh) = mesh_scene(triangle(), sided(side));
            assert_eq!(from_behind.intersect_object(&scene, mesh, false).len(), expected, "{:?}", side);
        }

        let (scene, mesh) = mesh_scene(triangle(), sided(Side::Back));
        assert!(down_z(0.0, 0.0).intersect_object(&scene, mesh, false).is_empty());
    }

    #[test]
    fn test_interpolated_normal_faces_the_ray() {
        let mut geometry = triangle();
        geometry.set_attribute("normal", BufferAttribute::from_vec3s(&[Vec3::z(), Vec3::z(), Vec3::z()]));
        let (scene, mesh) = mesh_scene(geometry, sided(Side::Double));

        let from_behind = Raycaster::new(Vec3::new(0.0, 0.0, -5.0), Vec3::z(), 0.0, f32::INFINITY);
        let hits = from_behind.intersect_object(&scene, mesh, false);

        assert_relative_eq!(hits[0].normal.unwrap(), -Vec3::z(), epsilon = 1e-5);
    }

    #[test]
    fn test_groups_report_material_index_and_respect_draw_range() {
        let mut geometry = BufferGeometry::from_positions(&[
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(0.0, 1.0, -1.0),
        ]);
        geometry.add_group(0, 3, 0);
        geometry.add_group(3, 3, 1);

        let mut scene = Scene::new();
        let root = scene.root();
        let geometry = scene.add_geometry(geometry);
        let first = scene.add_material(Material::basic(Vec3::new(1.0, 0.0, 0.0)));
        let second = scene.add_material(Material::basic(Vec3::new(0.0, 1.0, 0.0)));
        let mesh = scene.add_drawable(root, Drawable::multi_material_mesh(geometry, vec![first, second])).unwrap();
        scene.update_matrix_world();

        let hits = down_z(0.0, 0.0).intersect_object(&scene, mesh, false);
        let faces: Vec<_> = hits.iter().map(|h| (h.face_index, h.face.map(|f| f.material_index))).collect();
        assert_eq!(faces, vec![(Some(0), Some(0)), (Some(1), Some(1))]);

        scene.geometry_mut(geometry).unwrap().set_draw_range(0, 3);
        assert_eq!(down_z(0.0, 0.0).intersect_object(&scene, mesh, false).len(), 1);
    }

    #[test]
    fn test_morph_targets_move_the_hit() {
        let mut geometry = triangle();
        let offset = Vec3::new(0.0, 0.0, 2.0);
        geometry.set_morph_attribute("position", vec![BufferAttribute::from_vec3s(&[offset, offset, offset])]);
        geometry.morph_targets_relative = true;
        geometry.compute_bounding_sphere().unwrap();
        let (mut scene, mesh) = mesh_scene(geometry, Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        if let Some(drawable) = scene.graph.node_mut(mesh).unwrap().as_drawable_mut() {
            drawable.morph_target_influences = vec![0.5];
        }

        let hits = down_z(0.0, 0.0).intersect_object(&scene, mesh, false);

        assert_relative_eq!(hits[0].distance, 4.0, epsilon = 1e-5);
        assert_relative_eq!(hits[0].point, Vec3::new(0.0, 0.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_instanced_mesh_reports_instance() {
        let mut scene = Scene::new();
        let root = scene.root();
        let geometry = scene.add_geometry(triangle());
        let material = scene.add_material(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        let instances = Instances::new(
            [-3.0, 0.0, 3.0].iter().map(|&x| Translation3::new(x, 0.0, 0.0).to_homogeneous()).collect(),
        );
        let mesh = scene.add_drawable(root, Drawable::instanced_mesh(geometry, material, instances)).unwrap();
        scene.update_matrix_world();

        let hits = down_z(3.0, 0.0).intersect_object(&scene, mesh, false);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].instance_id, Some(2));
        assert_relative_eq!(hits[0].point, Vec3::new(3.0, 0.0, 0.0), epsilon = 1e-5);
    }

    fn line_scene(positions: &[Vec3], topology: LineTopology) -> (Scene, NodeId) {
        let mut geometry = BufferGeometry::from_positions(positions);
        geometry.compute_bounding_sphere().unwrap();
        let mut scene = Scene::new();
        let root = scene.root();
        let geometry = scene.add_geometry(geometry);
        let material = scene.add_material(Material::line_basic(Vec3::new(1.0, 1.0, 1.0)));
        let line = scene.add_line(root, geometry, material, topology).unwrap();
        scene.update_matrix_world();
        (scene, line)
    }

    #[test]
    fn test_line_threshold() {
        let (scene, line) = line_scene(&[Vec3::new(-1.0, 0.5, 0.0), Vec3::new(1.0, 0.5, 0.0)], LineTopology::Strip);

        let raycaster = down_z(0.0, 0.0);
        let hits = raycaster.intersect_object(&scene, line, false);
        assert_eq!(hits.len(), 1);
        assert_relative_eq!(hits[0].distance, 5.0, epsilon = 1e-5);
        assert_relative_eq!(hits[0].point_on_line.unwrap(), Vec3::new(0.0, 0.5, 0.0), epsilon = 1e-5);
        assert_eq!(hits[0].index, Some(0));

        let mut tight = down_z(0.0, 0.0);
        tight.params.line_threshold = 0.25;
        assert!(tight.intersect_object(&scene, line, false).is_empty());
    }

    #[test]
    fn test_line_loop_tests_closing_segment() {
        let positions = [Vec3::new(-1.0, 0.5, 0.0), Vec3::new(-1.0, 2.0, 0.0), Vec3::new(1.0, 0.5, 0.0)];
        let mut raycaster = down_z(0.0, 0.5);
        raycaster.params.line_threshold = 0.3;

        let (strip, line) = line_scene(&positions, LineTopology::Strip);
        assert!(raycaster.intersect_object(&strip, line, false).is_empty());

        let (looped, line) = line_scene(&positions, LineTopology::Loop);
        let hits = raycaster.intersect_object(&looped, line, false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, Some(2));
    }

    #[test]
    fn test_points_within_threshold() {
        let mut geometry = BufferGeometry::from_positions(&[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::new(0.5, 0.0, -1.0),
        ]);
        geometry.compute_bounding_sphere().unwrap();
        let mut scene = Scene::new();
        let root = scene.root();
        let geometry = scene.add_geometry(geometry);
        let material = scene.add_material(Material::points(Vec3::new(1.0, 1.0, 1.0), 2.0));
        let points = scene.add_points(root, geometry, material).unwrap();
        scene.update_matrix_world();

        let mut raycaster = down_z(0.0, 0.0);
        raycaster.params.points_threshold = 0.6;
        let hits = raycaster.intersect_object(&scene, points, false);

        assert_eq!(hits.iter().map(|h| h.index).collect::<Vec<_>>(), vec![Some(0), Some(2)]);
        assert_relative_eq!(hits[1].distance, 6.0, epsilon = 1e-5);
        assert_relative_eq!(hits[1].distance_to_ray.unwrap(), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_sprite_faces_camera() {
        let mut scene = Scene::new();
        let root = scene.root();
        let material = scene.add_material(Material::sprite(Vec3::new(1.0, 1.0, 1.0)));
        let sprite = scene.add_sprite(root, material).unwrap();
        let camera = scene.add_camera(root, crate::scene::Camera::perspective(60.0, 1.0, 0.1, 100.0)).unwrap();
        scene.graph.node_mut(camera).unwrap().set_position(Vec3::new(0.0, 0.0, 5.0));
        scene.update_matrix_world();

        let without_camera = down_z(0.2, -0.1);
        assert!(without_camera.intersect_object(&scene, sprite, false).is_empty());

        let mut raycaster = Raycaster::default();
        raycaster.set_from_camera(Vec2::zeros(), &scene, camera).unwrap();

        raycaster.set(Vec3::new(0.2, -0.1, 5.0), -Vec3::z());
        let hits = raycaster.intersect_object(&scene, sprite, false);
        assert_eq!(hits.len(), 1);
        assert_relative_eq!(hits[0].distance, 5.0, epsilon = 1e-4);
        assert_relative_eq!(hits[0].uv.unwrap(), Vec2::new(0.7, 0.4), epsilon = 1e-4);

        raycaster.set(Vec3::new(-0.2, 0.1, 5.0), -Vec3::z());
        let hits = raycaster.intersect_object(&scene, sprite, false);
        assert_relative_eq!(hits[0].uv.unwrap(), Vec2::new(0.3, 0.6), epsilon = 1e-4);

        raycaster.set(Vec3::new(0.8, 0.0, 5.0), -Vec3::z());
        assert!(raycaster.intersect_object(&scene, sprite, false).is_empty());
    }
}
