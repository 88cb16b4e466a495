//! Transform hierarchy and geometry scenarios

use crate::foundation::math::{Euler, EulerOrder, Mat4, Vec3};
use crate::geometry::{BufferGeometry, ComponentType};
use crate::scene::{NodeId, Scene};

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn posed_chain(scene: &mut Scene, depth: usize) -> Vec<NodeId> {
        let mut parent = scene.root();
        let mut chain = Vec::new();
        for level in 0..depth {
            let id = scene.add_group(parent).unwrap();
            let node = scene.graph.node_mut(id).unwrap();
            let f = level as f32 + 1.0;
            node.set_position(Vec3::new(f, -0.5 * f, 0.25 * f));
            node.set_rotation(Euler::new(0.3 * f, -0.2 * f, 0.1 * f, EulerOrder::XYZ));
            node.set_scale(Vec3::new(1.0 + 0.1 * f, 0.9, 1.2));
            chain.push(id);
            parent = id;
        }
        chain
    }

    #[test]
    fn test_world_matrix_equals_product_of_locals() {
        let mut scene = Scene::new();
        let chain = posed_chain(&mut scene, 4);
        scene.update_matrix_world();

        let mut expected = Mat4::identity();
        for &id in &chain {
            let node = scene.graph.node(id).unwrap();
            expected *= node.local_matrix();
            assert_relative_eq!(*node.world_matrix(), expected, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_three_level_hierarchy() {
        let mut scene = Scene::new();
        let root = scene.root();
        let group = scene.add_group(root).unwrap();
        let geometry = scene.add_geometry(BufferGeometry::from_positions(&[Vec3::zeros(), Vec3::x(), Vec3::y()]));
        let material = scene.add_material(crate::render::resources::materials::Material::default());
        let mesh = scene.add_mesh(group, geometry, material).unwrap();
        scene.graph.node_mut(group).unwrap().set_position(Vec3::new(1.0, 0.0, 0.0));
        scene.graph.node_mut(mesh).unwrap().set_position(Vec3::new(0.0, 2.0, 0.0));

        scene.update_matrix_world();

        let world = scene.graph.node(mesh).unwrap().world_matrix();
        assert_relative_eq!(world.column(3).xyz(), Vec3::new(1.0, 2.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_reparenting_moves_child_and_world_transform() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.add_group(root).unwrap();
        let b = scene.add_group(root).unwrap();
        let child = scene.add_group(a).unwrap();
        scene.graph.node_mut(a).unwrap().set_position(Vec3::new(5.0, 0.0, 0.0));
        scene.graph.node_mut(b).unwrap().set_position(Vec3::new(0.0, 0.0, -5.0));
        scene.update_matrix_world();

        scene.graph.add(b, child).unwrap();
        scene.update_matrix_world();

        assert!(!scene.graph.children(a).contains(&child));
        assert_eq!(scene.graph.children(b), &[child]);
        assert_eq!(scene.graph.parent(child), Some(b));
        assert_relative_eq!(scene.graph.world_position(child).unwrap(), Vec3::new(0.0, 0.0, -5.0), epsilon = 1e-6);
    }

    #[test]
    fn test_index_width_follows_largest_value() {
        let mut geometry = BufferGeometry::new();

        geometry.set_index(vec![0, 1, 70_000]);
        assert_eq!(geometry.index().unwrap().component_type(), ComponentType::U32);

        geometry.set_index(vec![0, 1, 1_000]);
        assert_eq!(geometry.index().unwrap().component_type(), ComponentType::U16);
    }

    #[test]
    fn test_bounds_of_triangle_and_point_cloud() {
        let mut triangle = BufferGeometry::from_positions(&[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]);
        let aabb = triangle.compute_bounding_box().unwrap();
        assert_relative_eq!(aabb.min, Vec3::new(0.0, 0.0, 0.0));
        assert_relative_eq!(aabb.max, Vec3::new(1.0, 1.0, 0.0));

        let spiral: Vec<Vec3> = (0..200)
            .map(|i| {
                let t = i as f32 * 0.37;
                Vec3::new(t.cos() * (1.0 + 0.02 * t), t.sin() * 0.5, 0.03 * t - 1.0)
            })
            .collect();
        let mut cloud = BufferGeometry::from_positions(&spiral);
        let sphere = cloud.compute_bounding_sphere().unwrap();
        for point in &spiral {
            assert!((point - sphere.center).magnitude() <= sphere.radius + 1e-4);
        }
    }
}
