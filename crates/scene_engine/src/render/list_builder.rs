//! Scene projection into a render list
//!
//! Walks the visible part of the graph once per frame. Lights are collected;
//! drawables that pass the layer and frustum tests become one render item
//! per material (per geometry group for multi-material drawables).

use crate::foundation::bounds::{BoundingSphere, Frustum};
use crate::foundation::logging::DiagnosticLog;
use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::geometry::BufferGeometry;
use crate::render::lighting::CollectedLight;
use crate::render::render_list::{Bucket, RenderItem, RenderList};
use crate::render::resources::materials::Material;
use crate::scene::{Drawable, Layers, MaterialId, MaterialSlot, Node, NodeId, NodeKind, Scene};

/// Camera-derived inputs of a projection pass
#[derive(Debug, Clone)]
pub struct ViewInfo {
    /// Projection times view
    pub view_projection: Mat4,
    /// World-space frustum
    pub frustum: Frustum,
    /// Camera layers
    pub layers: Layers,
    /// Compute depth for sorting
    pub sort_objects: bool,
}

impl ViewInfo {
    /// View of the camera node `camera`; `None` when it is not a camera
    pub fn from_camera(scene: &Scene, camera: NodeId, sort_objects: bool) -> Option<Self> {
        let node = scene.graph.node(camera)?;
        let camera = node.as_camera()?;
        Some(Self {
            view_projection: camera.view_projection(),
            frustum: camera.frustum(),
            layers: node.layers,
            sort_objects,
        })
    }
}

/// Number of elements a drawable would draw; 0 means skip
pub fn draw_count(geometry: &BufferGeometry) -> usize {
    let range = geometry.draw_range();
    let available = geometry.element_count().saturating_sub(range.start);
    range.count.min(available)
}

/// Bucket a material belongs to
pub fn bucket_for(material: &Material) -> Bucket {
    if material.transmission > 0.0 {
        Bucket::Transmissive
    } else if material.transparent {
        Bucket::Transparent
    } else {
        Bucket::Opaque
    }
}

fn depth_of(center: &Vec3, view_projection: &Mat4) -> f32 {
    let clip = view_projection * Vec4::new(center.x, center.y, center.z, 1.0);
    if clip.w.abs() > f32::EPSILON {
        clip.z / clip.w
    } else {
        clip.z
    }
}

/// Result of culling one drawable
struct Culled {
    center: Vec3,
    visible_instances: Option<Vec<usize>>,
}

fn cull(
    node: &Node,
    drawable: &Drawable,
    sphere: Option<&BoundingSphere>,
    view: &ViewInfo,
) -> Option<Culled> {
    let world = node.world_matrix();
    let Some(sphere) = sphere else {
        let position = Vec3::new(world.m14, world.m24, world.m34);
        return Some(Culled { center: position, visible_instances: None });
    };

    match &drawable.instances {
        Some(instances) if instances.per_instance_culling => {
            let visible: Vec<usize> = instances
                .matrices()
                .iter()
                .enumerate()
                .filter(|(_, matrix)| {
                    !node.frustum_culled || view.frustum.intersects_sphere(&sphere.transformed(&(world * *matrix)))
                })
                .map(|(i, _)| i)
                .collect();
            if visible.is_empty() {
                return None;
            }
            let center = instances.bounding_sphere(sphere).transformed(world).center;
            Some(Culled { center, visible_instances: Some(visible) })
        }
        Some(instances) => {
            let bounds = instances.bounding_sphere(sphere).transformed(world);
            (!node.frustum_culled || view.frustum.intersects_sphere(&bounds))
                .then_some(Culled { center: bounds.center, visible_instances: None })
        }
        None => {
            let bounds = sphere.transformed(world);
            (!node.frustum_culled || view.frustum.intersects_sphere(&bounds))
                .then_some(Culled { center: bounds.center, visible_instances: None })
        }
    }
}

/// Fill `list` and `lights` from the visible part of `scene`
///
/// The list must already be initialized for the frame. Returns the number
/// of items pushed.
pub fn project_scene(
    scene: &Scene,
    view: &ViewInfo,
    list: &mut RenderList,
    lights: &mut Vec<CollectedLight>,
    diagnostics: &mut DiagnosticLog,
) -> usize {
    let before = list.len();
    let mut stack: Vec<(NodeId, i32)> = vec![(scene.root(), 0)];

    while let Some((id, group_order)) = stack.pop() {
        let Some(node) = scene.graph.node(id) else {
            continue;
        };
        if !node.visible {
            continue;
        }

        let mut child_group_order = group_order;
        if node.layers.test(&view.layers) {
            match node.kind() {
                NodeKind::Group => child_group_order = node.render_order,
                NodeKind::Light(light) => lights.push(CollectedLight {
                    light: *light,
                    world: *node.world_matrix(),
                    cast_shadow: node.cast_shadow,
                }),
                NodeKind::Drawable(drawable) => {
                    project_drawable(scene, id, node, drawable, group_order, view, list, diagnostics);
                }
                NodeKind::Camera(_) => {}
            }
        }

        stack.extend(node.children().iter().rev().map(|&child| (child, child_group_order)));
    }

    list.len() - before
}

#[allow(clippy::too_many_arguments)]
fn project_drawable(
    scene: &Scene,
    id: NodeId,
    node: &Node,
    drawable: &Drawable,
    group_order: i32,
    view: &ViewInfo,
    list: &mut RenderList,
    diagnostics: &mut DiagnosticLog,
) {
    let Some(geometry) = scene.geometry(drawable.geometry) else {
        diagnostics.warn_once(
            format!("missing-geometry:{id:?}"),
            format!("Node '{}' references a missing geometry; skipped", node.name),
        );
        return;
    };
    if draw_count(geometry) == 0 {
        return;
    }
    if drawable.instances.as_ref().is_some_and(|instances| instances.count() == 0) {
        return;
    }

    let sphere = geometry.bounding_sphere();
    if sphere.is_none() && node.frustum_culled {
        diagnostics.warn_once(
            format!("no-bounds:{id:?}"),
            format!("Node '{}' has no usable bounding sphere; skipped", node.name),
        );
        return;
    }

    let Some(culled) = cull(node, drawable, sphere, view) else {
        return;
    };
    let z = if view.sort_objects { depth_of(&culled.center, &view.view_projection) } else { 0.0 };

    let mut push = |material_id: MaterialId, group| {
        let Some(material) = scene.material(material_id) else {
            diagnostics.warn_once(
                format!("missing-material:{id:?}:{material_id:?}"),
                format!("Node '{}' references a missing material; skipped", node.name),
            );
            return;
        };
        if !material.visible {
            return;
        }
        list.push(
            RenderItem {
                node: id,
                node_serial: node.id(),
                geometry: drawable.geometry,
                material: material_id,
                group,
                group_order,
                render_order: node.render_order,
                material_serial: material.serial(),
                z,
                visible_instances: culled.visible_instances.clone(),
            },
            bucket_for(material),
        );
    };

    match &drawable.material {
        MaterialSlot::Multi(_) if !geometry.groups().is_empty() => {
            for group in geometry.groups() {
                if group.count == 0 {
                    continue;
                }
                if let Some(material) = drawable.material.get(group.material_index) {
                    push(material, Some(*group));
                }
            }
        }
        slot => {
            if let Some(material) = slot.first() {
                push(material, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::resources::materials::Material;
    use crate::scene::{Camera, Instances, Light};
    use nalgebra::Translation3;

    struct Fixture {
        scene: Scene,
        camera: NodeId,
        geometry: crate::scene::GeometryId,
        material: MaterialId,
    }

    fn fixture() -> Fixture {
        let mut scene = Scene::new();
        let root = scene.root();
        let camera = scene.add_camera(root, Camera::perspective(60.0, 1.0, 0.1, 100.0)).unwrap();
        scene.graph.node_mut(camera).unwrap().set_position(Vec3::new(0.0, 0.0, 10.0));
        let geometry = scene.add_geometry(BufferGeometry::from_positions(&[
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]));
        let material = scene.add_material(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        Fixture { scene, camera, geometry, material }
    }

    fn project(fixture: &mut Fixture) -> (RenderList, Vec<CollectedLight>) {
        fixture.scene.update_matrix_world();
        fixture.scene.compute_missing_bounds();
        let view = ViewInfo::from_camera(&fixture.scene, fixture.camera, true).unwrap();
        let mut list = RenderList::new();
        let mut lights = Vec::new();
        list.init();
        project_scene(&fixture.scene, &view, &mut list, &mut lights, &mut DiagnosticLog::new());
        (list, lights)
    }

    #[test]
    fn test_frustum_and_visibility() {
        let mut f = fixture();
        let root = f.scene.root();
        let inside = f.scene.add_mesh(root, f.geometry, f.material).unwrap();
        let behind = f.scene.add_mesh(root, f.geometry, f.material).unwrap();
        f.scene.graph.node_mut(behind).unwrap().set_position(Vec3::new(0.0, 0.0, 50.0));
        let hidden_parent = f.scene.add_group(root).unwrap();
        f.scene.add_mesh(hidden_parent, f.geometry, f.material).unwrap();
        f.scene.graph.node_mut(hidden_parent).unwrap().visible = false;

        let (list, _) = project(&mut f);
        let nodes: Vec<NodeId> = list.iter().map(|item| item.node).collect();
        assert_eq!(nodes, vec![inside]);
    }

    #[test]
    fn test_culling_can_be_disabled() {
        let mut f = fixture();
        let root = f.scene.root();
        let behind = f.scene.add_mesh(root, f.geometry, f.material).unwrap();
        let node = f.scene.graph.node_mut(behind).unwrap();
        node.set_position(Vec3::new(0.0, 0.0, 50.0));
        node.frustum_culled = false;

        let (list, _) = project(&mut f);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_layers_filter_drawables_but_not_children() {
        let mut f = fixture();
        let root = f.scene.root();
        let parent = f.scene.add_mesh(root, f.geometry, f.material).unwrap();
        let child = f.scene.add_mesh(parent, f.geometry, f.material).unwrap();
        f.scene.graph.node_mut(parent).unwrap().layers.set(3);

        let (list, _) = project(&mut f);
        let nodes: Vec<NodeId> = list.iter().map(|item| item.node).collect();
        assert_eq!(nodes, vec![child]);
    }

    #[test]
    fn test_group_order_and_buckets() {
        let mut f = fixture();
        let root = f.scene.root();
        let group = f.scene.add_group(root).unwrap();
        f.scene.graph.node_mut(group).unwrap().render_order = 4;
        let transparent = f.scene.add_material(Material::basic(Vec3::new(1.0, 0.0, 0.0)).with_transparency(0.5));
        let mut glass = Material::physical(Vec3::new(1.0, 1.0, 1.0), 0.0, 0.0);
        glass.transmission = 1.0;
        let glass = f.scene.add_material(glass);

        f.scene.add_mesh(group, f.geometry, transparent).unwrap();
        f.scene.add_mesh(root, f.geometry, glass).unwrap();
        f.scene.add_mesh(root, f.geometry, f.material).unwrap();

        let (list, _) = project(&mut f);
        assert_eq!(list.opaque().count(), 1);
        assert_eq!(list.transmissive().count(), 1);
        let blended: Vec<&RenderItem> = list.transparent().collect();
        assert_eq!(blended.len(), 1);
        assert_eq!(blended[0].group_order, 4);
    }

    #[test]
    fn test_groups_fall_back_to_first_material() {
        let mut f = fixture();
        let root = f.scene.root();
        let mut geometry = BufferGeometry::from_positions(&[Vec3::zeros(); 6]);
        geometry.add_group(0, 3, 0);
        geometry.add_group(3, 3, 5);
        geometry.add_group(6, 0, 1);
        let geometry = f.scene.add_geometry(geometry);
        let drawable = Drawable::multi_material_mesh(geometry, vec![f.material]);
        let node = f.scene.add_drawable(root, drawable).unwrap();
        f.scene.graph.node_mut(node).unwrap().frustum_culled = false;

        let (list, _) = project(&mut f);
        let items: Vec<&RenderItem> = list.iter().collect();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.material == f.material));
    }

    #[test]
    fn test_empty_draw_range_is_skipped() {
        let mut f = fixture();
        let root = f.scene.root();
        f.scene.geometry_mut(f.geometry).unwrap().set_draw_range(0, 0);
        f.scene.add_mesh(root, f.geometry, f.material).unwrap();

        let (list, _) = project(&mut f);
        assert!(list.is_empty());
    }

    #[test]
    fn test_lights_are_collected() {
        let mut f = fixture();
        let root = f.scene.root();
        f.scene.add_light(root, Light::ambient(Vec3::new(1.0, 1.0, 1.0), 1.0)).unwrap();

        let (_, lights) = project(&mut f);
        assert_eq!(lights.len(), 1);
    }

    #[test]
    fn test_per_instance_culling_keeps_visible_instances() {
        let mut f = fixture();
        let root = f.scene.root();
        let mut instances = Instances::new(vec![
            Mat4::identity(),
            Translation3::new(0.0, 0.0, 50.0).to_homogeneous(),
            Translation3::new(1.0, 0.0, 0.0).to_homogeneous(),
        ]);
        instances.per_instance_culling = true;
        f.scene.add_drawable(root, Drawable::instanced_mesh(f.geometry, f.material, instances)).unwrap();

        let (list, _) = project(&mut f);
        let item = list.iter().next().unwrap();
        assert_eq!(item.visible_instances.as_deref(), Some(&[0, 2][..]));
    }

    #[test]
    fn test_depth_orders_near_before_far() {
        let mut f = fixture();
        let root = f.scene.root();
        let far = f.scene.add_mesh(root, f.geometry, f.material).unwrap();
        let near = f.scene.add_mesh(root, f.geometry, f.material).unwrap();
        f.scene.graph.node_mut(far).unwrap().set_position(Vec3::new(0.0, 0.0, -20.0));
        f.scene.graph.node_mut(near).unwrap().set_position(Vec3::new(0.0, 0.0, 2.0));

        let (mut list, _) = project(&mut f);
        list.sort(None, None);
        let order: Vec<NodeId> = list.opaque().map(|item| item.node).collect();
        assert_eq!(order, vec![near, far]);
    }
}
