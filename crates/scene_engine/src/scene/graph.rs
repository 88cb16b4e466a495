//! Scene graph arena
//!
//! Nodes live in a slotmap and refer to each other by [`NodeId`]. A parent
//! owns its child list; the child's parent link is a plain key used only for
//! traversal. `add` refuses anything that would create a cycle.

use log::{debug, error};
use slotmap::SlotMap;

use super::node::{Node, NodeKind, TransformState};
use super::{SceneError, SceneResult};
use crate::foundation::math::{
    inverse_or_identity, look_at_rotation, translation_of, Mat4, Quat, Transform, Vec3,
};

slotmap::new_key_type! {
    /// Handle to a node in a [`SceneGraph`]
    pub struct NodeId;
}

/// Structural change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    /// `child` was attached to `parent`
    Added {
        /// New parent
        parent: NodeId,
        /// Attached node
        child: NodeId,
    },
    /// `child` was detached from `parent`
    Removed {
        /// Former parent
        parent: NodeId,
        /// Detached node
        child: NodeId,
    },
    /// Node was deleted from the arena
    Destroyed(NodeId),
}

/// Arena of transform nodes
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, Node>,
    next_serial: u64,
    events: Vec<NodeEvent>,
}

impl SceneGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached node with an identity transform
    pub fn insert(&mut self, kind: NodeKind) -> NodeId {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.nodes.insert(Node::new(serial, kind))
    }

    /// Whether `id` refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by id
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Node by id, mutable
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(Node::parent)
    }

    /// Children of a node (empty for unknown ids)
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map_or(&[] as &[NodeId], Node::children)
    }

    /// Whether `ancestor` appears on the parent chain of `id` (or is `id`)
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Attach `child` under `parent`, detaching it from any previous parent
    ///
    /// Self-parenting, stale ids and cycles are logged and rejected without
    /// modifying the graph.
    pub fn add(&mut self, parent: NodeId, child: NodeId) -> SceneResult<()> {
        if parent == child {
            error!("SceneGraph::add: node {:?} can't be added as a child of itself", child);
            return Err(SceneError::SelfParent(child));
        }
        for id in [parent, child] {
            if !self.contains(id) {
                error!("SceneGraph::add: {:?} is not a node of this graph", id);
                return Err(SceneError::NodeNotFound(id));
            }
        }
        if self.is_ancestor_or_self(child, parent) {
            error!("SceneGraph::add: {:?} is an ancestor of {:?}", child, parent);
            return Err(SceneError::CycleDetected { parent, child });
        }

        self.remove_from_parent(child);

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
            node.mark_world_dirty();
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(child);
        }
        self.events.push(NodeEvent::Added { parent, child });
        Ok(())
    }

    /// Detach `child` from `parent`; returns `false` if it was not a child
    pub fn remove(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(parent_node) = self.nodes.get_mut(parent) else {
            return false;
        };
        let Some(position) = parent_node.children.iter().position(|&c| c == child) else {
            return false;
        };
        parent_node.children.remove(position);

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
            node.mark_world_dirty();
        }
        self.events.push(NodeEvent::Removed { parent, child });
        true
    }

    /// Detach a node from whatever parent it has
    pub fn remove_from_parent(&mut self, child: NodeId) -> bool {
        match self.parent(child) {
            Some(parent) => self.remove(parent, child),
            None => false,
        }
    }

    /// Detach every child of `parent`
    pub fn clear(&mut self, parent: NodeId) {
        let children = self.children(parent).to_vec();
        for child in children {
            self.remove(parent, child);
        }
    }

    /// Re-parent `child` under `parent` keeping its world transform
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> SceneResult<()> {
        if parent == child {
            error!("SceneGraph::attach: node {:?} can't be attached to itself", child);
            return Err(SceneError::SelfParent(child));
        }
        if !self.contains(parent) {
            return Err(SceneError::NodeNotFound(parent));
        }
        if !self.contains(child) {
            return Err(SceneError::NodeNotFound(child));
        }
        if self.is_ancestor_or_self(child, parent) {
            error!("SceneGraph::attach: {:?} is an ancestor of {:?}", child, parent);
            return Err(SceneError::CycleDetected { parent, child });
        }

        self.update_world_matrix(parent, true, false);
        let mut to_new_parent = inverse_or_identity(&self.world_matrix(parent));

        if let Some(old_parent) = self.parent(child) {
            self.update_world_matrix(old_parent, true, false);
            to_new_parent *= self.world_matrix(old_parent);
        }

        if let Some(node) = self.nodes.get_mut(child) {
            node.apply_matrix4(&to_new_parent);
        }
        self.add(parent, child)?;
        self.update_world_matrix(child, false, true);
        Ok(())
    }

    /// Delete a node and its whole subtree
    pub fn destroy(&mut self, id: NodeId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.remove_from_parent(id);

        let doomed = self.descendants(id);
        for node in doomed.iter().rev() {
            self.nodes.remove(*node);
            self.events.push(NodeEvent::Destroyed(*node));
        }
        self.nodes.remove(id);
        self.events.push(NodeEvent::Destroyed(id));
        debug!("Destroyed node {:?} and {} descendants", id, doomed.len());
        true
    }

    /// Take all pending structural events
    pub fn drain_events(&mut self) -> Vec<NodeEvent> {
        std::mem::take(&mut self.events)
    }

    fn world_matrix(&self, id: NodeId) -> Mat4 {
        self.nodes.get(id).map_or_else(Mat4::identity, |n| *n.world_matrix())
    }

    /// Recompose the local matrix of one node
    pub fn update_matrix(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.update_matrix();
        }
    }

    /// Recompute one node's world matrix from its parent's current one
    fn refresh_world(&mut self, id: NodeId) {
        let parent_world = self.parent(id).map(|p| self.world_matrix(p));
        if let Some(node) = self.nodes.get_mut(id) {
            if node.matrix_auto_update {
                node.update_matrix();
            }
            if node.matrix_world_auto_update {
                let world = parent_world.map_or(*node.local_matrix(), |pw| pw * node.local_matrix());
                node.store_world_matrix(world);
            }
        }
    }

    /// Recompute the world matrix of `id`
    ///
    /// With `update_parents` the ancestor chain is refreshed first (siblings
    /// are not touched); with `update_children` the whole subtree follows.
    pub fn update_world_matrix(&mut self, id: NodeId, update_parents: bool, update_children: bool) {
        if !self.contains(id) {
            return;
        }

        if update_parents {
            let mut chain = Vec::new();
            let mut current = self.parent(id);
            while let Some(parent) = current {
                match self.nodes.get(parent) {
                    Some(node) if node.matrix_world_auto_update => {
                        chain.push(parent);
                        current = node.parent();
                    }
                    _ => break,
                }
            }
            for ancestor in chain.into_iter().rev() {
                self.refresh_world(ancestor);
            }
        }

        self.refresh_world(id);

        if update_children {
            let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
            while let Some(child) = stack.pop() {
                let auto = self.nodes.get(child).is_some_and(|n| n.matrix_world_auto_update);
                if !auto {
                    continue;
                }
                self.refresh_world(child);
                stack.extend(self.children(child).iter().rev().copied());
            }
        }
    }

    /// Per-frame world update of the subtree under `id`
    ///
    /// Local matrices are recomposed where dirty; a node whose world matrix
    /// is recomputed (because it was stale or `force` is set) forces its
    /// whole subtree to recompute. Children with `matrix_world_auto_update`
    /// off are skipped along with their subtrees.
    pub fn update_matrix_world(&mut self, id: NodeId, force: bool) {
        let mut stack = vec![(id, force)];
        while let Some((current, force)) = stack.pop() {
            let parent_world = self.parent(current).map(|p| self.world_matrix(p));
            let Some(node) = self.nodes.get_mut(current) else {
                continue;
            };

            if node.matrix_auto_update && node.transform_state() == TransformState::LocalDirty {
                node.update_matrix();
            }

            let mut force_children = force;
            if node.matrix_world_needs_update() || force {
                if node.matrix_world_auto_update {
                    let world = parent_world.map_or(*node.local_matrix(), |pw| pw * node.local_matrix());
                    node.store_world_matrix(world);
                }
                force_children = true;
            }

            for &child in self.children(current).iter().rev() {
                if self.nodes.get(child).is_some_and(|c| c.matrix_world_auto_update) {
                    stack.push((child, force_children));
                }
            }
        }
    }

    /// World position (refreshes the ancestor chain first)
    pub fn world_position(&mut self, id: NodeId) -> Option<Vec3> {
        self.update_world_matrix(id, true, false);
        self.node(id).map(|n| translation_of(n.world_matrix()))
    }

    /// World rotation
    pub fn world_quaternion(&mut self, id: NodeId) -> Option<Quat> {
        self.update_world_matrix(id, true, false);
        self.node(id).map(|n| Transform::from_matrix(n.world_matrix()).rotation)
    }

    /// World scale
    pub fn world_scale(&mut self, id: NodeId) -> Option<Vec3> {
        self.update_world_matrix(id, true, false);
        self.node(id).map(|n| Transform::from_matrix(n.world_matrix()).scale)
    }

    /// Direction the node faces in world space (+Z, or -Z for cameras)
    pub fn world_direction(&mut self, id: NodeId) -> Option<Vec3> {
        self.update_world_matrix(id, true, false);
        self.node(id).map(|n| {
            let m = n.world_matrix();
            let z = Vec3::new(m.m13, m.m23, m.m33).try_normalize(0.0).unwrap_or_else(Vec3::z);
            if matches!(n.kind(), NodeKind::Camera(_)) { -z } else { z }
        })
    }

    /// Convert a point from the node's local space to world space
    pub fn local_to_world(&mut self, id: NodeId, point: &Vec3) -> Option<Vec3> {
        self.update_world_matrix(id, true, false);
        self.node(id).map(|n| n.world_matrix().transform_point(&(*point).into()).coords)
    }

    /// Convert a world-space point into the node's local space
    pub fn world_to_local(&mut self, id: NodeId, point: &Vec3) -> Option<Vec3> {
        self.update_world_matrix(id, true, false);
        self.node(id)
            .map(|n| inverse_or_identity(n.world_matrix()).transform_point(&(*point).into()).coords)
    }

    /// Rotate the node to face a world-space point
    ///
    /// Cameras and lights point their -Z axis at the target, other nodes
    /// their +Z axis.
    pub fn look_at(&mut self, id: NodeId, target: &Vec3) {
        self.update_world_matrix(id, true, false);
        let Some(node) = self.node(id) else {
            return;
        };
        let eye = translation_of(node.world_matrix());
        let faces_negative_z = matches!(node.kind(), NodeKind::Camera(_) | NodeKind::Light(_));

        let mut rotation = if faces_negative_z {
            look_at_rotation(&eye, target, &node.up)
        } else {
            look_at_rotation(target, &eye, &node.up)
        };

        if let Some(parent) = node.parent() {
            let parent_rotation = Transform::from_matrix(&self.world_matrix(parent)).rotation;
            rotation = parent_rotation.inverse() * rotation;
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.set_quaternion(rotation);
        }
    }

    /// Depth-first pre-order visit of `root` and its descendants
    pub fn traverse(&self, root: NodeId, mut visit: impl FnMut(NodeId, &Node)) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(id) {
                visit(id, node);
                stack.extend(node.children.iter().rev().copied());
            }
        }
    }

    /// Like [`Self::traverse`] but stops at invisible nodes
    pub fn traverse_visible(&self, root: NodeId, mut visit: impl FnMut(NodeId, &Node)) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(id) {
                if !node.visible {
                    continue;
                }
                visit(id, node);
                stack.extend(node.children.iter().rev().copied());
            }
        }
    }

    /// Visit every ancestor of `id`, nearest first
    pub fn traverse_ancestors(&self, id: NodeId, mut visit: impl FnMut(NodeId, &Node)) {
        let mut current = self.parent(id);
        while let Some(ancestor) = current {
            let Some(node) = self.nodes.get(ancestor) else {
                break;
            };
            visit(ancestor, node);
            current = node.parent();
        }
    }

    /// First node named `name` in the subtree under `root` (pre-order)
    pub fn get_object_by_name(&self, root: NodeId, name: &str) -> Option<NodeId> {
        let mut found = None;
        self.traverse(root, |id, node| {
            if found.is_none() && node.name == name {
                found = Some(id);
            }
        });
        found
    }

    /// Every node under `root`, excluding `root`, in pre-order
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.traverse(root, |id, _| {
            if id != root {
                out.push(id);
            }
        });
        out
    }

    /// Iterate every live node
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::compose;
    use crate::scene::camera::Camera;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    fn group(graph: &mut SceneGraph) -> NodeId {
        graph.insert(NodeKind::Group)
    }

    #[test]
    fn test_add_rejects_self_and_cycles() {
        let mut graph = SceneGraph::new();
        let a = group(&mut graph);
        let b = group(&mut graph);
        let c = group(&mut graph);
        graph.add(a, b).expect("a -> b");
        graph.add(b, c).expect("b -> c");

        assert_eq!(graph.add(a, a), Err(SceneError::SelfParent(a)));
        assert_eq!(graph.add(c, a), Err(SceneError::CycleDetected { parent: c, child: a }));
        assert_eq!(graph.parent(a), None);
        assert_eq!(graph.children(c), &[] as &[NodeId]);
    }

    #[test]
    fn test_add_rejects_stale_ids() {
        let mut graph = SceneGraph::new();
        let a = group(&mut graph);
        let b = group(&mut graph);
        graph.destroy(b);

        assert_eq!(graph.add(a, b), Err(SceneError::NodeNotFound(b)));
    }

    #[test]
    fn test_reparenting_is_exclusive() {
        let mut graph = SceneGraph::new();
        let parent_a = group(&mut graph);
        let parent_b = group(&mut graph);
        let child = group(&mut graph);

        graph.add(parent_a, child).expect("add to a");
        graph.drain_events();
        graph.add(parent_b, child).expect("add to b");

        assert!(!graph.children(parent_a).contains(&child));
        assert_eq!(graph.children(parent_b), &[child]);
        assert_eq!(graph.parent(child), Some(parent_b));
        assert_eq!(
            graph.drain_events(),
            vec![
                NodeEvent::Removed { parent: parent_a, child },
                NodeEvent::Added { parent: parent_b, child },
            ]
        );
    }

    #[test]
    fn test_remove_non_child_is_no_op() {
        let mut graph = SceneGraph::new();
        let a = group(&mut graph);
        let b = group(&mut graph);

        assert!(!graph.remove(a, b));
        graph.add(a, b).expect("add");
        assert!(graph.remove(a, b));
        assert_eq!(graph.parent(b), None);
        assert!(graph.children(a).is_empty());
    }

    #[test]
    fn test_world_matrix_is_product_of_ancestors() {
        let mut graph = SceneGraph::new();
        let root = group(&mut graph);
        let mid = group(&mut graph);
        let leaf = group(&mut graph);
        graph.add(root, mid).expect("add");
        graph.add(mid, leaf).expect("add");

        let poses = [
            (root, Vec3::new(1.0, 2.0, 3.0), Quat::from_euler_angles(0.1, 0.2, 0.3), Vec3::new(1.0, 2.0, 1.0)),
            (mid, Vec3::new(-4.0, 0.5, 0.0), Quat::from_euler_angles(-0.5, 0.0, 1.2), Vec3::new(0.5, 0.5, 0.5)),
            (leaf, Vec3::new(0.0, 0.0, 7.0), Quat::from_euler_angles(0.0, 1.0, 0.0), Vec3::new(3.0, 1.0, 2.0)),
        ];
        for (id, p, q, s) in poses {
            let node = graph.node_mut(id).expect("node");
            node.set_position(p);
            node.set_quaternion(q);
            node.set_scale(s);
        }

        graph.update_matrix_world(root, false);

        let expected = poses
            .iter()
            .fold(Mat4::identity(), |acc, (_, p, q, s)| acc * compose(p, q, s));
        assert_relative_eq!(*graph.node(leaf).expect("leaf").world_matrix(), expected, epsilon = 1e-4);
        assert_eq!(graph.node(leaf).expect("leaf").transform_state(), TransformState::Clean);
    }

    #[test]
    fn test_three_level_hierarchy_world_position() {
        let mut graph = SceneGraph::new();
        let root = group(&mut graph);
        let g = group(&mut graph);
        let mesh = group(&mut graph);
        graph.add(root, g).expect("add");
        graph.add(g, mesh).expect("add");
        graph.node_mut(g).expect("group").set_position(Vec3::new(1.0, 0.0, 0.0));
        graph.node_mut(mesh).expect("mesh").set_position(Vec3::new(0.0, 2.0, 0.0));

        graph.update_matrix_world(root, false);

        let world = translation_of(graph.node(mesh).expect("mesh").world_matrix());
        assert_relative_eq!(world, Vec3::new(1.0, 2.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_parent_change_propagates_to_clean_children() {
        let mut graph = SceneGraph::new();
        let root = group(&mut graph);
        let child = group(&mut graph);
        graph.add(root, child).expect("add");
        graph.update_matrix_world(root, false);

        graph.node_mut(root).expect("root").set_position(Vec3::new(0.0, 0.0, -3.0));
        graph.update_matrix_world(root, false);

        let world = translation_of(graph.node(child).expect("child").world_matrix());
        assert_relative_eq!(world, Vec3::new(0.0, 0.0, -3.0), epsilon = 1e-6);
    }

    #[test]
    fn test_manual_world_matrix_child_is_skipped() {
        let mut graph = SceneGraph::new();
        let root = group(&mut graph);
        let manual = group(&mut graph);
        let below = group(&mut graph);
        graph.add(root, manual).expect("add");
        graph.add(manual, below).expect("add");
        graph.node_mut(manual).expect("manual").matrix_world_auto_update = false;

        graph.node_mut(root).expect("root").set_position(Vec3::new(5.0, 0.0, 0.0));
        graph.update_matrix_world(root, false);

        assert_relative_eq!(translation_of(graph.node(manual).expect("manual").world_matrix()), Vec3::zeros());
        assert_relative_eq!(translation_of(graph.node(below).expect("below").world_matrix()), Vec3::zeros());
    }

    #[test]
    fn test_update_world_matrix_with_parents_only() {
        let mut graph = SceneGraph::new();
        let root = group(&mut graph);
        let mid = group(&mut graph);
        let sibling = group(&mut graph);
        let leaf = group(&mut graph);
        graph.add(root, mid).expect("add");
        graph.add(root, sibling).expect("add");
        graph.add(mid, leaf).expect("add");
        graph.node_mut(root).expect("root").set_position(Vec3::new(1.0, 0.0, 0.0));
        graph.node_mut(mid).expect("mid").set_position(Vec3::new(0.0, 1.0, 0.0));
        graph.node_mut(sibling).expect("sibling").set_position(Vec3::new(9.0, 9.0, 9.0));

        graph.update_world_matrix(mid, true, false);

        assert_relative_eq!(translation_of(graph.node(mid).expect("mid").world_matrix()), Vec3::new(1.0, 1.0, 0.0));
        // Sibling and children untouched
        assert_eq!(graph.node(sibling).expect("sibling").transform_state(), TransformState::LocalDirty);
        assert_relative_eq!(translation_of(graph.node(leaf).expect("leaf").world_matrix()), Vec3::zeros());

        graph.update_world_matrix(mid, false, true);
        assert_relative_eq!(translation_of(graph.node(leaf).expect("leaf").world_matrix()), Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_attach_preserves_world_transform() {
        let mut graph = SceneGraph::new();
        let a = group(&mut graph);
        let b = group(&mut graph);
        let child = group(&mut graph);
        graph.node_mut(a).expect("a").set_position(Vec3::new(2.0, 0.0, 0.0));
        graph.node_mut(b).expect("b").set_position(Vec3::new(0.0, 0.0, 4.0));
        graph.node_mut(b).expect("b").set_scale(Vec3::new(2.0, 2.0, 2.0));
        graph.add(a, child).expect("add");
        graph.node_mut(child).expect("child").set_position(Vec3::new(1.0, 1.0, 1.0));

        let before = graph.world_position(child).expect("position");
        graph.attach(b, child).expect("attach");
        let after = graph.world_position(child).expect("position");

        assert_eq!(graph.parent(child), Some(b));
        assert_relative_eq!(before, Vec3::new(3.0, 1.0, 1.0), epsilon = 1e-5);
        assert_relative_eq!(after, before, epsilon = 1e-5);
    }

    #[test]
    fn test_destroy_removes_subtree() {
        let mut graph = SceneGraph::new();
        let root = group(&mut graph);
        let a = group(&mut graph);
        let b = group(&mut graph);
        graph.add(root, a).expect("add");
        graph.add(a, b).expect("add");

        assert!(graph.destroy(a));
        assert!(!graph.contains(a));
        assert!(!graph.contains(b));
        assert!(graph.children(root).is_empty());
        assert!(graph.drain_events().contains(&NodeEvent::Destroyed(b)));
    }

    #[test]
    fn test_look_at_for_cameras_and_objects() {
        let mut graph = SceneGraph::new();
        let camera = graph.insert(NodeKind::Camera(Camera::perspective(50.0, 1.0, 0.1, 100.0)));
        let object = group(&mut graph);
        graph.node_mut(camera).expect("camera").set_position(Vec3::new(0.0, 0.0, 10.0));
        graph.node_mut(object).expect("object").set_position(Vec3::new(0.0, 0.0, 10.0));

        graph.look_at(camera, &Vec3::new(10.0, 0.0, 10.0));
        graph.look_at(object, &Vec3::new(10.0, 0.0, 10.0));

        assert_relative_eq!(graph.world_direction(camera).expect("dir"), Vec3::x(), epsilon = 1e-5);
        assert_relative_eq!(graph.world_direction(object).expect("dir"), Vec3::x(), epsilon = 1e-5);
    }

    #[test]
    fn test_camera_view_matrix_follows_world() {
        let mut graph = SceneGraph::new();
        let camera = graph.insert(NodeKind::Camera(Camera::perspective(50.0, 1.0, 0.1, 100.0)));
        graph.node_mut(camera).expect("camera").set_position(Vec3::new(0.0, 0.0, 5.0));
        graph.update_matrix_world(camera, false);

        let view = *graph.node(camera).and_then(Node::as_camera).expect("camera").matrix_world_inverse();
        let origin_in_view = view.transform_point(&Vec3::zeros().into()).coords;
        assert_relative_eq!(origin_in_view, Vec3::new(0.0, 0.0, -5.0), epsilon = 1e-6);
    }

    #[test]
    fn test_world_queries_and_traversal() {
        let mut graph = SceneGraph::new();
        let root = group(&mut graph);
        let arm = group(&mut graph);
        let hand = group(&mut graph);
        graph.add(root, arm).expect("add");
        graph.add(arm, hand).expect("add");
        graph.node_mut(hand).expect("hand").name = "hand".to_string();
        {
            let node = graph.node_mut(arm).expect("arm");
            node.set_position(Vec3::new(0.0, 1.0, 0.0));
            node.rotate_on_axis(&Vec3::z(), FRAC_PI_2);
            node.set_scale(Vec3::new(2.0, 2.0, 2.0));
        }
        graph.node_mut(hand).expect("hand").set_position(Vec3::new(1.0, 0.0, 0.0));

        assert_relative_eq!(graph.world_position(hand).expect("pos"), Vec3::new(0.0, 3.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(graph.world_scale(hand).expect("scale"), Vec3::new(2.0, 2.0, 2.0), epsilon = 1e-5);

        let local = graph.world_to_local(hand, &Vec3::new(0.0, 3.0, 0.0)).expect("local");
        assert_relative_eq!(local, Vec3::zeros(), epsilon = 1e-5);

        assert_eq!(graph.get_object_by_name(root, "hand"), Some(hand));
        assert_eq!(graph.descendants(root), vec![arm, hand]);

        let mut ancestors = Vec::new();
        graph.traverse_ancestors(hand, |id, _| ancestors.push(id));
        assert_eq!(ancestors, vec![arm, root]);

        graph.node_mut(arm).expect("arm").visible = false;
        let mut visible = Vec::new();
        graph.traverse_visible(root, |id, _| visible.push(id));
        assert_eq!(visible, vec![root]);
    }
}
