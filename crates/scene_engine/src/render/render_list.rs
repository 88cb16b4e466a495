//! # Render List
//!
//! Per-frame list of draw items split into opaque, transmissive and
//! transparent buckets. Items live in a pool that is reset, not freed,
//! between frames so steady-state frames do not allocate.
//!
//! ## Sort Order
//!
//! - **Opaque / transmissive**: group order, render order, material serial,
//!   then depth ascending (front to back for early depth rejection)
//! - **Transparent**: group order, render order, then depth descending
//!   (back to front for correct blending)
//!
//! Remaining ties break on the node's creation serial so the order is
//! deterministic.

use std::cmp::Ordering;

use crate::geometry::GeometryGroup;
use crate::scene::{GeometryId, MaterialId, NodeId};

/// Which bucket an item goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Depth tested and written, no blending
    Opaque,
    /// Refractive surfaces; drawn after opaque
    Transmissive,
    /// Alpha blended
    Transparent,
}

/// One draw: node, geometry, material and the keys it sorts by
#[derive(Debug, Clone)]
pub struct RenderItem {
    /// Drawable node
    pub node: NodeId,
    /// Node creation serial, the final tie-break
    pub node_serial: u64,
    /// Geometry drawn
    pub geometry: GeometryId,
    /// Material drawn with
    pub material: MaterialId,
    /// Geometry group for multi-material drawables
    pub group: Option<GeometryGroup>,
    /// Render order of the closest enclosing group node
    pub group_order: i32,
    /// Node render order
    pub render_order: i32,
    /// Material creation serial
    pub material_serial: u64,
    /// Clip-space depth of the bounding-sphere center
    pub z: f32,
    /// Instances that survived per-instance culling
    pub visible_instances: Option<Vec<usize>>,
}

/// Ordering used to sort a bucket
pub type RenderItemComparator = fn(&RenderItem, &RenderItem) -> Ordering;

/// Default opaque ordering
pub fn painter_sort_stable(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.group_order
        .cmp(&b.group_order)
        .then(a.render_order.cmp(&b.render_order))
        .then(a.material_serial.cmp(&b.material_serial))
        .then(a.z.total_cmp(&b.z))
        .then(a.node_serial.cmp(&b.node_serial))
}

/// Default transparent ordering
pub fn reverse_painter_sort_stable(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.group_order
        .cmp(&b.group_order)
        .then(a.render_order.cmp(&b.render_order))
        .then(b.z.total_cmp(&a.z))
        .then(a.node_serial.cmp(&b.node_serial))
}

/// Pooled, bucketed draw list
#[derive(Debug, Default)]
pub struct RenderList {
    pool: Vec<RenderItem>,
    used: usize,
    opaque: Vec<usize>,
    transmissive: Vec<usize>,
    transparent: Vec<usize>,
}

impl RenderList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new frame; pooled items are kept for reuse
    pub fn init(&mut self) {
        self.used = 0;
        self.opaque.clear();
        self.transmissive.clear();
        self.transparent.clear();
    }

    /// Add an item to a bucket
    pub fn push(&mut self, item: RenderItem, bucket: Bucket) {
        let index = self.used;
        if let Some(slot) = self.pool.get_mut(index) {
            *slot = item;
        } else {
            self.pool.push(item);
        }
        self.used += 1;

        match bucket {
            Bucket::Opaque => self.opaque.push(index),
            Bucket::Transmissive => self.transmissive.push(index),
            Bucket::Transparent => self.transparent.push(index),
        }
    }

    /// Sort every bucket; `None` selects the default ordering
    pub fn sort(&mut self, opaque: Option<RenderItemComparator>, transparent: Option<RenderItemComparator>) {
        let opaque = opaque.unwrap_or(painter_sort_stable);
        let transparent = transparent.unwrap_or(reverse_painter_sort_stable);
        let pool = &self.pool;

        self.opaque.sort_by(|&a, &b| opaque(&pool[a], &pool[b]));
        self.transmissive.sort_by(|&a, &b| opaque(&pool[a], &pool[b]));
        self.transparent.sort_by(|&a, &b| transparent(&pool[a], &pool[b]));
    }

    /// Drop per-instance lists held by pooled items that were not reused this frame
    pub fn finish(&mut self) {
        for item in self.pool.iter_mut().skip(self.used) {
            item.visible_instances = None;
        }
    }

    fn items<'a>(&'a self, indices: &'a [usize]) -> impl Iterator<Item = &'a RenderItem> + 'a {
        indices.iter().map(move |&index| &self.pool[index])
    }

    /// Opaque items in draw order
    pub fn opaque(&self) -> impl Iterator<Item = &RenderItem> {
        self.items(&self.opaque)
    }

    /// Transmissive items in draw order
    pub fn transmissive(&self) -> impl Iterator<Item = &RenderItem> {
        self.items(&self.transmissive)
    }

    /// Transparent items in draw order
    pub fn transparent(&self) -> impl Iterator<Item = &RenderItem> {
        self.items(&self.transparent)
    }

    /// Every item in draw order: opaque, transmissive, transparent
    pub fn iter(&self) -> impl Iterator<Item = &RenderItem> {
        self.opaque().chain(self.transmissive()).chain(self.transparent())
    }

    /// Items pushed this frame
    pub const fn len(&self) -> usize {
        self.used
    }

    /// No items this frame
    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Items the pool can hold without allocating
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }
}
