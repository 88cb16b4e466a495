//! GPU buffers for geometries and instance matrices
//!
//! One entry per geometry, shared by every node drawing it. Nodes register
//! as users when drawn; the entry and its buffers are deleted once the last
//! user is released or the geometry is disposed. A node drawing a different
//! geometry than before stops being a user of the old one. Attributes are
//! re-uploaded when their version moves; replacing attributes, morph targets
//! or the index (the geometry's own version) rebuilds the entry.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::foundation::math::Mat4;
use crate::geometry::{BufferAttribute, BufferGeometry, ComponentType};
use crate::render::api::{BufferHandle, BufferTarget, GpuBackend};
use crate::render::{RenderError, RenderResult};
use crate::scene::{GeometryId, Instances, NodeId};

/// Uploaded copy of one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeBuffer {
    /// Backend buffer
    pub buffer: BufferHandle,
    /// Attribute version the buffer holds
    pub version: u64,
    /// Components per vertex
    pub item_size: usize,
    /// Component storage type
    pub component_type: ComponentType,
    /// Normalized integer data
    pub normalized: bool,
}

impl AttributeBuffer {
    fn upload<B: GpuBackend>(attribute: &BufferAttribute, target: BufferTarget, backend: &mut B) -> RenderResult<Self> {
        Ok(Self {
            buffer: backend.create_buffer(target, attribute.as_bytes())?,
            version: attribute.version(),
            item_size: attribute.item_size(),
            component_type: attribute.component_type(),
            normalized: attribute.normalized,
        })
    }

    fn sync<B: GpuBackend>(&mut self, attribute: &BufferAttribute, backend: &mut B) -> RenderResult<bool> {
        if self.version == attribute.version() {
            return Ok(false);
        }
        backend.update_buffer(self.buffer, attribute.as_bytes())?;
        self.version = attribute.version();
        Ok(true)
    }
}

/// Buffers of one geometry
#[derive(Debug, Default)]
pub struct GeometryBuffers {
    attributes: BTreeMap<String, AttributeBuffer>,
    index: Option<AttributeBuffer>,
    geometry_version: u64,
    users: HashSet<NodeId>,
}

impl GeometryBuffers {
    /// Buffer for a named vertex input (`morphTarget{i}` for morph positions)
    pub fn attribute(&self, name: &str) -> Option<&AttributeBuffer> {
        self.attributes.get(name)
    }

    /// Index buffer, if the geometry is indexed
    pub const fn index(&self) -> Option<&AttributeBuffer> {
        self.index.as_ref()
    }

    /// Number of nodes drawing this geometry
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    fn delete<B: GpuBackend>(self, backend: &mut B) {
        for buffer in self.attributes.values().chain(self.index.iter()) {
            backend.delete_buffer(buffer.buffer);
        }
    }
}

#[derive(Debug)]
struct InstanceBuffer {
    buffer: BufferHandle,
    version: u64,
    visible: Option<Vec<usize>>,
    count: usize,
}

fn uploads<'a>(geometry: &'a BufferGeometry) -> impl Iterator<Item = (String, &'a BufferAttribute)> + 'a {
    let morphs = geometry
        .morph_attribute("position")
        .unwrap_or_default()
        .iter()
        .take(crate::render::resources::programs::MAX_MORPH_TARGETS)
        .enumerate()
        .map(|(i, target)| (format!("morphTarget{i}"), target));
    geometry.attributes().map(|(name, attribute)| (name.to_string(), attribute)).chain(morphs)
}

/// Reference-counted GPU buffers, owned by one renderer
#[derive(Debug, Default)]
pub struct GeometryBufferCache {
    geometries: HashMap<GeometryId, GeometryBuffers>,
    instances: HashMap<NodeId, InstanceBuffer>,
    drawn_by: HashMap<NodeId, GeometryId>,
}

impl GeometryBufferCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `geometry` is uploaded and current, registering `node` as a user
    ///
    /// Fails without touching the cache when the geometry is inconsistent.
    pub fn update<B: GpuBackend>(
        &mut self,
        id: GeometryId,
        geometry: &BufferGeometry,
        node: NodeId,
        backend: &mut B,
    ) -> RenderResult<&GeometryBuffers> {
        if let Some(previous) = self.drawn_by.insert(node, id).filter(|&previous| previous != id) {
            self.release_user(previous, node, backend);
        }

        let stale = self.geometries.get(&id).map_or(true, |entry| entry.geometry_version != geometry.version());
        if stale {
            geometry.validate().map_err(|e| RenderError::ResourceCreationFailed(format!("geometry '{}': {e}", geometry.name)))?;

            let mut entry = GeometryBuffers { geometry_version: geometry.version(), ..GeometryBuffers::default() };
            if let Err(e) = Self::upload_all(&mut entry, geometry, backend) {
                entry.delete(backend);
                return Err(e);
            }

            if let Some(mut previous) = self.geometries.remove(&id) {
                entry.users = std::mem::take(&mut previous.users);
                previous.delete(backend);
            }
            log::debug!("Uploaded geometry '{}' ({} attributes)", geometry.name, entry.attributes.len());
            self.geometries.insert(id, entry);
        } else if let Some(entry) = self.geometries.get_mut(&id) {
            let mut changed = false;
            for (name, attribute) in uploads(geometry) {
                match entry.attributes.get_mut(&name) {
                    Some(buffer) => changed |= buffer.sync(attribute, backend)?,
                    None => {
                        let buffer = AttributeBuffer::upload(attribute, BufferTarget::Vertex, backend)?;
                        entry.attributes.insert(name, buffer);
                        changed = true;
                    }
                }
            }
            if let (Some(buffer), Some(index)) = (entry.index.as_mut(), geometry.index()) {
                changed |= buffer.sync(index, backend)?;
            }
            if changed {
                geometry.validate().map_err(|e| RenderError::ResourceCreationFailed(format!("geometry '{}': {e}", geometry.name)))?;
            }
        }

        let entry = self
            .geometries
            .get_mut(&id)
            .ok_or_else(|| RenderError::ResourceCreationFailed("geometry buffers missing after upload".to_string()))?;
        entry.users.insert(node);
        Ok(entry)
    }

    fn upload_all<B: GpuBackend>(entry: &mut GeometryBuffers, geometry: &BufferGeometry, backend: &mut B) -> RenderResult<()> {
        for (name, attribute) in uploads(geometry) {
            entry.attributes.insert(name, AttributeBuffer::upload(attribute, BufferTarget::Vertex, backend)?);
        }
        if let Some(index) = geometry.index() {
            entry.index = Some(AttributeBuffer::upload(index, BufferTarget::Index, backend)?);
        }
        Ok(())
    }

    /// Uploaded buffers of a geometry
    pub fn get(&self, id: GeometryId) -> Option<&GeometryBuffers> {
        self.geometries.get(&id)
    }

    /// Upload the instance matrices of `node`; only `visible` instances when given
    ///
    /// Returns the buffer and the number of matrices it holds.
    pub fn update_instances<B: GpuBackend>(
        &mut self,
        node: NodeId,
        instances: &Instances,
        visible: Option<&[usize]>,
        backend: &mut B,
    ) -> RenderResult<(BufferHandle, usize)> {
        let current = self.instances.get(&node).filter(|buffer| {
            buffer.version == instances.version() && buffer.visible.as_deref() == visible
        });
        if let Some(buffer) = current {
            return Ok((buffer.buffer, buffer.count));
        }

        let matrices: Vec<&Mat4> = match visible {
            Some(indices) => indices.iter().filter_map(|&i| instances.matrices().get(i)).collect(),
            None => instances.matrices().iter().collect(),
        };
        let data: Vec<f32> = matrices.iter().flat_map(|matrix| matrix.as_slice().iter().copied()).collect();
        let bytes: &[u8] = bytemuck::cast_slice(&data);

        let buffer = match self.instances.get(&node) {
            Some(existing) => {
                backend.update_buffer(existing.buffer, bytes)?;
                existing.buffer
            }
            None => backend.create_buffer(BufferTarget::Vertex, bytes)?,
        };
        self.instances.insert(
            node,
            InstanceBuffer {
                buffer,
                version: instances.version(),
                visible: visible.map(<[usize]>::to_vec),
                count: matrices.len(),
            },
        );
        Ok((buffer, matrices.len()))
    }

    /// Stop tracking `node`; buffers nobody uses anymore are deleted
    pub fn release_node<B: GpuBackend>(&mut self, node: NodeId, backend: &mut B) {
        if let Some(instance) = self.instances.remove(&node) {
            backend.delete_buffer(instance.buffer);
        }
        if let Some(id) = self.drawn_by.remove(&node) {
            self.release_user(id, node, backend);
        }
    }

    fn release_user<B: GpuBackend>(&mut self, id: GeometryId, node: NodeId, backend: &mut B) {
        let unused = self
            .geometries
            .get_mut(&id)
            .is_some_and(|entry| entry.users.remove(&node) && entry.users.is_empty());
        if unused {
            self.dispose(id, backend);
        }
    }

    /// Release every node for which `alive` returns false
    pub fn sweep<B: GpuBackend>(&mut self, alive: impl Fn(NodeId) -> bool, backend: &mut B) {
        let dead: HashSet<NodeId> =
            self.instances.keys().chain(self.drawn_by.keys()).copied().filter(|&node| !alive(node)).collect();
        for node in dead {
            self.release_node(node, backend);
        }
    }

    /// Delete a geometry's buffers regardless of users
    pub fn dispose<B: GpuBackend>(&mut self, id: GeometryId, backend: &mut B) -> bool {
        match self.geometries.remove(&id) {
            Some(entry) => {
                log::debug!("Disposing geometry buffers ({} users)", entry.users.len());
                entry.delete(backend);
                true
            }
            None => false,
        }
    }

    /// Geometries currently uploaded
    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    /// Delete everything
    pub fn clear<B: GpuBackend>(&mut self, backend: &mut B) {
        for (_, entry) in self.geometries.drain() {
            entry.delete(backend);
        }
        for (_, instance) in self.instances.drain() {
            backend.delete_buffer(instance.buffer);
        }
        self.drawn_by.clear();
    }
}
