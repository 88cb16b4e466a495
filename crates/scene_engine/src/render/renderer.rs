//! Frame driver
//!
//! The [`Renderer`] owns every GPU-side cache (programs, geometry buffers,
//! pipeline state) and drives one [`GpuBackend`]. Scenes never hold GPU
//! handles; they queue disposals that the renderer applies at frame start.

use std::collections::HashMap;

use crate::core::config::RendererConfig;
use crate::foundation::bounds::Plane;
use crate::foundation::logging::DiagnosticLog;
use crate::foundation::math::{normal_matrix, Mat4, Vec4};
use crate::geometry::{BufferGeometry, GeometryGroup};
use crate::render::api::{
    AttributeBinding, BufferHandle, ClearFlags, DrawCall, DrawMode, GpuBackend, UniformValue, Viewport,
};
use crate::render::buffers::GeometryBufferCache;
use crate::render::clipping::{ClippingCounts, ClippingState};
use crate::render::info::RenderInfo;
use crate::render::lighting::{CollectedLight, LightState};
use crate::render::list_builder::{project_scene, ViewInfo};
use crate::render::render_list::{RenderItem, RenderItemComparator, RenderList};
use crate::render::resources::materials::{material_uniforms, Material, MaterialType};
use crate::render::resources::programs::{
    get_parameters, get_program_cache_key, CompileStatus, ObjectFeatures, ProgramCache, ProgramContext, ProgramId,
    MAX_MORPH_TARGETS,
};
use crate::render::state_cache::StateCache;
use crate::render::{RenderError, RenderResult};
use crate::scene::{
    Disposal, Drawable, Fog, GeometryId, LineTopology, MaterialId, Node, NodeId, Primitive, Scene,
};

/// Bytes per instance matrix
const INSTANCE_STRIDE: usize = 64;

/// Everything besides the material that selects a program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProgramInputs {
    material_version: u64,
    lights_version: u64,
    config_generation: u64,
    clipping: ClippingCounts,
    object: ObjectFeatures,
    fog_exponential: Option<bool>,
    environment: bool,
}

/// Programs a material has acquired, keyed by cache key
#[derive(Debug, Default)]
struct MaterialPrograms {
    programs: HashMap<String, ProgramId>,
    last: Option<(ProgramInputs, ProgramId)>,
}

/// Vertex inputs and index buffer bound for a draw
#[derive(Debug, Default, PartialEq)]
struct BindingSet {
    attributes: Vec<(u32, AttributeBinding)>,
    defaults: Vec<(u32, Vec4)>,
    index: Option<BufferHandle>,
}

/// Per-frame camera data
#[derive(Debug, Clone, Copy)]
struct FrameCamera {
    view: Mat4,
    projection: Mat4,
    position: crate::foundation::math::Vec3,
}

/// Scene renderer over a GPU backend
///
/// ```ignore
/// let mut renderer = Renderer::new(HeadlessBackend::new(), RendererConfig::default());
/// renderer.set_size(800, 600, 1.0);
/// renderer.render(&mut scene, camera)?;
/// ```
pub struct Renderer<B: GpuBackend> {
    backend: B,
    config: RendererConfig,
    config_generation: u64,
    programs: ProgramCache,
    buffers: GeometryBufferCache,
    state: StateCache,
    render_list: RenderList,
    collected_lights: Vec<CollectedLight>,
    lights: LightState,
    clipping: ClippingState,
    material_programs: HashMap<MaterialId, MaterialPrograms>,
    diagnostics: DiagnosticLog,
    info: RenderInfo,
    width: u32,
    height: u32,
    pixel_ratio: f32,
    opaque_sort: Option<RenderItemComparator>,
    transparent_sort: Option<RenderItemComparator>,
    current_program: Option<ProgramId>,
    current_material: Option<MaterialId>,
    bound: Option<BindingSet>,
}

impl<B: GpuBackend> Renderer<B> {
    /// Renderer over `backend`
    pub fn new(backend: B, config: RendererConfig) -> Self {
        log::info!(
            "Creating renderer (tone mapping {:?}, output {:?})",
            config.tone_mapping,
            config.output_color_space
        );
        let clipping = ClippingState::new(config.local_clipping_enabled);
        let pixel_ratio = config.pixel_ratio;
        Self {
            backend,
            config,
            config_generation: 0,
            programs: ProgramCache::new(),
            buffers: GeometryBufferCache::new(),
            state: StateCache::new(),
            render_list: RenderList::new(),
            collected_lights: Vec::new(),
            lights: LightState::new(),
            clipping,
            material_programs: HashMap::new(),
            diagnostics: DiagnosticLog::new(),
            info: RenderInfo::default(),
            width: 1,
            height: 1,
            pixel_ratio,
            opaque_sort: None,
            transparent_sort: None,
            current_program: None,
            current_material: None,
            bound: None,
        }
    }

    /// Backend
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Backend, mutably
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Active settings
    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Settings, mutably; programs are re-resolved on the next frame
    pub fn config_mut(&mut self) -> &mut RendererConfig {
        self.config_generation += 1;
        &mut self.config
    }

    /// Statistics of the last frame
    pub const fn info(&self) -> &RenderInfo {
        &self.info
    }

    /// Program cache
    pub const fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    /// Geometry buffer cache
    pub const fn buffers(&self) -> &GeometryBufferCache {
        &self.buffers
    }

    /// Render list of the last frame
    pub const fn render_list(&self) -> &RenderList {
        &self.render_list
    }

    /// Light state of the last frame
    pub const fn lights(&self) -> &LightState {
        &self.lights
    }

    /// Once-only diagnostics reported so far
    pub const fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    /// Program currently resolved for `material` by the last draw
    pub fn material_program(&self, material: MaterialId) -> Option<ProgramId> {
        self.material_programs.get(&material).and_then(|entry| entry.last.map(|(_, id)| id))
    }

    /// Output size in logical pixels plus the device pixel ratio
    pub fn set_size(&mut self, width: u32, height: u32, pixel_ratio: f32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.pixel_ratio = if pixel_ratio > 0.0 { pixel_ratio } else { 1.0 };
        log::debug!("Renderer size {}x{} @{}", self.width, self.height, self.pixel_ratio);
    }

    /// Viewport in physical pixels
    pub fn viewport(&self) -> Viewport {
        Viewport {
            x: 0,
            y: 0,
            width: (self.width as f32 * self.pixel_ratio).round() as u32,
            height: (self.height as f32 * self.pixel_ratio).round() as u32,
        }
    }

    /// Replace the global clipping planes (world space)
    pub fn set_clipping_planes(&mut self, planes: Vec<Plane>) {
        self.clipping.set_global_planes(planes);
    }

    /// Honor per-material clipping planes
    pub fn set_local_clipping_enabled(&mut self, enabled: bool) {
        self.clipping.local_enabled = enabled;
        self.config.local_clipping_enabled = enabled;
    }

    /// Replace the bucket orderings; `None` restores the default
    pub fn set_sort_functions(&mut self, opaque: Option<RenderItemComparator>, transparent: Option<RenderItemComparator>) {
        self.opaque_sort = opaque;
        self.transparent_sort = transparent;
    }

    /// Release every program acquired for `material`
    pub fn dispose_material(&mut self, material: MaterialId) {
        if let Some(entry) = self.material_programs.remove(&material) {
            log::debug!("Releasing {} programs of material {:?}", entry.programs.len(), material);
            for id in entry.programs.into_values() {
                self.programs.release(id, &mut self.backend);
            }
        }
        if self.current_material == Some(material) {
            self.current_material = None;
        }
    }

    /// Delete the GPU buffers of `geometry`
    pub fn dispose_geometry(&mut self, geometry: GeometryId) {
        if self.buffers.dispose(geometry, &mut self.backend) {
            self.bound = None;
        }
    }

    /// Release every GPU resource the renderer holds
    pub fn dispose(&mut self) {
        self.material_programs.clear();
        self.programs.clear(&mut self.backend);
        self.buffers.clear(&mut self.backend);
        self.current_program = None;
        self.current_material = None;
        self.bound = None;
    }

    /// Render `scene` as seen from the camera node `camera`
    ///
    /// Entries that cannot be drawn (pending or failed programs, broken
    /// geometry) are skipped; only backend frame failures are returned.
    pub fn render(&mut self, scene: &mut Scene, camera: NodeId) -> RenderResult<()> {
        self.prepare(scene, camera)?;
        let frame = Self::frame_camera(scene, camera)?;

        self.backend.begin_frame(self.viewport())?;
        if self.config.auto_clear {
            self.backend.clear(ClearFlags::all(), self.config.clear_color);
        }

        self.state.reset();
        self.current_program = None;
        self.current_material = None;
        self.bound = None;
        self.info.reset();

        let list = std::mem::take(&mut self.render_list);
        for item in list.iter() {
            self.draw_item(scene, &frame, item);
        }
        self.render_list = list;

        self.backend.end_frame()?;

        self.info.frame += 1;
        self.info.programs = self.programs.program_count();
        self.info.geometries = self.buffers.geometry_count();
        log::trace!(
            "Frame {}: {} calls, {} triangles, {} pending",
            self.info.frame,
            self.info.calls,
            self.info.triangles,
            self.info.pending
        );
        Ok(())
    }

    /// Resolve the programs the next frame will need without drawing
    ///
    /// Returns the number of distinct programs the visible entries use.
    pub fn compile(&mut self, scene: &mut Scene, camera: NodeId) -> RenderResult<usize> {
        self.prepare(scene, camera)?;

        let list = std::mem::take(&mut self.render_list);
        let mut resolved: Vec<ProgramId> = Vec::new();
        for item in list.iter() {
            let (Some(node), Some(material), Some(geometry)) =
                (scene.graph.node(item.node), scene.material(item.material), scene.geometry(item.geometry))
            else {
                continue;
            };
            let Some(drawable) = node.as_drawable() else {
                continue;
            };
            let object = object_features(node, drawable, geometry);
            if let Some(id) = self.resolve_program(scene, item.material, material, object) {
                if !resolved.contains(&id) {
                    resolved.push(id);
                }
            }
        }
        self.render_list = list;

        log::debug!("Compiled {} programs ahead of rendering", resolved.len());
        Ok(resolved.len())
    }

    /// Disposals, matrices, bounds, projection, sorting and lights
    fn prepare(&mut self, scene: &mut Scene, camera: NodeId) -> RenderResult<()> {
        for disposal in scene.take_disposals() {
            match disposal {
                Disposal::Geometry(id) => self.dispose_geometry(id),
                Disposal::Material(id) => self.dispose_material(id),
            }
        }
        self.sweep(scene);

        scene.update_matrix_world();
        let detached = !scene.graph.is_ancestor_or_self(scene.root(), camera);
        if detached && scene.graph.node(camera).is_some_and(|node| node.matrix_world_auto_update) {
            scene.graph.update_world_matrix(camera, true, false);
        }

        for (id, error) in scene.compute_missing_bounds() {
            let name = scene.geometry(id).map_or("", |geometry| geometry.name.as_str());
            self.diagnostics.error_once(
                format!("bounds:{id:?}"),
                format!("Cannot compute bounds of geometry '{name}' ({id:?}): {error}"),
            );
        }

        let Some(view) = ViewInfo::from_camera(scene, camera, self.config.sort_objects) else {
            log::error!("Node {:?} is not a camera", camera);
            return Err(RenderError::InvalidCamera(format!("{camera:?}")));
        };

        self.render_list.init();
        self.collected_lights.clear();
        project_scene(scene, &view, &mut self.render_list, &mut self.collected_lights, &mut self.diagnostics);
        self.render_list.sort(self.opaque_sort, self.transparent_sort);
        self.render_list.finish();

        let frame = Self::frame_camera(scene, camera)?;
        self.lights.setup(&self.collected_lights, &frame.view, self.config.shadow_map.enabled);
        Ok(())
    }

    /// Drop GPU references held for nodes and materials that no longer exist
    fn sweep(&mut self, scene: &Scene) {
        self.buffers.sweep(|node| scene.graph.contains(node), &mut self.backend);

        let removed: Vec<MaterialId> =
            self.material_programs.keys().copied().filter(|&id| scene.material(id).is_none()).collect();
        for id in removed {
            self.dispose_material(id);
        }
    }

    fn frame_camera(scene: &Scene, camera: NodeId) -> RenderResult<FrameCamera> {
        let camera = scene
            .graph
            .node(camera)
            .and_then(Node::as_camera)
            .ok_or_else(|| RenderError::InvalidCamera(format!("{camera:?}")))?;
        Ok(FrameCamera {
            view: *camera.matrix_world_inverse(),
            projection: *camera.projection_matrix(),
            position: *camera.world_position(),
        })
    }

    /// Program for drawing an object with `material`, acquiring it when the inputs changed
    fn resolve_program(
        &mut self,
        scene: &Scene,
        material_id: MaterialId,
        material: &Material,
        object: ObjectFeatures,
    ) -> Option<ProgramId> {
        let clipping = self.clipping.counts(material);
        let inputs = ProgramInputs {
            material_version: material.version(),
            lights_version: self.lights.version(),
            config_generation: self.config_generation,
            clipping,
            object,
            fog_exponential: scene.fog.map(|fog| matches!(fog, Fog::Exponential { .. })),
            environment: scene.environment.is_some(),
        };

        let entry = self.material_programs.entry(material_id).or_default();
        if let Some((last, id)) = entry.last {
            if last == inputs && self.programs.get(id).is_some() {
                return Some(id);
            }
        }

        let context = ProgramContext {
            config: &self.config,
            lights: self.lights.counts(),
            fog: scene.fog.as_ref(),
            environment: scene.environment,
        };
        let parameters = get_parameters(material, &context, clipping, &object);
        let key = get_program_cache_key(&parameters);

        let id = match entry.programs.get(&key).copied().filter(|&id| self.programs.get(id).is_some()) {
            Some(id) => id,
            None => match self.programs.acquire(&parameters, &key, &mut self.backend) {
                Ok(id) => {
                    entry.programs.insert(key, id);
                    id
                }
                Err(error) => {
                    self.diagnostics.error_once(
                        format!("program:{key}"),
                        format!("Cannot build program for material '{}': {error}", material.name),
                    );
                    return None;
                }
            },
        };
        entry.last = Some((inputs, id));
        Some(id)
    }

    fn draw_item(&mut self, scene: &Scene, camera: &FrameCamera, item: &RenderItem) {
        let (Some(node), Some(material), Some(geometry)) =
            (scene.graph.node(item.node), scene.material(item.material), scene.geometry(item.geometry))
        else {
            return;
        };
        let Some(drawable) = node.as_drawable() else {
            return;
        };
        let Some((first, count)) = draw_span(geometry, item.group.as_ref()) else {
            return;
        };

        let object = object_features(node, drawable, geometry);
        let Some(program_id) = self.resolve_program(scene, item.material, material, object) else {
            return;
        };
        if !self.programs.poll(program_id, &mut self.backend) {
            if self.programs.get(program_id).is_some_and(|p| p.status() == CompileStatus::Pending) {
                self.info.pending += 1;
                log::trace!("Program for '{}' still compiling; skipped", node.name);
            }
            return;
        }
        let Some(program) = self.programs.get(program_id) else {
            return;
        };
        let handle = program.handle();
        let uses_lights = program.uses_lights();
        let locations: Vec<(String, u32)> = program.attributes().iter().map(|(name, &loc)| (name.clone(), loc)).collect();

        let bindings = match self.collect_bindings(item, node, drawable, geometry, &locations) {
            Ok(bindings) => bindings,
            Err(error) => {
                self.diagnostics.warn_once(
                    format!("buffers:{:?}", item.geometry),
                    format!("Cannot upload geometry '{}' for node '{}': {error}", geometry.name, node.name),
                );
                return;
            }
        };
        let Some((bindings, instance_count)) = bindings else {
            return;
        };

        let program_changed = self.current_program != Some(program_id);
        if program_changed {
            self.backend.use_program(handle);
            self.current_program = Some(program_id);
            self.current_material = None;
            self.upload_camera_uniforms(camera, uses_lights);
        }
        self.bind(bindings);

        let world = node.world_matrix();
        let mirrored = world.determinant() < 0.0;
        self.state.apply(&material.pipeline_state(mirrored), &mut self.backend);

        if self.current_material != Some(item.material) {
            self.upload_material_uniforms(scene, material, camera);
            self.current_material = Some(item.material);
        }
        self.upload_object_uniforms(camera, world, drawable, geometry);

        let mode = draw_mode(drawable.primitive);
        let call = DrawCall {
            mode,
            first,
            count,
            index_type: self.bound.as_ref().and_then(|b| b.index).and_then(|_| {
                self.buffers.get(item.geometry).and_then(|buffers| buffers.index()).map(|index| index.component_type)
            }),
            instance_count,
        };
        if let Err(error) = self.backend.draw(&call) {
            self.diagnostics.error_once(format!("draw:{:?}", item.node), format!("Draw of '{}' failed: {error}", node.name));
            return;
        }
        self.info.record_draw(mode, count, instance_count.unwrap_or(1));
    }

    /// Upload buffers and map them onto the program's inputs
    ///
    /// `Ok(None)` means there is nothing to draw (no visible instances).
    fn collect_bindings(
        &mut self,
        item: &RenderItem,
        node: &Node,
        drawable: &Drawable,
        geometry: &BufferGeometry,
        locations: &[(String, u32)],
    ) -> RenderResult<Option<(BindingSet, Option<usize>)>> {
        let instance = match &drawable.instances {
            Some(instances) => {
                let (buffer, count) = self.buffers.update_instances(
                    item.node,
                    instances,
                    item.visible_instances.as_deref(),
                    &mut self.backend,
                )?;
                if count == 0 {
                    return Ok(None);
                }
                Some((buffer, count))
            }
            None => None,
        };

        let buffers = self.buffers.update(item.geometry, geometry, item.node, &mut self.backend)?;
        let mut set = BindingSet { index: buffers.index().map(|index| index.buffer), ..BindingSet::default() };

        for (name, location) in locations {
            if name == "instanceMatrix" {
                if let Some((buffer, _)) = instance {
                    for column in 0..4 {
                        set.attributes.push((
                            location + column as u32,
                            AttributeBinding {
                                buffer,
                                item_size: 4,
                                component_type: crate::geometry::ComponentType::F32,
                                normalized: false,
                                stride: INSTANCE_STRIDE,
                                offset: column * 16,
                                divisor: 1,
                            },
                        ));
                    }
                }
                continue;
            }

            match buffers.attribute(name) {
                Some(attribute) => set.attributes.push((
                    *location,
                    AttributeBinding {
                        buffer: attribute.buffer,
                        item_size: attribute.item_size,
                        component_type: attribute.component_type,
                        normalized: attribute.normalized,
                        stride: 0,
                        offset: 0,
                        divisor: 0,
                    },
                )),
                None => match name.as_str() {
                    "color" => set.defaults.push((*location, Vec4::new(1.0, 1.0, 1.0, 1.0))),
                    "uv" | "uv1" => set.defaults.push((*location, Vec4::new(0.0, 0.0, 0.0, 1.0))),
                    _ => log::trace!("Node '{}' has no '{}' attribute", node.name, name),
                },
            }
        }

        Ok(Some((set, instance.map(|(_, count)| count))))
    }

    /// Send the bindings when they differ from what is bound
    fn bind(&mut self, set: BindingSet) {
        if self.bound.as_ref() == Some(&set) {
            return;
        }

        if let Some(previous) = &self.bound {
            let stale = previous
                .attributes
                .iter()
                .map(|(location, _)| *location)
                .chain(previous.defaults.iter().map(|(location, _)| *location))
                .filter(|location| {
                    !set.attributes.iter().any(|(l, _)| l == location) && !set.defaults.iter().any(|(l, _)| l == location)
                });
            for location in stale {
                self.backend.disable_attribute(location);
            }
        }

        for (location, binding) in &set.attributes {
            self.backend.bind_attribute(*location, binding);
        }
        for (location, value) in &set.defaults {
            self.backend.set_default_attribute(*location, *value);
        }
        if let Some(index) = set.index {
            if self.bound.as_ref().and_then(|b| b.index) != Some(index) {
                self.backend.bind_index_buffer(index);
            }
        }
        self.bound = Some(set);
    }

    fn upload_camera_uniforms(&mut self, camera: &FrameCamera, uses_lights: bool) {
        self.backend.set_uniform("projectionMatrix", &UniformValue::Mat4(camera.projection));
        self.backend.set_uniform("viewMatrix", &UniformValue::Mat4(camera.view));
        self.backend.set_uniform("cameraPosition", &UniformValue::Vec3(camera.position));
        self.backend.set_uniform("toneMappingExposure", &UniformValue::Float(self.config.tone_mapping_exposure));
        if uses_lights {
            for (name, value) in self.lights.uniforms() {
                self.backend.set_uniform(name, &value);
            }
        }
    }

    fn upload_material_uniforms(&mut self, scene: &Scene, material: &Material, camera: &FrameCamera) {
        for (name, value) in material_uniforms(material, scene.fog.as_ref(), scene.environment) {
            self.backend.set_uniform(&name, &value);
        }
        if matches!(material.material_type, MaterialType::Points { .. }) {
            let pixel_scale = self.height as f32 * self.pixel_ratio * 0.5;
            self.backend.set_uniform("pixelScale", &UniformValue::Float(pixel_scale));
        }
        if self.clipping.counts(material).planes > 0 {
            let planes = self.clipping.uniform_planes(material, &camera.view);
            self.backend.set_uniform("clippingPlanes", &UniformValue::Vec4Array(planes));
        }
    }

    fn upload_object_uniforms(&mut self, camera: &FrameCamera, world: &Mat4, drawable: &Drawable, geometry: &BufferGeometry) {
        let model_view = camera.view * world;
        self.backend.set_uniform("modelMatrix", &UniformValue::Mat4(*world));
        self.backend.set_uniform("modelViewMatrix", &UniformValue::Mat4(model_view));
        self.backend.set_uniform("normalMatrix", &UniformValue::Mat3(normal_matrix(&model_view)));

        let targets = geometry.morph_attribute("position").map_or(0, <[_]>::len).min(MAX_MORPH_TARGETS);
        if targets > 0 {
            let influences: Vec<f32> = (0..targets)
                .map(|i| drawable.morph_target_influences.get(i).copied().unwrap_or(0.0))
                .collect();
            let base = if geometry.morph_targets_relative { 1.0 } else { 1.0 - influences.iter().sum::<f32>() };
            self.backend.set_uniform("morphTargetBaseInfluence", &UniformValue::Float(base));
            self.backend.set_uniform("morphTargetInfluences", &UniformValue::FloatArray(influences));
        }

        if let Primitive::Sprite { center } = drawable.primitive {
            self.backend.set_uniform("center", &UniformValue::Vec2(center));
        }
    }
}

/// Shader-relevant inputs contributed by the drawn object
fn object_features(node: &Node, drawable: &Drawable, geometry: &BufferGeometry) -> ObjectFeatures {
    ObjectFeatures {
        instancing: drawable.instances.is_some(),
        morph_target_count: geometry.morph_attribute("position").map_or(0, <[_]>::len),
        morph_normals: geometry.morph_attribute("normal").is_some_and(|targets| !targets.is_empty()),
        morph_targets_relative: geometry.morph_targets_relative,
        skinning: drawable.skinned,
        receive_shadow: node.receive_shadow,
        vertex_alphas: geometry.get_attribute("color").is_some_and(|color| color.item_size() == 4),
    }
}

/// First element and count drawn for an entry, clipped to the draw range and group
fn draw_span(geometry: &BufferGeometry, group: Option<&GeometryGroup>) -> Option<(usize, usize)> {
    let range = geometry.draw_range();
    let mut start = range.start;
    let mut end = range.start.saturating_add(range.count).min(geometry.element_count());
    if let Some(group) = group {
        start = start.max(group.start);
        end = end.min(group.start.saturating_add(group.count));
    }
    (end > start).then(|| (start, end - start))
}

const fn draw_mode(primitive: Primitive) -> DrawMode {
    match primitive {
        Primitive::Mesh | Primitive::Sprite { .. } => DrawMode::Triangles,
        Primitive::Line(LineTopology::Strip) => DrawMode::LineStrip,
        Primitive::Line(LineTopology::Loop) => DrawMode::LineLoop,
        Primitive::Line(LineTopology::Segments) => DrawMode::Lines,
        Primitive::Points => DrawMode::Points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Vec2, Vec3};
    use crate::geometry::BufferAttribute;
    use crate::render::backends::{BackendCommand, HeadlessBackend};
    use crate::render::pipeline::Blending;
    use crate::scene::{Camera, Instances, Light, NodeKind};
    use approx::assert_relative_eq;
    use nalgebra::Translation3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts error records mentioning one geometry name
    struct ErrorCounter(AtomicUsize);

    impl log::Log for ErrorCounter {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Error
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) && record.args().to_string().contains("broken_positions") {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn flush(&self) {}
    }

    static BOUNDS_ERRORS: ErrorCounter = ErrorCounter(AtomicUsize::new(0));

    struct Fixture {
        renderer: Renderer<HeadlessBackend>,
        scene: Scene,
        camera: NodeId,
        triangle: GeometryId,
    }

    fn fixture() -> Fixture {
        let mut scene = Scene::new();
        let root = scene.root();
        let camera = scene.add_camera(root, Camera::perspective(50.0, 1.0, 0.1, 100.0)).unwrap();
        scene.graph.node_mut(camera).unwrap().set_position(Vec3::new(0.0, 0.0, 5.0));
        let triangle = scene.add_geometry(BufferGeometry::from_positions(&[
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]));
        let mut renderer = Renderer::new(HeadlessBackend::new(), RendererConfig::default());
        renderer.set_size(640, 480, 1.0);
        Fixture { renderer, scene, camera, triangle }
    }

    impl Fixture {
        fn mesh(&mut self, material: Material) -> (NodeId, MaterialId) {
            let material = self.scene.add_material(material);
            let root = self.scene.root();
            let node = self.scene.add_mesh(root, self.triangle, material).unwrap();
            (node, material)
        }

        fn frame(&mut self) -> Vec<BackendCommand> {
            self.renderer.backend_mut().take_commands();
            self.renderer.render(&mut self.scene, self.camera).unwrap();
            self.renderer.backend_mut().take_commands()
        }
    }

    fn draws(commands: &[BackendCommand]) -> Vec<DrawCall> {
        commands
            .iter()
            .filter_map(|command| match command {
                BackendCommand::Draw(call) => Some(*call),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_mesh_frame() {
        let mut f = fixture();
        f.mesh(Material::basic(Vec3::new(1.0, 0.0, 0.0)));

        let commands = f.frame();
        assert!(matches!(commands.first(), Some(BackendCommand::BeginFrame(_))));
        assert!(matches!(commands.last(), Some(BackendCommand::EndFrame)));
        assert_eq!(
            draws(&commands),
            vec![DrawCall { mode: DrawMode::Triangles, first: 0, count: 3, index_type: None, instance_count: None }]
        );

        let info = f.renderer.info();
        assert_eq!((info.frame, info.calls, info.triangles, info.programs, info.geometries), (1, 1, 1, 1, 1));
    }

    #[test]
    fn test_invalid_camera_is_an_error() {
        let mut f = fixture();
        let (node, _) = f.mesh(Material::default());

        let result = f.renderer.render(&mut f.scene, node);
        assert!(matches!(result, Err(RenderError::InvalidCamera(_))));
    }

    #[test]
    fn test_backend_frame_failure_surfaces() {
        let mut f = fixture();
        f.mesh(Material::default());
        f.renderer.backend_mut().fail_next_frame();

        assert!(matches!(f.renderer.render(&mut f.scene, f.camera), Err(RenderError::BackendError(_))));
        assert!(f.renderer.render(&mut f.scene, f.camera).is_ok());
    }

    #[test]
    fn test_pending_program_is_retried() {
        let mut f = fixture();
        f.renderer.backend_mut().compile_latency = 1;
        f.mesh(Material::default());

        assert!(draws(&f.frame()).is_empty());
        assert_eq!(f.renderer.info().pending, 1);
        assert_eq!(draws(&f.frame()).len(), 1);
        assert_eq!(f.renderer.info().pending, 0);
    }

    #[test]
    fn test_failed_program_skips_only_its_entries() {
        let mut f = fixture();
        f.renderer.backend_mut().fail_compile_containing("SHADER_NAME lambert");
        let (_, lambert) = f.mesh(Material::lambert(Vec3::new(1.0, 1.0, 1.0)));
        f.mesh(Material::basic(Vec3::new(1.0, 1.0, 1.0)));

        assert_eq!(draws(&f.frame()).len(), 1);
        assert_eq!(draws(&f.frame()).len(), 1);

        let program = f.renderer.material_program(lambert).unwrap();
        let program = f.renderer.programs().get(program).unwrap();
        assert_eq!(program.status(), CompileStatus::Failed);
        assert!(program.diagnostics().is_some_and(|d| d.log.contains("syntax error")));
    }

    #[test]
    fn test_state_and_bindings_are_diffed() {
        let mut f = fixture();
        let material = f.scene.add_material(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        let root = f.scene.root();
        for x in [-0.5, 0.5] {
            let node = f.scene.add_mesh(root, f.triangle, material).unwrap();
            f.scene.graph.node_mut(node).unwrap().set_position(Vec3::new(x, 0.0, 0.0));
        }

        let commands = f.frame();
        let count = |predicate: fn(&BackendCommand) -> bool| commands.iter().filter(|c| predicate(c)).count();
        assert_eq!(draws(&commands).len(), 2);
        assert_eq!(count(|c| matches!(c, BackendCommand::UseProgram(_))), 1);
        assert_eq!(count(|c| matches!(c, BackendCommand::SetBlending { .. })), 1);
        assert_eq!(count(|c| matches!(c, BackendCommand::BindAttribute { .. })), 1);
        assert_eq!(count(|c| matches!(c, BackendCommand::SetUniform { name, .. } if name == "diffuse")), 1);
        assert_eq!(count(|c| matches!(c, BackendCommand::SetUniform { name, .. } if name == "modelMatrix")), 2);
    }

    #[test]
    fn test_transparent_material_enables_blending() {
        let mut f = fixture();
        f.mesh(Material::basic(Vec3::new(1.0, 1.0, 1.0)).with_transparency(0.5));

        let commands = f.frame();
        assert!(commands.iter().any(|c| matches!(c, BackendCommand::SetBlending { blending: Blending::Normal, .. })));
    }

    #[test]
    fn test_missing_color_gets_default_value() {
        let mut f = fixture();
        let mut material = Material::basic(Vec3::new(1.0, 1.0, 1.0));
        material.vertex_colors = true;
        f.mesh(material);

        let commands = f.frame();
        assert!(commands
            .iter()
            .any(|c| matches!(c, BackendCommand::DefaultAttribute { value, .. } if *value == Vec4::new(1.0, 1.0, 1.0, 1.0))));
        assert_eq!(draws(&commands).len(), 1);
    }

    #[test]
    fn test_material_update_reacquires_program() {
        let mut f = fixture();
        let (_, id) = f.mesh(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        f.frame();
        let before = f.renderer.material_program(id);

        let material = f.scene.material_mut(id).unwrap();
        material.vertex_colors = true;
        material.needs_update();
        f.frame();

        assert_ne!(f.renderer.material_program(id), before);
        assert_eq!(f.renderer.programs().program_count(), 2);
    }

    #[test]
    fn test_light_count_change_reacquires_lit_program() {
        let mut f = fixture();
        let (_, material) = f.mesh(Material::lambert(Vec3::new(1.0, 1.0, 1.0)));
        f.frame();
        let unlit = f.renderer.material_program(material);

        let root = f.scene.root();
        f.scene.add_light(root, Light::directional(Vec3::new(1.0, 1.0, 1.0), 1.0)).unwrap();
        let commands = f.frame();

        assert_ne!(f.renderer.material_program(material), unlit);
        assert!(commands.iter().any(|c| matches!(c, BackendCommand::SetUniform { name, .. } if name == "directionalLights.direction")));
    }

    #[test]
    fn test_removals_release_gpu_resources() {
        let mut f = fixture();
        let (node, material) = f.mesh(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        f.frame();
        assert_eq!((f.renderer.backend().program_count(), f.renderer.backend().buffer_count()), (1, 1));

        f.scene.graph.destroy(node);
        f.scene.remove_material(material);
        f.frame();

        assert_eq!(f.renderer.backend().program_count(), 0);
        assert_eq!(f.renderer.backend().buffer_count(), 0);
        assert_eq!(f.renderer.info().calls, 0);
    }

    #[test]
    fn test_instanced_draw_uses_visible_instances() {
        let mut f = fixture();
        let material = f.scene.add_material(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        let mut instances = Instances::new(vec![
            Mat4::identity(),
            Translation3::new(0.0, 0.0, 50.0).to_homogeneous(),
            Translation3::new(0.5, 0.0, 0.0).to_homogeneous(),
        ]);
        instances.per_instance_culling = true;
        let root = f.scene.root();
        f.scene.add_drawable(root, Drawable::instanced_mesh(f.triangle, material, instances)).unwrap();

        let commands = f.frame();
        assert_eq!(draws(&commands)[0].instance_count, Some(2));
        let instance_columns = commands
            .iter()
            .filter(|c| matches!(c, BackendCommand::BindAttribute { binding, .. } if binding.divisor == 1))
            .count();
        assert_eq!(instance_columns, 4);
        assert_eq!(f.renderer.info().triangles, 2);
    }

    #[test]
    fn test_indexed_group_draws() {
        let mut f = fixture();
        let mut quad = BufferGeometry::from_positions(&[
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ]);
        quad.set_attribute("uv", BufferAttribute::from_vec2s(&[Vec2::zeros(); 4]));
        quad.set_index(vec![0, 1, 2, 0, 2, 3]);
        quad.add_group(0, 3, 0);
        quad.add_group(3, 3, 1);
        let quad = f.scene.add_geometry(quad);
        let red = f.scene.add_material(Material::basic(Vec3::new(1.0, 0.0, 0.0)));
        let blue = f.scene.add_material(Material::basic(Vec3::new(0.0, 0.0, 1.0)));
        let root = f.scene.root();
        f.scene.add_drawable(root, Drawable::multi_material_mesh(quad, vec![red, blue])).unwrap();

        let calls = draws(&f.frame());
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|call| call.index_type == Some(crate::geometry::ComponentType::U16)));
        let mut spans: Vec<(usize, usize)> = calls.iter().map(|call| (call.first, call.count)).collect();
        spans.sort_unstable();
        assert_eq!(spans, vec![(0, 3), (3, 3)]);
        assert_eq!(f.renderer.programs().program_count(), 1);
    }

    #[test]
    fn test_line_and_point_modes() {
        let mut f = fixture();
        let root = f.scene.root();
        let line_material = f.scene.add_material(Material::line_basic(Vec3::new(1.0, 1.0, 1.0)));
        let points_material = f.scene.add_material(Material::points(Vec3::new(1.0, 1.0, 1.0), 2.0));
        f.scene.add_line(root, f.triangle, line_material, LineTopology::Loop).unwrap();
        f.scene.add_points(root, f.triangle, points_material).unwrap();

        let modes: Vec<DrawMode> = draws(&f.frame()).iter().map(|call| call.mode).collect();
        assert!(modes.contains(&DrawMode::LineLoop));
        assert!(modes.contains(&DrawMode::Points));
        assert_eq!((f.renderer.info().lines, f.renderer.info().points), (3, 3));
    }

    #[test]
    fn test_compile_prewarms_programs() {
        let mut f = fixture();
        f.mesh(Material::basic(Vec3::new(1.0, 0.0, 0.0)));
        f.mesh(Material::basic(Vec3::new(0.0, 1.0, 0.0)));
        f.mesh(Material::phong(Vec3::new(0.0, 0.0, 1.0), 30.0));

        assert_eq!(f.renderer.compile(&mut f.scene, f.camera).unwrap(), 2);
        assert_eq!(f.renderer.backend().program_count(), 2);
        assert!(f.renderer.backend().draw_calls().is_empty());
    }

    #[test]
    fn test_global_clipping_planes_are_uploaded() {
        let mut f = fixture();
        f.mesh(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        f.renderer.set_clipping_planes(vec![Plane::new(Vec3::x(), 0.0)]);

        let commands = f.frame();
        let clipping = commands.iter().find_map(|c| match c {
            BackendCommand::SetUniform { name, value: UniformValue::Vec4Array(planes) } if name == "clippingPlanes" => {
                Some(planes.len())
            }
            _ => None,
        });
        assert_eq!(clipping, Some(1));
    }

    #[test]
    fn test_mirrored_object_flips_winding() {
        let mut f = fixture();
        let (node, _) = f.mesh(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        f.scene.graph.node_mut(node).unwrap().set_scale(Vec3::new(-1.0, 1.0, 1.0));

        let commands = f.frame();
        assert!(commands.iter().any(|c| matches!(
            c,
            BackendCommand::SetCull { front_face: crate::render::pipeline::FrontFace::Clockwise, .. }
        )));
    }

    #[test]
    fn test_detached_camera_gets_a_fresh_view() {
        let mut f = fixture();
        f.mesh(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        let camera = f.scene.graph.insert(NodeKind::Camera(Camera::perspective(50.0, 1.0, 0.1, 100.0)));
        f.scene.graph.node_mut(camera).unwrap().set_position(Vec3::new(0.0, 0.0, 5.0));
        f.camera = camera;

        let commands = f.frame();
        let view = commands.iter().find_map(|c| match c {
            BackendCommand::SetUniform { name, value: UniformValue::Mat4(matrix) } if name == "viewMatrix" => Some(*matrix),
            _ => None,
        });

        let expected: Mat4 = Translation3::new(0.0, 0.0, -5.0).to_homogeneous();
        assert_relative_eq!(view.expect("view uploaded"), expected, epsilon = 1e-5);
        assert_eq!(f.renderer.info().calls, 1);
    }

    #[test]
    fn test_morph_targets_added_after_first_frame_are_bound() {
        let mut f = fixture();
        let (node, _) = f.mesh(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        f.frame();

        let offsets = BufferAttribute::from_vec3s(&[Vec3::z(); 3]);
        f.scene.geometry_mut(f.triangle).unwrap().set_morph_attribute("position", vec![offsets]);
        if let Some(drawable) = f.scene.graph.node_mut(node).unwrap().as_drawable_mut() {
            drawable.morph_target_influences = vec![1.0];
        }
        let commands = f.frame();

        let buffer = f.renderer.buffers.get(f.triangle).and_then(|b| b.attribute("morphTarget0")).map(|a| a.buffer);
        assert!(buffer.is_some());
        assert!(commands.iter().any(|c| matches!(
            c,
            BackendCommand::BindAttribute { binding, .. } if Some(binding.buffer) == buffer
        )));
    }

    #[test]
    fn test_nan_geometry_is_reported_once() {
        let mut f = fixture();
        let counting = log::set_logger(&BOUNDS_ERRORS).is_ok();
        if counting {
            log::set_max_level(log::LevelFilter::Error);
        }
        let mut geometry = BufferGeometry::from_positions(&[Vec3::new(0.0, f32::NAN, 0.0), Vec3::x(), Vec3::y()]);
        geometry.name = "broken_positions".to_string();
        let broken = f.scene.add_geometry(geometry);
        let material = f.scene.add_material(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        let root = f.scene.root();
        f.scene.add_mesh(root, broken, material).unwrap();

        for _ in 0..5 {
            f.frame();
        }

        assert!(f.renderer.diagnostics().was_reported(&format!("bounds:{broken:?}")));
        assert!(f.scene.geometry(broken).unwrap().bounding_sphere().is_none());
        if counting {
            assert_eq!(BOUNDS_ERRORS.0.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_morph_influences_are_clamped_to_targets() {
        let mut f = fixture();
        let offsets = BufferAttribute::from_vec3s(&[Vec3::zeros(); 3]);
        f.scene.geometry_mut(f.triangle).unwrap().set_morph_attribute("position", vec![offsets.clone(), offsets]);
        let (node, _) = f.mesh(Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        if let Some(drawable) = f.scene.graph.node_mut(node).unwrap().as_drawable_mut() {
            drawable.morph_target_influences = vec![0.25, 0.25, 0.9];
        }

        let commands = f.frame();
        let influences = commands.iter().find_map(|c| match c {
            BackendCommand::SetUniform { name, value: UniformValue::FloatArray(values) } if name == "morphTargetInfluences" => {
                Some(values.clone())
            }
            _ => None,
        });
        assert_eq!(influences, Some(vec![0.25, 0.25]));
        assert!(commands.iter().any(|c| matches!(
            c,
            BackendCommand::SetUniform { name, value: UniformValue::Float(base) } if name == "morphTargetBaseInfluence" && (*base - 0.5).abs() < 1e-6
        )));
    }
}
