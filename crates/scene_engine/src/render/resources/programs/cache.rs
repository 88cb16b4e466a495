//! Reference-counted program cache
//!
//! One cache per renderer. Programs are deduplicated by cache key: the key is
//! looked up before anything is compiled, so repeated requests for the same
//! key within a frame share one program.

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use super::program::{build_sources, Program};
use super::{ProgramError, ProgramParameters};
use crate::render::api::{GpuBackend, ProgramStatus};

new_key_type! {
    /// Handle of a cached program
    pub struct ProgramId;
}

/// Compiled programs keyed by their cache key
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: SlotMap<ProgramId, Program>,
    by_key: HashMap<String, ProgramId>,
}

impl ProgramCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the program for `key`, compiling it on a miss
    pub fn acquire<B: GpuBackend>(
        &mut self,
        parameters: &ProgramParameters,
        key: &str,
        backend: &mut B,
    ) -> Result<ProgramId, ProgramError> {
        if let Some(&id) = self.by_key.get(key) {
            if let Some(program) = self.programs.get_mut(id) {
                program.retain();
                return Ok(id);
            }
        }

        let sources = build_sources(parameters)?;
        let handle = backend
            .compile_program(&sources)
            .map_err(|e| ProgramError::Backend(e.to_string()))?;
        let uses_lights = parameters.features.contains(super::ProgramFeatures::LIGHTS);

        log::debug!("Compiling program '{}' ({})", sources.name, key);
        let id = self.programs.insert(Program::new(key.to_string(), handle, sources, uses_lights));
        self.by_key.insert(key.to_string(), id);
        Ok(id)
    }

    /// Drop one use; deletes the program when nothing uses it anymore
    pub fn release<B: GpuBackend>(&mut self, id: ProgramId, backend: &mut B) {
        let Some(program) = self.programs.get_mut(id) else {
            return;
        };
        if program.release() > 0 {
            return;
        }

        if let Some(program) = self.programs.remove(id) {
            log::debug!("Deleting program '{}'", program.name());
            self.by_key.remove(program.key());
            backend.delete_program(program.handle());
        }
    }

    /// Refresh readiness of a pending program; returns whether it is ready
    pub fn poll<B: GpuBackend>(&mut self, id: ProgramId, backend: &mut B) -> bool {
        let Some(program) = self.programs.get_mut(id) else {
            return false;
        };
        if program.status() != super::CompileStatus::Pending {
            return program.is_ready();
        }

        match backend.poll_program(program.handle()) {
            ProgramStatus::Pending => false,
            ProgramStatus::Ready => {
                program.mark_ready(backend.attribute_locations(program.handle()));
                true
            }
            ProgramStatus::Failed { log } => {
                log::error!("Program '{}' failed to compile: {}", program.name(), log);
                program.mark_failed(log);
                false
            }
        }
    }

    /// Cached program
    pub fn get(&self, id: ProgramId) -> Option<&Program> {
        self.programs.get(id)
    }

    /// Program cached under `key`
    pub fn find(&self, key: &str) -> Option<ProgramId> {
        self.by_key.get(key).copied()
    }

    /// Number of live programs
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Release every program regardless of use count
    pub fn clear<B: GpuBackend>(&mut self, backend: &mut B) {
        for (_, program) in self.programs.drain() {
            backend.delete_program(program.handle());
        }
        self.by_key.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RendererConfig;
    use crate::foundation::math::Vec3;
    use crate::render::backends::HeadlessBackend;
    use crate::render::clipping::ClippingCounts;
    use crate::render::lighting::LightCounts;
    use crate::render::resources::materials::Material;
    use crate::render::resources::programs::{get_parameters, get_program_cache_key, CompileStatus, ObjectFeatures, ProgramContext};

    fn acquire(cache: &mut ProgramCache, backend: &mut HeadlessBackend, material: &Material) -> ProgramId {
        let config = RendererConfig::default();
        let context = ProgramContext { config: &config, lights: LightCounts::default(), fog: None, environment: None };
        let parameters = get_parameters(material, &context, ClippingCounts::default(), &ObjectFeatures::default());
        let key = get_program_cache_key(&parameters);
        cache.acquire(&parameters, &key, backend).unwrap()
    }

    #[test]
    fn test_identical_parameters_share_a_program() {
        let mut cache = ProgramCache::new();
        let mut backend = HeadlessBackend::new();

        let first = acquire(&mut cache, &mut backend, &Material::standard(Vec3::new(1.0, 0.0, 0.0), 0.5, 0.0));
        let second = acquire(&mut cache, &mut backend, &Material::standard(Vec3::new(0.0, 1.0, 0.0), 0.9, 1.0));

        assert_eq!(first, second);
        assert_eq!(cache.program_count(), 1);
        assert_eq!(backend.program_count(), 1);
        assert_eq!(cache.get(first).unwrap().use_count(), 2);
    }

    #[test]
    fn test_release_deletes_at_zero() {
        let mut cache = ProgramCache::new();
        let mut backend = HeadlessBackend::new();
        let material = Material::basic(Vec3::new(1.0, 1.0, 1.0));

        let id = acquire(&mut cache, &mut backend, &material);
        acquire(&mut cache, &mut backend, &material);

        cache.release(id, &mut backend);
        assert_eq!(cache.program_count(), 1);
        cache.release(id, &mut backend);
        assert_eq!(cache.program_count(), 0);
        assert_eq!(backend.program_count(), 0);

        let again = acquire(&mut cache, &mut backend, &material);
        assert_eq!(cache.get(again).unwrap().use_count(), 1);
    }

    #[test]
    fn test_poll_resolves_pending_programs() {
        let mut cache = ProgramCache::new();
        let mut backend = HeadlessBackend::new();
        backend.compile_latency = 1;

        let id = acquire(&mut cache, &mut backend, &Material::basic(Vec3::new(1.0, 1.0, 1.0)));
        assert!(!cache.poll(id, &mut backend));
        assert!(cache.poll(id, &mut backend));

        let program = cache.get(id).unwrap();
        assert!(program.attributes().contains_key("position"));
    }

    #[test]
    fn test_compile_failure_attaches_diagnostics() {
        let mut cache = ProgramCache::new();
        let mut backend = HeadlessBackend::new();
        backend.fail_compile_containing("SHADER_NAME lambert");

        let lit = acquire(&mut cache, &mut backend, &Material::lambert(Vec3::new(1.0, 1.0, 1.0)));
        let unlit = acquire(&mut cache, &mut backend, &Material::basic(Vec3::new(1.0, 1.0, 1.0)));

        assert!(!cache.poll(lit, &mut backend));
        assert!(cache.poll(unlit, &mut backend));

        let failed = cache.get(lit).unwrap();
        assert_eq!(failed.status(), CompileStatus::Failed);
        assert!(failed.diagnostics().unwrap().fragment_source.contains("SHADER_NAME lambert"));
    }
}
