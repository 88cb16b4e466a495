//! Fixed-function state diffing
//!
//! Remembers the last state sent to the backend and forwards only the
//! groups that differ. After [`StateCache::reset`] the next apply sends
//! everything.

use crate::render::api::GpuBackend;
use crate::render::pipeline::PipelineState;

/// Last applied pipeline state
#[derive(Debug, Default)]
pub struct StateCache {
    current: Option<PipelineState>,
}

impl StateCache {
    /// Nothing applied yet
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Forget the applied state; used at frame start
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// State last sent to the backend
    pub const fn current(&self) -> Option<&PipelineState> {
        self.current.as_ref()
    }

    /// Send the groups of `state` that changed; returns how many were sent
    pub fn apply<B: GpuBackend>(&mut self, state: &PipelineState, backend: &mut B) -> usize {
        let previous = self.current.replace(*state);
        let changed = |same: fn(&PipelineState, &PipelineState) -> bool| previous.as_ref().map_or(true, |p| !same(p, state));
        let mut sent = 0;

        if changed(|a, b| a.blending == b.blending && a.premultiplied_alpha == b.premultiplied_alpha) {
            backend.set_blending(state.blending, state.premultiplied_alpha);
            sent += 1;
        }
        if changed(|a, b| a.depth_test == b.depth_test && a.depth_write == b.depth_write && a.depth_func == b.depth_func) {
            backend.set_depth(state.depth_test, state.depth_write, state.depth_func);
            sent += 1;
        }
        if changed(|a, b| a.stencil == b.stencil) {
            backend.set_stencil(&state.stencil);
            sent += 1;
        }
        if changed(|a, b| a.cull_mode == b.cull_mode && a.front_face == b.front_face) {
            backend.set_cull(state.cull_mode, state.front_face);
            sent += 1;
        }
        if changed(|a, b| a.polygon_offset == b.polygon_offset) {
            backend.set_polygon_offset(state.polygon_offset);
            sent += 1;
        }
        if changed(|a, b| a.polygon_mode == b.polygon_mode) {
            backend.set_polygon_mode(state.polygon_mode);
            sent += 1;
        }
        if changed(|a, b| a.color_write == b.color_write) {
            backend.set_color_write(state.color_write);
            sent += 1;
        }

        if sent > 0 {
            log::trace!("Applied {} pipeline state groups", sent);
        }
        sent
    }
}
