//! In-memory backend that records every command
//!
//! Used by tests and by tools that need the renderer's output without a GPU.
//! Programs "compile" by scanning the vertex stage for `in <type> <name>;`
//! declarations, which become the program's attribute locations.

use std::collections::HashMap;

use crate::foundation::math::Vec4;
use crate::render::api::{
    AttributeBinding, BackendResult, BufferHandle, BufferTarget, ClearFlags, DrawCall, GpuBackend,
    ProgramHandle, ProgramSources, ProgramStatus, UniformValue, Viewport,
};
use crate::render::pipeline::{
    Blending, CullMode, DepthFunc, FrontFace, PolygonMode, PolygonOffset, StencilState,
};
use crate::render::RenderError;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum BackendCommand {
    BeginFrame(Viewport),
    EndFrame,
    Clear(ClearFlags),
    CompileProgram { program: ProgramHandle, name: String },
    DeleteProgram(ProgramHandle),
    UseProgram(ProgramHandle),
    CreateBuffer { buffer: BufferHandle, target: BufferTarget, size: usize },
    UpdateBuffer { buffer: BufferHandle, size: usize },
    DeleteBuffer(BufferHandle),
    BindAttribute { location: u32, binding: AttributeBinding },
    DefaultAttribute { location: u32, value: Vec4 },
    DisableAttribute(u32),
    BindIndexBuffer(BufferHandle),
    SetBlending { blending: Blending, premultiplied_alpha: bool },
    SetDepth { test: bool, write: bool, func: DepthFunc },
    SetStencil(StencilState),
    SetCull { cull: CullMode, front_face: FrontFace },
    SetPolygonOffset(PolygonOffset),
    SetPolygonMode(PolygonMode),
    SetColorWrite(bool),
    SetUniform { name: String, value: UniformValue },
    Draw(DrawCall),
}

#[derive(Debug)]
struct HeadlessProgram {
    sources: ProgramSources,
    attributes: Vec<(String, u32)>,
    polls_remaining: u32,
    failure: Option<String>,
}

/// Recording GPU backend
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    commands: Vec<BackendCommand>,
    programs: HashMap<ProgramHandle, HeadlessProgram>,
    buffers: HashMap<BufferHandle, Vec<u8>>,
    next_handle: u64,
    current_program: Option<ProgramHandle>,
    in_frame: bool,
    fail_markers: Vec<String>,
    fail_next_frame: bool,
    /// Number of polls a new program reports `Pending` before it resolves
    pub compile_latency: u32,
}

impl HeadlessBackend {
    /// Backend whose programs are ready immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Programs whose sources contain `marker` fail to compile
    pub fn fail_compile_containing(&mut self, marker: impl Into<String>) {
        self.fail_markers.push(marker.into());
    }

    /// Make the next `begin_frame` fail
    pub fn fail_next_frame(&mut self) {
        self.fail_next_frame = true;
    }

    /// Everything recorded so far
    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    /// Drain the recording
    pub fn take_commands(&mut self) -> Vec<BackendCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Recorded draw calls
    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                BackendCommand::Draw(call) => Some(*call),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded commands matching `predicate`
    pub fn count(&self, predicate: impl Fn(&BackendCommand) -> bool) -> usize {
        self.commands.iter().filter(|command| predicate(command)).count()
    }

    /// Live programs
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Live buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Sources a program was compiled from
    pub fn program_sources(&self, program: ProgramHandle) -> Option<&ProgramSources> {
        self.programs.get(&program).map(|p| &p.sources)
    }

    /// Current contents of a buffer
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn parse_attributes(vertex: &str) -> Vec<(String, u32)> {
        let mut location = 0;
        let mut attributes = Vec::new();
        for line in vertex.lines().map(str::trim) {
            let Some(declaration) = line.strip_prefix("in ").and_then(|rest| rest.strip_suffix(';')) else {
                continue;
            };
            let mut parts = declaration.split_whitespace();
            let (Some(ty), Some(name)) = (parts.next(), parts.next()) else {
                continue;
            };
            attributes.push((name.to_string(), location));
            location += match ty {
                "mat4" => 4,
                "mat3" => 3,
                _ => 1,
            };
        }
        attributes
    }
}

impl GpuBackend for HeadlessBackend {
    fn begin_frame(&mut self, viewport: Viewport) -> BackendResult<()> {
        if std::mem::take(&mut self.fail_next_frame) {
            return Err(RenderError::BackendError("device lost".to_string()));
        }
        if self.in_frame {
            return Err(RenderError::RenderingFailed("frame already in progress".to_string()));
        }
        self.in_frame = true;
        self.commands.push(BackendCommand::BeginFrame(viewport));
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if !self.in_frame {
            return Err(RenderError::RenderingFailed("no frame in progress".to_string()));
        }
        self.in_frame = false;
        self.commands.push(BackendCommand::EndFrame);
        Ok(())
    }

    fn clear(&mut self, flags: ClearFlags, _color: [f32; 4]) {
        self.commands.push(BackendCommand::Clear(flags));
    }

    fn compile_program(&mut self, sources: &ProgramSources) -> BackendResult<ProgramHandle> {
        let program = ProgramHandle(self.next_handle());
        let failure = self
            .fail_markers
            .iter()
            .find(|marker| sources.vertex.contains(marker.as_str()) || sources.fragment.contains(marker.as_str()))
            .map(|marker| format!("ERROR: 0:1: '{marker}' : syntax error"));

        self.programs.insert(
            program,
            HeadlessProgram {
                sources: sources.clone(),
                attributes: Self::parse_attributes(&sources.vertex),
                polls_remaining: self.compile_latency,
                failure,
            },
        );
        self.commands.push(BackendCommand::CompileProgram { program, name: sources.name.clone() });
        Ok(program)
    }

    fn poll_program(&mut self, program: ProgramHandle) -> ProgramStatus {
        let Some(entry) = self.programs.get_mut(&program) else {
            return ProgramStatus::Failed { log: format!("unknown program {}", program.0) };
        };
        if entry.polls_remaining > 0 {
            entry.polls_remaining -= 1;
            return ProgramStatus::Pending;
        }
        match &entry.failure {
            Some(log) => ProgramStatus::Failed { log: log.clone() },
            None => ProgramStatus::Ready,
        }
    }

    fn attribute_locations(&self, program: ProgramHandle) -> Vec<(String, u32)> {
        self.programs.get(&program).map(|p| p.attributes.clone()).unwrap_or_default()
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.commands.push(BackendCommand::DeleteProgram(program));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
        self.commands.push(BackendCommand::UseProgram(program));
    }

    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> BackendResult<BufferHandle> {
        let buffer = BufferHandle(self.next_handle());
        self.buffers.insert(buffer, data.to_vec());
        self.commands.push(BackendCommand::CreateBuffer { buffer, target, size: data.len() });
        Ok(buffer)
    }

    fn update_buffer(&mut self, buffer: BufferHandle, data: &[u8]) -> BackendResult<()> {
        let stored = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| RenderError::ResourceCreationFailed(format!("unknown buffer {}", buffer.0)))?;
        stored.clear();
        stored.extend_from_slice(data);
        self.commands.push(BackendCommand::UpdateBuffer { buffer, size: data.len() });
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
        self.commands.push(BackendCommand::DeleteBuffer(buffer));
    }

    fn bind_attribute(&mut self, location: u32, binding: &AttributeBinding) {
        self.commands.push(BackendCommand::BindAttribute { location, binding: *binding });
    }

    fn set_default_attribute(&mut self, location: u32, value: Vec4) {
        self.commands.push(BackendCommand::DefaultAttribute { location, value });
    }

    fn disable_attribute(&mut self, location: u32) {
        self.commands.push(BackendCommand::DisableAttribute(location));
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle) {
        self.commands.push(BackendCommand::BindIndexBuffer(buffer));
    }

    fn set_blending(&mut self, blending: Blending, premultiplied_alpha: bool) {
        self.commands.push(BackendCommand::SetBlending { blending, premultiplied_alpha });
    }

    fn set_depth(&mut self, test: bool, write: bool, func: DepthFunc) {
        self.commands.push(BackendCommand::SetDepth { test, write, func });
    }

    fn set_stencil(&mut self, stencil: &StencilState) {
        self.commands.push(BackendCommand::SetStencil(*stencil));
    }

    fn set_cull(&mut self, cull: CullMode, front_face: FrontFace) {
        self.commands.push(BackendCommand::SetCull { cull, front_face });
    }

    fn set_polygon_offset(&mut self, offset: PolygonOffset) {
        self.commands.push(BackendCommand::SetPolygonOffset(offset));
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.commands.push(BackendCommand::SetPolygonMode(mode));
    }

    fn set_color_write(&mut self, enabled: bool) {
        self.commands.push(BackendCommand::SetColorWrite(enabled));
    }

    fn set_uniform(&mut self, name: &str, value: &UniformValue) {
        self.commands.push(BackendCommand::SetUniform { name: name.to_string(), value: value.clone() });
    }

    fn draw(&mut self, call: &DrawCall) -> BackendResult<()> {
        if !self.in_frame {
            return Err(RenderError::RenderingFailed("draw outside of a frame".to_string()));
        }
        if self.current_program.is_none() {
            return Err(RenderError::RenderingFailed("draw without a program".to_string()));
        }
        self.commands.push(BackendCommand::Draw(*call));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(vertex: &str) -> ProgramSources {
        ProgramSources { name: "test".to_string(), vertex: vertex.to_string(), fragment: String::new() }
    }

    #[test]
    fn test_attribute_locations_follow_declarations() {
        let mut backend = HeadlessBackend::new();
        let program = backend
            .compile_program(&sources("in vec3 position;\nin mat4 instanceMatrix;\n  in vec2 uv;\nvoid main() {}"))
            .unwrap();

        assert_eq!(
            backend.attribute_locations(program),
            vec![("position".to_string(), 0), ("instanceMatrix".to_string(), 1), ("uv".to_string(), 5)]
        );
    }

    #[test]
    fn test_compile_latency_and_failure() {
        let mut backend = HeadlessBackend::new();
        backend.compile_latency = 1;
        backend.fail_compile_containing("BROKEN");

        let good = backend.compile_program(&sources("void main() {}")).unwrap();
        let bad = backend.compile_program(&sources("BROKEN")).unwrap();

        assert_eq!(backend.poll_program(good), ProgramStatus::Pending);
        assert_eq!(backend.poll_program(good), ProgramStatus::Ready);
        assert_eq!(backend.poll_program(bad), ProgramStatus::Pending);
        assert!(matches!(backend.poll_program(bad), ProgramStatus::Failed { .. }));
    }

    #[test]
    fn test_frame_bracketing_is_enforced() {
        let mut backend = HeadlessBackend::new();
        assert!(backend.end_frame().is_err());

        backend.begin_frame(Viewport::default()).unwrap();
        assert!(backend.begin_frame(Viewport::default()).is_err());
        backend.end_frame().unwrap();

        backend.fail_next_frame();
        assert!(backend.begin_frame(Viewport::default()).is_err());
        assert!(backend.begin_frame(Viewport::default()).is_ok());
    }
}
