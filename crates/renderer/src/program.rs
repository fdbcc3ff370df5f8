use std::collections::HashMap;

use crate::backend::{ProgramId, RenderBackend, ShaderId, UniformLocation, UniformValue};
use crate::compile::adapt_fragment;
use crate::error::{bound_log, RenderError, ShaderStage};

/// A linked vertex + fragment program with a cached uniform table.
///
/// Construction runs `compile_vertex` → `adapt_and_compile_fragment` →
/// `link`; the first failure ends the sequence and leaves its diagnostic in
/// [`ShaderProgram::log`]. Setters on names the program does not use are
/// silently ignored.
#[derive(Debug, Default)]
pub struct ShaderProgram {
    program: Option<ProgramId>,
    vertex: Option<ShaderId>,
    fragment: Option<ShaderId>,
    uniforms: HashMap<String, UniformLocation>,
    log: String,
}

impl ShaderProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles the vertex stage, adapts and compiles a Shadertoy fragment,
    /// then links both.
    pub fn build<B: RenderBackend>(
        backend: &mut B,
        vertex_source: &str,
        fragment_source: &str,
        common_source: Option<&str>,
    ) -> Result<Self, RenderError> {
        let mut program = Self::new();
        match program.compile_and_link(backend, vertex_source, fragment_source, common_source) {
            Ok(()) => Ok(program),
            Err(err) => {
                program.release(backend);
                Err(err)
            }
        }
    }

    fn compile_and_link<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        vertex_source: &str,
        fragment_source: &str,
        common_source: Option<&str>,
    ) -> Result<(), RenderError> {
        self.compile_vertex(backend, vertex_source)?;
        self.adapt_and_compile_fragment(backend, fragment_source, common_source)?;
        self.link(backend)
    }

    pub fn compile_vertex<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        source: &str,
    ) -> Result<(), RenderError> {
        let shader = self.compile_stage(backend, ShaderStage::Vertex, source)?;
        if let Some(previous) = self.vertex.replace(shader) {
            backend.delete_shader(previous);
        }
        Ok(())
    }

    /// Rewrites a `mainImage` shader into a standalone fragment and compiles it.
    pub fn adapt_and_compile_fragment<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        user_source: &str,
        common_source: Option<&str>,
    ) -> Result<(), RenderError> {
        let adapted = adapt_fragment(user_source, common_source).inspect_err(|err| {
            self.log = err.log().unwrap_or_default().to_string();
        })?;
        let shader = self.compile_stage(backend, ShaderStage::Fragment, &adapted.source)?;
        if let Some(previous) = self.fragment.replace(shader) {
            backend.delete_shader(previous);
        }
        Ok(())
    }

    fn compile_stage<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderId, RenderError> {
        backend.compile_shader(stage, source).map_err(|log| {
            self.log = bound_log(log);
            tracing::error!(%stage, log = %self.log, "shader compilation failed");
            RenderError::compile(stage, self.log.clone())
        })
    }

    /// Links the compiled stages and caches every active uniform location.
    ///
    /// Array uniforms are stored without their `[0]` suffix so `foo` and
    /// `foo[0]` name the same entry. Stage objects are released either way.
    pub fn link<B: RenderBackend>(&mut self, backend: &mut B) -> Result<(), RenderError> {
        let (Some(vertex), Some(fragment)) = (self.vertex, self.fragment) else {
            self.log = "both shader stages must compile before linking".to_string();
            return Err(RenderError::link(self.log.clone()));
        };

        let linked = backend.link_program(vertex, fragment);
        self.release_stages(backend);
        let program = linked.map_err(|log| {
            self.log = bound_log(log);
            tracing::error!(log = %self.log, "shader program link failed");
            RenderError::link(self.log.clone())
        })?;

        self.uniforms = backend
            .active_uniforms(program)
            .into_iter()
            .map(|(name, location)| (normalize_uniform_name(&name).to_string(), location))
            .collect();
        tracing::debug!(uniforms = self.uniforms.len(), "linked shader program");
        self.program = Some(program);
        Ok(())
    }

    pub fn use_program<B: RenderBackend>(&self, backend: &mut B) {
        if let Some(program) = self.program {
            backend.use_program(program);
        }
    }

    pub fn id(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn is_linked(&self) -> bool {
        self.program.is_some()
    }

    /// Last compile or link diagnostic.
    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    pub fn set_int<B: RenderBackend>(&self, backend: &mut B, name: &str, value: i32) {
        self.set(backend, name, UniformValue::Int(value));
    }

    pub fn set_float<B: RenderBackend>(&self, backend: &mut B, name: &str, value: f32) {
        self.set(backend, name, UniformValue::Float(value));
    }

    pub fn set_vec2<B: RenderBackend>(&self, backend: &mut B, name: &str, value: [f32; 2]) {
        self.set(backend, name, UniformValue::Vec2(value));
    }

    pub fn set_vec3<B: RenderBackend>(&self, backend: &mut B, name: &str, value: [f32; 3]) {
        self.set(backend, name, UniformValue::Vec3(value));
    }

    pub fn set_vec4<B: RenderBackend>(&self, backend: &mut B, name: &str, value: [f32; 4]) {
        self.set(backend, name, UniformValue::Vec4(value));
    }

    pub fn set_vec3_array<B: RenderBackend>(&self, backend: &mut B, name: &str, values: &[[f32; 3]]) {
        self.set(backend, name, UniformValue::Vec3Array(values));
    }

    fn set<B: RenderBackend>(&self, backend: &mut B, name: &str, value: UniformValue<'_>) {
        let (Some(program), Some(location)) = (self.program, self.uniform_location(name)) else {
            return;
        };
        backend.program_uniform(program, location, value);
    }

    fn release_stages<B: RenderBackend>(&mut self, backend: &mut B) {
        if let Some(vertex) = self.vertex.take() {
            backend.delete_shader(vertex);
        }
        if let Some(fragment) = self.fragment.take() {
            backend.delete_shader(fragment);
        }
    }

    /// Frees the program and any stage objects still held; safe to repeat.
    pub fn release<B: RenderBackend>(&mut self, backend: &mut B) {
        self.release_stages(backend);
        if let Some(program) = self.program.take() {
            backend.delete_program(program);
        }
        self.uniforms.clear();
    }
}

fn normalize_uniform_name(name: &str) -> &str {
    name.strip_suffix("[0]").unwrap_or(name)
}
