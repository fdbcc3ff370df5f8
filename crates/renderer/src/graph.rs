use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::backend::{GeometryId, RenderBackend, TextureId};
use crate::channels::{load_image, resolve_channels, ChannelTarget};
use crate::compile::{DEFAULT_FRAGMENT_SHADER, VERTEX_SHADER_GLSL};
use crate::error::RenderError;
use crate::pass::{RenderPass, CLEAR_COLOR};
use crate::program::ShaderProgram;
use crate::types::{GraphConfig, PassSlot, CHANNEL_COUNT, MAIN_CHANNEL_START, PASS_COUNT};
use crate::uniforms::{FrameClock, FrameUniforms};

/// Full-screen quad as two triangles.
pub const QUAD_VERTICES: [f32; 12] = [
    -1.0, -1.0, 0.0, //
    1.0, 1.0, 0.0, //
    -1.0, 1.0, 0.0, //
    1.0, -1.0, 0.0,
];
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 3, 1];

/// Channel inputs resolved to live textures for one consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChannels {
    pub targets: [ChannelTarget; CHANNEL_COUNT],
    pub textures: [Option<TextureId>; CHANNEL_COUNT],
    pub resolutions: [[f32; 3]; CHANNEL_COUNT],
}

/// The main program plus up to four off-screen passes.
///
/// Passes always run in slot order A, B, C, D regardless of how their
/// channels reference each other; a pass reading a later slot sees that
/// slot's previous frame.
#[derive(Debug)]
pub struct RenderGraph {
    main: ShaderProgram,
    passes: [Option<RenderPass>; PASS_COUNT],
    outputs: [Option<TextureId>; PASS_COUNT],
    images: HashMap<PathBuf, (TextureId, [f32; 3])>,
    quad: Option<GeometryId>,
    main_channels: Option<ResolvedChannels>,
    pass_channels: [Option<ResolvedChannels>; PASS_COUNT],
    width: u32,
    height: u32,
    clock: FrameClock,
}

impl RenderGraph {
    fn empty(width: u32, height: u32) -> Self {
        Self {
            main: ShaderProgram::new(),
            passes: Default::default(),
            outputs: [None; PASS_COUNT],
            images: HashMap::new(),
            quad: None,
            main_channels: None,
            pass_channels: Default::default(),
            width,
            height,
            clock: FrameClock::new(Instant::now()),
        }
    }

    /// Compiles every configured program, allocates pass targets and wires
    /// channel bindings.
    ///
    /// The first failure aborts the sequence; anything allocated up to that
    /// point is released before the error is returned.
    pub fn initialize<B: RenderBackend>(
        backend: &mut B,
        width: u32,
        height: u32,
        config: &GraphConfig,
    ) -> Result<Self, RenderError> {
        let mut graph = Self::empty(width.max(1), height.max(1));
        match graph.build(backend, config) {
            Ok(()) => {
                graph.clock = FrameClock::new(Instant::now());
                tracing::info!(
                    width = graph.width,
                    height = graph.height,
                    passes = graph.active_passes().count(),
                    "render graph initialised"
                );
                Ok(graph)
            }
            Err(err) => {
                tracing::error!(error = %err, "render graph initialisation failed");
                graph.shutdown(backend);
                Err(err)
            }
        }
    }

    fn build<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        config: &GraphConfig,
    ) -> Result<(), RenderError> {
        self.quad = Some(backend.create_quad(&QUAD_VERTICES, &QUAD_INDICES)?);

        let common = config
            .common_path
            .as_deref()
            .map(read_source)
            .transpose()?;

        // Outputs first, so any pass can reference any configured slot.
        for slot in PassSlot::ALL {
            if config.buffer(slot).shader_path.is_some() {
                self.outputs[slot.index()] = Some(backend.create_texture(self.width, self.height)?);
            }
        }

        for slot in PassSlot::ALL {
            let pass_config = config.buffer(slot);
            let (Some(path), Some(output)) =
                (pass_config.shader_path.as_deref(), self.outputs[slot.index()])
            else {
                continue;
            };
            let source = read_source(path)?;
            let program =
                ShaderProgram::build(backend, VERTEX_SHADER_GLSL, &source, common.as_deref())
                    .map_err(|err| with_context(err, &slot.to_string()))?;
            // Owned by the graph before channels resolve, so shutdown sees it
            // if an image fails to load.
            self.passes[slot.index()] = Some(RenderPass::initialize(
                backend,
                slot,
                output,
                self.width,
                self.height,
                slot.channel_start(),
                program,
            )?);
            let resolved = self.resolve(backend, &pass_config.channels)?;
            if let Some(pass) = self.passes[slot.index()].as_mut() {
                pass.bind_channels(backend, resolved.textures, resolved.resolutions);
            }
            self.pass_channels[slot.index()] = Some(resolved);
        }

        let main_source = match config.main.shader_path.as_deref() {
            Some(path) => read_source(path)?,
            None => {
                tracing::info!("no main shader configured; using built-in default");
                DEFAULT_FRAGMENT_SHADER.to_string()
            }
        };
        self.main =
            ShaderProgram::build(backend, VERTEX_SHADER_GLSL, &main_source, common.as_deref())
                .map_err(|err| with_context(err, "main"))?;
        let resolved = self.resolve(backend, &config.main.channels)?;

        self.main.set_vec3(
            backend,
            "iResolution",
            [self.width as f32, self.height as f32, 0.0],
        );
        self.main
            .set_vec3_array(backend, "iChannelResolution", &resolved.resolutions);
        for channel in 0..CHANNEL_COUNT {
            self.main.set_int(
                backend,
                &format!("iChannel{channel}"),
                (MAIN_CHANNEL_START + channel as u32) as i32,
            );
        }
        self.main_channels = Some(resolved);
        Ok(())
    }

    /// Maps binding strings onto textures and `iChannelResolution` entries.
    fn resolve<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        bindings: &[String; CHANNEL_COUNT],
    ) -> Result<ResolvedChannels, RenderError> {
        let targets = resolve_channels(bindings);
        let mut textures = [None; CHANNEL_COUNT];
        let mut resolutions = [[0.0; 3]; CHANNEL_COUNT];
        let viewport = [self.width as f32, self.height as f32, 0.0];

        for (index, target) in targets.iter().enumerate() {
            match target {
                ChannelTarget::Pass(slot) => {
                    textures[index] = self.outputs[slot.index()];
                    resolutions[index] = viewport;
                }
                ChannelTarget::Image(path) => {
                    let (texture, resolution) = self.image(backend, path)?;
                    textures[index] = Some(texture);
                    resolutions[index] = resolution;
                }
                ChannelTarget::Unbound => {}
            }
        }

        Ok(ResolvedChannels {
            targets,
            textures,
            resolutions,
        })
    }

    fn image<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        path: &Path,
    ) -> Result<(TextureId, [f32; 3]), RenderError> {
        if let Some(loaded) = self.images.get(path) {
            return Ok(*loaded);
        }
        let image = load_image(path)?;
        let texture = backend.upload_texture(&image)?;
        let loaded = (texture, image.resolution());
        self.images.insert(path.to_path_buf(), loaded);
        Ok(loaded)
    }

    /// Renders one frame: passes A-D into their targets, then the main
    /// program onto the surface, then presents.
    pub fn render_frame<B: RenderBackend>(
        &mut self,
        backend: &mut B,
    ) -> Result<FrameUniforms, RenderError> {
        let uniforms = self.clock.tick(Instant::now());
        if let Err(err) = self.render_with(backend, &uniforms) {
            backend.discard_frame();
            return Err(err);
        }
        Ok(uniforms)
    }

    pub(crate) fn render_with<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        uniforms: &FrameUniforms,
    ) -> Result<(), RenderError> {
        let quad = self
            .quad
            .ok_or_else(|| RenderError::Resource("render graph is not initialised".into()))?;
        let index_count = QUAD_INDICES.len() as u32;

        backend.bind_geometry(quad);
        for pass in self.passes.iter_mut().flatten() {
            pass.render(backend, uniforms)?;
            backend.draw_indexed(index_count);
        }

        backend.bind_framebuffer(None)?;
        backend.clear(CLEAR_COLOR);
        if let Some(channels) = &self.main_channels {
            for (offset, texture) in channels.textures.iter().enumerate() {
                backend.bind_texture_unit(MAIN_CHANNEL_START + offset as u32, *texture);
            }
        }

        let main = &self.main;
        main.set_float(backend, "iTime", uniforms.time);
        main.set_float(backend, "iTimeDelta", uniforms.time_delta);
        main.set_float(backend, "iFrameRate", uniforms.frame_rate);
        main.set_int(backend, "iFrame", uniforms.frame);
        main.set_vec4(backend, "iDate", uniforms.date);
        main.use_program(backend);

        backend.bind_geometry(quad);
        backend.draw_indexed(index_count);
        backend.present()
    }

    /// Releases passes, pass outputs and images, then the main program and
    /// the quad, in reverse order of acquisition.
    ///
    /// Safe after a partial initialisation and safe to call twice.
    pub fn shutdown<B: RenderBackend>(&mut self, backend: &mut B) {
        for pass in self.passes.iter_mut().rev() {
            if let Some(mut pass) = pass.take() {
                pass.release(backend);
            }
        }
        for (_, (texture, _)) in self.images.drain() {
            backend.delete_texture(texture);
        }
        for output in self.outputs.iter_mut().rev() {
            if let Some(texture) = output.take() {
                backend.delete_texture(texture);
            }
        }
        self.main.release(backend);
        if let Some(quad) = self.quad.take() {
            backend.delete_geometry(quad);
        }
        self.main_channels = None;
        self.pass_channels = Default::default();
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frame_count(&self) -> u32 {
        self.clock.frame_count()
    }

    pub fn pass(&self, slot: PassSlot) -> Option<&RenderPass> {
        self.passes[slot.index()].as_ref()
    }

    pub fn active_passes(&self) -> impl Iterator<Item = &RenderPass> {
        self.passes.iter().flatten()
    }

    pub fn main_program(&self) -> &ShaderProgram {
        &self.main
    }

    pub fn main_channels(&self) -> Option<&ResolvedChannels> {
        self.main_channels.as_ref()
    }

    pub fn pass_channels(&self, slot: PassSlot) -> Option<&ResolvedChannels> {
        self.pass_channels[slot.index()].as_ref()
    }
}

fn read_source(path: &Path) -> Result<String, RenderError> {
    std::fs::read_to_string(path).map_err(|err| {
        RenderError::Resource(format!("could not read shader {}: {err}", path.display()))
    })
}

fn with_context(err: RenderError, owner: &str) -> RenderError {
    tracing::error!(program = owner, error = %err, "failed to build shader program");
    err
}
