use crate::backend::{FramebufferId, FramebufferStatus, RenderBackend, TextureId};
use crate::error::RenderError;
use crate::program::ShaderProgram;
use crate::types::{PassSlot, CHANNEL_COUNT};
use crate::uniforms::FrameUniforms;

/// Clear colour for pass targets and the surface.
pub(crate) const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// One of the two textures a pass alternates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Current,
    Copy,
}

/// What a single frame does with the pair of textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPongStep {
    /// Texture rendered into this frame.
    pub target: Face,
    /// Texture written last frame, copied out as the pass output.
    pub previous: Face,
}

/// Which texture of the pair holds the most recent completed frame.
///
/// The machine starts as if `Copy` was written, so the first frame renders
/// into `Current`. Every [`PingPong::advance`] flips the state; a frame never
/// exposes the texture it is rendering into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PingPong {
    WroteToCurrent,
    #[default]
    WroteToCopy,
}

impl PingPong {
    pub fn advance(&mut self) -> PingPongStep {
        match *self {
            PingPong::WroteToCopy => {
                *self = PingPong::WroteToCurrent;
                PingPongStep {
                    target: Face::Current,
                    previous: Face::Copy,
                }
            }
            PingPong::WroteToCurrent => {
                *self = PingPong::WroteToCopy;
                PingPongStep {
                    target: Face::Copy,
                    previous: Face::Current,
                }
            }
        }
    }

    pub fn last_written(self) -> Face {
        match self {
            PingPong::WroteToCurrent => Face::Current,
            PingPong::WroteToCopy => Face::Copy,
        }
    }
}

/// An off-screen pass: one program rendering into a ping-pong texture pair.
///
/// The exposed `output` texture belongs to the graph; every frame the pass
/// copies its previous result there before drawing, so consumers (including
/// the pass itself) always sample a finished frame.
#[derive(Debug)]
pub struct RenderPass {
    slot: PassSlot,
    output: TextureId,
    current: TextureId,
    copy: TextureId,
    framebuffer: FramebufferId,
    program: ShaderProgram,
    channel_start: u32,
    channels: [Option<TextureId>; CHANNEL_COUNT],
    channel_resolutions: [[f32; 3]; CHANNEL_COUNT],
    state: PingPong,
    width: u32,
    height: u32,
}

impl RenderPass {
    /// Allocates the texture pair and framebuffer and takes ownership of
    /// `program`.
    ///
    /// Resolution and channel sampler units are pushed once here rather than
    /// every frame. On failure everything allocated so far, `program`
    /// included, is released.
    pub fn initialize<B: RenderBackend>(
        backend: &mut B,
        slot: PassSlot,
        output: TextureId,
        width: u32,
        height: u32,
        channel_start: u32,
        mut program: ShaderProgram,
    ) -> Result<Self, RenderError> {
        let current = match backend.create_texture(width, height) {
            Ok(texture) => texture,
            Err(err) => {
                program.release(backend);
                return Err(err);
            }
        };
        let copy = match backend.create_texture(width, height) {
            Ok(texture) => texture,
            Err(err) => {
                backend.delete_texture(current);
                program.release(backend);
                return Err(err);
            }
        };
        let framebuffer = backend.create_framebuffer();
        backend.attach_color(framebuffer, current);

        let status = backend.framebuffer_status(framebuffer);
        if status != FramebufferStatus::Complete {
            backend.delete_framebuffer(framebuffer);
            backend.delete_texture(current);
            backend.delete_texture(copy);
            program.release(backend);
            return Err(RenderError::Resource(format!(
                "{slot} framebuffer was not complete on initialization: {}",
                status.describe()
            )));
        }

        program.set_vec3(backend, "iResolution", [width as f32, height as f32, 0.0]);
        for channel in 0..CHANNEL_COUNT {
            program.set_int(
                backend,
                &format!("iChannel{channel}"),
                (channel_start + channel as u32) as i32,
            );
        }

        tracing::debug!(%slot, width, height, channel_start, "initialised render pass");
        Ok(Self {
            slot,
            output,
            current,
            copy,
            framebuffer,
            program,
            channel_start,
            channels: [None; CHANNEL_COUNT],
            channel_resolutions: [[0.0; 3]; CHANNEL_COUNT],
            state: PingPong::default(),
            width,
            height,
        })
    }

    /// Records the resolved inputs and pushes `iChannelResolution` once.
    pub fn bind_channels<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        channels: [Option<TextureId>; CHANNEL_COUNT],
        resolutions: [[f32; 3]; CHANNEL_COUNT],
    ) {
        self.channels = channels;
        self.channel_resolutions = resolutions;
        self.program
            .set_vec3_array(backend, "iChannelResolution", &self.channel_resolutions);
    }

    /// Prepares this frame's draw: retargets the framebuffer, clears it,
    /// publishes the previous frame, pushes uniforms and binds inputs.
    ///
    /// The caller binds geometry and issues the draw.
    pub fn render<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        uniforms: &FrameUniforms,
    ) -> Result<PingPongStep, RenderError> {
        let step = self.state.advance();
        let target = self.texture(step.target);
        let previous = self.texture(step.previous);

        backend.bind_framebuffer(Some(self.framebuffer))?;
        backend.attach_color(self.framebuffer, target);
        backend.clear(CLEAR_COLOR);
        backend.copy_texture(previous, self.output, self.width, self.height);

        let program = &self.program;
        program.set_float(backend, "iTime", uniforms.time);
        program.set_float(backend, "iTimeDelta", uniforms.time_delta);
        program.set_float(backend, "iFrameRate", uniforms.frame_rate);
        program.set_int(backend, "iFrame", uniforms.frame);
        program.set_vec4(backend, "iDate", uniforms.date);
        program.use_program(backend);

        for (offset, texture) in self.channels.iter().enumerate() {
            backend.bind_texture_unit(self.channel_start + offset as u32, *texture);
        }
        Ok(step)
    }

    pub fn slot(&self) -> PassSlot {
        self.slot
    }

    /// Graph-owned texture downstream consumers sample.
    pub fn output(&self) -> TextureId {
        self.output
    }

    pub fn state(&self) -> PingPong {
        self.state
    }

    pub fn texture(&self, face: Face) -> TextureId {
        match face {
            Face::Current => self.current,
            Face::Copy => self.copy,
        }
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    pub fn channel_start(&self) -> u32 {
        self.channel_start
    }

    /// Releases the framebuffer, both textures and the program.
    pub fn release<B: RenderBackend>(&mut self, backend: &mut B) {
        backend.delete_framebuffer(self.framebuffer);
        backend.delete_texture(self.current);
        backend.delete_texture(self.copy);
        self.program.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{Call, RecordingBackend};
    use crate::compile::VERTEX_SHADER_GLSL;

    const FEEDBACK: &str = "void mainImage(out vec4 c, in vec2 p) {\n    c = texture(iChannel0, p / iResolution.xy) + vec4(iTimeDelta);\n}\n";

    fn uniforms(frame: i32) -> FrameUniforms {
        FrameUniforms {
            time: frame as f32 * 0.016,
            time_delta: 0.016,
            frame_rate: 60.0,
            frame,
            date: [2024.0, 1.0, 1.0, 0.0],
        }
    }

    fn pass(backend: &mut RecordingBackend) -> RenderPass {
        let output = backend.create_texture(64, 32).expect("output");
        let program =
            ShaderProgram::build(backend, VERTEX_SHADER_GLSL, FEEDBACK, None).expect("program");
        RenderPass::initialize(backend, PassSlot::A, output, 64, 32, 4, program).expect("pass")
    }

    #[test]
    fn ping_pong_strictly_alternates() {
        let mut state = PingPong::default();
        let mut last_target = None;
        for _ in 0..8 {
            let step = state.advance();
            assert_ne!(step.target, step.previous);
            assert_eq!(state.last_written(), step.target);
            if let Some(last) = last_target {
                assert_ne!(last, step.target);
                assert_eq!(last, step.previous);
            }
            last_target = Some(step.target);
        }
    }

    #[test]
    fn first_frame_renders_into_current() {
        let mut state = PingPong::default();
        assert_eq!(
            state.advance(),
            PingPongStep {
                target: Face::Current,
                previous: Face::Copy
            }
        );
    }

    #[test]
    fn exposed_texture_is_never_the_render_target() {
        let mut backend = RecordingBackend::default();
        let mut pass = pass(&mut backend);
        for frame in 0..6 {
            backend.clear_calls();
            let step = pass.render(&mut backend, &uniforms(frame)).expect("render");
            let target = pass.texture(step.target);
            let copied_from = backend
                .calls()
                .iter()
                .find_map(|call| match call {
                    Call::Copy {
                        source,
                        destination,
                    } if *destination == pass.output() => Some(*source),
                    _ => None,
                })
                .expect("output refreshed");
            assert_ne!(copied_from, target);
            assert_eq!(copied_from, pass.texture(step.previous));
            assert!(backend.calls().contains(&Call::AttachColor {
                framebuffer: pass.framebuffer,
                texture: target,
            }));
        }
    }

    #[test]
    fn initialize_presets_resolution_and_units() {
        let mut backend = RecordingBackend::default();
        let pass = pass(&mut backend);
        let program = pass.program().id().expect("linked");
        assert_eq!(
            backend.uniform_value(program, "iResolution"),
            Some(crate::backend::recording::RecordedValue::Vec3([64.0, 32.0, 0.0]))
        );
        assert_eq!(
            backend.uniform_value(program, "iChannel0"),
            Some(crate::backend::recording::RecordedValue::Int(4))
        );
    }

    #[test]
    fn incomplete_framebuffer_fails_and_releases() {
        let mut backend = RecordingBackend::default();
        let output = backend.create_texture(8, 8).expect("output");
        let program =
            ShaderProgram::build(&mut backend, VERTEX_SHADER_GLSL, FEEDBACK, None).expect("program");
        backend.break_framebuffers();
        let err = RenderPass::initialize(&mut backend, PassSlot::B, output, 8, 8, 8, program)
            .unwrap_err();
        assert!(matches!(err, RenderError::Resource(message) if message.contains("not complete")));
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(backend.live_framebuffers(), 0);
        assert_eq!(backend.live_textures(), 1);
    }
}
