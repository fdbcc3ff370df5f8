//! GPU object model the render graph is written against.
//!
//! The graph speaks in terms of textures, framebuffers, programs, uniform
//! locations and texture units. `gpu::WgpuBackend` maps those onto `wgpu`
//! resources; tests drive the same code through a recording backend.

#[cfg(test)]
pub(crate) mod recording;

use crate::channels::ImageData;
use crate::error::{RenderError, ShaderStage};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// Sampleable 2D texture.
    TextureId
);
handle!(
    /// Off-screen render target with a single color attachment.
    FramebufferId
);
handle!(
    /// Compiled, not yet linked, shader stage.
    ShaderId
);
handle!(
    /// Linked vertex + fragment program.
    ProgramId
);
handle!(
    /// Vertex and index buffers for indexed drawing.
    GeometryId
);
handle!(
    /// Per-program uniform slot returned by [`RenderBackend::active_uniforms`].
    UniformLocation
);

/// Value pushed to a program uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue<'a> {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Vec3Array(&'a [[f32; 3]]),
}

/// Completeness of a framebuffer, checked before a pass is allowed to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    MissingAttachment,
    /// The attached texture was deleted or never existed.
    InvalidAttachment,
    UnknownFramebuffer,
}

impl FramebufferStatus {
    pub fn describe(self) -> &'static str {
        match self {
            FramebufferStatus::Complete => "complete",
            FramebufferStatus::MissingAttachment => "no color attachment",
            FramebufferStatus::InvalidAttachment => "color attachment is not a live texture",
            FramebufferStatus::UnknownFramebuffer => "unknown framebuffer",
        }
    }
}

/// Minimal GL-shaped device interface.
///
/// Calls are issued from the single thread that owns the backend and take
/// effect in call order. Deleting an unknown handle is a no-op.
pub trait RenderBackend {
    /// Allocates an uninitialised high-precision render target.
    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId, RenderError>;
    /// Uploads RGBA8 pixels as a static, sampleable texture.
    fn upload_texture(&mut self, image: &ImageData) -> Result<TextureId, RenderError>;
    fn delete_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self) -> FramebufferId;
    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId);
    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;
    /// Selects the draw target; `None` is the on-screen surface.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<(), RenderError>;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Clears the bound target to `color`.
    fn clear(&mut self, color: [f32; 4]);
    fn copy_texture(&mut self, source: TextureId, destination: TextureId, width: u32, height: u32);

    /// Compiles one stage; on failure returns the driver diagnostic.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String>;
    fn delete_shader(&mut self, shader: ShaderId);
    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId, String>;
    /// Uniforms the linked program actually uses, as `(name, location)`.
    ///
    /// Array uniforms are reported the way GL does, e.g. `iChannelResolution[0]`.
    fn active_uniforms(&self, program: ProgramId) -> Vec<(String, UniformLocation)>;
    fn delete_program(&mut self, program: ProgramId);
    /// Sets a uniform on `program` without making it current.
    fn program_uniform(
        &mut self,
        program: ProgramId,
        location: UniformLocation,
        value: UniformValue<'_>,
    );
    fn use_program(&mut self, program: ProgramId);

    fn bind_texture_unit(&mut self, unit: u32, texture: Option<TextureId>);

    fn create_quad(&mut self, vertices: &[f32], indices: &[u32]) -> Result<GeometryId, RenderError>;
    fn bind_geometry(&mut self, geometry: GeometryId);
    fn delete_geometry(&mut self, geometry: GeometryId);
    fn draw_indexed(&mut self, index_count: u32);

    /// Submits the frame's work and shows the on-screen target.
    fn present(&mut self) -> Result<(), RenderError>;
    /// Drops work recorded since the last present without submitting it.
    fn discard_frame(&mut self);
}
