//! In-memory backend that records every state-changing call.

use std::collections::{HashMap, HashSet};

use super::{
    FramebufferId, FramebufferStatus, GeometryId, ProgramId, RenderBackend, ShaderId, TextureId,
    UniformLocation, UniformValue,
};
use crate::channels::ImageData;
use crate::error::{RenderError, ShaderStage};
use crate::types::CHANNEL_COUNT;

/// Uniform names as a GL driver would report them, in declaration order.
const REPORTED_UNIFORMS: [(&str, &str); 13] = [
    ("iResolution", "iResolution"),
    ("iTime", "iTime"),
    ("iTimeDelta", "iTimeDelta"),
    ("iFrameRate", "iFrameRate"),
    ("iFrame", "iFrame"),
    ("iChannelTime", "iChannelTime[0]"),
    ("iChannelResolution", "iChannelResolution[0]"),
    ("iDate", "iDate"),
    ("iMouse", "iMouse"),
    ("iChannel0", "iChannel0"),
    ("iChannel1", "iChannel1"),
    ("iChannel2", "iChannel2"),
    ("iChannel3", "iChannel3"),
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RecordedValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Vec3Array(Vec<[f32; 3]>),
}

impl From<UniformValue<'_>> for RecordedValue {
    fn from(value: UniformValue<'_>) -> Self {
        match value {
            UniformValue::Int(v) => RecordedValue::Int(v),
            UniformValue::Float(v) => RecordedValue::Float(v),
            UniformValue::Vec2(v) => RecordedValue::Vec2(v),
            UniformValue::Vec3(v) => RecordedValue::Vec3(v),
            UniformValue::Vec4(v) => RecordedValue::Vec4(v),
            UniformValue::Vec3Array(v) => RecordedValue::Vec3Array(v.to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DrawRecord {
    pub program: ProgramId,
    pub framebuffer: Option<FramebufferId>,
    /// Texture attached to the bound framebuffer; `None` for the surface.
    pub target: Option<TextureId>,
    /// Texture sampled by `iChannel0..3`, resolved through the texture units.
    pub channels: [Option<TextureId>; CHANNEL_COUNT],
    pub index_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    BindFramebuffer(Option<FramebufferId>),
    AttachColor {
        framebuffer: FramebufferId,
        texture: TextureId,
    },
    Clear {
        framebuffer: Option<FramebufferId>,
    },
    Copy {
        source: TextureId,
        destination: TextureId,
    },
    Uniform {
        program: ProgramId,
        name: String,
        value: RecordedValue,
    },
    UseProgram(ProgramId),
    BindUnit {
        unit: u32,
        texture: Option<TextureId>,
    },
    Draw(DrawRecord),
    Present,
    DeleteTexture(TextureId),
    DeleteFramebuffer(FramebufferId),
    DeleteProgram(ProgramId),
    DeleteGeometry(GeometryId),
    DiscardFrame,
}

#[derive(Debug, Default)]
struct ProgramRecord {
    names: Vec<String>,
    values: HashMap<String, RecordedValue>,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingBackend {
    next_id: u32,
    textures: HashMap<TextureId, (u32, u32)>,
    framebuffers: HashMap<FramebufferId, Option<TextureId>>,
    shaders: HashMap<ShaderId, (ShaderStage, String)>,
    programs: HashMap<ProgramId, ProgramRecord>,
    geometry: HashSet<GeometryId>,
    units: HashMap<u32, Option<TextureId>>,
    bound_framebuffer: Option<FramebufferId>,
    current_program: Option<ProgramId>,
    calls: Vec<Call>,
    fail_fragment: Option<String>,
    broken_framebuffers: bool,
    surface_lost: bool,
}

impl RecordingBackend {
    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn draws(&self) -> Vec<&DrawRecord> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Draw(draw) => Some(draw),
                _ => None,
            })
            .collect()
    }

    /// Makes the next fragment compile fail with `log`.
    pub fn fail_fragment_with(&mut self, log: impl Into<String>) {
        self.fail_fragment = Some(log.into());
    }

    /// Makes every framebuffer report itself incomplete.
    pub fn break_framebuffers(&mut self) {
        self.broken_framebuffers = true;
    }

    /// Makes binding the on-screen target fail like an unavailable surface.
    pub fn lose_surface(&mut self) {
        self.surface_lost = true;
    }

    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<RecordedValue> {
        self.programs.get(&program)?.values.get(name).cloned()
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).copied()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_geometry(&self) -> usize {
        self.geometry.len()
    }

    fn sampled_channels(&self, program: ProgramId) -> [Option<TextureId>; CHANNEL_COUNT] {
        std::array::from_fn(|channel| {
            let unit = match self.uniform_value(program, &format!("iChannel{channel}")) {
                Some(RecordedValue::Int(unit)) => unit as u32,
                _ => return None,
            };
            self.units.get(&unit).copied().flatten()
        })
    }
}

impl RenderBackend for RecordingBackend {
    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId, RenderError> {
        let texture = TextureId(self.next());
        self.textures.insert(texture, (width, height));
        Ok(texture)
    }

    fn upload_texture(&mut self, image: &ImageData) -> Result<TextureId, RenderError> {
        self.create_texture(image.width, image.height)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.calls.push(Call::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        let framebuffer = FramebufferId(self.next());
        self.framebuffers.insert(framebuffer, None);
        framebuffer
    }

    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId) {
        if let Some(slot) = self.framebuffers.get_mut(&framebuffer) {
            *slot = Some(texture);
        }
        self.calls.push(Call::AttachColor {
            framebuffer,
            texture,
        });
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        match self.framebuffers.get(&framebuffer) {
            None => FramebufferStatus::UnknownFramebuffer,
            Some(_) if self.broken_framebuffers => FramebufferStatus::MissingAttachment,
            Some(None) => FramebufferStatus::MissingAttachment,
            Some(Some(texture)) if !self.textures.contains_key(texture) => {
                FramebufferStatus::InvalidAttachment
            }
            Some(Some(_)) => FramebufferStatus::Complete,
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<(), RenderError> {
        if framebuffer.is_none() && self.surface_lost {
            return Err(RenderError::Context("surface unavailable".into()));
        }
        self.bound_framebuffer = framebuffer;
        self.calls.push(Call::BindFramebuffer(framebuffer));
        Ok(())
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
        self.calls.push(Call::DeleteFramebuffer(framebuffer));
    }

    fn clear(&mut self, _color: [f32; 4]) {
        self.calls.push(Call::Clear {
            framebuffer: self.bound_framebuffer,
        });
    }

    fn copy_texture(&mut self, source: TextureId, destination: TextureId, _width: u32, _height: u32) {
        self.calls.push(Call::Copy {
            source,
            destination,
        });
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        if stage == ShaderStage::Fragment {
            if let Some(log) = self.fail_fragment.take() {
                return Err(log);
            }
        }
        let shader = ShaderId(self.next());
        self.shaders.insert(shader, (stage, source.to_string()));
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId, String> {
        let (Some((ShaderStage::Vertex, _)), Some((ShaderStage::Fragment, source))) =
            (self.shaders.get(&vertex), self.shaders.get(&fragment))
        else {
            return Err("program requires one vertex and one fragment shader".to_string());
        };
        // Only what the author's code (common + user) touches counts as active.
        let body = source
            .split_once("#line 1\n")
            .map(|(_, body)| body)
            .unwrap_or_default();
        let names = REPORTED_UNIFORMS
            .iter()
            .filter(|(needle, _)| body.contains(needle))
            .map(|(_, reported)| reported.to_string())
            .collect();
        let program = ProgramId(self.next());
        self.programs.insert(
            program,
            ProgramRecord {
                names,
                values: HashMap::new(),
            },
        );
        Ok(program)
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<(String, UniformLocation)> {
        self.programs
            .get(&program)
            .map(|record| {
                record
                    .names
                    .iter()
                    .enumerate()
                    .map(|(index, name)| (name.clone(), UniformLocation(index as u32)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.calls.push(Call::DeleteProgram(program));
    }

    fn program_uniform(
        &mut self,
        program: ProgramId,
        location: UniformLocation,
        value: UniformValue<'_>,
    ) {
        let Some(record) = self.programs.get_mut(&program) else {
            return;
        };
        let Some(reported) = record.names.get(location.0 as usize) else {
            return;
        };
        let name = reported.strip_suffix("[0]").unwrap_or(reported).to_string();
        let value = RecordedValue::from(value);
        record.values.insert(name.clone(), value.clone());
        self.calls.push(Call::Uniform {
            program,
            name,
            value,
        });
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current_program = Some(program);
        self.calls.push(Call::UseProgram(program));
    }

    fn bind_texture_unit(&mut self, unit: u32, texture: Option<TextureId>) {
        self.units.insert(unit, texture);
        self.calls.push(Call::BindUnit { unit, texture });
    }

    fn create_quad(&mut self, _vertices: &[f32], _indices: &[u32]) -> Result<GeometryId, RenderError> {
        let geometry = GeometryId(self.next());
        self.geometry.insert(geometry);
        Ok(geometry)
    }

    fn bind_geometry(&mut self, _geometry: GeometryId) {}

    fn delete_geometry(&mut self, geometry: GeometryId) {
        self.geometry.remove(&geometry);
        self.calls.push(Call::DeleteGeometry(geometry));
    }

    fn draw_indexed(&mut self, index_count: u32) {
        let Some(program) = self.current_program else {
            return;
        };
        let framebuffer = self.bound_framebuffer;
        let target = framebuffer.and_then(|fb| self.framebuffers.get(&fb).copied().flatten());
        let channels = self.sampled_channels(program);
        self.calls.push(Call::Draw(DrawRecord {
            program,
            framebuffer,
            target,
            channels,
            index_count,
        }));
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.calls.push(Call::Present);
        Ok(())
    }

    fn discard_frame(&mut self) {
        self.calls.push(Call::DiscardFrame);
    }
}
