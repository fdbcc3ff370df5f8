use std::borrow::Cow;
use std::collections::HashMap;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::util::{DeviceExt, TextureDataOrder};
use winit::dpi::PhysicalSize;

use crate::backend::{
    FramebufferId, FramebufferStatus, GeometryId, ProgramId, RenderBackend, ShaderId, TextureId,
    UniformLocation, UniformValue,
};
use crate::channels::ImageData;
use crate::compile::ORIENTATION_UNIFORM;
use crate::error::{RenderError, ShaderStage};
use crate::types::CHANNEL_COUNT;

use super::context::GpuContext;
use super::reflect::{self, Reflection, UniformBinding, UniformKind};

/// Format of pass targets and the textures they publish.
const PASS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// `vec3 a_position` per vertex.
const VERTEX_STRIDE: wgpu::BufferAddress = 12;

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    renderable: bool,
}

struct CompiledShader {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
    reflection: Reflection,
}

struct GpuProgram {
    reflection: Reflection,
    /// CPU copy of the uniform block, staged into `uniform_buffer` per draw.
    shadow: Vec<u8>,
    flip_offset: Option<usize>,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sampler_units: [Option<u32>; CHANNEL_COUNT],
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

struct Quad {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Surface,
    Framebuffer(FramebufferId),
}

struct SurfaceFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// [`RenderBackend`] on top of `wgpu`.
///
/// Commands for a frame are recorded into a single encoder and submitted by
/// [`RenderBackend::present`]. Uniform writes land in a per-program shadow
/// buffer; each draw stages that buffer through the encoder so a program's
/// values are captured in command order.
pub struct WgpuBackend {
    context: GpuContext,
    uniform_layout: wgpu::BindGroupLayout,
    channel_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    placeholder: GpuTexture,
    next_id: u32,
    textures: HashMap<TextureId, GpuTexture>,
    framebuffers: HashMap<FramebufferId, Option<TextureId>>,
    shaders: HashMap<ShaderId, CompiledShader>,
    programs: HashMap<ProgramId, GpuProgram>,
    geometry: HashMap<GeometryId, Quad>,
    units: HashMap<u32, TextureId>,
    target: Target,
    current_program: Option<ProgramId>,
    bound_geometry: Option<GeometryId>,
    encoder: Option<wgpu::CommandEncoder>,
    frame: Option<SurfaceFrame>,
}

impl WgpuBackend {
    pub fn new<T>(target: &T, size: PhysicalSize<u32>) -> Result<Self, RenderError>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, size)?;
        let device = &context.device;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let channel_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("channel layout"),
            entries: &channel_layout_entries(),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shader pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &channel_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("channel sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let placeholder = upload(
            &context,
            "unbound channel placeholder",
            &ImageData {
                width: 1,
                height: 1,
                pixels: vec![0, 0, 0, 255],
            },
        );

        Ok(Self {
            context,
            uniform_layout,
            channel_layout,
            pipeline_layout,
            sampler,
            placeholder,
            next_id: 0,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            geometry: HashMap::new(),
            units: HashMap::new(),
            target: Target::Surface,
            current_program: None,
            bound_geometry: None,
            encoder: None,
            frame: None,
        })
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        // A frame acquired against the old configuration is dropped unpresented.
        self.frame = None;
        self.context.resize(size);
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        self.encoder.take().unwrap_or_else(|| {
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("shadersave frame encoder"),
                })
        })
    }

    fn acquire_frame(&mut self) -> Result<(), RenderError> {
        if self.frame.is_some() {
            return Ok(());
        }
        let texture = match self.context.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost or outdated; reconfiguring");
                self.context.reconfigure();
                self.context
                    .surface
                    .get_current_texture()
                    .map_err(surface_error)?
            }
            Err(err) => return Err(surface_error(err)),
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(SurfaceFrame { texture, view });
        Ok(())
    }

    /// View, format and surface flag for the bound target.
    fn target_view(&self) -> Option<(wgpu::TextureView, wgpu::TextureFormat, bool)> {
        match self.target {
            Target::Surface => self
                .frame
                .as_ref()
                .map(|frame| (frame.view.clone(), self.context.surface_format(), true)),
            Target::Framebuffer(framebuffer) => {
                let texture = self.framebuffers.get(&framebuffer).copied().flatten()?;
                let texture = self.textures.get(&texture)?;
                Some((texture.view.clone(), PASS_FORMAT, false))
            }
        }
    }

    fn channel_bind_group(&self, units: &[Option<u32>; CHANNEL_COUNT]) -> wgpu::BindGroup {
        let views: [&wgpu::TextureView; CHANNEL_COUNT] = std::array::from_fn(|channel| {
            units[channel]
                .and_then(|unit| self.units.get(&unit))
                .and_then(|texture| self.textures.get(texture))
                .map(|texture| &texture.view)
                .unwrap_or(&self.placeholder.view)
        });
        let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
        for (index, view) in views.into_iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (index as u32) * 2,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: (index as u32) * 2 + 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }
        self.context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("channel bind group"),
                layout: &self.channel_layout,
                entries: &entries,
            })
    }

    fn encode_draw(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        index_count: u32,
    ) -> Result<(), String> {
        let program_id = self.current_program.ok_or("no program in use")?;
        let geometry_id = self.bound_geometry.ok_or("no geometry bound")?;
        let (view, format, on_surface) = self.target_view().ok_or("no render target bound")?;
        let units = self
            .programs
            .get(&program_id)
            .map(|program| program.sampler_units)
            .ok_or("unknown program")?;
        let channel_group = self.channel_bind_group(&units);

        let device = &self.context.device;
        let quad = self.geometry.get(&geometry_id).ok_or("unknown geometry")?;
        let program = self
            .programs
            .get_mut(&program_id)
            .ok_or("unknown program")?;
        if let Some(offset) = program.flip_offset {
            let flip: f32 = if on_surface { 1.0 } else { 0.0 };
            write_bytes(&mut program.shadow, offset, bytemuck::bytes_of(&flip));
        }
        let pipeline = program
            .pipelines
            .get(&format)
            .ok_or_else(|| format!("program has no pipeline for {format:?}"))?;

        let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("uniform staging"),
            contents: &program.shadow,
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        encoder.copy_buffer_to_buffer(
            &staging,
            0,
            &program.uniform_buffer,
            0,
            program.shadow.len() as wgpu::BufferAddress,
        );

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("draw pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &program.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, &channel_group, &[]);
        render_pass.set_vertex_buffer(0, quad.vertices.slice(..));
        render_pass.set_index_buffer(quad.indices.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..index_count, 0, 0..1);
        Ok(())
    }
}

impl RenderBackend for WgpuBackend {
    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId, RenderError> {
        let max = self.context.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RenderError::Resource(format!(
                "cannot allocate a {width}x{height} render target (limit {max})"
            )));
        }
        let texture = self
            .context
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("pass texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: PASS_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId(self.next());
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                width,
                height,
                renderable: true,
            },
        );
        Ok(id)
    }

    fn upload_texture(&mut self, image: &ImageData) -> Result<TextureId, RenderError> {
        let expected = image.width as usize * image.height as usize * 4;
        if image.width == 0 || image.height == 0 || image.pixels.len() != expected {
            return Err(RenderError::Resource(format!(
                "image data is {} bytes, expected {expected} for {}x{}",
                image.pixels.len(),
                image.width,
                image.height
            )));
        }
        let max = self.context.device.limits().max_texture_dimension_2d;
        if image.width > max || image.height > max {
            return Err(RenderError::Resource(format!(
                "image of {}x{} exceeds the GPU texture limit of {max}",
                image.width, image.height
            )));
        }
        let texture = upload(&self.context, "channel image", image);
        let id = TextureId(self.next());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.units.retain(|_, bound| *bound != texture);
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        let framebuffer = FramebufferId(self.next());
        self.framebuffers.insert(framebuffer, None);
        framebuffer
    }

    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId) {
        match self.framebuffers.get_mut(&framebuffer) {
            Some(slot) => *slot = Some(texture),
            None => tracing::warn!(framebuffer = framebuffer.raw(), "attach to unknown framebuffer"),
        }
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        match self.framebuffers.get(&framebuffer) {
            None => FramebufferStatus::UnknownFramebuffer,
            Some(None) => FramebufferStatus::MissingAttachment,
            Some(Some(texture)) => match self.textures.get(texture) {
                Some(texture) if texture.renderable => FramebufferStatus::Complete,
                _ => FramebufferStatus::InvalidAttachment,
            },
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> Result<(), RenderError> {
        match framebuffer {
            Some(framebuffer) => {
                if !self.framebuffers.contains_key(&framebuffer) {
                    return Err(RenderError::Resource(format!(
                        "framebuffer {} does not exist",
                        framebuffer.raw()
                    )));
                }
                self.target = Target::Framebuffer(framebuffer);
            }
            None => {
                self.acquire_frame()?;
                self.target = Target::Surface;
            }
        }
        Ok(())
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
        if self.target == Target::Framebuffer(framebuffer) {
            self.target = Target::Surface;
        }
    }

    fn clear(&mut self, color: [f32; 4]) {
        let Some((view, _, _)) = self.target_view() else {
            tracing::warn!("clear with no render target bound");
            return;
        };
        let mut encoder = self.take_encoder();
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(color[0]),
                            g: f64::from(color[1]),
                            b: f64::from(color[2]),
                            a: f64::from(color[3]),
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
        }
        self.encoder = Some(encoder);
    }

    fn copy_texture(&mut self, source: TextureId, destination: TextureId, width: u32, height: u32) {
        let mut encoder = self.take_encoder();
        match (self.textures.get(&source), self.textures.get(&destination)) {
            (Some(src), Some(dst)) => {
                let width = width.min(src.width).min(dst.width);
                let height = height.min(src.height).min(dst.height);
                encoder.copy_texture_to_texture(
                    src.texture.as_image_copy(),
                    dst.texture.as_image_copy(),
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                );
            }
            _ => tracing::warn!(
                source = source.raw(),
                destination = destination.raw(),
                "copy between unknown textures skipped"
            ),
        }
        self.encoder = Some(encoder);
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        let (module, info) = reflect::parse(stage, source)?;
        let reflection = match stage {
            ShaderStage::Fragment => reflect::reflect(&module, &info),
            ShaderStage::Vertex => Reflection::default(),
        };

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(match stage {
                ShaderStage::Vertex => "quad vertex",
                ShaderStage::Fragment => "shadertoy fragment",
            }),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(source.to_string()),
                stage: reflect::naga_stage(stage),
                defines: &[],
            },
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(err.to_string());
        }

        let shader = ShaderId(self.next());
        self.shaders.insert(
            shader,
            CompiledShader {
                stage,
                module: shader_module,
                reflection,
            },
        );
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId, String> {
        let (Some(vertex), Some(fragment)) = (self.shaders.get(&vertex), self.shaders.get(&fragment))
        else {
            return Err("program references a deleted shader".to_string());
        };
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err("program requires one vertex and one fragment shader".to_string());
        }

        let device = &self.context.device;
        let reflection = fragment.reflection.clone();
        let block_size = reflection.block_size.max(16);
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform buffer"),
            size: block_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform bind group"),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let flip_offset = match reflection.find(ORIENTATION_UNIFORM) {
            Some(UniformBinding::Block { offset, .. }) => Some(offset as usize),
            _ => None,
        };

        // Both target formats are built up front so a bad pipeline surfaces
        // as a link error rather than mid-frame.
        let mut pipelines = HashMap::new();
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        for format in [self.context.surface_format(), PASS_FORMAT] {
            pipelines.entry(format).or_insert_with(|| {
                build_pipeline(
                    device,
                    &self.pipeline_layout,
                    &vertex.module,
                    &fragment.module,
                    format,
                )
            });
        }
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(err.to_string());
        }

        let program = GpuProgram {
            shadow: vec![0; block_size as usize],
            reflection,
            flip_offset,
            uniform_buffer,
            uniform_bind_group,
            sampler_units: [None; CHANNEL_COUNT],
            pipelines,
        };
        let id = ProgramId(self.next());
        self.programs.insert(id, program);
        Ok(id)
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<(String, UniformLocation)> {
        self.programs
            .get(&program)
            .map(|program| {
                program
                    .reflection
                    .uniforms
                    .iter()
                    .enumerate()
                    .map(|(index, (name, _))| (name.clone(), UniformLocation(index as u32)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn program_uniform(
        &mut self,
        program: ProgramId,
        location: UniformLocation,
        value: UniformValue<'_>,
    ) {
        let Some(program) = self.programs.get_mut(&program) else {
            return;
        };
        let Some((name, binding)) = program.reflection.uniforms.get(location.raw() as usize)
        else {
            return;
        };
        let written = match (*binding, value) {
            (UniformBinding::Channel(channel), UniformValue::Int(unit)) => {
                program.sampler_units[channel] = u32::try_from(unit).ok();
                true
            }
            (
                UniformBinding::Block {
                    offset,
                    kind,
                    count,
                    stride,
                },
                value,
            ) => write_member(&mut program.shadow, offset, kind, count, stride, value),
            _ => false,
        };
        if !written {
            tracing::warn!(uniform = %name, ?value, "uniform value does not match declared type");
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.current_program = Some(program);
    }

    fn bind_texture_unit(&mut self, unit: u32, texture: Option<TextureId>) {
        match texture {
            Some(texture) => {
                self.units.insert(unit, texture);
            }
            None => {
                self.units.remove(&unit);
            }
        }
    }

    fn create_quad(&mut self, vertices: &[f32], indices: &[u32]) -> Result<GeometryId, RenderError> {
        if vertices.len() % 3 != 0 || indices.is_empty() {
            return Err(RenderError::Resource(
                "quad geometry must be vec3 positions with at least one index".into(),
            ));
        }
        let device = &self.context.device;
        let quad = Quad {
            vertices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad vertices"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            indices: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad indices"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            }),
        };
        let id = GeometryId(self.next());
        self.geometry.insert(id, quad);
        Ok(id)
    }

    fn bind_geometry(&mut self, geometry: GeometryId) {
        self.bound_geometry = Some(geometry);
    }

    fn delete_geometry(&mut self, geometry: GeometryId) {
        self.geometry.remove(&geometry);
        if self.bound_geometry == Some(geometry) {
            self.bound_geometry = None;
        }
    }

    fn draw_indexed(&mut self, index_count: u32) {
        let mut encoder = self.take_encoder();
        if let Err(reason) = self.encode_draw(&mut encoder, index_count) {
            tracing::warn!(%reason, "draw skipped");
        }
        self.encoder = Some(encoder);
    }

    fn present(&mut self) -> Result<(), RenderError> {
        if let Some(encoder) = self.encoder.take() {
            self.context.queue.submit(std::iter::once(encoder.finish()));
        }
        if let Some(frame) = self.frame.take() {
            frame.texture.present();
        }
        Ok(())
    }

    fn discard_frame(&mut self) {
        if self.encoder.take().is_some() {
            tracing::debug!("discarded unsubmitted frame commands");
        }
        self.frame = None;
    }
}

fn surface_error(err: wgpu::SurfaceError) -> RenderError {
    RenderError::Context(format!("failed to acquire surface texture: {err}"))
}

fn upload(context: &GpuContext, label: &str, image: &ImageData) -> GpuTexture {
    let texture = context.device.create_texture_with_data(
        &context.queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: IMAGE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &image.pixels,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        width: image.width,
        height: image.height,
        renderable: false,
    }
}

fn channel_layout_entries() -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
    for index in 0..CHANNEL_COUNT as u32 {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: index * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("shader pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: VERTEX_STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x3],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

fn write_bytes(shadow: &mut [u8], offset: usize, bytes: &[u8]) -> bool {
    match shadow.get_mut(offset..offset + bytes.len()) {
        Some(destination) => {
            destination.copy_from_slice(bytes);
            true
        }
        None => false,
    }
}

/// Writes `value` into a std140 block member; `false` on a type mismatch.
fn write_member(
    shadow: &mut [u8],
    offset: u32,
    kind: UniformKind,
    count: u32,
    stride: u32,
    value: UniformValue<'_>,
) -> bool {
    let offset = offset as usize;
    match (kind, value) {
        (UniformKind::Int, UniformValue::Int(v)) => write_bytes(shadow, offset, bytemuck::bytes_of(&v)),
        (UniformKind::Float, UniformValue::Float(v)) => {
            write_bytes(shadow, offset, bytemuck::bytes_of(&v))
        }
        (UniformKind::Vec2, UniformValue::Vec2(v)) => {
            write_bytes(shadow, offset, bytemuck::cast_slice(v.as_slice()))
        }
        (UniformKind::Vec3, UniformValue::Vec3(v)) => {
            write_bytes(shadow, offset, bytemuck::cast_slice(v.as_slice()))
        }
        (UniformKind::Vec4, UniformValue::Vec4(v)) => {
            write_bytes(shadow, offset, bytemuck::cast_slice(v.as_slice()))
        }
        (UniformKind::Vec3, UniformValue::Vec3Array(values)) => values
            .iter()
            .take(count as usize)
            .enumerate()
            .all(|(index, v)| {
                write_bytes(
                    shadow,
                    offset + index * stride as usize,
                    bytemuck::cast_slice(v.as_slice()),
                )
            }),
        _ => false,
    }
}
