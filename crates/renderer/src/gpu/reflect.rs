//! Parses adapted GLSL with naga to produce compiler diagnostics and the
//! uniform table a GL driver would report after linking.

use wgpu::naga::{self, front::glsl, valid, AddressSpace, ArraySize, ScalarKind, TypeInner};

use crate::error::ShaderStage;
use crate::types::CHANNEL_COUNT;

/// Scalar or vector shape of one uniform block member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UniformKind {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
}

/// Where a reported uniform lives once the program is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UniformBinding {
    /// Member of the std140 uniform block at set 0, binding 0.
    Block {
        offset: u32,
        kind: UniformKind,
        /// Element count; 1 for non-arrays.
        count: u32,
        stride: u32,
    },
    /// `iChannelN` sampler; the value is a texture unit.
    Channel(usize),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Reflection {
    /// GL-style names: arrays are reported as `name[0]`.
    pub uniforms: Vec<(String, UniformBinding)>,
    pub block_size: u64,
}

impl Reflection {
    pub(crate) fn find(&self, name: &str) -> Option<UniformBinding> {
        self.uniforms
            .iter()
            .find(|(reported, _)| reported == name)
            .map(|(_, binding)| *binding)
    }
}

pub(crate) fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

/// Parses and validates `source`, returning the module or a rendered
/// diagnostic with source locations.
pub(crate) fn parse(
    stage: ShaderStage,
    source: &str,
) -> Result<(naga::Module, valid::ModuleInfo), String> {
    let mut frontend = glsl::Frontend::default();
    let module = frontend
        .parse(&glsl::Options::from(naga_stage(stage)), source)
        .map_err(|errors| errors.emit_to_string(source))?;
    let info = valid::Validator::new(valid::ValidationFlags::all(), valid::Capabilities::all())
        .validate(&module)
        .map_err(|error| error.emit_to_string(source))?;
    Ok((module, info))
}

/// Collects block members and the channel samplers the entry point samples.
pub(crate) fn reflect(module: &naga::Module, info: &valid::ModuleInfo) -> Reflection {
    let mut reflection = Reflection::default();
    let entry = module
        .entry_points
        .iter()
        .position(|entry| entry.stage == naga::ShaderStage::Fragment);

    for (handle, global) in module.global_variables.iter() {
        match global.space {
            AddressSpace::Uniform => {
                let TypeInner::Struct { members, span } = &module.types[global.ty].inner else {
                    continue;
                };
                reflection.block_size = u64::from(*span);
                for member in members {
                    let Some(name) = member.name.as_deref() else {
                        continue;
                    };
                    let Some((kind, count, stride)) = member_shape(&module.types, member.ty)
                    else {
                        tracing::debug!(name, "skipping uniform member with unsupported type");
                        continue;
                    };
                    let reported = if member_is_array(&module.types, member.ty) {
                        format!("{name}[0]")
                    } else {
                        name.to_string()
                    };
                    reflection.uniforms.push((
                        reported,
                        UniformBinding::Block {
                            offset: member.offset,
                            kind,
                            count,
                            stride,
                        },
                    ));
                }
            }
            AddressSpace::Handle => {
                let Some(channel) = global.name.as_deref().and_then(channel_index) else {
                    continue;
                };
                let used = entry
                    .map(|index| !info.get_entry_point(index)[handle].is_empty())
                    .unwrap_or(false);
                if used {
                    reflection
                        .uniforms
                        .push((format!("iChannel{channel}"), UniformBinding::Channel(channel)));
                }
            }
            _ => {}
        }
    }
    reflection
}

fn channel_index(name: &str) -> Option<usize> {
    let index = name
        .strip_prefix("shadersave_channel")?
        .strip_suffix("_texture")?
        .parse::<usize>()
        .ok()?;
    (index < CHANNEL_COUNT).then_some(index)
}

fn member_is_array(types: &naga::UniqueArena<naga::Type>, ty: naga::Handle<naga::Type>) -> bool {
    matches!(types[ty].inner, TypeInner::Array { .. })
}

fn member_shape(
    types: &naga::UniqueArena<naga::Type>,
    ty: naga::Handle<naga::Type>,
) -> Option<(UniformKind, u32, u32)> {
    match types[ty].inner {
        TypeInner::Scalar(scalar) => match scalar.kind {
            ScalarKind::Sint | ScalarKind::Uint => Some((UniformKind::Int, 1, 0)),
            ScalarKind::Float => Some((UniformKind::Float, 1, 0)),
            _ => None,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => {
            let kind = match size {
                naga::VectorSize::Bi => UniformKind::Vec2,
                naga::VectorSize::Tri => UniformKind::Vec3,
                naga::VectorSize::Quad => UniformKind::Vec4,
            };
            Some((kind, 1, 0))
        }
        TypeInner::Array {
            base,
            size: ArraySize::Constant(count),
            stride,
        } => {
            let (kind, _, _) = member_shape(types, base)?;
            Some((kind, count.get(), stride))
        }
        _ => None,
    }
}
