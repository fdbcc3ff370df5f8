use std::fmt::Write as _;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{RenderError, ShaderStage};

/// Name of the block member the backend flips when drawing to the surface.
pub(crate) const ORIENTATION_UNIFORM: &str = "shadersave_flip_y";

/// Uniforms the prelude declares; user redeclarations of these are dropped.
const INJECTED_UNIFORMS: [&str; 13] = [
    "iResolution",
    "iTimeDelta",
    "iTime",
    "iFrameRate",
    "iFrame",
    "iChannelTime",
    "iChannelResolution",
    "iChannel0",
    "iChannel1",
    "iChannel2",
    "iChannel3",
    "iDate",
    "iMouse",
];

/// A Shadertoy fragment rewritten into a standalone GLSL 450 shader.
#[derive(Debug, Clone)]
pub struct AdaptedShader {
    pub source: String,
    /// Output variable name taken from the `mainImage` signature.
    pub color_name: String,
    /// Coordinate parameter name taken from the `mainImage` signature.
    pub coord_name: String,
}

fn entry_point_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"void\s+mainImage\s*\(\s*(?:out)?\s+vec4\s+([^,]+),\s*(?:in)?\s+vec2\s+([^)]+)\)",
        )
        .expect("mainImage pattern is valid")
    })
}

/// Produces a self-contained GLSL fragment shader from Shadertoy code.
///
/// Steps performed:
///
/// 1. Blank out `#version` directives and redeclarations of the injected
///    uniforms, keeping line numbers stable for diagnostics.
/// 2. Locate the `mainImage` definition and capture whatever names the author
///    gave its color and coordinate parameters.
/// 3. Prepend [`HEADER`] (uniform block, channel samplers) plus an output
///    declaration using the captured color name.
/// 4. Swap the signature for `void main()` and seed the coordinate parameter
///    as a local at the top of the body.
///
/// `common` is spliced in between the prelude and the user code, the way
/// Shadertoy's "Common" tab behaves.
pub fn adapt_fragment(user: &str, common: Option<&str>) -> Result<AdaptedShader, RenderError> {
    let sanitized = sanitize(user);

    let pattern = entry_point_pattern();
    let comments = comment_ranges(&sanitized);
    let captures = pattern
        .captures_iter(&sanitized)
        .find(|caps| {
            caps.get(0)
                .map(|whole| {
                    !comments.iter().any(|range| range.contains(&whole.start()))
                        && next_token_is_brace(&sanitized[whole.end()..])
                })
                .unwrap_or(false)
        })
        .ok_or_else(|| {
            RenderError::compile(ShaderStage::Fragment, "no mainImage entry point found")
        })?;

    let (Some(whole), Some(color), Some(coord)) = (captures.get(0), captures.get(1), captures.get(2))
    else {
        return Err(RenderError::compile(
            ShaderStage::Fragment,
            "no mainImage entry point found",
        ));
    };
    let color_name = color.as_str().trim().to_string();
    let coord_name = coord.as_str().trim().to_string();
    if !is_identifier(&color_name) || !is_identifier(&coord_name) {
        return Err(RenderError::compile(
            ShaderStage::Fragment,
            format!("mainImage parameters `{color_name}`, `{coord_name}` are not plain identifiers"),
        ));
    }

    let after_signature = &sanitized[whole.end()..];
    let brace = after_signature.find('{').unwrap_or(0);
    let mut body = String::with_capacity(sanitized.len() + 128);
    body.push_str(&sanitized[..whole.start()]);
    body.push_str("void main()");
    body.push_str(&after_signature[..=brace]);
    // Same line as the brace so user line numbers do not shift.
    let _ = write!(
        body,
        " vec2 {coord_name} = vec2(gl_FragCoord.x, mix(gl_FragCoord.y, iResolution.y - gl_FragCoord.y, {ORIENTATION_UNIFORM}));"
    );
    body.push_str(&after_signature[brace + 1..]);

    let mut source = String::with_capacity(HEADER.len() + body.len() + 256);
    source.push_str(HEADER);
    let _ = writeln!(source, "layout(location = 0) out vec4 {color_name};");
    if let Some(common) = common {
        source.push_str("#line 1\n");
        source.push_str(&sanitize(common));
        if !common.ends_with('\n') {
            source.push('\n');
        }
    }
    source.push_str("#line 1\n");
    source.push_str(&body);

    Ok(AdaptedShader {
        source,
        color_name,
        coord_name,
    })
}

fn injected_uniform_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            r"^\s*uniform\s+\w+\s+(?:{})\b",
            INJECTED_UNIFORMS.join("|")
        ))
        .expect("injected uniform pattern is valid")
    })
}

/// Byte ranges covered by `//` and `/* */` comments.
fn comment_ranges(source: &str) -> Vec<Range<usize>> {
    let bytes = source.as_bytes();
    let mut ranges = Vec::new();
    let mut index = 0;
    while index + 1 < bytes.len() {
        let end = match (bytes[index], bytes[index + 1]) {
            (b'/', b'/') => source[index..]
                .find('\n')
                .map_or(bytes.len(), |offset| index + offset),
            (b'/', b'*') => source[index + 2..]
                .find("*/")
                .map_or(bytes.len(), |offset| index + 2 + offset + 2),
            _ => {
                index += 1;
                continue;
            }
        };
        ranges.push(index..end);
        index = end;
    }
    ranges
}

fn sanitize(source: &str) -> String {
    let mut sanitized = String::with_capacity(source.len());
    for line in source.lines() {
        let is_version = line.trim_start().starts_with("#version");
        let is_injected_uniform = injected_uniform_pattern().is_match(line);
        if !is_version && !is_injected_uniform {
            sanitized.push_str(line);
        }
        sanitized.push('\n');
    }
    sanitized
}

fn next_token_is_brace(rest: &str) -> bool {
    rest.trim_start().starts_with('{')
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// GLSL prologue injected ahead of every Shadertoy fragment shader.
///
/// The block is anonymous so members keep their Shadertoy names; the backend
/// reflects offsets from the compiled module rather than mirroring the layout
/// in a Rust struct.
const HEADER: &str = r"#version 450

layout(std140, set = 0, binding = 0) uniform ShadersaveUniforms {
    vec3 iResolution;
    float iTime;
    float iTimeDelta;
    float iFrameRate;
    int iFrame;
    float iChannelTime[4];
    vec3 iChannelResolution[4];
    vec4 iDate;
    vec4 iMouse;
    float shadersave_flip_y;
};

layout(set = 1, binding = 0) uniform texture2D shadersave_channel0_texture;
layout(set = 1, binding = 1) uniform sampler shadersave_channel0_sampler;
layout(set = 1, binding = 2) uniform texture2D shadersave_channel1_texture;
layout(set = 1, binding = 3) uniform sampler shadersave_channel1_sampler;
layout(set = 1, binding = 4) uniform texture2D shadersave_channel2_texture;
layout(set = 1, binding = 5) uniform sampler shadersave_channel2_sampler;
layout(set = 1, binding = 6) uniform texture2D shadersave_channel3_texture;
layout(set = 1, binding = 7) uniform sampler shadersave_channel3_sampler;

#define iChannel0 sampler2D(shadersave_channel0_texture, shadersave_channel0_sampler)
#define iChannel1 sampler2D(shadersave_channel1_texture, shadersave_channel1_sampler)
#define iChannel2 sampler2D(shadersave_channel2_texture, shadersave_channel2_sampler)
#define iChannel3 sampler2D(shadersave_channel3_texture, shadersave_channel3_sampler)

";

/// Pass-through vertex shader for the full-screen quad.
pub const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec3 a_position;

void main() {
    gl_Position = vec4(a_position, 1.0);
}
";

/// Fragment shader used when no main shader path is configured.
pub const DEFAULT_FRAGMENT_SHADER: &str = r"void mainImage(out vec4 fragColor, in vec2 fragCoord)
{
    vec2 uv = fragCoord / iResolution.xy;
    vec3 col = 0.5 + 0.5 * cos(iTime + uv.xyx + vec3(0.0, 2.0, 4.0));
    fragColor = vec4(col, 1.0);
}
";
