use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(
    name = "shadersave",
    author,
    version,
    about = "Run Shadertoy-style multi-pass shaders fullscreen"
)]
pub struct Args {
    /// Settings document; defaults to `<config dir>/shadersave/settings.toml`.
    #[arg(long, value_name = "PATH", env = "SHADERSAVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Main fragment shader, overriding `[main] path`.
    #[arg(long, value_name = "PATH")]
    pub shader: Option<PathBuf>,

    /// Shared GLSL prepended to every program, overriding `common`.
    #[arg(long, value_name = "PATH")]
    pub common: Option<PathBuf>,

    /// Frame cap (0=uncapped); values outside 0..=500 fall back to 60.
    #[arg(long, value_name = "FPS", allow_negative_numbers = true)]
    pub fps: Option<i64>,

    /// Window size when running windowed (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<(u32, u32)>,

    /// Render in a decorated window instead of borderless fullscreen.
    #[arg(long)]
    pub windowed: bool,

    /// Leave the OS timer resolution alone.
    #[arg(long)]
    pub no_high_precision_timing: bool,
}

pub fn parse() -> Args {
    Args::parse()
}

pub fn parse_surface_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WIDTHxHEIGHT, e.g. 1920x1080".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{}'", width.trim()))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{}'", height.trim()))?;

    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".to_string());
    }

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_surface_size("1920x1080"), Ok((1920, 1080)));
        assert_eq!(parse_surface_size(" 640 X 480 "), Ok((640, 480)));
        assert_eq!(parse_surface_size("800×600"), Ok((800, 600)));
    }

    #[test]
    fn rejects_malformed_sizes() {
        assert!(parse_surface_size("1920").is_err());
        assert!(parse_surface_size("0x1080").is_err());
        assert!(parse_surface_size("widexhigh").is_err());
    }

    #[test]
    fn flags_map_onto_args() {
        let args = Args::try_parse_from([
            "shadersave",
            "--shader",
            "image.glsl",
            "--fps",
            "-5",
            "--size",
            "320x200",
            "--windowed",
            "--no-high-precision-timing",
        ])
        .expect("parse args");
        assert_eq!(args.shader, Some(PathBuf::from("image.glsl")));
        assert_eq!(args.fps, Some(-5));
        assert_eq!(args.size, Some((320, 200)));
        assert!(args.windowed);
        assert!(args.no_high_precision_timing);
        assert!(args.common.is_none());
    }
}
