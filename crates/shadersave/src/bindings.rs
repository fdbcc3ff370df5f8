use renderer::{GraphConfig, PassConfig, RendererConfig};
use settings::{Settings, ShaderTable};

use crate::cli::Args;

const DEFAULT_WINDOW_SIZE: (u32, u32) = (1280, 720);

/// Command line values win over the settings document.
pub fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(shader) = &args.shader {
        settings.main.path = Some(shader.clone());
    }
    if let Some(common) = &args.common {
        settings.common = Some(common.clone());
    }
    if let Some(fps) = args.fps {
        settings.framerate_cap = fps;
    }
}

pub fn renderer_config(settings: &Settings, args: &Args) -> RendererConfig {
    let graph = GraphConfig {
        common_path: settings.common.clone(),
        main: pass_config(&settings.main),
        buffers: settings.buffers().map(pass_config),
    };

    RendererConfig {
        graph,
        target_fps: settings.framerate(),
        surface_size: args.size.unwrap_or(DEFAULT_WINDOW_SIZE),
        fullscreen: !args.windowed,
        high_precision_timing: !args.no_high_precision_timing,
    }
}

fn pass_config(table: &ShaderTable) -> PassConfig {
    PassConfig {
        shader_path: table.path.clone(),
        channels: table.channel_array(),
    }
}
