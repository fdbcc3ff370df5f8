use anyhow::{Context, Result};
use renderer::Renderer;
use settings::Settings;
use tracing_subscriber::EnvFilter;

use crate::bindings::{apply_overrides, renderer_config};
use crate::cli::Args;
use crate::paths::AppPaths;

pub fn run(args: Args) -> Result<()> {
    initialise_tracing();

    let mut settings = load_settings(&args)?;
    apply_overrides(&mut settings, &args);
    for adjustment in settings.normalise() {
        tracing::warn!(%adjustment, "settings adjusted");
    }

    let config = renderer_config(&settings, &args);
    tracing::info!(
        main = ?config.graph.main.shader_path,
        common = ?config.graph.common_path,
        fps = config.target_fps,
        fullscreen = config.fullscreen,
        "starting shadersave"
    );

    let mut renderer = Renderer::new(config);
    if let Err(err) = renderer.run() {
        tracing::error!(error = %format!("{err:#}"), "renderer failed");
        return Err(err);
    }
    Ok(())
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// An explicit `--config` must exist; the default location may be absent.
fn load_settings(args: &Args) -> Result<Settings> {
    if let Some(path) = &args.config {
        return Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()));
    }

    let paths = AppPaths::discover()?;
    let path = paths.settings_file();
    tracing::debug!(
        config = %paths.config_dir().display(),
        settings = %path.display(),
        "resolved shadersave paths"
    );
    Settings::load_or_default(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args {
            config: Some(dir.path().join("missing.toml")),
            ..Args::default()
        };
        let err = load_settings(&args).unwrap_err();
        assert!(format!("{err:#}").contains("missing.toml"));
    }

    #[test]
    fn explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "framerate_cap = 24\n[main]\npath = \"image.glsl\"\n").unwrap();
        let args = Args {
            config: Some(path),
            ..Args::default()
        };
        let settings = load_settings(&args).unwrap();
        assert_eq!(settings.framerate_cap, 24);
        assert_eq!(settings.main.path, Some(dir.path().join("image.glsl")));
    }
}
