use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_FRAMERATE_CAP: i64 = 60;
pub const MAX_FRAMERATE_CAP: i64 = 500;
pub const CHANNEL_COUNT: usize = 4;
/// Channel strings that name a pass output rather than a file.
pub const BUFFER_TOKENS: [&str; 4] = ["BUFFER_A", "BUFFER_B", "BUFFER_C", "BUFFER_D"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to access configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Shader file plus channel bindings for the main program or one buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ShaderTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
}

impl ShaderTable {
    /// Channel bindings padded to four entries.
    pub fn channel_array(&self) -> [String; CHANNEL_COUNT] {
        std::array::from_fn(|index| self.channels.get(index).cloned().unwrap_or_default())
    }
}

/// The persisted settings document.
///
/// ```toml
/// framerate_cap = 60
/// common = "common.glsl"
///
/// [main]
/// path = "image.glsl"
/// channels = ["BUFFER_A", "noise.png"]
///
/// [buffer_a]
/// path = "buffer_a.glsl"
/// channels = ["BUFFER_A"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_framerate_cap")]
    pub framerate_cap: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common: Option<PathBuf>,
    #[serde(default)]
    pub main: ShaderTable,
    #[serde(default)]
    pub buffer_a: ShaderTable,
    #[serde(default)]
    pub buffer_b: ShaderTable,
    #[serde(default)]
    pub buffer_c: ShaderTable,
    #[serde(default)]
    pub buffer_d: ShaderTable,
}

fn default_framerate_cap() -> i64 {
    DEFAULT_FRAMERATE_CAP
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            framerate_cap: DEFAULT_FRAMERATE_CAP,
            common: None,
            main: ShaderTable::default(),
            buffer_a: ShaderTable::default(),
            buffer_b: ShaderTable::default(),
            buffer_c: ShaderTable::default(),
            buffer_d: ShaderTable::default(),
        }
    }
}

/// A change made by [`Settings::normalise`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adjustment {
    FramerateReset { from: i64 },
    CommonCleared { path: PathBuf },
    PathCleared { table: &'static str, path: PathBuf },
    ChannelCleared {
        table: &'static str,
        channel: usize,
        binding: String,
    },
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adjustment::FramerateReset { from } => write!(
                f,
                "framerate_cap {from} is outside 0..={MAX_FRAMERATE_CAP}; using {DEFAULT_FRAMERATE_CAP}"
            ),
            Adjustment::CommonCleared { path } => {
                write!(f, "common file {} does not exist; ignoring it", path.display())
            }
            Adjustment::PathCleared { table, path } => write!(
                f,
                "[{table}] shader {} does not exist; ignoring it",
                path.display()
            ),
            Adjustment::ChannelCleared {
                table,
                channel,
                binding,
            } => write!(
                f,
                "[{table}] channel {channel} binding '{binding}' is neither a buffer nor a file; unbinding it"
            ),
        }
    }
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: Settings = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates `path`; relative file references are resolved
    /// against the document's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_toml_str(&input)?;
        if let Some(base) = path.parent() {
            settings.rebase(base);
        }
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Like [`Settings::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "settings file not found; using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes the document, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(path, self.to_toml_string()?).map_err(io_error)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(common) = &self.common {
            if common.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("common path may not be empty".into()));
            }
        }

        for (name, table) in self.tables() {
            if let Some(path) = &table.path {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "[{name}] path may not be empty"
                    )));
                }
            }

            if table.channels.len() > CHANNEL_COUNT {
                return Err(ConfigError::Invalid(format!(
                    "[{name}] declares {} channels; at most {CHANNEL_COUNT} are supported",
                    table.channels.len()
                )));
            }

            for (index, binding) in table.channels.iter().enumerate() {
                if !binding.is_empty() && binding.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "[{name}] channel {index} binding is only whitespace"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Applies the runtime sanitation rules and reports every change.
    ///
    /// Empty channel strings are left alone; they already mean "unbound".
    pub fn normalise(&mut self) -> Vec<Adjustment> {
        let mut adjustments = Vec::new();

        if !(0..=MAX_FRAMERATE_CAP).contains(&self.framerate_cap) {
            adjustments.push(Adjustment::FramerateReset {
                from: self.framerate_cap,
            });
            self.framerate_cap = DEFAULT_FRAMERATE_CAP;
        }

        if let Some(path) = self.common.take_if(|path| !path.is_file()) {
            adjustments.push(Adjustment::CommonCleared { path });
        }

        for (name, table) in self.tables_mut() {
            if let Some(path) = table.path.take_if(|path| !path.is_file()) {
                adjustments.push(Adjustment::PathCleared { table: name, path });
            }
            for (channel, binding) in table.channels.iter_mut().enumerate() {
                if binding.is_empty()
                    || is_token(binding)
                    || Path::new(binding.as_str()).is_file()
                {
                    continue;
                }
                adjustments.push(Adjustment::ChannelCleared {
                    table: name,
                    channel,
                    binding: std::mem::take(binding),
                });
            }
        }

        adjustments
    }

    /// Joins relative shader, common and image paths onto `base`.
    pub fn rebase(&mut self, base: &Path) {
        if let Some(common) = self.common.as_mut() {
            rebase_path(common, base);
        }
        for (_, table) in self.tables_mut() {
            if let Some(path) = table.path.as_mut() {
                rebase_path(path, base);
            }
            for binding in table.channels.iter_mut() {
                if binding.is_empty()
                    || is_token(binding)
                    || Path::new(binding.as_str()).is_absolute()
                {
                    continue;
                }
                *binding = base.join(binding.as_str()).to_string_lossy().into_owned();
            }
        }
    }

    /// Frame cap as the renderer consumes it; 0 disables pacing.
    pub fn framerate(&self) -> u32 {
        u32::try_from(self.framerate_cap)
            .ok()
            .filter(|fps| i64::from(*fps) <= MAX_FRAMERATE_CAP)
            .unwrap_or(DEFAULT_FRAMERATE_CAP as u32)
    }

    /// Buffer tables in render order A-D.
    pub fn buffers(&self) -> [&ShaderTable; 4] {
        [&self.buffer_a, &self.buffer_b, &self.buffer_c, &self.buffer_d]
    }

    pub fn tables(&self) -> [(&'static str, &ShaderTable); 5] {
        [
            ("main", &self.main),
            ("buffer_a", &self.buffer_a),
            ("buffer_b", &self.buffer_b),
            ("buffer_c", &self.buffer_c),
            ("buffer_d", &self.buffer_d),
        ]
    }

    fn tables_mut(&mut self) -> [(&'static str, &mut ShaderTable); 5] {
        [
            ("main", &mut self.main),
            ("buffer_a", &mut self.buffer_a),
            ("buffer_b", &mut self.buffer_b),
            ("buffer_c", &mut self.buffer_c),
            ("buffer_d", &mut self.buffer_d),
        ]
    }
}

fn is_token(binding: &str) -> bool {
    BUFFER_TOKENS.contains(&binding)
}

fn rebase_path(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
framerate_cap = 120
common = "common.glsl"

[main]
path = "image.glsl"
channels = ["BUFFER_A", "noise.png"]

[buffer_a]
path = "buffer_a.glsl"
channels = ["BUFFER_A", "", "BUFFER_B"]
"#;

    #[test]
    fn parses_sample_settings() {
        let settings = Settings::from_toml_str(SAMPLE).expect("parse settings");
        assert_eq!(settings.framerate_cap, 120);
        assert_eq!(settings.common.as_deref(), Some(Path::new("common.glsl")));
        assert_eq!(settings.main.path.as_deref(), Some(Path::new("image.glsl")));
        assert_eq!(
            settings.buffer_a.channel_array(),
            [
                "BUFFER_A".to_string(),
                String::new(),
                "BUFFER_B".to_string(),
                String::new()
            ]
        );
        assert_eq!(settings.buffer_b, ShaderTable::default());
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let settings = Settings::from_toml_str("").expect("parse");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.framerate(), 60);
    }

    #[test]
    fn rejects_too_many_channels() {
        let err = Settings::from_toml_str(
            r#"
[main]
channels = ["a", "b", "c", "d", "e"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("at most 4")));
    }

    #[test]
    fn rejects_whitespace_bindings_and_empty_paths() {
        let whitespace = Settings::from_toml_str("[buffer_c]\nchannels = [\"  \"]\n").unwrap_err();
        assert!(matches!(whitespace, ConfigError::Invalid(_)));

        let empty = Settings::from_toml_str("[buffer_d]\npath = \"\"\n").unwrap_err();
        assert!(matches!(empty, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = Settings::from_toml_str("framerate = 30\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn normalise_resets_out_of_range_framerate() {
        for cap in [-1, 501, 10_000] {
            let mut settings = Settings {
                framerate_cap: cap,
                ..Settings::default()
            };
            let adjustments = settings.normalise();
            assert_eq!(adjustments, vec![Adjustment::FramerateReset { from: cap }]);
            assert_eq!(settings.framerate_cap, DEFAULT_FRAMERATE_CAP);
        }

        let mut uncapped = Settings {
            framerate_cap: 0,
            ..Settings::default()
        };
        assert!(uncapped.normalise().is_empty());
        assert_eq!(uncapped.framerate(), 0);
    }

    #[test]
    fn normalise_clears_missing_files_but_keeps_tokens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let shader = dir.path().join("image.glsl");
        let texture = dir.path().join("tex.png");
        std::fs::write(&shader, "void mainImage(out vec4 c, in vec2 p) {}").expect("write");
        std::fs::write(&texture, b"not decoded here").expect("write");

        let mut settings = Settings {
            common: Some(dir.path().join("missing_common.glsl")),
            main: ShaderTable {
                path: Some(shader.clone()),
                channels: vec![
                    "BUFFER_D".into(),
                    texture.display().to_string(),
                    "nope.png".into(),
                    String::new(),
                ],
            },
            buffer_b: ShaderTable {
                path: Some(dir.path().join("missing.glsl")),
                channels: Vec::new(),
            },
            ..Settings::default()
        };

        let adjustments = settings.normalise();
        assert_eq!(adjustments.len(), 3);
        assert!(adjustments.contains(&Adjustment::ChannelCleared {
            table: "main",
            channel: 2,
            binding: "nope.png".into(),
        }));
        assert!(settings.common.is_none());
        assert_eq!(settings.main.path.as_deref(), Some(shader.as_path()));
        assert_eq!(settings.main.channels[0], "BUFFER_D");
        assert_eq!(settings.main.channels[1], texture.display().to_string());
        assert_eq!(settings.main.channels[2], "");
        assert!(settings.buffer_b.path.is_none());
    }

    #[test]
    fn load_resolves_relative_paths_against_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, SAMPLE).expect("write");

        let settings = Settings::load(&path).expect("load");
        assert_eq!(settings.common, Some(dir.path().join("common.glsl")));
        assert_eq!(settings.main.path, Some(dir.path().join("image.glsl")));
        assert_eq!(settings.main.channels[0], "BUFFER_A");
        assert_eq!(
            settings.main.channels[1],
            dir.path().join("noise.png").to_string_lossy()
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings =
            Settings::load_or_default(&dir.path().join("absent.toml")).expect("defaults");
        assert_eq!(settings, Settings::default());

        let err = Settings::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn save_then_load_preserves_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("settings.toml");
        let mut settings = Settings::from_toml_str(SAMPLE).expect("parse");
        settings.rebase(dir.path());
        settings.save(&path).expect("save");

        let reloaded = Settings::load(&path).expect("reload");
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn adjustments_describe_themselves() {
        let message = Adjustment::ChannelCleared {
            table: "buffer_a",
            channel: 1,
            binding: "x.png".into(),
        }
        .to_string();
        assert!(message.contains("[buffer_a] channel 1"));
    }
}
