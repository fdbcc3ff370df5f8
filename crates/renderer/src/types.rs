use std::fmt;
use std::path::PathBuf;

/// Shadertoy exposes four optional input channels (`iChannel0-3`).
pub const CHANNEL_COUNT: usize = 4;

/// Number of off-screen pass slots (`Buffer A` through `Buffer D`).
pub const PASS_COUNT: usize = 4;

/// Texture units reserved for the main program's channels.
pub const MAIN_CHANNEL_START: u32 = 0;

/// One of the four off-screen pass slots, in their fixed render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassSlot {
    A,
    B,
    C,
    D,
}

impl PassSlot {
    /// Every slot in declared render order.
    pub const ALL: [PassSlot; PASS_COUNT] = [PassSlot::A, PassSlot::B, PassSlot::C, PassSlot::D];

    pub fn index(self) -> usize {
        match self {
            PassSlot::A => 0,
            PassSlot::B => 1,
            PassSlot::C => 2,
            PassSlot::D => 3,
        }
    }

    /// Binding token that refers to this slot's output in channel configuration.
    pub fn token(self) -> &'static str {
        match self {
            PassSlot::A => "BUFFER_A",
            PassSlot::B => "BUFFER_B",
            PassSlot::C => "BUFFER_C",
            PassSlot::D => "BUFFER_D",
        }
    }

    /// Matches a binding string against the four slot tokens.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.token() == token)
    }

    /// First texture unit of this slot's four-channel range.
    ///
    /// Main owns units 0-3, so pass A starts at 4 and each following slot
    /// is offset by [`CHANNEL_COUNT`].
    pub fn channel_start(self) -> u32 {
        MAIN_CHANNEL_START + ((self.index() + 1) * CHANNEL_COUNT) as u32
    }
}

impl fmt::Display for PassSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            PassSlot::A => 'A',
            PassSlot::B => 'B',
            PassSlot::C => 'C',
            PassSlot::D => 'D',
        };
        write!(f, "buffer {letter}")
    }
}

/// Shader source and channel bindings for the main program or one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassConfig {
    /// Fragment shader on disk; `None` leaves a pass slot absent (or selects
    /// the built-in shader for the main program).
    pub shader_path: Option<PathBuf>,
    /// Raw binding strings: a pass token, an image path, or empty.
    pub channels: [String; CHANNEL_COUNT],
}

impl PassConfig {
    pub fn new(shader_path: impl Into<PathBuf>) -> Self {
        Self {
            shader_path: Some(shader_path.into()),
            channels: Default::default(),
        }
    }

    /// Builder-style helper for assigning one channel binding.
    pub fn with_channel(mut self, channel: usize, binding: impl Into<String>) -> Self {
        if let Some(slot) = self.channels.get_mut(channel) {
            *slot = binding.into();
        }
        self
    }
}

/// Resolved configuration consumed by the render graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Shared GLSL prepended to every fragment program.
    pub common_path: Option<PathBuf>,
    pub main: PassConfig,
    /// Pass slots A-D, indexed by [`PassSlot::index`].
    pub buffers: [PassConfig; PASS_COUNT],
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            common_path: None,
            main: PassConfig::default(),
            buffers: std::array::from_fn(|_| PassConfig::default()),
        }
    }
}

impl GraphConfig {
    pub fn buffer(&self, slot: PassSlot) -> &PassConfig {
        &self.buffers[slot.index()]
    }

    pub fn buffer_mut(&mut self, slot: PassSlot) -> &mut PassConfig {
        &mut self.buffers[slot.index()]
    }
}

/// Immutable configuration passed to the renderer at start-up.
///
/// `RendererConfig` mirrors the settings document after CLI overrides have
/// been applied.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub graph: GraphConfig,
    /// Frames per second the limiter holds the loop to; 0 disables pacing.
    pub target_fps: u32,
    /// Window size in physical pixels when running windowed.
    pub surface_size: (u32, u32),
    /// Borderless fullscreen on the primary monitor.
    pub fullscreen: bool,
    /// Request a 1 ms OS timer resolution while rendering.
    pub high_precision_timing: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            target_fps: 60,
            surface_size: (1280, 720),
            fullscreen: true,
            high_precision_timing: true,
        }
    }
}
