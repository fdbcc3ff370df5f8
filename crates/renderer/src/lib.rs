//! Renderer crate for shadersave, a Shadertoy-style multi-pass shader runner.
//!
//! The overall flow is:
//!
//! ```text
//!   settings / CLI ──▶ RendererConfig
//!          │
//!          ▼
//!   Renderer::run ──▶ winit loop ──▶ RenderGraph::render_frame ──▶ present
//!                        │                 │
//!                        │                 ├─▶ pass A..D (ping-pong targets)
//!                        │                 └─▶ main program onto the surface
//!                        └─▶ FrameLimiter (sleep, then spin to the deadline)
//! ```
//!
//! The graph is written against the [`RenderBackend`] trait: `gpu` maps it
//! onto `wgpu`, while the tests drive the same code through a recording
//! backend. Shadertoy fragments are rewritten by [`compile::adapt_fragment`]
//! into standalone GLSL before compilation.

pub mod backend;
pub mod channels;
pub mod compile;
mod error;
mod gpu;
pub mod graph;
mod limiter;
pub mod pass;
pub mod program;
mod types;
pub mod uniforms;
mod window;

use anyhow::Result;

pub use backend::{FramebufferStatus, RenderBackend, UniformValue};
pub use channels::{resolve_binding, ChannelTarget, ImageData};
pub use error::{RenderError, ShaderStage, SHADER_LOG_SIZE};
pub use gpu::WgpuBackend;
pub use graph::RenderGraph;
pub use limiter::FrameLimiter;
pub use types::{
    GraphConfig, PassConfig, PassSlot, RendererConfig, CHANNEL_COUNT, MAIN_CHANNEL_START,
    PASS_COUNT,
};
pub use uniforms::{FrameClock, FrameUniforms};

/// High-level entry point that owns the chosen configuration.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Opens the output window and renders until it is closed.
    ///
    /// Context, compile, link and resource failures during start-up are
    /// returned before the first frame; all GPU objects are released on
    /// every exit path.
    pub fn run(&mut self) -> Result<()> {
        window::run(&self.config)
    }
}
