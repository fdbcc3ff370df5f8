//! `wgpu` implementation of the render backend.
//!
//! - `context` owns instance/device/surface wiring and reconfigures the
//!   swapchain when the window resizes.
//! - `reflect` parses adapted GLSL with naga for diagnostics and the uniform
//!   table reported after linking.
//! - `backend` maps textures, framebuffers, programs and texture units onto
//!   `wgpu` resources and records each frame into one command encoder.

mod backend;
mod context;
mod reflect;

pub use backend::WgpuBackend;
