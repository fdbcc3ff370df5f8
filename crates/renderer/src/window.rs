use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, error, info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window, WindowBuilder};

use crate::error::RenderError;
use crate::gpu::WgpuBackend;
use crate::graph::RenderGraph;
use crate::limiter::FrameLimiter;
use crate::types::{GraphConfig, RendererConfig};

/// Everything one window needs to draw frames.
///
/// Field order is drop order: the graph and backend release GPU objects
/// before the window that backs the surface goes away.
struct WindowState {
    graph: RenderGraph,
    backend: WgpuBackend,
    limiter: FrameLimiter,
    stats: FrameStats,
    graph_config: GraphConfig,
    shut_down: bool,
    window: Arc<Window>,
}

impl WindowState {
    fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self> {
        let size = initial_size(&window, config);
        let mut backend = WgpuBackend::new(window.as_ref(), size)?;
        let graph = RenderGraph::initialize(&mut backend, size.width, size.height, &config.graph)?;

        let mut limiter = FrameLimiter::new(config.target_fps);
        if config.high_precision_timing {
            limiter.set_high_precision_timing(true);
        }
        info!(
            width = size.width,
            height = size.height,
            fps = config.target_fps,
            "renderer ready"
        );

        Ok(Self {
            graph,
            backend,
            limiter,
            stats: FrameStats::new(Instant::now()),
            graph_config: config.graph.clone(),
            shut_down: false,
            window,
        })
    }

    /// Reconfigures the surface and, when the size actually changed, rebuilds
    /// the graph so pass targets and `iResolution` follow the window.
    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<(), RenderError> {
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        self.backend.resize(size);
        if self.graph.viewport() == (size.width, size.height) {
            return Ok(());
        }
        debug!(width = size.width, height = size.height, "rebuilding render graph");
        self.graph.shutdown(&mut self.backend);
        self.graph = RenderGraph::initialize(
            &mut self.backend,
            size.width,
            size.height,
            &self.graph_config,
        )?;
        Ok(())
    }

    fn frame(&mut self) -> Result<(), RenderError> {
        self.limiter.start_frame();
        let result = self.graph.render_frame(&mut self.backend);
        self.limiter.end_frame();

        match result {
            Ok(uniforms) => self.stats.record(Instant::now(), uniforms.frame),
            // Surface hiccups skip a frame rather than ending the session.
            Err(RenderError::Context(reason)) => {
                warn!(%reason, "frame skipped");
            }
            Err(err) => return Err(err),
        }

        self.limiter.wait_for_next_frame();
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.limiter.set_high_precision_timing(false);
        self.graph.shutdown(&mut self.backend);
        info!(frames = self.graph.frame_count(), "renderer shut down");
    }
}

/// Fullscreen windows start at the monitor size rather than the requested
/// windowed size, since the compositor may not have applied fullscreen yet.
fn initial_size(window: &Window, config: &RendererConfig) -> PhysicalSize<u32> {
    let inner = window.inner_size();
    if !config.fullscreen {
        return inner;
    }
    window
        .current_monitor()
        .map(|monitor| monitor.size())
        .filter(|size| size.width > 0 && size.height > 0)
        .unwrap_or(inner)
}

/// Once-per-second frame rate summary for debug logs.
struct FrameStats {
    last_report: Instant,
    frames_since_report: u32,
}

impl FrameStats {
    const INTERVAL: Duration = Duration::from_secs(1);

    fn new(now: Instant) -> Self {
        Self {
            last_report: now,
            frames_since_report: 0,
        }
    }

    fn record(&mut self, now: Instant, frame: i32) {
        self.frames_since_report += 1;
        let elapsed = now.saturating_duration_since(self.last_report);
        if elapsed >= Self::INTERVAL {
            let fps = self.frames_since_report as f32 / elapsed.as_secs_f32();
            debug!(fps = fps.round(), frame, "render stats");
            self.frames_since_report = 0;
            self.last_report = now;
        }
    }
}

fn is_escape(event: &KeyEvent) -> bool {
    event.state == ElementState::Pressed && event.logical_key == Key::Named(NamedKey::Escape)
}

/// Opens the window and drives frames until it is closed or Escape is pressed.
pub(crate) fn run(config: &RendererConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let (width, height) = config.surface_size;
    let mut builder = WindowBuilder::new()
        .with_title("shadersave")
        .with_inner_size(PhysicalSize::new(width.max(1), height.max(1)));
    if config.fullscreen {
        builder = builder
            .with_decorations(false)
            .with_fullscreen(Some(Fullscreen::Borderless(None)));
    }
    let window = Arc::new(
        builder
            .build(&event_loop)
            .context("failed to create window")?,
    );
    if config.fullscreen {
        window.set_cursor_visible(false);
    }

    let mut state = WindowState::new(window, config)?;
    let mut failure: Option<RenderError> = None;
    state.window.request_redraw();

    event_loop
        .run(|event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { window_id, event } if window_id == state.window.id() => {
                    match event {
                        WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                        WindowEvent::KeyboardInput { event, .. } if is_escape(&event) => {
                            elwt.exit();
                        }
                        WindowEvent::Resized(size) => {
                            if let Err(err) = state.resize(size) {
                                error!(error = %err, "failed to rebuild after resize");
                                failure = Some(err);
                                elwt.exit();
                            }
                        }
                        WindowEvent::RedrawRequested => {
                            if let Err(err) = state.frame() {
                                error!(error = %err, "frame failed");
                                failure = Some(err);
                                elwt.exit();
                            }
                        }
                        _ => {}
                    }
                }
                Event::AboutToWait => state.window.request_redraw(),
                Event::LoopExiting => state.shutdown(),
                _ => {}
            }
        })
        .map_err(|err| anyhow!("event loop error: {err}"))?;

    state.shutdown();
    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_reset_after_each_report() {
        let start = Instant::now();
        let mut stats = FrameStats::new(start);
        for frame in 0..10 {
            stats.record(start + Duration::from_millis(frame * 10), frame as i32);
        }
        assert_eq!(stats.frames_since_report, 10);
        stats.record(start + Duration::from_millis(1100), 10);
        assert_eq!(stats.frames_since_report, 0);
        assert_eq!(stats.last_report, start + Duration::from_millis(1100));
    }
}
