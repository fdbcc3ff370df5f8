use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use crate::error::RenderError;

/// Instance, surface, device and queue for one window.
pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Brings up a device able to present to `target`.
    ///
    /// Every failure (surface creation, no adapter, device request, a surface
    /// larger than the adapter supports) becomes [`RenderError::Context`].
    pub(crate) fn new<T>(target: &T, initial_size: PhysicalSize<u32>) -> Result<Self, RenderError>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let window_handle = target
            .window_handle()
            .map_err(|err| context_error("failed to acquire window handle", err))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| context_error("failed to acquire display handle", err))?;

        // SAFETY: the window owning these handles outlives the context; the
        // event loop drops the backend before the window.
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .map_err(|err| context_error("failed to create rendering surface", err))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|err| context_error("failed to find a suitable GPU adapter", err))?;

        let info = adapter.get_info();
        let limits = adapter.limits();
        tracing::debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU adapter"
        );

        let width = initial_size.width.max(1);
        let height = initial_size.height.max(1);
        let max_dimension = limits.max_texture_dimension_2d;
        if width > max_dimension || height > max_dimension {
            return Err(RenderError::Context(format!(
                "GPU max texture dimension is {max_dimension}, requested surface is {width}x{height}"
            )));
        }

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = surface_caps.formats.first() else {
            return Err(RenderError::Context(
                "surface reports no supported formats for this adapter".into(),
            ));
        };
        // Shader output is already gamma encoded.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .unwrap_or_else(|| {
                tracing::warn!(
                    fallback = ?first_format,
                    "no linear (non-sRGB) surface format available"
                );
                first_format
            });

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("shadersave device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| context_error("failed to create GPU device", err))?;
        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!(%error, "uncaptured GPU error");
        }));

        let present_mode = select_present_mode(&surface_caps.present_modes);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        tracing::debug!(?present_mode, ?surface_format, "configuring surface");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
        })
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
    }

    pub(crate) fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    pub(crate) fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }
}

/// Frame pacing belongs to the limiter, so vsync is avoided: Immediate,
/// then Mailbox, then Fifo (always supported).
fn select_present_mode(available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
    [wgpu::PresentMode::Immediate, wgpu::PresentMode::Mailbox]
        .into_iter()
        .find(|preferred| available.contains(preferred))
        .unwrap_or(wgpu::PresentMode::Fifo)
}

fn context_error(what: &str, err: impl std::fmt::Display) -> RenderError {
    RenderError::Context(format!("{what}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::PresentMode;

    #[test]
    fn present_mode_avoids_vsync_when_possible() {
        assert_eq!(
            select_present_mode(&[PresentMode::Fifo, PresentMode::Mailbox, PresentMode::Immediate]),
            PresentMode::Immediate
        );
        assert_eq!(
            select_present_mode(&[PresentMode::Fifo, PresentMode::Mailbox]),
            PresentMode::Mailbox
        );
        assert_eq!(select_present_mode(&[PresentMode::Fifo]), PresentMode::Fifo);
        assert_eq!(select_present_mode(&[]), PresentMode::Fifo);
    }
}
