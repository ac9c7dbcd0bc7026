use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use perfgov::{AdapterDescription, DeviceClass};
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::types::SurfaceSize;

/// Owns the wgpu instance, adapter, device and presentation surface.
pub(crate) struct GpuContext {
    _instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: SurfaceSize,
    pub surface_format: wgpu::TextureFormat,
    pub adapter_description: AdapterDescription,
    device_lost: Arc<AtomicBool>,
}

impl GpuContext {
    pub(crate) fn new<W>(window: W, initial_size: SurfaceSize) -> Result<Self, BackendError>
    where
        W: wgpu::WindowHandle + 'static,
    {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let surface = instance
            .create_surface(window)
            .map_err(|err| BackendError::Unsupported(format!("failed to create surface: {err}")))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|err| BackendError::Unsupported(format!("no suitable GPU adapter: {err}")))?;

        let adapter_description = describe_adapter(&adapter.get_info());
        debug!(
            name = %adapter_description.name,
            vendor = %adapter_description.vendor,
            class = ?adapter_description.class,
            "selected GPU adapter"
        );

        let limits = adapter.limits();
        let max_dimension = limits.max_texture_dimension_2d;
        let width = initial_size.width.max(1);
        let height = initial_size.height.max(1);
        if width > max_dimension || height > max_dimension {
            return Err(BackendError::Unsupported(format!(
                "GPU max texture dimension is {max_dimension}, requested surface is {width}x{height}"
            )));
        }

        let (device, queue, device_lost) = request_device(&adapter)?;

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = surface_caps.formats.first() else {
            return Err(BackendError::Unsupported(
                "surface reports no supported formats".into(),
            ));
        };
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .unwrap_or(first_format);

        let present_mode = surface_caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .unwrap_or(wgpu::PresentMode::AutoVsync);
        let alpha_mode = surface_caps
            .alpha_modes
            .iter()
            .copied()
            .find(|mode| {
                matches!(
                    mode,
                    wgpu::CompositeAlphaMode::PreMultiplied | wgpu::CompositeAlphaMode::PostMultiplied
                )
            })
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        debug!(?present_mode, ?alpha_mode, ?surface_format, "configuring surface");

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
            adapter,
            surface,
            device,
            queue,
            config,
            size: SurfaceSize::new(width, height),
            surface_format,
            adapter_description,
            device_lost,
        })
    }

    pub(crate) fn resize(&mut self, new_size: SurfaceSize) {
        if new_size.is_empty() {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
    }

    /// Re-applies the current configuration, e.g. after `SurfaceError::Outdated`.
    pub(crate) fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    pub(crate) fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }

    /// Requests a fresh device from the same adapter and reconfigures the
    /// surface against it.
    pub(crate) fn restore(&mut self) -> Result<(), BackendError> {
        let (device, queue, device_lost) = request_device(&self.adapter)?;
        self.device = device;
        self.queue = queue;
        self.device_lost = device_lost;
        self.surface.configure(&self.device, &self.config);
        debug!(adapter = %self.adapter_description.name, "GPU device recreated");
        Ok(())
    }
}

fn request_device(
    adapter: &wgpu::Adapter,
) -> Result<(wgpu::Device, wgpu::Queue, Arc<AtomicBool>), BackendError> {
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("heroglyph device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        memory_hints: wgpu::MemoryHints::MemoryUsage,
        trace: wgpu::Trace::default(),
    }))
    .map_err(|err| BackendError::Unsupported(format!("failed to create GPU device: {err}")))?;

    let device_lost = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&device_lost);
    device.set_device_lost_callback(move |reason, message| {
        flag.store(true, Ordering::Release);
        warn!(?reason, %message, "GPU device lost");
    });
    Ok((device, queue, device_lost))
}

fn describe_adapter(info: &wgpu::AdapterInfo) -> AdapterDescription {
    let class = match info.device_type {
        wgpu::DeviceType::DiscreteGpu => DeviceClass::Discrete,
        wgpu::DeviceType::IntegratedGpu => DeviceClass::Integrated,
        wgpu::DeviceType::VirtualGpu => DeviceClass::Virtual,
        wgpu::DeviceType::Cpu => DeviceClass::Cpu,
        wgpu::DeviceType::Other => DeviceClass::Other,
    };
    AdapterDescription {
        name: info.name.clone(),
        vendor: format!("{:#06x} ({:?})", info.vendor, info.backend),
        driver: format!("{} {}", info.driver, info.driver_info).trim().to_string(),
        class,
    }
}
