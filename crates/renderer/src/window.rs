use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use heroconfig::{GovernorSettings, Theme};
use perfgov::PerformanceGovernor;
use shaderpack::ShaderFetcher;
use tracing::{debug, info, warn};
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::window::{Window, WindowBuilder};

use crate::gpu::WgpuBackend;
use crate::input::window_to_ndc;
use crate::lifecycle::{EngineOptions, HeroEngine};
use crate::types::{EngineEvent, EngineState, Presentation, SurfaceSize};

/// Scroll fraction per wheel line.
const SCROLL_PER_LINE: f32 = 0.05;
/// Pixels per full page of scroll for touchpads.
const SCROLL_PAGE_PIXELS: f32 = 1200.0;
const RESTORE_INTERVAL: Duration = Duration::from_secs(1);

pub struct PreviewOptions {
    pub title: String,
    pub engine: EngineOptions,
    pub governor: GovernorSettings,
    pub fetcher: Arc<dyn ShaderFetcher>,
    /// Track the system light/dark setting instead of the configured theme.
    pub follow_system_theme: bool,
}

/// Opens a window and drives a [`HeroEngine`] from its event loop until the
/// window is closed.
pub fn run_preview(options: PreviewOptions) -> Result<()> {
    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let logical = options.engine.viewport;
    let window = WindowBuilder::new()
        .with_title(options.title.as_str())
        .with_inner_size(LogicalSize::new(logical.width, logical.height))
        .with_transparent(true)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);

    let mut host = PreviewHost::new(window, options);
    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == host.window.id() => {
            match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    host.engine.destroy();
                    elwt.exit();
                }
                WindowEvent::RedrawRequested => host.redraw(),
                other => host.forward(other),
            }
        }
        Event::AboutToWait => {
            host.maybe_restore();
            if host.engine.wants_frame() {
                host.window.request_redraw();
            }
            elwt.set_control_flow(ControlFlow::Wait);
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

struct PreviewHost {
    window: Arc<Window>,
    engine: HeroEngine<WgpuBackend>,
    scale_factor: f64,
    scroll: f32,
    next_pulse: usize,
    last_restore_attempt: Option<Instant>,
    fallback_reported: bool,
}

impl PreviewHost {
    fn new(window: Arc<Window>, options: PreviewOptions) -> Self {
        let PreviewOptions {
            engine: mut engine_options,
            governor,
            fetcher,
            follow_system_theme,
            ..
        } = options;

        let scale_factor = window.scale_factor();
        let physical = window.inner_size();
        engine_options.device_pixel_ratio = scale_factor as f32;
        engine_options.viewport = logical_size(physical, scale_factor);
        if follow_system_theme {
            if let Some(theme) = window.theme() {
                engine_options.theme = map_theme(theme);
            }
        }

        let now = Instant::now();
        let backend = WgpuBackend::new(
            Arc::clone(&window),
            SurfaceSize::new(physical.width, physical.height),
        );
        let engine = HeroEngine::launch(
            backend,
            PerformanceGovernor::new(governor, now),
            fetcher,
            engine_options,
            now,
        );
        info!(
            state = ?engine.state(),
            width = physical.width,
            height = physical.height,
            scale_factor,
            "preview window ready"
        );

        Self {
            window,
            engine,
            scale_factor,
            scroll: 0.0,
            next_pulse: 0,
            last_restore_attempt: None,
            fallback_reported: false,
        }
    }

    fn redraw(&mut self) {
        let report = self.engine.tick(Instant::now());
        if let Some(sample) = report.sample {
            debug!(
                measured_fps = sample.measured_fps.round(),
                quality = sample.quality,
                low_end = sample.is_low_end_device,
                "governor sample"
            );
        }
        if let Presentation::Fallback(gradient) = self.engine.presentation() {
            if !self.fallback_reported {
                self.fallback_reported = true;
                warn!(gradient = %gradient.css(), "preview is showing the static fallback");
            }
        } else {
            self.fallback_reported = false;
        }
    }

    fn forward(&mut self, event: WindowEvent) {
        let now = Instant::now();
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let size = self.window.inner_size();
                let (x, y) = window_to_ndc(position.x, position.y, size.width, size.height);
                self.engine.handle_event(EngineEvent::Pointer { x, y }, now);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let step = match delta {
                    MouseScrollDelta::LineDelta(_, lines) => -lines * SCROLL_PER_LINE,
                    MouseScrollDelta::PixelDelta(position) => {
                        -(position.y as f32) / SCROLL_PAGE_PIXELS
                    }
                };
                self.scroll = (self.scroll + step).clamp(0.0, 1.0);
                self.engine.handle_event(EngineEvent::Scroll(self.scroll), now);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                let links = self.engine.links().len();
                if links > 0 {
                    let index = self.next_pulse % links;
                    self.next_pulse = self.next_pulse.wrapping_add(1);
                    self.engine.trigger_pulse(index);
                }
            }
            WindowEvent::Resized(physical) => {
                if let Some(backend) = self.engine.backend_mut() {
                    backend.resize_surface(SurfaceSize::new(physical.width, physical.height));
                }
                let logical = logical_size(physical, self.scale_factor);
                self.engine.handle_event(EngineEvent::Resize(logical), now);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
            }
            WindowEvent::Occluded(occluded) => {
                self.engine
                    .handle_event(EngineEvent::Visibility(!occluded), now);
            }
            WindowEvent::ThemeChanged(theme) => {
                self.engine
                    .handle_event(EngineEvent::Theme(map_theme(theme)), now);
            }
            _ => {}
        }
    }

    /// Hosts without an explicit restore signal retry once per interval.
    fn maybe_restore(&mut self) {
        if self.engine.state() != EngineState::ContextLost {
            return;
        }
        let now = Instant::now();
        let due = self
            .last_restore_attempt
            .map_or(true, |last| now.saturating_duration_since(last) >= RESTORE_INTERVAL);
        if due {
            self.last_restore_attempt = Some(now);
            self.engine.handle_event(EngineEvent::ContextRestored, now);
            self.window.request_redraw();
        }
    }
}

fn logical_size(physical: PhysicalSize<u32>, scale_factor: f64) -> SurfaceSize {
    let logical: LogicalSize<u32> = physical.to_logical(scale_factor);
    SurfaceSize::new(logical.width, logical.height)
}

fn map_theme(theme: winit::window::Theme) -> Theme {
    match theme {
        winit::window::Theme::Light => Theme::Light,
        winit::window::Theme::Dark => Theme::Dark,
    }
}
