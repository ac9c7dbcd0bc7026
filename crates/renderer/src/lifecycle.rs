//! Lifecycle & recovery controller.
//!
//! [`HeroEngine`] owns the governor, the scene, the listener registry and the
//! pending shader load, and walks the state machine
//!
//! ```text
//! Uninitialized -> Initializing -> Running <-> Paused
//!                       |             |          |
//!                       +------> ContextLost <---+
//!                                     |
//!                                     +--> Initializing (restore)
//! ```
//!
//! plus a terminal `Fallback` state for failures that leave no GPU path.
//! `destroy()` is reachable from everywhere and is idempotent. Hosts drive the
//! engine with [`HeroEngine::tick`] once per display refresh and forward
//! input through [`HeroEngine::handle_event`].

use std::sync::Arc;
use std::time::Instant;

use heroconfig::{HeroConfig, LoadStrategy, Theme, ThemePalette, Themes, VisualMode};
use perfgov::{PerformanceGovernor, PerformanceSample, PerformanceSubscription};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shaderpack::{ShaderFetcher, ShaderSet};
use tracing::{debug, error, info, warn};

use crate::backend::GpuBackend;
use crate::error::{BackendError, EngineError};
use crate::field::{generate_field, FieldLayout, Particle};
use crate::input::InputState;
use crate::links::{build_links, Link, DEFAULT_LINK_THRESHOLD};
use crate::listeners::{ListenerHandle, ListenerKind, ListenerRegistry};
use crate::runtime::{time_source_for, BoxedTimeSource, FrameScheduler, ShaderFuture};
use crate::scene::{SceneManager, SceneParams};
use crate::types::{
    BloomParams, EngineEvent, EngineState, FallbackGradient, Presentation, SurfaceSize,
};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub theme: Theme,
    pub mode: VisualMode,
    pub intensity: f32,
    pub reduced_motion: bool,
    pub device_pixel_ratio: f32,
    /// Logical viewport size.
    pub viewport: SurfaceSize,
    pub load_strategy: LoadStrategy,
    pub field: FieldLayout,
    pub bloom: BloomParams,
    pub link_threshold: f32,
    pub themes: Themes,
    /// Fixed seed for field generation; entropy when `None`.
    pub seed: Option<u64>,
}

impl EngineOptions {
    pub fn from_config(config: &HeroConfig, viewport: SurfaceSize, device_pixel_ratio: f32) -> Self {
        let mode = config.scene.mode;
        Self {
            theme: config.scene.theme,
            mode,
            intensity: config.scene.intensity,
            reduced_motion: config.scene.reduced_motion,
            device_pixel_ratio,
            viewport,
            load_strategy: config.shaders.strategy,
            field: FieldLayout::from_settings(&config.field, mode),
            bloom: config.bloom.into(),
            link_threshold: config.scene.link_threshold,
            themes: config.themes,
            seed: config.field.seed,
        }
    }

    pub fn palette(&self) -> ThemePalette {
        self.themes.palette(self.theme)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            mode: VisualMode::default(),
            intensity: 0.8,
            reduced_motion: false,
            device_pixel_ratio: 1.0,
            viewport: SurfaceSize::new(1280, 720),
            load_strategy: LoadStrategy::default(),
            field: FieldLayout::default(),
            bloom: BloomParams::default(),
            link_threshold: DEFAULT_LINK_THRESHOLD,
            themes: Themes::default(),
            seed: None,
        }
    }
}

/// What a single [`HeroEngine::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickReport {
    pub rendered: bool,
    /// Set when the governor closed a measurement window on this tick.
    pub sample: Option<PerformanceSample>,
}

pub struct HeroEngine<B: GpuBackend> {
    backend: Option<B>,
    governor: PerformanceGovernor,
    fetcher: Arc<dyn ShaderFetcher>,
    options: EngineOptions,
    state: EngineState,
    presentation: Presentation,
    scene: Option<SceneManager>,
    pending: Option<ShaderFuture>,
    particles: Vec<Particle>,
    links: Vec<Link>,
    input: InputState,
    clock: BoxedTimeSource,
    scheduler: FrameScheduler,
    listeners: ListenerRegistry,
    listener_handles: Vec<ListenerHandle>,
    visible: bool,
    resume_pending: bool,
    rng: StdRng,
    last_error: Option<EngineError>,
}

impl<B: GpuBackend> HeroEngine<B> {
    /// Starts the engine. Never fails: a missing backend or a broken shader
    /// pipeline resolves to the static fallback presentation.
    pub fn launch(
        backend: Result<B, BackendError>,
        governor: PerformanceGovernor,
        fetcher: Arc<dyn ShaderFetcher>,
        options: EngineOptions,
        now: Instant,
    ) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (backend, failure) = match backend {
            Ok(backend) => (Some(backend), None),
            Err(err) => (None, Some(err)),
        };

        let mut engine = Self {
            backend,
            governor,
            fetcher,
            clock: time_source_for(options.reduced_motion),
            options,
            state: EngineState::Uninitialized,
            presentation: Presentation::Blank,
            scene: None,
            pending: None,
            particles: Vec::new(),
            links: Vec::new(),
            input: InputState::new(),
            scheduler: FrameScheduler::new(),
            listeners: ListenerRegistry::new(),
            listener_handles: Vec::new(),
            visible: true,
            resume_pending: false,
            rng,
            last_error: None,
        };

        for kind in ListenerKind::HOST {
            let handle = engine.listeners.register(kind);
            engine.listener_handles.push(handle);
        }
        let handle = engine.listeners.register(ListenerKind::Performance);
        engine.listener_handles.push(handle);

        if let Some(err) = failure {
            warn!(error = %err, "no usable graphics backend");
            engine.enter_fallback(EngineError::UnsupportedPlatform(err));
            return engine;
        }

        if let Some(backend) = engine.backend.as_ref() {
            let probe = backend.probe_capability();
            engine.governor.detect_capability(probe);
        }
        engine.start_pipeline(now);
        engine
    }

    /// Advances the engine by one display refresh.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        match self.state {
            EngineState::Initializing => {
                self.poll_loader(now);
                TickReport::default()
            }
            EngineState::Running => self.render_frame(now),
            _ => TickReport::default(),
        }
    }

    /// Routes a host event. Events whose listener has been released are
    /// ignored.
    pub fn handle_event(&mut self, event: EngineEvent, now: Instant) {
        if !self.listeners.accepts(&event) {
            debug!(?event, "event ignored; no listener registered");
            return;
        }
        match event {
            EngineEvent::Pointer { x, y } => self.input.set_pointer(x, y),
            EngineEvent::Scroll(fraction) => self.input.set_scroll(fraction),
            EngineEvent::Visibility(visible) => self.set_visible(visible),
            EngineEvent::Resize(size) => self.resize(size),
            EngineEvent::Theme(theme) => self.set_theme(theme),
            EngineEvent::ContextLost => self.enter_context_lost(),
            EngineEvent::ContextRestored => self.restore(now),
        }
    }

    /// Recolours the scene (or the fallback gradient) in place.
    pub fn set_theme(&mut self, theme: Theme) {
        if self.state == EngineState::Destroyed {
            return;
        }
        self.options.theme = theme;
        let palette = self.options.palette();
        if let Presentation::Fallback(_) = self.presentation {
            self.presentation = Presentation::Fallback(FallbackGradient::for_palette(&palette));
        }
        if let (Some(backend), Some(scene)) = (self.backend.as_mut(), self.scene.as_mut()) {
            if let Err(err) = scene.set_theme(backend, palette) {
                self.on_backend_error(err);
                return;
            }
        }
        debug!(?theme, "theme applied");
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        if self.state == EngineState::Destroyed {
            return;
        }
        if intensity.is_finite() {
            self.options.intensity = intensity.max(0.0);
        }
        if let (Some(backend), Some(scene)) = (self.backend.as_mut(), self.scene.as_mut()) {
            if let Err(err) = scene.set_intensity(backend, intensity) {
                self.on_backend_error(err);
            }
        }
    }

    /// Applies a new logical viewport; zero sizes are ignored.
    pub fn resize(&mut self, viewport: SurfaceSize) {
        if viewport.is_empty() || self.state == EngineState::Destroyed {
            return;
        }
        self.options.viewport = viewport;
        if let (Some(backend), Some(scene)) = (self.backend.as_mut(), self.scene.as_mut()) {
            if let Err(err) = scene.resize(backend, viewport) {
                self.on_backend_error(err);
            }
        }
    }

    /// Restarts the pulse animation of one link. Returns `false` when the
    /// index is out of range or nothing is rendered yet.
    pub fn trigger_pulse(&mut self, link_index: usize) -> bool {
        let (Some(backend), Some(scene)) = (self.backend.as_mut(), self.scene.as_mut()) else {
            return false;
        };
        match scene.trigger_pulse(backend, link_index, &self.links) {
            Ok(applied) => applied,
            Err(err) => {
                self.on_backend_error(err);
                false
            }
        }
    }

    pub fn subscribe_performance(&mut self) -> PerformanceSubscription {
        self.governor.subscribe()
    }

    pub fn unsubscribe_performance(&mut self, id: u64) -> bool {
        self.governor.unsubscribe(id)
    }

    /// Releases the listener of `kind`; later events of that kind are ignored.
    pub fn detach_listener(&mut self, kind: ListenerKind) -> bool {
        let Some(index) = self.listener_handles.iter().position(|h| h.kind == kind) else {
            return false;
        };
        let handle = self.listener_handles.swap_remove(index);
        self.listeners.unregister(handle)
    }

    /// Unregisters every listener, releases every resource and stops frame
    /// scheduling. Safe to call more than once.
    pub fn destroy(&mut self) {
        if self.state == EngineState::Destroyed {
            return;
        }
        let listeners = self.listeners.clear();
        self.listener_handles.clear();
        if let Some(scene) = self.scene.take() {
            match self.backend.as_mut() {
                Some(backend) if !backend.is_lost() => scene.dispose(backend),
                _ => scene.abandon(),
            }
        }
        self.pending = None;
        self.scheduler.cancel();
        self.governor.clear_subscribers();
        self.particles.clear();
        self.links.clear();
        self.transition(EngineState::Destroyed);
        info!(listeners, "engine destroyed");
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    pub fn wants_frame(&self) -> bool {
        self.scheduler.wants_frame() || self.state == EngineState::Initializing
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.backend.as_mut()
    }

    pub fn governor(&self) -> &PerformanceGovernor {
        &self.governor
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn scene(&self) -> Option<&SceneManager> {
        self.scene.as_ref()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    fn start_pipeline(&mut self, now: Instant) {
        self.transition(EngineState::Initializing);
        self.pending = Some(ShaderFuture::start(
            self.options.load_strategy,
            Arc::clone(&self.fetcher),
        ));

        let settings = self.governor.recommended_settings(self.options.device_pixel_ratio);
        let params = SceneParams {
            mode: self.options.mode,
            viewport: self.options.viewport,
            pixel_ratio: settings.pixel_ratio,
            palette: self.options.palette(),
            intensity: self.options.intensity,
            reduced_motion: self.options.reduced_motion,
            complex_shaders: settings.enable_complex_shaders,
            bloom: self.options.bloom,
        };
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        match SceneManager::new(backend, params) {
            Ok(scene) => self.scene = Some(scene),
            Err(err) => {
                self.on_backend_error(err);
                return;
            }
        }

        if self.options.load_strategy == LoadStrategy::Immediate {
            self.poll_loader(now);
        }
    }

    fn poll_loader(&mut self, now: Instant) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        match pending.poll() {
            Ok(None) => {}
            Ok(Some(shaders)) => {
                self.pending = None;
                self.finish_initialization(&shaders, now);
            }
            Err(err) => {
                self.pending = None;
                error!(error = %err, "shader pipeline unavailable; presenting static fallback");
                self.enter_fallback(err);
            }
        }
    }

    fn finish_initialization(&mut self, shaders: &ShaderSet, now: Instant) {
        let settings = self.governor.recommended_settings(self.options.device_pixel_ratio);
        let particles = generate_field(
            settings.particle_count as usize,
            &self.options.field,
            &mut self.rng,
        );
        let links = build_links(
            &particles,
            settings.link_count as usize,
            self.options.link_threshold,
            &mut self.rng,
        );

        let (Some(backend), Some(scene)) = (self.backend.as_mut(), self.scene.as_mut()) else {
            return;
        };
        if let Err(err) =
            scene.install_content(backend, shaders, &particles, &links, settings.enable_bloom)
        {
            self.on_backend_error(err);
            return;
        }
        info!(
            particles = particles.len(),
            links = links.len(),
            quality = self.governor.quality(),
            bloom = settings.enable_bloom,
            "scene ready"
        );
        self.particles = particles;
        self.links = links;
        self.presentation = Presentation::Canvas;
        self.governor.reset_window(now);
        if self.visible {
            self.scheduler.start();
            self.transition(EngineState::Running);
        } else {
            self.transition(EngineState::Paused);
        }
    }

    fn render_frame(&mut self, now: Instant) -> TickReport {
        if self.resume_pending {
            self.resume_pending = false;
            self.governor.reset_window(now);
        }

        let mut report = TickReport {
            rendered: false,
            sample: self.governor.tick(now),
        };
        if report.sample.is_some() && self.listeners.is_registered(ListenerKind::Performance) {
            let settings = self.governor.recommended_settings(self.options.device_pixel_ratio);
            if let (Some(backend), Some(scene)) = (self.backend.as_mut(), self.scene.as_mut()) {
                if let Err(err) = scene.apply_settings(backend, &settings) {
                    self.on_backend_error(err);
                    return report;
                }
            }
        }

        self.input.advance();
        let time = self.clock.sample(now).seconds;
        let (Some(backend), Some(scene)) = (self.backend.as_mut(), self.scene.as_mut()) else {
            return report;
        };
        match scene.render(backend, time, self.input.pointer(), self.input.scroll()) {
            Ok(()) => {
                self.governor.record_frame();
                self.scheduler.mark_requested();
                report.rendered = true;
            }
            Err(err) => self.on_backend_error(err),
        }
        report
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        match (self.state, visible) {
            (EngineState::Running, false) => {
                self.scheduler.cancel();
                self.transition(EngineState::Paused);
            }
            (EngineState::Paused, true) => {
                self.resume_pending = true;
                self.scheduler.start();
                self.transition(EngineState::Running);
            }
            _ => {}
        }
    }

    fn on_backend_error(&mut self, err: BackendError) {
        if err.is_context_lost() {
            self.enter_context_lost();
            return;
        }
        match self.state {
            EngineState::Initializing => self.enter_fallback(EngineError::from(err)),
            _ => warn!(error = %err, state = ?self.state, "backend call failed"),
        }
    }

    fn enter_context_lost(&mut self) {
        if !matches!(
            self.state,
            EngineState::Initializing | EngineState::Running | EngineState::Paused
        ) {
            return;
        }
        warn!(state = ?self.state, "graphics context lost; presenting static fallback");
        if let Some(backend) = self.backend.as_mut() {
            backend.context_lost();
        }
        if let Some(scene) = self.scene.take() {
            scene.abandon();
        }
        self.pending = None;
        self.scheduler.cancel();
        self.presentation =
            Presentation::Fallback(FallbackGradient::for_palette(&self.options.palette()));
        self.last_error = Some(EngineError::ContextLost);
        self.transition(EngineState::ContextLost);
    }

    fn restore(&mut self, now: Instant) {
        if self.state != EngineState::ContextLost {
            return;
        }
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if let Err(err) = backend.restore() {
            warn!(error = %err, "context restore failed; staying on fallback");
            return;
        }
        info!("graphics context restored; rebuilding scene");
        self.particles.clear();
        self.links.clear();
        self.clock.reset();
        self.start_pipeline(now);
    }

    fn enter_fallback(&mut self, err: EngineError) {
        warn!(error = %err, "falling back to static presentation");
        if let Some(scene) = self.scene.take() {
            match self.backend.as_mut() {
                Some(backend) if !backend.is_lost() => scene.dispose(backend),
                _ => scene.abandon(),
            }
        }
        self.pending = None;
        self.scheduler.cancel();
        self.presentation =
            Presentation::Fallback(FallbackGradient::for_palette(&self.options.palette()));
        self.last_error = Some(err);
        self.transition(EngineState::Fallback);
    }

    fn transition(&mut self, next: EngineState) {
        if self.state == next {
            return;
        }
        info!(from = ?self.state, to = ?next, "engine state changed");
        self.state = next;
    }
}

impl<B: GpuBackend> Drop for HeroEngine<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heroconfig::GovernorSettings;
    use shaderpack::MemoryFetcher;

    use crate::headless::HeadlessBackend;

    fn fetcher() -> Arc<dyn ShaderFetcher> {
        let source = "#version 450\nvoid main() {}\n";
        Arc::new(
            MemoryFetcher::new()
                .with("background.vert", source)
                .with("background.frag", source)
                .with("particles.vert", source)
                .with("particles.frag", source)
                .with("links.vert", source)
                .with("links.frag", source)
                .with("noise.glsl", "float noise(vec3 p) { return 0.0; }\n"),
        )
    }

    fn options() -> EngineOptions {
        EngineOptions {
            load_strategy: LoadStrategy::Immediate,
            seed: Some(7),
            ..EngineOptions::default()
        }
    }

    #[test]
    fn immediate_launch_reaches_running() {
        let now = Instant::now();
        let engine = HeroEngine::launch(
            Ok(HeadlessBackend::new(SurfaceSize::new(1280, 720))),
            PerformanceGovernor::new(GovernorSettings::default(), now),
            fetcher(),
            options(),
            now,
        );
        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.presentation(), Presentation::Canvas);
        assert_eq!(engine.particles().len(), 100);
        assert!(engine.wants_frame());
        assert_eq!(engine.listeners().len(), 8);
    }

    #[test]
    fn missing_backend_falls_back() {
        let now = Instant::now();
        let engine: HeroEngine<HeadlessBackend> = HeroEngine::launch(
            Err(BackendError::Unsupported("no adapter".into())),
            PerformanceGovernor::new(GovernorSettings::default(), now),
            fetcher(),
            options(),
            now,
        );
        assert_eq!(engine.state(), EngineState::Fallback);
        assert!(matches!(
            engine.last_error(),
            Some(EngineError::UnsupportedPlatform(_))
        ));
        assert!(matches!(engine.presentation(), Presentation::Fallback(_)));
    }
}
