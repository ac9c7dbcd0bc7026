//! Renderer crate for heroglyph, the adaptive hero visualization.
//!
//! The crate turns a shader set, a performance governor and a stream of host
//! events into frames. The overall flow is:
//!
//! ```text
//!   host (winit preview / headless soak)
//!          │ EngineEvent, tick(now)
//!          ▼
//!   HeroEngine ──▶ SceneManager ──▶ GpuBackend ──▶ wgpu | headless
//!          │              ▲
//!          │              └── field + links (sized by RenderSettings)
//!          └─▶ PerformanceGovernor ──▶ PerformanceSample subscribers
//! ```
//!
//! `HeroEngine` owns the state machine and every subscription it holds on the
//! host; `SceneManager` owns every GPU handle and is the only writer of GPU
//! buffers. Backends implement [`GpuBackend`], so the engine runs unchanged
//! against a real device or the bookkeeping-only [`HeadlessBackend`].

mod backend;
mod camera;
mod error;
mod field;
mod geometry;
mod gpu;
mod headless;
mod input;
mod lifecycle;
mod links;
mod listeners;
mod postprocess;
mod runtime;
mod scene;
mod types;
mod uniforms;
mod window;

pub use backend::GpuBackend;
pub use camera::Camera;
pub use error::{BackendError, EngineError};
pub use field::{generate_field, FieldLayout, Particle};
pub use gpu::WgpuBackend;
pub use headless::{HeadlessBackend, HeadlessStats};
pub use input::{window_to_ndc, InputState, SMOOTHING_FACTOR};
pub use lifecycle::{EngineOptions, HeroEngine, TickReport};
pub use links::{build_links, Link, DEFAULT_LINK_THRESHOLD, MAX_SCAN_PARTICLES};
pub use listeners::{ListenerHandle, ListenerKind, ListenerRegistry};
pub use postprocess::PostProcessing;
pub use runtime::{
    time_source_for, BoxedTimeSource, FixedTimeSource, FrameScheduler, MonotonicClock,
    TimeSample, TimeSource,
};
pub use scene::{BaseHandles, ContentHandles, SceneManager, SceneParams, SIMPLE_BACKGROUND_SCALE};
pub use types::{
    BlendMode, BloomParams, BufferUsage, Composite, DrawCall, EngineEvent, EngineState,
    FallbackGradient, FramePlan, GpuHandle, InstanceRange, MaterialDescriptor, MaterialKind,
    Presentation, ResourceKind, SurfaceSize,
};
pub use uniforms::{
    BackgroundUniforms, GeometryVertex, LinkInstance, LinkUniforms, ParticleInstance,
    ParticleUniforms, SceneUniforms, LINK_INTENSITY_SCALE,
};
pub use window::{run_preview, PreviewOptions};
