//! Scene & resource management.
//!
//! [`SceneManager`] is the only component that writes GPU buffers. It owns
//! handles for every resource it creates and borrows the backend per call, so
//! the lifecycle controller can abandon the whole set after a context loss
//! without a single API call.

use heroconfig::{ThemePalette, VisualMode};
use perfgov::RenderSettings;
use shaderpack::ShaderSet;
use tracing::{debug, warn};

use crate::backend::GpuBackend;
use crate::camera::Camera;
use crate::error::BackendError;
use crate::field::Particle;
use crate::geometry;
use crate::links::Link;
use crate::postprocess::PostProcessing;
use crate::types::{
    BlendMode, BloomParams, BufferUsage, DrawCall, FramePlan, GpuHandle, InstanceRange,
    MaterialDescriptor, MaterialKind, SurfaceSize,
};
use crate::uniforms::{
    BackgroundUniforms, LinkInstance, LinkUniforms, ParticleInstance, ParticleUniforms,
    SceneUniforms,
};

/// Background intensity multiplier while complex shaders are disabled.
pub const SIMPLE_BACKGROUND_SCALE: f32 = 0.7;
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneParams {
    pub mode: VisualMode,
    /// Logical viewport size; the render target is this times `pixel_ratio`.
    pub viewport: SurfaceSize,
    pub pixel_ratio: f32,
    pub palette: ThemePalette,
    pub intensity: f32,
    pub reduced_motion: bool,
    pub complex_shaders: bool,
    pub bloom: BloomParams,
}

/// Handles allocated when the scene is first set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseHandles {
    pub render_target: GpuHandle,
    pub scene_uniforms: GpuHandle,
    pub background_uniforms: GpuHandle,
    pub particle_uniforms: GpuHandle,
    pub link_uniforms: GpuHandle,
    pub background_geometry: GpuHandle,
    pub particle_geometry: GpuHandle,
    pub link_geometry: GpuHandle,
}

impl BaseHandles {
    fn all(&self) -> [GpuHandle; 8] {
        [
            self.render_target,
            self.scene_uniforms,
            self.background_uniforms,
            self.particle_uniforms,
            self.link_uniforms,
            self.background_geometry,
            self.particle_geometry,
            self.link_geometry,
        ]
    }
}

/// Handles allocated once shaders and field data are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentHandles {
    pub background_material: GpuHandle,
    pub particle_material: GpuHandle,
    pub link_material: GpuHandle,
    pub particle_instances: Option<GpuHandle>,
    pub link_instances: Option<GpuHandle>,
}

impl ContentHandles {
    fn all(&self) -> impl Iterator<Item = GpuHandle> {
        [
            Some(self.background_material),
            Some(self.particle_material),
            Some(self.link_material),
            self.particle_instances,
            self.link_instances,
        ]
        .into_iter()
        .flatten()
    }
}

pub struct SceneManager {
    camera: Camera,
    viewport: SurfaceSize,
    pixel_ratio: f32,
    palette: ThemePalette,
    intensity: f32,
    complex_shaders: bool,
    scene: SceneUniforms,
    background: BackgroundUniforms,
    particle: ParticleUniforms,
    link: LinkUniforms,
    base: BaseHandles,
    content: Option<ContentHandles>,
    particle_count: u32,
    link_count: u32,
    post: PostProcessing,
}

impl SceneManager {
    /// Creates the camera, render target, uniform buffers and base geometry.
    pub fn new<B: GpuBackend>(backend: &mut B, params: SceneParams) -> Result<Self, BackendError> {
        let camera = Camera::for_mode(params.mode, params.viewport.aspect());
        let target_size = params.viewport.scaled(params.pixel_ratio);

        let scene = SceneUniforms::new(
            camera.view_projection(),
            target_size.width as f32,
            target_size.height as f32,
        );
        let mut background = BackgroundUniforms::new(
            params.palette.primary,
            params.palette.secondary,
            params.intensity,
            params.reduced_motion,
        );
        background.set_complexity(params.complex_shaders);
        background.set_intensity(background_intensity(params.intensity, params.complex_shaders));
        let particle =
            ParticleUniforms::new(params.palette.accent, params.intensity, params.reduced_motion);
        let link = LinkUniforms::new(params.palette.link, params.intensity, params.reduced_motion);

        let mut created = Vec::with_capacity(8);
        let base = match create_base(
            backend,
            target_size,
            [
                bytemuck::bytes_of(&scene),
                bytemuck::bytes_of(&background),
                bytemuck::bytes_of(&particle),
                bytemuck::bytes_of(&link),
            ],
            &mut created,
        ) {
            Ok(base) => base,
            Err(err) => {
                unwind(backend, created, &err);
                return Err(err);
            }
        };
        debug!(
            render_target = %base.render_target,
            width = target_size.width,
            height = target_size.height,
            mode = ?params.mode,
            "scene base resources created"
        );

        Ok(Self {
            camera,
            viewport: params.viewport,
            pixel_ratio: params.pixel_ratio,
            palette: params.palette,
            intensity: params.intensity,
            complex_shaders: params.complex_shaders,
            scene,
            background,
            particle,
            link,
            base,
            content: None,
            particle_count: 0,
            link_count: 0,
            post: PostProcessing::new(params.bloom),
        })
    }

    /// Compiles materials, uploads the instance data and builds the optional
    /// bloom chain.
    pub fn install_content<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        shaders: &ShaderSet,
        particles: &[Particle],
        links: &[Link],
        enable_bloom: bool,
    ) -> Result<(), BackendError> {
        if let Some(previous) = self.content.take() {
            release_all(backend, previous.all());
        }

        let mut created = Vec::with_capacity(5);
        let content = match self.create_content(backend, shaders, particles, links, &mut created) {
            Ok(content) => content,
            Err(err) => {
                unwind(backend, created, &err);
                return Err(err);
            }
        };
        self.content = Some(content);
        self.particle_count = particles.len() as u32;
        self.link_count = links.len() as u32;
        self.post
            .set_enabled(backend, self.base.render_target, enable_bloom)?;

        debug!(
            particles = self.particle_count,
            links = self.link_count,
            bloom = self.post.is_active(),
            "scene content installed"
        );
        Ok(())
    }

    fn create_content<B: GpuBackend>(
        &self,
        backend: &mut B,
        shaders: &ShaderSet,
        particles: &[Particle],
        links: &[Link],
        created: &mut Vec<GpuHandle>,
    ) -> Result<ContentHandles, BackendError> {
        let background_material = track(
            created,
            backend.create_material(&MaterialDescriptor {
                kind: MaterialKind::Background,
                vertex_source: &shaders.background.vertex,
                fragment_source: &shaders.background.fragment,
                scene_uniforms: self.base.scene_uniforms,
                material_uniforms: self.base.background_uniforms,
                blend: BlendMode::Alpha,
            }),
        )?;
        let particle_material = track(
            created,
            backend.create_material(&MaterialDescriptor {
                kind: MaterialKind::Particles,
                vertex_source: &shaders.particles.vertex,
                fragment_source: &shaders.particles.fragment,
                scene_uniforms: self.base.scene_uniforms,
                material_uniforms: self.base.particle_uniforms,
                blend: BlendMode::Additive,
            }),
        )?;
        let link_material = track(
            created,
            backend.create_material(&MaterialDescriptor {
                kind: MaterialKind::Links,
                vertex_source: &shaders.links.vertex,
                fragment_source: &shaders.links.fragment,
                scene_uniforms: self.base.scene_uniforms,
                material_uniforms: self.base.link_uniforms,
                blend: BlendMode::Additive,
            }),
        )?;

        let particle_instances = if particles.is_empty() {
            None
        } else {
            let data: Vec<ParticleInstance> = particles.iter().map(ParticleInstance::from).collect();
            Some(track(
                created,
                backend.create_buffer(
                    BufferUsage::Instance,
                    "particle instances",
                    bytemuck::cast_slice(&data),
                ),
            )?)
        };
        let link_instances = if links.is_empty() {
            None
        } else {
            let data: Vec<LinkInstance> = links.iter().map(LinkInstance::from).collect();
            Some(track(
                created,
                backend.create_buffer(
                    BufferUsage::Instance,
                    "link instances",
                    bytemuck::cast_slice(&data),
                ),
            )?)
        };

        Ok(ContentHandles {
            background_material,
            particle_material,
            link_material,
            particle_instances,
            link_instances,
        })
    }

    /// Rewrites the colour uniforms in place.
    pub fn set_theme<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        palette: ThemePalette,
    ) -> Result<(), BackendError> {
        self.palette = palette;
        self.background.set_colors(palette.primary, palette.secondary);
        self.particle.set_color(palette.accent);
        self.link.set_color(palette.link);
        self.write_material_uniforms(backend)
    }

    pub fn set_intensity<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        intensity: f32,
    ) -> Result<(), BackendError> {
        let intensity = if intensity.is_finite() {
            intensity.max(0.0)
        } else {
            self.intensity
        };
        self.intensity = intensity;
        self.background
            .set_intensity(background_intensity(intensity, self.complex_shaders));
        self.particle.set_intensity(intensity);
        self.link.set_intensity(intensity);
        self.write_material_uniforms(backend)
    }

    /// Applies a new logical viewport. Zero sizes and unchanged sizes are
    /// ignored; returns whether anything was resized.
    pub fn resize<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        viewport: SurfaceSize,
    ) -> Result<bool, BackendError> {
        if viewport.is_empty() || viewport == self.viewport {
            return Ok(false);
        }
        self.viewport = viewport;
        self.camera.set_aspect(viewport.aspect());
        self.resize_target(backend)?;
        debug!(
            width = viewport.width,
            height = viewport.height,
            "scene resized"
        );
        Ok(true)
    }

    /// Follows a governor sample: complexity flag, pixel ratio and bloom.
    pub fn apply_settings<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        settings: &RenderSettings,
    ) -> Result<(), BackendError> {
        if settings.enable_complex_shaders != self.complex_shaders {
            self.complex_shaders = settings.enable_complex_shaders;
            self.background.set_complexity(self.complex_shaders);
            self.background
                .set_intensity(background_intensity(self.intensity, self.complex_shaders));
            backend.write_buffer(
                self.base.background_uniforms,
                0,
                bytemuck::bytes_of(&self.background),
            )?;
        }

        if (settings.pixel_ratio - self.pixel_ratio).abs() > f32::EPSILON {
            self.pixel_ratio = settings.pixel_ratio;
            self.resize_target(backend)?;
        }

        if self.content.is_some() {
            self.post
                .set_enabled(backend, self.base.render_target, settings.enable_bloom)?;
        }
        Ok(())
    }

    /// Restarts one link's pulse by rewriting its instance slice.
    /// Returns `false` for an index outside the current link set.
    pub fn trigger_pulse<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        link_index: usize,
        links: &[Link],
    ) -> Result<bool, BackendError> {
        let Some(buffer) = self.content.and_then(|content| content.link_instances) else {
            return Ok(false);
        };
        let Some(link) = links.get(link_index) else {
            return Ok(false);
        };
        let mut instance = LinkInstance::from(link);
        instance.pulse = 0.0;
        let offset = (link_index * std::mem::size_of::<LinkInstance>()) as u64;
        backend.write_buffer(buffer, offset, bytemuck::bytes_of(&instance))?;
        Ok(true)
    }

    /// Writes per-frame uniforms and submits the frame.
    pub fn render<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        time: f32,
        pointer: [f32; 2],
        scroll: f32,
    ) -> Result<(), BackendError> {
        let Some(content) = self.content else {
            return Ok(());
        };

        self.scene.set_view_proj(self.camera.view_projection());
        self.scene.set_time(time);
        self.scene.set_scroll(scroll);
        self.particle.set_mouse(pointer);
        backend.write_buffer(self.base.scene_uniforms, 0, bytemuck::bytes_of(&self.scene))?;
        backend.write_buffer(
            self.base.particle_uniforms,
            0,
            bytemuck::bytes_of(&self.particle),
        )?;

        let draws = self.draw_calls(&content);
        backend.render(&FramePlan {
            target: self.base.render_target,
            clear_color: CLEAR_COLOR,
            draws: &draws,
            composite: self.post.composite(),
        })
    }

    fn draw_calls(&self, content: &ContentHandles) -> Vec<DrawCall> {
        let mut draws = Vec::with_capacity(3);
        draws.push(DrawCall {
            material: content.background_material,
            geometry: self.base.background_geometry,
            vertex_count: geometry::PLANE_VERTEX_COUNT,
            instances: None,
        });
        if let Some(buffer) = content.particle_instances {
            draws.push(DrawCall {
                material: content.particle_material,
                geometry: self.base.particle_geometry,
                vertex_count: geometry::PARTICLE_SEGMENTS * 3,
                instances: Some(InstanceRange {
                    buffer,
                    count: self.particle_count,
                }),
            });
        }
        if let Some(buffer) = content.link_instances {
            draws.push(DrawCall {
                material: content.link_material,
                geometry: self.base.link_geometry,
                vertex_count: geometry::PLANE_VERTEX_COUNT,
                instances: Some(InstanceRange {
                    buffer,
                    count: self.link_count,
                }),
            });
        }
        draws
    }

    /// Releases every handle this scene owns.
    pub fn dispose<B: GpuBackend>(mut self, backend: &mut B) {
        if let Err(err) = self.post.dispose(backend) {
            warn!(error = %err, "failed to release bloom chain");
        }
        if let Some(content) = self.content.take() {
            release_all(backend, content.all());
        }
        release_all(backend, self.base.all());
    }

    /// Drops every handle without touching the backend; used once the
    /// context is already gone.
    pub fn abandon(mut self) {
        self.post.abandon();
        self.content = None;
        debug!("scene resources abandoned");
    }

    pub fn base_handles(&self) -> BaseHandles {
        self.base
    }

    pub fn content_handles(&self) -> Option<ContentHandles> {
        self.content
    }

    pub fn bloom_handle(&self) -> Option<GpuHandle> {
        self.post.handle()
    }

    pub fn is_ready(&self) -> bool {
        self.content.is_some()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn viewport(&self) -> SurfaceSize {
        self.viewport
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn target_size(&self) -> SurfaceSize {
        self.viewport.scaled(self.pixel_ratio)
    }

    pub fn palette(&self) -> ThemePalette {
        self.palette
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn complex_shaders(&self) -> bool {
        self.complex_shaders
    }

    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    pub fn link_count(&self) -> u32 {
        self.link_count
    }

    fn resize_target<B: GpuBackend>(&mut self, backend: &mut B) -> Result<(), BackendError> {
        let size = self.target_size();
        backend.resize_render_target(self.base.render_target, size)?;
        self.post.resize(backend, size)?;
        self.scene
            .set_resolution(size.width as f32, size.height as f32);
        self.scene.set_view_proj(self.camera.view_projection());
        backend.write_buffer(self.base.scene_uniforms, 0, bytemuck::bytes_of(&self.scene))
    }

    fn write_material_uniforms<B: GpuBackend>(&self, backend: &mut B) -> Result<(), BackendError> {
        backend.write_buffer(
            self.base.background_uniforms,
            0,
            bytemuck::bytes_of(&self.background),
        )?;
        backend.write_buffer(
            self.base.particle_uniforms,
            0,
            bytemuck::bytes_of(&self.particle),
        )?;
        backend.write_buffer(self.base.link_uniforms, 0, bytemuck::bytes_of(&self.link))
    }
}

fn background_intensity(intensity: f32, complex: bool) -> f32 {
    if complex {
        intensity
    } else {
        intensity * SIMPLE_BACKGROUND_SCALE
    }
}

/// Allocates the render target, uniform blocks and base geometry, recording
/// each handle in `created` as it lands.
fn create_base<B: GpuBackend>(
    backend: &mut B,
    target_size: SurfaceSize,
    uniforms: [&[u8]; 4],
    created: &mut Vec<GpuHandle>,
) -> Result<BaseHandles, BackendError> {
    let [scene, background, particle, link] = uniforms;
    let render_target = track(created, backend.create_render_target(target_size))?;
    Ok(BaseHandles {
        render_target,
        scene_uniforms: track(
            created,
            backend.create_buffer(BufferUsage::Uniform, "scene uniforms", scene),
        )?,
        background_uniforms: track(
            created,
            backend.create_buffer(BufferUsage::Uniform, "background uniforms", background),
        )?,
        particle_uniforms: track(
            created,
            backend.create_buffer(BufferUsage::Uniform, "particle uniforms", particle),
        )?,
        link_uniforms: track(
            created,
            backend.create_buffer(BufferUsage::Uniform, "link uniforms", link),
        )?,
        background_geometry: track(
            created,
            backend.create_buffer(
                BufferUsage::Vertex,
                "background plane",
                bytemuck::cast_slice(&geometry::background_plane()),
            ),
        )?,
        particle_geometry: track(
            created,
            backend.create_buffer(
                BufferUsage::Vertex,
                "particle disc",
                bytemuck::cast_slice(&geometry::particle_disc()),
            ),
        )?,
        link_geometry: track(
            created,
            backend.create_buffer(
                BufferUsage::Vertex,
                "link strip",
                bytemuck::cast_slice(&geometry::link_strip()),
            ),
        )?,
    })
}

fn track(
    created: &mut Vec<GpuHandle>,
    result: Result<GpuHandle, BackendError>,
) -> Result<GpuHandle, BackendError> {
    let handle = result?;
    created.push(handle);
    Ok(handle)
}

/// Releases a partially built handle set. Nothing is released once the
/// context is gone; the backend has already forgotten those handles.
fn unwind<B: GpuBackend>(backend: &mut B, created: Vec<GpuHandle>, err: &BackendError) {
    if err.is_context_lost() {
        return;
    }
    debug!(handles = created.len(), error = %err, "releasing partially created resources");
    release_all(backend, created);
}

fn release_all<B: GpuBackend>(backend: &mut B, handles: impl IntoIterator<Item = GpuHandle>) {
    for handle in handles {
        if let Err(err) = backend.release(handle) {
            warn!(%handle, error = %err, "failed to release scene resource");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use crate::types::ResourceKind;
    use glam::Vec3;
    use shaderpack::ShaderProgram;

    fn params() -> SceneParams {
        SceneParams {
            mode: VisualMode::Glyph,
            viewport: SurfaceSize::new(800, 600),
            pixel_ratio: 1.0,
            palette: ThemePalette::LIGHT,
            intensity: 0.8,
            reduced_motion: false,
            complex_shaders: true,
            bloom: BloomParams::default(),
        }
    }

    fn shaders() -> ShaderSet {
        let program = || ShaderProgram {
            vertex: "#version 450\nvoid main() {}\n".into(),
            fragment: "#version 450\nvoid main() {}\n".into(),
        };
        ShaderSet {
            background: program(),
            particles: program(),
            links: program(),
        }
    }

    fn sample_data() -> (Vec<Particle>, Vec<Link>) {
        let particles = vec![
            Particle { position: Vec3::ZERO, activity: 1.0, phase: 0.0 },
            Particle { position: Vec3::X, activity: 0.5, phase: 1.0 },
        ];
        let links = vec![Link {
            a: 0,
            b: 1,
            start: Vec3::ZERO,
            end: Vec3::X,
            pulse_phase: 0.75,
        }];
        (particles, links)
    }

    fn ready_scene(backend: &mut HeadlessBackend, bloom: bool) -> (SceneManager, Vec<Link>) {
        let mut scene = SceneManager::new(backend, params()).unwrap();
        let (particles, links) = sample_data();
        scene
            .install_content(backend, &shaders(), &particles, &links, bloom)
            .unwrap();
        (scene, links)
    }

    fn read<T: bytemuck::Pod>(backend: &HeadlessBackend, handle: GpuHandle) -> T {
        bytemuck::pod_read_unaligned(backend.buffer_contents(handle).unwrap())
    }

    #[test]
    fn theme_swap_rewrites_uniforms_only() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(800, 600));
        let (mut scene, _) = ready_scene(&mut backend, false);
        let before = backend.handles();
        let created = backend.stats().buffers_created;

        scene.set_theme(&mut backend, ThemePalette::DARK).unwrap();

        assert_eq!(backend.handles(), before);
        assert_eq!(backend.stats().buffers_created, created);
        let particle: ParticleUniforms = read(&backend, scene.base_handles().particle_uniforms);
        assert_eq!(particle.color, ThemePalette::DARK.accent.with_alpha(1.0));
    }

    #[test]
    fn intensity_scales_links_and_simple_background() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(800, 600));
        let (mut scene, _) = ready_scene(&mut backend, false);
        scene.set_intensity(&mut backend, 0.5).unwrap();
        let link: LinkUniforms = read(&backend, scene.base_handles().link_uniforms);
        assert!((link.intensity - 0.3).abs() < 1e-6);

        let settings = RenderSettings {
            pixel_ratio: 1.0,
            particle_count: 40,
            link_count: 20,
            enable_bloom: false,
            enable_complex_shaders: false,
        };
        scene.apply_settings(&mut backend, &settings).unwrap();
        let background: BackgroundUniforms =
            read(&backend, scene.base_handles().background_uniforms);
        assert_eq!(background.complexity, 0.0);
        assert!((background.intensity - 0.35).abs() < 1e-6);
    }

    #[test]
    fn resize_is_idempotent_and_ignores_zero() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(800, 600));
        let (mut scene, _) = ready_scene(&mut backend, true);
        assert!(!scene.resize(&mut backend, SurfaceSize::new(0, 600)).unwrap());
        assert!(scene.resize(&mut backend, SurfaceSize::new(1024, 512)).unwrap());
        assert!(!scene.resize(&mut backend, SurfaceSize::new(1024, 512)).unwrap());

        let target = scene.base_handles().render_target;
        assert_eq!(backend.render_target_size(target), Some(SurfaceSize::new(1024, 512)));
        let (_, _, bloom_size) = backend.bloom_chain(scene.bloom_handle().unwrap()).unwrap();
        assert_eq!(bloom_size, SurfaceSize::new(1024, 512));
        let uniforms: SceneUniforms = read(&backend, scene.base_handles().scene_uniforms);
        assert_eq!(uniforms.resolution, [1024.0, 512.0]);
        assert!((scene.camera().aspect() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn bloom_flip_recreates_chain() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(800, 600));
        let (mut scene, _) = ready_scene(&mut backend, true);
        let first = scene.bloom_handle().unwrap();
        let mut settings = RenderSettings {
            pixel_ratio: 1.5,
            particle_count: 100,
            link_count: 50,
            enable_bloom: false,
            enable_complex_shaders: true,
        };
        scene.apply_settings(&mut backend, &settings).unwrap();
        assert!(scene.bloom_handle().is_none());
        assert_eq!(
            backend.render_target_size(scene.base_handles().render_target),
            Some(SurfaceSize::new(1200, 900))
        );
        settings.enable_bloom = true;
        scene.apply_settings(&mut backend, &settings).unwrap();
        assert_ne!(scene.bloom_handle(), Some(first));
        assert!(backend.handles_of(ResourceKind::BloomChain).len() == 1);
    }

    #[test]
    fn pulse_rewrites_one_instance() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(800, 600));
        let (mut scene, links) = ready_scene(&mut backend, false);
        assert!(scene.trigger_pulse(&mut backend, 0, &links).unwrap());
        assert!(!scene.trigger_pulse(&mut backend, 5, &links).unwrap());
        let buffer = scene.content_handles().unwrap().link_instances.unwrap();
        let instance: LinkInstance = read(&backend, buffer);
        assert_eq!(instance.pulse, 0.0);
        assert_eq!(instance.end, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn render_uses_bloom_and_skips_empty_sets() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(800, 600));
        let mut scene = SceneManager::new(&mut backend, params()).unwrap();
        scene
            .install_content(&mut backend, &shaders(), &[], &[], true)
            .unwrap();
        scene.render(&mut backend, 1.5, [0.2, -0.4], 0.1).unwrap();
        let stats = backend.stats();
        assert_eq!(stats.frames_rendered, 1);
        assert_eq!(stats.bloom_frames, 1);
        assert_eq!(stats.last_draw_count, 1);
        let uniforms: SceneUniforms = read(&backend, scene.base_handles().scene_uniforms);
        assert_eq!(uniforms.time, 1.5);
    }

    #[test]
    fn failed_base_setup_releases_partial_handles() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(800, 600));
        backend.fail_buffer("particle uniforms");
        let err = SceneManager::new(&mut backend, params()).err().unwrap();
        assert!(matches!(err, BackendError::Allocation { .. }));
        assert_eq!(backend.live_handles(), 0);
        assert_eq!(backend.stats().releases, 3);
    }

    #[test]
    fn failed_material_releases_earlier_materials() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(800, 600));
        let mut scene = SceneManager::new(&mut backend, params()).unwrap();
        let base = backend.live_handles();
        backend.fail_material(MaterialKind::Links);
        let (particles, links) = sample_data();
        let err = scene
            .install_content(&mut backend, &shaders(), &particles, &links, true)
            .unwrap_err();
        assert!(matches!(err, BackendError::ShaderCompile { kind: MaterialKind::Links, .. }));
        assert!(!scene.is_ready());
        assert_eq!(backend.live_handles(), base);
        assert!(backend.handles_of(ResourceKind::Material).is_empty());
        scene.dispose(&mut backend);
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn failed_instance_upload_releases_materials() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(800, 600));
        let mut scene = SceneManager::new(&mut backend, params()).unwrap();
        let base = backend.live_handles();
        backend.fail_buffer("link instances");
        let (particles, links) = sample_data();
        assert!(scene
            .install_content(&mut backend, &shaders(), &particles, &links, false)
            .is_err());
        assert_eq!(backend.live_handles(), base);
    }

    #[test]
    fn dispose_releases_everything() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(800, 600));
        let (scene, _) = ready_scene(&mut backend, true);
        assert!(backend.live_handles() > 0);
        scene.dispose(&mut backend);
        assert_eq!(backend.live_handles(), 0);
    }
}
