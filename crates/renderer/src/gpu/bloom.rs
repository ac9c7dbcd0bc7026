//! Threshold, separable blur and composite passes.
//!
//! The bright-pass and blur run at half resolution; the composite pass
//! writes the presentable frame. Direct presentation uses the same
//! composite pipeline with a black bloom input and zero strength.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;
use wgpu::naga::ShaderStage;

use crate::error::BackendError;
use crate::types::{BloomParams, SurfaceSize};

use super::compile::{self, compile_glsl};
use super::pipeline::{fullscreen_pipeline, post_layout, SCENE_FORMAT};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct PostUniforms {
    pub texel: [f32; 2],
    pub direction: [f32; 2],
    pub threshold: f32,
    pub strength: f32,
    pub radius: f32,
    pub _pad: f32,
}

impl PostUniforms {
    fn new(params: BloomParams, size: SurfaceSize, direction: [f32; 2]) -> Self {
        Self {
            texel: [
                1.0 / size.width.max(1) as f32,
                1.0 / size.height.max(1) as f32,
            ],
            direction,
            threshold: params.threshold,
            strength: params.strength,
            radius: params.radius,
            _pad: 0.0,
        }
    }
}

/// Owned colour texture plus its default view.
pub(crate) struct ColorTarget {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: SurfaceSize,
}

impl ColorTarget {
    pub(crate) fn new(device: &wgpu::Device, label: &str, size: SurfaceSize) -> Self {
        let size = SurfaceSize::new(size.width.max(1), size.height.max(1));
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SCENE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
            size,
        }
    }
}

pub(crate) struct BloomChain {
    pub params: BloomParams,
    pub bright: ColorTarget,
    pub scratch: ColorTarget,
    pub threshold_uniforms: wgpu::Buffer,
    pub horizontal_uniforms: wgpu::Buffer,
    pub vertical_uniforms: wgpu::Buffer,
    pub composite_uniforms: wgpu::Buffer,
}

impl BloomChain {
    pub(crate) fn new(device: &wgpu::Device, params: BloomParams, size: SurfaceSize) -> Self {
        let half = half_size(size);
        let buffer = |label: &str, uniforms: PostUniforms| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        };
        Self {
            params,
            bright: ColorTarget::new(device, "bloom bright", half),
            scratch: ColorTarget::new(device, "bloom scratch", half),
            threshold_uniforms: buffer("bloom threshold", PostUniforms::new(params, size, [0.0, 0.0])),
            horizontal_uniforms: buffer("bloom blur h", PostUniforms::new(params, half, [1.0, 0.0])),
            vertical_uniforms: buffer("bloom blur v", PostUniforms::new(params, half, [0.0, 1.0])),
            composite_uniforms: buffer("bloom composite", PostUniforms::new(params, size, [0.0, 0.0])),
        }
    }

    pub(crate) fn size(&self) -> SurfaceSize {
        self.bright.size
    }

    pub(crate) fn resize(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, size: SurfaceSize) {
        let half = half_size(size);
        self.bright = ColorTarget::new(device, "bloom bright", half);
        self.scratch = ColorTarget::new(device, "bloom scratch", half);
        let params = self.params;
        let writes = [
            (&self.threshold_uniforms, PostUniforms::new(params, size, [0.0, 0.0])),
            (&self.horizontal_uniforms, PostUniforms::new(params, half, [1.0, 0.0])),
            (&self.vertical_uniforms, PostUniforms::new(params, half, [0.0, 1.0])),
            (&self.composite_uniforms, PostUniforms::new(params, size, [0.0, 0.0])),
        ];
        for (buffer, uniforms) in writes {
            queue.write_buffer(buffer, 0, bytemuck::bytes_of(&uniforms));
        }
    }
}

fn half_size(size: SurfaceSize) -> SurfaceSize {
    SurfaceSize::new((size.width / 2).max(1), (size.height / 2).max(1))
}

/// Device-wide post-processing state, rebuilt after a device restore.
pub(crate) struct PostPipelines {
    pub layout: wgpu::BindGroupLayout,
    pub sampler: wgpu::Sampler,
    pub threshold: wgpu::RenderPipeline,
    pub blur: wgpu::RenderPipeline,
    pub composite: wgpu::RenderPipeline,
    pub black: ColorTarget,
    pub direct_uniforms: wgpu::Buffer,
}

impl PostPipelines {
    pub(crate) fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Self, BackendError> {
        let layout = post_layout(device);
        let vertex = compile_glsl(
            device,
            "fullscreen vertex",
            compile::FULLSCREEN_VERTEX_GLSL,
            ShaderStage::Vertex,
        )
        .map_err(|message| BackendError::Unsupported(format!("fullscreen vertex: {message}")))?;

        let threshold = fullscreen_pipeline(
            device,
            &layout,
            &vertex,
            &compile::threshold_fragment(),
            "bloom threshold",
            SCENE_FORMAT,
        )?;
        let blur = fullscreen_pipeline(
            device,
            &layout,
            &vertex,
            &compile::blur_fragment(),
            "bloom blur",
            SCENE_FORMAT,
        )?;
        let composite = fullscreen_pipeline(
            device,
            &layout,
            &vertex,
            &compile::composite_fragment(),
            "composite",
            surface_format,
        )?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("post sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let direct = PostUniforms {
            texel: [1.0, 1.0],
            direction: [0.0, 0.0],
            threshold: 1.0,
            strength: 0.0,
            radius: 0.0,
            _pad: 0.0,
        };
        let direct_uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("direct composite"),
            contents: bytemuck::bytes_of(&direct),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        Ok(Self {
            layout,
            sampler,
            threshold,
            blur,
            composite,
            black: ColorTarget::new(device, "black", SurfaceSize::new(1, 1)),
            direct_uniforms,
        })
    }

    pub(crate) fn bind(
        &self,
        device: &wgpu::Device,
        source: &wgpu::TextureView,
        bloom: &wgpu::TextureView,
        uniforms: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("post bind group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(bloom),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniforms.as_entire_binding(),
                },
            ],
        })
    }
}

/// Records one full-screen pass.
pub(crate) fn encode_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    target: &wgpu::TextureView,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.draw(0..3, 0..1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_uniforms_are_std140_sized() {
        assert_eq!(std::mem::size_of::<PostUniforms>(), 32);
    }

    #[test]
    fn half_size_never_collapses() {
        assert_eq!(half_size(SurfaceSize::new(801, 1)), SurfaceSize::new(400, 1));
    }

    #[test]
    fn texel_matches_target() {
        let uniforms = PostUniforms::new(BloomParams::default(), SurfaceSize::new(200, 100), [1.0, 0.0]);
        assert_eq!(uniforms.texel, [0.005, 0.01]);
        assert_eq!(uniforms.strength, 0.3);
    }
}
