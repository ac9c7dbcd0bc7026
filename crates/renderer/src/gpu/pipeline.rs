use std::mem::size_of;

use wgpu::naga::ShaderStage;

use crate::error::BackendError;
use crate::types::{BlendMode, MaterialKind};
use crate::uniforms::{GeometryVertex, LinkInstance, ParticleInstance};

use super::compile::compile_glsl;

/// Colour format of the offscreen scene target and the bloom chain.
pub(crate) const SCENE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Bind group layout shared by every material: scene block at binding 0,
/// material block at binding 1.
pub(crate) fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let uniform = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("material layout"),
        entries: &[uniform(0), uniform(1)],
    })
}

pub(crate) struct Material {
    pub kind: MaterialKind,
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group: wgpu::BindGroup,
}

pub(crate) struct MaterialSources<'a> {
    pub kind: MaterialKind,
    pub vertex: &'a str,
    pub fragment: &'a str,
    pub blend: BlendMode,
    pub scene_uniforms: &'a wgpu::Buffer,
    pub material_uniforms: &'a wgpu::Buffer,
}

impl Material {
    pub(crate) fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sources: MaterialSources<'_>,
    ) -> Result<Self, BackendError> {
        let kind = sources.kind;
        let compile_error = |message: String| BackendError::ShaderCompile { kind, message };
        let vertex_module = compile_glsl(
            device,
            &format!("{} vertex", kind.label()),
            sources.vertex,
            ShaderStage::Vertex,
        )
        .map_err(compile_error)?;
        let fragment_module = compile_glsl(
            device,
            &format!("{} fragment", kind.label()),
            sources.fragment,
            ShaderStage::Fragment,
        )
        .map_err(compile_error)?;

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kind.label()),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: sources.scene_uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: sources.material_uniforms.as_entire_binding(),
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("material pipeline layout"),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });

        let geometry_attributes =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];
        let particle_attributes =
            wgpu::vertex_attr_array![2 => Float32x3, 3 => Float32, 4 => Float32];
        let link_attributes =
            wgpu::vertex_attr_array![2 => Float32x3, 3 => Float32x3, 4 => Float32];

        let geometry = wgpu::VertexBufferLayout {
            array_stride: size_of::<GeometryVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &geometry_attributes,
        };
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = match kind {
            MaterialKind::Background => vec![geometry],
            MaterialKind::Particles => vec![
                geometry,
                wgpu::VertexBufferLayout {
                    array_stride: size_of::<ParticleInstance>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &particle_attributes,
                },
            ],
            MaterialKind::Links => vec![
                geometry,
                wgpu::VertexBufferLayout {
                    array_stride: size_of::<LinkInstance>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &link_attributes,
                },
            ],
        };

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(kind.label()),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: SCENE_FORMAT,
                    blend: Some(blend_state(sources.blend)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(compile_error(err.to_string()));
        }

        Ok(Self {
            kind,
            pipeline,
            bind_group,
        })
    }
}

fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    match mode {
        BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
        BlendMode::Additive => wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        },
    }
}

/// Texture + sampler + secondary texture + params block, used by every
/// post-processing pass.
pub(crate) fn post_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let texture = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("post layout"),
        entries: &[
            texture(0),
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            texture(2),
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

/// Builds a full-screen pass writing `format` without blending.
pub(crate) fn fullscreen_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    vertex: &wgpu::ShaderModule,
    fragment_source: &str,
    label: &str,
    format: wgpu::TextureFormat,
) -> Result<wgpu::RenderPipeline, BackendError> {
    let fragment = compile_glsl(device, label, fragment_source, ShaderStage::Fragment)
        .map_err(|message| BackendError::Unsupported(format!("{label}: {message}")))?;
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    }))
}
