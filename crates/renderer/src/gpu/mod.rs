//! wgpu implementation of [`GpuBackend`].
//!
//! - `context` owns instance/adapter/device/surface wiring, reports device
//!   loss and knows how to request a fresh device on restore.
//! - `compile` runs GLSL through naga inside an error scope.
//! - `pipeline` builds material pipelines (scene block + material block,
//!   geometry and instance vertex streams) and the full-screen pass layout.
//! - `bloom` owns the half-resolution bright/blur textures and the
//!   composite that writes the presentable frame.
//!
//! The scene renders into an offscreen `Rgba16Float` target which is always
//! composited to the surface, with or without bloom.

mod bloom;
mod compile;
mod context;
mod pipeline;

use std::collections::HashMap;

use perfgov::{AdapterDescription, ProbeError};
use tracing::{debug, trace, warn};
use wgpu::util::DeviceExt;

use crate::backend::GpuBackend;
use crate::error::BackendError;
use crate::types::{
    BloomParams, BufferUsage, Composite, FramePlan, GpuHandle, MaterialDescriptor, ResourceKind,
    SurfaceSize,
};

use bloom::{encode_pass, BloomChain, ColorTarget, PostPipelines};
use context::GpuContext;
use pipeline::{material_layout, Material, MaterialSources};

enum Resource {
    Buffer(wgpu::Buffer),
    Material(Material),
    RenderTarget(ColorTarget),
    BloomChain(BloomChain),
}

impl Resource {
    fn kind(&self) -> ResourceKind {
        match self {
            Resource::Buffer(_) => ResourceKind::Buffer,
            Resource::Material(_) => ResourceKind::Material,
            Resource::RenderTarget(_) => ResourceKind::RenderTarget,
            Resource::BloomChain(_) => ResourceKind::BloomChain,
        }
    }
}

struct DeviceObjects {
    material_layout: wgpu::BindGroupLayout,
    post: PostPipelines,
}

impl DeviceObjects {
    fn new(context: &GpuContext) -> Result<Self, BackendError> {
        Ok(Self {
            material_layout: material_layout(&context.device),
            post: PostPipelines::new(&context.device, context.surface_format)?,
        })
    }
}

pub struct WgpuBackend {
    context: GpuContext,
    objects: DeviceObjects,
    resources: HashMap<GpuHandle, Resource>,
    next_id: u64,
    lost: bool,
}

impl WgpuBackend {
    /// Creates a backend presenting to `window`. `size` is in physical pixels.
    pub fn new<W>(window: W, size: SurfaceSize) -> Result<Self, BackendError>
    where
        W: wgpu::WindowHandle + 'static,
    {
        let context = GpuContext::new(window, size)?;
        let objects = DeviceObjects::new(&context)?;
        Ok(Self {
            context,
            objects,
            resources: HashMap::new(),
            next_id: 1,
            lost: false,
        })
    }

    /// Resizes the presentation surface; zero sizes are ignored.
    pub fn resize_surface(&mut self, size: SurfaceSize) {
        self.context.resize(size);
    }

    pub fn adapter(&self) -> &AdapterDescription {
        &self.context.adapter_description
    }

    fn ensure_live(&mut self) -> Result<(), BackendError> {
        if !self.lost && self.context.is_device_lost() {
            warn!("device loss reported by driver");
            self.context_lost();
        }
        if self.lost {
            Err(BackendError::ContextLost)
        } else {
            Ok(())
        }
    }

    fn mint(&mut self, kind: ResourceKind, resource: Resource) -> GpuHandle {
        let handle = GpuHandle::new(kind, self.next_id);
        self.next_id += 1;
        self.resources.insert(handle, resource);
        handle
    }

    fn buffer(&self, handle: GpuHandle) -> Result<&wgpu::Buffer, BackendError> {
        match self.resources.get(&handle) {
            Some(Resource::Buffer(buffer)) => Ok(buffer),
            Some(_) => Err(BackendError::WrongKind {
                handle,
                expected: ResourceKind::Buffer,
            }),
            None => Err(BackendError::UnknownHandle(handle)),
        }
    }

    fn material(&self, handle: GpuHandle) -> Result<&Material, BackendError> {
        match self.resources.get(&handle) {
            Some(Resource::Material(material)) => Ok(material),
            Some(_) => Err(BackendError::WrongKind {
                handle,
                expected: ResourceKind::Material,
            }),
            None => Err(BackendError::UnknownHandle(handle)),
        }
    }

    fn render_target(&self, handle: GpuHandle) -> Result<&ColorTarget, BackendError> {
        match self.resources.get(&handle) {
            Some(Resource::RenderTarget(target)) => Ok(target),
            Some(_) => Err(BackendError::WrongKind {
                handle,
                expected: ResourceKind::RenderTarget,
            }),
            None => Err(BackendError::UnknownHandle(handle)),
        }
    }

    fn bloom_chain(&self, handle: GpuHandle) -> Result<&BloomChain, BackendError> {
        match self.resources.get(&handle) {
            Some(Resource::BloomChain(chain)) => Ok(chain),
            Some(_) => Err(BackendError::WrongKind {
                handle,
                expected: ResourceKind::BloomChain,
            }),
            None => Err(BackendError::UnknownHandle(handle)),
        }
    }

    fn encode_scene(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        plan: &FramePlan<'_>,
        target: &ColorTarget,
    ) -> Result<(), BackendError> {
        let [r, g, b, a] = plan.clear_color;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scene pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: f64::from(r),
                        g: f64::from(g),
                        b: f64::from(b),
                        a: f64::from(a),
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        for draw in plan.draws {
            let material = self.material(draw.material)?;
            let geometry = self.buffer(draw.geometry)?;
            pass.set_pipeline(&material.pipeline);
            pass.set_bind_group(0, &material.bind_group, &[]);
            pass.set_vertex_buffer(0, geometry.slice(..));
            let instances = match draw.instances {
                Some(range) => {
                    let buffer = self.buffer(range.buffer)?;
                    pass.set_vertex_buffer(1, buffer.slice(..));
                    range.count
                }
                None => 1,
            };
            pass.draw(0..draw.vertex_count, 0..instances);
        }
        Ok(())
    }
}

impl GpuBackend for WgpuBackend {
    fn probe_capability(&self) -> Result<AdapterDescription, ProbeError> {
        let description = &self.context.adapter_description;
        if description.name.trim().is_empty() {
            return Err(ProbeError::Unavailable(
                "adapter reports an empty name".into(),
            ));
        }
        Ok(description.clone())
    }

    fn surface_size(&self) -> SurfaceSize {
        self.context.size
    }

    fn create_buffer(
        &mut self,
        usage: BufferUsage,
        label: &str,
        contents: &[u8],
    ) -> Result<GpuHandle, BackendError> {
        self.ensure_live()?;
        let usage_flags = match usage {
            BufferUsage::Vertex | BufferUsage::Instance => wgpu::BufferUsages::VERTEX,
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
        } | wgpu::BufferUsages::COPY_DST;
        let buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: usage_flags,
            });
        let handle = self.mint(ResourceKind::Buffer, Resource::Buffer(buffer));
        debug!(%handle, label, bytes = contents.len(), "buffer created");
        Ok(handle)
    }

    fn write_buffer(
        &mut self,
        buffer: GpuHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        self.ensure_live()?;
        let target = self.buffer(buffer)?;
        let size = target.size();
        if offset.saturating_add(data.len() as u64) > size {
            return Err(BackendError::OutOfBounds {
                handle: buffer,
                offset,
                len: data.len(),
                size,
            });
        }
        self.context.queue.write_buffer(target, offset, data);
        Ok(())
    }

    fn create_material(
        &mut self,
        desc: &MaterialDescriptor<'_>,
    ) -> Result<GpuHandle, BackendError> {
        self.ensure_live()?;
        let material = Material::new(
            &self.context.device,
            &self.objects.material_layout,
            MaterialSources {
                kind: desc.kind,
                vertex: desc.vertex_source,
                fragment: desc.fragment_source,
                blend: desc.blend,
                scene_uniforms: self.buffer(desc.scene_uniforms)?,
                material_uniforms: self.buffer(desc.material_uniforms)?,
            },
        )?;
        let kind = material.kind;
        let handle = self.mint(ResourceKind::Material, Resource::Material(material));
        debug!(%handle, material = kind.label(), blend = ?desc.blend, "material compiled");
        Ok(handle)
    }

    fn create_render_target(&mut self, size: SurfaceSize) -> Result<GpuHandle, BackendError> {
        self.ensure_live()?;
        let target = ColorTarget::new(&self.context.device, "scene target", size);
        Ok(self.mint(ResourceKind::RenderTarget, Resource::RenderTarget(target)))
    }

    fn resize_render_target(
        &mut self,
        target: GpuHandle,
        size: SurfaceSize,
    ) -> Result<(), BackendError> {
        self.ensure_live()?;
        self.render_target(target)?;
        let replacement = ColorTarget::new(&self.context.device, "scene target", size);
        self.resources
            .insert(target, Resource::RenderTarget(replacement));
        Ok(())
    }

    fn create_bloom_chain(
        &mut self,
        target: GpuHandle,
        params: BloomParams,
    ) -> Result<GpuHandle, BackendError> {
        self.ensure_live()?;
        let size = self.render_target(target)?.size;
        let chain = BloomChain::new(&self.context.device, params, size);
        let handle = self.mint(ResourceKind::BloomChain, Resource::BloomChain(chain));
        debug!(%handle, width = size.width, height = size.height, "bloom chain created");
        Ok(handle)
    }

    fn resize_bloom_chain(
        &mut self,
        chain: GpuHandle,
        size: SurfaceSize,
    ) -> Result<(), BackendError> {
        self.ensure_live()?;
        self.bloom_chain(chain)?;
        if let Some(Resource::BloomChain(chain)) = self.resources.get_mut(&chain) {
            chain.resize(&self.context.device, &self.context.queue, size);
            trace!(size = ?chain.size(), "bloom chain resized");
        }
        Ok(())
    }

    fn render(&mut self, plan: &FramePlan<'_>) -> Result<(), BackendError> {
        self.ensure_live()?;
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                trace!("surface timeout; skipping frame");
                return Ok(());
            }
            Err(other) => return Err(BackendError::Surface(other.to_string())),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let device = &self.context.device;
        let post = &self.objects.post;
        let target = self.render_target(plan.target)?;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame encoder"),
        });
        self.encode_scene(&mut encoder, plan, target)?;

        let composite_group = match plan.composite {
            Composite::Direct => {
                post.bind(device, &target.view, &post.black.view, &post.direct_uniforms)
            }
            Composite::Bloom(handle) => {
                let chain = self.bloom_chain(handle)?;
                let threshold =
                    post.bind(device, &target.view, &post.black.view, &chain.threshold_uniforms);
                encode_pass(&mut encoder, "bloom threshold", &chain.bright.view, &post.threshold, &threshold);
                let horizontal =
                    post.bind(device, &chain.bright.view, &post.black.view, &chain.horizontal_uniforms);
                encode_pass(&mut encoder, "bloom blur h", &chain.scratch.view, &post.blur, &horizontal);
                let vertical =
                    post.bind(device, &chain.scratch.view, &post.black.view, &chain.vertical_uniforms);
                encode_pass(&mut encoder, "bloom blur v", &chain.bright.view, &post.blur, &vertical);
                post.bind(device, &target.view, &chain.bright.view, &chain.composite_uniforms)
            }
        };
        encode_pass(&mut encoder, "composite", &view, &post.composite, &composite_group);

        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        if self.context.is_device_lost() {
            self.context_lost();
            return Err(BackendError::ContextLost);
        }
        Ok(())
    }

    fn release(&mut self, handle: GpuHandle) -> Result<(), BackendError> {
        self.ensure_live()?;
        match self.resources.remove(&handle) {
            Some(resource) => {
                if let Resource::Buffer(buffer) = &resource {
                    buffer.destroy();
                }
                trace!(%handle, kind = ?resource.kind(), "resource released");
                Ok(())
            }
            None => Err(BackendError::UnknownHandle(handle)),
        }
    }

    fn context_lost(&mut self) {
        self.lost = true;
        let abandoned = self.resources.len();
        self.resources.clear();
        debug!(abandoned, "GPU resources abandoned");
    }

    fn restore(&mut self) -> Result<(), BackendError> {
        self.context.restore()?;
        self.objects = DeviceObjects::new(&self.context)?;
        self.lost = false;
        Ok(())
    }

    fn is_lost(&self) -> bool {
        self.lost
    }

    fn live_handles(&self) -> usize {
        self.resources.len()
    }
}
