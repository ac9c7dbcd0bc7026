//! Bookkeeping-only backend.
//!
//! `HeadlessBackend` performs no graphics work but validates every handle it is
//! given, keeps buffer contents so callers can read uniforms back, and can be
//! told to fail in the ways a real device does. The CLI soak run and the
//! integration tests drive the engine through it.

use std::collections::BTreeMap;

use perfgov::{AdapterDescription, ProbeError};
use tracing::debug;

use crate::backend::GpuBackend;
use crate::error::BackendError;
use crate::types::{
    BlendMode, BloomParams, BufferUsage, Composite, FramePlan, GpuHandle, MaterialDescriptor,
    MaterialKind, ResourceKind, SurfaceSize,
};

#[derive(Debug, Clone)]
enum Resource {
    Buffer {
        usage: BufferUsage,
        label: String,
        data: Vec<u8>,
    },
    Material {
        kind: MaterialKind,
        blend: BlendMode,
    },
    RenderTarget {
        size: SurfaceSize,
    },
    BloomChain {
        target: GpuHandle,
        params: BloomParams,
        size: SurfaceSize,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub buffers_created: u64,
    pub materials_created: u64,
    pub targets_created: u64,
    pub bloom_chains_created: u64,
    pub buffer_writes: u64,
    pub frames_rendered: u64,
    pub bloom_frames: u64,
    pub releases: u64,
    pub restores: u64,
    pub last_draw_count: usize,
}

pub struct HeadlessBackend {
    adapter: Result<AdapterDescription, String>,
    surface: SurfaceSize,
    next_id: u64,
    resources: BTreeMap<GpuHandle, Resource>,
    lost: bool,
    failing_material: Option<MaterialKind>,
    failing_buffer: Option<String>,
    lose_on_render: bool,
    stats: HeadlessStats,
}

impl HeadlessBackend {
    pub fn new(surface: SurfaceSize) -> Self {
        Self {
            adapter: Ok(AdapterDescription {
                name: "Headless Reference Adapter".into(),
                vendor: "heroglyph".into(),
                driver: "headless".into(),
                class: perfgov::DeviceClass::Other,
            }),
            surface,
            next_id: 1,
            resources: BTreeMap::new(),
            lost: false,
            failing_material: None,
            failing_buffer: None,
            lose_on_render: false,
            stats: HeadlessStats::default(),
        }
    }

    pub fn with_adapter(mut self, adapter: AdapterDescription) -> Self {
        self.adapter = Ok(adapter);
        self
    }

    pub fn with_probe_failure(mut self, message: impl Into<String>) -> Self {
        self.adapter = Err(message.into());
        self
    }

    /// Makes every subsequent `create_material` of `kind` fail to compile.
    pub fn fail_material(&mut self, kind: MaterialKind) {
        self.failing_material = Some(kind);
    }

    /// Makes every subsequent `create_buffer` labelled `label` fail.
    pub fn fail_buffer(&mut self, label: impl Into<String>) {
        self.failing_buffer = Some(label.into());
    }

    /// The next `render` reports a lost context instead of drawing.
    pub fn lose_context_on_next_render(&mut self) {
        self.lose_on_render = true;
    }

    pub fn set_surface_size(&mut self, size: SurfaceSize) {
        self.surface = size;
    }

    pub fn stats(&self) -> HeadlessStats {
        self.stats
    }

    pub fn buffer_contents(&self, handle: GpuHandle) -> Option<&[u8]> {
        match self.resources.get(&handle)? {
            Resource::Buffer { data, .. } => Some(data.as_slice()),
            _ => None,
        }
    }

    pub fn buffer_label(&self, handle: GpuHandle) -> Option<(&str, BufferUsage)> {
        match self.resources.get(&handle)? {
            Resource::Buffer { label, usage, .. } => Some((label.as_str(), *usage)),
            _ => None,
        }
    }

    pub fn render_target_size(&self, handle: GpuHandle) -> Option<SurfaceSize> {
        match self.resources.get(&handle)? {
            Resource::RenderTarget { size } => Some(*size),
            _ => None,
        }
    }

    pub fn bloom_chain(&self, handle: GpuHandle) -> Option<(GpuHandle, BloomParams, SurfaceSize)> {
        match self.resources.get(&handle)? {
            Resource::BloomChain {
                target,
                params,
                size,
            } => Some((*target, *params, *size)),
            _ => None,
        }
    }

    pub fn material_blend(&self, handle: GpuHandle) -> Option<(MaterialKind, BlendMode)> {
        match self.resources.get(&handle)? {
            Resource::Material { kind, blend } => Some((*kind, *blend)),
            _ => None,
        }
    }

    pub fn handles(&self) -> Vec<GpuHandle> {
        self.resources.keys().copied().collect()
    }

    pub fn handles_of(&self, kind: ResourceKind) -> Vec<GpuHandle> {
        self.resources
            .keys()
            .copied()
            .filter(|handle| handle.kind == kind)
            .collect()
    }

    fn ensure_live(&self) -> Result<(), BackendError> {
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

    fn expect_kind(&self, handle: GpuHandle, expected: ResourceKind) -> Result<&Resource, BackendError> {
        if handle.kind != expected {
            return Err(BackendError::WrongKind { handle, expected });
        }
        self.resources
            .get(&handle)
            .ok_or(BackendError::UnknownHandle(handle))
    }
}

impl GpuBackend for HeadlessBackend {
    fn probe_capability(&self) -> Result<AdapterDescription, ProbeError> {
        self.adapter
            .clone()
            .map_err(ProbeError::Unavailable)
    }

    fn surface_size(&self) -> SurfaceSize {
        self.surface
    }

    fn create_buffer(
        &mut self,
        usage: BufferUsage,
        label: &str,
        contents: &[u8],
    ) -> Result<GpuHandle, BackendError> {
        self.ensure_live()?;
        if self.failing_buffer.as_deref() == Some(label) {
            return Err(BackendError::Allocation {
                label: label.to_string(),
                message: "injected allocation failure".into(),
            });
        }
        self.stats.buffers_created += 1;
        let handle = self.mint(
            ResourceKind::Buffer,
            Resource::Buffer {
                usage,
                label: label.to_string(),
                data: contents.to_vec(),
            },
        );
        debug!(%handle, label, ?usage, bytes = contents.len(), "headless buffer created");
        Ok(handle)
    }

    fn write_buffer(
        &mut self,
        buffer: GpuHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        self.ensure_live()?;
        if buffer.kind != ResourceKind::Buffer {
            return Err(BackendError::WrongKind {
                handle: buffer,
                expected: ResourceKind::Buffer,
            });
        }
        let Some(Resource::Buffer { data: stored, .. }) = self.resources.get_mut(&buffer) else {
            return Err(BackendError::UnknownHandle(buffer));
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > stored.len() {
            return Err(BackendError::OutOfBounds {
                handle: buffer,
                offset,
                len: data.len(),
                size: stored.len() as u64,
            });
        }
        stored[start..end].copy_from_slice(data);
        self.stats.buffer_writes += 1;
        Ok(())
    }

    fn create_material(
        &mut self,
        desc: &MaterialDescriptor<'_>,
    ) -> Result<GpuHandle, BackendError> {
        self.ensure_live()?;
        self.expect_kind(desc.scene_uniforms, ResourceKind::Buffer)?;
        self.expect_kind(desc.material_uniforms, ResourceKind::Buffer)?;
        if self.failing_material == Some(desc.kind) {
            return Err(BackendError::ShaderCompile {
                kind: desc.kind,
                message: "injected compile failure".into(),
            });
        }
        if desc.vertex_source.trim().is_empty() || desc.fragment_source.trim().is_empty() {
            return Err(BackendError::ShaderCompile {
                kind: desc.kind,
                message: "empty shader source".into(),
            });
        }
        self.stats.materials_created += 1;
        Ok(self.mint(
            ResourceKind::Material,
            Resource::Material {
                kind: desc.kind,
                blend: desc.blend,
            },
        ))
    }

    fn create_render_target(&mut self, size: SurfaceSize) -> Result<GpuHandle, BackendError> {
        self.ensure_live()?;
        self.stats.targets_created += 1;
        Ok(self.mint(ResourceKind::RenderTarget, Resource::RenderTarget { size }))
    }

    fn resize_render_target(
        &mut self,
        target: GpuHandle,
        size: SurfaceSize,
    ) -> Result<(), BackendError> {
        self.ensure_live()?;
        self.expect_kind(target, ResourceKind::RenderTarget)?;
        if let Some(Resource::RenderTarget { size: stored }) = self.resources.get_mut(&target) {
            *stored = size;
        }
        Ok(())
    }

    fn create_bloom_chain(
        &mut self,
        target: GpuHandle,
        params: BloomParams,
    ) -> Result<GpuHandle, BackendError> {
        self.ensure_live()?;
        let size = match self.expect_kind(target, ResourceKind::RenderTarget)? {
            Resource::RenderTarget { size } => *size,
            _ => return Err(BackendError::UnknownHandle(target)),
        };
        self.stats.bloom_chains_created += 1;
        Ok(self.mint(
            ResourceKind::BloomChain,
            Resource::BloomChain {
                target,
                params,
                size,
            },
        ))
    }

    fn resize_bloom_chain(&mut self, chain: GpuHandle, size: SurfaceSize) -> Result<(), BackendError> {
        self.ensure_live()?;
        self.expect_kind(chain, ResourceKind::BloomChain)?;
        if let Some(Resource::BloomChain { size: stored, .. }) = self.resources.get_mut(&chain) {
            *stored = size;
        }
        Ok(())
    }

    fn render(&mut self, plan: &FramePlan<'_>) -> Result<(), BackendError> {
        self.ensure_live()?;
        if self.lose_on_render {
            self.lose_on_render = false;
            return Err(BackendError::ContextLost);
        }
        self.expect_kind(plan.target, ResourceKind::RenderTarget)?;
        for draw in plan.draws {
            self.expect_kind(draw.material, ResourceKind::Material)?;
            self.expect_kind(draw.geometry, ResourceKind::Buffer)?;
            if let Some(instances) = draw.instances {
                self.expect_kind(instances.buffer, ResourceKind::Buffer)?;
            }
        }
        if let Composite::Bloom(chain) = plan.composite {
            self.expect_kind(chain, ResourceKind::BloomChain)?;
            self.stats.bloom_frames += 1;
        }
        self.stats.frames_rendered += 1;
        self.stats.last_draw_count = plan.draws.len();
        Ok(())
    }

    fn release(&mut self, handle: GpuHandle) -> Result<(), BackendError> {
        self.ensure_live()?;
        self.resources
            .remove(&handle)
            .ok_or(BackendError::UnknownHandle(handle))?;
        self.stats.releases += 1;
        Ok(())
    }

    fn context_lost(&mut self) {
        self.lost = true;
        self.resources.clear();
    }

    fn restore(&mut self) -> Result<(), BackendError> {
        self.lost = false;
        self.lose_on_render = false;
        self.stats.restores += 1;
        Ok(())
    }

    fn is_lost(&self) -> bool {
        self.lost
    }

    fn live_handles(&self) -> usize {
        self.resources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_never_reused() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(64, 64));
        let first = backend
            .create_buffer(BufferUsage::Uniform, "a", &[0; 16])
            .unwrap();
        backend.release(first).unwrap();
        let second = backend
            .create_buffer(BufferUsage::Uniform, "b", &[0; 16])
            .unwrap();
        assert_ne!(first, second);
        assert!(matches!(
            backend.release(first),
            Err(BackendError::UnknownHandle(_))
        ));
    }

    #[test]
    fn writes_are_bounds_checked() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(64, 64));
        let buffer = backend
            .create_buffer(BufferUsage::Instance, "inst", &[0; 8])
            .unwrap();
        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(backend.buffer_contents(buffer).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(matches!(
            backend.write_buffer(buffer, 6, &[0; 4]),
            Err(BackendError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn lost_context_forgets_everything() {
        let mut backend = HeadlessBackend::new(SurfaceSize::new(64, 64));
        backend.create_render_target(SurfaceSize::new(64, 64)).unwrap();
        backend.context_lost();
        assert_eq!(backend.live_handles(), 0);
        assert!(backend
            .create_render_target(SurfaceSize::new(64, 64))
            .unwrap_err()
            .is_context_lost());
        backend.restore().unwrap();
        assert!(backend.create_render_target(SurfaceSize::new(64, 64)).is_ok());
    }

    #[test]
    fn probe_failure_is_reported() {
        let backend = HeadlessBackend::new(SurfaceSize::new(1, 1)).with_probe_failure("blocked");
        assert!(backend.probe_capability().is_err());
    }
}
