use perfgov::{AdapterDescription, ProbeError};

use crate::error::BackendError;
use crate::types::{
    BloomParams, BufferUsage, FramePlan, GpuHandle, MaterialDescriptor, SurfaceSize,
};

/// The seam between the scene manager and a concrete graphics API.
///
/// Every resource is addressed through a [`GpuHandle`]. After
/// [`context_lost`](GpuBackend::context_lost) the backend forgets all handles
/// without issuing API calls; every call except `restore`, `probe_capability`
/// and `live_handles` then fails with [`BackendError::ContextLost`] until
/// [`restore`](GpuBackend::restore) succeeds.
pub trait GpuBackend {
    fn probe_capability(&self) -> Result<AdapterDescription, ProbeError>;

    /// Current presentable surface size in physical pixels.
    fn surface_size(&self) -> SurfaceSize;

    fn create_buffer(
        &mut self,
        usage: BufferUsage,
        label: &str,
        contents: &[u8],
    ) -> Result<GpuHandle, BackendError>;

    fn write_buffer(
        &mut self,
        buffer: GpuHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError>;

    fn create_material(&mut self, desc: &MaterialDescriptor<'_>)
        -> Result<GpuHandle, BackendError>;

    fn create_render_target(&mut self, size: SurfaceSize) -> Result<GpuHandle, BackendError>;

    fn resize_render_target(
        &mut self,
        target: GpuHandle,
        size: SurfaceSize,
    ) -> Result<(), BackendError>;

    fn create_bloom_chain(
        &mut self,
        target: GpuHandle,
        params: BloomParams,
    ) -> Result<GpuHandle, BackendError>;

    fn resize_bloom_chain(
        &mut self,
        chain: GpuHandle,
        size: SurfaceSize,
    ) -> Result<(), BackendError>;

    /// Records and submits one frame. Uniform writes issued before this call
    /// are visible to it.
    fn render(&mut self, plan: &FramePlan<'_>) -> Result<(), BackendError>;

    fn release(&mut self, handle: GpuHandle) -> Result<(), BackendError>;

    /// Drops all bookkeeping for a context that is already gone.
    fn context_lost(&mut self);

    fn restore(&mut self) -> Result<(), BackendError>;

    fn is_lost(&self) -> bool;

    fn live_handles(&self) -> usize;
}
