use tracing::debug;

use crate::backend::GpuBackend;
use crate::error::BackendError;
use crate::types::{BloomParams, Composite, GpuHandle, SurfaceSize};

/// Optional bloom stage between the scene pass and presentation.
///
/// The chain is created or released as a whole. Flipping bloom on or off
/// always goes through a fresh allocation.
#[derive(Debug)]
pub struct PostProcessing {
    params: BloomParams,
    chain: Option<GpuHandle>,
}

impl PostProcessing {
    pub fn new(params: BloomParams) -> Self {
        Self {
            params,
            chain: None,
        }
    }

    pub fn params(&self) -> BloomParams {
        self.params
    }

    pub fn is_active(&self) -> bool {
        self.chain.is_some()
    }

    pub fn handle(&self) -> Option<GpuHandle> {
        self.chain
    }

    pub fn composite(&self) -> Composite {
        match self.chain {
            Some(chain) => Composite::Bloom(chain),
            None => Composite::Direct,
        }
    }

    /// Creates or releases the chain so that `is_active() == enabled`.
    /// Returns whether anything changed.
    pub fn set_enabled<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        target: GpuHandle,
        enabled: bool,
    ) -> Result<bool, BackendError> {
        match (enabled, self.chain) {
            (true, None) => {
                let chain = backend.create_bloom_chain(target, self.params)?;
                debug!(%chain, strength = self.params.strength, "bloom chain created");
                self.chain = Some(chain);
                Ok(true)
            }
            (false, Some(chain)) => {
                self.chain = None;
                backend.release(chain)?;
                debug!(%chain, "bloom chain released");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn resize<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        size: SurfaceSize,
    ) -> Result<(), BackendError> {
        match self.chain {
            Some(chain) => backend.resize_bloom_chain(chain, size),
            None => Ok(()),
        }
    }

    pub fn dispose<B: GpuBackend>(&mut self, backend: &mut B) -> Result<(), BackendError> {
        match self.chain.take() {
            Some(chain) => backend.release(chain),
            None => Ok(()),
        }
    }

    /// Forgets the chain without touching the backend.
    pub fn abandon(&mut self) {
        self.chain = None;
    }
}
