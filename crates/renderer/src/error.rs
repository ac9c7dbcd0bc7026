use shaderpack::ShaderLoadError;

use crate::types::{GpuHandle, MaterialKind, ResourceKind};

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("graphics context lost")]
    ContextLost,
    #[error("unknown resource {0}")]
    UnknownHandle(GpuHandle),
    #[error("resource {handle} is not a {expected:?}")]
    WrongKind {
        handle: GpuHandle,
        expected: ResourceKind,
    },
    #[error("write of {len} bytes at offset {offset} overflows {handle} ({size} bytes)")]
    OutOfBounds {
        handle: GpuHandle,
        offset: u64,
        len: usize,
        size: u64,
    },
    #[error("failed to allocate {label}: {message}")]
    Allocation { label: String, message: String },
    #[error("{kind:?} material failed to compile: {message}")]
    ShaderCompile { kind: MaterialKind, message: String },
    #[error("platform unsupported: {0}")]
    Unsupported(String),
    #[error("surface error: {0}")]
    Surface(String),
}

impl BackendError {
    pub fn is_context_lost(&self) -> bool {
        matches!(self, BackendError::ContextLost)
    }
}

/// Failure classes the engine distinguishes when deciding how to recover.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Adapter identity could not be read; the governor assumes a low-end device.
    #[error("capability probe failed: {0}")]
    CapabilityProbe(#[from] perfgov::ProbeError),
    #[error("shader pipeline unavailable: {0}")]
    ShaderLoad(#[from] ShaderLoadError),
    #[error("shader compilation failed: {0}")]
    ShaderCompile(BackendError),
    #[error("shader loader worker exited without a result")]
    LoaderDisconnected,
    #[error("graphics context lost")]
    ContextLost,
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(BackendError),
    #[error("backend failure: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for EngineError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::ContextLost => EngineError::ContextLost,
            BackendError::ShaderCompile { .. } => EngineError::ShaderCompile(value),
            BackendError::Unsupported(_) => EngineError::UnsupportedPlatform(value),
            other => EngineError::Backend(other),
        }
    }
}

impl EngineError {
    /// True when the engine can return to the GPU path after a restore signal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::ContextLost | EngineError::CapabilityProbe(_))
    }
}
