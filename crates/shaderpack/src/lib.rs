mod fetch;
mod loader;
mod manifest;

pub use fetch::{DirectoryFetcher, FetchError, HttpFetcher, MemoryFetcher, ShaderFetcher};
pub use loader::{
    inject_noise, load_from, load_manifest, load_shader_set, ShaderLoadError, ShaderProgram,
    ShaderSet,
};
pub use manifest::{ShaderManifest, ShaderStage, MANIFEST_FILE};

use std::path::PathBuf;
use std::sync::Arc;

/// Where shader text comes from, as parsed from a CLI or config value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderOrigin {
    Directory(PathBuf),
    Remote(String),
}

impl ShaderOrigin {
    pub fn from_input(input: &str) -> Self {
        if input.starts_with("http://") || input.starts_with("https://") {
            Self::Remote(input.to_string())
        } else {
            Self::Directory(PathBuf::from(input))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    pub fn into_fetcher(self) -> Result<Arc<dyn ShaderFetcher>, FetchError> {
        Ok(match self {
            Self::Directory(root) => Arc::new(DirectoryFetcher::new(root)),
            Self::Remote(base) => Arc::new(HttpFetcher::new(&base)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_remote_origin() {
        assert_eq!(
            ShaderOrigin::from_input("https://cdn.example.com/shaders"),
            ShaderOrigin::Remote("https://cdn.example.com/shaders".into())
        );
    }

    #[test]
    fn parses_local_origin() {
        assert!(matches!(
            ShaderOrigin::from_input("assets/shaders"),
            ShaderOrigin::Directory(path) if path == PathBuf::from("assets/shaders")
        ));
    }
}
