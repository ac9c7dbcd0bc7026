use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("'{0}' not found")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("invalid shader location: {0}")]
    InvalidLocation(String),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}

/// Source of shader text addressed by relative path.
///
/// Implementations are shared with the loader worker thread.
pub trait ShaderFetcher: Send + Sync {
    fn fetch(&self, path: &Path) -> Result<String, FetchError>;

    /// Short human-readable origin used in log lines.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ShaderFetcher for DirectoryFetcher {
    fn fetch(&self, path: &Path) -> Result<String, FetchError> {
        let full = self.root.join(path);
        debug!(path = %full.display(), "reading shader source");
        fs::read_to_string(&full).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                FetchError::NotFound(full)
            } else {
                FetchError::Io { path: full, source }
            }
        })
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// In-memory sources keyed by relative path.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    sources: HashMap<PathBuf, String>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, source: impl Into<String>) {
        self.sources.insert(path.into(), source.into());
    }

    pub fn with(mut self, path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<String> {
        self.sources.remove(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl ShaderFetcher for MemoryFetcher {
    fn fetch(&self, path: &Path) -> Result<String, FetchError> {
        self.sources
            .get(path)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(path.to_path_buf()))
    }

    fn describe(&self) -> String {
        format!("memory ({} sources)", self.sources.len())
    }
}

/// Fetches shader text over HTTP relative to a base URL.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    base: Url,
}

impl HttpFetcher {
    pub fn new(base: &str) -> Result<Self, FetchError> {
        let mut normalized = base.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base = Url::parse(&normalized)
            .map_err(|err| FetchError::InvalidLocation(format!("{base}: {err}")))?;
        let http = Client::builder().build().map_err(|source| FetchError::Http {
            url: base.to_string(),
            source,
        })?;
        Ok(Self { http, base })
    }

    pub fn url_for(&self, path: &Path) -> Result<Url, FetchError> {
        let relative = path
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        self.base
            .join(&relative)
            .map_err(|err| FetchError::InvalidLocation(format!("{}: {err}", path.display())))
    }
}

impl ShaderFetcher for HttpFetcher {
    fn fetch(&self, path: &Path) -> Result<String, FetchError> {
        let url = self.url_for(path)?;
        debug!(%url, "requesting shader source");
        let response = self
            .http
            .get(url.clone())
            .send()
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(path.to_path_buf()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })
    }

    fn describe(&self) -> String {
        self.base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_fetcher_reads_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("noise.glsl"), "float n;").unwrap();
        let fetcher = DirectoryFetcher::new(dir.path());
        assert_eq!(fetcher.fetch(Path::new("noise.glsl")).unwrap(), "float n;");
        let err = fetcher.fetch(Path::new("missing.frag")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn memory_fetcher_round_trip() {
        let fetcher = MemoryFetcher::new().with("links.vert", "void main() {}");
        assert_eq!(fetcher.len(), 1);
        assert!(fetcher.fetch(Path::new("links.vert")).is_ok());
        assert!(fetcher.fetch(Path::new("links.frag")).unwrap_err().is_not_found());
    }

    #[test]
    fn http_fetcher_joins_relative_paths() {
        let fetcher = HttpFetcher::new("https://cdn.example.com/hero/shaders").unwrap();
        let url = fetcher.url_for(Path::new("common/noise.glsl")).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/hero/shaders/common/noise.glsl");
    }

    #[test]
    fn http_fetcher_rejects_bad_base() {
        assert!(matches!(
            HttpFetcher::new("not a url"),
            Err(FetchError::InvalidLocation(_))
        ));
    }
}
