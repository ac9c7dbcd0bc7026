use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::fetch::{FetchError, ShaderFetcher};
use crate::manifest::{ShaderManifest, ShaderStage, MANIFEST_FILE};

#[derive(Debug, thiserror::Error)]
pub enum ShaderLoadError {
    #[error("failed to fetch {stage} shader '{}': {source}", path.display())]
    Fetch {
        stage: ShaderStage,
        path: PathBuf,
        #[source]
        source: FetchError,
    },
    #[error("{stage} shader '{}' is empty", path.display())]
    Empty { stage: ShaderStage, path: PathBuf },
    #[error("failed to fetch shader manifest '{}': {source}", path.display())]
    ManifestFetch {
        path: PathBuf,
        #[source]
        source: FetchError,
    },
    #[error("invalid shader manifest: {0}")]
    Manifest(String),
}

/// Vertex and fragment text for one material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderProgram {
    pub vertex: String,
    pub fragment: String,
}

/// The complete, noise-injected source set. Never partially populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSet {
    pub background: ShaderProgram,
    pub particles: ShaderProgram,
    pub links: ShaderProgram,
}

/// Reads `shaders.toml` at the fetcher root, falling back to the default layout
/// when it is absent.
pub fn load_manifest(fetcher: &dyn ShaderFetcher) -> Result<ShaderManifest, ShaderLoadError> {
    let manifest = match fetcher.fetch(Path::new(MANIFEST_FILE)) {
        Ok(text) => ShaderManifest::from_toml_str(&text)
            .map_err(|err| ShaderLoadError::Manifest(err.to_string()))?,
        Err(err) if err.is_not_found() => ShaderManifest::default(),
        Err(source) => {
            return Err(ShaderLoadError::ManifestFetch {
                path: PathBuf::from(MANIFEST_FILE),
                source,
            })
        }
    };
    let issues = manifest.validate();
    if !issues.is_empty() {
        return Err(ShaderLoadError::Manifest(issues.join("; ")));
    }
    Ok(manifest)
}

/// Fetches all seven sources. The first failure aborts the load.
pub fn load_shader_set(
    fetcher: &dyn ShaderFetcher,
    manifest: &ShaderManifest,
) -> Result<ShaderSet, ShaderLoadError> {
    let fetch = |stage: ShaderStage| -> Result<String, ShaderLoadError> {
        let path = manifest.path(stage);
        let text = fetcher
            .fetch(path)
            .map_err(|source| ShaderLoadError::Fetch {
                stage,
                path: path.to_path_buf(),
                source,
            })?;
        if text.trim().is_empty() {
            return Err(ShaderLoadError::Empty {
                stage,
                path: path.to_path_buf(),
            });
        }
        debug!(%stage, path = %path.display(), bytes = text.len(), "fetched shader");
        Ok(text)
    };

    let background_vertex = fetch(ShaderStage::BackgroundVertex)?;
    let background_fragment = fetch(ShaderStage::BackgroundFragment)?;
    let particles_vertex = fetch(ShaderStage::ParticlesVertex)?;
    let particles_fragment = fetch(ShaderStage::ParticlesFragment)?;
    let links_vertex = fetch(ShaderStage::LinksVertex)?;
    let links_fragment = fetch(ShaderStage::LinksFragment)?;
    let noise = fetch(ShaderStage::Noise)?;

    info!(origin = %fetcher.describe(), "shader sources loaded");

    Ok(ShaderSet {
        background: ShaderProgram {
            vertex: background_vertex,
            fragment: inject_noise(&background_fragment, &noise),
        },
        particles: ShaderProgram {
            vertex: particles_vertex,
            fragment: inject_noise(&particles_fragment, &noise),
        },
        links: ShaderProgram {
            vertex: links_vertex,
            fragment: links_fragment,
        },
    })
}

/// Manifest discovery followed by [`load_shader_set`].
pub fn load_from(fetcher: &dyn ShaderFetcher) -> Result<ShaderSet, ShaderLoadError> {
    let manifest = load_manifest(fetcher)?;
    load_shader_set(fetcher, &manifest)
}

/// Splices the shared noise functions into a fragment program. A leading
/// `#version` line stays first; any `#version` in the noise source is dropped.
pub fn inject_noise(fragment: &str, noise: &str) -> String {
    let noise_body = noise
        .lines()
        .filter(|line| !line.trim_start().starts_with("#version"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut out = String::with_capacity(fragment.len() + noise_body.len() + 2);
    let mut lines = fragment.lines().peekable();
    let mut header = Vec::new();
    while let Some(line) = lines.peek() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            header.push(*line);
            lines.next();
            continue;
        }
        if trimmed.starts_with("#version") {
            header.push(*line);
            lines.next();
        }
        break;
    }

    let has_version = header
        .iter()
        .any(|line| line.trim_start().starts_with("#version"));
    if has_version {
        for line in header {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&noise_body);
        out.push('\n');
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }
    } else {
        out.push_str(&noise_body);
        out.push('\n');
        out.push_str(fragment);
        if !fragment.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;

    fn full_fetcher() -> MemoryFetcher {
        MemoryFetcher::new()
            .with("background.vert", "#version 450\nvoid main() {}")
            .with("background.frag", "#version 450\nvoid main() { float x = snoise(vec3(0)); }")
            .with("particles.vert", "#version 450\nvoid main() {}")
            .with("particles.frag", "#version 450\nvoid main() {}")
            .with("links.vert", "#version 450\nvoid main() {}")
            .with("links.frag", "#version 450\nvoid main() {}")
            .with("noise.glsl", "#version 450\nfloat snoise(vec3 v) { return 0.0; }")
    }

    #[test]
    fn loads_complete_set_with_noise() {
        let set = load_from(&full_fetcher()).expect("load");
        assert!(set.background.fragment.starts_with("#version 450\nfloat snoise"));
        assert_eq!(set.background.fragment.matches("#version").count(), 1);
        assert!(set.particles.fragment.contains("snoise"));
        assert!(!set.links.fragment.contains("snoise"));
    }

    #[test]
    fn any_missing_stage_fails_whole_load() {
        let mut fetcher = full_fetcher();
        fetcher.remove("links.frag");
        let err = load_from(&fetcher).unwrap_err();
        match err {
            ShaderLoadError::Fetch { stage, path, source } => {
                assert_eq!(stage, ShaderStage::LinksFragment);
                assert_eq!(path, PathBuf::from("links.frag"));
                assert!(source.is_not_found());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_source_is_rejected() {
        let mut fetcher = full_fetcher();
        fetcher.insert("noise.glsl", "   \n");
        assert!(matches!(
            load_from(&fetcher),
            Err(ShaderLoadError::Empty { stage: ShaderStage::Noise, .. })
        ));
    }

    #[test]
    fn manifest_redirects_paths() {
        let fetcher = full_fetcher()
            .with("shaders.toml", "noise = \"lib/noise.glsl\"")
            .with("lib/noise.glsl", "float custom_noise() { return 1.0; }");
        let set = load_from(&fetcher).unwrap();
        assert!(set.particles.fragment.contains("custom_noise"));
    }

    #[test]
    fn invalid_manifest_is_reported() {
        let fetcher = full_fetcher().with("shaders.toml", "noise = \"../noise.glsl\"");
        assert!(matches!(load_from(&fetcher), Err(ShaderLoadError::Manifest(_))));
    }

    struct UnreachableManifest(MemoryFetcher);

    impl ShaderFetcher for UnreachableManifest {
        fn fetch(&self, path: &Path) -> Result<String, FetchError> {
            if path == Path::new(MANIFEST_FILE) {
                return Err(FetchError::Status {
                    url: "https://cdn.example/shaders.toml".into(),
                    status: 503,
                });
            }
            self.0.fetch(path)
        }

        fn describe(&self) -> String {
            "unreachable manifest".into()
        }
    }

    #[test]
    fn manifest_fetch_failure_is_not_a_stage_error() {
        let err = load_from(&UnreachableManifest(full_fetcher())).unwrap_err();
        match err {
            ShaderLoadError::ManifestFetch { path, source } => {
                assert_eq!(path, PathBuf::from(MANIFEST_FILE));
                assert!(matches!(source, FetchError::Status { status: 503, .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn injects_without_version_header() {
        let out = inject_noise("void main() {}", "float n() { return 0.0; }");
        assert!(out.starts_with("float n()"));
        assert!(out.contains("void main"));
    }

    #[test]
    fn keeps_leading_comments_before_version() {
        let out = inject_noise("// hero\n#version 450\nvoid main() {}\n", "float n;");
        assert_eq!(out, "// hero\n#version 450\nfloat n;\nvoid main() {}\n");
    }
}
