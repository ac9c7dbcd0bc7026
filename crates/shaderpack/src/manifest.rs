//! Describes where each shader stage lives relative to a fetcher root.
//!
//! Types:
//!
//! - `ShaderStage` names the seven sources the hero pipeline needs.
//! - `ShaderManifest` maps every stage to a relative path, defaulting to the
//!   file names shipped in `assets/shaders/` so a bare directory works
//!   without a `shaders.toml`.
//!
//! Functions:
//!
//! - `ShaderManifest::validate` returns human-readable issues instead of
//!   failing on the first one.
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name probed at the fetcher root for an optional manifest.
pub const MANIFEST_FILE: &str = "shaders.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    BackgroundVertex,
    BackgroundFragment,
    ParticlesVertex,
    ParticlesFragment,
    LinksVertex,
    LinksFragment,
    Noise,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 7] = [
        ShaderStage::BackgroundVertex,
        ShaderStage::BackgroundFragment,
        ShaderStage::ParticlesVertex,
        ShaderStage::ParticlesFragment,
        ShaderStage::LinksVertex,
        ShaderStage::LinksFragment,
        ShaderStage::Noise,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ShaderStage::BackgroundVertex => "background vertex",
            ShaderStage::BackgroundFragment => "background fragment",
            ShaderStage::ParticlesVertex => "particle vertex",
            ShaderStage::ParticlesFragment => "particle fragment",
            ShaderStage::LinksVertex => "link vertex",
            ShaderStage::LinksFragment => "link fragment",
            ShaderStage::Noise => "noise",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ShaderManifest {
    #[serde(default = "default_background_vertex")]
    pub background_vertex: PathBuf,
    #[serde(default = "default_background_fragment")]
    pub background_fragment: PathBuf,
    #[serde(default = "default_particles_vertex")]
    pub particles_vertex: PathBuf,
    #[serde(default = "default_particles_fragment")]
    pub particles_fragment: PathBuf,
    #[serde(default = "default_links_vertex")]
    pub links_vertex: PathBuf,
    #[serde(default = "default_links_fragment")]
    pub links_fragment: PathBuf,
    #[serde(default = "default_noise")]
    pub noise: PathBuf,
}

fn default_background_vertex() -> PathBuf {
    PathBuf::from("background.vert")
}

fn default_background_fragment() -> PathBuf {
    PathBuf::from("background.frag")
}

fn default_particles_vertex() -> PathBuf {
    PathBuf::from("particles.vert")
}

fn default_particles_fragment() -> PathBuf {
    PathBuf::from("particles.frag")
}

fn default_links_vertex() -> PathBuf {
    PathBuf::from("links.vert")
}

fn default_links_fragment() -> PathBuf {
    PathBuf::from("links.frag")
}

fn default_noise() -> PathBuf {
    PathBuf::from("noise.glsl")
}

impl Default for ShaderManifest {
    fn default() -> Self {
        Self {
            background_vertex: default_background_vertex(),
            background_fragment: default_background_fragment(),
            particles_vertex: default_particles_vertex(),
            particles_fragment: default_particles_fragment(),
            links_vertex: default_links_vertex(),
            links_fragment: default_links_fragment(),
            noise: default_noise(),
        }
    }
}

impl ShaderManifest {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn path(&self, stage: ShaderStage) -> &Path {
        match stage {
            ShaderStage::BackgroundVertex => &self.background_vertex,
            ShaderStage::BackgroundFragment => &self.background_fragment,
            ShaderStage::ParticlesVertex => &self.particles_vertex,
            ShaderStage::ParticlesFragment => &self.particles_fragment,
            ShaderStage::LinksVertex => &self.links_vertex,
            ShaderStage::LinksFragment => &self.links_fragment,
            ShaderStage::Noise => &self.noise,
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for stage in ShaderStage::ALL {
            let path = self.path(stage);
            if path.as_os_str().is_empty() {
                issues.push(format!("{stage} path must not be empty"));
                continue;
            }
            let escapes = path.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::RootDir | Component::Prefix(_)
                )
            });
            if escapes {
                issues.push(format!(
                    "{stage} path '{}' must stay relative to the shader root",
                    path.display()
                ));
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_manifest_keeps_defaults() {
        let manifest = ShaderManifest::from_toml_str(r#"noise = "common/simplex.glsl""#).unwrap();
        assert_eq!(manifest.noise, PathBuf::from("common/simplex.glsl"));
        assert_eq!(manifest.links_fragment, PathBuf::from("links.frag"));
        assert!(manifest.validate().is_empty());
    }

    #[test]
    fn flags_paths_outside_root() {
        let manifest = ShaderManifest {
            particles_vertex: PathBuf::from("../secret.vert"),
            background_fragment: PathBuf::new(),
            ..ShaderManifest::default()
        };
        let issues = manifest.validate();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("background fragment"));
        assert!(issues[1].contains("particle vertex"));
    }
}
