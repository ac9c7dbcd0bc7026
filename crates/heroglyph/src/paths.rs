use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "HEROGLYPH_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "HEROGLYPH_DATA_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "heroglyph";
const APPLICATION: &str = "heroglyph";

pub const CONFIG_FILE: &str = "hero.toml";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let config_override = env_override(ENV_CONFIG_DIR);
        let data_override = env_override(ENV_DATA_DIR);
        if let (Some(config_dir), Some(data_dir)) = (config_override.clone(), data_override.clone())
        {
            return Ok(Self {
                config_dir,
                data_dir,
            });
        }

        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        Ok(Self {
            config_dir: config_override.unwrap_or_else(|| project_dirs.config_dir().to_path_buf()),
            data_dir: data_override.unwrap_or_else(|| project_dirs.data_dir().to_path_buf()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Shader search order: user config, user data, then the bundled assets.
    pub fn shader_roots(&self) -> Vec<PathBuf> {
        vec![
            self.config_dir.join("shaders"),
            self.data_dir.join("shaders"),
            bundled_shader_dir(),
        ]
    }
}

pub fn bundled_shader_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/shaders")
}

#[cfg(test)]
impl AppPaths {
    pub fn from_raw(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_dir,
            data_dir,
        }
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.as_os_str().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_lives_in_config_dir() {
        let paths = AppPaths::from_raw("/tmp/cfg".into(), "/tmp/data".into());
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/cfg/hero.toml"));
        assert_eq!(paths.data_dir(), Path::new("/tmp/data"));
    }

    #[test]
    fn bundled_shaders_come_last() {
        let paths = AppPaths::from_raw("/tmp/cfg".into(), "/tmp/data".into());
        let roots = paths.shader_roots();
        assert_eq!(roots[0], PathBuf::from("/tmp/cfg/shaders"));
        assert_eq!(roots.last(), Some(&bundled_shader_dir()));
    }
}
