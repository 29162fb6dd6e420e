use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigLoadError};

const MIB: u64 = 1024 * 1024;

/// Names a TOML or JSON file to load settings from.
pub const CONFIG_PATH_VAR: &str = "FERREX_UPLOAD_CONFIG_PATH";
/// Holds the settings themselves as inline JSON.
pub const CONFIG_JSON_VAR: &str = "FERREX_UPLOAD_CONFIG_JSON";

const DEFAULT_FILES: [&str; 2] =
    ["texture_upload.toml", "config/texture_upload.toml"];

/// Source that produced the streaming configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Knobs for the texture streaming pipeline.
///
/// Fields that determine which staging backend exists, or how it is sized,
/// are captured by [`BackendSignature`]; changing any of them makes the next
/// tick tear the backend down and build a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Master switch for staged uploads. When off every upload goes straight
    /// from client memory (if allowed).
    pub enable_pbo_streaming: bool,
    /// Permit the no-staging path when staging is unavailable or full.
    pub allow_direct_uploads: bool,
    /// Refuse the persistent-mapped ring even if the context supports it.
    pub force_disable_persistent: bool,
    /// Ring mapping is coherent; otherwise each write is flushed explicitly.
    pub use_coherent_mapping: bool,
    /// Hard cap on uploads issued per tick.
    pub max_uploads_per_frame: u32,
    /// Hard cap on bytes uploaded per tick.
    pub max_bytes_per_frame: u64,
    /// Requests larger than this never try a staged path.
    pub max_staging_bytes: u64,
    /// Capacity of the persistent-mapped ring.
    pub persistent_ring_bytes: u64,
    /// Capacity of each triple-buffer slot.
    pub triple_buffer_bytes: u64,
    /// Alignment of ring allocations.
    pub pbo_alignment: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enable_pbo_streaming: true,
            allow_direct_uploads: true,
            force_disable_persistent: false,
            use_coherent_mapping: true,
            max_uploads_per_frame: 8,
            max_bytes_per_frame: 16 * MIB,
            max_staging_bytes: 8 * MIB,
            persistent_ring_bytes: 32 * MIB,
            triple_buffer_bytes: 8 * MIB,
            pbo_alignment: 256,
        }
    }
}

/// The backend-identity-affecting subset of [`StreamingConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendSignature {
    pub enable_pbo_streaming: bool,
    pub force_disable_persistent: bool,
    pub use_coherent_mapping: bool,
    pub persistent_ring_bytes: u64,
    pub triple_buffer_bytes: u64,
    pub pbo_alignment: u64,
}

impl StreamingConfig {
    pub fn backend_signature(&self) -> BackendSignature {
        BackendSignature {
            enable_pbo_streaming: self.enable_pbo_streaming,
            force_disable_persistent: self.force_disable_persistent,
            use_coherent_mapping: self.use_coherent_mapping,
            persistent_ring_bytes: self.persistent_ring_bytes,
            triple_buffer_bytes: self.triple_buffer_bytes,
            pbo_alignment: self.pbo_alignment,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pbo_alignment == 0 || !self.pbo_alignment.is_power_of_two() {
            return Err(ConfigError::InvalidAlignment(self.pbo_alignment));
        }
        if self.max_uploads_per_frame == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_uploads_per_frame",
            });
        }
        if self.max_bytes_per_frame == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_bytes_per_frame",
            });
        }
        if self.max_staging_bytes == 0 {
            return Err(ConfigError::ZeroLimit {
                field: "max_staging_bytes",
            });
        }
        if self.enable_pbo_streaming {
            if self.persistent_ring_bytes == 0 {
                return Err(ConfigError::ZeroLimit {
                    field: "persistent_ring_bytes",
                });
            }
            if self.triple_buffer_bytes == 0 {
                return Err(ConfigError::ZeroLimit {
                    field: "triple_buffer_bytes",
                });
            }
        }
        Ok(())
    }

    /// Resolve settings from the process environment and working directory.
    /// See [`StreamingConfig::resolve`] for the lookup order.
    pub fn load_from_env() -> Result<(Self, ConfigSource), ConfigLoadError> {
        Self::resolve(|name| env::var(name).ok(), Path::new(""))
    }

    /// First match wins:
    /// 1) a file named by `FERREX_UPLOAD_CONFIG_PATH`,
    /// 2) inline JSON in `FERREX_UPLOAD_CONFIG_JSON`,
    /// 3) `texture_upload.toml` or `config/texture_upload.toml` under
    ///    `base_dir`,
    /// 4) defaults.
    ///
    /// Blank variables count as unset.
    pub fn resolve<F>(
        lookup: F,
        base_dir: &Path,
    ) -> Result<(Self, ConfigSource), ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(path) = var(CONFIG_PATH_VAR) {
            let path = PathBuf::from(path);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ConfigSource::EnvPath(path)));
        }
        if let Some(raw) = var(CONFIG_JSON_VAR) {
            let config = Self::from_json_str(&raw, CONFIG_JSON_VAR)?;
            return Ok((config, ConfigSource::EnvInline));
        }

        let default_file = DEFAULT_FILES
            .iter()
            .map(|name| base_dir.join(name))
            .find(|path| path.is_file());
        match default_file {
            Some(path) => {
                let config = Self::load_from_file(&path)?;
                Ok((config, ConfigSource::File(path)))
            }
            None => Ok((Self::default(), ConfigSource::Default)),
        }
    }

    /// Read a `.json` file as JSON and anything else as TOML.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let origin = path.display().to_string();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&contents, &origin)
        } else {
            Self::from_toml_str(&contents, &origin)
        }
    }

    pub fn from_toml_str(
        contents: &str,
        origin: &str,
    ) -> Result<Self, ConfigLoadError> {
        let config: Self =
            toml::from_str(contents).map_err(|source| ConfigLoadError::Toml {
                origin: origin.to_owned(),
                source,
            })?;
        config.validated(origin)
    }

    pub fn from_json_str(
        contents: &str,
        origin: &str,
    ) -> Result<Self, ConfigLoadError> {
        let config: Self = serde_json::from_str(contents).map_err(|source| {
            ConfigLoadError::Json {
                origin: origin.to_owned(),
                source,
            }
        })?;
        config.validated(origin)
    }

    fn validated(self, origin: &str) -> Result<Self, ConfigLoadError> {
        self.validate().map_err(|source| ConfigLoadError::Invalid {
            origin: origin.to_owned(),
            source,
        })?;
        Ok(self)
    }
}
