//! Daemon configuration loaded from TOML.
//!
//! Every section is optional; a missing file yields [`Config::default`].
//!
//! ```toml
//! [paths]
//! etc_dir = "/etc"
//! shadow_root = "/system/etc"
//!
//! [engine]
//! backoff_base_ms = 100
//! backoff_max_ms = 10000
//!
//! [discovery]
//! enabled = true
//! registry_dir = "/var/lib/nodestate/registry"
//! kubeconfig = "/etc/kubernetes/kubeconfig"
//!
//! [[files]]
//! name = "hosts"
//! contents = "127.0.0.1 localhost\n"
//! mode = 0o644
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use nodestate_core::{Error, Result};
use nodestate_runtime::{BackoffConfig, EngineConfig};

/// Highest permission bits a desired file may request.
const MAX_MODE: u32 = 0o7777;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub paths: PathsConfig,
    pub engine: EngineSection,
    pub discovery: DiscoverySection,
    pub files: Vec<FileEntry>,
}

/// Where etc files are exposed and where their writable copies live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub etc_dir: PathBuf,
    pub shadow_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            etc_dir: PathBuf::from("/etc"),
            shadow_root: PathBuf::from("/system/etc"),
        }
    }
}

/// Restart backoff, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            backoff_base_ms: u64::try_from(backoff.base.as_millis()).unwrap_or(u64::MAX),
            backoff_max_ms: u64::try_from(backoff.max.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl EngineSection {
    /// Engine configuration these settings describe.
    #[must_use]
    pub const fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            backoff: BackoffConfig {
                base: Duration::from_millis(self.backoff_base_ms),
                max: Duration::from_millis(self.backoff_max_ms),
            },
        }
    }
}

/// Affiliate discovery through a registry directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoverySection {
    pub enabled: bool,
    pub registry_dir: PathBuf,
    pub kubeconfig: PathBuf,
    /// Name of this node in the registry. Falls back to the kernel hostname.
    pub nodename: Option<String>,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            enabled: false,
            registry_dir: PathBuf::from("/var/lib/nodestate/registry"),
            kubeconfig: PathBuf::from("/etc/kubernetes/kubeconfig"),
            nodename: None,
        }
    }
}

/// One desired file under the etc directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileEntry {
    pub name: String,
    #[serde(default)]
    pub contents: String,
    #[serde(default = "default_mode")]
    pub mode: u32,
    #[serde(default)]
    pub label: Option<String>,
}

const fn default_mode() -> u32 {
    0o644
}

impl Config {
    /// Load from `path`, or return defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(Error::file_read_failed(path, e)),
        }
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `TomlParseFailed` for malformed input and `InvalidConfig`
    /// when [`Config::validate`] rejects it.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(Error::toml_parse_failed)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.engine.backoff_base_ms == 0 {
            return Err(Error::invalid_config("engine.backoff_base_ms must be positive"));
        }
        if self.engine.backoff_base_ms > self.engine.backoff_max_ms {
            return Err(Error::invalid_config(
                "engine.backoff_base_ms must not exceed engine.backoff_max_ms",
            ));
        }
        if self.discovery.nodename.as_deref() == Some("") {
            return Err(Error::invalid_config("discovery.nodename must not be empty"));
        }

        let mut seen = std::collections::BTreeSet::new();
        for file in &self.files {
            if !is_relative_name(&file.name) {
                return Err(Error::invalid_config(format!(
                    "file name '{}' must be a relative path without '..'",
                    file.name
                )));
            }
            if file.mode > MAX_MODE {
                return Err(Error::invalid_config(format!(
                    "file '{}' has mode {:o} outside {MAX_MODE:o}",
                    file.name, file.mode
                )));
            }
            if !seen.insert(file.name.as_str()) {
                return Err(Error::invalid_config(format!(
                    "file '{}' is listed twice",
                    file.name
                )));
            }
        }
        Ok(())
    }
}

fn is_relative_name(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}
