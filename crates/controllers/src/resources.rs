//! Resource types read and written by the reference controllers.

use serde::{Deserialize, Serialize};

use nodestate_resources::ResourceSpec;

/// Default mode of a desired etc file.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// A desired file under the etc directory. The resource id is the path
/// relative to that directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcFileSpec {
    pub contents: Vec<u8>,
    pub mode: u32,
    pub selinux_label: String,
}

impl Default for EtcFileSpec {
    fn default() -> Self {
        Self {
            contents: Vec::new(),
            mode: DEFAULT_FILE_MODE,
            selinux_label: String::new(),
        }
    }
}

impl EtcFileSpec {
    /// Create a spec with the given contents and mode.
    pub fn new(contents: impl Into<Vec<u8>>, mode: u32) -> Self {
        Self {
            contents: contents.into(),
            mode,
            selinux_label: String::new(),
        }
    }

    /// Set the security label.
    #[must_use]
    pub fn with_selinux_label(mut self, label: impl Into<String>) -> Self {
        self.selinux_label = label.into();
        self
    }
}

impl ResourceSpec for EtcFileSpec {
    const TYPE: &'static str = "EtcFileSpecs.files";
    const NAMESPACE: &'static str = "files";
}

/// Applied state of an etc file: the spec version last written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcFileStatus {
    pub spec_version: String,
}

impl ResourceSpec for EtcFileStatus {
    const TYPE: &'static str = "EtcFileStatuses.files";
    const NAMESPACE: &'static str = "files";
}

/// Cluster discovery configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub registry_kubernetes_enabled: bool,
}

impl DiscoveryConfig {
    /// The single id this resource lives under.
    pub const ID: &'static str = "cluster";
}

impl ResourceSpec for DiscoveryConfig {
    const TYPE: &'static str = "DiscoveryConfigs.cluster";
    const NAMESPACE: &'static str = "config";
}

/// Name this node is registered under in the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nodename {
    pub nodename: String,
}

impl Nodename {
    /// The single id this resource lives under.
    pub const ID: &'static str = "nodename";
}

impl ResourceSpec for Nodename {
    const TYPE: &'static str = "Nodenames.kubernetes";
    const NAMESPACE: &'static str = "k8s";
}

/// Another cluster member as seen by one discovery registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffiliateSpec {
    pub node_id: String,
    pub hostname: String,
    pub nodename: String,
    pub machine_type: String,
    pub addresses: Vec<String>,
}

impl ResourceSpec for AffiliateSpec {
    const TYPE: &'static str = "Affiliates.cluster";
    const NAMESPACE: &'static str = "cluster-raw";
}

/// Whether block devices have settled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesStatus {
    pub ready: bool,
}

impl DevicesStatus {
    /// The single id this resource lives under.
    pub const ID: &'static str = "devices";
}

impl ResourceSpec for DevicesStatus {
    const TYPE: &'static str = "DevicesStatuses.runtime";
    const NAMESPACE: &'static str = "runtime";
}
