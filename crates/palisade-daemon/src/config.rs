//! Daemon configuration.

use std::path::PathBuf;

use palisade_core::SecretsConfig;
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};

/// Configuration for a palisade enforcement node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Identifier this node registers and resolves policy under.
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Authentication mode and material paths.
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Which monitors to run and where they listen.
    #[serde(default)]
    pub monitors: MonitorsConfig,

    /// Target networks handed to the policy resolver.
    #[serde(default)]
    pub networks: Vec<String>,

    /// Default tracing filter when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Monitor selection and socket placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorsConfig {
    /// Watch container runtime events (default: on).
    #[serde(default = "default_true")]
    pub container: bool,

    /// Watch Linux process/cgroup events.
    #[serde(default)]
    pub process: bool,

    /// Watch CNI network namespace events.
    #[serde(default)]
    pub cni: bool,

    /// Directory holding the per-monitor event sockets.
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            secrets: SecretsConfig::default(),
            monitors: MonitorsConfig::default(),
            networks: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl Default for MonitorsConfig {
    fn default() -> Self {
        Self {
            container: true,
            process: false,
            cni: false,
            socket_dir: default_socket_dir(),
        }
    }
}

impl DaemonConfig {
    /// Load config from a TOML file, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| DaemonError::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }
}

// Default value functions for serde.
fn default_node_name() -> String {
    String::from("palisade-node")
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_socket_dir() -> PathBuf {
    PathBuf::from("/var/run/palisade")
}

const fn default_true() -> bool {
    true
}
