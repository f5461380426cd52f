//! Collaborator contracts: workload monitors, metadata extractors, and the
//! policy resolver.
//!
//! Monitor implementations own their background activity; this crate only
//! drives their start/stop lifecycle and wires extracted workload metadata
//! into the policy resolver.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The kind of workload-event watcher a binding wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MonitorKind {
    /// Container runtime events (create/start/stop of containers).
    ContainerRuntime,
    /// Linux process and cgroup events.
    ProcessCgroup,
    /// CNI-plugged network namespace events.
    Cni,
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ContainerRuntime => "container-runtime",
            Self::ProcessCgroup => "process-cgroup",
            Self::Cni => "cni",
        };
        f.write_str(s)
    }
}

/// A workload lifecycle event observed by a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Workload was created but has not started.
    Created,
    /// Workload started running.
    Started,
    /// Workload stopped.
    Stopped,
}

/// Runtime-observed facts about a workload, as reported by a monitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkloadDescriptor {
    /// Workload name (container name, process name).
    pub name: String,
    /// Host pid of the workload's main process.
    pub pid: u32,
    /// Image reference, if containerized.
    #[serde(default)]
    pub image: String,
    /// Labels attached to the workload itself.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Labels of the orchestrator service the workload belongs to, when the
    /// workload is managed by one. These take precedence over `labels`.
    #[serde(default)]
    pub service_labels: Option<HashMap<String, String>>,
}

/// A workload lifecycle event with its context identifier and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadEvent {
    /// What happened.
    pub kind: EventKind,
    /// Stable identifier of the workload context.
    pub context_id: String,
    /// Observed facts about the workload.
    pub descriptor: WorkloadDescriptor,
}

/// Policy-relevant identity derived from a workload descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadRuntime {
    /// Workload name.
    pub name: String,
    /// Host pid.
    pub pid: u32,
    /// Identity tags as key-value pairs.
    pub tags: HashMap<String, String>,
    /// Network placement hints (interface name to CIDR).
    pub ip_addresses: HashMap<String, String>,
}

/// Handler invoked by a monitor for each workload lifecycle event.
pub type WorkloadEventHandler = Arc<dyn Fn(WorkloadEvent) + Send + Sync>;

/// A workload-event watcher with a clean start/stop lifecycle.
#[async_trait]
pub trait Monitor: Send {
    /// Register the handler invoked on workload lifecycle events. Must be
    /// called before [`Monitor::start`].
    fn register_handler(&mut self, handler: WorkloadEventHandler);

    /// Start watching. Background activity is owned by the implementation.
    async fn start(&mut self) -> Result<()>;

    /// Stop watching and release resources.
    async fn stop(&mut self) -> Result<()>;
}

/// Extracts workload identity metadata from runtime-observed facts.
pub trait MetadataExtractor: Send + Sync {
    /// Produce a workload identity record, or an error if extraction cannot
    /// proceed (e.g. a required platform client is unreachable).
    fn extract(&self, descriptor: &WorkloadDescriptor) -> Result<WorkloadRuntime>;
}

/// A policy resolution decision for a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Workload traffic is admitted.
    Allow,
    /// Workload traffic is rejected.
    Deny,
}

/// Resolves policy decisions for workloads and records peer identities.
pub trait PolicyResolver: Send + Sync {
    /// Resolve the decision for a workload observed on the named node.
    fn resolve(&self, node_id: &str, runtime: &WorkloadRuntime) -> PolicyDecision;

    /// Register public-key material (certificate PEM) for a node's identity
    /// so peers can validate it.
    fn register_public_key(&self, node_id: &str, cert_pem: &[u8]) -> Result<()>;
}

/// Pairs a monitor with the extractor that interprets its events.
///
/// Created once at assembly time and owned exclusively by the assembled
/// instance; the running instance drives it by reference.
pub struct MonitorBinding {
    /// Which watcher this is.
    pub kind: MonitorKind,
    /// The watcher itself.
    pub monitor: Box<dyn Monitor>,
    /// Extractor applied to every event descriptor.
    pub extractor: Arc<dyn MetadataExtractor>,
}

impl MonitorBinding {
    /// Pair a monitor with its metadata extractor.
    pub fn new(
        kind: MonitorKind,
        monitor: Box<dyn Monitor>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        Self {
            kind,
            monitor,
            extractor,
        }
    }
}

impl fmt::Debug for MonitorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorBinding")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
