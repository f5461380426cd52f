//! palisade-core: identity bootstrap and instance supervision for the
//! palisade workload-policy enforcement daemon.
//!
//! # Architecture
//!
//! Startup is a strict pipeline:
//!
//! 1. [`secrets::select`] chooses exactly one authentication mode (PSK, PKI,
//!    compact-PKI, hybrid) and produces a fully populated
//!    [`secrets::SecretStrategy`], loading PEM material via [`material`] and
//!    minting a compact identity token via [`token`] where the mode calls
//!    for one.
//! 2. [`instance::assemble`] composes the strategy, the monitor bindings and
//!    the policy resolver into a [`instance::RunningInstance`].
//! 3. The instance lifecycle runs `Created -> Running -> Stopping ->
//!    Stopped`, with best-effort rollback on partial starts and idempotent,
//!    always-completing shutdown.
//!
//! Every startup-time failure is fatal: the operator fixes inputs and
//! restarts. Only monitor-stop failures during shutdown are tolerated, and
//! those are aggregated for reporting.

#![warn(missing_docs)]

pub mod error;
pub mod instance;
pub mod material;
pub mod monitor;
pub mod secrets;
pub mod token;

// Re-exports for convenience.
pub use error::{CoreError, Result};
pub use instance::{assemble, LifecycleState, RunningInstance};
pub use material::{CertificateMaterial, PrivateKeyMaterial};
pub use monitor::{
    EventKind, MetadataExtractor, Monitor, MonitorBinding, MonitorKind, PolicyDecision,
    PolicyResolver, WorkloadDescriptor, WorkloadEvent, WorkloadEventHandler, WorkloadRuntime,
};
pub use secrets::{
    select, AuthMode, CompactPkiBundle, Passphrase, PkiBundle, SecretStrategy, SecretsConfig,
    DEMO_PASSPHRASE,
};
pub use token::{mint, CompactToken, UNLIMITED_EXPIRY};
