//! Instance assembly and lifecycle supervision.
//!
//! [`assemble`] is pure composition: it combines the selected secret
//! strategy, the monitor bindings and the policy resolver into a value
//! object without starting any background activity. The lifecycle then moves
//! strictly `Created -> Running -> Stopping -> Stopped`, driven by a single
//! owner; partial starts are rolled back and never left running.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{CoreError, Result};
use crate::monitor::{MonitorBinding, PolicyResolver, WorkloadEventHandler};
use crate::secrets::SecretStrategy;

/// Lifecycle state of an assembled instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Assembled, nothing started.
    Created,
    /// All monitors started.
    Running,
    /// Stop in progress.
    Stopping,
    /// Stop completed (or startup rolled back).
    Stopped,
}

/// The live assembled system: secret strategy, monitor bindings and policy
/// resolver, plus the lifecycle state machine that drives them.
pub struct RunningInstance {
    node_id: String,
    strategy: SecretStrategy,
    bindings: Vec<MonitorBinding>,
    resolver: Arc<dyn PolicyResolver>,
    state: LifecycleState,
}

impl std::fmt::Debug for RunningInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningInstance")
            .field("node_id", &self.node_id)
            .field("bindings", &self.bindings.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Compose a runnable instance from its collaborators.
///
/// No I/O and no background activity; fails only if no monitor binding is
/// present or the secret strategy carries no usable material.
pub fn assemble(
    node_id: impl Into<String>,
    strategy: SecretStrategy,
    bindings: Vec<MonitorBinding>,
    resolver: Arc<dyn PolicyResolver>,
) -> Result<RunningInstance> {
    if bindings.is_empty() {
        return Err(CoreError::Configuration(
            "at least one monitor binding is required".to_string(),
        ));
    }
    if !strategy.is_populated() {
        return Err(CoreError::Configuration(
            "secret strategy carries no usable material".to_string(),
        ));
    }

    Ok(RunningInstance {
        node_id: node_id.into(),
        strategy,
        bindings,
        resolver,
        state: LifecycleState::Created,
    })
}

impl RunningInstance {
    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The active secret strategy.
    pub fn strategy(&self) -> &SecretStrategy {
        &self.strategy
    }

    /// Node identifier this instance runs as.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Start every monitor binding, wiring each monitor's events through its
    /// extractor into the policy resolver.
    ///
    /// If any monitor fails to start, already-started monitors are stopped
    /// in reverse order (best effort) and the instance ends `Stopped` with a
    /// [`CoreError::MonitorStart`] — a partial start is never left running.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != LifecycleState::Created {
            return Err(CoreError::State(format!(
                "start requested in {:?} state",
                self.state
            )));
        }

        for i in 0..self.bindings.len() {
            let handler = self.event_handler(i);
            let binding = &mut self.bindings[i];
            let kind = binding.kind;
            binding.monitor.register_handler(handler);

            if let Err(e) = binding.monitor.start().await {
                error!(monitor = %kind, error = %e, "monitor failed to start, rolling back");
                self.rollback(i).await;
                self.state = LifecycleState::Stopped;
                return Err(CoreError::MonitorStart {
                    kind,
                    reason: e.to_string(),
                });
            }
            debug!(monitor = %kind, "monitor started");
        }

        self.state = LifecycleState::Running;
        info!(node = %self.node_id, monitors = self.bindings.len(), "instance running");
        Ok(())
    }

    /// Stop every monitor binding.
    ///
    /// Individual stop failures are logged and aggregated into a
    /// [`CoreError::MonitorStop`]; shutdown always runs to completion.
    /// Calling stop on an already-stopped instance is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        match self.state {
            LifecycleState::Stopped | LifecycleState::Stopping => {
                debug!(node = %self.node_id, "stop requested on stopped instance, ignoring");
                return Ok(());
            }
            LifecycleState::Created => {
                self.state = LifecycleState::Stopped;
                return Ok(());
            }
            LifecycleState::Running => {}
        }

        self.state = LifecycleState::Stopping;
        let mut failures = Vec::new();

        for binding in &mut self.bindings {
            if let Err(e) = binding.monitor.stop().await {
                error!(monitor = %binding.kind, error = %e, "monitor failed to stop");
                failures.push(format!("{}: {e}", binding.kind));
            } else {
                debug!(monitor = %binding.kind, "monitor stopped");
            }
        }

        self.state = LifecycleState::Stopped;
        info!(node = %self.node_id, "instance stopped");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CoreError::MonitorStop(failures))
        }
    }

    /// Build the event handler for binding `i`: extract metadata, resolve
    /// policy, log the outcome.
    fn event_handler(&self, i: usize) -> WorkloadEventHandler {
        let extractor = Arc::clone(&self.bindings[i].extractor);
        let resolver = Arc::clone(&self.resolver);
        let node_id = self.node_id.clone();
        let kind = self.bindings[i].kind;

        Arc::new(move |event| match extractor.extract(&event.descriptor) {
            Ok(runtime) => {
                let decision = resolver.resolve(&node_id, &runtime);
                info!(
                    monitor = %kind,
                    context = %event.context_id,
                    event = ?event.kind,
                    workload = %runtime.name,
                    decision = ?decision,
                    "workload event resolved"
                );
            }
            Err(e) => {
                warn!(
                    monitor = %kind,
                    context = %event.context_id,
                    error = %e,
                    "metadata extraction failed"
                );
            }
        })
    }

    /// Stop bindings `0..started` in reverse order, logging failures.
    async fn rollback(&mut self, started: usize) {
        for j in (0..started).rev() {
            let binding = &mut self.bindings[j];
            if let Err(e) = binding.monitor.stop().await {
                warn!(monitor = %binding.kind, error = %e, "rollback stop failed");
            }
        }
    }
}
