//! Unix-socket workload event monitor.
//!
//! Listens on a unix domain socket for newline-delimited JSON workload
//! events (one [`WorkloadEvent`] per line) injected by runtime shims or
//! operators, and dispatches each to the registered handler. This is the
//! transport boundary: palisade does not itself watch a container runtime.

use std::path::PathBuf;

use async_trait::async_trait;
use palisade_core::monitor::{Monitor, MonitorKind, WorkloadEvent, WorkloadEventHandler};
use palisade_core::{CoreError, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// A [`Monitor`] fed through a unix domain socket.
pub struct SocketMonitor {
    kind: MonitorKind,
    path: PathBuf,
    handler: Option<WorkloadEventHandler>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl SocketMonitor {
    /// Create a monitor that will listen on `path` once started.
    pub fn new(kind: MonitorKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            handler: None,
            shutdown: None,
            task: None,
        }
    }

    /// The socket path this monitor listens on.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl Monitor for SocketMonitor {
    fn register_handler(&mut self, handler: WorkloadEventHandler) {
        self.handler = Some(handler);
    }

    async fn start(&mut self) -> Result<()> {
        let handler = self.handler.clone().ok_or_else(|| {
            CoreError::Monitor("no event handler registered before start".to_string())
        })?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Monitor(format!("creating {}: {e}", parent.display())))?;
        }
        // A stale socket from a previous run blocks bind.
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .map_err(|e| CoreError::Monitor(format!("removing stale socket: {e}")))?;
        }

        let listener = UnixListener::bind(&self.path)
            .map_err(|e| CoreError::Monitor(format!("bind {}: {e}", self.path.display())))?;
        info!(monitor = %self.kind, socket = %self.path.display(), "event socket bound");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let kind = self.kind;

        self.task = Some(tokio::spawn(async move {
            let mut connections = JoinSet::new();
            let mut shutdown = shutdown_rx.clone();
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        debug!(monitor = %kind, "event socket shutting down");
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            connections.spawn(serve_connection(
                                kind,
                                stream,
                                handler.clone(),
                                shutdown_rx.clone(),
                            ));
                        }
                        Err(e) => {
                            warn!(monitor = %kind, error = %e, "accept failed");
                        }
                    },
                }
            }
            // Connections observe the same shutdown signal; wait for every
            // one to wind down so no event is dispatched past stop.
            while connections.join_next().await.is_some() {}
            debug!(monitor = %kind, "all event connections released");
        }));
        self.shutdown = Some(shutdown_tx);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(monitor = %self.kind, error = %e, "accept loop did not exit cleanly");
            }
        }
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(monitor = %self.kind, error = %e, "could not remove socket file");
            }
        }
        Ok(())
    }
}

/// Read newline-delimited JSON events from one client until it disconnects
/// or the monitor shuts down.
async fn serve_connection(
    kind: MonitorKind,
    stream: UnixStream,
    handler: WorkloadEventHandler,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<WorkloadEvent>(&line) {
                        Ok(event) => {
                            debug!(monitor = %kind, context = %event.context_id, "event received");
                            handler(event);
                        }
                        Err(e) => {
                            warn!(monitor = %kind, error = %e, "discarding malformed event line");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(monitor = %kind, error = %e, "event connection read failed");
                    break;
                }
            },
        }
    }
}
