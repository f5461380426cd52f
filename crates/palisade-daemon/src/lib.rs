//! palisade-daemon: wires identity bootstrap, monitors and the policy
//! resolver into a supervised enforcement node.
//!
//! Startup order is fixed: configuration, then strategy selection, then
//! assembly, then monitor start, then a blocking wait for a termination
//! signal (interrupt, terminate or quit), then best-effort shutdown.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod policy;
pub mod sockmon;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use palisade_core::monitor::{MetadataExtractor, MonitorBinding, MonitorKind};
use palisade_core::{assemble, AuthMode, DEMO_PASSPHRASE};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

pub use config::{DaemonConfig, MonitorsConfig};
pub use error::{DaemonError, Result};

use extractors::{LabelExtractor, ProcessExtractor};
use policy::NetworkPolicyResolver;
use sockmon::SocketMonitor;

/// palisaded - workload-policy enforcement daemon.
#[derive(Debug, Parser)]
#[command(name = "palisaded", version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "/etc/palisade/config.toml")]
    config: PathBuf,

    /// Override the configured auth mode (psk, pki, compact-pki, hybrid).
    #[arg(long)]
    auth: Option<String>,

    /// Override the configured node name.
    #[arg(long)]
    node_name: Option<String>,

    /// Override the tracing filter (also via PALISADE_LOG).
    #[arg(long, env = "PALISADE_LOG")]
    log_level: Option<String>,
}

/// Run the daemon until a termination signal arrives.
pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = DaemonConfig::load(&args.config)?;

    if let Some(auth) = &args.auth {
        config.secrets.mode = AuthMode::from_str(auth)?;
    }
    if let Some(node_name) = args.node_name {
        config.node_name = node_name;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(node = %config.node_name, mode = %config.secrets.mode, "palisade starting");

    // The demo passphrase is a known, insecure default. It is injected here,
    // visibly, rather than deep inside the selector.
    if config.secrets.mode == AuthMode::Psk && config.secrets.passphrase.is_none() {
        warn!("no passphrase configured, using the built-in demo passphrase");
        config.secrets.passphrase = Some(DEMO_PASSPHRASE.to_string());
    }

    let resolver = Arc::new(NetworkPolicyResolver::new(config.networks.clone()));

    let strategy = palisade_core::select(&config.secrets, resolver.as_ref(), &config.node_name)?;
    let bindings = build_bindings(&config.monitors)?;

    let mut instance = assemble(
        config.node_name.clone(),
        strategy,
        bindings,
        resolver.clone(),
    )?;

    instance.start().await?;
    info!("everything started, waiting for stop signal");

    wait_for_termination().await?;

    if let Err(e) = instance.stop().await {
        error!(error = %e, "shutdown completed with monitor stop failures");
    }
    info!("everything stopped, bye");
    Ok(())
}

/// Build the monitor bindings the configuration enables.
fn build_bindings(monitors: &MonitorsConfig) -> Result<Vec<MonitorBinding>> {
    let mut bindings = Vec::new();

    let mut add = |kind: MonitorKind, socket: &str, extractor: Arc<dyn MetadataExtractor>| {
        let path = monitors.socket_dir.join(socket);
        bindings.push(MonitorBinding::new(
            kind,
            Box::new(SocketMonitor::new(kind, path)),
            extractor,
        ));
    };

    if monitors.container {
        add(
            MonitorKind::ContainerRuntime,
            "container.sock",
            Arc::new(LabelExtractor),
        );
    }
    if monitors.process {
        add(
            MonitorKind::ProcessCgroup,
            "process.sock",
            Arc::new(ProcessExtractor),
        );
    }
    if monitors.cni {
        add(MonitorKind::Cni, "cni.sock", Arc::new(LabelExtractor));
    }

    if bindings.is_empty() {
        return Err(DaemonError::Config(
            "no monitors enabled, enable at least one of container/process/cni".to_string(),
        ));
    }
    Ok(bindings)
}

/// Block until SIGINT, SIGTERM or SIGQUIT is delivered.
async fn wait_for_termination() -> std::io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = interrupt.recv() => info!("interrupt received"),
        _ = terminate.recv() => info!("terminate received"),
        _ = quit.recv() => info!("quit received"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_one_container_binding() {
        let monitors = MonitorsConfig::default();
        let bindings = build_bindings(&monitors).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].kind, MonitorKind::ContainerRuntime);
    }

    #[test]
    fn all_monitors_disabled_is_a_config_error() {
        let monitors = MonitorsConfig {
            container: false,
            process: false,
            cni: false,
            ..MonitorsConfig::default()
        };
        let err = build_bindings(&monitors).unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)), "{err}");
    }

    #[test]
    fn enabled_monitors_each_get_a_binding() {
        let monitors = MonitorsConfig {
            container: true,
            process: true,
            cni: true,
            socket_dir: PathBuf::from("/tmp/palisade-test"),
        };
        let bindings = build_bindings(&monitors).unwrap();
        let kinds: Vec<_> = bindings.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MonitorKind::ContainerRuntime,
                MonitorKind::ProcessCgroup,
                MonitorKind::Cni
            ]
        );
    }
}
