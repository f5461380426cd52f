//! Socket monitor and assembled-instance integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use palisade_core::monitor::{
    EventKind, Monitor, MonitorBinding, MonitorKind, PolicyDecision, PolicyResolver,
    WorkloadDescriptor, WorkloadEvent, WorkloadRuntime,
};
use palisade_core::secrets::{Passphrase, SecretStrategy};
use palisade_core::{assemble, CoreError, LifecycleState};
use palisade_daemon::extractors::LabelExtractor;
use palisade_daemon::sockmon::SocketMonitor;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

fn event(context_id: &str, name: &str) -> String {
    let event = WorkloadEvent {
        kind: EventKind::Started,
        context_id: context_id.to_string(),
        descriptor: WorkloadDescriptor {
            name: name.to_string(),
            pid: 7,
            image: "nginx:latest".to_string(),
            labels: HashMap::new(),
            service_labels: None,
        },
    };
    let mut line = serde_json::to_string(&event).unwrap();
    line.push('\n');
    line
}

#[tokio::test]
async fn events_reach_the_registered_handler() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("container.sock");
    let mut monitor = SocketMonitor::new(MonitorKind::ContainerRuntime, path.clone());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    monitor.register_handler(Arc::new(move |event| {
        let _ = tx.send(event);
    }));
    monitor.start().await.unwrap();

    let mut stream = UnixStream::connect(&path).await.unwrap();
    stream.write_all(event("ctx-9", "web").as_bytes()).await.unwrap();
    stream.flush().await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
        .expect("channel open");
    assert_eq!(received.context_id, "ctx-9");
    assert_eq!(received.descriptor.name, "web");

    monitor.stop().await.unwrap();
    assert!(!path.exists(), "socket file removed on stop");
}

#[tokio::test]
async fn malformed_lines_are_discarded_without_killing_the_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("container.sock");
    let mut monitor = SocketMonitor::new(MonitorKind::ContainerRuntime, path.clone());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    monitor.register_handler(Arc::new(move |event| {
        let _ = tx.send(event);
    }));
    monitor.start().await.unwrap();

    let mut stream = UnixStream::connect(&path).await.unwrap();
    stream.write_all(b"{ not json }\n").await.unwrap();
    stream.write_all(event("ctx-1", "db").as_bytes()).await.unwrap();
    stream.flush().await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
        .expect("channel open");
    assert_eq!(received.context_id, "ctx-1");

    monitor.stop().await.unwrap();
}

#[tokio::test]
async fn open_connections_deliver_nothing_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("container.sock");
    let mut monitor = SocketMonitor::new(MonitorKind::ContainerRuntime, path.clone());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    monitor.register_handler(Arc::new(move |event| {
        let _ = tx.send(event);
    }));
    monitor.start().await.unwrap();

    // Establish a connection and prove it is being served.
    let mut stream = UnixStream::connect(&path).await.unwrap();
    stream.write_all(event("before-stop", "web").as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
        .expect("channel open");
    assert_eq!(received.context_id, "before-stop");

    // Stop with the connection still open: the monitor must release it.
    monitor.stop().await.unwrap();

    // A write on the old connection must never reach the handler.
    let _ = stream.write_all(event("after-stop", "web").as_bytes()).await;
    let _ = stream.flush().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        rx.try_recv().is_err(),
        "event dispatched after the monitor stopped"
    );
}

#[tokio::test]
async fn start_without_handler_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = SocketMonitor::new(
        MonitorKind::ContainerRuntime,
        dir.path().join("container.sock"),
    );
    let err = monitor.start().await.unwrap_err();
    assert!(matches!(err, CoreError::Monitor(_)), "{err}");
}

#[tokio::test]
async fn stop_before_start_is_harmless() {
    let dir = tempfile::tempdir().unwrap();
    let mut monitor = SocketMonitor::new(
        MonitorKind::ContainerRuntime,
        dir.path().join("container.sock"),
    );
    monitor.stop().await.unwrap();
}

/// Allow-all resolver that records what it resolved.
#[derive(Default)]
struct RecordingResolver {
    resolved: Mutex<Vec<String>>,
}

impl PolicyResolver for RecordingResolver {
    fn resolve(&self, _node_id: &str, runtime: &WorkloadRuntime) -> PolicyDecision {
        self.resolved.lock().unwrap().push(runtime.name.clone());
        PolicyDecision::Allow
    }

    fn register_public_key(&self, _node_id: &str, _cert_pem: &[u8]) -> palisade_core::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn assembled_instance_routes_socket_events_to_the_resolver() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("container.sock");
    let resolver = Arc::new(RecordingResolver::default());

    let bindings = vec![MonitorBinding::new(
        MonitorKind::ContainerRuntime,
        Box::new(SocketMonitor::new(MonitorKind::ContainerRuntime, path.clone())),
        Arc::new(LabelExtractor),
    )];
    let mut instance = assemble(
        "node1",
        SecretStrategy::PreSharedKey(Passphrase::new("test")),
        bindings,
        Arc::clone(&resolver) as Arc<dyn PolicyResolver>,
    )
    .unwrap();

    instance.start().await.unwrap();
    assert_eq!(instance.state(), LifecycleState::Running);

    let mut stream = UnixStream::connect(&path).await.unwrap();
    stream.write_all(event("ctx-42", "api").as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
    drop(stream);

    // The event travels accept loop -> handler -> extractor -> resolver.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if resolver.resolved.lock().unwrap().contains(&"api".to_string()) {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "event never resolved");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    instance.stop().await.unwrap();
    assert_eq!(instance.state(), LifecycleState::Stopped);

    // Second stop is a no-op.
    instance.stop().await.unwrap();
}
