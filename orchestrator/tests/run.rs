use std::time::Duration;

use orchestrator::{Orchestrator, OrchestratorError, configs::OrchestratorConfig};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

fn local_config(dir: &std::path::Path) -> OrchestratorConfig {
    let original = dir.join("original.npz");
    std::fs::write(&original, b"weights").unwrap();

    OrchestratorConfig {
        registry_addr: "127.0.0.1:0".parse().unwrap(),
        coordinator_addr: "127.0.0.1:0".parse().unwrap(),
        model_folder: dir.join("model"),
        original_model: original,
        poll_interval_ms: 10,
        shutdown_grace_ms: 500,
        ..Default::default()
    }
}

#[tokio::test]
async fn serves_while_discovering_and_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::bind(local_config(dir.path())).await.unwrap();
    let registry_addr = orchestrator.registry_addr().unwrap();
    let coordinator_addr = orchestrator.coordinator_addr().unwrap();

    let shutdown = CancellationToken::new();
    let running = tokio::spawn(orchestrator.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(TcpStream::connect(registry_addr).await.is_ok());
    assert!(TcpStream::connect(coordinator_addr).await.is_ok());
    assert!(dir.path().join("model").join("model-00000.npz").exists());

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn missing_original_model_stops_everything() {
    let dir = tempfile::tempdir().unwrap();
    let config = OrchestratorConfig {
        original_model: dir.path().join("missing.npz"),
        ..local_config(dir.path())
    };

    let shutdown = CancellationToken::new();
    let result = Orchestrator::bind(config)
        .await
        .unwrap()
        .run(shutdown.clone())
        .await;

    assert!(matches!(result, Err(OrchestratorError::Io(_))));
    assert!(shutdown.is_cancelled());
}

#[tokio::test]
async fn invalid_config_is_rejected_before_binding() {
    let config = OrchestratorConfig {
        clients: 0,
        ..Default::default()
    };

    assert!(matches!(
        Orchestrator::bind(config).await,
        Err(OrchestratorError::InvalidConfig(_))
    ));
}
