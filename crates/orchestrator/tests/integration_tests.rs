//! 통합 테스트 -- 조정/집행 전체 플로우 검증
//!
//! configure → connect → start/stop/delete → enforcement 시나리오를
//! 공개 trait(`EngineClient`, `EngineConnector`)만 사용하여 테스트합니다.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use quayside_core::crypto::PassthroughDecryptor;
use quayside_orchestrator::docker::{ContainerStartEvent, ContainerSummary, ImageSummary, PortInfo};
use quayside_orchestrator::{
    ContainerConfiguration, ContainerOrchestrator, ContainerState, ImageConfiguration,
    OrchestrationListener, OrchestratorError, OrchestratorOptions, PortMapping,
    RegistryCredentials,
};

// Mock engine client for integration tests
mod mock {
    use super::*;
    use quayside_orchestrator::EngineConnector;
    use quayside_orchestrator::docker::{
        ContainerCreateRequest, EngineClient, ImageDetails, RegistryAuth,
    };
    use tokio::sync::{Mutex, mpsc};
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    pub struct EngineState {
        pub containers: Mutex<Vec<ContainerSummary>>,
        pub images: Mutex<Vec<ImageSummary>>,
        pub stopped: Mutex<Vec<String>>,
        pub removed: Mutex<Vec<String>>,
        pub create_calls: AtomicUsize,
        pub pull_calls: AtomicUsize,
        pub pull_timeouts: Mutex<Vec<Duration>>,
        pub block_pulls: AtomicBool,
        pub fail_stop: AtomicBool,
        pub fail_subscribe: AtomicBool,
        pub event_tx: Mutex<Option<mpsc::Sender<ContainerStartEvent>>>,
        next_id: AtomicUsize,
    }

    #[derive(Clone, Default)]
    pub struct TestEngineClient {
        pub state: Arc<EngineState>,
    }

    impl TestEngineClient {
        pub async fn add_container(&self, summary: ContainerSummary) {
            self.state.containers.lock().await.push(summary);
        }

        pub async fn add_image(&self, image: ImageSummary) {
            self.state.images.lock().await.push(image);
        }

        pub async fn send_start_event(&self, container_id: &str, image: &str) {
            let tx = self
                .state
                .event_tx
                .lock()
                .await
                .clone()
                .expect("no active event subscription");
            tx.send(ContainerStartEvent {
                container_id: container_id.to_owned(),
                image: image.to_owned(),
            })
            .await
            .expect("event channel closed");
        }
    }

    impl EngineClient for TestEngineClient {
        async fn ping(&self) -> Result<(), OrchestratorError> {
            Ok(())
        }

        async fn list_containers(
            &self,
            all: bool,
        ) -> Result<Vec<ContainerSummary>, OrchestratorError> {
            Ok(self
                .state
                .containers
                .lock()
                .await
                .iter()
                .filter(|c| all || c.state == "running")
                .cloned()
                .collect())
        }

        async fn create_container(
            &self,
            request: &ContainerCreateRequest,
        ) -> Result<String, OrchestratorError> {
            self.state.create_calls.fetch_add(1, Ordering::Relaxed);
            let id = format!(
                "test{:08x}",
                self.state.next_id.fetch_add(1, Ordering::Relaxed)
            );
            let image_id = self
                .state
                .images
                .lock()
                .await
                .iter()
                .find(|img| img.repo_tags.iter().any(|t| *t == request.image))
                .map(|img| img.id.clone())
                .unwrap_or_default();
            self.state.containers.lock().await.push(ContainerSummary {
                id: id.clone(),
                names: vec![format!("/{}", request.name)],
                image: request.image.clone(),
                image_id,
                state: "created".to_owned(),
                ports: Vec::new(),
            });
            Ok(id)
        }

        async fn start_container(&self, id: &str) -> Result<(), OrchestratorError> {
            let mut containers = self.state.containers.lock().await;
            match containers.iter_mut().find(|c| c.id == id) {
                Some(container) => {
                    container.state = "running".to_owned();
                    Ok(())
                }
                None => Err(OrchestratorError::NotFound(id.to_owned())),
            }
        }

        async fn stop_container(&self, id: &str) -> Result<(), OrchestratorError> {
            if self.state.fail_stop.load(Ordering::Relaxed) {
                return Err(OrchestratorError::ProcessExecution {
                    operation: "stop".to_owned(),
                    target: id.to_owned(),
                    reason: "test stop failure".to_owned(),
                });
            }
            self.state.stopped.lock().await.push(id.to_owned());
            let mut containers = self.state.containers.lock().await;
            match containers.iter_mut().find(|c| c.id == id) {
                Some(container) => {
                    container.state = "exited".to_owned();
                    Ok(())
                }
                None => Err(OrchestratorError::NotFound(id.to_owned())),
            }
        }

        async fn remove_container(&self, id: &str) -> Result<(), OrchestratorError> {
            self.state.removed.lock().await.push(id.to_owned());
            let mut containers = self.state.containers.lock().await;
            let before = containers.len();
            containers.retain(|c| c.id != id);
            if containers.len() == before {
                return Err(OrchestratorError::NotFound(id.to_owned()));
            }
            Ok(())
        }

        async fn list_images(&self) -> Result<Vec<ImageSummary>, OrchestratorError> {
            Ok(self.state.images.lock().await.clone())
        }

        async fn inspect_image(&self, id: &str) -> Result<ImageDetails, OrchestratorError> {
            self.state
                .images
                .lock()
                .await
                .iter()
                .find(|img| img.id == id)
                .map(|_| ImageDetails {
                    author: "test".to_owned(),
                    architecture: "amd64".to_owned(),
                    size_bytes: 128,
                })
                .ok_or_else(|| OrchestratorError::NotFound(id.to_owned()))
        }

        async fn pull_image(
            &self,
            name: &str,
            tag: &str,
            _auth: Option<RegistryAuth>,
            timeout: Duration,
            cancel: CancellationToken,
        ) -> Result<(), OrchestratorError> {
            self.state.pull_calls.fetch_add(1, Ordering::Relaxed);
            self.state.pull_timeouts.lock().await.push(timeout);
            if self.state.block_pulls.load(Ordering::Relaxed) {
                cancel.cancelled().await;
                return Err(OrchestratorError::Interrupted(format!(
                    "pull cancelled: {name}:{tag}"
                )));
            }
            let reference = format!("{name}:{tag}");
            let mut images = self.state.images.lock().await;
            if !images.iter().any(|img| img.repo_tags.contains(&reference)) {
                images.push(ImageSummary {
                    id: format!("sha256:test-{name}"),
                    repo_tags: vec![reference],
                    repo_digests: Vec::new(),
                    labels: BTreeMap::new(),
                });
            }
            Ok(())
        }

        async fn remove_image(&self, id: &str) -> Result<(), OrchestratorError> {
            let mut images = self.state.images.lock().await;
            let before = images.len();
            images.retain(|img| img.id != id);
            if images.len() == before {
                return Err(OrchestratorError::NotFound(id.to_owned()));
            }
            Ok(())
        }

        async fn subscribe_start_events(
            &self,
        ) -> Result<mpsc::Receiver<ContainerStartEvent>, OrchestratorError> {
            if self.state.fail_subscribe.load(Ordering::Relaxed) {
                return Err(OrchestratorError::Subscription(
                    "test subscription failure".to_owned(),
                ));
            }
            let (tx, rx) = mpsc::channel(16);
            *self.state.event_tx.lock().await = Some(tx);
            Ok(rx)
        }
    }

    #[derive(Clone, Default)]
    pub struct TestConnector {
        pub client: TestEngineClient,
        pub connect_count: Arc<AtomicUsize>,
    }

    impl EngineConnector for TestConnector {
        type Client = TestEngineClient;

        async fn connect(&self, _host: &str) -> Result<Self::Client, OrchestratorError> {
            self.connect_count.fetch_add(1, Ordering::Relaxed);
            Ok(self.client.clone())
        }
    }
}

fn running_container(id: &str, name: &str, image: &str, image_id: &str) -> ContainerSummary {
    ContainerSummary {
        id: id.to_owned(),
        names: vec![format!("/{name}")],
        image: image.to_owned(),
        image_id: image_id.to_owned(),
        state: "running".to_owned(),
        ports: Vec::new(),
    }
}

fn digest_image(id: &str, tag: &str, digest: &str) -> ImageSummary {
    ImageSummary {
        id: id.to_owned(),
        repo_tags: vec![tag.to_owned()],
        repo_digests: vec![digest.to_owned()],
        labels: BTreeMap::new(),
    }
}

fn enabled_options() -> OrchestratorOptions {
    OrchestratorOptions::builder()
        .enabled(true)
        .engine_host("unix:///var/run/test.sock")
        .build()
        .unwrap()
}

fn enforcing_options(digests: &[&str]) -> OrchestratorOptions {
    let mut builder = OrchestratorOptions::builder()
        .enabled(true)
        .engine_host("unix:///var/run/test.sock")
        .enforcement_enabled(true);
    for digest in digests {
        builder = builder.allow_digest(*digest);
    }
    builder.build().unwrap()
}

fn setup() -> (
    ContainerOrchestrator<mock::TestConnector>,
    mock::TestEngineClient,
    mock::TestConnector,
) {
    let connector = mock::TestConnector::default();
    let client = connector.client.clone();
    let orchestrator =
        ContainerOrchestrator::new(connector.clone(), Arc::new(PassthroughDecryptor));
    (orchestrator, client, connector)
}

#[tokio::test]
async fn test_start_container_full_flow_is_idempotent() {
    let (orchestrator, client, _) = setup();
    orchestrator.configure(enabled_options()).await.unwrap();

    let config = ContainerConfiguration::builder()
        .name("web")
        .image("nginx")
        .build()
        .unwrap();

    let first = orchestrator.start_container(&config).await.unwrap();
    let second = orchestrator.start_container(&config).await.unwrap();

    // Exactly one pull, one create; second call returns the existing id
    assert_eq!(first, second);
    assert_eq!(client.state.pull_calls.load(Ordering::Relaxed), 1);
    assert_eq!(client.state.create_calls.load(Ordering::Relaxed), 1);

    let descriptors = orchestrator.list_container_descriptors().await.unwrap();
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].name, "web");
    assert_eq!(descriptors[0].state, ContainerState::Active);
}

#[tokio::test]
async fn test_start_container_replaces_container_with_different_image() {
    let (orchestrator, client, _) = setup();
    orchestrator.configure(enabled_options()).await.unwrap();

    client
        .add_container(ContainerSummary {
            id: "old1".to_owned(),
            names: vec!["/web".to_owned()],
            image: "nginx:1.25".to_owned(),
            image_id: "sha256:old".to_owned(),
            state: "exited".to_owned(),
            ports: Vec::new(),
        })
        .await;

    let config = ContainerConfiguration::builder()
        .name("web")
        .image("nginx")
        .image_tag("1.27")
        .build()
        .unwrap();

    let id = orchestrator.start_container(&config).await.unwrap();
    assert_ne!(id, "old1");
    assert!(client.state.removed.lock().await.contains(&"old1".to_owned()));

    let descriptors = orchestrator.list_container_descriptors().await.unwrap();
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].image_tag, "1.27");
}

#[tokio::test]
async fn test_descriptors_report_only_wildcard_ports() {
    let (orchestrator, client, _) = setup();
    orchestrator.configure(enabled_options()).await.unwrap();

    let mut container = running_container("c1", "web", "nginx:latest", "sha256:img");
    container.ports = vec![
        PortInfo {
            ip: Some("0.0.0.0".to_owned()),
            private_port: 80,
            public_port: Some(8080),
            protocol: "tcp".to_owned(),
        },
        PortInfo {
            ip: Some("127.0.0.1".to_owned()),
            private_port: 81,
            public_port: Some(8081),
            protocol: "tcp".to_owned(),
        },
        PortInfo {
            ip: None,
            private_port: 82,
            public_port: None,
            protocol: "udp".to_owned(),
        },
    ];
    client.add_container(container).await;

    let descriptors = orchestrator.list_container_descriptors().await.unwrap();
    assert_eq!(descriptors[0].ports.len(), 1);
    assert_eq!(descriptors[0].ports[0].internal, 80);
    assert_eq!(descriptors[0].ports[0].external, 8080);
}

#[tokio::test]
async fn test_enforcement_denies_manually_started_container() {
    let (orchestrator, client, _) = setup();
    client
        .add_image(digest_image("sha256:good", "nginx:latest", "nginx@sha256:allowed"))
        .await;
    client
        .add_image(digest_image("sha256:bad", "evil:latest", "evil@sha256:forbidden"))
        .await;

    orchestrator
        .configure(enforcing_options(&["sha256:allowed"]))
        .await
        .unwrap();

    // Simulate a manual `docker run` of a non-allowlisted image
    client
        .add_container(running_container("rogue1", "rogue", "evil:latest", "sha256:bad"))
        .await;
    client.send_start_event("rogue1", "evil:latest").await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    // Stopped and removed exactly once
    let stopped = client.state.stopped.lock().await;
    let removed = client.state.removed.lock().await;
    assert_eq!(stopped.iter().filter(|id| *id == "rogue1").count(), 1);
    assert_eq!(removed.iter().filter(|id| *id == "rogue1").count(), 1);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_enforcement_permits_allowlisted_container() {
    let (orchestrator, client, _) = setup();
    client
        .add_image(digest_image("sha256:good", "nginx:latest", "nginx@sha256:allowed"))
        .await;

    orchestrator
        .configure(enforcing_options(&["sha256:allowed"]))
        .await
        .unwrap();

    client
        .add_container(running_container("ok1", "web", "nginx:latest", "sha256:good"))
        .await;
    client.send_start_event("ok1", "nginx:latest").await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.state.removed.lock().await.is_empty());

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_stop_container_triggers_resweep_after_digest_removal() {
    let (orchestrator, client, _) = setup();
    // The orchestrated container's digest is NOT in the configured allowlist;
    // it is permitted only through the per-container record.
    client
        .add_image(digest_image("sha256:appimg", "app:latest", "app@sha256:shared"))
        .await;

    orchestrator.configure(enforcing_options(&[])).await.unwrap();

    let config = ContainerConfiguration::builder()
        .name("app")
        .image("app")
        .enforcement_digest("sha256:shared")
        .build()
        .unwrap();
    let app_id = orchestrator.start_container(&config).await.unwrap();

    // A second container rides on the recorded digest
    client
        .add_container(running_container("rider1", "rider", "app:latest", "sha256:appimg"))
        .await;
    client.send_start_event("rider1", "app:latest").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(client.state.removed.lock().await.is_empty());

    // Stopping the orchestrated container removes the recorded digest,
    // and the re-sweep now denies the rider
    orchestrator.stop_container(&app_id).await.unwrap();
    assert!(client.state.removed.lock().await.contains(&"rider1".to_owned()));

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_identity_token_rejected_before_engine_call() {
    let (orchestrator, client, _) = setup();
    orchestrator.configure(enabled_options()).await.unwrap();

    let image = ImageConfiguration::builder()
        .name("private/app")
        .credentials(RegistryCredentials::IdentityToken {
            token: "tok".to_owned(),
        })
        .build()
        .unwrap();

    let result = orchestrator.pull_image(&image).await;
    assert!(matches!(result, Err(OrchestratorError::BadRequest(_))));
    assert_eq!(client.state.pull_calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_configure_disable_then_reenable_reconnects() {
    let (orchestrator, _client, connector) = setup();

    let connects = Arc::new(AtomicUsize::new(0));
    let disconnects = Arc::new(AtomicUsize::new(0));
    let disabled = Arc::new(AtomicUsize::new(0));
    {
        let connects = Arc::clone(&connects);
        let disconnects = Arc::clone(&disconnects);
        let disabled = Arc::clone(&disabled);
        orchestrator.register_listener(OrchestrationListener {
            on_connect: Some(Arc::new(move || {
                connects.fetch_add(1, Ordering::Relaxed);
            })),
            on_disconnect: Some(Arc::new(move || {
                disconnects.fetch_add(1, Ordering::Relaxed);
            })),
            on_disabled: Some(Arc::new(move || {
                disabled.fetch_add(1, Ordering::Relaxed);
            })),
        });
    }

    orchestrator.configure(enabled_options()).await.unwrap();
    assert!(orchestrator.test_connection().await);
    assert_eq!(connects.load(Ordering::Relaxed), 1);

    let off = OrchestratorOptions::builder().enabled(false).build().unwrap();
    orchestrator.configure(off).await.unwrap();
    assert!(!orchestrator.test_connection().await);
    assert_eq!(disabled.load(Ordering::Relaxed), 1);
    assert_eq!(disconnects.load(Ordering::Relaxed), 1);

    orchestrator.configure(enabled_options()).await.unwrap();
    assert!(orchestrator.test_connection().await);
    assert_eq!(connects.load(Ordering::Relaxed), 2);
    assert_eq!(connector.connect_count.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn test_reapplying_same_options_is_noop() {
    let (orchestrator, _client, connector) = setup();
    orchestrator.configure(enabled_options()).await.unwrap();
    orchestrator.configure(enabled_options()).await.unwrap();
    orchestrator.configure(enabled_options()).await.unwrap();
    assert_eq!(connector.connect_count.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_shutdown_interrupts_pending_pull() {
    let (orchestrator, client, _) = setup();
    orchestrator.configure(enabled_options()).await.unwrap();
    client.state.block_pulls.store(true, Ordering::Relaxed);

    let orchestrator = Arc::new(orchestrator);
    let worker = Arc::clone(&orchestrator);
    let pull_task = tokio::spawn(async move {
        let image = ImageConfiguration::builder().name("slow/app").build().unwrap();
        worker.pull_image(&image).await
    });

    // Let the pull reach the blocking point, then shut down
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.shutdown().await;

    let result = pull_task.await.unwrap();
    assert!(matches!(result, Err(OrchestratorError::Interrupted(_))));
}

#[tokio::test]
async fn test_unregistered_listener_stops_receiving_notifications() {
    let (orchestrator, _client, _) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let id = orchestrator.register_listener(OrchestrationListener {
        on_connect: Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        })),
        ..Default::default()
    });

    orchestrator.configure(enabled_options()).await.unwrap();
    assert_eq!(calls.load(Ordering::Relaxed), 1);

    assert!(orchestrator.unregister_listener(id));
    let off = OrchestratorOptions::builder().enabled(false).build().unwrap();
    orchestrator.configure(off).await.unwrap();
    orchestrator.configure(enabled_options()).await.unwrap();

    // Reconnect happened, but the listener was gone
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_enforcement_arming_failure_keeps_orchestration_available() {
    let (orchestrator, client, _) = setup();
    client.state.fail_subscribe.store(true, Ordering::Relaxed);
    client
        .add_container(running_container("rogue1", "rogue", "evil", "sha256:evilimg"))
        .await;
    client
        .add_image(digest_image("sha256:evilimg", "evil:latest", "evil@sha256:bad"))
        .await;

    orchestrator
        .configure(enforcing_options(&["sha256:allowed"]))
        .await
        .unwrap();

    // The one-shot sweep still ran without the monitor
    assert_eq!(client.state.stopped.lock().await.as_slice(), ["rogue1"]);
    assert_eq!(client.state.removed.lock().await.as_slice(), ["rogue1"]);

    // Orchestration still works without the monitor
    let config = ContainerConfiguration::builder()
        .name("web")
        .image("nginx")
        .build()
        .unwrap();
    orchestrator.start_container(&config).await.unwrap();
    assert!(orchestrator.test_connection().await);
}

#[tokio::test]
async fn test_delete_container_is_idempotent() {
    let (orchestrator, client, _) = setup();
    orchestrator.configure(enabled_options()).await.unwrap();

    let config = ContainerConfiguration::builder()
        .name("web")
        .image("nginx")
        .framework_managed(true)
        .build()
        .unwrap();
    let id = orchestrator.start_container(&config).await.unwrap();

    orchestrator.delete_container(&id).await.unwrap();
    orchestrator.delete_container(&id).await.unwrap();
    assert!(client.state.containers.lock().await.is_empty());
}

#[tokio::test]
async fn test_failed_stop_still_removes_recorded_digest() {
    let (orchestrator, client, _) = setup();
    orchestrator.configure(enabled_options()).await.unwrap();

    let config = ContainerConfiguration::builder()
        .name("web")
        .image("nginx")
        .enforcement_digest("sha256:recorded")
        .build()
        .unwrap();
    let id = orchestrator.start_container(&config).await.unwrap();
    assert!(
        orchestrator
            .current_allowlist()
            .await
            .contains("sha256:recorded")
    );

    client.state.fail_stop.store(true, Ordering::Relaxed);
    let err = orchestrator.stop_container(&id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::ProcessExecution { .. }));

    // Bookkeeping was still cleaned on engine failure
    assert!(
        !orchestrator
            .current_allowlist()
            .await
            .contains("sha256:recorded")
    );
}

#[tokio::test]
async fn test_stale_container_with_changed_config_is_recreated() {
    let (orchestrator, client, _) = setup();
    orchestrator.configure(enabled_options()).await.unwrap();

    client
        .add_image(digest_image("sha256:img", "nginx:latest", "nginx@sha256:d1"))
        .await;
    let mut stale = running_container("stale1", "web", "nginx:latest", "sha256:img");
    stale.state = "exited".to_owned();
    client.add_container(stale).await;

    // Same image, different port mapping: the old engine container cannot
    // carry the new configuration, so it must be replaced
    let config = ContainerConfiguration::builder()
        .name("web")
        .image("nginx")
        .port(PortMapping::tcp(80, 8080))
        .build()
        .unwrap();
    let id = orchestrator.start_container(&config).await.unwrap();

    assert_ne!(id, "stale1");
    assert!(client.state.removed.lock().await.contains(&"stale1".to_owned()));
    assert_eq!(client.state.create_calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_stop_removes_digest_for_externally_removed_container() {
    let (orchestrator, client, _) = setup();
    orchestrator.configure(enabled_options()).await.unwrap();

    let config = ContainerConfiguration::builder()
        .name("web")
        .image("nginx")
        .enforcement_digest("sha256:recorded")
        .build()
        .unwrap();
    let id = orchestrator.start_container(&config).await.unwrap();

    // The container disappears behind the orchestrator's back
    client.state.containers.lock().await.clear();

    orchestrator.stop_container(&id).await.unwrap();
    assert!(
        !orchestrator
            .current_allowlist()
            .await
            .contains("sha256:recorded")
    );
}

#[tokio::test]
async fn test_pull_timeout_is_capped_by_options() {
    let (orchestrator, client, _) = setup();
    let options = OrchestratorOptions::builder()
        .enabled(true)
        .engine_host("unix:///var/run/test.sock")
        .image_pull_timeout_secs(60)
        .build()
        .unwrap();
    orchestrator.configure(options).await.unwrap();

    let config = ContainerConfiguration::builder()
        .name("web")
        .image("nginx")
        .build()
        .unwrap();
    orchestrator.start_container(&config).await.unwrap();

    let timeouts = client.state.pull_timeouts.lock().await;
    assert_eq!(timeouts.as_slice(), [Duration::from_secs(60)]);
}
