//! 컨테이너 오케스트레이터
//!
//! [`ContainerOrchestrator`]는 선언적 컨테이너 설정을 라이브 엔진 상태와
//! 조정(reconcile)합니다. 모든 작업은 멱등합니다: 이미 실행 중인 컨테이너의
//! `start_container`는 생성 없이 기존 ID를 반환하고, 이미 사라진 컨테이너의
//! `stop_container`/`delete_container`는 성공합니다.
//!
//! 연결 수명주기는 [`configure`](ContainerOrchestrator::configure)가 관리합니다.
//! 동일한 옵션의 재적용은 no-op이며, 변경된 옵션만 연결 해제/재연결과
//! 집행 재무장을 유발합니다 (diff 기반 재구성).
//!
//! # Reconciliation
//!
//! ```text
//! start_container(config)
//!   ├─ 동명 컨테이너 실행 중       ──> 기존 ID 반환
//!   ├─ 동명 컨테이너, 이미지 일치  ──> 기존 컨테이너 시작
//!   ├─ 동명 컨테이너, 이미지 불일치 ─> 제거 후 새로 생성
//!   └─ 없음                        ──> (pull) + 생성 + 시작
//! ```
//!
//! 집행 다이제스트는 엔진 start 호출 **전에** 기록됩니다. 그렇지 않으면
//! 시작 이벤트가 기록보다 먼저 도착하여 모니터가 자기 컨테이너를 차단할 수
//! 있습니다. 시작이 실패하면 기록을 되돌려 집행 상태를 변경 전으로 유지합니다.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use quayside_core::crypto::SecretDecryptor;
use quayside_core::metrics::{
    ORCHESTRATOR_CONTAINERS_DELETED_TOTAL, ORCHESTRATOR_CONTAINERS_STARTED_TOTAL,
    ORCHESTRATOR_ENGINE_CONNECTS_TOTAL, ORCHESTRATOR_ENGINE_DISCONNECTS_TOTAL,
    ORCHESTRATOR_IMAGE_PULL_FAILURES_TOTAL, ORCHESTRATOR_IMAGE_PULLS_TOTAL,
    ORCHESTRATOR_MANAGED_CONTAINERS,
};

use crate::config::OrchestratorOptions;
use crate::docker::{
    BollardEngineClient, ContainerSummary, EngineClient, ImageSummary, RegistryAuth,
};
use crate::enforcement::{
    AllowlistMonitor, EnforcementState, enforce_allowlist, normalize_digest,
};
use crate::error::OrchestratorError;
use crate::model::{
    ContainerConfiguration, ContainerInstanceDescriptor, ContainerState,
    DEFAULT_PULL_TIMEOUT_SECS, ImageConfiguration, ImageInstanceDescriptor, PortMapping,
    RegistryCredentials, parse_image_reference,
};
use crate::translate::build_create_request;

/// 엔진 연결 수립을 추상화하는 trait
///
/// 운영 환경은 [`BollardConnector`]를 사용하고, 테스트는 mock 클라이언트를
/// 돌려주는 connector를 사용합니다.
pub trait EngineConnector: Send + Sync + 'static {
    /// 이 connector가 생성하는 클라이언트 타입
    type Client: EngineClient;

    /// 주어진 엔드포인트로 연결하고 도달 가능성을 확인합니다.
    fn connect(
        &self,
        host: &str,
    ) -> impl Future<Output = Result<Self::Client, OrchestratorError>> + Send;
}

/// bollard 기반 운영 connector
#[derive(Debug, Clone, Copy, Default)]
pub struct BollardConnector;

impl EngineConnector for BollardConnector {
    type Client = BollardEngineClient;

    async fn connect(&self, host: &str) -> Result<Self::Client, OrchestratorError> {
        let client = BollardEngineClient::connect(host)?;
        client.ping().await?;
        Ok(client)
    }
}

/// 리스너 등록 핸들
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// 리스너 콜백 타입
pub type ListenerCallback = Arc<dyn Fn() + Send + Sync>;

/// 오케스트레이션 수명주기 리스너
///
/// 연결 수립/해제와 비활성화 전환 시점에 호출됩니다.
/// 콜백은 등록 순서대로 호출됩니다.
#[derive(Clone, Default)]
pub struct OrchestrationListener {
    /// 엔진 연결 수립 시 호출
    pub on_connect: Option<ListenerCallback>,
    /// 엔진 연결 해제 시 호출
    pub on_disconnect: Option<ListenerCallback>,
    /// 오케스트레이션 비활성화 전환 시 호출
    pub on_disabled: Option<ListenerCallback>,
}

/// 컨테이너 오케스트레이터
pub struct ContainerOrchestrator<C: EngineConnector> {
    connector: C,
    decryptor: Arc<dyn SecretDecryptor>,
    session: Mutex<Option<Arc<C::Client>>>,
    applied: Mutex<Option<OrchestratorOptions>>,
    state: Arc<Mutex<EnforcementState>>,
    monitor: Mutex<Option<AllowlistMonitor<C::Client>>>,
    listeners: std::sync::Mutex<Vec<(ListenerId, OrchestrationListener)>>,
    next_listener_id: AtomicU64,
    cancel: CancellationToken,
}

impl<C: EngineConnector> ContainerOrchestrator<C> {
    /// 오케스트레이터를 생성합니다 (연결 전 상태).
    pub fn new(connector: C, decryptor: Arc<dyn SecretDecryptor>) -> Self {
        Self {
            connector,
            decryptor,
            session: Mutex::new(None),
            applied: Mutex::new(None),
            state: Arc::new(Mutex::new(EnforcementState::default())),
            monitor: Mutex::new(None),
            listeners: std::sync::Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        }
    }

    // ─── 리스너 ────────────────────────────────────────────────────

    /// 수명주기 리스너를 등록하고 핸들을 반환합니다.
    pub fn register_listener(&self, listener: OrchestrationListener) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        id
    }

    /// 리스너를 해제합니다. 등록된 핸들이면 true를 반환합니다.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    fn notify<F>(&self, select: F)
    where
        F: Fn(&OrchestrationListener) -> Option<ListenerCallback>,
    {
        let callbacks: Vec<ListenerCallback> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners
                .iter()
                .filter_map(|(_, listener)| select(listener))
                .collect()
        };
        for callback in callbacks {
            callback();
        }
    }

    // ─── 연결 수명주기 ─────────────────────────────────────────────

    /// 현재 세션 클라이언트를 반환합니다.
    ///
    /// # Errors
    ///
    /// 연결되어 있지 않거나 엔진이 응답하지 않으면
    /// `OrchestratorError::Unreachable`을 반환합니다.
    async fn client(&self) -> Result<Arc<C::Client>, OrchestratorError> {
        let client = {
            let session = self.session.lock().await;
            session.clone()
        };
        let client = client.ok_or_else(|| {
            OrchestratorError::Unreachable("not connected to container engine".to_owned())
        })?;
        client.ping().await?;
        Ok(client)
    }

    /// 엔진에 연결합니다.
    ///
    /// 이미 연결되어 있고 엔진이 응답하면 아무것도 하지 않고 false를
    /// 반환합니다. 새 연결이 수립되면 true를 반환하고 리스너에 알립니다.
    pub async fn connect(&self, host: &str) -> Result<bool, OrchestratorError> {
        {
            let session = self.session.lock().await;
            if let Some(client) = session.as_ref() {
                if client.ping().await.is_ok() {
                    debug!("engine session already established");
                    return Ok(false);
                }
            }
        }

        let client = self.connector.connect(host).await?;
        *self.session.lock().await = Some(Arc::new(client));
        counter!(ORCHESTRATOR_ENGINE_CONNECTS_TOTAL).increment(1);
        info!(host = %host, "connected to container engine");
        self.notify(|l| l.on_connect.clone());
        Ok(true)
    }

    /// 엔진 연결을 해제합니다. 멱등합니다.
    pub async fn disconnect(&self) {
        let had_session = self.session.lock().await.take().is_some();
        if had_session {
            counter!(ORCHESTRATOR_ENGINE_DISCONNECTS_TOTAL).increment(1);
            info!("disconnected from container engine");
            self.notify(|l| l.on_disconnect.clone());
        }
    }

    /// 엔진 도달 가능성을 확인합니다.
    pub async fn test_connection(&self) -> bool {
        self.client().await.is_ok()
    }

    // ─── 컨테이너 작업 ─────────────────────────────────────────────

    /// 모든 컨테이너(정지 포함)의 기술자 목록을 반환합니다.
    ///
    /// 포트는 와일드카드 주소(`0.0.0.0`, `::`)에 게시된 것만 포함합니다.
    pub async fn list_container_descriptors(
        &self,
    ) -> Result<Vec<ContainerInstanceDescriptor>, OrchestratorError> {
        let client = self.client().await?;
        let containers = client.list_containers(true).await?;
        let state = self.state.lock().await;

        Ok(containers
            .into_iter()
            .map(|c| {
                let name = container_name(&c);
                let (image_name, image_tag) = parse_image_reference(&c.image);
                let framework_managed = state.is_managed(&name);
                ContainerInstanceDescriptor {
                    ports: wildcard_ports(&c),
                    state: ContainerState::from_engine(&c.state),
                    name,
                    image_name,
                    image_tag,
                    id: c.id,
                    framework_managed,
                }
            })
            .collect())
    }

    /// 이름으로 컨테이너 ID를 찾습니다.
    pub async fn get_container_id_by_name(
        &self,
        name: &str,
    ) -> Result<Option<String>, OrchestratorError> {
        let client = self.client().await?;
        let containers = client.list_containers(true).await?;
        Ok(find_by_name(&containers, name).map(|c| c.id.clone()))
    }

    /// ID로 컨테이너를 시작합니다.
    ///
    /// 엔진 실패(이미 실행 중, 존재하지 않음 포함)는 기록 후 도메인
    /// 에러로 변환됩니다. 조용히 삼키지 않습니다.
    pub async fn start_container_by_id(&self, id: &str) -> Result<(), OrchestratorError> {
        let client = self.client().await?;
        if let Err(e) = client.start_container(id).await {
            warn!(container = %id, error = %e, "container start failed");
            return Err(OrchestratorError::ProcessExecution {
                operation: "start container".to_owned(),
                target: id.to_owned(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// 선언적 설정을 엔진 상태와 조정하고 컨테이너 ID를 반환합니다.
    ///
    /// 이미 실행 중인 동명 컨테이너는 그대로 두고 ID만 반환합니다.
    /// 실행 중이 아닌 동명 컨테이너는 설정 변경이 반영되도록 항상 제거 후
    /// 새로 생성합니다. 필요하면 이미지를 pull합니다.
    pub async fn start_container(
        &self,
        config: &ContainerConfiguration,
    ) -> Result<String, OrchestratorError> {
        let client = self.client().await?;
        let desired_image = config.image_reference();
        let containers = client.list_containers(true).await?;

        if let Some(existing) = find_by_name(&containers, &config.name) {
            if ContainerState::from_engine(&existing.state) == ContainerState::Active {
                debug!(container = %config.name, id = %existing.id, "container already active");
                return Ok(existing.id.clone());
            }
            // A stale instance is never restarted in place: the old engine
            // container would keep its old ports/env/limits
            info!(
                container = %config.name,
                old_image = %existing.image,
                new_image = %desired_image,
                "replacing stale container"
            );
            let stale_id = existing.id.clone();
            if let Err(e) = client.stop_container(&stale_id).await {
                match e {
                    OrchestratorError::NotFound(_) => {}
                    other => return Err(other),
                }
            }
            match client.remove_container(&stale_id).await {
                Ok(()) | Err(OrchestratorError::NotFound(_)) => {}
                Err(other) => return Err(other),
            }
            let mut state = self.state.lock().await;
            state.remove_digest(&stale_id);
            state.remove_managed_by_id(&stale_id);
        }

        // Pull the image when it is not present locally
        let images = client.list_images().await?;
        if !image_present(&images, &desired_image) {
            let auth = self.registry_auth(&config.registry_credentials)?;
            let timeout = self.effective_pull_timeout(config.image_pull_timeout_secs).await;
            self.pull_with_counters(client.as_ref(), &config.image, &config.image_tag, auth, timeout)
                .await?;
        }

        let request = build_create_request(config);
        let id = client.create_container(&request).await?;
        self.record_and_start(client.as_ref(), config, &id).await?;
        Ok(id)
    }

    /// 집행 다이제스트/관리 항목을 기록한 뒤 컨테이너를 시작합니다.
    ///
    /// 시작이 실패하면 기록을 되돌립니다.
    async fn record_and_start(
        &self,
        client: &C::Client,
        config: &ContainerConfiguration,
        id: &str,
    ) -> Result<(), OrchestratorError> {
        {
            let mut state = self.state.lock().await;
            if let Some(digest) = &config.enforcement_digest {
                state.record_digest(id, digest);
            }
            if config.framework_managed {
                state.record_managed(&config.name, id);
            }
            gauge!(ORCHESTRATOR_MANAGED_CONTAINERS).set(state.managed_count() as f64);
        }

        if let Err(e) = client.start_container(id).await {
            let mut state = self.state.lock().await;
            if config.enforcement_digest.is_some() {
                state.remove_digest(id);
            }
            if config.framework_managed {
                state.remove_managed_by_id(id);
            }
            gauge!(ORCHESTRATOR_MANAGED_CONTAINERS).set(state.managed_count() as f64);
            return Err(e);
        }

        counter!(ORCHESTRATOR_CONTAINERS_STARTED_TOTAL).increment(1);
        info!(container = %config.name, id = %id, "container started");
        Ok(())
    }

    /// ID로 컨테이너를 정지합니다. 엔진에 없으면 정지는 건너뜁니다.
    ///
    /// 기록된 집행 다이제스트는 엔진 목록과 무관하게 항상 제거됩니다.
    /// 외부에서 제거된 컨테이너의 다이제스트가 영구히 신뢰되는 것을
    /// 막기 위함입니다. 다이제스트가 제거되었고 모니터가 무장 상태면
    /// 유효 허용 목록 축소를 반영하기 위해 전체 스윕을 다시 실행합니다.
    pub async fn stop_container(&self, id: &str) -> Result<(), OrchestratorError> {
        let client = self.client().await?;
        let containers = client.list_containers(true).await?;

        let engine_result = if containers.iter().any(|c| c.id == id) {
            match client.stop_container(id).await {
                Ok(()) | Err(OrchestratorError::NotFound(_)) => Ok(()),
                Err(other) => Err(other),
            }
        } else {
            debug!(container = %id, "stop requested for absent container");
            Ok(())
        };

        // Bookkeeping is cleaned even when the engine call failed or the
        // container is no longer listed
        let removed = self.state.lock().await.remove_digest(id);
        if removed.is_some() && self.monitor_armed().await {
            // The effective allowlist shrank, re-check everything running
            if let Err(e) = enforce_allowlist(client.as_ref(), &self.state).await {
                warn!(error = %e, "post-stop enforcement sweep failed");
            }
        }
        engine_result?;
        info!(container = %id, "container stopped");
        Ok(())
    }

    /// ID로 컨테이너를 제거합니다.
    ///
    /// 엔진에 없는 컨테이너도 다이제스트와 관리 항목은 정리합니다 (멱등).
    pub async fn delete_container(&self, id: &str) -> Result<(), OrchestratorError> {
        let client = self.client().await?;
        let containers = client.list_containers(true).await?;

        let mut engine_result = Ok(());
        if containers.iter().any(|c| c.id == id) {
            match client.stop_container(id).await {
                Ok(()) | Err(OrchestratorError::NotFound(_)) => {}
                Err(other) => engine_result = Err(other),
            }
            // Removal is attempted even after a failed stop
            match client.remove_container(id).await {
                Ok(()) => {
                    counter!(ORCHESTRATOR_CONTAINERS_DELETED_TOTAL).increment(1);
                }
                Err(OrchestratorError::NotFound(_)) => {}
                Err(other) => {
                    if engine_result.is_ok() {
                        engine_result = Err(other);
                    }
                }
            }
        }

        // Bookkeeping is cleaned even when the engine call failed or the
        // container is no longer listed
        {
            let mut state = self.state.lock().await;
            state.remove_digest(id);
            state.remove_managed_by_id(id);
            gauge!(ORCHESTRATOR_MANAGED_CONTAINERS).set(state.managed_count() as f64);
        }
        engine_result?;
        info!(container = %id, "container deleted");
        Ok(())
    }

    // ─── 이미지 작업 ───────────────────────────────────────────────

    /// 이미지를 pull합니다. 이미 존재하면 no-op입니다.
    ///
    /// ID 토큰 자격증명은 엔진 호출 전에 거부됩니다. 비밀번호 자격증명은
    /// 사용 직전에만 복호화됩니다.
    pub async fn pull_image(&self, image: &ImageConfiguration) -> Result<(), OrchestratorError> {
        // Credential check happens before any engine call
        let auth = self.registry_auth(&image.credentials)?;
        let client = self.client().await?;

        let reference = image.reference();
        let images = client.list_images().await?;
        if image_present(&images, &reference) {
            debug!(image = %reference, "image already present");
            return Ok(());
        }

        let timeout = self.effective_pull_timeout(image.pull_timeout_secs).await;
        self.pull_with_counters(client.as_ref(), &image.name, &image.tag, auth, timeout)
            .await
    }

    /// 적용된 옵션의 pull 타임아웃을 상한으로 하는 유효 타임아웃을 계산합니다.
    async fn effective_pull_timeout(&self, requested_secs: u64) -> Duration {
        let ceiling = self
            .applied
            .lock()
            .await
            .as_ref()
            .map(|o| o.image_pull_timeout_secs)
            .unwrap_or(DEFAULT_PULL_TIMEOUT_SECS);
        Duration::from_secs(requested_secs.min(ceiling))
    }

    async fn pull_with_counters(
        &self,
        client: &C::Client,
        name: &str,
        tag: &str,
        auth: Option<RegistryAuth>,
        timeout: Duration,
    ) -> Result<(), OrchestratorError> {
        counter!(ORCHESTRATOR_IMAGE_PULLS_TOTAL).increment(1);
        let result = client
            .pull_image(name, tag, auth, timeout, self.cancel.child_token())
            .await;
        if let Err(e) = &result {
            if !matches!(e, OrchestratorError::Interrupted(_)) {
                counter!(ORCHESTRATOR_IMAGE_PULL_FAILURES_TOTAL).increment(1);
            }
        } else {
            info!(image = %name, tag = %tag, "image pulled");
        }
        result
    }

    fn registry_auth(
        &self,
        credentials: &Option<RegistryCredentials>,
    ) -> Result<Option<RegistryAuth>, OrchestratorError> {
        match credentials {
            None => Ok(None),
            Some(RegistryCredentials::Password {
                url,
                username,
                encrypted_password,
            }) => {
                let password = self
                    .decryptor
                    .decrypt(encrypted_password)
                    .map_err(|e| OrchestratorError::Crypto(e.to_string()))?;
                Ok(Some(RegistryAuth {
                    username: username.clone(),
                    password,
                    server_address: url.clone(),
                }))
            }
            Some(RegistryCredentials::IdentityToken { .. }) => {
                Err(OrchestratorError::BadRequest(
                    "identity token credentials are not supported for image pull".to_owned(),
                ))
            }
        }
    }

    /// 로컬 이미지의 기술자 목록을 반환합니다.
    ///
    /// 개별 이미지의 inspect 실패는 빈 상세 정보로 대체됩니다 (best-effort).
    pub async fn list_image_instance_descriptors(
        &self,
    ) -> Result<Vec<ImageInstanceDescriptor>, OrchestratorError> {
        let client = self.client().await?;
        let images = client.list_images().await?;

        let mut result = Vec::with_capacity(images.len());
        for image in images {
            let (name, tag) = image
                .repo_tags
                .first()
                .map(|t| parse_image_reference(t))
                .unwrap_or_default();
            let details = match client.inspect_image(&image.id).await {
                Ok(details) => details,
                Err(e) => {
                    warn!(image = %image.id, error = %e, "image inspect failed");
                    Default::default()
                }
            };
            result.push(ImageInstanceDescriptor {
                name,
                tag,
                id: image.id,
                author: details.author,
                architecture: details.architecture,
                size_bytes: details.size_bytes,
                labels: image.labels,
            });
        }
        Ok(result)
    }

    /// ID로 이미지를 제거합니다.
    pub async fn delete_image(&self, id: &str) -> Result<(), OrchestratorError> {
        let client = self.client().await?;
        client.remove_image(id).await
    }

    // ─── 옵션 적용 ─────────────────────────────────────────────────

    /// 현재 유효 허용 목록의 스냅샷을 반환합니다.
    ///
    /// 설정된 허용 목록과 실행 중 기록된 컨테이너별 다이제스트의 합집합입니다.
    pub async fn current_allowlist(&self) -> BTreeSet<String> {
        self.state.lock().await.current_allowlist()
    }

    /// 옵션을 적용합니다.
    ///
    /// 직전에 적용된 옵션과 같으면 no-op입니다. 변경이 있으면 기존 모니터를
    /// 해제한 뒤 연결/허용 목록/집행을 새 옵션에 맞춰 재구성합니다.
    /// 엔진 연결 실패는 치명적이지 않습니다: 경고를 남기고 미적용 상태로
    /// 남아 다음 옵션 갱신에서 재시도합니다. 집행이 켜져 있어도 이벤트
    /// 구독 실패는 치명적이지 않습니다: 경고를 남기고 집행 없이
    /// 계속합니다 (가용성 우선).
    pub async fn configure(&self, options: OrchestratorOptions) -> Result<(), OrchestratorError> {
        options.validate()?;

        {
            let applied = self.applied.lock().await;
            if applied.as_ref() == Some(&options) {
                debug!("options unchanged, skipping reconfiguration");
                return Ok(());
            }
        }

        // Always tear down the previous monitor before changing anything
        if let Some(monitor) = self.monitor.lock().await.take() {
            monitor.disarm().await;
        }

        if !options.enabled {
            info!("orchestration disabled");
            self.notify(|l| l.on_disabled.clone());
            self.disconnect().await;
            *self.applied.lock().await = Some(options);
            return Ok(());
        }

        // Reconnect when the endpoint changed
        let host_changed = {
            let applied = self.applied.lock().await;
            applied
                .as_ref()
                .is_some_and(|prev| prev.engine_host != options.engine_host)
        };
        if host_changed {
            self.disconnect().await;
        }
        if let Err(e) = self.connect(&options.engine_host).await {
            // The options are intentionally not stored, so the next update
            // (even with identical values) retries the connection
            warn!(
                host = %options.engine_host,
                error = %e,
                "engine connection failed, staying disconnected"
            );
            *self.applied.lock().await = None;
            return Ok(());
        }

        self.state
            .lock()
            .await
            .install_allowlist(options.allowlist.iter().cloned());

        if options.enforcement_enabled {
            match self.client().await {
                Ok(client) => {
                    let monitor =
                        AllowlistMonitor::new(Arc::clone(&client), Arc::clone(&self.state));
                    match monitor.arm().await {
                        Ok(()) => {
                            *self.monitor.lock().await = Some(monitor);
                        }
                        Err(e) => {
                            // The sweep still runs even when the event
                            // subscription could not be established
                            warn!(error = %e, "enforcement arming failed, continuing without monitor");
                            if let Err(e) = enforce_allowlist(client.as_ref(), &self.state).await {
                                warn!(error = %e, "allowlist sweep failed");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "engine unavailable, enforcement not armed");
                }
            }
        }

        *self.applied.lock().await = Some(options);
        Ok(())
    }

    /// 오케스트레이터를 종료합니다.
    ///
    /// 진행 중인 pull을 취소하고, 모니터를 해제하고, 연결을 끊습니다.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(monitor) = self.monitor.lock().await.take() {
            monitor.disarm().await;
        }
        self.disconnect().await;
        info!("orchestrator shut down");
    }

    async fn monitor_armed(&self) -> bool {
        self.monitor
            .lock()
            .await
            .as_ref()
            .is_some_and(|m| m.is_armed())
    }
}

/// 엔진의 선행 `/`를 제거한 첫 번째 컨테이너 이름을 반환합니다.
fn container_name(container: &ContainerSummary) -> String {
    container
        .names
        .first()
        .map(|n| n.strip_prefix('/').unwrap_or(n).to_owned())
        .unwrap_or_default()
}

fn find_by_name<'a>(
    containers: &'a [ContainerSummary],
    name: &str,
) -> Option<&'a ContainerSummary> {
    containers.iter().find(|c| container_name(c) == name)
}

/// 와일드카드 주소에 게시된 포트만 매핑으로 변환합니다.
fn wildcard_ports(container: &ContainerSummary) -> Vec<PortMapping> {
    container
        .ports
        .iter()
        .filter_map(|p| {
            let is_wildcard = matches!(p.ip.as_deref(), Some("0.0.0.0") | Some("::"));
            let external = p.public_port?;
            if !is_wildcard {
                return None;
            }
            Some(PortMapping {
                internal: p.private_port,
                external,
                protocol: p.protocol.parse().unwrap_or_default(),
            })
        })
        .collect()
}

fn image_present(images: &[ImageSummary], reference: &str) -> bool {
    let normalized = normalize_digest(reference);
    images.iter().any(|img| {
        img.id == reference
            || img.repo_tags.iter().any(|t| t == reference)
            || img
                .repo_digests
                .iter()
                .any(|d| normalize_digest(d) == normalized)
    })
}
