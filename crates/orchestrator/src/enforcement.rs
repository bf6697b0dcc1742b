//! 이미지 다이제스트 허용 목록 집행
//!
//! [`EnforcementState`]는 설정된 허용 목록과 컨테이너별 기록 다이제스트를
//! 단일 뮤텍스 아래 유지합니다. 유효 허용 목록은 두 집합의 합집합이며,
//! 모든 판정은 뮤텍스를 통과하므로 선형화됩니다.
//!
//! [`AllowlistMonitor`]는 엔진의 컨테이너 시작 이벤트를 구독하여,
//! 누가 시작했는지와 무관하게 허용되지 않은 이미지의 컨테이너를
//! 정지하고 제거합니다. 이벤트 스트림이 끊어지면 백오프 후 재구독하고,
//! 끊긴 동안 시작된 컨테이너를 잡기 위해 전체 스윕을 다시 실행합니다.
//!
//! # State Machine
//!
//! ```text
//! Idle ──arm()──> Armed ──disarm()──> Closed
//! ```
//!
//! 모니터는 일회용입니다. 재무장은 새 모니터를 생성합니다.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use quayside_core::metrics::{
    ENFORCEMENT_DENIALS_TOTAL, ENFORCEMENT_MONITOR_RESTARTS_TOTAL, ENFORCEMENT_SWEEPS_TOTAL,
};

use crate::docker::{ContainerStartEvent, EngineClient};
use crate::error::OrchestratorError;

/// 재구독 백오프 초기값
const RESUBSCRIBE_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
/// 재구독 백오프 상한
const RESUBSCRIBE_BACKOFF_MAX: Duration = Duration::from_secs(30);
/// disarm 시 이벤트 태스크 종료 대기 시간
const DISARM_GRACE: Duration = Duration::from_secs(5);

/// 집행 상태
///
/// 설정된 허용 목록(`allowlist`)과 오케스트레이터가 시작 시점에 기록한
/// 컨테이너별 다이제스트(`container_digests`), 그리고 프레임워크 관리
/// 컨테이너 레지스트리(`managed`)를 함께 보관합니다.
#[derive(Debug, Default)]
pub struct EnforcementState {
    allowlist: BTreeSet<String>,
    container_digests: HashMap<String, String>,
    managed: HashMap<String, String>,
}

impl EnforcementState {
    /// 설정된 허용 목록으로 상태를 생성합니다.
    pub fn new(allowlist: impl IntoIterator<Item = String>) -> Self {
        let mut state = Self::default();
        state.install_allowlist(allowlist);
        state
    }

    /// 설정된 허용 목록을 교체합니다. 기록된 컨테이너별 다이제스트는 유지됩니다.
    pub fn install_allowlist(&mut self, digests: impl IntoIterator<Item = String>) {
        self.allowlist = digests
            .into_iter()
            .map(|d| normalize_digest(&d).to_owned())
            .collect();
    }

    /// 주어진 다이제스트 중 하나라도 유효 허용 목록에 포함되는지 판정합니다.
    ///
    /// 빈 목록(다이제스트를 확인할 수 없는 컨테이너)은 거부됩니다.
    pub fn permits(&self, digests: &[String]) -> bool {
        digests.iter().any(|d| {
            let normalized = normalize_digest(d);
            self.allowlist.contains(normalized)
                || self
                    .container_digests
                    .values()
                    .any(|recorded| recorded == normalized)
        })
    }

    /// 유효 허용 목록(설정 목록 ∪ 기록된 다이제스트)의 스냅샷을 반환합니다.
    pub fn current_allowlist(&self) -> BTreeSet<String> {
        let mut set = self.allowlist.clone();
        set.extend(self.container_digests.values().cloned());
        set
    }

    /// 컨테이너의 집행 다이제스트를 기록합니다.
    pub fn record_digest(&mut self, container_id: impl Into<String>, digest: &str) {
        self.container_digests
            .insert(container_id.into(), normalize_digest(digest).to_owned());
    }

    /// 컨테이너의 기록 다이제스트를 제거하고 반환합니다.
    pub fn remove_digest(&mut self, container_id: &str) -> Option<String> {
        self.container_digests.remove(container_id)
    }

    /// 프레임워크 관리 컨테이너를 등록합니다.
    pub fn record_managed(&mut self, name: impl Into<String>, id: impl Into<String>) {
        self.managed.insert(name.into(), id.into());
    }

    /// 이름으로 관리 항목을 제거하고 컨테이너 ID를 반환합니다.
    pub fn remove_managed(&mut self, name: &str) -> Option<String> {
        self.managed.remove(name)
    }

    /// 컨테이너 ID로 관리 항목을 제거합니다.
    pub fn remove_managed_by_id(&mut self, id: &str) {
        self.managed.retain(|_, managed_id| managed_id != id);
    }

    /// 컨테이너 이름이 관리 대상인지 확인합니다.
    pub fn is_managed(&self, name: &str) -> bool {
        self.managed.contains_key(name)
    }

    /// 관리 컨테이너 수를 반환합니다.
    pub fn managed_count(&self) -> usize {
        self.managed.len()
    }
}

/// 다이제스트 참조를 정규화합니다.
///
/// `name@sha256:...` 형식은 `@` 뒤의 순수 다이제스트만 남깁니다.
/// 이미 순수한 `sha256:...` 형식은 그대로 반환합니다.
pub fn normalize_digest(reference: &str) -> &str {
    match reference.rsplit_once('@') {
        Some((_, digest)) => digest,
        None => reference,
    }
}

/// 이미지 ID의 레포 다이제스트 목록을 조회합니다 (정규화됨).
///
/// 태그는 신뢰하지 않습니다. 컨테이너가 실행 중인 이미지 ID로
/// 이미지 인벤토리를 조회하여 레지스트리 다이제스트를 얻습니다.
/// 이미지가 없거나 다이제스트가 없으면 빈 목록을 반환합니다.
pub async fn resolve_image_digests<E: EngineClient>(
    client: &E,
    image_id: &str,
) -> Result<Vec<String>, OrchestratorError> {
    let images = client.list_images().await?;
    Ok(images
        .into_iter()
        .find(|img| img.id == image_id)
        .map(|img| {
            img.repo_digests
                .iter()
                .map(|d| normalize_digest(d).to_owned())
                .collect()
        })
        .unwrap_or_default())
}

/// 컨테이너 ID에서 이미지 다이제스트 목록을 해석합니다.
async fn resolve_container_digests<E: EngineClient>(
    client: &E,
    container_id: &str,
) -> Result<Vec<String>, OrchestratorError> {
    let containers = client.list_containers(true).await?;
    let Some(container) = containers.into_iter().find(|c| c.id == container_id) else {
        // Already gone, nothing to resolve
        return Ok(Vec::new());
    };
    resolve_image_digests(client, &container.image_id).await
}

/// 허용되지 않은 컨테이너를 정지하고 제거합니다.
///
/// 컨테이너가 이미 사라진 경우(NotFound)는 성공으로 취급합니다.
async fn deny_container<E: EngineClient>(
    client: &E,
    state: &Mutex<EnforcementState>,
    container_id: &str,
) {
    if let Err(e) = client.stop_container(container_id).await {
        match e {
            OrchestratorError::NotFound(_) => {}
            other => warn!(container = %container_id, error = %other, "enforcement stop failed"),
        }
    }
    if let Err(e) = client.remove_container(container_id).await {
        match e {
            OrchestratorError::NotFound(_) => {}
            other => warn!(container = %container_id, error = %other, "enforcement remove failed"),
        }
    }

    let mut state = state.lock().await;
    state.remove_digest(container_id);
    state.remove_managed_by_id(container_id);
    counter!(ENFORCEMENT_DENIALS_TOTAL).increment(1);
}

/// 실행 중인 모든 컨테이너에 대해 허용 목록을 집행합니다.
///
/// 제거가 발생하지 않을 때까지 패스를 반복하여, 스윕 도중 재시작 정책으로
/// 되살아난 컨테이너도 잡습니다. 제거된 컨테이너 수를 반환합니다.
pub async fn enforce_allowlist<E: EngineClient>(
    client: &E,
    state: &Mutex<EnforcementState>,
) -> Result<usize, OrchestratorError> {
    let mut total_denied = 0;

    loop {
        counter!(ENFORCEMENT_SWEEPS_TOTAL).increment(1);
        let running = client.list_containers(false).await?;
        let images = client.list_images().await?;

        let digests_by_image: HashMap<String, Vec<String>> = images
            .into_iter()
            .map(|img| {
                let digests = img
                    .repo_digests
                    .iter()
                    .map(|d| normalize_digest(d).to_owned())
                    .collect();
                (img.id, digests)
            })
            .collect();

        let mut denied_this_pass = 0;
        for container in running {
            let empty = Vec::new();
            let digests = digests_by_image.get(&container.image_id).unwrap_or(&empty);
            let allowed = state.lock().await.permits(digests);
            if allowed {
                continue;
            }
            warn!(
                container = %container.id,
                image = %container.image,
                "container image not in allowlist, stopping and removing"
            );
            deny_container(client, state, &container.id).await;
            denied_this_pass += 1;
        }

        total_denied += denied_this_pass;
        if denied_this_pass == 0 {
            break;
        }
    }

    Ok(total_denied)
}

/// 모니터 수명주기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// 생성됨, 아직 무장 전
    Idle,
    /// 이벤트 구독 중, 집행 활성
    Armed,
    /// 해제됨 (재사용 불가)
    Closed,
}

/// 컨테이너 시작 이벤트 기반 허용 목록 모니터
///
/// [`arm`](Self::arm)으로 이벤트 구독과 초기 스윕을 시작하고,
/// [`disarm`](Self::disarm)으로 bounded grace 내에 종료합니다.
pub struct AllowlistMonitor<E: EngineClient> {
    client: Arc<E>,
    state: Arc<Mutex<EnforcementState>>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    status: Arc<std::sync::Mutex<MonitorState>>,
}

impl<E: EngineClient> AllowlistMonitor<E> {
    /// 모니터를 생성합니다 (무장 전 상태).
    pub fn new(client: Arc<E>, state: Arc<Mutex<EnforcementState>>) -> Self {
        Self {
            client,
            state,
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
            status: Arc::new(std::sync::Mutex::new(MonitorState::Idle)),
        }
    }

    /// 현재 무장 상태인지 확인합니다.
    pub fn is_armed(&self) -> bool {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) == MonitorState::Armed
    }

    /// 이벤트 구독을 시작하고 초기 스윕을 실행합니다.
    ///
    /// # Errors
    ///
    /// 구독에 실패하면 `OrchestratorError::Subscription`을 반환합니다.
    /// 호출자는 집행 없이 계속 진행할지 결정합니다 (가용성 우선).
    pub async fn arm(&self) -> Result<(), OrchestratorError> {
        {
            let status = self.status.lock().unwrap_or_else(|e| e.into_inner());
            match *status {
                MonitorState::Idle => {}
                MonitorState::Armed => return Ok(()),
                MonitorState::Closed => {
                    return Err(OrchestratorError::Subscription(
                        "monitor already closed".to_owned(),
                    ));
                }
            }
        }

        let rx = self.client.subscribe_start_events().await?;

        // Initial sweep catches containers started before the subscription
        if let Err(e) = enforce_allowlist(self.client.as_ref(), &self.state).await {
            warn!(error = %e, "initial enforcement sweep failed");
        }

        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = MonitorState::Armed;
        info!("allowlist monitor armed");

        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();
        let status = Arc::clone(&self.status);
        let task = tokio::spawn(async move {
            run_event_loop(client, state, cancel, rx).await;
            *status.lock().unwrap_or_else(|e| e.into_inner()) = MonitorState::Closed;
        });
        *self.handle.lock().await = Some(task);

        Ok(())
    }

    /// 모니터를 해제합니다.
    ///
    /// 이벤트 태스크에 취소를 전파하고 최대 5초까지 종료를 기다립니다.
    /// 기한 내에 끝나지 않으면 태스크를 강제 중단합니다. 멱등합니다.
    pub async fn disarm(&self) {
        self.cancel.cancel();
        let task = self.handle.lock().await.take();
        if let Some(mut task) = task {
            if tokio::time::timeout(DISARM_GRACE, &mut task).await.is_err() {
                warn!("allowlist monitor did not stop within grace period, aborting");
                task.abort();
            }
        }
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = MonitorState::Closed;
        info!("allowlist monitor disarmed");
    }
}

/// 시작 이벤트 하나를 처리합니다.
async fn handle_start_event<E: EngineClient>(
    client: &E,
    state: &Mutex<EnforcementState>,
    event: &ContainerStartEvent,
) {
    let digests = match resolve_container_digests(client, &event.container_id).await {
        Ok(digests) => digests,
        Err(e) => {
            // Unresolvable digests deny: fall through with an empty list
            warn!(
                container = %event.container_id,
                error = %e,
                "failed to resolve image digests for started container"
            );
            Vec::new()
        }
    };

    let allowed = state.lock().await.permits(&digests);
    if allowed {
        debug!(container = %event.container_id, "started container permitted");
        return;
    }

    warn!(
        container = %event.container_id,
        image = %event.image,
        "started container image not in allowlist, stopping and removing"
    );
    deny_container(client, state, &event.container_id).await;
}

/// 이벤트 수신 루프
///
/// 스트림이 끊어지면 백오프 후 재구독하고, 끊긴 동안의 시작을 잡기 위해
/// 전체 스윕을 다시 실행합니다. 취소 시 즉시 반환합니다.
async fn run_event_loop<E: EngineClient>(
    client: Arc<E>,
    state: Arc<Mutex<EnforcementState>>,
    cancel: CancellationToken,
    mut rx: mpsc::Receiver<ContainerStartEvent>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("allowlist monitor cancelled");
                return;
            }
            event = rx.recv() => match event {
                Some(event) => handle_start_event(client.as_ref(), &state, &event).await,
                None => {
                    warn!("start event stream ended, resubscribing");
                    match resubscribe(client.as_ref(), &cancel).await {
                        Some(new_rx) => {
                            rx = new_rx;
                            counter!(ENFORCEMENT_MONITOR_RESTARTS_TOTAL).increment(1);
                            // Catch anything started while the stream was down
                            if let Err(e) = enforce_allowlist(client.as_ref(), &state).await {
                                warn!(error = %e, "post-resubscribe sweep failed");
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    }
}

/// 취소될 때까지 지수 백오프로 재구독을 시도합니다.
async fn resubscribe<E: EngineClient>(
    client: &E,
    cancel: &CancellationToken,
) -> Option<mpsc::Receiver<ContainerStartEvent>> {
    let mut backoff = RESUBSCRIBE_BACKOFF_INITIAL;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(backoff) => {}
        }
        match client.subscribe_start_events().await {
            Ok(rx) => {
                info!("start event stream resubscribed");
                return Some(rx);
            }
            Err(e) => {
                warn!(error = %e, backoff_secs = backoff.as_secs(), "resubscribe failed");
                backoff = (backoff * 2).min(RESUBSCRIBE_BACKOFF_MAX);
            }
        }
    }
}
