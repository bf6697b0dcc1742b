//! 컨테이너 엔진 API 추상화
//!
//! [`EngineClient`] trait은 bollard 엔진 API를 추상화하여, 운영 코드는
//! [`BollardEngineClient`]를 사용하고 테스트는 mock 구현을 사용할 수 있게 합니다.
//! 오케스트레이션 코어는 이 trait 너머의 wire 표현을 알지 못합니다.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────┐
//! │ ContainerOrchestrator  │
//! └───────────┬────────────┘
//!             │
//!             ▼
//!      ┌──────────────┐
//!      │ EngineClient │ (trait)
//!      └──────────────┘
//!          │       │
//!          ▼       ▼
//!     ┌────────┐ ┌──────┐
//!     │Bollard │ │ Mock │
//!     └───┬────┘ └──────┘
//!         │
//!         ▼
//!   Container Engine
//! ```
//!
//! # Error Handling
//!
//! - **404 errors**: `OrchestratorError::NotFound`로 변환
//! - **400 errors**: `OrchestratorError::BadRequest`로 변환
//! - **연결 에러**: `OrchestratorError::Unreachable`로 변환
//! - **기타 실패**: 작업/대상 컨텍스트와 함께 `ProcessExecution`으로 변환

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::OrchestratorError;
use crate::model::PortMapping;

/// 엔진이 나열한 컨테이너 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    /// 컨테이너 ID
    pub id: String,
    /// 컨테이너 이름 목록 (엔진은 선행 `/`를 붙여 반환)
    pub names: Vec<String>,
    /// 이미지 참조
    pub image: String,
    /// 이미지 ID (sha256:...)
    pub image_id: String,
    /// 엔진 상태 문자열 (running, exited, ...)
    pub state: String,
    /// 게시된 포트 목록
    pub ports: Vec<PortInfo>,
}

/// 엔진이 보고한 포트 바인딩 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// 호스트 바인딩 IP (없으면 미게시)
    pub ip: Option<String>,
    /// 컨테이너 내부 포트
    pub private_port: u16,
    /// 호스트 외부 포트
    pub public_port: Option<u16>,
    /// 프로토콜 문자열 (tcp, udp, sctp)
    pub protocol: String,
}

/// 엔진이 나열한 이미지 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    /// 이미지 ID (sha256:...)
    pub id: String,
    /// `name:tag` 형식의 레포 태그 목록
    pub repo_tags: Vec<String>,
    /// `name@sha256:...` 형식의 레포 다이제스트 목록
    pub repo_digests: Vec<String>,
    /// 이미지 레이블
    pub labels: BTreeMap<String, String>,
}

/// 이미지 상세 정보 (inspect 결과)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDetails {
    /// 작성자
    pub author: String,
    /// 아키텍처
    pub architecture: String,
    /// 이미지 크기 (바이트)
    pub size_bytes: i64,
}

/// 컨테이너 시작 이벤트
///
/// 누가 시작했는지와 무관하게 엔진의 모든 컨테이너 시작이 포함됩니다
/// (수동 `docker run` 포함).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStartEvent {
    /// 시작된 컨테이너 ID
    pub container_id: String,
    /// 이미지 참조 (이벤트 속성에서 추출, 비어 있을 수 있음)
    pub image: String,
}

/// 레지스트리 인증 정보 (복호화된 평문, 호출 직전에만 생성)
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    /// 사용자명
    pub username: String,
    /// 평문 비밀번호
    pub password: String,
    /// 레지스트리 주소 (없으면 기본 레지스트리)
    pub server_address: Option<String>,
}

/// 디바이스 매핑 지정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// 호스트 디바이스 경로
    pub path_on_host: String,
    /// 컨테이너 내 경로
    pub path_in_container: String,
    /// cgroup 권한 (기본 rwm)
    pub cgroup_permissions: String,
}

/// 컨테이너 생성 요청
///
/// 엔진 wire 표현과 분리된 단일 데이터 구조입니다.
/// [`translate::build_create_request`](crate::translate::build_create_request)가
/// [`ContainerConfiguration`](crate::model::ContainerConfiguration)에서 조립합니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerCreateRequest {
    /// 컨테이너 이름
    pub name: String,
    /// 이미지 참조 (`name:tag` 또는 다이제스트)
    pub image: String,
    /// entrypoint 인자
    pub entrypoint: Vec<String>,
    /// 환경변수 (`KEY=VALUE`)
    pub env: Vec<String>,
    /// 볼륨 바인드 (`host:container`)
    pub binds: Vec<String>,
    /// 디바이스 매핑
    pub devices: Vec<DeviceSpec>,
    /// unless-stopped 재시작 정책
    pub restart_unless_stopped: bool,
    /// 포트 바인딩
    pub port_bindings: Vec<PortMapping>,
    /// 로그 드라이버 (None이면 엔진 기본값)
    pub log_driver: Option<String>,
    /// 로그 드라이버 파라미터
    pub log_opts: BTreeMap<String, String>,
    /// 네트워크 모드
    pub network_mode: Option<String>,
    /// 메모리 제한 (바이트)
    pub memory_bytes: Option<i64>,
    /// CPU period (마이크로초)
    pub cpu_period: Option<i64>,
    /// CPU quota (마이크로초)
    pub cpu_quota: Option<i64>,
    /// GPU 할당 개수 (-1 = 전체)
    pub gpu_count: Option<i64>,
    /// 컨테이너 런타임
    pub runtime: Option<String>,
    /// 특권 모드
    pub privileged: bool,
}

/// 엔진 API 작업을 추상화하는 trait
///
/// 모든 엔진 API 호출은 이 trait을 통과하며, mock으로 대체할 수 있습니다.
/// `Send + Sync + 'static`이므로 async 컨텍스트 간 안전하게 공유됩니다.
pub trait EngineClient: Send + Sync + 'static {
    /// 엔진 연결 상태를 확인합니다.
    ///
    /// # Errors
    ///
    /// 엔진에 도달할 수 없으면 `OrchestratorError::Unreachable`을 반환합니다.
    fn ping(&self) -> impl Future<Output = Result<(), OrchestratorError>> + Send;

    /// 컨테이너 목록을 조회합니다.
    ///
    /// `all`이 true면 정지된 컨테이너를 포함합니다.
    fn list_containers(
        &self,
        all: bool,
    ) -> impl Future<Output = Result<Vec<ContainerSummary>, OrchestratorError>> + Send;

    /// 컨테이너를 생성하고 ID를 반환합니다.
    fn create_container(
        &self,
        request: &ContainerCreateRequest,
    ) -> impl Future<Output = Result<String, OrchestratorError>> + Send;

    /// 컨테이너를 시작합니다.
    fn start_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<(), OrchestratorError>> + Send;

    /// 컨테이너를 정지합니다 (10초 grace 후 강제 종료).
    fn stop_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<(), OrchestratorError>> + Send;

    /// 컨테이너를 제거합니다.
    fn remove_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<(), OrchestratorError>> + Send;

    /// 이미지 목록을 조회합니다.
    fn list_images(
        &self,
    ) -> impl Future<Output = Result<Vec<ImageSummary>, OrchestratorError>> + Send;

    /// 이미지 상세 정보를 조회합니다.
    fn inspect_image(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ImageDetails, OrchestratorError>> + Send;

    /// 이미지를 pull합니다.
    ///
    /// 진행 스트림을 소비하며 `timeout` 내에 완료되지 않으면
    /// `OrchestratorError::ImagePull`, 취소되면 `Interrupted`를 반환합니다.
    fn pull_image(
        &self,
        name: &str,
        tag: &str,
        auth: Option<RegistryAuth>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), OrchestratorError>> + Send;

    /// 이미지를 제거합니다.
    fn remove_image(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<(), OrchestratorError>> + Send;

    /// 컨테이너 시작 이벤트를 구독합니다.
    ///
    /// 엔진 측에서 `type=container, event=start`로 필터링된 스트림을
    /// mpsc 채널로 전달합니다. 수신자를 drop하면 전달 태스크가 종료됩니다.
    /// 엔진이 재시작되면 스트림이 끝나고 채널이 닫히므로
    /// 호출자가 재구독해야 합니다.
    fn subscribe_start_events(
        &self,
    ) -> impl Future<Output = Result<mpsc::Receiver<ContainerStartEvent>, OrchestratorError>> + Send;
}

/// bollard 기반 운영 엔진 클라이언트
///
/// Unix 소켓 또는 TCP로 컨테이너 엔진과 통신합니다.
/// 내부적으로 `Arc<bollard::Docker>`를 사용하여 async 태스크 간 안전하게 공유됩니다.
///
/// # Connection Management
///
/// - 연결 타임아웃: 120초
/// - API 버전: 기본 (자동 협상)
/// - 엔드포인트: `unix:///var/run/docker.sock` 또는 `tcp://host:port`
pub struct BollardEngineClient {
    docker: Arc<bollard::Docker>,
}

impl BollardEngineClient {
    /// 주어진 엔드포인트로 엔진 클라이언트를 생성합니다.
    ///
    /// `tcp://`/`http://` URL은 HTTP 연결, 그 외는 Unix 소켓 경로로
    /// 취급합니다 (`unix://` 접두어는 제거).
    ///
    /// # Errors
    ///
    /// 클라이언트 구성에 실패하면 `OrchestratorError::Unreachable`을 반환합니다.
    /// 실제 도달 가능성은 [`ping`](EngineClient::ping)으로 확인해야 합니다.
    pub fn connect(host: &str) -> Result<Self, OrchestratorError> {
        let docker = if host.starts_with("tcp://") || host.starts_with("http://") {
            bollard::Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
        } else {
            let socket_path = host.strip_prefix("unix://").unwrap_or(host);
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
        }
        .map_err(|e| {
            OrchestratorError::Unreachable(format!(
                "failed to connect to container engine at {host}: {e}"
            ))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }
}

/// bollard 에러를 작업/대상 컨텍스트와 함께 도메인 에러로 변환합니다.
fn map_engine_error(
    err: bollard::errors::Error,
    operation: &str,
    target: &str,
) -> OrchestratorError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => OrchestratorError::NotFound(format!("{target}: {message}")),
        bollard::errors::Error::DockerResponseServerError {
            status_code: 400,
            message,
        } => OrchestratorError::BadRequest(message),
        other => OrchestratorError::ProcessExecution {
            operation: operation.to_owned(),
            target: target.to_owned(),
            reason: other.to_string(),
        },
    }
}

impl EngineClient for BollardEngineClient {
    async fn ping(&self) -> Result<(), OrchestratorError> {
        self.docker
            .ping()
            .await
            .map_err(|e| OrchestratorError::Unreachable(format!("ping failed: {e}")))?;
        Ok(())
    }

    async fn list_containers(
        &self,
        all: bool,
    ) -> Result<Vec<ContainerSummary>, OrchestratorError> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| map_engine_error(e, "list", "containers"))?;

        let mut result = Vec::with_capacity(containers.len());
        for container in containers {
            let ports = container
                .ports
                .unwrap_or_default()
                .into_iter()
                .map(|p| PortInfo {
                    ip: p.ip,
                    private_port: u16::try_from(p.private_port).unwrap_or_default(),
                    public_port: p
                        .public_port
                        .and_then(|port| u16::try_from(port).ok()),
                    protocol: p
                        .typ
                        .map(|t| t.to_string().to_ascii_lowercase())
                        .unwrap_or_else(|| "tcp".to_owned()),
                })
                .collect();

            result.push(ContainerSummary {
                id: container.id.unwrap_or_default(),
                names: container.names.unwrap_or_default(),
                image: container.image.unwrap_or_default(),
                image_id: container.image_id.unwrap_or_default(),
                state: container.state.unwrap_or_default(),
                ports,
            });
        }

        Ok(result)
    }

    async fn create_container(
        &self,
        request: &ContainerCreateRequest,
    ) -> Result<String, OrchestratorError> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::{
            DeviceMapping, DeviceRequest, HostConfig, HostConfigLogConfig, PortBinding,
            RestartPolicy, RestartPolicyNameEnum,
        };

        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for mapping in &request.port_bindings {
            let key = format!("{}/{}", mapping.internal, mapping.protocol);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings
                .entry(key)
                .or_insert_with(|| Some(Vec::new()))
                .get_or_insert_with(Vec::new)
                .push(PortBinding {
                    host_ip: None,
                    host_port: Some(mapping.external.to_string()),
                });
        }

        let devices: Vec<DeviceMapping> = request
            .devices
            .iter()
            .map(|d| DeviceMapping {
                path_on_host: Some(d.path_on_host.clone()),
                path_in_container: Some(d.path_in_container.clone()),
                cgroup_permissions: Some(d.cgroup_permissions.clone()),
            })
            .collect();

        let host_config = HostConfig {
            binds: (!request.binds.is_empty()).then(|| request.binds.clone()),
            devices: (!devices.is_empty()).then_some(devices),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            restart_policy: request.restart_unless_stopped.then(|| RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            log_config: request.log_driver.as_ref().map(|driver| HostConfigLogConfig {
                typ: Some(driver.clone()),
                config: (!request.log_opts.is_empty())
                    .then(|| request.log_opts.clone().into_iter().collect()),
            }),
            network_mode: request.network_mode.clone(),
            memory: request.memory_bytes,
            cpu_period: request.cpu_period,
            cpu_quota: request.cpu_quota,
            device_requests: request.gpu_count.map(|count| {
                vec![DeviceRequest {
                    driver: Some("nvidia".to_owned()),
                    count: Some(count),
                    device_ids: None,
                    capabilities: Some(vec![vec!["gpu".to_owned()]]),
                    options: None,
                }]
            }),
            runtime: request.runtime.clone(),
            privileged: request.privileged.then_some(true),
            ..Default::default()
        };

        let config = Config {
            image: Some(request.image.clone()),
            entrypoint: (!request.entrypoint.is_empty()).then(|| request.entrypoint.clone()),
            env: (!request.env.is_empty()).then(|| request.env.clone()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: request.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| map_engine_error(e, "create", &request.name))?;

        for warning in &response.warnings {
            warn!(container = %request.name, warning = %warning, "engine create warning");
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), OrchestratorError> {
        use bollard::container::StartContainerOptions;

        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_engine_error(e, "start", id))
    }

    async fn stop_container(&self, id: &str) -> Result<(), OrchestratorError> {
        use bollard::container::StopContainerOptions;

        self.docker
            .stop_container(id, Some(StopContainerOptions { t: 10 }))
            .await
            .map_err(|e| map_engine_error(e, "stop", id))
    }

    async fn remove_container(&self, id: &str) -> Result<(), OrchestratorError> {
        self.docker
            .remove_container(id, None)
            .await
            .map_err(|e| map_engine_error(e, "remove", id))
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>, OrchestratorError> {
        use bollard::image::ListImagesOptions;

        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(|e| map_engine_error(e, "list", "images"))?;

        Ok(images
            .into_iter()
            .map(|img| ImageSummary {
                id: img.id,
                repo_tags: img.repo_tags,
                repo_digests: img.repo_digests,
                labels: img.labels.into_iter().collect(),
            })
            .collect())
    }

    async fn inspect_image(&self, id: &str) -> Result<ImageDetails, OrchestratorError> {
        let details = self
            .docker
            .inspect_image(id)
            .await
            .map_err(|e| map_engine_error(e, "inspect", id))?;

        Ok(ImageDetails {
            author: details.author.unwrap_or_default(),
            architecture: details.architecture.unwrap_or_default(),
            size_bytes: details.size.unwrap_or_default(),
        })
    }

    async fn pull_image(
        &self,
        name: &str,
        tag: &str,
        auth: Option<RegistryAuth>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<(), OrchestratorError> {
        use bollard::auth::DockerCredentials;
        use bollard::image::CreateImageOptions;

        let reference = format!("{name}:{tag}");
        let options = CreateImageOptions {
            from_image: name.to_owned(),
            tag: tag.to_owned(),
            ..Default::default()
        };
        let credentials = auth.map(|a| DockerCredentials {
            username: Some(a.username),
            password: Some(a.password),
            serveraddress: a.server_address,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(Some(options), None, credentials);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(OrchestratorError::Interrupted(format!(
                        "image pull cancelled: {reference}"
                    )));
                }
                _ = &mut deadline => {
                    return Err(OrchestratorError::ImagePull {
                        image: reference,
                        reason: format!(
                            "pull did not complete within {}s",
                            timeout.as_secs()
                        ),
                    });
                }
                progress = stream.next() => match progress {
                    Some(Ok(info)) => {
                        if let Some(status) = info.status {
                            debug!(image = %reference, status = %status, "pull progress");
                        }
                        if let Some(error) = info.error {
                            return Err(OrchestratorError::ImagePull {
                                image: reference,
                                reason: error,
                            });
                        }
                    }
                    Some(Err(e)) => {
                        return Err(OrchestratorError::ImagePull {
                            image: reference,
                            reason: e.to_string(),
                        });
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    async fn remove_image(&self, id: &str) -> Result<(), OrchestratorError> {
        self.docker
            .remove_image(id, None, None)
            .await
            .map_err(|e| map_engine_error(e, "remove", id))?;
        Ok(())
    }

    async fn subscribe_start_events(
        &self,
    ) -> Result<mpsc::Receiver<ContainerStartEvent>, OrchestratorError> {
        use bollard::system::EventsOptions;

        let mut filters = HashMap::new();
        filters.insert("type".to_owned(), vec!["container".to_owned()]);
        filters.insert("event".to_owned(), vec!["start".to_owned()]);

        let options = EventsOptions::<String> {
            since: None,
            until: None,
            filters,
        };

        let (tx, rx) = mpsc::channel(64);
        let docker = Arc::clone(&self.docker);

        tokio::spawn(async move {
            let mut stream = docker.events(Some(options));
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => {
                        let actor = event.actor.unwrap_or_default();
                        let container_id = actor.id.unwrap_or_default();
                        let image = actor
                            .attributes
                            .unwrap_or_default()
                            .get("image")
                            .cloned()
                            .unwrap_or_default();
                        if container_id.is_empty() {
                            continue;
                        }
                        if tx
                            .send(ContainerStartEvent {
                                container_id,
                                image,
                            })
                            .await
                            .is_err()
                        {
                            // Receiver dropped, subscription cancelled
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "engine event stream error, ending subscription");
                        return;
                    }
                }
            }
            debug!("engine event stream ended");
        });

        Ok(rx)
    }
}

/// 테스트용 Mock 엔진 클라이언트
///
/// 컨테이너/이미지 인벤토리를 메모리에 유지하고, 호출 횟수와 실패 주입을
/// 지원하여 엔진 없이도 오케스트레이션 로직을 검증할 수 있습니다.
#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    use super::*;

    /// Mock 엔진의 공유 상태
    #[derive(Default)]
    pub struct MockEngineState {
        /// 컨테이너 인벤토리
        pub containers: Mutex<Vec<ContainerSummary>>,
        /// 이미지 인벤토리
        pub images: Mutex<Vec<ImageSummary>>,
        /// create_container 호출 횟수
        pub create_calls: AtomicUsize,
        /// pull_image 호출 횟수
        pub pull_calls: AtomicUsize,
        /// 정지된 컨테이너 ID 기록
        pub stopped: Mutex<Vec<String>>,
        /// 제거된 컨테이너 ID 기록
        pub removed: Mutex<Vec<String>>,
        /// ping 실패 주입
        pub fail_ping: AtomicBool,
        /// start_container 실패 주입
        pub fail_start: AtomicBool,
        /// subscribe_start_events 실패 주입
        pub fail_subscribe: AtomicBool,
        /// 구독 시 생성된 이벤트 송신자
        pub event_tx: Mutex<Option<mpsc::Sender<ContainerStartEvent>>>,
        /// ID 생성용 카운터
        next_id: AtomicU64,
    }

    impl MockEngineState {
        /// 컨테이너를 인벤토리에 추가합니다.
        pub fn add_container(&self, summary: ContainerSummary) {
            self.containers.lock().unwrap().push(summary);
        }

        /// 이미지를 인벤토리에 추가합니다.
        pub fn add_image(&self, image: ImageSummary) {
            self.images.lock().unwrap().push(image);
        }

        /// 마지막 구독의 이벤트 송신자를 반환합니다.
        pub fn event_sender(&self) -> Option<mpsc::Sender<ContainerStartEvent>> {
            self.event_tx.lock().unwrap().clone()
        }

        fn generate_id(&self) -> String {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed);
            format!("{n:012x}{:052}", 0)
        }
    }

    /// 테스트용 Mock 엔진 클라이언트
    #[derive(Clone, Default)]
    pub struct MockEngineClient {
        /// 공유 상태 (테스트가 직접 조작/검증)
        pub state: Arc<MockEngineState>,
    }

    impl MockEngineClient {
        /// 빈 인벤토리로 mock 클라이언트를 생성합니다.
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl EngineClient for MockEngineClient {
        async fn ping(&self) -> Result<(), OrchestratorError> {
            if self.state.fail_ping.load(Ordering::Relaxed) {
                return Err(OrchestratorError::Unreachable("mock ping failure".to_owned()));
            }
            Ok(())
        }

        async fn list_containers(
            &self,
            all: bool,
        ) -> Result<Vec<ContainerSummary>, OrchestratorError> {
            let containers = self.state.containers.lock().unwrap();
            Ok(containers
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
            let id = self.state.generate_id();
            let image_id = {
                let images = self.state.images.lock().unwrap();
                images
                    .iter()
                    .find(|img| img.repo_tags.iter().any(|t| *t == request.image))
                    .map(|img| img.id.clone())
                    .unwrap_or_default()
            };
            self.state.add_container(ContainerSummary {
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
            if self.state.fail_start.load(Ordering::Relaxed) {
                return Err(OrchestratorError::ProcessExecution {
                    operation: "start".to_owned(),
                    target: id.to_owned(),
                    reason: "mock failure".to_owned(),
                });
            }
            let mut containers = self.state.containers.lock().unwrap();
            match containers.iter_mut().find(|c| c.id == id) {
                Some(container) => {
                    container.state = "running".to_owned();
                    Ok(())
                }
                None => Err(OrchestratorError::NotFound(id.to_owned())),
            }
        }

        async fn stop_container(&self, id: &str) -> Result<(), OrchestratorError> {
            self.state.stopped.lock().unwrap().push(id.to_owned());
            let mut containers = self.state.containers.lock().unwrap();
            match containers.iter_mut().find(|c| c.id == id) {
                Some(container) => {
                    container.state = "exited".to_owned();
                    Ok(())
                }
                None => Err(OrchestratorError::NotFound(id.to_owned())),
            }
        }

        async fn remove_container(&self, id: &str) -> Result<(), OrchestratorError> {
            self.state.removed.lock().unwrap().push(id.to_owned());
            let mut containers = self.state.containers.lock().unwrap();
            let before = containers.len();
            containers.retain(|c| c.id != id);
            if containers.len() == before {
                return Err(OrchestratorError::NotFound(id.to_owned()));
            }
            Ok(())
        }

        async fn list_images(&self) -> Result<Vec<ImageSummary>, OrchestratorError> {
            Ok(self.state.images.lock().unwrap().clone())
        }

        async fn inspect_image(&self, id: &str) -> Result<ImageDetails, OrchestratorError> {
            let images = self.state.images.lock().unwrap();
            images
                .iter()
                .find(|img| img.id == id)
                .map(|_| ImageDetails {
                    author: "mock".to_owned(),
                    architecture: "amd64".to_owned(),
                    size_bytes: 42,
                })
                .ok_or_else(|| OrchestratorError::NotFound(id.to_owned()))
        }

        async fn pull_image(
            &self,
            name: &str,
            tag: &str,
            _auth: Option<RegistryAuth>,
            _timeout: Duration,
            _cancel: CancellationToken,
        ) -> Result<(), OrchestratorError> {
            self.state.pull_calls.fetch_add(1, Ordering::Relaxed);
            let reference = format!("{name}:{tag}");
            let mut images = self.state.images.lock().unwrap();
            if !images.iter().any(|img| img.repo_tags.contains(&reference)) {
                images.push(ImageSummary {
                    id: format!("sha256:mock-{name}"),
                    repo_tags: vec![reference],
                    repo_digests: Vec::new(),
                    labels: BTreeMap::new(),
                });
            }
            Ok(())
        }

        async fn remove_image(&self, id: &str) -> Result<(), OrchestratorError> {
            let mut images = self.state.images.lock().unwrap();
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
                    "mock subscription failure".to_owned(),
                ));
            }
            let (tx, rx) = mpsc::channel(16);
            *self.state.event_tx.lock().unwrap() = Some(tx);
            Ok(rx)
        }
    }
}
