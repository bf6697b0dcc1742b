//! 컨테이너/이미지 기술 모델 -- 불변 값 객체와 빌더
//!
//! [`ContainerConfiguration`]은 사용자가 원하는 컨테이너 상태를 선언하고,
//! [`ContainerInstanceDescriptor`]는 엔진에 실재하는 컨테이너를 기술합니다.
//! 두 타입 모두 엔진 wire 표현과 무관한 값 객체이며, 변환은
//! [`translate`](crate::translate) 모듈과 엔진 클라이언트가 담당합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

/// 기본 이미지 pull 타임아웃 (초)
pub const DEFAULT_PULL_TIMEOUT_SECS: u64 = 500;

/// 컨테이너 상태
///
/// 엔진의 문자열 상태를 4가지 상태로 사상합니다.
/// 알 수 없는 상태는 [`Installed`](Self::Installed)로 표시됩니다 (표시용 fail-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    /// 생성되었으나 실행 중이 아님 (created, restarting)
    Installed,
    /// 실행 중 (running)
    Active,
    /// 정지 중이거나 정지됨 (paused, exited)
    Stopping,
    /// 비정상 종료 (dead)
    Failed,
}

impl ContainerState {
    /// 엔진의 상태 문자열을 [`ContainerState`]로 변환합니다.
    ///
    /// 전체 사상 (total mapping): 어떤 입력도 에러 없이 상태를 반환합니다.
    pub fn from_engine(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "created" | "restarting" => Self::Installed,
            "running" => Self::Active,
            "paused" | "exited" => Self::Stopping,
            "dead" => Self::Failed,
            _ => Self::Installed,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed => write!(f, "installed"),
            Self::Active => write!(f, "active"),
            Self::Stopping => write!(f, "stopping"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// 포트 프로토콜
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortProtocol {
    /// TCP (기본값)
    #[default]
    Tcp,
    /// UDP
    Udp,
    /// SCTP
    Sctp,
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Sctp => write!(f, "sctp"),
        }
    }
}

impl FromStr for PortProtocol {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "sctp" => Ok(Self::Sctp),
            other => Err(OrchestratorError::BadRequest(format!(
                "unsupported port protocol: {other}"
            ))),
        }
    }
}

/// 내부/외부 포트 매핑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// 컨테이너 내부 포트
    pub internal: u16,
    /// 호스트 외부 포트
    pub external: u16,
    /// 프로토콜
    pub protocol: PortProtocol,
}

impl PortMapping {
    /// TCP 포트 매핑을 생성합니다.
    pub fn tcp(internal: u16, external: u16) -> Self {
        Self {
            internal,
            external,
            protocol: PortProtocol::Tcp,
        }
    }
}

/// 로그 드라이버
///
/// 엔진이 지원하는 고정 드라이버 집합입니다. 인식할 수 없는 입력은
/// [`EngineDefault`](Self::EngineDefault)로 사상되어 엔진 기본값을 사용합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogDriver {
    /// 엔진 기본 드라이버 (명시적 설정 없음)
    #[default]
    EngineDefault,
    /// 로깅 비활성화
    None,
    /// local
    Local,
    /// json-file
    JsonFile,
    /// syslog
    Syslog,
    /// journald
    Journald,
    /// gelf
    Gelf,
    /// fluentd
    Fluentd,
    /// awslogs
    Awslogs,
    /// splunk
    Splunk,
    /// etwlogs
    Etwlogs,
    /// gcplogs
    Gcplogs,
    /// loki
    Loki,
}

impl LogDriver {
    /// 문자열을 로그 드라이버로 변환합니다.
    ///
    /// 인식할 수 없는 값은 엔진 기본 드라이버로 대체됩니다 (best-effort).
    pub fn parse_or_default(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "none" => Self::None,
            "local" => Self::Local,
            "json-file" => Self::JsonFile,
            "syslog" => Self::Syslog,
            "journald" => Self::Journald,
            "gelf" => Self::Gelf,
            "fluentd" => Self::Fluentd,
            "awslogs" => Self::Awslogs,
            "splunk" => Self::Splunk,
            "etwlogs" => Self::Etwlogs,
            "gcplogs" => Self::Gcplogs,
            "loki" => Self::Loki,
            _ => Self::EngineDefault,
        }
    }

    /// 엔진에 전달할 드라이버 이름을 반환합니다.
    ///
    /// `EngineDefault`는 `None`을 반환하여 엔진 기본값을 사용하게 합니다.
    pub fn engine_value(&self) -> Option<&'static str> {
        match self {
            Self::EngineDefault => None,
            Self::None => Some("none"),
            Self::Local => Some("local"),
            Self::JsonFile => Some("json-file"),
            Self::Syslog => Some("syslog"),
            Self::Journald => Some("journald"),
            Self::Gelf => Some("gelf"),
            Self::Fluentd => Some("fluentd"),
            Self::Awslogs => Some("awslogs"),
            Self::Splunk => Some("splunk"),
            Self::Etwlogs => Some("etwlogs"),
            Self::Gcplogs => Some("gcplogs"),
            Self::Loki => Some("loki"),
        }
    }
}

/// 로깅 설정
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfiguration {
    /// 로그 드라이버
    pub driver: LogDriver,
    /// 드라이버별 파라미터
    pub params: BTreeMap<String, String>,
}

/// GPU 할당 지정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuSpec {
    /// 가용한 모든 GPU
    All,
    /// 지정된 개수의 GPU
    Count(u32),
}

impl GpuSpec {
    /// 엔진 device request의 count 값을 반환합니다 (-1 = all).
    pub fn device_request_count(&self) -> i64 {
        match self {
            Self::All => -1,
            Self::Count(n) => i64::from(*n),
        }
    }
}

/// 레지스트리 자격증명
///
/// 비밀번호 종류만 이미지 pull에 사용할 수 있습니다.
/// 비밀번호는 암호화된 형태로 보관되며 사용 직전에만 복호화됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryCredentials {
    /// 사용자명/암호화된 비밀번호 쌍
    Password {
        /// 레지스트리 URL (없으면 기본 레지스트리)
        url: Option<String>,
        /// 사용자명
        username: String,
        /// 암호화된 비밀번호
        encrypted_password: String,
    },
    /// ID 토큰 (pull에는 사용 불가 -- BadRequest로 거부됨)
    IdentityToken {
        /// 토큰 값
        token: String,
    },
}

/// 선언적 컨테이너 설정
///
/// 사용자가 원하는 컨테이너 상태를 기술하는 불변 값 객체입니다.
/// [`ContainerConfigurationBuilder`]로 생성합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfiguration {
    /// 컨테이너 이름
    pub name: String,
    /// 이미지 이름
    pub image: String,
    /// 이미지 태그
    pub image_tag: String,
    /// entrypoint 인자
    pub entrypoint: Vec<String>,
    /// 환경변수 (`KEY=VALUE` 형식)
    pub env: Vec<String>,
    /// 볼륨 매핑 (호스트 경로 -> 컨테이너 경로)
    pub volumes: BTreeMap<String, String>,
    /// 디바이스 지정 문자열 (`host[:container[:perms]]`)
    pub devices: Vec<String>,
    /// 특권 모드
    pub privileged: bool,
    /// 실패 시 재시작 (unless-stopped)
    pub restart_on_failure: bool,
    /// 포트 매핑
    pub ports: Vec<PortMapping>,
    /// 로깅 설정
    pub logging: LogConfiguration,
    /// 네트워크 모드 (bridge, host, ...)
    pub network_mode: Option<String>,
    /// 메모리 제한 (바이트)
    pub memory_bytes: Option<i64>,
    /// CPU 할당량 (논리 CPU 개수)
    pub cpus: Option<f64>,
    /// GPU 할당
    pub gpus: Option<GpuSpec>,
    /// 컨테이너 런타임 (nvidia 등)
    pub runtime: Option<String>,
    /// 프레임워크 관리 대상 여부
    pub framework_managed: bool,
    /// 집행용 이미지 다이제스트 (sha256:...)
    pub enforcement_digest: Option<String>,
    /// 이미지 pull 타임아웃 (초)
    pub image_pull_timeout_secs: u64,
    /// 레지스트리 자격증명
    pub registry_credentials: Option<RegistryCredentials>,
}

impl ContainerConfiguration {
    /// 빌더를 생성합니다.
    pub fn builder() -> ContainerConfigurationBuilder {
        ContainerConfigurationBuilder::default()
    }

    /// 엔진에 전달할 이미지 참조를 반환합니다.
    ///
    /// 다이제스트 전용 참조(태그 "none")는 이미지 이름만 사용합니다.
    pub fn image_reference(&self) -> String {
        if self.image_tag.is_empty() || self.image_tag == "none" {
            self.image.clone()
        } else {
            format!("{}:{}", self.image, self.image_tag)
        }
    }
}

/// 컨테이너 설정 빌더
#[derive(Debug, Default)]
pub struct ContainerConfigurationBuilder {
    name: String,
    image: String,
    image_tag: String,
    entrypoint: Vec<String>,
    env: Vec<String>,
    volumes: BTreeMap<String, String>,
    devices: Vec<String>,
    privileged: bool,
    restart_on_failure: bool,
    ports: Vec<PortMapping>,
    logging: LogConfiguration,
    network_mode: Option<String>,
    memory_bytes: Option<i64>,
    cpus: Option<f64>,
    gpus: Option<GpuSpec>,
    runtime: Option<String>,
    framework_managed: bool,
    enforcement_digest: Option<String>,
    image_pull_timeout_secs: Option<u64>,
    registry_credentials: Option<RegistryCredentials>,
}

impl ContainerConfigurationBuilder {
    /// 컨테이너 이름을 설정합니다.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 이미지 이름을 설정합니다.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// 이미지 태그를 설정합니다. 설정하지 않으면 `latest`가 사용됩니다.
    pub fn image_tag(mut self, tag: impl Into<String>) -> Self {
        self.image_tag = tag.into();
        self
    }

    /// entrypoint 인자를 설정합니다.
    pub fn entrypoint(mut self, entrypoint: Vec<String>) -> Self {
        self.entrypoint = entrypoint;
        self
    }

    /// 환경변수 목록을 설정합니다.
    pub fn env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// 볼륨 매핑을 추가합니다.
    pub fn volume(mut self, host: impl Into<String>, container: impl Into<String>) -> Self {
        self.volumes.insert(host.into(), container.into());
        self
    }

    /// 디바이스 지정 문자열 목록을 설정합니다.
    pub fn devices(mut self, devices: Vec<String>) -> Self {
        self.devices = devices;
        self
    }

    /// 특권 모드를 설정합니다.
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// 실패 시 재시작 여부를 설정합니다.
    pub fn restart_on_failure(mut self, restart: bool) -> Self {
        self.restart_on_failure = restart;
        self
    }

    /// 포트 매핑을 추가합니다.
    pub fn port(mut self, mapping: PortMapping) -> Self {
        self.ports.push(mapping);
        self
    }

    /// 로깅 설정을 지정합니다.
    pub fn logging(mut self, logging: LogConfiguration) -> Self {
        self.logging = logging;
        self
    }

    /// 네트워크 모드를 설정합니다.
    pub fn network_mode(mut self, mode: impl Into<String>) -> Self {
        self.network_mode = Some(mode.into());
        self
    }

    /// 메모리 제한(바이트)을 설정합니다.
    pub fn memory_bytes(mut self, bytes: i64) -> Self {
        self.memory_bytes = Some(bytes);
        self
    }

    /// CPU 할당량을 설정합니다.
    pub fn cpus(mut self, cpus: f64) -> Self {
        self.cpus = Some(cpus);
        self
    }

    /// GPU 할당을 설정합니다.
    pub fn gpus(mut self, gpus: GpuSpec) -> Self {
        self.gpus = Some(gpus);
        self
    }

    /// 컨테이너 런타임을 설정합니다.
    pub fn runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    /// 프레임워크 관리 대상 여부를 설정합니다.
    pub fn framework_managed(mut self, managed: bool) -> Self {
        self.framework_managed = managed;
        self
    }

    /// 집행용 이미지 다이제스트를 설정합니다.
    pub fn enforcement_digest(mut self, digest: impl Into<String>) -> Self {
        self.enforcement_digest = Some(digest.into());
        self
    }

    /// 이미지 pull 타임아웃(초)을 설정합니다.
    pub fn image_pull_timeout_secs(mut self, secs: u64) -> Self {
        self.image_pull_timeout_secs = Some(secs);
        self
    }

    /// 레지스트리 자격증명을 설정합니다.
    pub fn registry_credentials(mut self, credentials: RegistryCredentials) -> Self {
        self.registry_credentials = Some(credentials);
        self
    }

    /// 설정을 검증하고 [`ContainerConfiguration`]을 생성합니다.
    ///
    /// # Errors
    ///
    /// 이름 또는 이미지가 비어 있으면 `OrchestratorError::Config`를 반환합니다.
    pub fn build(self) -> Result<ContainerConfiguration, OrchestratorError> {
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::Config {
                field: "name".to_owned(),
                reason: "container name must not be empty".to_owned(),
            });
        }
        if self.image.trim().is_empty() {
            return Err(OrchestratorError::Config {
                field: "image".to_owned(),
                reason: "image name must not be empty".to_owned(),
            });
        }

        let image_tag = if self.image_tag.is_empty() {
            "latest".to_owned()
        } else {
            self.image_tag
        };

        Ok(ContainerConfiguration {
            name: self.name,
            image: self.image,
            image_tag,
            entrypoint: self.entrypoint,
            env: self.env,
            volumes: self.volumes,
            devices: self.devices,
            privileged: self.privileged,
            restart_on_failure: self.restart_on_failure,
            ports: self.ports,
            logging: self.logging,
            network_mode: self.network_mode,
            memory_bytes: self.memory_bytes,
            cpus: self.cpus,
            gpus: self.gpus,
            runtime: self.runtime,
            framework_managed: self.framework_managed,
            enforcement_digest: self.enforcement_digest,
            image_pull_timeout_secs: self
                .image_pull_timeout_secs
                .unwrap_or(DEFAULT_PULL_TIMEOUT_SECS),
            registry_credentials: self.registry_credentials,
        })
    }
}

/// 엔진에 실재하는 컨테이너의 기술자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInstanceDescriptor {
    /// 컨테이너 이름 (엔진의 선행 `/` 제거됨)
    pub name: String,
    /// 이미지 이름
    pub image_name: String,
    /// 이미지 태그
    pub image_tag: String,
    /// 컨테이너 ID
    pub id: String,
    /// 와일드카드 바인딩 포트만 포함하는 포트 매핑
    pub ports: Vec<PortMapping>,
    /// 컨테이너 상태
    pub state: ContainerState,
    /// 프레임워크 관리 대상 여부
    pub framework_managed: bool,
}

/// 이미지 pull/관리 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfiguration {
    /// 이미지 이름
    pub name: String,
    /// 이미지 태그
    pub tag: String,
    /// pull 타임아웃 (초)
    pub pull_timeout_secs: u64,
    /// 레지스트리 자격증명
    pub credentials: Option<RegistryCredentials>,
}

impl ImageConfiguration {
    /// 빌더를 생성합니다.
    pub fn builder() -> ImageConfigurationBuilder {
        ImageConfigurationBuilder::default()
    }

    /// `name:tag` 형식의 이미지 참조를 반환합니다.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

/// 이미지 설정 빌더
#[derive(Debug, Default)]
pub struct ImageConfigurationBuilder {
    name: String,
    tag: String,
    pull_timeout_secs: Option<u64>,
    credentials: Option<RegistryCredentials>,
}

impl ImageConfigurationBuilder {
    /// 이미지 이름을 설정합니다.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 이미지 태그를 설정합니다. 설정하지 않으면 `latest`가 사용됩니다.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// pull 타임아웃(초)을 설정합니다.
    pub fn pull_timeout_secs(mut self, secs: u64) -> Self {
        self.pull_timeout_secs = Some(secs);
        self
    }

    /// 레지스트리 자격증명을 설정합니다.
    pub fn credentials(mut self, credentials: RegistryCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// 설정을 검증하고 [`ImageConfiguration`]을 생성합니다.
    pub fn build(self) -> Result<ImageConfiguration, OrchestratorError> {
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::Config {
                field: "name".to_owned(),
                reason: "image name must not be empty".to_owned(),
            });
        }

        Ok(ImageConfiguration {
            name: self.name,
            tag: if self.tag.is_empty() {
                "latest".to_owned()
            } else {
                self.tag
            },
            pull_timeout_secs: self.pull_timeout_secs.unwrap_or(DEFAULT_PULL_TIMEOUT_SECS),
            credentials: self.credentials,
        })
    }
}

/// 엔진에 실재하는 이미지의 기술자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInstanceDescriptor {
    /// 이미지 이름 (태그 없는 이미지는 빈 문자열)
    pub name: String,
    /// 이미지 태그
    pub tag: String,
    /// 이미지 ID
    pub id: String,
    /// 작성자
    pub author: String,
    /// 아키텍처
    pub architecture: String,
    /// 이미지 크기 (바이트)
    pub size_bytes: i64,
    /// 이미지 레이블
    pub labels: BTreeMap<String, String>,
}

/// 이미지 참조 문자열을 (이름, 태그)로 분해합니다.
///
/// - `nginx:latest` -> (`nginx`, `latest`)
/// - `sha256:...` (다이제스트 전용) -> (참조 전체, `none`)
/// - `nginx` (태그 없음) -> (`nginx`, `latest`)
/// - `registry:5000/app` -> (`registry:5000/app`, `latest`)
///   (`/`가 포함된 `:` 구간은 포트이지 태그가 아님)
pub fn parse_image_reference(reference: &str) -> (String, String) {
    if reference.starts_with("sha256:") {
        return (reference.to_owned(), "none".to_owned());
    }
    match reference.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') && !name.is_empty() => {
            (name.to_owned(), tag.to_owned())
        }
        _ => (reference.to_owned(), "latest".to_owned()),
    }
}
