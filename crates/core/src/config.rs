//! 설정 관리 — quayside.toml 파싱 및 런타임 설정
//!
//! [`QuaysideConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`QUAYSIDE_ENGINE_HOST=tcp://...` 형식)
//! 3. 설정 파일 (`quayside.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), quayside_core::error::QuaysideError> {
//! use quayside_core::config::QuaysideConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = QuaysideConfig::load("quayside.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = QuaysideConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, QuaysideError};

/// Quayside 통합 설정
///
/// `quayside.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuaysideConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 컨테이너 엔진/오케스트레이션 설정
    #[serde(default)]
    pub engine: EngineConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl QuaysideConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, QuaysideError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, QuaysideError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                QuaysideError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                QuaysideError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, QuaysideError> {
        toml::from_str(toml_str).map_err(|e| {
            QuaysideError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `QUAYSIDE_{SECTION}_{FIELD}`
    /// 예: `QUAYSIDE_ENGINE_HOST=unix:///run/docker.sock`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "QUAYSIDE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "QUAYSIDE_GENERAL_LOG_FORMAT");

        // Engine
        override_bool(&mut self.engine.enabled, "QUAYSIDE_ENGINE_ENABLED");
        override_string(&mut self.engine.host, "QUAYSIDE_ENGINE_HOST");
        override_bool(
            &mut self.engine.enforcement_enabled,
            "QUAYSIDE_ENGINE_ENFORCEMENT_ENABLED",
        );
        override_csv(
            &mut self.engine.enforcement_allowlist,
            "QUAYSIDE_ENGINE_ENFORCEMENT_ALLOWLIST",
        );
        override_u64(
            &mut self.engine.image_pull_timeout_secs,
            "QUAYSIDE_ENGINE_IMAGE_PULL_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "QUAYSIDE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "QUAYSIDE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "QUAYSIDE_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), QuaysideError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        // engine 검증
        if self.engine.enabled {
            if self.engine.host.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "engine.host".to_owned(),
                    reason: "host must not be empty when engine is enabled".to_owned(),
                }
                .into());
            }

            if self.engine.image_pull_timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "engine.image_pull_timeout_secs".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
        }

        // 허용 목록 항목은 공백일 수 없음
        if self
            .engine
            .enforcement_allowlist
            .iter()
            .any(|d| d.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                field: "engine.enforcement_allowlist".to_owned(),
                reason: "allowlist entries must not be blank".to_owned(),
            }
            .into());
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "metrics.port".to_owned(),
                reason: "port must be non-zero when metrics are enabled".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 컨테이너 엔진/오케스트레이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 컨테이너 엔진 엔드포인트 (unix 소켓 경로 또는 tcp:// URL)
    pub host: String,
    /// 다이제스트 허용 목록 집행 활성화
    pub enforcement_enabled: bool,
    /// 허용되는 이미지 다이제스트 목록 (sha256:...)
    pub enforcement_allowlist: Vec<String>,
    /// 이미지 pull 타임아웃 (초)
    pub image_pull_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "unix:///var/run/docker.sock".to_owned(),
            enforcement_enabled: false,
            enforcement_allowlist: Vec::new(),
            image_pull_timeout_secs: 500,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 스크레이프 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9184,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
