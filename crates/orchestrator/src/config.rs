//! 오케스트레이터 런타임 옵션
//!
//! [`OrchestratorOptions`]는 `configure` 호출 한 번에 적용되는 옵션 묶음입니다.
//! `PartialEq` 비교로 변경 여부를 판단하므로, 동일한 옵션을 다시 적용하면
//! 아무 일도 일어나지 않습니다 (diff 기반 재구성).

use std::collections::BTreeSet;

use quayside_core::config::EngineConfig;

use crate::enforcement::normalize_digest;
use crate::error::OrchestratorError;
use crate::model::DEFAULT_PULL_TIMEOUT_SECS;

/// 오케스트레이터 런타임 옵션
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// 오케스트레이션 활성화 여부 (false면 연결 해제 및 대기)
    pub enabled: bool,
    /// 컨테이너 엔진 엔드포인트
    pub engine_host: String,
    /// 허용 목록 집행 활성화 여부
    pub enforcement_enabled: bool,
    /// 허용 다이제스트 목록 (정규화됨)
    pub allowlist: BTreeSet<String>,
    /// 기본 이미지 pull 타임아웃 (초)
    pub image_pull_timeout_secs: u64,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            engine_host: "unix:///var/run/docker.sock".to_owned(),
            enforcement_enabled: false,
            allowlist: BTreeSet::new(),
            image_pull_timeout_secs: DEFAULT_PULL_TIMEOUT_SECS,
        }
    }
}

impl OrchestratorOptions {
    /// 빌더를 생성합니다.
    pub fn builder() -> OrchestratorOptionsBuilder {
        OrchestratorOptionsBuilder::default()
    }

    /// 코어 설정 섹션에서 옵션을 구성합니다.
    ///
    /// 허용 목록 항목은 정규화됩니다 (`name@sha256:...` -> `sha256:...`).
    pub fn from_core(config: &EngineConfig) -> Self {
        Self {
            enabled: config.enabled,
            engine_host: config.host.clone(),
            enforcement_enabled: config.enforcement_enabled,
            allowlist: config
                .enforcement_allowlist
                .iter()
                .map(|d| normalize_digest(d).to_owned())
                .collect(),
            image_pull_timeout_secs: config.image_pull_timeout_secs,
        }
    }

    /// 옵션의 유효성을 검증합니다.
    ///
    /// # Errors
    ///
    /// 활성화 상태에서 엔진 호스트가 비어 있거나, 타임아웃이 0이거나,
    /// 허용 목록에 빈 항목이 있으면 `OrchestratorError::Config`를 반환합니다.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.enabled && self.engine_host.trim().is_empty() {
            return Err(OrchestratorError::Config {
                field: "engine_host".to_owned(),
                reason: "must not be empty when orchestration is enabled".to_owned(),
            });
        }
        if self.image_pull_timeout_secs == 0 {
            return Err(OrchestratorError::Config {
                field: "image_pull_timeout_secs".to_owned(),
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.allowlist.iter().any(|d| d.trim().is_empty()) {
            return Err(OrchestratorError::Config {
                field: "allowlist".to_owned(),
                reason: "entries must not be blank".to_owned(),
            });
        }
        Ok(())
    }
}

/// 오케스트레이터 옵션 빌더
#[derive(Debug, Default)]
pub struct OrchestratorOptionsBuilder {
    options: OrchestratorOptions,
}

impl OrchestratorOptionsBuilder {
    /// 오케스트레이션 활성화 여부를 설정합니다.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.options.enabled = enabled;
        self
    }

    /// 엔진 호스트를 설정합니다.
    pub fn engine_host(mut self, host: impl Into<String>) -> Self {
        self.options.engine_host = host.into();
        self
    }

    /// 집행 활성화 여부를 설정합니다.
    pub fn enforcement_enabled(mut self, enabled: bool) -> Self {
        self.options.enforcement_enabled = enabled;
        self
    }

    /// 허용 다이제스트를 추가합니다 (정규화됨).
    pub fn allow_digest(mut self, digest: impl AsRef<str>) -> Self {
        self.options
            .allowlist
            .insert(normalize_digest(digest.as_ref()).to_owned());
        self
    }

    /// 기본 이미지 pull 타임아웃(초)을 설정합니다.
    pub fn image_pull_timeout_secs(mut self, secs: u64) -> Self {
        self.options.image_pull_timeout_secs = secs;
        self
    }

    /// 옵션을 검증하고 반환합니다.
    pub fn build(self) -> Result<OrchestratorOptions, OrchestratorError> {
        self.options.validate()?;
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        OrchestratorOptions::default().validate().unwrap();
    }

    #[test]
    fn from_core_normalizes_allowlist() {
        let core = EngineConfig {
            enabled: true,
            host: "unix:///var/run/docker.sock".to_owned(),
            enforcement_enabled: true,
            enforcement_allowlist: vec![
                "nginx@sha256:abc".to_owned(),
                "sha256:def".to_owned(),
            ],
            image_pull_timeout_secs: 300,
        };
        let options = OrchestratorOptions::from_core(&core);
        assert!(options.enabled);
        assert!(options.enforcement_enabled);
        assert!(options.allowlist.contains("sha256:abc"));
        assert!(options.allowlist.contains("sha256:def"));
        assert_eq!(options.image_pull_timeout_secs, 300);
    }

    #[test]
    fn validate_rejects_empty_host_when_enabled() {
        let options = OrchestratorOptions {
            enabled: true,
            engine_host: "  ".to_owned(),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        // 비활성 상태에서는 빈 호스트 허용
        let options = OrchestratorOptions {
            enabled: false,
            engine_host: String::new(),
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let options = OrchestratorOptions {
            image_pull_timeout_secs: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_allowlist_entry() {
        let options = OrchestratorOptions {
            allowlist: BTreeSet::from(["".to_owned()]),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn builder_normalizes_digests() {
        let options = OrchestratorOptions::builder()
            .enabled(true)
            .engine_host("tcp://localhost:2375")
            .enforcement_enabled(true)
            .allow_digest("app@sha256:abc")
            .image_pull_timeout_secs(60)
            .build()
            .unwrap();
        assert!(options.allowlist.contains("sha256:abc"));
    }

    #[test]
    fn identical_options_compare_equal() {
        let a = OrchestratorOptions::builder()
            .enabled(true)
            .engine_host("unix:///var/run/docker.sock")
            .allow_digest("sha256:abc")
            .build()
            .unwrap();
        let b = OrchestratorOptions::builder()
            .enabled(true)
            .engine_host("unix:///var/run/docker.sock")
            .allow_digest("sha256:abc")
            .build()
            .unwrap();
        assert_eq!(a, b);

        let c = OrchestratorOptions::builder()
            .enabled(true)
            .engine_host("unix:///var/run/docker.sock")
            .allow_digest("sha256:other")
            .build()
            .unwrap();
        assert_ne!(a, c);
    }
}
