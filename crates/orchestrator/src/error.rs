//! 오케스트레이터 에러 타입
//!
//! [`OrchestratorError`]는 오케스트레이터 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<OrchestratorError> for QuaysideError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use quayside_core::error::{ContainerError, QuaysideError};

/// 오케스트레이터 도메인 에러
///
/// 엔진 API 호출, 이미지 pull, 허용 목록 집행, 설정 에러 등
/// 오케스트레이터 내부의 모든 에러 상황을 포괄합니다.
/// 엔진(bollard) 고유 에러는 각 작업 경계에서 작업/대상 컨텍스트와 함께
/// 이 분류로 변환되며, 원본 타입은 노출되지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// 컨테이너 엔진에 연결할 수 없음
    #[error("engine unreachable: {0}")]
    Unreachable(String),

    /// 잘못된 요청 (지원하지 않는 자격증명 종류, 빈 이미지 이름 등)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// 엔진 작업 실행 실패
    #[error("{operation} failed for '{target}': {reason}")]
    ProcessExecution {
        /// 실패한 작업명 (create, start, stop, ...)
        operation: String,
        /// 대상 컨테이너/이미지
        target: String,
        /// 실패 사유
        reason: String,
    },

    /// 이미지 pull 실패 (타임아웃 포함)
    #[error("image pull failed for '{image}': {reason}")]
    ImagePull {
        /// 대상 이미지 참조
        image: String,
        /// 실패 사유
        reason: String,
    },

    /// 대상 컨테이너/이미지를 찾을 수 없음
    #[error("not found: {0}")]
    NotFound(String),

    /// 작업이 취소됨 (종료 요청 등, 실패와 구분되는 경로)
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 이벤트 구독 실패
    #[error("event subscription error: {0}")]
    Subscription(String),

    /// 자격증명 복호화 실패
    #[error("credential decryption error: {0}")]
    Crypto(String),
}

impl From<OrchestratorError> for QuaysideError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Unreachable(msg) => {
                QuaysideError::Container(ContainerError::Unreachable(msg))
            }
            OrchestratorError::BadRequest(msg) => {
                QuaysideError::Container(ContainerError::BadRequest(msg))
            }
            OrchestratorError::NotFound(msg) => {
                QuaysideError::Container(ContainerError::NotFound(msg))
            }
            OrchestratorError::Interrupted(msg) => {
                QuaysideError::Container(ContainerError::Interrupted(msg))
            }
            OrchestratorError::Crypto(msg) => QuaysideError::Crypto(msg),
            err @ OrchestratorError::ImagePull { .. } => {
                QuaysideError::Container(ContainerError::ImageIo(err.to_string()))
            }
            err @ (OrchestratorError::ProcessExecution { .. }
            | OrchestratorError::Subscription(_)) => {
                QuaysideError::Container(ContainerError::ProcessExecution(err.to_string()))
            }
            err @ OrchestratorError::Config { .. } => {
                QuaysideError::Container(ContainerError::BadRequest(err.to_string()))
            }
        }
    }
}
