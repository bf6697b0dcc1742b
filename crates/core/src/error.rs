//! 에러 타입 — 도메인별 에러 정의

/// Quayside 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum QuaysideError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 컨테이너 엔진/오케스트레이션 에러
    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    /// 자격증명 복호화 에러
    #[error("crypto error: {0}")]
    Crypto(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 컨테이너 도메인 에러
///
/// 오케스트레이터가 상위 레이어로 전파하는 에러 분류입니다.
/// 엔진(bollard) 고유 에러는 이 분류로 변환된 뒤에만 노출됩니다.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// 컨테이너 엔진에 연결할 수 없음
    #[error("engine unreachable: {0}")]
    Unreachable(String),

    /// 잘못된 요청 (지원하지 않는 자격증명 종류, 빈 이미지 이름 등)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// 엔진 작업 실행 실패
    #[error("process execution failed: {0}")]
    ProcessExecution(String),

    /// 이미지 pull/push I/O 실패
    #[error("image io error: {0}")]
    ImageIo(String),

    /// 대상 컨테이너/이미지를 찾을 수 없음
    #[error("not found: {0}")]
    NotFound(String),

    /// 작업이 취소됨 (실패와 구분되는 종료 경로)
    #[error("interrupted: {0}")]
    Interrupted(String),
}
