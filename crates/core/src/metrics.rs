//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `quayside_`
//! - 모듈명: `orchestrator_`, `enforcement_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(quayside_core::metrics::ORCHESTRATOR_CONTAINERS_STARTED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 작업 레이블 키 (create, start, stop, delete, pull)
pub const LABEL_OPERATION: &str = "operation";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Orchestrator 메트릭 ────────────────────────────────────────────

/// Orchestrator: 엔진 연결 수립 수 (counter)
pub const ORCHESTRATOR_ENGINE_CONNECTS_TOTAL: &str = "quayside_orchestrator_engine_connects_total";

/// Orchestrator: 엔진 연결 해제 수 (counter)
pub const ORCHESTRATOR_ENGINE_DISCONNECTS_TOTAL: &str =
    "quayside_orchestrator_engine_disconnects_total";

/// Orchestrator: 시작된 컨테이너 수 (counter)
pub const ORCHESTRATOR_CONTAINERS_STARTED_TOTAL: &str =
    "quayside_orchestrator_containers_started_total";

/// Orchestrator: 삭제된 컨테이너 수 (counter)
pub const ORCHESTRATOR_CONTAINERS_DELETED_TOTAL: &str =
    "quayside_orchestrator_containers_deleted_total";

/// Orchestrator: 이미지 pull 시도 수 (counter)
pub const ORCHESTRATOR_IMAGE_PULLS_TOTAL: &str = "quayside_orchestrator_image_pulls_total";

/// Orchestrator: 이미지 pull 실패 수 (counter)
pub const ORCHESTRATOR_IMAGE_PULL_FAILURES_TOTAL: &str =
    "quayside_orchestrator_image_pull_failures_total";

/// Orchestrator: 프레임워크 관리 컨테이너 수 (gauge)
pub const ORCHESTRATOR_MANAGED_CONTAINERS: &str = "quayside_orchestrator_managed_containers";

// ─── Enforcement 메트릭 ─────────────────────────────────────────────

/// Enforcement: 허용 목록 위반으로 차단된 컨테이너 수 (counter)
pub const ENFORCEMENT_DENIALS_TOTAL: &str = "quayside_enforcement_denials_total";

/// Enforcement: 실행된 전체 스윕 수 (counter)
pub const ENFORCEMENT_SWEEPS_TOTAL: &str = "quayside_enforcement_sweeps_total";

/// Enforcement: 이벤트 스트림 재구독 수 (counter)
pub const ENFORCEMENT_MONITOR_RESTARTS_TOTAL: &str =
    "quayside_enforcement_monitor_restarts_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// `metrics::describe_counter!()`, `describe_gauge!()`를 호출하여
/// Prometheus HELP 텍스트를 설정합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `quayside-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Orchestrator
    describe_counter!(
        ORCHESTRATOR_ENGINE_CONNECTS_TOTAL,
        "Total number of successful container engine connections"
    );
    describe_counter!(
        ORCHESTRATOR_ENGINE_DISCONNECTS_TOTAL,
        "Total number of container engine disconnections"
    );
    describe_counter!(
        ORCHESTRATOR_CONTAINERS_STARTED_TOTAL,
        "Total number of containers started through the orchestrator"
    );
    describe_counter!(
        ORCHESTRATOR_CONTAINERS_DELETED_TOTAL,
        "Total number of containers deleted through the orchestrator"
    );
    describe_counter!(
        ORCHESTRATOR_IMAGE_PULLS_TOTAL,
        "Total number of image pull attempts"
    );
    describe_counter!(
        ORCHESTRATOR_IMAGE_PULL_FAILURES_TOTAL,
        "Total number of failed image pulls"
    );
    describe_gauge!(
        ORCHESTRATOR_MANAGED_CONTAINERS,
        "Number of containers currently tracked as framework-managed"
    );

    // Enforcement
    describe_counter!(
        ENFORCEMENT_DENIALS_TOTAL,
        "Total number of containers stopped and removed by allowlist enforcement"
    );
    describe_counter!(
        ENFORCEMENT_SWEEPS_TOTAL,
        "Total number of full allowlist sweeps over running containers"
    );
    describe_counter!(
        ENFORCEMENT_MONITOR_RESTARTS_TOTAL,
        "Total number of container-start event stream resubscriptions"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        ORCHESTRATOR_ENGINE_CONNECTS_TOTAL,
        ORCHESTRATOR_ENGINE_DISCONNECTS_TOTAL,
        ORCHESTRATOR_CONTAINERS_STARTED_TOTAL,
        ORCHESTRATOR_CONTAINERS_DELETED_TOTAL,
        ORCHESTRATOR_IMAGE_PULLS_TOTAL,
        ORCHESTRATOR_IMAGE_PULL_FAILURES_TOTAL,
        ORCHESTRATOR_MANAGED_CONTAINERS,
        ENFORCEMENT_DENIALS_TOTAL,
        ENFORCEMENT_SWEEPS_TOTAL,
        ENFORCEMENT_MONITOR_RESTARTS_TOTAL,
    ];

    #[test]
    fn all_metrics_start_with_quayside_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("quayside_"),
                "Metric '{}' does not start with 'quayside_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_end_with_total_suffix() {
        for name in ALL_METRIC_NAMES {
            if *name != ORCHESTRATOR_MANAGED_CONTAINERS {
                assert!(
                    name.ends_with("_total"),
                    "Counter '{}' should end with '_total'",
                    name
                );
            }
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        // describe_all() should not panic even without a recorder installed
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_OPERATION, LABEL_RESULT] {
            assert_eq!(label.to_lowercase(), label);
        }
    }
}
