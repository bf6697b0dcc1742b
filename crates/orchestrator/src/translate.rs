//! 선언적 설정을 엔진 생성 요청으로 변환
//!
//! [`build_create_request`]는 [`ContainerConfiguration`]을
//! [`ContainerCreateRequest`]로 조립합니다. 변환은 관심사별 best-effort로
//! 동작합니다: 잘못된 개별 항목(빈 환경변수, 불완전한 볼륨, 형식이 어긋난
//! 디바이스 지정)은 경고 로그와 함께 건너뛰고 나머지 설정은 그대로 반영합니다.
//! 변환 자체는 실패하지 않습니다.

use tracing::warn;

use crate::docker::{ContainerCreateRequest, DeviceSpec};
use crate::model::ContainerConfiguration;

/// CPU quota 계산에 사용하는 period (마이크로초)
const CPU_PERIOD_MICROS: i64 = 100_000;

/// 컨테이너 설정에서 엔진 생성 요청을 조립합니다.
pub fn build_create_request(config: &ContainerConfiguration) -> ContainerCreateRequest {
    let env = config
        .env
        .iter()
        .filter_map(|entry| {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                warn!(container = %config.name, "skipping empty environment entry");
                None
            } else {
                Some(trimmed.to_owned())
            }
        })
        .collect();

    let binds = config
        .volumes
        .iter()
        .filter_map(|(host, container)| {
            if host.trim().is_empty() || container.trim().is_empty() {
                warn!(
                    container = %config.name,
                    host = %host,
                    target = %container,
                    "skipping incomplete volume mapping"
                );
                None
            } else {
                Some(format!("{host}:{container}"))
            }
        })
        .collect();

    let devices = config
        .devices
        .iter()
        .filter_map(|spec| match parse_device_spec(spec) {
            Some(device) => Some(device),
            None => {
                warn!(container = %config.name, device = %spec, "skipping malformed device spec");
                None
            }
        })
        .collect();

    let (cpu_period, cpu_quota) = match config.cpus {
        Some(cpus) if cpus > 0.0 => (
            Some(CPU_PERIOD_MICROS),
            Some((CPU_PERIOD_MICROS as f64 * cpus) as i64),
        ),
        Some(cpus) => {
            warn!(container = %config.name, cpus, "ignoring non-positive cpu allocation");
            (None, None)
        }
        None => (None, None),
    };

    ContainerCreateRequest {
        name: config.name.clone(),
        image: config.image_reference(),
        entrypoint: config.entrypoint.clone(),
        env,
        binds,
        devices,
        restart_unless_stopped: config.restart_on_failure,
        port_bindings: config.ports.clone(),
        log_driver: config
            .logging
            .driver
            .engine_value()
            .map(str::to_owned),
        log_opts: config.logging.params.clone(),
        network_mode: config.network_mode.clone(),
        memory_bytes: config.memory_bytes,
        cpu_period,
        cpu_quota,
        gpu_count: config.gpus.map(|g| g.device_request_count()),
        runtime: config.runtime.clone(),
        privileged: config.privileged,
    }
}

/// `host[:container[:perms]]` 형식의 디바이스 지정을 분해합니다.
///
/// 컨테이너 경로가 생략되면 호스트 경로를 재사용하고,
/// 권한이 생략되면 `rwm`을 사용합니다. 빈 호스트 경로나
/// 네 조각 이상의 지정은 `None`을 반환합니다.
pub fn parse_device_spec(spec: &str) -> Option<DeviceSpec> {
    let parts: Vec<&str> = spec.split(':').collect();
    let (host, container, perms) = match parts.as_slice() {
        [host] => (*host, *host, "rwm"),
        [host, container] => (*host, *container, "rwm"),
        [host, container, perms] => (*host, *container, *perms),
        _ => return None,
    };

    if host.trim().is_empty() || container.trim().is_empty() || perms.trim().is_empty() {
        return None;
    }

    Some(DeviceSpec {
        path_on_host: host.to_owned(),
        path_in_container: container.to_owned(),
        cgroup_permissions: perms.to_owned(),
    })
}
