//! Prometheus 메트릭 수집기 설치
//!
//! `metrics-exporter-prometheus`의 내장 HTTP 리스너로 `/metrics`
//! 스크레이프 엔드포인트를 노출합니다. 수집기는 전역이므로 프로세스당
//! 한 번만 설치할 수 있습니다.

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result, bail};
use metrics_exporter_prometheus::PrometheusBuilder;

use quayside_core::config::MetricsConfig;

/// 전역 메트릭 수집기를 설치하고 HTTP 리스너를 시작합니다.
///
/// # Errors
///
/// 엔드포인트가 `/metrics`가 아니거나, 주소 해석이 실패하거나,
/// 전역 수집기가 이미 설치된 경우 에러를 반환합니다.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = scrape_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install metrics recorder")?;
    quayside_core::metrics::describe_all();

    tracing::info!(
        listen_addr = %addr,
        endpoint = %config.endpoint,
        "Prometheus metrics endpoint active"
    );
    Ok(())
}

/// 설정에서 스크레이프 주소를 해석합니다. 현재는 `/metrics` 경로만 지원합니다.
fn scrape_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != "/metrics" {
        bail!(
            "unsupported metrics endpoint '{}': only '/metrics' is currently supported",
            config.endpoint
        );
    }
    let ip: IpAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("invalid metrics listen address '{}'", config.listen_addr))?;
    Ok(SocketAddr::new(ip, config.port))
}
