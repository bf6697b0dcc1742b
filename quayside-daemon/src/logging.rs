//! quayside-daemon 로깅 초기화
//!
//! `[general]` 섹션으로 전역 tracing 구독자를 구성합니다. 형식은
//! json(운영)과 pretty(개발) 둘만 지원합니다. `RUST_LOG` 환경변수가
//! 설정되어 있으면 설정 파일의 log_level보다 우선합니다.

use anyhow::{Result, bail};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use quayside_core::config::GeneralConfig;

/// 전역 tracing 구독자를 설치합니다. 프로세스당 한 번만 호출해야 합니다.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    let initialized = match config.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        other => bail!("unknown log format '{other}', expected 'json' or 'pretty'"),
    };
    if let Err(e) = initialized {
        bail!("failed to initialize tracing subscriber: {e}");
    }
    Ok(())
}

/// 설정 레벨은 quayside 크레이트에만 적용하고, 의존 크레이트는 warn으로 누릅니다.
fn default_directives(level: &str) -> String {
    format!("warn,quayside_core={level},quayside_orchestrator={level},quayside_daemon={level}")
}
