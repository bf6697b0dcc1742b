use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use quayside_core::config::QuaysideConfig;
use quayside_core::crypto::PassthroughDecryptor;
use quayside_daemon::cli::DaemonCli;
use quayside_daemon::logging::init_tracing;
use quayside_daemon::metrics_server::install_metrics_recorder;
use quayside_orchestrator::{BollardConnector, ContainerOrchestrator, OrchestratorOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드 및 CLI 오버라이드 적용
    let mut config = QuaysideConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {}", e))?;
    if let Some(log_level) = &cli.log_level {
        config.general.log_level = log_level.clone();
    }
    if let Some(log_format) = &cli.log_format {
        config.general.log_format = log_format.clone();
    }
    if let Some(engine_host) = &cli.engine_host {
        config.engine.host = engine_host.clone();
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!("quayside-daemon starting");

    if config.metrics.enabled {
        install_metrics_recorder(&config.metrics)?;
    }

    // 오케스트레이터 구성
    let orchestrator = Arc::new(ContainerOrchestrator::new(
        BollardConnector,
        Arc::new(PassthroughDecryptor),
    ));
    let options = OrchestratorOptions::from_core(&config.engine);
    orchestrator
        .configure(options)
        .await
        .map_err(|e| anyhow::anyhow!("failed to apply orchestrator options: {}", e))?;

    if config.engine.enabled {
        tracing::info!(host = %config.engine.host, "orchestration active");
    } else {
        tracing::info!("orchestration disabled by configuration");
    }

    // 종료 시그널 대기
    tracing::info!("quayside-daemon running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    // 우아한 종료
    orchestrator.shutdown().await;

    tracing::info!("quayside-daemon shut down");
    Ok(())
}
