//! 시그널 엔진 실행 파일.
//!
//! # 사용 예시
//!
//! ```bash
//! # 데몬 모드 (Ctrl+C로 종료)
//! signal-engine --config config/default.toml run
//!
//! # 시뮬레이션 거래소로 한 사이클만 실행
//! signal-engine --simulated once
//! signal-engine --simulated once --json
//!
//! # 최종 설정 확인
//! signal-engine config
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use signal_core::{init_logging, AppConfig, LogConfig};
use signal_engine::{telemetry, InstrumentOutcome, PipelineBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "signal-engine")]
#[command(about = "Crypto signal pipeline - 지표 기반 시그널 생성 및 알림", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 경로
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// 실제 거래소 대신 시뮬레이션 데이터 사용
    #[arg(long, default_value = "false")]
    simulated: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 종료 시그널을 받을 때까지 주기적으로 사이클 실행
    Run,

    /// 사이클 한 번 실행 후 결과 출력
    Once {
        /// 결과를 JSON으로 출력
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// 파일과 환경 변수를 합친 최종 설정을 TOML로 출력
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    if let Commands::Config = cli.command {
        let rendered = redacted(config)
            .to_toml_string()
            .context("failed to render config")?;
        print!("{rendered}");
        return Ok(());
    }

    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    info!(
        config = %cli.config.display(),
        simulated = cli.simulated,
        instruments = config.instruments.len(),
        "Starting signal engine"
    );

    if let Some(addr) = telemetry::listen_addr(&config.metrics)
        .with_context(|| format!("invalid metrics listen_addr {}", config.metrics.listen_addr))?
    {
        telemetry::install_exporter(addr).context("failed to start Prometheus exporter")?;
    }

    let mut pipeline = PipelineBuilder::new(config)
        .simulated(cli.simulated)
        .build()
        .await
        .context("failed to assemble pipeline")?;

    pipeline.monitor.connect_all().await;

    match cli.command {
        Commands::Run => {
            let shutdown_token = CancellationToken::new();
            tokio::spawn(shutdown_signal(shutdown_token.clone()));
            pipeline.monitor.run(shutdown_token).await;
        }
        Commands::Config => {}
        Commands::Once { json } => {
            let report = pipeline.monitor.run_cycle().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            for (key, outcome) in &report.outcomes {
                match outcome {
                    InstrumentOutcome::Signal { signal_id, status } => {
                        println!("{key}: signal {signal_id} {status}");
                    }
                    other => println!("{key}: {other:?}"),
                }
            }
            for (key, error) in &report.errors {
                println!("{key}: error {error}");
            }
        }
    }

    let metrics = pipeline.bus.metrics();
    info!(
        events = metrics.events_published,
        handler_errors = metrics.handler_errors,
        "Signal engine stopped"
    );
    Ok(())
}

/// 출력용으로 자격 증명을 가립니다.
fn redacted(mut config: AppConfig) -> AppConfig {
    const MASK: &str = "********";
    for exchange in config.exchanges.values_mut() {
        if exchange.api_key.is_some() {
            exchange.api_key = Some(MASK.to_string());
        }
        if exchange.api_secret.is_some() {
            exchange.api_secret = Some(MASK.to_string());
        }
    }
    if !config.notifications.telegram.bot_token.is_empty() {
        config.notifications.telegram.bot_token = MASK.to_string();
    }
    config
}

/// Ctrl+C 또는 SIGTERM을 받으면 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
}
