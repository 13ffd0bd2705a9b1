use anyhow::Context;
use clap::Parser;
use scenario_simulator::config::load_config_from_file;
use scenario_simulator::server::serve_tcp;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// YAML로 선언한 시나리오로 요청에 응답하는 시뮬레이터.
#[derive(Parser, Debug)]
#[command(name = "scenario-simulator", version, about)]
struct Cli {
    /// 시뮬레이터 설정 파일 경로.
    #[arg(short, long)]
    config: PathBuf,
    /// 설정 파일의 수신 주소 대신 사용할 주소.
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config_from_file(&cli.config)?;
    let dispatcher = Arc::new(
        config
            .build_dispatcher()
            .with_context(|| format!("시뮬레이터 '{}' 초기화 실패", config.name))?,
    );
    let listen = cli.listen.unwrap_or_else(|| config.listen.clone());
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("수신 주소 바인드 실패: {listen}"))?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("종료 신호 수신");
            shutdown.cancel();
        }
    });

    serve_tcp(listener, dispatcher, config.transport, cancel).await
}
