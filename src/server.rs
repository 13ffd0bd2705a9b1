use crate::channel::{TcpChannel, Transport};
use crate::engine::ScenarioDispatcher;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// TCP 연결마다 워커 태스크 하나를 띄워 시나리오를 처리한다.
///
/// 모든 워커는 읽기 전용 디스패처를 공유하며 각 연결의 채널은 해당 워커가 독점한다.
/// 취소되면 더 이상 연결을 받지 않고 진행 중인 워커가 끝나기를 기다린다.
pub async fn serve_tcp(
    listener: TcpListener,
    dispatcher: Arc<ScenarioDispatcher>,
    transport: Transport,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let local = listener.local_addr()?;
    info!(%local, %transport, scenarios = dispatcher.registry().len(), "시뮬레이터 수신 시작");
    let mut workers = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            Some(joined) = workers.join_next(), if !workers.is_empty() => {
                if let Err(err) = joined {
                    warn!(error = %err, "워커 태스크 비정상 종료");
                }
                continue;
            }
            accepted = listener.accept() => accepted,
        };
        let (stream, peer) = match accepted {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "연결 수락 실패");
                continue;
            }
        };
        info!(%peer, "연결 수락");
        let dispatcher = dispatcher.clone();
        let token = cancel.clone();
        workers.spawn(async move {
            let mut channel = TcpChannel::from_tcp(transport, stream);
            let summary = dispatcher.serve(&mut channel, token).await;
            info!(
                %peer,
                completed = summary.completed,
                failed = summary.failed,
                "연결 종료"
            );
        });
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "워커 태스크 비정상 종료");
        }
    }
    info!(%local, "시뮬레이터 수신 종료");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DispatcherOptions;
    use crate::channel::StreamClient;
    use crate::scenario::{FnExecutor, HeaderMatcher, Scenario, ScenarioOutcome, ScenarioRequest};
    use std::time::Duration;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn each_connection_is_served_by_its_own_worker() {
        let mut dispatcher = ScenarioDispatcher::new(DispatcherOptions {
            receive_timeout: Duration::from_millis(200),
            ..DispatcherOptions::default()
        });
        dispatcher
            .register(Scenario::new(
                "Echo",
                HeaderMatcher::new().header("op", "echo"),
                FnExecutor::new(|request: &ScenarioRequest| {
                    ScenarioOutcome::response(request.payload())
                }),
            ))
            .expect("등록 실패");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("바인드 실패");
        let addr = listener.local_addr().expect("주소 조회 실패");
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve_tcp(
            listener,
            Arc::new(dispatcher),
            Transport::Http,
            cancel.clone(),
        ));

        let mut first = StreamClient::from_tcp(TcpStream::connect(addr).await.expect("연결 실패"));
        let mut second = StreamClient::from_tcp(TcpStream::connect(addr).await.expect("연결 실패"));
        let wait = Duration::from_secs(2);

        let a = first
            .call(ScenarioRequest::new("a").with_header("op", "echo"), wait)
            .await
            .expect("첫 번째 연결 호출 실패");
        let b = second
            .call(ScenarioRequest::new("b").with_header("op", "echo"), wait)
            .await
            .expect("두 번째 연결 호출 실패");
        let again = first
            .call(ScenarioRequest::new("c").with_header("op", "echo"), wait)
            .await
            .expect("재호출 실패");

        assert_eq!(a, ScenarioOutcome::response("a"));
        assert_eq!(b, ScenarioOutcome::response("b"));
        assert_eq!(again, ScenarioOutcome::response("c"));

        cancel.cancel();
        tokio::time::timeout(wait, server)
            .await
            .expect("취소 후 서버가 종료되어야 한다")
            .expect("서버 태스크 실패")
            .expect("서버 실패");
    }
}
