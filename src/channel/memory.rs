use super::{Channel, Transport};
use crate::engine::SimulatorError;
use crate::scenario::{ScenarioOutcome, ScenarioRequest};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// 요청과 응답 회신 채널의 묶음이다.
type Envelope = (ScenarioRequest, oneshot::Sender<ScenarioOutcome>);

/// 응답을 기다리는 요청 정보이다.
#[derive(Debug)]
struct PendingReply {
    /// 요청 상관 키.
    correlation_id: String,
    /// 결과를 돌려보낼 회신 채널.
    reply: oneshot::Sender<ScenarioOutcome>,
}

/// 프로세스 내부 채널의 서버 측 끝이다.
#[derive(Debug)]
pub struct InProcessChannel {
    transport: Transport,
    inbound: mpsc::Receiver<Envelope>,
    pending: Option<PendingReply>,
}

/// 프로세스 내부 채널의 클라이언트 측 끝이다. 여러 태스크에서 복제하여 사용할 수 있다.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    transport: Transport,
    outbound: mpsc::Sender<Envelope>,
}

/// 서버/클라이언트 한 쌍의 프로세스 내부 채널을 생성한다.
///
/// # 매개변수
/// - `transport`: 로그에 표시할 전송 계층 종류.
/// - `capacity`: 수신 대기열 크기. 0이면 1로 보정한다.
pub fn in_process_channel(transport: Transport, capacity: usize) -> (InProcessChannel, ChannelClient) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        InProcessChannel {
            transport,
            inbound: rx,
            pending: None,
        },
        ChannelClient {
            transport,
            outbound: tx,
        },
    )
}

#[async_trait]
impl Channel for InProcessChannel {
    fn transport(&self) -> Transport {
        self.transport
    }

    fn pending(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.correlation_id.as_str())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<ScenarioRequest, SimulatorError> {
        if let Some(stale) = self.pending.take() {
            warn!(
                correlation_id = %stale.correlation_id,
                "응답하지 않은 요청을 폐기합니다"
            );
        }
        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Err(_) => Err(SimulatorError::Timeout(timeout)),
            Ok(None) => Err(SimulatorError::ChannelClosed),
            Ok(Some((request, reply))) => {
                self.pending = Some(PendingReply {
                    correlation_id: request.correlation_id().to_string(),
                    reply,
                });
                Ok(request)
            }
        }
    }

    async fn send(&mut self, outcome: ScenarioOutcome) -> Result<(), SimulatorError> {
        let pending = self.pending.take().ok_or(SimulatorError::NoPendingRequest)?;
        pending
            .reply
            .send(outcome)
            .map_err(|_| SimulatorError::ChannelClosed)
    }
}

impl ChannelClient {
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// 요청을 보내고 상관된 결과가 올 때까지 최대 `timeout` 동안 기다린다.
    pub async fn call(
        &self,
        request: ScenarioRequest,
        timeout: Duration,
    ) -> Result<ScenarioOutcome, SimulatorError> {
        let (tx, rx) = oneshot::channel();
        let exchange = async {
            self.outbound
                .send((request, tx))
                .await
                .map_err(|_| SimulatorError::ChannelClosed)?;
            rx.await.map_err(|_| SimulatorError::ChannelClosed)
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| SimulatorError::Timeout(timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outcome_is_delivered_to_the_pending_caller() {
        let (mut channel, client) = in_process_channel(Transport::InProcess, 4);
        let caller = tokio::spawn(async move {
            client
                .call(
                    ScenarioRequest::new("ping").with_correlation_id("c-1"),
                    Duration::from_secs(1),
                )
                .await
        });

        let request = channel
            .receive(Duration::from_secs(1))
            .await
            .expect("요청 수신 실패");
        assert_eq!(channel.pending(), Some("c-1"));
        channel
            .send(ScenarioOutcome::response("pong"))
            .await
            .expect("응답 전송 실패");
        assert_eq!(channel.pending(), None);
        assert_eq!(request.payload(), "ping");

        let outcome = caller.await.expect("태스크 실패").expect("호출 실패");
        assert_eq!(outcome, ScenarioOutcome::response("pong"));
    }

    #[tokio::test]
    async fn send_without_pending_request_is_rejected() {
        let (mut channel, _client) = in_process_channel(Transport::Http, 1);
        let err = channel
            .send(ScenarioOutcome::response("orphan"))
            .await
            .expect_err("대기 요청 없이 전송되면 안 된다");
        assert!(matches!(err, SimulatorError::NoPendingRequest));
    }

    #[tokio::test]
    async fn receive_reports_closed_when_all_clients_are_dropped() {
        let (mut channel, client) = in_process_channel(Transport::Http, 1);
        drop(client);
        let err = channel
            .receive(Duration::from_secs(1))
            .await
            .expect_err("닫힌 채널에서 수신되면 안 된다");
        assert!(matches!(err, SimulatorError::ChannelClosed));
    }

    #[tokio::test]
    async fn send_after_caller_gave_up_reports_closed() {
        let (mut channel, client) = in_process_channel(Transport::Soap, 1);
        let caller = tokio::spawn(async move {
            client
                .call(ScenarioRequest::new("slow"), Duration::from_millis(10))
                .await
        });
        channel
            .receive(Duration::from_secs(1))
            .await
            .expect("요청 수신 실패");
        let timed_out = caller.await.expect("태스크 실패");
        assert!(matches!(timed_out, Err(SimulatorError::Timeout(_))));

        let err = channel
            .send(ScenarioOutcome::response("late"))
            .await
            .expect_err("포기한 호출자에게 전송되면 안 된다");
        assert!(matches!(err, SimulatorError::ChannelClosed));
    }
}
