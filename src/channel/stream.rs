use super::{Channel, Transport};
use crate::engine::SimulatorError;
use crate::scenario::{ScenarioOutcome, ScenarioRequest};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::warn;

/// 한 줄 메시지의 최대 길이이다.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// 해석할 수 없는 요청 줄에 돌려보내는 폴트 코드이다.
pub const MALFORMED_REQUEST_CODE: u16 = 400;

/// 결과 한 줄의 직렬화 형식이다.
#[derive(Debug, Serialize, Deserialize)]
struct OutcomeFrame {
    correlation_id: String,
    #[serde(flatten)]
    outcome: ScenarioOutcome,
}

/// JSON-lines 형식으로 요청을 읽고 결과를 쓰는 스트림 채널이다.
///
/// 요청 한 줄을 읽으면 같은 `correlation_id`를 가진 결과 한 줄을 돌려보낸다.
pub struct StreamChannel<R, W> {
    transport: Transport,
    reader: FramedRead<R, LinesCodec>,
    writer: FramedWrite<W, LinesCodec>,
    pending: Option<String>,
}

/// TCP 연결 위의 스트림 채널이다.
pub type TcpChannel = StreamChannel<OwnedReadHalf, OwnedWriteHalf>;

impl<R, W> StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(transport: Transport, reader: R, writer: W) -> Self {
        Self {
            transport,
            reader: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
            writer: FramedWrite::new(writer, LinesCodec::new()),
            pending: None,
        }
    }
}

impl TcpChannel {
    /// 수락한 TCP 연결로 채널을 구성한다.
    pub fn from_tcp(transport: Transport, stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(transport, reader, writer)
    }
}

#[async_trait]
impl<R, W> Channel for StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn transport(&self) -> Transport {
        self.transport
    }

    fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    async fn receive(&mut self, timeout: Duration) -> Result<ScenarioRequest, SimulatorError> {
        if let Some(stale) = self.pending.take() {
            warn!(correlation_id = %stale, "응답하지 않은 요청을 폐기합니다");
        }
        let reader = &mut self.reader;
        let next_line = async {
            loop {
                match reader.next().await {
                    None => return Err(SimulatorError::ChannelClosed),
                    Some(Err(err)) => return Err(codec_error(err)),
                    Some(Ok(line)) if line.trim().is_empty() => continue,
                    Some(Ok(line)) => return Ok(line),
                }
            }
        };
        let line = match tokio::time::timeout(timeout, next_line).await {
            Err(_) => return Err(SimulatorError::Timeout(timeout)),
            Ok(Err(SimulatorError::Decode(detail))) => return Err(self.reject(detail).await),
            Ok(Err(err)) => return Err(err),
            Ok(Ok(line)) => line,
        };
        match serde_json::from_str::<ScenarioRequest>(&line) {
            Ok(request) => {
                self.pending = Some(request.correlation_id().to_string());
                Ok(request)
            }
            Err(err) => Err(self.reject(err.to_string()).await),
        }
    }

    async fn send(&mut self, outcome: ScenarioOutcome) -> Result<(), SimulatorError> {
        let correlation_id = self.pending.take().ok_or(SimulatorError::NoPendingRequest)?;
        let frame = OutcomeFrame {
            correlation_id,
            outcome,
        };
        let line =
            serde_json::to_string(&frame).map_err(|err| SimulatorError::Decode(err.to_string()))?;
        self.writer
            .send(line)
            .await
            .map_err(|_| SimulatorError::ChannelClosed)
    }
}

impl<R, W> StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// 해석할 수 없는 요청 줄에 빈 상관 키의 폴트 줄로 응답한다.
    async fn reject(&mut self, detail: String) -> SimulatorError {
        let frame = OutcomeFrame {
            correlation_id: String::new(),
            outcome: ScenarioOutcome::fault(MALFORMED_REQUEST_CODE, detail.clone()),
        };
        match serde_json::to_string(&frame) {
            Ok(line) => {
                if let Err(err) = self.writer.send(line).await {
                    warn!(error = %err, "잘못된 요청에 대한 폴트 전송 실패");
                }
            }
            Err(err) => warn!(error = %err, "폴트 직렬화 실패"),
        }
        SimulatorError::Decode(detail)
    }
}

/// 스트림 채널에 요청을 보내는 클라이언트이다.
pub struct StreamClient<R, W> {
    reader: FramedRead<R, LinesCodec>,
    writer: FramedWrite<W, LinesCodec>,
}

impl<R, W> StreamClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
            writer: FramedWrite::new(writer, LinesCodec::new()),
        }
    }

    /// 요청 한 줄을 쓰고 같은 상관 키의 결과가 올 때까지 기다린다.
    pub async fn call(
        &mut self,
        request: ScenarioRequest,
        timeout: Duration,
    ) -> Result<ScenarioOutcome, SimulatorError> {
        let expected = request.correlation_id().to_string();
        let line = serde_json::to_string(&request)
            .map_err(|err| SimulatorError::Decode(err.to_string()))?;
        let exchange = async {
            self.writer
                .send(line)
                .await
                .map_err(|_| SimulatorError::ChannelClosed)?;
            loop {
                let line = match self.reader.next().await {
                    None => return Err(SimulatorError::ChannelClosed),
                    Some(Err(err)) => return Err(codec_error(err)),
                    Some(Ok(line)) => line,
                };
                if line.trim().is_empty() {
                    continue;
                }
                let frame: OutcomeFrame = serde_json::from_str(&line)
                    .map_err(|err| SimulatorError::Decode(err.to_string()))?;
                if frame.correlation_id != expected {
                    return Err(SimulatorError::Decode(format!(
                        "상관 키가 다른 응답을 받았습니다: {} (기대값: {expected})",
                        frame.correlation_id
                    )));
                }
                return Ok(frame.outcome);
            }
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| SimulatorError::Timeout(timeout))?
    }
}

impl StreamClient<OwnedReadHalf, OwnedWriteHalf> {
    /// TCP 연결로 클라이언트를 구성한다.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer)
    }
}

fn codec_error(err: LinesCodecError) -> SimulatorError {
    match err {
        LinesCodecError::Io(io) => SimulatorError::Io(io),
        LinesCodecError::MaxLineLengthExceeded => {
            SimulatorError::Decode("한 줄 최대 길이를 초과했습니다.".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn reads_request_line_and_writes_correlated_outcome() {
        let (server_io, client_io) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_io);
        let (client_read, mut client_write) = tokio::io::split(client_io);
        let mut channel = StreamChannel::new(Transport::Soap, server_read, server_write);

        client_write
            .write_all(b"\n{\"correlation_id\":\"c-7\",\"headers\":{\"op\":\"echo\"},\"payload\":\"hi\"}\n")
            .await
            .expect("요청 쓰기 실패");

        let request = channel
            .receive(Duration::from_secs(1))
            .await
            .expect("요청 수신 실패");
        assert_eq!(request.correlation_id(), "c-7");
        assert_eq!(request.header("op"), Some("echo"));
        channel
            .send(ScenarioOutcome::fault(500, "boom"))
            .await
            .expect("결과 전송 실패");

        let mut lines = BufReader::new(client_read).lines();
        let line = lines
            .next_line()
            .await
            .expect("결과 읽기 실패")
            .expect("결과 줄이 없다");
        let value: serde_json::Value = serde_json::from_str(&line).expect("JSON 파싱 실패");
        assert_eq!(value["correlation_id"], "c-7");
        assert_eq!(value["kind"], "fault");
        assert_eq!(value["code"], 500);
        assert_eq!(value["detail"], "boom");
    }

    #[tokio::test]
    async fn malformed_line_is_a_decode_error() {
        let (server_io, client_io) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let (client_read, mut client_write) = tokio::io::split(client_io);
        let mut channel = StreamChannel::new(Transport::Http, server_read, server_write);

        client_write
            .write_all(b"not json\n")
            .await
            .expect("쓰기 실패");
        let err = channel
            .receive(Duration::from_secs(1))
            .await
            .expect_err("잘못된 줄은 거부되어야 한다");
        assert!(matches!(err, SimulatorError::Decode(_)));
        assert_eq!(channel.pending(), None);

        let mut lines = BufReader::new(client_read).lines();
        let line = lines
            .next_line()
            .await
            .expect("폴트 읽기 실패")
            .expect("폴트 줄이 없다");
        let value: serde_json::Value = serde_json::from_str(&line).expect("JSON 파싱 실패");
        assert_eq!(value["correlation_id"], "");
        assert_eq!(value["kind"], "fault");
        assert_eq!(value["code"], MALFORMED_REQUEST_CODE);
    }

    #[tokio::test]
    async fn unbounded_timeout_waits_for_the_next_line() {
        let (server_io, client_io) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let (_client_read, mut client_write) = tokio::io::split(client_io);
        let mut channel = StreamChannel::new(Transport::Http, server_read, server_write);

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            client_write
                .write_all(b"{\"correlation_id\":\"c-max\",\"payload\":\"late\"}\n")
                .await
                .expect("쓰기 실패");
            client_write
        });
        let request = channel
            .receive(Duration::MAX)
            .await
            .expect("요청 수신 실패");
        assert_eq!(request.correlation_id(), "c-max");
        assert_eq!(request.payload(), "late");
        writer.await.expect("태스크 실패");
    }

    #[tokio::test]
    async fn client_and_channel_exchange_over_duplex() {
        let (server_io, client_io) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_io);
        let (client_read, client_write) = tokio::io::split(client_io);
        let mut channel = StreamChannel::new(Transport::Http, server_read, server_write);
        let mut client = StreamClient::new(client_read, client_write);

        let server = tokio::spawn(async move {
            let request = channel.receive(Duration::from_secs(1)).await?;
            channel
                .send(ScenarioOutcome::response(request.payload().to_uppercase()))
                .await
        });

        let outcome = client
            .call(ScenarioRequest::new("hello"), Duration::from_secs(1))
            .await
            .expect("호출 실패");
        assert_eq!(outcome, ScenarioOutcome::response("HELLO"));
        server
            .await
            .expect("태스크 실패")
            .expect("서버 처리 실패");
    }

    #[tokio::test]
    async fn closed_peer_ends_the_channel() {
        let (server_io, client_io) = tokio::io::duplex(64);
        let (server_read, server_write) = tokio::io::split(server_io);
        let mut channel = StreamChannel::new(Transport::Http, server_read, server_write);
        drop(client_io);
        let err = channel
            .receive(Duration::from_secs(1))
            .await
            .expect_err("닫힌 연결에서 수신되면 안 된다");
        assert!(matches!(err, SimulatorError::ChannelClosed));
    }
}
