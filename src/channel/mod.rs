use crate::engine::SimulatorError;
use crate::scenario::{ScenarioOutcome, ScenarioRequest};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

mod memory;
mod stream;

pub use memory::{ChannelClient, InProcessChannel, in_process_channel};
pub use stream::{MALFORMED_REQUEST_CODE, StreamChannel, StreamClient, TcpChannel};

/// 채널이 흉내 내는 전송 계층 종류이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// HTTP 엔드포인트.
    #[default]
    Http,
    /// SOAP 엔드포인트.
    Soap,
    /// 프로세스 내부 테스트 채널.
    InProcess,
}

impl Transport {
    /// 로그에 사용할 전송 계층 이름이다.
    pub fn label(&self) -> &'static str {
        match self {
            Transport::Http => "HTTP",
            Transport::Soap => "SOAP",
            Transport::InProcess => "in-process",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 요청 수신과 결과 전송을 담당하는 양방향 채널이다.
///
/// 한 번에 하나의 요청만 응답 대기 상태가 될 수 있으며 `send`는 그 요청에 대한
/// 결과만 전달한다. 채널은 요청/응답 한 주기 동안 하나의 워커가 독점한다.
#[async_trait]
pub trait Channel: Send {
    /// 채널의 전송 계층 종류를 반환한다.
    fn transport(&self) -> Transport;

    /// 응답 대기 중인 요청의 상관 키를 반환한다.
    fn pending(&self) -> Option<&str>;

    /// 요청이 도착할 때까지 최대 `timeout` 동안 기다린다.
    ///
    /// 이전 요청이 응답 없이 남아 있으면 폐기된다.
    async fn receive(&mut self, timeout: Duration) -> Result<ScenarioRequest, SimulatorError>;

    /// 대기 중인 요청에 결과를 전송한다.
    async fn send(&mut self, outcome: ScenarioOutcome) -> Result<(), SimulatorError>;
}
