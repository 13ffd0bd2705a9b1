use crate::channel::Transport;

/// 디스패처에서 관찰자에게 전달되는 주요 이벤트 모델이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// 요청 수신 알림.
    RequestReceived {
        transport: Transport,
        correlation_id: String,
    },
    /// 시나리오 선택 알림.
    ScenarioSelected {
        correlation_id: String,
        scenario: String,
    },
    /// 결과 전송 알림. 디스패처가 직접 보낸 결과는 `scenario`가 없다.
    OutcomeSent {
        correlation_id: String,
        scenario: Option<String>,
        fault: bool,
    },
    /// 일치하는 시나리오가 없는 요청.
    Unmatched { correlation_id: String },
    /// 주기 실패. 수신 단계에서 실패하면 `correlation_id`가 없다.
    CycleFailed {
        correlation_id: Option<String>,
        reason: String,
    },
}
