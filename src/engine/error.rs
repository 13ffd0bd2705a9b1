use std::time::Duration;

/// 시나리오 디스패치 중 발생 가능한 오류를 표현한다.
///
/// 등록 오류를 제외한 모든 오류는 하나의 요청/응답 주기에만 영향을 준다.
#[derive(Debug, thiserror::Error)]
pub enum SimulatorError {
    /// 같은 이름의 시나리오가 이미 등록된 경우이다.
    #[error("이미 등록된 시나리오 이름입니다: {0}")]
    DuplicateScenario(String),
    /// 요청과 일치하는 시나리오가 없는 경우이다.
    #[error("요청과 일치하는 시나리오가 없습니다: {correlation_id}")]
    NoMatch { correlation_id: String },
    /// 요청 대기 시간이 초과된 경우이다.
    #[error("요청 대기 시간이 초과되었습니다: {0:?}")]
    Timeout(Duration),
    /// 채널에 더 이상 쓰거나 읽을 수 없는 경우이다.
    #[error("채널이 닫혀 더 이상 사용할 수 없습니다.")]
    ChannelClosed,
    /// 응답을 기다리는 요청 없이 결과를 보내려 한 경우이다.
    #[error("응답을 기다리는 요청이 없습니다.")]
    NoPendingRequest,
    /// 한 주기에서 결과를 두 번 보내려 한 경우이다.
    #[error("이미 결과를 전송한 요청입니다: {correlation_id}")]
    OutcomeAlreadySent { correlation_id: String },
    /// 실행기가 결과를 보내지 않고 끝난 경우이다.
    #[error("시나리오 '{scenario}'가 결과를 전송하지 않고 종료되었습니다.")]
    MissingOutcome { scenario: String },
    /// 실행기가 오류를 반환한 경우이다.
    #[error("시나리오 '{scenario}' 실행 실패: {message}")]
    ScenarioFailed { scenario: String, message: String },
    /// 채널 메시지를 해석하지 못한 경우이다.
    #[error("메시지 해석 실패: {0}")]
    Decode(String),
    /// 채널 입출력 오류이다.
    #[error("채널 입출력 오류: {0}")]
    Io(#[from] std::io::Error),
}
