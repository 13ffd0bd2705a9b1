use super::error::SimulatorError;
use super::events::DispatchEvent;
use crate::channel::{Channel, Transport};
use crate::scenario::{ScenarioOutcome, ScenarioRequest};
use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// 실행 중인 시나리오가 채널로 결과를 돌려보내기 위한 컨텍스트이다.
///
/// 한 요청/응답 주기 동안 채널을 독점하며 결과는 한 번만 보낼 수 있다.
pub struct ScenarioContext<'a> {
    /// 현재 주기의 채널.
    channel: &'a mut dyn Channel,
    /// 처리 중인 요청의 상관 키.
    correlation_id: String,
    /// 선택된 시나리오 이름.
    scenario: String,
    /// 전송한 결과.
    outcome: Option<ScenarioOutcome>,
    /// 이벤트 송신자.
    events: Option<&'a UnboundedSender<DispatchEvent>>,
}

impl<'a> ScenarioContext<'a> {
    pub(crate) fn new(
        channel: &'a mut dyn Channel,
        request: &ScenarioRequest,
        scenario: &str,
        events: Option<&'a UnboundedSender<DispatchEvent>>,
    ) -> Self {
        Self {
            channel,
            correlation_id: request.correlation_id().to_string(),
            scenario: scenario.to_string(),
            outcome: None,
            events,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario
    }

    pub fn transport(&self) -> Transport {
        self.channel.transport()
    }

    /// 이미 결과를 전송했는지 여부이다.
    pub fn has_responded(&self) -> bool {
        self.outcome.is_some()
    }

    /// 정상 응답을 채널로 전송한다.
    pub async fn send_scenario_response(
        &mut self,
        payload: impl Into<String>,
        headers: BTreeMap<String, String>,
    ) -> Result<(), SimulatorError> {
        self.send_outcome(ScenarioOutcome::Response {
            payload: payload.into(),
            headers,
        })
        .await
    }

    /// 폴트 응답을 채널로 전송한다.
    pub async fn send_scenario_fault(
        &mut self,
        code: u16,
        detail: impl Into<String>,
    ) -> Result<(), SimulatorError> {
        self.send_outcome(ScenarioOutcome::fault(code, detail)).await
    }

    /// 결과를 채널로 전송하고 기록한다.
    pub async fn send_outcome(&mut self, outcome: ScenarioOutcome) -> Result<(), SimulatorError> {
        if self.outcome.is_some() {
            return Err(SimulatorError::OutcomeAlreadySent {
                correlation_id: self.correlation_id.clone(),
            });
        }
        deliver(
            &mut *self.channel,
            &self.correlation_id,
            Some(&self.scenario),
            outcome.clone(),
            self.events,
        )
        .await?;
        self.outcome = Some(outcome);
        Ok(())
    }

    pub(crate) fn into_outcome(self) -> Option<ScenarioOutcome> {
        self.outcome
    }
}

/// 대기 중인 요청이 `correlation_id`와 같을 때만 결과를 전송한다.
pub(crate) async fn deliver(
    channel: &mut dyn Channel,
    correlation_id: &str,
    scenario: Option<&str>,
    outcome: ScenarioOutcome,
    events: Option<&UnboundedSender<DispatchEvent>>,
) -> Result<(), SimulatorError> {
    if channel.pending() != Some(correlation_id) {
        return Err(SimulatorError::NoPendingRequest);
    }
    let transport = channel.transport();
    let fault = outcome.is_fault();
    channel.send(outcome).await?;
    let kind = if fault { "폴트" } else { "응답" };
    info!(
        %transport,
        correlation_id,
        scenario = scenario.unwrap_or("-"),
        "{transport} {kind} 전송"
    );
    if let Some(sender) = events {
        let _ = sender.send(DispatchEvent::OutcomeSent {
            correlation_id: correlation_id.to_string(),
            scenario: scenario.map(str::to_string),
            fault,
        });
    }
    Ok(())
}
