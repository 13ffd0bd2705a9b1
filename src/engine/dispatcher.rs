use super::context::{ScenarioContext, deliver};
use super::error::SimulatorError;
use super::events::DispatchEvent;
use super::registry::ScenarioRegistry;
use crate::channel::Channel;
use crate::scenario::{Scenario, ScenarioOutcome, ScenarioRequest};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 디스패처가 직접 보내는 폴트 응답 설정이다.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DefaultFault {
    /// 폴트 코드.
    pub code: u16,
    /// 폴트 상세 메시지.
    #[serde(default)]
    pub detail: String,
}

impl DefaultFault {
    pub fn new(code: u16, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

/// 디스패처 동작 옵션이다.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// `serve` 루프에서 요청 하나를 기다리는 최대 시간.
    pub receive_timeout: Duration,
    /// `run_cycle`/`serve`에서 일치하는 시나리오가 없을 때 보낼 폴트.
    pub unmatched_fault: DefaultFault,
    /// 시나리오가 실패하거나 결과 없이 끝났을 때 보낼 폴트.
    pub error_fault: DefaultFault,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(30),
            unmatched_fault: DefaultFault::new(404, "일치하는 시나리오가 없습니다."),
            error_fault: DefaultFault::new(500, "시나리오 실행에 실패했습니다."),
        }
    }
}

/// `serve` 루프 종료 시 반환되는 처리 통계이다.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeSummary {
    /// 결과를 전송한 주기 수.
    pub completed: u64,
    /// 실패한 주기 수.
    pub failed: u64,
    /// 요청 없이 대기 시간이 끝난 횟수.
    pub idle_timeouts: u64,
}

/// 시나리오 레지스트리를 소유하고 요청/응답 주기를 수행한다.
///
/// 등록은 `&mut self`로만 가능하므로 `Arc`로 공유한 뒤에는 레지스트리가 읽기 전용이 된다.
#[derive(Debug, Default)]
pub struct ScenarioDispatcher {
    registry: ScenarioRegistry,
    options: DispatcherOptions,
    events: Option<UnboundedSender<DispatchEvent>>,
}

impl ScenarioDispatcher {
    pub fn new(options: DispatcherOptions) -> Self {
        Self {
            registry: ScenarioRegistry::new(),
            options,
            events: None,
        }
    }

    /// 이벤트 송신자를 연결한다.
    pub fn with_events(mut self, sender: UnboundedSender<DispatchEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// 시나리오를 선택 대상에 추가한다.
    pub fn register(&mut self, scenario: Scenario) -> Result<(), SimulatorError> {
        let name = scenario.name().to_string();
        self.registry.register(scenario)?;
        debug!(scenario = %name, "시나리오 등록");
        Ok(())
    }

    pub fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    /// 요청이 도착할 때까지 최대 `timeout` 동안 기다린다.
    pub async fn receive_scenario_request(
        &self,
        channel: &mut dyn Channel,
        timeout: Duration,
    ) -> Result<ScenarioRequest, SimulatorError> {
        let transport = channel.transport();
        let request = channel.receive(timeout).await?;
        info!(
            %transport,
            correlation_id = %request.correlation_id(),
            "{transport} 요청 수신"
        );
        self.emit(DispatchEvent::RequestReceived {
            transport,
            correlation_id: request.correlation_id().to_string(),
        });
        Ok(request)
    }

    /// 등록 순서대로 평가하여 처음 일치한 시나리오를 반환한다.
    pub fn select_scenario(&self, request: &ScenarioRequest) -> Result<&Scenario, SimulatorError> {
        self.registry
            .select(request)
            .ok_or_else(|| SimulatorError::NoMatch {
                correlation_id: request.correlation_id().to_string(),
            })
    }

    /// 선택된 시나리오를 실행하고 전송된 결과를 반환한다.
    ///
    /// 시나리오가 실패하거나 결과 없이 끝나면 `error_fault`를 대신 전송한 뒤 실패를 반환한다.
    pub async fn dispatch(
        &self,
        channel: &mut dyn Channel,
        request: &ScenarioRequest,
    ) -> Result<ScenarioOutcome, SimulatorError> {
        let scenario = match self.select_scenario(request) {
            Ok(scenario) => scenario,
            Err(err) => {
                warn!(correlation_id = %request.correlation_id(), "일치하는 시나리오 없음");
                self.emit(DispatchEvent::Unmatched {
                    correlation_id: request.correlation_id().to_string(),
                });
                return Err(err);
            }
        };
        debug!(
            correlation_id = %request.correlation_id(),
            scenario = %scenario.name(),
            "시나리오 선택"
        );
        self.emit(DispatchEvent::ScenarioSelected {
            correlation_id: request.correlation_id().to_string(),
            scenario: scenario.name().to_string(),
        });

        let mut ctx = ScenarioContext::new(
            &mut *channel,
            request,
            scenario.name(),
            self.events.as_ref(),
        );
        let result = scenario.execute(request, &mut ctx).await;
        let outcome = ctx.into_outcome();

        match (result, outcome) {
            (Ok(()), Some(outcome)) => Ok(outcome),
            (Err(err), Some(outcome)) => {
                warn!(
                    scenario = %scenario.name(),
                    error = %format!("{err:#}"),
                    "결과 전송 이후 시나리오 오류 발생"
                );
                Ok(outcome)
            }
            (Err(err), None) => {
                if let Some(SimulatorError::ChannelClosed) = err.downcast_ref::<SimulatorError>() {
                    return Err(SimulatorError::ChannelClosed);
                }
                let failure = SimulatorError::ScenarioFailed {
                    scenario: scenario.name().to_string(),
                    message: format!("{err:#}"),
                };
                self.answer_failure(channel, request, failure).await
            }
            (Ok(()), None) => {
                let failure = SimulatorError::MissingOutcome {
                    scenario: scenario.name().to_string(),
                };
                self.answer_failure(channel, request, failure).await
            }
        }
    }

    /// 대기 중인 요청에 정상 응답을 전송한다.
    pub async fn send_scenario_response(
        &self,
        channel: &mut dyn Channel,
        payload: impl Into<String>,
        headers: BTreeMap<String, String>,
    ) -> Result<(), SimulatorError> {
        let outcome = ScenarioOutcome::Response {
            payload: payload.into(),
            headers,
        };
        self.send_direct(channel, outcome).await
    }

    /// 대기 중인 요청에 폴트 응답을 전송한다.
    pub async fn send_scenario_fault(
        &self,
        channel: &mut dyn Channel,
        code: u16,
        detail: impl Into<String>,
    ) -> Result<(), SimulatorError> {
        self.send_direct(channel, ScenarioOutcome::fault(code, detail))
            .await
    }

    /// 요청 하나를 수신하여 처리한다.
    ///
    /// 일치하는 시나리오가 없으면 `unmatched_fault`로 응답한다.
    pub async fn run_cycle(
        &self,
        channel: &mut dyn Channel,
    ) -> Result<ScenarioOutcome, SimulatorError> {
        let request = self
            .receive_scenario_request(channel, self.options.receive_timeout)
            .await?;
        self.complete_cycle(channel, &request).await
    }

    /// 취소되거나 채널이 닫힐 때까지 주기를 반복한다.
    ///
    /// 취소는 요청을 기다리는 동안에만 반영되며 진행 중인 주기는 끝까지 수행한다.
    pub async fn serve(&self, channel: &mut dyn Channel, cancel: CancellationToken) -> ServeSummary {
        let mut summary = ServeSummary::default();
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.receive_scenario_request(&mut *channel, self.options.receive_timeout) => received,
            };
            let request = match received {
                Ok(request) => request,
                Err(SimulatorError::Timeout(_)) => {
                    summary.idle_timeouts += 1;
                    continue;
                }
                Err(SimulatorError::ChannelClosed) => {
                    info!(transport = %channel.transport(), "채널이 닫혀 워커를 종료합니다");
                    break;
                }
                Err(err) => {
                    summary.failed += 1;
                    warn!(error = %err, "요청 수신 실패");
                    self.emit(DispatchEvent::CycleFailed {
                        correlation_id: None,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            match self.complete_cycle(&mut *channel, &request).await {
                Ok(_) => summary.completed += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(
                        correlation_id = %request.correlation_id(),
                        error = %err,
                        "요청 처리 실패"
                    );
                    self.emit(DispatchEvent::CycleFailed {
                        correlation_id: Some(request.correlation_id().to_string()),
                        reason: err.to_string(),
                    });
                }
            }
        }
        summary
    }

    async fn complete_cycle(
        &self,
        channel: &mut dyn Channel,
        request: &ScenarioRequest,
    ) -> Result<ScenarioOutcome, SimulatorError> {
        match self.dispatch(&mut *channel, request).await {
            Err(SimulatorError::NoMatch { correlation_id }) => {
                let fault = &self.options.unmatched_fault;
                let outcome = ScenarioOutcome::fault(fault.code, fault.detail.clone());
                deliver(
                    channel,
                    &correlation_id,
                    None,
                    outcome.clone(),
                    self.events.as_ref(),
                )
                .await?;
                Ok(outcome)
            }
            other => other,
        }
    }

    /// 시나리오 실패 시 `error_fault`로 응답하고 실패를 반환한다.
    async fn answer_failure(
        &self,
        channel: &mut dyn Channel,
        request: &ScenarioRequest,
        failure: SimulatorError,
    ) -> Result<ScenarioOutcome, SimulatorError> {
        warn!(correlation_id = %request.correlation_id(), error = %failure, "시나리오 실행 실패");
        let fault = &self.options.error_fault;
        let outcome = ScenarioOutcome::fault(fault.code, fault.detail.clone());
        deliver(
            channel,
            request.correlation_id(),
            None,
            outcome,
            self.events.as_ref(),
        )
        .await?;
        Err(failure)
    }

    async fn send_direct(
        &self,
        channel: &mut dyn Channel,
        outcome: ScenarioOutcome,
    ) -> Result<(), SimulatorError> {
        let correlation_id = channel
            .pending()
            .ok_or(SimulatorError::NoPendingRequest)?
            .to_string();
        deliver(channel, &correlation_id, None, outcome, self.events.as_ref()).await
    }

    fn emit(&self, event: DispatchEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}
