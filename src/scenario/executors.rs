use super::{Executor, RequestVariables, ScenarioOutcome, ScenarioRequest};
use crate::engine::ScenarioContext;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;

/// 동기 함수로 결과를 계산하여 전송하는 실행기이다.
pub struct FnExecutor<F> {
    handler: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&ScenarioRequest) -> ScenarioOutcome + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> Executor for FnExecutor<F>
where
    F: Fn(&ScenarioRequest) -> ScenarioOutcome + Send + Sync,
{
    async fn execute(
        &self,
        request: &ScenarioRequest,
        ctx: &mut ScenarioContext<'_>,
    ) -> anyhow::Result<()> {
        let outcome = (self.handler)(request);
        ctx.send_outcome(outcome).await?;
        Ok(())
    }
}

/// 선언형 시나리오의 응답 템플릿이다.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseTemplate {
    /// 정상 응답 템플릿.
    Response {
        /// 본문 템플릿.
        #[serde(default)]
        payload: String,
        /// 헤더 값 템플릿.
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    /// 폴트 응답 템플릿.
    Fault {
        /// 폴트 코드.
        code: u16,
        /// 상세 메시지 템플릿.
        #[serde(default)]
        detail: String,
    },
}

/// 요청 변수로 템플릿을 치환하여 응답하는 실행기이다.
#[derive(Debug, Clone)]
pub struct TemplateExecutor {
    /// 응답 템플릿.
    template: ResponseTemplate,
    /// 응답 전 대기 시간.
    delay: Duration,
}

impl TemplateExecutor {
    pub fn new(template: ResponseTemplate) -> Self {
        Self {
            template,
            delay: Duration::ZERO,
        }
    }

    /// 응답 지연을 설정한다.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Executor for TemplateExecutor {
    async fn execute(
        &self,
        request: &ScenarioRequest,
        ctx: &mut ScenarioContext<'_>,
    ) -> anyhow::Result<()> {
        let vars = RequestVariables::from_request(request);
        let outcome = match &self.template {
            ResponseTemplate::Response { payload, headers } => {
                let payload = vars.expand_required(payload, "respond.payload")?;
                let mut expanded = BTreeMap::new();
                for (key, value) in headers {
                    expanded.insert(key.clone(), vars.expand_required(value, "respond.headers")?);
                }
                ScenarioOutcome::Response {
                    payload,
                    headers: expanded,
                }
            }
            ResponseTemplate::Fault { code, detail } => {
                ScenarioOutcome::fault(*code, vars.expand_required(detail, "respond.detail")?)
            }
        };
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        ctx.send_outcome(outcome).await?;
        Ok(())
    }
}
