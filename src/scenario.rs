use crate::engine::ScenarioContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

mod executors;
mod matchers;
mod template;

pub use executors::{FnExecutor, ResponseTemplate, TemplateExecutor};
pub use matchers::{AnyRequest, HeaderMatcher};
pub use template::RequestVariables;

/// 채널로 수신된 시나리오 요청을 표현한다.
///
/// 필드는 모두 비공개이며 수신 이후에는 값을 바꿀 수 없다. `with_*` 빌더는
/// 요청을 채널에 넘기기 전 송신 측에서만 사용한다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioRequest {
    /// 요청과 응답을 연결하는 상관 키이다.
    #[serde(default = "new_correlation_id")]
    correlation_id: String,
    /// 헤더 또는 속성 맵이다.
    #[serde(default)]
    headers: BTreeMap<String, String>,
    /// 해석하지 않는 원문 페이로드이다.
    #[serde(default)]
    payload: String,
}

impl ScenarioRequest {
    /// 새 상관 키를 발급하여 요청을 생성한다.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            correlation_id: new_correlation_id(),
            headers: BTreeMap::new(),
            payload: payload.into(),
        }
    }

    /// 헤더 하나를 추가한 요청을 반환한다.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// 상관 키를 지정한 요청을 반환한다.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// 헤더 값을 조회한다.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|s| s.as_str())
    }
}

fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 시나리오 실행 결과로 채널에 전송되는 응답 또는 폴트이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    /// 정상 응답.
    Response {
        /// 응답 본문.
        payload: String,
        /// 응답 헤더.
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    /// 폴트 응답.
    Fault {
        /// 폴트 코드.
        code: u16,
        /// 폴트 상세 메시지.
        detail: String,
    },
}

impl ScenarioOutcome {
    /// 헤더 없는 정상 응답을 생성한다.
    pub fn response(payload: impl Into<String>) -> Self {
        ScenarioOutcome::Response {
            payload: payload.into(),
            headers: BTreeMap::new(),
        }
    }

    /// 폴트 응답을 생성한다.
    pub fn fault(code: u16, detail: impl Into<String>) -> Self {
        ScenarioOutcome::Fault {
            code,
            detail: detail.into(),
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, ScenarioOutcome::Fault { .. })
    }
}

/// 요청이 시나리오에 해당하는지 판정한다.
pub trait Matcher: Send + Sync {
    /// 요청이 일치하면 `true`를 반환한다. 부수 효과가 없어야 한다.
    fn matches(&self, request: &ScenarioRequest) -> bool;
}

impl<F> Matcher for F
where
    F: Fn(&ScenarioRequest) -> bool + Send + Sync,
{
    fn matches(&self, request: &ScenarioRequest) -> bool {
        self(request)
    }
}

/// 선택된 시나리오의 실행 로직을 정의한다.
///
/// 구현체는 `ctx.send_scenario_response` 또는 `ctx.send_scenario_fault`를 정확히
/// 한 번 호출하여 채널로 결과를 돌려보내야 한다.
#[async_trait]
pub trait Executor: Send + Sync {
    /// 요청을 처리하고 컨텍스트를 통해 결과를 전송한다.
    async fn execute(
        &self,
        request: &ScenarioRequest,
        ctx: &mut ScenarioContext<'_>,
    ) -> anyhow::Result<()>;
}

/// 이름, 매처, 실행기로 구성된 시나리오이다.
#[derive(Clone)]
pub struct Scenario {
    /// 레지스트리 내 고유 이름.
    name: String,
    /// 요청 일치 판정기.
    matcher: Arc<dyn Matcher>,
    /// 응답 생성기.
    executor: Arc<dyn Executor>,
}

impl Scenario {
    /// 매처와 실행기를 조합하여 시나리오를 생성한다.
    pub fn new(
        name: impl Into<String>,
        matcher: impl Matcher + 'static,
        executor: impl Executor + 'static,
    ) -> Self {
        Self::from_parts(name, Arc::new(matcher), Arc::new(executor))
    }

    /// 이미 공유 중인 매처와 실행기로 시나리오를 생성한다.
    pub fn from_parts(
        name: impl Into<String>,
        matcher: Arc<dyn Matcher>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            name: name.into(),
            matcher,
            executor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, request: &ScenarioRequest) -> bool {
        self.matcher.matches(request)
    }

    /// 실행기를 호출한다.
    pub async fn execute(
        &self,
        request: &ScenarioRequest,
        ctx: &mut ScenarioContext<'_>,
    ) -> anyhow::Result<()> {
        self.executor.execute(request, ctx).await
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario").field("name", &self.name).finish()
    }
}
