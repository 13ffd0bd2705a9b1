use crate::channel::Transport;
use crate::engine::{DefaultFault, DispatcherOptions, ScenarioDispatcher};
use crate::scenario::{HeaderMatcher, ResponseTemplate, Scenario, TemplateExecutor};
use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// 시뮬레이터 전체 설정이다.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    /// 시뮬레이터 표시 이름.
    pub name: String,
    /// 흉내 낼 전송 계층 종류.
    #[serde(default)]
    pub transport: Transport,
    /// TCP 수신 주소.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// 요청 대기 제한 시간(밀리초 단위).
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    /// 일치하는 시나리오가 없을 때 보낼 폴트.
    #[serde(default = "default_unmatched_fault")]
    pub unmatched_fault: DefaultFault,
    /// 시나리오 실행 실패 시 보낼 폴트.
    #[serde(default = "default_error_fault")]
    pub error_fault: DefaultFault,
    /// 등록 순서대로 평가되는 시나리오 목록.
    #[serde(default)]
    pub scenarios: Vec<ScenarioDefinition>,
}

/// YAML로 선언한 시나리오이다.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioDefinition {
    /// 고유 시나리오 이름.
    pub name: String,
    /// 요청 일치 조건. 생략하면 모든 요청과 일치한다.
    #[serde(default, rename = "match")]
    pub matcher: MatchRule,
    /// 응답 템플릿.
    pub respond: ResponseTemplate,
    /// 응답 지연(밀리초 단위).
    #[serde(default)]
    pub delay_ms: u64,
}

/// 선언형 요청 일치 조건이다.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchRule {
    /// 모두 같아야 하는 헤더 값.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// 페이로드에서 찾아야 하는 정규식.
    #[serde(default)]
    pub payload_pattern: Option<String>,
}

impl SimulatorConfig {
    /// 설정에서 디스패처 옵션을 구성한다.
    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            receive_timeout: Duration::from_millis(self.receive_timeout_ms.max(1)),
            unmatched_fault: self.unmatched_fault.clone(),
            error_fault: self.error_fault.clone(),
        }
    }

    /// 선언된 시나리오를 순서대로 등록한 디스패처를 생성한다.
    pub fn build_dispatcher(&self) -> anyhow::Result<ScenarioDispatcher> {
        let mut dispatcher = ScenarioDispatcher::new(self.dispatcher_options());
        for definition in &self.scenarios {
            let scenario = definition
                .to_scenario()
                .with_context(|| format!("시나리오 구성 실패: {}", definition.name))?;
            dispatcher.register(scenario)?;
        }
        Ok(dispatcher)
    }
}

impl ScenarioDefinition {
    /// 매처와 템플릿 실행기를 조합하여 시나리오를 생성한다.
    pub fn to_scenario(&self) -> anyhow::Result<Scenario> {
        let mut matcher = HeaderMatcher::new();
        for (key, value) in &self.matcher.headers {
            matcher = matcher.header(key, value);
        }
        if let Some(pattern) = &self.matcher.payload_pattern {
            matcher = matcher.payload_pattern(pattern)?;
        }
        let executor = TemplateExecutor::new(self.respond.clone())
            .with_delay(Duration::from_millis(self.delay_ms));
        Ok(Scenario::new(self.name.clone(), matcher, executor))
    }
}

fn default_listen() -> String {
    "127.0.0.1:8700".to_string()
}

fn default_receive_timeout_ms() -> u64 {
    30_000
}

fn default_unmatched_fault() -> DefaultFault {
    DispatcherOptions::default().unmatched_fault
}

fn default_error_fault() -> DefaultFault {
    DispatcherOptions::default().error_fault
}

/// YAML 파일을 읽어 SimulatorConfig로 역직렬화한다.
pub fn load_config_from_file(path: &Path) -> anyhow::Result<SimulatorConfig> {
    let mut file =
        File::open(path).with_context(|| format!("설정 파일 열기 실패: {}", path.display()))?;
    load_config_from_reader(&mut file)
}

/// Reader에서 YAML을 읽어 SimulatorConfig로 파싱한다.
pub fn load_config_from_reader<R: Read>(reader: &mut R) -> anyhow::Result<SimulatorConfig> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    let config: SimulatorConfig = serde_yaml::from_str(&buf)?;
    Ok(config)
}
