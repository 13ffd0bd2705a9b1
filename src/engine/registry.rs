use super::error::SimulatorError;
use crate::scenario::{Scenario, ScenarioRequest};

/// 등록 순서를 보존하는 시나리오 목록이다.
///
/// 선택은 등록 순서대로 `matches`를 평가하여 처음 일치한 시나리오를 고른다.
#[derive(Debug, Default, Clone)]
pub struct ScenarioRegistry {
    scenarios: Vec<Scenario>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 시나리오를 등록한다. 이름이 중복되면 오류를 반환한다.
    pub fn register(&mut self, scenario: Scenario) -> Result<(), SimulatorError> {
        if self.get(scenario.name()).is_some() {
            return Err(SimulatorError::DuplicateScenario(scenario.name().to_string()));
        }
        self.scenarios.push(scenario);
        Ok(())
    }

    /// 요청과 처음 일치하는 시나리오를 반환한다.
    pub fn select(&self, request: &ScenarioRequest) -> Option<&Scenario> {
        self.scenarios.iter().find(|scenario| scenario.matches(request))
    }

    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|scenario| scenario.name() == name)
    }

    /// 등록 순서대로 시나리오 이름을 반환한다.
    pub fn names(&self) -> Vec<&str> {
        self.scenarios.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{AnyRequest, FnExecutor, HeaderMatcher, ScenarioOutcome};

    fn fixed(name: &str, matcher: HeaderMatcher) -> Scenario {
        let reply = name.to_string();
        Scenario::new(
            name,
            matcher,
            FnExecutor::new(move |_: &ScenarioRequest| ScenarioOutcome::response(reply.clone())),
        )
    }

    #[test]
    fn duplicate_name_is_rejected_and_registry_is_unchanged() {
        let mut registry = ScenarioRegistry::new();
        registry
            .register(fixed("Echo", HeaderMatcher::new()))
            .expect("첫 등록 실패");
        let err = registry
            .register(fixed("Echo", HeaderMatcher::new().header("op", "x")))
            .expect_err("중복 이름은 거부되어야 한다");
        assert!(matches!(err, SimulatorError::DuplicateScenario(name) if name == "Echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn first_registered_match_wins() {
        let mut registry = ScenarioRegistry::new();
        registry
            .register(fixed("Specific", HeaderMatcher::new().header("op", "echo")))
            .expect("등록 실패");
        registry
            .register(Scenario::new(
                "CatchAll",
                AnyRequest,
                FnExecutor::new(|_: &ScenarioRequest| ScenarioOutcome::fault(404, "none")),
            ))
            .expect("등록 실패");
        registry
            .register(fixed("AlsoEcho", HeaderMatcher::new().header("op", "echo")))
            .expect("등록 실패");

        let echo = ScenarioRequest::new("hi").with_header("op", "echo");
        for _ in 0..3 {
            assert_eq!(registry.select(&echo).map(|s| s.name()), Some("Specific"));
        }
        let other = ScenarioRequest::new("hi").with_header("op", "other");
        assert_eq!(registry.select(&other).map(|s| s.name()), Some("CatchAll"));
        assert_eq!(registry.names(), vec!["Specific", "CatchAll", "AlsoEcho"]);
    }

    #[test]
    fn empty_registry_selects_nothing() {
        let registry = ScenarioRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.select(&ScenarioRequest::new("hi")).is_none());
    }
}
