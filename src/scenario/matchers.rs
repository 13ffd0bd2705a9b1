use super::{Matcher, ScenarioRequest};
use anyhow::Context;
use regex::Regex;
use std::collections::BTreeMap;

/// 모든 요청과 일치하는 매처이다.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyRequest;

impl Matcher for AnyRequest {
    fn matches(&self, _request: &ScenarioRequest) -> bool {
        true
    }
}

/// 헤더 값과 페이로드 정규식으로 요청을 판정한다.
#[derive(Debug, Clone, Default)]
pub struct HeaderMatcher {
    /// 모두 같아야 하는 헤더 값이다.
    headers: BTreeMap<String, String>,
    /// 페이로드 안에서 찾아야 하는 패턴이다.
    payload: Option<Regex>,
}

impl HeaderMatcher {
    /// 비어 있는 매처를 생성한다. 조건이 없으면 모든 요청과 일치한다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 헤더 조건을 추가한다.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// 페이로드 정규식 조건을 설정한다.
    pub fn payload_pattern(mut self, pattern: &str) -> anyhow::Result<Self> {
        let regex =
            Regex::new(pattern).with_context(|| format!("페이로드 패턴 파싱 실패: {pattern}"))?;
        self.payload = Some(regex);
        Ok(self)
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, request: &ScenarioRequest) -> bool {
        let headers_ok = self
            .headers
            .iter()
            .all(|(key, expected)| request.header(key) == Some(expected.as_str()));
        headers_ok
            && self
                .payload
                .as_ref()
                .is_none_or(|regex| regex.is_match(request.payload()))
    }
}
