use super::ScenarioRequest;
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}").expect("정규식 컴파일 실패"));

/// 응답 템플릿 치환에 사용하는 요청 기반 변수 저장소이다.
#[derive(Debug, Default, Clone)]
pub struct RequestVariables {
    /// 변수명과 값의 맵이다.
    vars: HashMap<String, String>,
}

impl RequestVariables {
    /// 요청에서 `payload`, `correlation_id`, `header.<이름>` 변수를 구성한다.
    pub fn from_request(request: &ScenarioRequest) -> Self {
        let mut vars = HashMap::new();
        vars.insert("payload".to_string(), request.payload().to_string());
        vars.insert(
            "correlation_id".to_string(),
            request.correlation_id().to_string(),
        );
        for (key, value) in request.headers() {
            vars.insert(format!("header.{key}"), value.clone());
        }
        Self { vars }
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// `${VAR}` 패턴을 실제 값으로 치환한다.
    ///
    /// # 반환값
    /// 모든 플레이스홀더가 치환되면 결과 문자열을, 하나라도 값이 없으면 오류를 반환한다.
    /// 치환된 값 안의 `${...}` 문자열은 다시 해석하지 않는다.
    pub fn expand_placeholders(&self, template: &str) -> anyhow::Result<String> {
        let mut missing: Vec<String> = Vec::new();
        let result = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            match self.get_var(key) {
                Some(value) => value.to_string(),
                None => {
                    missing.push(key.to_string());
                    caps[0].to_string()
                }
            }
        });
        if !missing.is_empty() {
            anyhow::bail!("플레이스홀더 치환 실패: {}", missing.join(", "));
        }
        Ok(result.into_owned())
    }

    /// 치환 실패 시 필드명을 포함한 오류를 반환한다.
    pub fn expand_required(&self, template: &str, field: &str) -> anyhow::Result<String> {
        self.expand_placeholders(template)
            .with_context(|| format!("{field} 필드의 플레이스홀더를 치환할 수 없습니다."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_payload_header_and_correlation_id() {
        let request = ScenarioRequest::new("hi")
            .with_header("op", "echo")
            .with_correlation_id("c-1");
        let vars = RequestVariables::from_request(&request);
        let expanded = vars
            .expand_placeholders("${header.op}:${payload}@${correlation_id}")
            .expect("치환 실패");
        assert_eq!(expanded, "echo:hi@c-1");
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let vars = RequestVariables::from_request(&ScenarioRequest::new("hi"));
        let err = vars
            .expand_required("${header.missing}", "respond.payload")
            .expect_err("치환이 실패해야 한다");
        assert!(format!("{err:#}").contains("header.missing"));
    }

    #[test]
    fn substituted_value_is_not_expanded_again() {
        let vars = RequestVariables::from_request(&ScenarioRequest::new("${payload}"));
        assert_eq!(
            vars.expand_placeholders("${payload}").expect("치환 실패"),
            "${payload}"
        );
    }
}
