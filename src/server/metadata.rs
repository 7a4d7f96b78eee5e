//! 请求元数据
//!
//! 从请求头读取 base64 编码的元数据：提示注入、系统指令、起止标记和替换规则。

use axum::http::HeaderMap;

use crate::server_utils::decode_base64;
use crate::stream::{parse_rule_specs, RewriteRuleSpec, TransformError, TransformOptions};

pub const HEADER_PROMPT_INJECTION: &str = "x-prompt-injection";
pub const HEADER_CUSTOM_INSTRUCTION: &str = "x-custom-instruction";
pub const HEADER_STARTS_WITH: &str = "x-starts-with";
pub const HEADER_ENDS_WITH: &str = "x-ends-with";
pub const HEADER_REGEX: &str = "x-regex";
pub const HEADER_CHECKSUM: &str = "x-cursor-checksum";

/// 解码后的请求元数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestMetadata {
    pub prompt_injection: String,
    pub custom_instruction: Option<String>,
    pub start_marker: Option<String>,
    pub end_marker: Option<String>,
    pub rules: Vec<RewriteRuleSpec>,
    pub checksum: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn decoded(headers: &HeaderMap, name: &str) -> Option<String> {
    header_str(headers, name)
        .map(decode_base64)
        .filter(|s| !s.is_empty())
}

impl RequestMetadata {
    /// 从请求头解析
    ///
    /// 规则 JSON 无法解析时返回 `TransformError::InvalidRules`
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, TransformError> {
        let rules = match decoded(headers, HEADER_REGEX) {
            Some(json) => parse_rule_specs(&json)?,
            None => Vec::new(),
        };

        Ok(Self {
            prompt_injection: decoded(headers, HEADER_PROMPT_INJECTION).unwrap_or_default(),
            custom_instruction: decoded(headers, HEADER_CUSTOM_INSTRUCTION),
            start_marker: decoded(headers, HEADER_STARTS_WITH),
            end_marker: decoded(headers, HEADER_ENDS_WITH),
            rules,
            checksum: header_str(headers, HEADER_CHECKSUM)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }

    /// 编译转换选项
    pub fn transform_options(&self) -> Result<TransformOptions, TransformError> {
        TransformOptions::from_specs(
            self.start_marker.clone(),
            self.end_marker.clone(),
            &self.rules,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(&STANDARD.encode(value)).unwrap());
        }
        map
    }

    #[test]
    fn test_empty_headers() {
        let meta = RequestMetadata::from_headers(&HeaderMap::new()).unwrap();
        assert_eq!(meta, RequestMetadata::default());
    }

    #[test]
    fn test_markers_and_rules() {
        let meta = RequestMetadata::from_headers(&headers(&[
            (HEADER_STARTS_WITH, "<answer>"),
            (HEADER_ENDS_WITH, "</answer>"),
            (HEADER_REGEX, r#"[{"pattern":"foo","flags":"gi","replacement":"bar"}]"#),
            (HEADER_PROMPT_INJECTION, "reply in <answer> tags"),
        ]))
        .unwrap();

        assert_eq!(meta.start_marker.as_deref(), Some("<answer>"));
        assert_eq!(meta.end_marker.as_deref(), Some("</answer>"));
        assert_eq!(meta.prompt_injection, "reply in <answer> tags");
        assert_eq!(meta.rules, vec![RewriteRuleSpec::new("foo", "gi", "bar")]);

        let options = meta.transform_options().unwrap();
        assert_eq!(options.rules.len(), 1);
    }

    #[test]
    fn test_invalid_rules_json() {
        let err = RequestMetadata::from_headers(&headers(&[(HEADER_REGEX, "{broken")])).unwrap_err();
        assert!(matches!(err, TransformError::InvalidRules(_)));
    }

    #[test]
    fn test_checksum_is_not_base64_decoded() {
        let mut map = HeaderMap::new();
        map.insert(HEADER_CHECKSUM, HeaderValue::from_static("zoRAW/value"));
        let meta = RequestMetadata::from_headers(&map).unwrap();
        assert_eq!(meta.checksum.as_deref(), Some("zoRAW/value"));
    }
}
