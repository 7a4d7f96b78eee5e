//! Cursor 响应转换为 OpenAI 格式

use crate::models::openai::*;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// 非流式响应清理规则，按顺序执行
static CLEANUP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let patterns = [
        // 上游回显的用户输入，截止到最后一个 `<|END_USER|>`
        r"(?s)^.*<\|END_USER\|>",
        // 回显之后的换行及可能跟随的单个字母
        r"^\n[a-zA-Z]?",
    ];

    patterns
        .into_iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!("[CONVERTER] 无效的清理规则 `{}`: {}", pattern, e);
                None
            }
        })
        .collect()
});

/// 清理非流式响应的完整文本
pub fn clean_response_text(text: &str) -> String {
    let mut text = text.to_string();
    for re in CLEANUP_PATTERNS.iter() {
        text = re.replace(&text, "").into_owned();
    }
    text.trim().to_string()
}

/// 创建完成的 OpenAI 响应
pub fn create_openai_response(content: &str, model: &str) -> ChatCompletionResponse {
    let created = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: content.to_string(),
            },
            finish_reason: "stop".to_string(),
        }],
        usage: Usage::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_patterns_compile() {
        assert_eq!(CLEANUP_PATTERNS.len(), 2);
    }

    #[test]
    fn test_clean_strips_echoed_prompt() {
        let raw = "user said hi<|END_USER|>\nxHello there  ";
        assert_eq!(clean_response_text(raw), "Hello there");
    }

    #[test]
    fn test_clean_uses_last_end_user_marker() {
        let raw = "a<|END_USER|>b<|END_USER|>\n answer";
        assert_eq!(clean_response_text(raw), "answer");
    }

    #[test]
    fn test_clean_without_marker_only_trims() {
        assert_eq!(clean_response_text("  plain answer \n"), "plain answer");
    }

    #[test]
    fn test_create_openai_response() {
        let response = create_openai_response("hi", "gpt-4o");
        assert!(response.id.starts_with("chatcmpl-"));
        assert_eq!(response.object, "chat.completion");
        assert_eq!(response.choices[0].message.content, "hi");
        assert_eq!(response.choices[0].finish_reason, "stop");
        assert_eq!(response.usage.total_tokens, 0);
    }
}
