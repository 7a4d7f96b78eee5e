//! OpenAI SSE 生成器
//!
//! 将转换器产出的文本片段封装为 OpenAI Chat Completions SSE 格式。
//!
//! # 格式说明
//!
//! ```text
//! data: {"id":"chatcmpl-xxx","object":"chat.completion.chunk","created":1234567890,"model":"gpt-4o","choices":[{"index":0,"delta":{"content":"Hello"}}]}
//!
//! data: [DONE]
//! ```

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// OpenAI SSE 生成器
#[derive(Debug)]
pub struct OpenAiSseGenerator {
    /// 响应 ID
    response_id: String,
    /// 模型名称
    model: String,
}

impl OpenAiSseGenerator {
    /// 创建新的生成器
    pub fn new(model: String) -> Self {
        Self::with_id(format!("chatcmpl-{}", uuid::Uuid::new_v4()), model)
    }

    /// 使用指定的响应 ID 创建生成器
    pub fn with_id(id: String, model: String) -> Self {
        Self {
            response_id: id,
            model,
        }
    }

    /// 将文本片段转换为一个 SSE 事件
    ///
    /// 空片段同样会生成事件，保持与上游结束时的行为一致。
    pub fn generate(&self, text: &str) -> String {
        let chunk = OpenAiStreamChunk {
            id: &self.response_id,
            object: "chat.completion.chunk",
            created: unix_now(),
            model: &self.model,
            choices: vec![OpenAiChoice {
                index: 0,
                delta: OpenAiDelta {
                    content: Some(text),
                },
            }],
        };
        match serde_json::to_string(&chunk) {
            Ok(json) => format!("data: {}\n\n", json),
            Err(e) => {
                tracing::error!("[STREAM] 序列化 SSE 事件失败: {}", e);
                String::new()
            }
        }
    }

    /// 生成 [DONE] 事件
    pub fn generate_done(&self) -> String {
        "data: [DONE]\n\n".to_string()
    }

    /// 获取响应 ID
    pub fn response_id(&self) -> &str {
        &self.response_id
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ============================================================================
// OpenAI SSE 数据结构
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiStreamChunk<'a> {
    id: &'a str,
    object: &'a str,
    created: u64,
    model: &'a str,
    choices: Vec<OpenAiChoice<'a>>,
}

#[derive(Debug, Serialize)]
struct OpenAiChoice<'a> {
    index: usize,
    delta: OpenAiDelta<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAiDelta<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
}
