//! OpenAI 格式转换为 Cursor StreamChat 请求

use crate::models::cursor::{
    encode_envelope, ChatMessage as CursorMessage, GetChatRequest, Instructions, ModelDetails, Role,
};
use crate::models::openai::ChatMessage;
use uuid::Uuid;

/// 展平后的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedMessage {
    pub role: String,
    pub content: String,
}

/// 展平消息内容，并把提示注入追加到最后一条消息
pub fn process_messages(messages: &[ChatMessage], prompt_injection: &str) -> Vec<ProcessedMessage> {
    let last = messages.len().saturating_sub(1);

    messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            let content = message.get_content_text();
            let content = if index == last && !prompt_injection.is_empty() {
                format!("{}\n{}", content, prompt_injection)
            } else {
                content
            };
            ProcessedMessage {
                role: message.role.clone(),
                content,
            }
        })
        .collect()
}

/// 构造 StreamChat 请求
pub fn build_chat_request(
    messages: &[ProcessedMessage],
    model: &str,
    custom_instruction: &str,
) -> GetChatRequest {
    let messages = messages
        .iter()
        .map(|m| CursorMessage {
            content: m.content.clone(),
            role: Role::from_openai(&m.role) as i32,
            message_id: Uuid::new_v4().to_string(),
        })
        .collect();

    GetChatRequest {
        messages,
        instructions: Some(Instructions {
            instruction: custom_instruction.to_string(),
        }),
        project_path: "/path/to/project".to_string(),
        model: Some(ModelDetails {
            name: model.to_string(),
            empty: String::new(),
        }),
        request_id: Uuid::new_v4().to_string(),
        summary: String::new(),
        conversation_id: Uuid::new_v4().to_string(),
    }
}

/// 将 OpenAI 消息转换为上游请求体（Connect 信封）
pub fn convert_openai_to_cursor(
    messages: &[ProcessedMessage],
    model: &str,
    custom_instruction: &str,
) -> Vec<u8> {
    encode_envelope(&build_chat_request(messages, model, custom_instruction))
}
