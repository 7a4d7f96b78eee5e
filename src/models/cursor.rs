//! Cursor StreamChat API 数据模型
//!
//! 上游使用 Connect 协议：每个消息以 5 字节信封头开始
//! （1 字节 flags + 4 字节大端长度），负载为 protobuf 编码。
//!
//! 这里只定义代理需要的字段，不追求覆盖完整 schema。

use prost::Message;

/// 信封 flags：负载经过 gzip 压缩
pub const ENVELOPE_FLAG_COMPRESSED: u8 = 0x01;
/// 信封 flags：流结束信封，负载为 JSON
pub const ENVELOPE_FLAG_END_STREAM: u8 = 0x02;
/// 信封头长度
pub const ENVELOPE_HEADER_LEN: usize = 5;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Role {
    Unspecified = 0,
    User = 1,
    Assistant = 2,
}

impl Role {
    /// 从 OpenAI 角色名映射，system/tool 等按 user 处理
    pub fn from_openai(role: &str) -> Self {
        match role {
            "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ChatMessage {
    #[prost(string, tag = "1")]
    pub content: String,
    #[prost(enumeration = "Role", tag = "2")]
    pub role: i32,
    #[prost(string, tag = "13")]
    pub message_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Instructions {
    #[prost(string, tag = "1")]
    pub instruction: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ModelDetails {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub empty: String,
}

/// StreamChat 请求体
#[derive(Clone, PartialEq, Message)]
pub struct GetChatRequest {
    #[prost(message, repeated, tag = "2")]
    pub messages: Vec<ChatMessage>,
    #[prost(message, optional, tag = "4")]
    pub instructions: Option<Instructions>,
    #[prost(string, tag = "5")]
    pub project_path: String,
    #[prost(message, optional, tag = "7")]
    pub model: Option<ModelDetails>,
    #[prost(string, tag = "9")]
    pub request_id: String,
    #[prost(string, tag = "11")]
    pub summary: String,
    #[prost(string, tag = "15")]
    pub conversation_id: String,
}

/// StreamChat 流式响应消息
#[derive(Clone, PartialEq, Message)]
pub struct StreamChatResponse {
    #[prost(string, tag = "1")]
    pub text: String,
}

/// 将 protobuf 消息包装为未压缩的 Connect 信封
pub fn encode_envelope<M: Message>(message: &M) -> Vec<u8> {
    let payload = message.encode_to_vec();
    let mut frame = Vec::with_capacity(ENVELOPE_HEADER_LEN + payload.len());
    frame.push(0x00);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_envelope_header() {
        let message = StreamChatResponse {
            text: "hi".to_string(),
        };
        let frame = encode_envelope(&message);

        assert_eq!(frame[0], 0x00);
        let len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        assert_eq!(len, frame.len() - ENVELOPE_HEADER_LEN);

        let decoded = StreamChatResponse::decode(&frame[ENVELOPE_HEADER_LEN..]).unwrap();
        assert_eq!(decoded.text, "hi");
    }

    #[test]
    fn test_role_mapping() {
        assert_eq!(Role::from_openai("assistant"), Role::Assistant);
        assert_eq!(Role::from_openai("user"), Role::User);
        assert_eq!(Role::from_openai("system"), Role::User);
    }
}
