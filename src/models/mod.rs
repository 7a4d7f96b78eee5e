//! 数据模型
//!
//! - `openai`: OpenAI Chat Completions 请求/响应
//! - `cursor`: 上游 StreamChat protobuf 消息与 Connect 信封

pub mod cursor;
pub mod openai;
