//! 协议转换模块
//!
//! - `openai_to_cursor`: OpenAI 请求 → Cursor StreamChat 请求
//! - `cursor_to_openai`: Cursor 完整响应 → OpenAI `chat.completion`

pub mod cursor_to_openai;
pub mod openai_to_cursor;
