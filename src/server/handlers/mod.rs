//! HTTP 请求处理器

mod chat;

pub use chat::{chat_completions, health};
