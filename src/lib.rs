//! Cursor Bridge
//!
//! OpenAI 兼容的对话代理：把 `/v1/chat/completions` 请求转换为上游 StreamChat 请求，
//! 并对上游响应流做增量转换（起止标记截取、正则替换）后以 SSE 返回。

pub mod config;
pub mod converter;
pub mod logger;
pub mod models;
pub mod providers;
pub mod server;
pub mod server_utils;
pub mod stream;
