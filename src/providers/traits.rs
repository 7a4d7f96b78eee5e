//! Provider Trait 定义
//!
//! 上游调用的统一接口。处理器只依赖该 trait，测试中可以替换为内存实现。

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::stream::StreamError;

/// 上游响应字节流
pub type ByteStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// 发往上游的请求
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// 调用方提供的访问 token
    pub auth_token: String,
    /// 设备 checksum
    pub checksum: String,
    /// 已编码的请求体
    pub body: Vec<u8>,
}

/// Provider 错误
#[derive(Error, Debug)]
pub enum ProviderError {
    /// 请求发送失败
    #[error("请求上游失败: {0}")]
    Request(#[from] reqwest::Error),

    /// 上游返回非成功状态码
    #[error("上游返回错误: {status} - {body}")]
    Status { status: u16, body: String },

    /// 等待响应头超时
    #[error("等待上游响应超时: {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// 无法构造请求头
    #[error("无效的请求头 {name}: {message}")]
    InvalidHeader { name: String, message: String },
}

/// 对话后端
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 发送请求，成功时返回响应体字节流
    async fn stream_chat(&self, request: UpstreamRequest) -> Result<ByteStream, ProviderError>;

    /// Provider 名称，用于日志
    fn provider_type(&self) -> &'static str;
}
