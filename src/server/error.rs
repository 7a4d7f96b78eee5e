//! 请求处理错误类型
//!
//! 定义请求处理过程中可能发生的错误，以及对应的 HTTP 响应

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::providers::ProviderError;
use crate::stream::TransformError;

/// 处理错误
#[derive(Error, Debug)]
pub enum ProxyError {
    /// 请求参数无效
    #[error("{0}")]
    InvalidRequest(String),

    /// 模型不支持流式输出
    #[error("Model not supported stream")]
    UnsupportedStream { model: String },

    /// 标记或替换规则配置错误
    #[error("{0}")]
    Config(#[from] TransformError),

    /// 上游调用失败
    #[error("上游调用失败: {0}")]
    Upstream(#[from] ProviderError),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ProxyError {
    /// 获取对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::UnsupportedStream { .. } => StatusCode::BAD_REQUEST,
            ProxyError::Config(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::InvalidRequest(_) => "invalid_request",
            ProxyError::UnsupportedStream { .. } => "unsupported_stream",
            ProxyError::Config(_) => "config_error",
            ProxyError::Upstream(_) => "upstream_error",
            ProxyError::Internal(_) => "internal_error",
        }
    }

    /// 对客户端可见的错误信息
    ///
    /// 上游和内部错误只返回通用信息，细节写入日志
    pub fn client_message(&self) -> String {
        match self {
            ProxyError::Upstream(_) | ProxyError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// 转换为 JSON 错误响应
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.client_message() })
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self.status_code() {
            status if status.is_server_error() => tracing::error!(
                error_type = %self.error_type(),
                error_message = %self,
                "[CHAT] 请求处理失败"
            ),
            _ => tracing::warn!(
                error_type = %self.error_type(),
                error_message = %self,
                "[CHAT] 请求被拒绝"
            ),
        }
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
