//! 流处理错误类型
//!
//! - `TransformError`: 构造期配置错误（正则规则、标记等），不会在流中途出现
//! - `StreamError`: 流式传输期间的错误，作为流的最后一项返回

use thiserror::Error;

/// 转换器配置错误
#[derive(Error, Debug)]
pub enum TransformError {
    /// 正则表达式无法编译
    #[error("无效的正则表达式 `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// 不支持的正则标志
    #[error("不支持的正则标志: {flag}")]
    InvalidFlag { flag: char },

    /// 规则列表无法解析
    #[error("无效的规则列表: {0}")]
    InvalidRules(String),
}

/// 流式传输错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// 上游字节流读取失败或异常关闭
    #[error("上游流读取失败: {0}")]
    Source(String),

    /// 上游返回非成功状态码
    #[error("上游返回错误: {status} - {body}")]
    Upstream { status: u16, body: String },
}

impl StreamError {
    /// 从任意错误构造 Source 错误
    pub fn source<E: std::fmt::Display>(err: E) -> Self {
        StreamError::Source(err.to_string())
    }

    /// 转换为 SSE 错误事件
    ///
    /// 对客户端只暴露通用错误信息，详细原因写入日志
    pub fn to_sse_error(&self) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "error": "Internal server error" })
        )
    }
}
