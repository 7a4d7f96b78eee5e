//! Cursor StreamChat Provider
//!
//! 负责调用方 token 解析、checksum 生成、请求头构造和上游调用。
//! 认证本身由上游完成，这里只转发 token。

use async_trait::async_trait;
use futures::StreamExt;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use uuid::Uuid;

use super::traits::{ByteStream, ChatBackend, ProviderError, UpstreamRequest};
use crate::config::UpstreamConfig;
use crate::stream::StreamError;

/// 会话 token 中的分隔符（URL 编码后的 `::`）
const SESSION_TOKEN_SEPARATOR: &str = "%3A%3A";

/// 从 Authorization 头提取 token
///
/// - 去掉 `Bearer ` 前缀
/// - 逗号分隔多个 key 时取第一个
/// - 形如 `user_xxx%3A%3Atoken` 时取分隔符之后的部分
pub fn extract_auth_token(header: Option<&str>) -> Option<String> {
    let header = header?;
    let token = header.replacen("Bearer ", "", 1);
    let first = token.split(',').map(str::trim).next().unwrap_or_default();

    let token = match first.split_once(SESSION_TOKEN_SEPARATOR) {
        Some((_, rest)) => rest.split(SESSION_TOKEN_SEPARATOR).next().unwrap_or_default(),
        None => first,
    };

    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// 随机生成 checksum：`zo` + 6 位 + 64 位 + `/` + 64 位
pub fn generate_checksum() -> String {
    format!(
        "zo{}{}/{}",
        random_alphanumeric(6),
        random_alphanumeric(64),
        random_alphanumeric(64)
    )
}

/// 确定本次请求使用的 checksum：请求头 > 配置 > 随机生成
pub fn resolve_checksum(from_header: Option<&str>, configured: Option<&str>) -> String {
    from_header
        .filter(|s| !s.is_empty())
        .or(configured.filter(|s| !s.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(generate_checksum)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ProviderError> {
    HeaderValue::from_str(value).map_err(|e| ProviderError::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// Cursor Provider
#[derive(Debug, Clone)]
pub struct CursorProvider {
    client: Client,
    config: UpstreamConfig,
}

impl CursorProvider {
    pub fn new(config: UpstreamConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    /// 构造上游请求头
    pub fn build_headers(&self, auth_token: &str, checksum: &str) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/connect+proto"),
        );
        headers.insert(
            AUTHORIZATION,
            header_value("authorization", &format!("Bearer {}", auth_token))?,
        );
        // 只声明能解压的编码
        headers.insert(
            HeaderName::from_static("connect-accept-encoding"),
            HeaderValue::from_static("gzip"),
        );
        headers.insert(
            HeaderName::from_static("connect-protocol-version"),
            HeaderValue::from_static("1"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("connect-es/1.4.0"));
        headers.insert(
            HeaderName::from_static("x-amzn-trace-id"),
            header_value("x-amzn-trace-id", &format!("Root={}", Uuid::new_v4()))?,
        );
        headers.insert(
            HeaderName::from_static("x-cursor-checksum"),
            header_value("x-cursor-checksum", checksum)?,
        );
        headers.insert(
            HeaderName::from_static("x-cursor-client-version"),
            header_value("x-cursor-client-version", &self.config.client_version)?,
        );
        headers.insert(
            HeaderName::from_static("x-cursor-timezone"),
            header_value("x-cursor-timezone", &self.config.timezone)?,
        );
        headers.insert(
            HeaderName::from_static("x-ghost-mode"),
            HeaderValue::from_static("false"),
        );
        headers.insert(
            HeaderName::from_static("x-request-id"),
            header_value("x-request-id", &Uuid::new_v4().to_string())?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl ChatBackend for CursorProvider {
    async fn stream_chat(&self, request: UpstreamRequest) -> Result<ByteStream, ProviderError> {
        let headers = self.build_headers(&request.auth_token, &request.checksum)?;
        let send = self
            .client
            .post(&self.config.base_url)
            .headers(headers)
            .body(request.body)
            .send();

        let response = if self.config.request_timeout_secs > 0 {
            let timeout_secs = self.config.request_timeout_secs;
            tokio::time::timeout(Duration::from_secs(timeout_secs), send)
                .await
                .map_err(|_| ProviderError::Timeout { timeout_secs })??
        } else {
            send.await?
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("[CURSOR] 上游返回错误状态: {} {}", status, body);
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("[CURSOR] 上游响应状态: {}", status);
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StreamError::source))
            .boxed())
    }

    fn provider_type(&self) -> &'static str {
        "cursor"
    }
}
