//! 服务器工具函数
//!
//! 包含请求元数据解码、字符串处理、响应构建等公共工具函数。

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use futures::Stream;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// 解码 base64 元数据
///
/// 同时接受标准和 URL-safe 字母表，填充可有可无；
/// 无法解码时返回空字符串，相当于未设置该元数据。
pub fn decode_base64(input: &str) -> String {
    let input = input.trim();
    if input.is_empty() {
        return String::new();
    }

    let decoded = STANDARD_LENIENT
        .decode(input)
        .or_else(|_| URL_SAFE_LENIENT.decode(input));

    match decoded {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::debug!("无法解码 base64 元数据: {}", e);
            String::new()
        }
    }
}

/// 安全截断字符串到指定字符数，避免 UTF-8 边界问题
pub fn safe_truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// 构建 SSE 响应
pub fn build_sse_response<S>(body_stream: S) -> Response
where
    S: Stream<Item = Result<axum::body::Bytes, std::io::Error>> + Send + 'static,
{
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to build streaming response"})),
            )
                .into_response()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_variants() {
        assert_eq!(decode_base64("aGVsbG8="), "hello");
        assert_eq!(decode_base64("aGVsbG8"), "hello");
        // "<?>" 在两种字母表下编码不同
        assert_eq!(decode_base64("PD8-"), "<?>");
        assert_eq!(decode_base64("PD8+"), "<?>");
    }

    #[test]
    fn test_decode_base64_invalid_is_empty() {
        assert_eq!(decode_base64(""), "");
        assert_eq!(decode_base64("!!!"), "");
    }

    #[test]
    fn test_safe_truncate() {
        assert_eq!(safe_truncate("你好世界", 2), "你好");
        assert_eq!(safe_truncate("abc", 10), "abc");
    }

    #[test]
    fn test_sse_response_headers() {
        let response = build_sse_response(futures::stream::empty());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
    }
}
