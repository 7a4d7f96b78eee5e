//! 对话补全处理器
//!
//! 处理 `POST /v1/chat/completions`：
//! 1. 校验请求并解码请求头中的元数据
//! 2. 转换为上游 protobuf 请求并调用后端
//! 3. 流式请求经过解码/转换/SSE 生成后逐块返回，非流式请求聚合后清理返回

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::StreamExt;

use crate::converter::cursor_to_openai::{clean_response_text, create_openai_response};
use crate::converter::openai_to_cursor::{convert_openai_to_cursor, process_messages};
use crate::logger::{mask_token, sanitize_log_message};
use crate::models::openai::ChatCompletionRequest;
use crate::providers::{extract_auth_token, resolve_checksum, UpstreamRequest};
use crate::server::error::ProxyError;
use crate::server::metadata::RequestMetadata;
use crate::server::AppState;
use crate::server_utils::{build_sse_response, safe_truncate};
use crate::stream::{collect_text, create_sse_stream, PipelineConfig};

const INVALID_REQUEST_MESSAGE: &str =
    "Invalid request. Messages should be a non-empty array and authorization is required";

/// 不支持流式输出的模型前缀
const NON_STREAMING_MODEL_PREFIX: &str = "o1-";

/// 对话补全
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ProxyError> {
    tracing::debug!(
        "[CHAT] 请求头: {}",
        sanitize_log_message(&format!("{:?}", headers))
    );

    if request.stream && request.model.starts_with(NON_STREAMING_MODEL_PREFIX) {
        return Err(ProxyError::UnsupportedStream {
            model: request.model,
        });
    }

    let auth_token = extract_auth_token(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    );
    let auth_token = match auth_token {
        Some(token) if !request.messages.is_empty() => token,
        _ => return Err(ProxyError::InvalidRequest(INVALID_REQUEST_MESSAGE.to_string())),
    };

    // 规则在调用上游之前编译，配置错误不会产生上游请求
    let metadata = RequestMetadata::from_headers(&headers)?;
    let options = metadata.transform_options()?;

    let custom_instruction = metadata
        .custom_instruction
        .as_deref()
        .unwrap_or(&state.config.defaults.custom_instruction);
    let checksum = resolve_checksum(
        metadata.checksum.as_deref(),
        state.config.defaults.checksum.as_deref(),
    );

    let messages = process_messages(&request.messages, &metadata.prompt_injection);
    let body = convert_openai_to_cursor(&messages, &request.model, custom_instruction);

    tracing::info!(
        "[CHAT] 收到请求: model={}, stream={}, messages={}, rules={}, token={}, provider={}",
        request.model,
        request.stream,
        messages.len(),
        options.rules.len(),
        mask_token(&auth_token),
        state.backend.provider_type()
    );
    if let Some(last) = messages.last() {
        tracing::debug!("[CHAT] 最后一条消息: {}", safe_truncate(&last.content, 200));
    }

    let byte_stream = state
        .backend
        .stream_chat(UpstreamRequest {
            auth_token,
            checksum,
            body,
        })
        .await?;

    if request.stream {
        let config = PipelineConfig::new(request.model, options);
        let body_stream = create_sse_stream(byte_stream, config).map(|event| {
            let event = event.unwrap_or_else(|e| e.to_sse_error());
            Ok::<Bytes, std::io::Error>(Bytes::from(event))
        });
        return Ok(build_sse_response(body_stream));
    }

    let text = collect_text(byte_stream)
        .await
        .map_err(|e| ProxyError::Internal(e.to_string()))?;
    let content = clean_response_text(&text);
    tracing::info!(
        "[CHAT] 非流式响应完成: model={}, chars={}",
        request.model,
        content.chars().count()
    );

    Ok(Json(create_openai_response(&content, &request.model)).into_response())
}

/// 健康检查
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
