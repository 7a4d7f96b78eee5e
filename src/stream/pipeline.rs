//! 统一流处理管道
//!
//! 封装完整的流式处理流程：上游字节流 → 解码 → 转换 → OpenAI SSE
//!
//! # 使用示例
//!
//! ```ignore
//! use cursor_bridge::stream::{create_sse_stream, PipelineConfig, TransformOptions};
//!
//! let config = PipelineConfig::new("gpt-4o".to_string(), TransformOptions::new());
//! let sse_stream = create_sse_stream(response.bytes_stream(), config);
//! ```

use crate::stream::decoder::{decode_stream, ConnectChunkDecoder};
use crate::stream::error::StreamError;
use crate::stream::generators::OpenAiSseGenerator;
use crate::stream::transformer::{StreamTransformer, TransformOptions};
use bytes::Bytes;
use futures::{Stream, StreamExt};

/// 流处理管道配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 模型名称
    pub model: String,
    /// 标记与替换规则
    pub options: TransformOptions,
    /// 响应 ID（可选）
    pub response_id: Option<String>,
}

impl PipelineConfig {
    pub fn new(model: String, options: TransformOptions) -> Self {
        Self {
            model,
            options,
            response_id: None,
        }
    }

    /// 设置响应 ID
    pub fn with_response_id(mut self, id: String) -> Self {
        self.response_id = Some(id);
        self
    }
}

/// 创建流式处理的异步流
///
/// 每个片段生成一个 `chat.completion.chunk` 事件，正常结束时追加 `[DONE]`。
/// 上游出错时产出 `Err` 并结束，不再发送 `[DONE]`。
pub fn create_sse_stream<S, E>(
    byte_stream: S,
    config: PipelineConfig,
) -> impl Stream<Item = Result<String, StreamError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let generator = match config.response_id {
        Some(id) => OpenAiSseGenerator::with_id(id, config.model),
        None => OpenAiSseGenerator::new(config.model),
    };
    let text_stream = decode_stream(byte_stream, ConnectChunkDecoder::new());
    let fragments = StreamTransformer::new(text_stream, config.options).process();

    async_stream::stream! {
        let mut fragments = std::pin::pin!(fragments);
        let mut count = 0usize;

        while let Some(result) = fragments.next().await {
            match result {
                Ok(fragment) => {
                    count += 1;
                    yield Ok(generator.generate(&fragment));
                }
                Err(e) => {
                    tracing::error!(
                        "[STREAM] 流式响应中断, response_id={}, 已发送 {} 个片段: {}",
                        generator.response_id(),
                        count,
                        e
                    );
                    yield Err(e);
                    return;
                }
            }
        }

        tracing::debug!(
            "[STREAM] 流式响应完成, response_id={}, 片段数={}",
            generator.response_id(),
            count
        );
        yield Ok(generator.generate_done());
    }
}

/// 读取完整的上游响应并解码为文本（非流式请求使用）
pub async fn collect_text<S, E>(byte_stream: S) -> Result<String, StreamError>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let text_stream = decode_stream(byte_stream, ConnectChunkDecoder::new());
    let mut text_stream = std::pin::pin!(text_stream);

    let mut text = String::new();
    while let Some(chunk) = text_stream.next().await {
        text.push_str(&chunk?);
    }
    Ok(text)
}
