//! 字节块解码器
//!
//! 将上游响应体的原始字节块转换为文本。网络层给出的块边界是任意的：
//! 多字节 UTF-8 字符、Connect 信封都可能被拆分到相邻的两个块中，
//! 解码器负责把未完成的尾部字节留到下一次调用。

use crate::models::cursor::{
    StreamChatResponse, ENVELOPE_FLAG_COMPRESSED, ENVELOPE_FLAG_END_STREAM, ENVELOPE_HEADER_LEN,
};
use bytes::{Buf, Bytes, BytesMut};
use flate2::read::GzDecoder;
use futures::{Stream, StreamExt};
use prost::Message;
use std::char::REPLACEMENT_CHARACTER;
use std::io::Read;

use super::error::StreamError;

/// 单个信封负载上限（16 MiB）
pub const MAX_ENVELOPE_LEN: usize = 16 * 1024 * 1024;

/// 字节块解码器
pub trait ChunkDecoder: Send {
    /// 解码一个字节块，返回可以完整解码的文本
    fn decode(&mut self, chunk: &[u8]) -> String;

    /// 源结束时调用，返回残留数据能解码出的文本
    fn finish(&mut self) -> String;

    /// 取出解码过程中发现的上游错误（如携带错误的结束信封）
    ///
    /// 返回 `Some` 后流应当终止
    fn take_error(&mut self) -> Option<StreamError> {
        None
    }
}

/// UTF-8 解码器
///
/// 不完整的多字节序列（最多 3 字节）保留到下一个块；
/// 非法字节按标准 UTF-8 规则替换为 U+FFFD，不会返回错误。
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前保留的未解码字节数
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl ChunkDecoder for Utf8ChunkDecoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut pos = 0;
        while pos < self.pending.len() {
            match std::str::from_utf8(&self.pending[pos..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    pos = self.pending.len();
                }
                Err(e) => {
                    let valid_end = pos + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[pos..valid_end]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT_CHARACTER);
                            pos = valid_end + len;
                        }
                        // 末尾是不完整序列，等待下一个块
                        None => {
                            pos = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..pos);
        out
    }

    fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

/// Connect 信封解码器
///
/// 从上游响应体中提取完整的 Connect 信封，解压（如需要）并取出
/// `StreamChatResponse.text`。信封可以跨块到达。
///
/// 如果首字节不是合法的 flags，认为上游没有使用信封格式，
/// 剩余数据按纯文本透传。
#[derive(Debug, Default)]
pub struct ConnectChunkDecoder {
    buffer: BytesMut,
    raw: Utf8ChunkDecoder,
    passthrough: bool,
    error: Option<StreamError>,
}

impl ConnectChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_envelope(&mut self, flags: u8, payload: Bytes) -> String {
        let payload = if flags & ENVELOPE_FLAG_COMPRESSED != 0 {
            match gunzip(&payload) {
                Ok(data) => Bytes::from(data),
                Err(e) => {
                    tracing::warn!("[STREAM] 信封解压失败: {}", e);
                    return String::new();
                }
            }
        } else {
            payload
        };

        if flags & ENVELOPE_FLAG_END_STREAM != 0 {
            match serde_json::from_slice::<serde_json::Value>(&payload) {
                Ok(trailer) => {
                    if let Some(error) = trailer.get("error") {
                        tracing::warn!("[STREAM] 上游结束信封携带错误: {}", error);
                        self.error = Some(trailer_error(error));
                    }
                }
                Err(e) => tracing::debug!("[STREAM] 无法解析结束信封: {}", e),
            }
            return String::new();
        }

        match StreamChatResponse::decode(payload.clone()) {
            Ok(message) => message.text,
            Err(e) => {
                tracing::debug!("[STREAM] protobuf 解码失败，按文本处理: {}", e);
                self.raw.decode(&payload)
            }
        }
    }
}

impl ChunkDecoder for ConnectChunkDecoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        if self.passthrough {
            return self.raw.decode(chunk);
        }

        self.buffer.extend_from_slice(chunk);

        let mut out = String::new();
        while !self.buffer.is_empty() && self.error.is_none() {
            let flags = self.buffer[0];
            let len = if self.buffer.len() >= ENVELOPE_HEADER_LEN {
                u32::from_be_bytes([
                    self.buffer[1],
                    self.buffer[2],
                    self.buffer[3],
                    self.buffer[4],
                ]) as usize
            } else {
                0
            };

            if flags & !(ENVELOPE_FLAG_COMPRESSED | ENVELOPE_FLAG_END_STREAM) != 0
                || len > MAX_ENVELOPE_LEN
            {
                tracing::debug!(
                    "[STREAM] 非 Connect 信封数据 (flags={:#04x}, len={})，切换为文本透传",
                    flags,
                    len
                );
                self.passthrough = true;
                let rest = self.buffer.split();
                out.push_str(&self.raw.decode(&rest));
                return out;
            }

            if self.buffer.len() < ENVELOPE_HEADER_LEN + len {
                break;
            }

            self.buffer.advance(ENVELOPE_HEADER_LEN);
            let payload = self.buffer.split_to(len).freeze();
            out.push_str(&self.decode_envelope(flags, payload));
        }
        out
    }

    fn finish(&mut self) -> String {
        if !self.buffer.is_empty() {
            tracing::debug!(
                "[STREAM] 丢弃不完整的信封 ({} 字节)",
                self.buffer.len()
            );
            self.buffer.clear();
        }
        self.raw.finish()
    }

    fn take_error(&mut self) -> Option<StreamError> {
        self.error.take()
    }
}

/// Connect 错误码对应的 HTTP 状态码
fn connect_code_status(code: &str) -> u16 {
    match code {
        "canceled" => 499,
        "invalid_argument" | "failed_precondition" | "out_of_range" => 400,
        "unauthenticated" => 401,
        "permission_denied" => 403,
        "not_found" => 404,
        "already_exists" | "aborted" => 409,
        "resource_exhausted" => 429,
        "unimplemented" => 501,
        "unavailable" => 503,
        "deadline_exceeded" => 504,
        _ => 500,
    }
}

/// 将结束信封中的 `error` 对象转换为 `StreamError::Upstream`
fn trailer_error(error: &serde_json::Value) -> StreamError {
    let code = error
        .get("code")
        .and_then(|c| c.as_str())
        .unwrap_or("unknown");
    StreamError::Upstream {
        status: connect_code_status(code),
        body: error.to_string(),
    }
}

fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// 将字节流适配为解码后的文本流
///
/// 解码结果为空的块不会产出；源出错时产出一个 `StreamError::Source` 并结束，
/// 解码器报告上游错误时先产出已解码的文本，再产出该错误并结束。
pub fn decode_stream<S, E, D>(
    byte_stream: S,
    mut decoder: D,
) -> impl Stream<Item = Result<String, StreamError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    D: ChunkDecoder + 'static,
{
    async_stream::stream! {
        let mut byte_stream = std::pin::pin!(byte_stream);

        while let Some(result) = byte_stream.next().await {
            match result {
                Ok(bytes) => {
                    let text = decoder.decode(&bytes);
                    if !text.is_empty() {
                        yield Ok(text);
                    }
                    if let Some(error) = decoder.take_error() {
                        yield Err(error);
                        return;
                    }
                }
                Err(e) => {
                    yield Err(StreamError::source(e));
                    return;
                }
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            yield Ok(tail);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cursor::encode_envelope;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn text_envelope(text: &str) -> Vec<u8> {
        encode_envelope(&StreamChatResponse {
            text: text.to_string(),
        })
    }

    #[test]
    fn test_utf8_split_multibyte() {
        let mut decoder = Utf8ChunkDecoder::new();
        let bytes = "你好".as_bytes();

        // 在第一个字符中间切开
        let first = decoder.decode(&bytes[..2]);
        assert_eq!(first, "");
        assert_eq!(decoder.pending_len(), 2);

        let second = decoder.decode(&bytes[2..]);
        assert_eq!(second, "你好");
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_utf8_invalid_bytes_replaced() {
        let mut decoder = Utf8ChunkDecoder::new();
        let text = decoder.decode(b"ab\xffcd");
        assert_eq!(text, "ab\u{FFFD}cd");
    }

    #[test]
    fn test_utf8_finish_flushes_incomplete_tail() {
        let mut decoder = Utf8ChunkDecoder::new();
        let bytes = "é".as_bytes();
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_connect_envelope_split_across_chunks() {
        let mut decoder = ConnectChunkDecoder::new();
        let mut body = text_envelope("Hello, ");
        body.extend(text_envelope("world"));

        let mut out = String::new();
        for piece in body.chunks(3) {
            out.push_str(&decoder.decode(piece));
        }
        out.push_str(&decoder.finish());

        assert_eq!(out, "Hello, world");
    }

    #[test]
    fn test_connect_compressed_envelope() {
        let payload = StreamChatResponse {
            text: "压缩内容".to_string(),
        }
        .encode_to_vec();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut frame = vec![ENVELOPE_FLAG_COMPRESSED];
        frame.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        frame.extend_from_slice(&compressed);

        let mut decoder = ConnectChunkDecoder::new();
        assert_eq!(decoder.decode(&frame), "压缩内容");
    }

    fn end_stream_envelope(trailer: &[u8]) -> Vec<u8> {
        let mut frame = vec![ENVELOPE_FLAG_END_STREAM];
        frame.extend_from_slice(&(trailer.len() as u32).to_be_bytes());
        frame.extend_from_slice(trailer);
        frame
    }

    #[test]
    fn test_connect_end_stream_error_reported() {
        let mut body = text_envelope("partial");
        body.extend(end_stream_envelope(
            br#"{"error":{"code":"unauthenticated","message":"bad token"}}"#,
        ));
        body.extend(text_envelope("ignored"));

        let mut decoder = ConnectChunkDecoder::new();
        assert_eq!(decoder.decode(&body), "partial");

        match decoder.take_error() {
            Some(StreamError::Upstream { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("bad token"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(decoder.take_error(), None);
    }

    #[test]
    fn test_connect_clean_end_stream() {
        let mut decoder = ConnectChunkDecoder::new();
        assert_eq!(decoder.decode(&end_stream_envelope(b"{}")), "");
        assert_eq!(decoder.take_error(), None);
    }

    #[test]
    fn test_connect_unknown_error_code() {
        let mut decoder = ConnectChunkDecoder::new();
        decoder.decode(&end_stream_envelope(br#"{"error":{"message":"boom"}}"#));
        assert!(matches!(
            decoder.take_error(),
            Some(StreamError::Upstream { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_decode_stream_ends_on_trailer_error() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from(text_envelope("hi"))),
            Ok(Bytes::from(end_stream_envelope(
                br#"{"error":{"code":"resource_exhausted"}}"#,
            ))),
            Ok(Bytes::from(text_envelope("never"))),
        ];
        let items: Vec<_> = decode_stream(futures::stream::iter(chunks), ConnectChunkDecoder::new())
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("hi".to_string()));
        assert!(matches!(
            items[1],
            Err(StreamError::Upstream { status: 429, .. })
        ));
    }

    #[test]
    fn test_connect_plain_text_passthrough() {
        let mut decoder = ConnectChunkDecoder::new();
        assert_eq!(decoder.decode(b"plain text"), "plain text");
        assert_eq!(decoder.decode(b" continues"), " continues");
    }

    #[tokio::test]
    async fn test_decode_stream_propagates_source_error() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"ok")),
            Err("connection reset".to_string()),
            Ok(Bytes::from_static(b"never")),
        ];
        let items: Vec<_> = decode_stream(futures::stream::iter(chunks), Utf8ChunkDecoder::new())
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("ok".to_string()));
        assert!(matches!(items[1], Err(StreamError::Source(_))));
    }
}
