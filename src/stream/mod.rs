//! 流式处理层
//!
//! 提供上游响应到客户端片段的增量转换能力，包括：
//! - 字节块解码 (decoder)
//! - 正则替换规则 (rules)
//! - 起止标记裁剪的增量转换器 (transformer)
//! - 前端流格式生成 (generators)
//!
//! # 架构设计
//!
//! ```text
//! 上游字节流 ──> [ChunkDecoder] ──> 文本块 ──> [StreamTransformer] ──> 片段 ──> [OpenAiSseGenerator] ──> SSE
//! ```
//!
//! 替换规则只作用于单个文本块；需要跨块匹配的场景应保证上游不会切开模式。

pub mod decoder;
pub mod error;
pub mod generators;
pub mod pipeline;
pub mod rules;
pub mod transformer;

// 重新导出核心类型
pub use decoder::{decode_stream, ChunkDecoder, ConnectChunkDecoder, Utf8ChunkDecoder};
pub use error::{StreamError, TransformError};
pub use generators::OpenAiSseGenerator;
pub use pipeline::{collect_text, create_sse_stream, PipelineConfig};
pub use rules::{apply_rules, parse_rule_specs, RewriteRule, RewriteRuleSpec};
pub use transformer::{StreamTransformer, TransformOptions, TransformerState};
