//! SSE 流生成器
//!
//! 将转换器产出的文本片段转换为前端协议的 SSE 格式。

pub mod openai_sse;

pub use openai_sse::OpenAiSseGenerator;
