//! 增量响应转换器
//!
//! 消费解码后的文本块，依次完成：
//! 1. 对当前块应用替换规则（只作用于本块，不跨块匹配）
//! 2. 追加到待发送缓冲区
//! 3. 未遇到起始标记前不输出任何内容；遇到后丢弃标记及其之前的文本
//! 4. 配置了结束标记时，遇到标记即输出标记前的文本并结束；
//!    否则保留末尾 `len(结束标记) - 1` 个字符，防止标记被切在两个块之间
//! 5. 未配置结束标记时，整个缓冲区直接输出
//! 6. 源结束时输出缓冲区剩余内容（可能为空）
//!
//! 每个请求拥有独立的 `StreamTransformer`，不存在跨请求共享的可变状态。

use futures::{Stream, StreamExt};

use super::error::{StreamError, TransformError};
use super::rules::{apply_rules, RewriteRule, RewriteRuleSpec};

/// 转换选项，每个请求构造一次
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// 起始标记：第一次出现之前（含标记）的文本全部丢弃
    pub start_marker: Option<String>,
    /// 结束标记：第一次出现处（含标记）及之后的文本全部丢弃，并结束流
    pub end_marker: Option<String>,
    /// 替换规则，按顺序应用
    pub rules: Vec<RewriteRule>,
}

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置起始标记，空字符串视为未配置
    pub fn with_start_marker(mut self, marker: impl Into<String>) -> Self {
        self.start_marker = non_empty(marker.into());
        self
    }

    /// 设置结束标记，空字符串视为未配置
    pub fn with_end_marker(mut self, marker: impl Into<String>) -> Self {
        self.end_marker = non_empty(marker.into());
        self
    }

    pub fn with_rules(mut self, rules: Vec<RewriteRule>) -> Self {
        self.rules = rules;
        self
    }

    /// 从请求元数据构造，规则在此处编译
    ///
    /// 非法正则在这里以 `TransformError` 返回，流开始后不会再出现配置错误。
    pub fn from_specs(
        start_marker: Option<String>,
        end_marker: Option<String>,
        specs: &[RewriteRuleSpec],
    ) -> Result<Self, TransformError> {
        let rules = specs
            .iter()
            .map(RewriteRule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            start_marker: start_marker.and_then(non_empty),
            end_marker: end_marker.and_then(non_empty),
            rules,
        })
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// 转换器状态
#[derive(Debug, Default)]
pub struct TransformerState {
    /// 已接收但尚不能安全输出的文本
    pub pending_buffer: String,
    /// 是否已越过起始标记（未配置起始标记时初始即为 true）
    pub has_passed_start: bool,
    /// 是否已结束（遇到结束标记或源耗尽）
    pub is_done: bool,
}

impl TransformerState {
    pub fn new(options: &TransformOptions) -> Self {
        Self {
            pending_buffer: String::new(),
            has_passed_start: options.start_marker.is_none(),
            is_done: false,
        }
    }

    /// 处理一个解码后的文本块，返回可以立即输出的片段
    pub fn feed(&mut self, options: &TransformOptions, chunk: String) -> Option<String> {
        if self.is_done {
            return None;
        }

        let chunk = apply_rules(&options.rules, chunk);
        if chunk.is_empty() {
            return None;
        }
        self.pending_buffer.push_str(&chunk);

        if !self.has_passed_start {
            let marker = options.start_marker.as_deref().unwrap_or_default();
            match self.pending_buffer.find(marker) {
                Some(idx) => {
                    tracing::debug!("[STREAM] 找到起始标记");
                    self.has_passed_start = true;
                    self.pending_buffer.drain(..idx + marker.len());
                }
                None => {
                    // 标记之前的文本永远不会输出，只需保留可能是标记前缀的尾部
                    let keep = marker.chars().count().saturating_sub(1);
                    let split = tail_split_index(&self.pending_buffer, keep);
                    self.pending_buffer.drain(..split);
                    return None;
                }
            }
        }

        match options.end_marker.as_deref() {
            Some(marker) => {
                if let Some(idx) = self.pending_buffer.find(marker) {
                    tracing::debug!("[STREAM] 找到结束标记");
                    self.is_done = true;
                    let mut fragment = std::mem::take(&mut self.pending_buffer);
                    fragment.truncate(idx);
                    return Some(fragment);
                }

                let keep = marker.chars().count().saturating_sub(1);
                let split = tail_split_index(&self.pending_buffer, keep);
                if split == 0 {
                    return None;
                }
                let tail = self.pending_buffer.split_off(split);
                Some(std::mem::replace(&mut self.pending_buffer, tail))
            }
            None => {
                if self.pending_buffer.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut self.pending_buffer))
                }
            }
        }
    }

    /// 源耗尽时调用
    ///
    /// 已越过起始标记时返回剩余缓冲区（可能为空）；从未遇到起始标记则不输出。
    pub fn finish(&mut self) -> Option<String> {
        if self.is_done {
            return None;
        }
        self.is_done = true;

        let remaining = std::mem::take(&mut self.pending_buffer);
        if self.has_passed_start {
            Some(remaining)
        } else {
            tracing::debug!("[STREAM] 源已结束但未找到起始标记，无输出");
            None
        }
    }
}

/// 返回保留末尾 `keep` 个字符时的切分位置（字节下标，总在字符边界上）
fn tail_split_index(s: &str, keep: usize) -> usize {
    if keep == 0 {
        return s.len();
    }
    s.char_indices()
        .rev()
        .nth(keep - 1)
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

/// 增量响应转换器
///
/// 持有文本源和独立的状态，通过 `process()` 产出片段流。
/// 丢弃返回的流即丢弃源，不会再向上游请求数据。
pub struct StreamTransformer<S> {
    source: S,
    options: TransformOptions,
    state: TransformerState,
}

impl<S> StreamTransformer<S>
where
    S: Stream<Item = Result<String, StreamError>> + Send + 'static,
{
    pub fn new(source: S, options: TransformOptions) -> Self {
        let state = TransformerState::new(&options);
        Self {
            source,
            options,
            state,
        }
    }

    /// 产出清理后的文本片段
    ///
    /// 源出错时产出一个 `Err` 并结束，之后不再有片段。
    pub fn process(self) -> impl Stream<Item = Result<String, StreamError>> {
        let Self {
            source,
            options,
            mut state,
        } = self;

        async_stream::stream! {
            let mut source = std::pin::pin!(source);

            while let Some(item) = source.next().await {
                match item {
                    Ok(text) => {
                        if let Some(fragment) = state.feed(&options, text) {
                            yield Ok(fragment);
                        }
                        if state.is_done {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("[STREAM] 源流失败: {}", e);
                        yield Err(e);
                        return;
                    }
                }
            }

            if let Some(fragment) = state.finish() {
                yield Ok(fragment);
            }
        }
    }
}
