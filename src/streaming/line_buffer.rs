//! SSE 行重组器
//!
//! 把任意切分的字节 chunk 重组为完整的文本行：
//!
//! - 增量 UTF-8 解码，多字节字符可以跨 chunk 边界
//! - 按 `\n` 切分，去掉行尾的 `\r`
//! - 最后一个不完整片段保留到下一个 chunk
//! - `flush()` 在流结束时把剩余片段作为最后一行输出
//!
//! 空行与 `:` 注释行由调用方丢弃，重组器本身原样输出。

use tracing::warn;

/// SSE 行重组器
#[derive(Debug)]
pub struct SseLineBuffer {
    /// 已解码但尚未遇到换行的片段
    pending: String,
    /// 跨 chunk 边界的不完整 UTF-8 字节
    incomplete_utf8: Vec<u8>,
    /// 单行最大字节数
    max_line_bytes: usize,
    /// 当前行已超限，丢弃直到下一个换行
    discarding: bool,
    /// 因超限被丢弃的行数
    dropped_lines: u32,
}

impl Default for SseLineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SseLineBuffer {
    /// 默认单行上限 (1MB)
    pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self::with_max_line_bytes(Self::DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            pending: String::new(),
            incomplete_utf8: Vec::new(),
            max_line_bytes,
            discarding: false,
            dropped_lines: 0,
        }
    }

    /// 因超限被丢弃的行数
    pub fn dropped_lines(&self) -> u32 {
        self.dropped_lines
    }

    /// 当前保留的片段字节数（不含不完整的 UTF-8 字节）
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 追加一个 chunk，返回其中所有完整的行
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decode(chunk);
        let mut lines = Vec::new();

        let mut rest = text.as_str();
        while let Some(pos) = rest.find('\n') {
            self.pending.push_str(&rest[..pos]);
            rest = &rest[pos + 1..];

            let line = std::mem::take(&mut self.pending);
            if self.discarding || line.len() > self.max_line_bytes {
                self.discarding = false;
                self.record_dropped(line.len());
                continue;
            }
            lines.push(strip_cr(line));
        }

        if !self.discarding {
            self.pending.push_str(rest);
            if self.pending.len() > self.max_line_bytes {
                let len = self.pending.len();
                self.pending.clear();
                self.discarding = true;
                warn!(
                    pending_bytes = len,
                    limit = self.max_line_bytes,
                    "[STREAM] 单行超过缓冲上限，丢弃到下一个换行"
                );
            }
        }

        lines
    }

    /// 流结束时输出剩余片段
    ///
    /// 片段去除首尾空白后非空才作为最后一行返回。
    pub fn flush(&mut self) -> Option<String> {
        let mut fragment = std::mem::take(&mut self.pending);
        if !self.incomplete_utf8.is_empty() {
            let tail = std::mem::take(&mut self.incomplete_utf8);
            fragment.push_str(&String::from_utf8_lossy(&tail));
        }

        if std::mem::take(&mut self.discarding) {
            self.record_dropped(fragment.len());
            return None;
        }

        let trimmed = fragment.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// 增量解码：合法前缀立即输出，末尾不完整的序列留待下一个 chunk，
    /// 中间的非法字节替换为 U+FFFD。
    fn decode(&mut self, chunk: &[u8]) -> String {
        let bytes = if self.incomplete_utf8.is_empty() {
            chunk.to_vec()
        } else {
            let mut combined = std::mem::take(&mut self.incomplete_utf8);
            combined.extend_from_slice(chunk);
            combined
        };

        let mut out = String::with_capacity(bytes.len());
        let mut input = bytes.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = input.split_at(e.valid_up_to());
                    // valid_up_to 之前的字节保证是合法 UTF-8
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &after[len..];
                        }
                        None => {
                            self.incomplete_utf8 = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn record_dropped(&mut self, len: usize) {
        self.dropped_lines += 1;
        warn!(
            line_bytes = len,
            limit = self.max_line_bytes,
            "[STREAM] 丢弃超长行"
        );
    }
}

fn strip_cr(mut line: String) -> String {
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_all(buffer: &mut SseLineBuffer, chunks: &[&[u8]]) -> Vec<String> {
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(buffer.push(chunk));
        }
        lines.extend(buffer.flush());
        lines
    }

    #[test]
    fn test_single_chunk_lines() {
        let mut buffer = SseLineBuffer::new();
        let lines = buffer.push(b"data: a\n\ndata: b\n");
        assert_eq!(lines, vec!["data: a", "", "data: b"]);
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_partial_line_carried_over() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: {\"del").is_empty());
        assert_eq!(buffer.pending_len(), 11);
        let lines = buffer.push(b"ta\":1}\n");
        assert_eq!(lines, vec!["data: {\"delta\":1}"]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut buffer = SseLineBuffer::new();
        let lines = collect_all(&mut buffer, &[b"data: x\r\n\r\n"]);
        assert_eq!(lines, vec!["data: x", ""]);
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut buffer = SseLineBuffer::new();
        let lines = collect_all(&mut buffer, &[b"data: x\r", b"\ndata: y"]);
        assert_eq!(lines, vec!["data: x", "data: y"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let text = "data: 你好\n".as_bytes();
        // "你" 占 3 个字节，从中间切开
        let (a, b) = text.split_at(8);
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(a).is_empty());
        assert_eq!(buffer.push(b), vec!["data: 你好"]);
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let mut buffer = SseLineBuffer::new();
        let lines = buffer.push(b"data: \xff ok\n");
        assert_eq!(lines, vec!["data: \u{FFFD} ok"]);
    }

    #[test]
    fn test_flush_trims_fragment() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: {\"done\":true}  ").is_empty());
        assert_eq!(buffer.flush(), Some("data: {\"done\":true}".to_string()));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_flush_whitespace_only_fragment() {
        let mut buffer = SseLineBuffer::new();
        buffer.push(b"data: a\n   ");
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn test_overlong_line_dropped() {
        let mut buffer = SseLineBuffer::with_max_line_bytes(8);
        let lines = collect_all(&mut buffer, &[b"data: 0123456789", b"abc\ndata: ok\n"]);
        assert_eq!(lines, vec!["data: ok"]);
        assert_eq!(buffer.dropped_lines(), 1);
    }

    #[test]
    fn test_overlong_line_in_single_chunk_dropped() {
        let mut buffer = SseLineBuffer::with_max_line_bytes(8);
        let lines = collect_all(&mut buffer, &[b"data: 0123456789\ndata: ok\n"]);
        assert_eq!(lines, vec!["data: ok"]);
        assert_eq!(buffer.dropped_lines(), 1);
    }

    // ========================================================================
    // 属性测试
    // ========================================================================

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_body() -> impl Strategy<Value = Vec<u8>> {
            prop::collection::vec(
                prop_oneof![
                    "[a-z ]{0,12}".prop_map(|s| format!("data: {}\n", s)),
                    Just("\n".to_string()),
                    Just(": keep-alive\r\n".to_string()),
                    "[你好世界é]{1,4}".prop_map(|s| format!("data: {}\n", s)),
                ],
                0..12,
            )
            .prop_map(|parts| parts.concat().into_bytes())
        }

        fn lines_for(body: &[u8], cuts: &[usize]) -> Vec<String> {
            let mut buffer = SseLineBuffer::new();
            let mut lines = Vec::new();
            let mut start = 0;
            for &cut in cuts {
                lines.extend(buffer.push(&body[start..cut]));
                start = cut;
            }
            lines.extend(buffer.push(&body[start..]));
            lines.extend(buffer.flush());
            lines
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// 任意切分方式得到的行序列都与整体输入一致
            #[test]
            fn prop_chunking_does_not_change_lines(
                body in arb_body(),
                raw_cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
            ) {
                let whole = lines_for(&body, &[]);
                let mut cuts: Vec<usize> = raw_cuts.iter().map(|i| i.index(body.len() + 1)).collect();
                cuts.sort_unstable();
                let split = lines_for(&body, &cuts);
                prop_assert_eq!(whole, split);
            }

            /// 逐字节输入与整体输入一致
            #[test]
            fn prop_byte_by_byte_matches_whole(body in arb_body()) {
                let whole = lines_for(&body, &[]);
                let cuts: Vec<usize> = (1..body.len()).collect();
                prop_assert_eq!(whole, lines_for(&body, &cuts));
            }
        }
    }
}
