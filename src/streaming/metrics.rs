//! 流式传输指标类型
//!
//! 每个回合一份，回合结束时写入日志。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 流式传输指标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetrics {
    /// 首字节时间（毫秒）
    ///
    /// 从后端流打开到收到第一个 chunk 的时间。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttfb_ms: Option<u64>,

    /// 接收到的后端 chunk 总数
    pub chunk_count: u32,

    /// 接收到的总字节数
    pub total_bytes: usize,

    pub start_time: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_chunk_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_time: Option<DateTime<Utc>>,

    /// 无法解析而被跳过的 data 行
    pub parse_error_count: u32,

    /// 提交/打开流的重试次数
    pub retry_count: u32,

    /// 因超过单行上限被丢弃的行数
    pub buffer_overflow_count: u32,
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self {
            ttfb_ms: None,
            chunk_count: 0,
            total_bytes: 0,
            start_time: Utc::now(),
            end_time: None,
            first_chunk_time: None,
            last_chunk_time: None,
            parse_error_count: 0,
            retry_count: 0,
            buffer_overflow_count: 0,
        }
    }
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录收到一个 chunk，第一个 chunk 同时记录 TTFB
    pub fn record_chunk(&mut self, bytes: usize) {
        let now = Utc::now();
        self.chunk_count += 1;
        self.total_bytes += bytes;
        self.last_chunk_time = Some(now);

        if self.first_chunk_time.is_none() {
            self.first_chunk_time = Some(now);
            self.ttfb_ms = Some((now - self.start_time).num_milliseconds().max(0) as u64);
        }
    }

    pub fn record_parse_error(&mut self) {
        self.parse_error_count += 1;
    }

    pub fn record_retries(&mut self, count: u32) {
        self.retry_count += count;
    }

    /// 记录结束时间，重复调用保留第一次的时间
    pub fn finish(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// 总耗时（毫秒），未结束时计算到现在
    pub fn duration_ms(&self) -> u64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds().max(0) as u64
    }

    /// 吞吐量（字节/秒），耗时为 0 时返回 None
    pub fn throughput_bytes_per_sec(&self) -> Option<f64> {
        let duration_ms = self.duration_ms();
        if duration_ms == 0 {
            return None;
        }
        Some(self.total_bytes as f64 / (duration_ms as f64 / 1000.0))
    }

    /// 记录指标到日志
    pub fn log_metrics(&self, request_id: &str) {
        let throughput = self.throughput_bytes_per_sec().unwrap_or(0.0);

        info!(
            request_id = %request_id,
            chunk_count = self.chunk_count,
            total_bytes = self.total_bytes,
            duration_ms = self.duration_ms(),
            ttfb_ms = ?self.ttfb_ms,
            throughput_kbps = format!("{:.2}", throughput / 1024.0),
            retry_count = self.retry_count,
            parse_error_count = self.parse_error_count,
            buffer_overflow_count = self.buffer_overflow_count,
            "[STREAM] 回合指标"
        );
    }
}

// ============================================================================
// 测试模块
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_stream_metrics_default() {
        let metrics = StreamMetrics::default();
        assert_eq!(metrics.chunk_count, 0);
        assert_eq!(metrics.total_bytes, 0);
        assert!(metrics.ttfb_ms.is_none());
        assert!(!metrics.is_finished());
    }

    #[test]
    fn test_stream_metrics_record_chunk() {
        let mut metrics = StreamMetrics::new();
        sleep(Duration::from_millis(10));

        metrics.record_chunk(100);
        assert_eq!(metrics.chunk_count, 1);
        assert!(metrics.ttfb_ms.unwrap() >= 10);
        let first = metrics.first_chunk_time;

        metrics.record_chunk(200);
        assert_eq!(metrics.chunk_count, 2);
        assert_eq!(metrics.total_bytes, 300);
        assert_eq!(metrics.first_chunk_time, first);
    }

    #[test]
    fn test_stream_metrics_finish_is_sticky() {
        let mut metrics = StreamMetrics::new();
        metrics.finish();
        let end = metrics.end_time;
        sleep(Duration::from_millis(5));
        metrics.finish();
        assert_eq!(metrics.end_time, end);
    }

    #[test]
    fn test_stream_metrics_counters() {
        let mut metrics = StreamMetrics::new();
        metrics.record_chunk(1024);
        metrics.record_chunk(2048);
        metrics.record_retries(2);
        metrics.record_parse_error();
        metrics.finish();

        assert_eq!(metrics.chunk_count, 2);
        assert_eq!(metrics.total_bytes, 3072);
        assert_eq!(metrics.retry_count, 2);
        assert_eq!(metrics.parse_error_count, 1);

        metrics.log_metrics("req-1");
    }
}
