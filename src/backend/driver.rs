//! 后端回合驱动
//!
//! 状态机：
//!
//! ```text
//! IDLE → SUBMITTING → SUBMIT_FAILED → IDLE_WAIT → SUBMITTING
//!                   → STREAM_OPENING → BUSY → IDLE_WAIT → SUBMITTING
//!                                    → STREAMING（终态）
//!                                    → FAILED（终态）
//! ```
//!
//! 忙碌会使正在进行的尝试失效，所以每次重试都重新提交同一份提示词。

use crate::backend::client::SessionBackend;
use crate::backend::error::BackendError;
use crate::config::RetrySettings;
use crate::streaming::traits::StreamResponse;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 回合状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Submitting,
    SubmitFailed,
    IdleWait,
    StreamOpening,
    Busy,
    Streaming,
    Failed,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Streaming | TurnState::Failed)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Idle => "IDLE",
            TurnState::Submitting => "SUBMITTING",
            TurnState::SubmitFailed => "SUBMIT_FAILED",
            TurnState::IdleWait => "IDLE_WAIT",
            TurnState::StreamOpening => "STREAM_OPENING",
            TurnState::Busy => "BUSY",
            TurnState::Streaming => "STREAMING",
            TurnState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// 已打开的后端事件流
pub struct TurnHandle {
    pub stream: StreamResponse,
    /// 打开事件流所用的尝试次数（从 1 开始）
    pub attempts: u32,
}

impl fmt::Debug for TurnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnHandle")
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

/// 回合驱动器
#[derive(Clone)]
pub struct TurnDriver {
    backend: Arc<dyn SessionBackend>,
    retry: RetrySettings,
}

impl fmt::Debug for TurnDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnDriver")
            .field("backend", &self.backend.name())
            .field("retry", &self.retry)
            .finish()
    }
}

impl TurnDriver {
    pub fn new(backend: Arc<dyn SessionBackend>, retry: RetrySettings) -> Self {
        Self { backend, retry }
    }

    /// 提交提示词，返回后端是否接受
    ///
    /// 任何失败都视为未接受，不向上抛出。
    pub async fn submit_prompt(&self, text: &str) -> bool {
        match self.backend.submit_message(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[DRIVER] 提示词提交失败: {}", e);
                false
            }
        }
    }

    /// 轮询会话探测直到后端空闲或超过 `max_wait`
    ///
    /// 返回后端是否已空闲。超时只记录日志，调用方照常继续；
    /// 探测端点返回终止性错误时不再等待。
    pub async fn await_idle(&self, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        let mut polls = 0u32;

        loop {
            polls += 1;
            match self.backend.probe_session().await {
                Ok(()) => {
                    debug!("[DRIVER] 后端空闲: polls={}", polls);
                    return true;
                }
                Err(e) if e.is_retryable() => {
                    debug!("[DRIVER] 后端尚未空闲: polls={} reason={}", polls, e)
                }
                Err(e) => {
                    warn!("[DRIVER] 会话探测失败，停止等待: polls={} error={}", polls, e);
                    return false;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "[DRIVER] 等待后端空闲超时，继续尝试: waited_ms={} polls={}",
                    max_wait.as_millis(),
                    polls
                );
                return false;
            }
            let remaining = deadline - now;
            tokio::time::sleep(self.retry.poll_interval().min(remaining)).await;
        }
    }

    /// 驱动一个回合直到事件流打开
    ///
    /// 总尝试次数为 `max_retries`（至少 1 次）。
    pub async fn drive_turn(&self, text: &str, max_retries: u32) -> Result<TurnHandle, BackendError> {
        let attempts = max_retries.max(1);
        let mut state = TurnState::Idle;
        let mut last_failure = TurnState::Idle;

        for attempt in 1..=attempts {
            if attempt > 1 {
                transition(&mut state, TurnState::IdleWait, attempt);
                self.await_idle(self.retry.idle_wait()).await;
            }

            transition(&mut state, TurnState::Submitting, attempt);
            if !self.submit_prompt(text).await {
                transition(&mut state, TurnState::SubmitFailed, attempt);
                last_failure = TurnState::SubmitFailed;
                continue;
            }

            transition(&mut state, TurnState::StreamOpening, attempt);
            match self.backend.open_stream().await {
                Ok(stream) => {
                    transition(&mut state, TurnState::Streaming, attempt);
                    return Ok(TurnHandle { stream, attempts: attempt });
                }
                Err(e) if e.is_busy() => {
                    transition(&mut state, TurnState::Busy, attempt);
                    last_failure = TurnState::Busy;
                }
                Err(e) => {
                    transition(&mut state, TurnState::Failed, attempt);
                    warn!("[DRIVER] 打开事件流失败，不再重试: {}", e);
                    return Err(e);
                }
            }
        }

        transition(&mut state, TurnState::Failed, attempts);
        let err = if last_failure == TurnState::Busy {
            BackendError::BusyExhausted { attempts }
        } else {
            BackendError::Unreachable { attempts }
        };
        warn!("[DRIVER] 重试耗尽: attempts={} error={}", attempts, err);
        Err(err)
    }
}

fn transition(state: &mut TurnState, next: TurnState, attempt: u32) {
    if next.is_terminal() {
        info!("[DRIVER] 状态转换: {} → {} (attempt={})", state, next, attempt);
    } else {
        debug!("[DRIVER] 状态转换: {} → {} (attempt={})", state, next, attempt);
    }
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 按脚本返回结果的后端，记录所有调用
    #[derive(Default)]
    struct ScriptedBackend {
        probes: Mutex<VecDeque<Result<(), BackendError>>>,
        submits: Mutex<VecDeque<Result<(), BackendError>>>,
        opens: Mutex<VecDeque<Result<(), BackendError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionBackend for ScriptedBackend {
        async fn probe_session(&self) -> Result<(), BackendError> {
            self.calls.lock().unwrap().push("probe".into());
            self.probes.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        async fn submit_message(&self, text: &str) -> Result<(), BackendError> {
            self.calls.lock().unwrap().push(format!("submit:{}", text));
            self.submits.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        async fn open_stream(&self) -> Result<StreamResponse, BackendError> {
            self.calls.lock().unwrap().push("open".into());
            self.opens.lock().unwrap().pop_front().unwrap_or(Ok(()))?;
            Ok(Box::pin(stream::iter(vec![Ok(Bytes::from_static(b"data: [DONE]\n"))])))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn fast_retry() -> RetrySettings {
        RetrySettings {
            max_retries: 4,
            idle_wait_ms: 200,
            poll_interval_ms: 5,
        }
    }

    fn driver(backend: Arc<ScriptedBackend>) -> TurnDriver {
        TurnDriver::new(backend, fast_retry())
    }

    fn busy() -> BackendError {
        BackendError::Busy { status: 409 }
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let backend = Arc::new(ScriptedBackend::default());
        let handle = driver(backend.clone()).drive_turn("[User]\nhi", 4).await.unwrap();

        assert_eq!(handle.attempts, 1);
        assert_eq!(backend.calls(), vec!["submit:[User]\nhi", "open"]);
    }

    #[tokio::test]
    async fn test_busy_stream_open_resubmits_once() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.opens.lock().unwrap().push_back(Err(busy()));

        let handle = driver(backend.clone()).drive_turn("p", 4).await.unwrap();

        assert_eq!(handle.attempts, 2);
        assert_eq!(
            backend.calls(),
            vec!["submit:p", "open", "probe", "submit:p", "open"]
        );
    }

    #[tokio::test]
    async fn test_busy_exhaustion() {
        let backend = Arc::new(ScriptedBackend::default());
        for _ in 0..3 {
            backend.opens.lock().unwrap().push_back(Err(busy()));
        }

        let err = driver(backend.clone()).drive_turn("p", 3).await.unwrap_err();

        assert_eq!(err, BackendError::BusyExhausted { attempts: 3 });
        let submits = backend.calls().iter().filter(|c| c.starts_with("submit")).count();
        assert_eq!(submits, 3);
    }

    #[tokio::test]
    async fn test_submit_failures_exhaust_as_unreachable() {
        let backend = Arc::new(ScriptedBackend::default());
        for _ in 0..2 {
            backend
                .submits
                .lock()
                .unwrap()
                .push_back(Err(BackendError::Transport("refused".into())));
        }

        let err = driver(backend.clone()).drive_turn("p", 2).await.unwrap_err();

        assert_eq!(err, BackendError::Unreachable { attempts: 2 });
        assert!(!backend.calls().contains(&"open".to_string()));
    }

    #[tokio::test]
    async fn test_submit_failure_then_success() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.submits.lock().unwrap().push_back(Err(busy()));

        let handle = driver(backend.clone()).drive_turn("p", 4).await.unwrap();
        assert_eq!(handle.attempts, 2);
    }

    #[tokio::test]
    async fn test_hard_failure_not_retried() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.opens.lock().unwrap().push_back(Err(BackendError::Http {
            status: 500,
            message: "boom".into(),
        }));

        let err = driver(backend.clone()).drive_turn("p", 4).await.unwrap_err();

        assert!(matches!(err, BackendError::Http { status: 500, .. }));
        assert_eq!(backend.calls(), vec!["submit:p", "open"]);
    }

    #[tokio::test]
    async fn test_await_idle_polls_until_success() {
        let backend = Arc::new(ScriptedBackend::default());
        {
            let mut probes = backend.probes.lock().unwrap();
            probes.push_back(Err(busy()));
            probes.push_back(Err(BackendError::Transport("reset".into())));
        }

        let idle = driver(backend.clone()).await_idle(Duration::from_secs(1)).await;

        assert!(idle);
        assert_eq!(backend.calls(), vec!["probe", "probe", "probe"]);
    }

    #[tokio::test]
    async fn test_await_idle_gives_up_after_max_wait() {
        let backend = Arc::new(ScriptedBackend::default());
        {
            let mut probes = backend.probes.lock().unwrap();
            for _ in 0..1000 {
                probes.push_back(Err(busy()));
            }
        }

        let started = std::time::Instant::now();
        let idle = driver(backend).await_idle(Duration::from_millis(50)).await;

        assert!(!idle);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_await_idle_stops_on_terminal_probe_error() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.probes.lock().unwrap().push_back(Err(BackendError::Http {
            status: 404,
            message: "no session".into(),
        }));

        let idle = driver(backend.clone()).await_idle(Duration::from_secs(5)).await;

        assert!(!idle);
        assert_eq!(backend.calls(), vec!["probe"]);
    }

    #[test]
    fn test_turn_state_display() {
        assert_eq!(TurnState::StreamOpening.to_string(), "STREAM_OPENING");
        assert!(TurnState::Streaming.is_terminal());
        assert!(!TurnState::Busy.is_terminal());
    }
}
