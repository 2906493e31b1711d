//! 回合串行队列
//!
//! 后端同一时间只允许一个回合。所有请求通过单槽公平互斥锁排队：
//! 先到先服务，前一个回合完全结束（成功或失败）后下一个才开始。
//! 某个回合失败不会影响后续排队的回合。

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// 回合串行队列
#[derive(Debug, Clone, Default)]
pub struct TurnQueue {
    lock: Arc<Mutex<()>>,
    depth: Arc<AtomicUsize>,
    next_ticket: Arc<AtomicU64>,
}

/// 队列槽位
///
/// 持有期间独占后端，drop 时释放给下一个等待者。
#[derive(Debug)]
pub struct TurnSlot {
    ticket: u64,
    _guard: OwnedMutexGuard<()>,
    _depth: DepthGuard,
}

impl TurnSlot {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl Drop for TurnSlot {
    fn drop(&mut self) {
        debug!("[QUEUE] 释放槽位: ticket={}", self.ticket);
    }
}

/// 排队与执行中的计数，等待被取消时同样会回退
#[derive(Debug)]
struct DepthGuard(Arc<AtomicUsize>);

impl DepthGuard {
    fn enter(depth: &Arc<AtomicUsize>) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self(depth.clone())
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TurnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 等待并获取槽位
    pub async fn acquire(&self) -> TurnSlot {
        let depth = DepthGuard::enter(&self.depth);
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        debug!("[QUEUE] 进入队列: ticket={} depth={}", ticket, self.depth());

        let guard = self.lock.clone().lock_owned().await;
        debug!("[QUEUE] 获得槽位: ticket={}", ticket);

        TurnSlot {
            ticket,
            _guard: guard,
            _depth: depth,
        }
    }

    /// 在槽位内执行一个任务，任务结束后释放槽位
    pub async fn enqueue<F, Fut, T>(&self, thunk: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _slot = self.acquire().await;
        thunk().await
    }

    /// 当前排队与执行中的回合数
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_without_overlap() {
        let queue = TurnQueue::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let tasks = (0..5).map(|i| {
            let queue = queue.clone();
            let log = log.clone();
            async move {
                queue
                    .enqueue(|| async {
                        log.lock().unwrap().push(format!("start{}", i));
                        // 越早的任务睡得越久，如果有重叠顺序就会乱
                        tokio::time::sleep(Duration::from_millis(25 - i * 5)).await;
                        log.lock().unwrap().push(format!("end{}", i));
                    })
                    .await
            }
        });
        join_all(tasks).await;

        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("start{}", i), format!("end{}", i)])
            .collect();
        assert_eq!(*log.lock().unwrap(), expected);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_queue() {
        let queue = TurnQueue::new();

        let first: Result<(), &str> = queue.enqueue(|| async { Err("boom") }).await;
        let second: Result<u32, &str> = queue.enqueue(|| async { Ok(7) }).await;

        assert_eq!(first, Err("boom"));
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn test_slot_held_until_dropped() {
        let queue = TurnQueue::new();
        let slot = queue.acquire().await;
        assert_eq!(queue.depth(), 1);

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.acquire().await.ticket() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert_eq!(queue.depth(), 2);

        drop(slot);
        assert_eq!(waiter.await.unwrap(), 1);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_depth() {
        let queue = TurnQueue::new();
        let _slot = queue.acquire().await;

        let result = tokio::time::timeout(Duration::from_millis(10), queue.acquire()).await;
        assert!(result.is_err());
        assert_eq!(queue.depth(), 1);
    }
}
