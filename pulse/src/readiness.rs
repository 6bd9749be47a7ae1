//! # 就绪通知
//!
//! 每个会话纪元只触发一次；消费循环在重新进入消费调用前通过 `reset` 换上新的纪元。

use std::{
    future::Future,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::Notify;

#[derive(Default)]
struct Epoch {
    fired: AtomicBool,
    notify: Notify,
}

/// 就绪通知状态
#[derive(Default)]
pub struct Readiness {
    current: Mutex<Arc<Epoch>>,
}

impl Readiness {
    /// 构造未就绪的通知
    pub fn new() -> Self {
        Self::default()
    }

    fn epoch(&self) -> Arc<Epoch> {
        Arc::clone(&self.current.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// 触发当前纪元的就绪通知
    ///
    /// 当前纪元已触发时返回 `false`，不会重复通知。
    pub fn signal(&self) -> bool {
        let epoch = self.epoch();
        if epoch.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        epoch.notify.notify_waiters();
        true
    }

    /// 换上新的纪元
    pub fn reset(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(Epoch::default());
    }

    /// 当前纪元是否已就绪
    pub fn is_ready(&self) -> bool {
        self.epoch().fired.load(Ordering::SeqCst)
    }

    /// 等待调用时刻所在纪元的就绪通知
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let epoch = self.epoch();
        async move {
            loop {
                let notified = epoch.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if epoch.fired.load(Ordering::SeqCst) {
                    return;
                }
                notified.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, timeout};

    #[test]
    fn signal_fires_once_per_epoch() {
        let ready = Readiness::new();
        assert!(!ready.is_ready());
        assert!(ready.signal());
        assert!(!ready.signal());
        assert!(ready.is_ready());
        ready.reset();
        assert!(!ready.is_ready());
        assert!(ready.signal());
    }

    #[tokio::test]
    async fn wait_after_signal_returns() {
        let ready = Readiness::new();
        ready.signal();
        timeout(Duration::from_millis(100), ready.wait())
            .await
            .expect("已就绪的纪元应立即返回");
    }

    #[tokio::test]
    async fn wait_is_bound_to_its_epoch() {
        let ready = Arc::new(Readiness::new());
        let first = ready.wait();
        ready.signal();
        ready.reset();
        timeout(Duration::from_millis(100), first)
            .await
            .expect("旧纪元已触发");
        let second = ready.wait();
        assert!(timeout(Duration::from_millis(50), second).await.is_err());
    }

    #[tokio::test]
    async fn waiter_wakes_on_signal() {
        let ready = Arc::new(Readiness::new());
        let waiter = tokio::spawn(ready.wait());
        tokio::task::yield_now().await;
        let signaller = Arc::clone(&ready);
        tokio::spawn(async move { signaller.signal() });
        timeout(Duration::from_millis(500), waiter)
            .await
            .expect("应在超时前就绪")
            .unwrap();
    }
}
