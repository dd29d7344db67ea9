//! 单槽位、至多一次投递的异步错误通道
//!
//! Bean 在运行期间可能遇到很多错误，但容器只承诺暴露第一个：
//! 通道容量为 1，第一次 `fire_error` 之后的所有错误都会被丢弃。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

pub use tokio::sync::mpsc::error::TryRecvError;

/// 可以暴露错误通道的对象（容器本身，以及持有 ErrorEmitter 的 Bean）
pub trait Errorer: Send + Sync {
    /// 获取只读的错误接收端
    fn error_ch(&self) -> ErrorReceiver;
}

/// 错误发射器
///
/// 打开状态下接受第一个错误；之后进入"已触发"状态，忽略后续错误；
/// 关闭后（由容器在 shutdown 时驱动）所有 fire 都是空操作。
pub struct ErrorEmitter {
    /// 发送端，None 表示已关闭；同时用于串行化 fire 和 close
    sender: Mutex<Option<mpsc::Sender<anyhow::Error>>>,

    /// 一次性保护
    fired: AtomicBool,

    receiver: ErrorReceiver,
}

impl ErrorEmitter {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            sender: Mutex::new(Some(tx)),
            fired: AtomicBool::new(false),
            receiver: ErrorReceiver::new(rx),
        }
    }

    /// 发送错误，至多投递一次，永不阻塞
    pub fn fire_error(&self, err: impl Into<anyhow::Error>) {
        let sender = self.sender.lock();

        let Some(tx) = sender.as_ref() else {
            tracing::trace!("Error emitter is closed, dropping error");
            return;
        };

        if self.fired.swap(true, Ordering::AcqRel) {
            tracing::trace!("Error emitter already fired, dropping error");
            return;
        }

        // 容量为 1 且只发送一次，try_send 只会在接收端全部释放时失败
        if let Err(e) = tx.try_send(err.into()) {
            tracing::warn!("Failed to deliver error: {}", e);
        }
    }

    /// 关闭发射器：释放发送端，关闭通道
    ///
    /// 已缓冲的错误仍可被读取，读完后接收端观察到通道关闭。
    /// 关闭后由 sender 为 None 拦截 fire，`has_fired` 保持原值。
    pub(crate) fn close(&self) {
        let mut sender = self.sender.lock();
        if sender.take().is_some() {
            tracing::trace!("Error emitter closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// 是否真正接受过一个错误（仅关闭不算）
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl Default for ErrorEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Errorer for ErrorEmitter {
    fn error_ch(&self) -> ErrorReceiver {
        self.receiver.clone()
    }
}

impl fmt::Debug for ErrorEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorEmitter")
            .field("fired", &self.has_fired())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 错误接收端
///
/// 可以克隆，所有克隆共享同一个队列：每个错误只会被其中一个接收者读到。
#[derive(Clone)]
pub struct ErrorReceiver {
    inner: Arc<tokio::sync::Mutex<mpsc::Receiver<anyhow::Error>>>,
}

impl ErrorReceiver {
    fn new(rx: mpsc::Receiver<anyhow::Error>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    /// 等待下一个错误；通道关闭且已读空时返回 None
    pub async fn recv(&self) -> Option<anyhow::Error> {
        self.inner.lock().await.recv().await
    }

    /// 非阻塞读取
    ///
    /// 另一个接收者正在等待时，当前没有可读的值，返回 `Empty`。
    pub fn try_recv(&self) -> Result<anyhow::Error, TryRecvError> {
        match self.inner.try_lock() {
            Ok(mut rx) => rx.try_recv(),
            Err(_) => Err(TryRecvError::Empty),
        }
    }
}

impl fmt::Debug for ErrorReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReceiver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_only_first_error_is_delivered() {
        let emitter = ErrorEmitter::new();
        let rx = emitter.error_ch();

        emitter.fire_error(anyhow::anyhow!("raised"));
        emitter.fire_error(anyhow::anyhow!("other"));

        assert!(emitter.has_fired());
        assert_eq!(rx.try_recv().unwrap().to_string(), "raised");
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_fire_after_close_is_noop() {
        let emitter = ErrorEmitter::new();
        let rx = emitter.error_ch();

        emitter.close();
        emitter.fire_error(anyhow::anyhow!("late"));

        assert!(emitter.is_closed());
        assert!(!emitter.has_fired());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn test_has_fired_tracks_delivery_not_close() {
        let idle = ErrorEmitter::new();
        idle.close();
        assert!(!idle.has_fired());

        let fired = ErrorEmitter::new();
        fired.fire_error(anyhow::anyhow!("raised"));
        fired.close();
        assert!(fired.has_fired());
    }

    #[test]
    fn test_close_is_idempotent() {
        let emitter = ErrorEmitter::new();
        emitter.close();
        emitter.close();
        assert!(emitter.is_closed());
    }

    #[tokio::test]
    async fn test_buffered_error_survives_close() {
        let emitter = ErrorEmitter::new();
        let rx = emitter.error_ch();

        emitter.fire_error(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        emitter.close();

        assert_eq!(rx.recv().await.unwrap().to_string(), "disk full");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_recv_waits_for_fire() {
        let emitter = Arc::new(ErrorEmitter::new());
        let rx = emitter.error_ch();

        let firing = Arc::clone(&emitter);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            firing.fire_error(anyhow::anyhow!("from task"));
        });

        let err = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("error should arrive")
            .expect("channel should be open");
        assert_eq!(err.to_string(), "from task");
    }

    #[tokio::test]
    async fn test_recv_unblocks_on_close() {
        let emitter = Arc::new(ErrorEmitter::new());
        let rx = emitter.error_ch();

        let waiter = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        emitter.close();

        let received = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
        assert!(received.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fires_deliver_exactly_one() {
        let emitter = Arc::new(ErrorEmitter::new());
        let rx = emitter.error_ch();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let emitter = Arc::clone(&emitter);
                tokio::spawn(async move { emitter.fire_error(anyhow::anyhow!("error {}", i)) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        emitter.close();

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
