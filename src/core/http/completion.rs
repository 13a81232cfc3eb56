use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

/// 一次性完成信号：同一次尝试里数据读取、超时、出错几条路径会竞争完成，
/// 只有第一个调用 [`Completion::finish`] 的结果会被交付，其余静默丢弃。
#[derive(Debug)]
pub struct Completion<T> {
    inner: Arc<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    done: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Completion<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let inner = Inner {
            done: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// 交付结果；返回是否由本次调用完成。
    pub fn finish(&self, value: T) -> bool {
        if self
            .inner
            .done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let tx = match self.inner.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = tx {
            // 接收端已放弃时结果直接丢弃
            let _ = tx.send(value);
        }
        true
    }

    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn second_finish_is_ignored() {
        let (c, mut rx) = Completion::new();
        assert!(!c.is_done());
        assert!(c.finish("data"));
        assert!(!c.clone().finish("timeout"));
        assert!(c.is_done());
        assert_eq!(rx.try_recv().unwrap(), "data");
    }

    #[test]
    fn simultaneous_finishers_deliver_once() {
        for _ in 0..500 {
            let (c, mut rx) = Completion::new();
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = ["read", "timer"]
                .into_iter()
                .map(|who| {
                    let c = c.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        c.finish(who)
                    })
                })
                .collect();
            let wins: usize = handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum();
            assert_eq!(wins, 1);
            let got = rx.try_recv().unwrap();
            assert!(got == "read" || got == "timer");
        }
    }

    #[test]
    fn finish_after_receiver_dropped() {
        let (c, rx) = Completion::new();
        drop(rx);
        assert!(c.finish(1u8));
        assert!(!c.finish(2u8));
    }
}
