use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use pixiv_direct_lib::core::ip_pool::{DohRecord, HostResolver};

/// 记录调用次数；`answer` 为空时模拟解析失败。
#[derive(Default)]
pub struct CountingResolver {
    calls: AtomicUsize,
    answer: Mutex<Option<String>>,
}

impl CountingResolver {
    pub fn answering(ip: &str) -> Self {
        let r = Self::default();
        *r.answer.lock().unwrap() = Some(ip.to_string());
        r
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostResolver for CountingResolver {
    async fn resolve(&self, _host: &str) -> Option<DohRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .lock()
            .unwrap()
            .clone()
            .map(|ip| DohRecord { ip, ttl: 300 })
    }
}
