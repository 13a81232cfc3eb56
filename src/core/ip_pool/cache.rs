//! 两级 IP 缓存：进程内 LRU（容量有限）+ 持久化键值存储（权威来源）。
//!
//! 刷新通过 [`HostResolver`] 完成，并受冷却时间约束：即使解析失败也会记录刷新时间，
//! 避免在解析器不可用时反复请求。

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use lru::LruCache;

use crate::core::config::model::IpCacheCfg;

use super::dns::HostResolver;
use super::store::KvStore;

pub const IP_CACHE_KEY_PREFIX: &str = "pixiv_ip_cache_";
pub const REFRESH_KEY_PREFIX: &str = "pixiv_refresh_at_";

pub fn cache_key(host: &str) -> String {
    format!("{IP_CACHE_KEY_PREFIX}{host}")
}

pub fn refresh_key(host: &str) -> String {
    format!("{REFRESH_KEY_PREFIX}{host}")
}

pub fn current_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn memory_tier(capacity: usize) -> LruCache<String, String> {
    LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
}

#[derive(Debug)]
struct CacheState {
    memory: LruCache<String, String>,
    refreshed_at_ms: HashMap<String, i64>,
}

/// 主机名 → 最近可用 IP 的缓存服务。
pub struct IpCache {
    store: KvStore,
    resolver: Arc<dyn HostResolver>,
    cooldown: Duration,
    state: Mutex<CacheState>,
}

impl IpCache {
    pub fn new(cfg: &IpCacheCfg, store: KvStore, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            store,
            resolver,
            cooldown: Duration::from_secs(cfg.refresh_cooldown_secs),
            state: Mutex::new(CacheState {
                memory: memory_tier(cfg.memory_capacity),
                refreshed_at_ms: HashMap::new(),
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut CacheState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// 先查内存；未命中时读持久层并回填内存。
    pub fn load(&self, host: &str) -> Option<String> {
        if let Some(ip) = self.with_state(|s| s.memory.get(host).cloned()) {
            tracing::debug!(target = "ip_cache", host, ip = ip.as_str(), "memory cache hit");
            return Some(ip);
        }
        match self.store.get(&cache_key(host)) {
            Some(ip) => {
                self.with_state(|s| s.memory.put(host.to_string(), ip.clone()));
                tracing::debug!(target = "ip_cache", host, ip = ip.as_str(), "store cache hit");
                Some(ip)
            }
            None => {
                tracing::debug!(target = "ip_cache", host, "cache miss");
                None
            }
        }
    }

    /// 写入两级缓存并记录刷新时间。
    pub fn store(&self, ip: &str, host: &str) {
        let evicted = self.with_state(|s| s.memory.push(host.to_string(), ip.to_string()));
        if let Some((old_host, _)) = evicted.filter(|(old_host, _)| old_host != host) {
            tracing::debug!(target = "ip_cache", host = old_host.as_str(), "memory cache evicted");
        }
        if let Err(err) = self.store.set(&cache_key(host), ip) {
            tracing::warn!(target = "ip_cache", host, error = %err, "persist cached ip failed");
        }
        self.mark_refreshed(host, current_epoch_ms());
        tracing::info!(target = "ip_cache", host, ip, "cached ip updated");
    }

    fn mark_refreshed(&self, host: &str, now_ms: i64) {
        self.with_state(|s| {
            s.refreshed_at_ms.insert(host.to_string(), now_ms);
        });
        if let Err(err) = self.store.set(&refresh_key(host), &now_ms.to_string()) {
            tracing::warn!(target = "ip_cache", host, error = %err, "persist refresh time failed");
        }
    }

    fn last_refresh_ms(&self, host: &str) -> Option<i64> {
        if let Some(ts) = self.with_state(|s| s.refreshed_at_ms.get(host).copied()) {
            return Some(ts);
        }
        let persisted = self
            .store
            .get(&refresh_key(host))
            .and_then(|raw| raw.parse::<i64>().ok())?;
        self.with_state(|s| {
            s.refreshed_at_ms.insert(host.to_string(), persisted);
        });
        Some(persisted)
    }

    pub fn should_refresh(&self, host: &str) -> bool {
        self.should_refresh_at(host, current_epoch_ms())
    }

    /// 从未刷新过，或距上次刷新已达到冷却时间时返回 true。
    pub fn should_refresh_at(&self, host: &str, now_ms: i64) -> bool {
        match self.last_refresh_ms(host) {
            Some(last) => now_ms.saturating_sub(last) >= self.cooldown.as_millis() as i64,
            None => true,
        }
    }

    /// 通过解析器刷新；无论是否解析成功都会更新刷新时间。
    pub async fn refresh(&self, host: &str) -> Option<String> {
        tracing::debug!(target = "ip_cache", host, "refreshing cached ip");
        let resolved = self.resolver.resolve(host).await;
        match resolved {
            Some(record) => {
                self.store(&record.ip, host);
                Some(record.ip)
            }
            None => {
                tracing::warn!(target = "ip_cache", host, "resolution unavailable; keeping cached ip");
                self.mark_refreshed(host, current_epoch_ms());
                None
            }
        }
    }

    pub async fn refresh_all(&self, hosts: &[String]) {
        tracing::info!(target = "ip_cache", hosts = hosts.len(), "refreshing all cached ips");
        for host in hosts {
            self.refresh(host).await;
        }
    }

    pub async fn refresh_if_needed(&self, hosts: &[String]) {
        for host in hosts {
            if self.should_refresh(host) {
                self.refresh(host).await;
            } else {
                tracing::debug!(target = "ip_cache", host = host.as_str(), "cached ip still fresh");
            }
        }
    }

    /// 缓存新鲜时直接返回；否则刷新，刷新失败回退到旧值。
    pub async fn load_with_refresh(&self, host: &str) -> Option<String> {
        let cached = self.load(host);
        if cached.is_some() && !self.should_refresh(host) {
            return cached;
        }
        self.refresh(host).await.or(cached)
    }

    pub fn clear(&self, host: &str) {
        self.with_state(|s| {
            s.memory.pop(host);
            s.refreshed_at_ms.remove(host);
        });
        for key in [cache_key(host), refresh_key(host)] {
            if let Err(err) = self.store.remove(&key) {
                tracing::warn!(target = "ip_cache", host, error = %err, "clear cached entry failed");
            }
        }
        tracing::info!(target = "ip_cache", host, "cache cleared");
    }

    pub fn clear_all(&self, hosts: &[String]) {
        for host in hosts {
            self.clear(host);
        }
    }

    pub fn memory_len(&self) -> usize {
        self.with_state(|s| s.memory.len())
    }
}
