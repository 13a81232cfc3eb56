#![allow(dead_code)]
//! 公共测试模块聚合
//!
//! - tls_server: 基于 rcgen 自签证书的本地 TLS 源站
//! - resolver: 计数用的 HostResolver 桩

pub mod resolver;
pub mod tls_server;

use std::sync::Arc;

use pixiv_direct_lib::core::config::model::{DirectCfg, IpCacheCfg};
use pixiv_direct_lib::core::http::{AdmissionLimiter, DirectClient};
use pixiv_direct_lib::core::ip_pool::{HealthTracker, IpCache, KvStore};

use resolver::CountingResolver;

pub struct TestClient {
    pub client: DirectClient,
    pub resolver: Arc<CountingResolver>,
}

/// 组装一个使用内存存储与计数解析器的直连客户端；图片域名只有 `i.pximg.net`。
pub fn test_client() -> TestClient {
    let resolver = Arc::new(CountingResolver::default());
    let cache = Arc::new(IpCache::new(
        &IpCacheCfg::default(),
        KvStore::in_memory(),
        resolver.clone(),
    ));
    let cfg = DirectCfg {
        image_hosts: vec!["i.pximg.net".into()],
        ..DirectCfg::default()
    };
    let client = DirectClient::new(
        cfg,
        Arc::new(HealthTracker::default()),
        cache,
        Arc::new(AdmissionLimiter::default()),
    );
    TestClient { client, resolver }
}
