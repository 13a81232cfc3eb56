use serde::{Deserialize, Serialize};

/// 直连请求相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectCfg {
    #[serde(default = "default_timeout_ms")] pub default_timeout_ms: u64,
    #[serde(default = "default_image_timeout_ms")] pub image_timeout_ms: u64,
    #[serde(default = "default_max_concurrent")] pub max_concurrent_attempts: usize,
    #[serde(default = "default_user_agent")] pub user_agent: String,
    #[serde(default = "default_referer")] pub referer: String,
    /// 全部候选失败时需要刷新 DNS 缓存的图片域名
    #[serde(default = "default_image_hosts")] pub image_hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DohCfg {
    #[serde(default = "default_doh_base_url")] pub base_url: String,
    #[serde(default = "default_doh_timeout_ms")] pub timeout_ms: u64,
    #[serde(default = "default_doh_user_agent")] pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpCacheCfg {
    #[serde(default = "default_cooldown_secs")] pub refresh_cooldown_secs: u64,
    #[serde(default = "default_memory_capacity")] pub memory_capacity: usize,
    /// 持久化文件路径；为空时使用 `<base>/config/ip-cache.json`
    #[serde(default)] pub store_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCfg {
    #[serde(default = "default_boost")] pub boost: f64,
    #[serde(default = "default_penalty")] pub penalty: f64,
    #[serde(default = "default_floor")] pub floor: f64,
    #[serde(default = "default_ceiling")] pub ceiling: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingCfg {
    #[serde(default = "default_log_level")] pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)] pub direct: DirectCfg,
    #[serde(default)] pub doh: DohCfg,
    #[serde(default)] pub ip_cache: IpCacheCfg,
    #[serde(default)] pub health: HealthCfg,
    #[serde(default)] pub logging: LoggingCfg,
}

fn default_timeout_ms() -> u64 { 10_000 }
fn default_image_timeout_ms() -> u64 { 30_000 }
fn default_max_concurrent() -> usize { 32 }
fn default_user_agent() -> String { "PixivIOSApp/7.13.3 (iOS 14.6; iPhone12,1)".to_string() }
fn default_referer() -> String { "https://www.pixiv.net/".to_string() }
fn default_image_hosts() -> Vec<String> { vec!["i.pximg.net".into(), "s.pximg.net".into()] }
fn default_doh_base_url() -> String { "https://v.recipes/dns-query".to_string() }
fn default_doh_timeout_ms() -> u64 { 10_000 }
fn default_doh_user_agent() -> String {
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148".to_string()
}
fn default_cooldown_secs() -> u64 { 300 }
fn default_memory_capacity() -> usize { 20 }
fn default_boost() -> f64 { 0.05 }
fn default_penalty() -> f64 { 0.2 }
fn default_floor() -> f64 { 0.1 }
fn default_ceiling() -> f64 { 1.0 }
fn default_log_level() -> String { "info".to_string() }

impl Default for DirectCfg {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            image_timeout_ms: default_image_timeout_ms(),
            max_concurrent_attempts: default_max_concurrent(),
            user_agent: default_user_agent(),
            referer: default_referer(),
            image_hosts: default_image_hosts(),
        }
    }
}

impl Default for DohCfg {
    fn default() -> Self {
        Self {
            base_url: default_doh_base_url(),
            timeout_ms: default_doh_timeout_ms(),
            user_agent: default_doh_user_agent(),
        }
    }
}

impl Default for IpCacheCfg {
    fn default() -> Self {
        Self {
            refresh_cooldown_secs: default_cooldown_secs(),
            memory_capacity: default_memory_capacity(),
            store_path: None,
        }
    }
}

impl Default for HealthCfg {
    fn default() -> Self {
        Self {
            boost: default_boost(),
            penalty: default_penalty(),
            floor: default_floor(),
            ceiling: default_ceiling(),
        }
    }
}

impl Default for LoggingCfg {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            direct: DirectCfg::default(),
            doh: DohCfg::default(),
            ip_cache: IpCacheCfg::default(),
            health: HealthCfg::default(),
            logging: LoggingCfg::default(),
        }
    }
}
