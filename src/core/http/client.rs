use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;

use crate::core::config::model::{AppConfig, DirectCfg};
use crate::core::ip_pool::{DohResolver, HealthPolicy, HealthTracker, IpCache, KvStore};
use crate::core::tls::util::{create_direct_client_config, server_name_for_ip};

use super::buffer::ResponseBuffer;
use super::completion::Completion;
use super::endpoint::Endpoint;
use super::errors::DirectError;
use super::limiter::AdmissionLimiter;
use super::parser::parse_response;
use super::types::{DirectRequest, ParsedResponse, ProgressCallback, ResponseEnvelope, TimingInfo};
use super::wire::{serialize_request, HeaderDefaults};

const READ_CHUNK_SIZE: usize = 64 * 1024;

type AttemptResult = Result<(ParsedResponse, TimingInfo), DirectError>;

/// 直连客户端：绕过系统 DNS，直接连到候选 IP，TLS 握手不带 SNI，
/// 只校验证书身份，手工读写 HTTP/1.1。
///
/// 候选 IP 按健康度排序依次尝试，第一个成功即返回；
/// 全部失败时返回 [`DirectError::AllCandidatesFailed`]，若为图片端点还会在后台刷新 DNS 缓存。
pub struct DirectClient {
    cfg: DirectCfg,
    defaults: HeaderDefaults,
    health: Arc<HealthTracker>,
    cache: Arc<IpCache>,
    limiter: Arc<AdmissionLimiter>,
}

/// 单次尝试的后台任务；drop 时全部 abort，保证超时后不再占用连接。
struct AttemptTasks(Vec<JoinHandle<()>>);

impl Drop for AttemptTasks {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

impl DirectClient {
    pub fn new(
        cfg: DirectCfg,
        health: Arc<HealthTracker>,
        cache: Arc<IpCache>,
        limiter: Arc<AdmissionLimiter>,
    ) -> Self {
        let defaults = HeaderDefaults {
            user_agent: cfg.user_agent.clone(),
            referer: cfg.referer.clone(),
        };
        Self {
            cfg,
            defaults,
            health,
            cache,
            limiter,
        }
    }

    /// 由配置构建完整的服务组合（DoH 解析器、持久化缓存、健康度、准入控制）。
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let store = match cfg.ip_cache.store_path.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(path) => KvStore::load_or_init_from_file(&PathBuf::from(path))?,
            None => KvStore::load_default()?,
        };
        let resolver = DohResolver::new(&cfg.doh).context("build doh resolver")?;
        let cache = Arc::new(IpCache::new(&cfg.ip_cache, store, Arc::new(resolver)));
        let health = Arc::new(HealthTracker::new(HealthPolicy::from(&cfg.health)));
        let limiter = Arc::new(AdmissionLimiter::new(cfg.direct.max_concurrent_attempts));
        Ok(Self::new(cfg.direct.clone(), health, cache, limiter))
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn cache(&self) -> &Arc<IpCache> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<AdmissionLimiter> {
        &self.limiter
    }

    fn default_timeout(&self, endpoint: &Endpoint) -> Duration {
        if endpoint.is_image() {
            Duration::from_millis(self.cfg.image_timeout_ms)
        } else {
            Duration::from_millis(self.cfg.default_timeout_ms)
        }
    }

    /// 缓存 IP（若有）在前，内置 IP 在后，去重后按健康度稳定排序。
    pub fn candidates(&self, endpoint: &Endpoint) -> Vec<String> {
        let mut list: Vec<String> = Vec::with_capacity(endpoint.fallback_ips.len() + 1);
        if let Some(cached) = self.cache.load(&endpoint.host) {
            list.push(cached);
        }
        for ip in &endpoint.fallback_ips {
            if !list.contains(ip) {
                list.push(ip.clone());
            }
        }
        self.health.rank(&list)
    }

    /// 发送一次直连请求，返回解码后的 body 与响应描述。4xx/5xx 也视为成功返回。
    pub async fn request(
        &self,
        endpoint: &Endpoint,
        req: DirectRequest,
    ) -> Result<(Vec<u8>, ResponseEnvelope), DirectError> {
        let _permit = self.limiter.acquire().await?;
        let start_total = Instant::now();
        let candidates = self.candidates(endpoint);
        let timeout = req.timeout.unwrap_or_else(|| self.default_timeout(endpoint));
        tracing::info!(
            target = "direct",
            method = req.method.as_str(),
            host = endpoint.host.as_str(),
            path = req.path.as_str(),
            candidates = candidates.len(),
            timeout_ms = timeout.as_millis() as u64,
            in_flight = self.limiter.in_flight(),
            "direct request start"
        );

        let tls = Arc::new(create_direct_client_config(&endpoint.identities));
        let payload = Arc::new(serialize_request(&endpoint.host, &req, &self.defaults));
        let mut last_error = DirectError::NoCandidates;

        for ip in candidates {
            let addr = match ip.parse::<IpAddr>() {
                Ok(addr) => SocketAddr::new(addr, endpoint.port),
                Err(_) => {
                    tracing::warn!(target = "direct", ip = ip.as_str(), "skip unparsable candidate ip");
                    self.health.report_failure(&ip);
                    last_error = DirectError::Io(format!("invalid ip address '{ip}'"));
                    continue;
                }
            };
            let started = Instant::now();
            match attempt(
                addr,
                &endpoint.host,
                tls.clone(),
                payload.clone(),
                timeout,
                req.on_progress.clone(),
            )
            .await
            {
                Ok((parsed, mut timing)) => {
                    self.health.report_success(&ip);
                    timing.total_ms = start_total.elapsed().as_millis() as u32;
                    tracing::info!(
                        target = "direct",
                        host = endpoint.host.as_str(),
                        ip = ip.as_str(),
                        status = parsed.status,
                        body_size = parsed.body.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "direct request ok"
                    );
                    let envelope = ResponseEnvelope {
                        ok: (200..300).contains(&parsed.status),
                        status: parsed.status,
                        headers: parsed.headers,
                        url: format!("https://{}{}", endpoint.host, req.path),
                        ip,
                        timing,
                        body_size: parsed.body.len(),
                    };
                    return Ok((parsed.body, envelope));
                }
                Err(err) => {
                    self.health.report_failure(&ip);
                    tracing::warn!(
                        target = "direct",
                        host = endpoint.host.as_str(),
                        ip = ip.as_str(),
                        category = err.category(),
                        error = %err,
                        score = self.health.score(&ip),
                        "direct attempt failed"
                    );
                    last_error = err;
                }
            }
        }

        tracing::error!(
            target = "direct",
            host = endpoint.host.as_str(),
            last_error = %last_error,
            "all direct candidates failed"
        );
        if endpoint.is_image() {
            self.spawn_refresh_all();
        }
        Err(DirectError::AllCandidatesFailed {
            last_error: Box::new(last_error),
        })
    }

    /// 后台刷新所有图片域名的缓存 IP，不等待结果。
    fn spawn_refresh_all(&self) {
        let cache = self.cache.clone();
        let hosts = self.cfg.image_hosts.clone();
        tokio::spawn(async move {
            cache.refresh_all(&hosts).await;
        });
    }

    pub async fn refresh_all_ips(&self) {
        self.cache.refresh_all(&self.cfg.image_hosts).await;
    }

    pub async fn refresh_if_needed(&self) {
        self.cache.refresh_if_needed(&self.cfg.image_hosts).await;
    }
}

/// 单个候选 IP 的一次尝试：读写任务与超时任务竞争同一个完成信号。
async fn attempt(
    addr: SocketAddr,
    host: &str,
    tls: Arc<ClientConfig>,
    payload: Arc<Vec<u8>>,
    timeout: Duration,
    progress: Option<ProgressCallback>,
) -> AttemptResult {
    let (completion, rx) = Completion::<AttemptResult>::new();

    let exchange_task = {
        let completion = completion.clone();
        let host = host.to_string();
        tokio::spawn(async move {
            let result = exchange(addr, &host, tls, payload, progress).await;
            completion.finish(result);
        })
    };
    let timer_task = {
        let completion = completion.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if completion.finish(Err(DirectError::Timeout)) {
                tracing::debug!(target = "direct", %addr, "attempt timed out");
            }
        })
    };
    let _tasks = AttemptTasks(vec![exchange_task, timer_task]);

    rx.await.unwrap_or(Err(DirectError::Cancelled))
}

async fn exchange(
    addr: SocketAddr,
    host: &str,
    tls: Arc<ClientConfig>,
    payload: Arc<Vec<u8>>,
    progress: Option<ProgressCallback>,
) -> AttemptResult {
    let start_connect = Instant::now();
    let tcp = TcpStream::connect(addr).await?;
    let _ = tcp.set_nodelay(true);
    let connect_ms = start_connect.elapsed().as_millis() as u32;

    let start_tls = Instant::now();
    let mut stream = TlsConnector::from(tls)
        .connect(server_name_for_ip(addr.ip()), tcp)
        .await?;
    let tls_ms = start_tls.elapsed().as_millis() as u32;
    tracing::debug!(target = "direct", %addr, host, connect_ms, tls_ms, "tls established");

    stream.write_all(&payload).await?;
    stream.flush().await?;

    let start_first = Instant::now();
    let mut first_byte_ms = 0u32;
    let mut buffer = ResponseBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if buffer.is_empty() {
                    first_byte_ms = start_first.elapsed().as_millis() as u32;
                }
                buffer.append(&chunk[..n]);
                if let Some(cb) = &progress {
                    cb(buffer.progress());
                }
            }
            // 对端未发送 close_notify 直接断开：已有数据时按正常结束处理
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && !buffer.is_empty() => break,
            Err(e) => return Err(DirectError::from_io(e)),
        }
    }
    let _ = stream.shutdown().await;

    let parsed = parse_response(buffer.data(), host)?;
    Ok((
        parsed,
        TimingInfo {
            connect_ms,
            tls_ms,
            first_byte_ms,
            total_ms: 0,
        },
    ))
}
