use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hyper::{
    body::Bytes,
    header::{ACCEPT, HOST, USER_AGENT},
    Body, Request, StatusCode,
};
use serde::Deserialize;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::timeout,
};
use tokio_rustls::{rustls::ClientConfig, TlsConnector};
use url::Url;

use crate::core::config::model::DohCfg;
use crate::core::tls::util::webpki_client_config;

/// 应答缺少 TTL 时使用的默认值（秒）
pub const DEFAULT_TTL_SECS: u32 = 300;

/// DoH JSON 应答，同时兼容小写键与 `Status`/`Answer` 风格。
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DohResponse {
    #[serde(default, alias = "Status")]
    pub status: Option<i64>,
    #[serde(default, alias = "Answer")]
    pub answer: Option<Vec<DohAnswer>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DohAnswer {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub record_type: i64,
    pub data: String,
    #[serde(rename = "TTL", default)]
    pub ttl: Option<u32>,
}

impl DohAnswer {
    pub fn is_valid_ipv4(&self) -> bool {
        self.data.parse::<Ipv4Addr>().is_ok()
    }
}

/// 一次成功解析的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DohRecord {
    pub ip: String,
    pub ttl: u32,
}

/// 主机名解析抽象；返回 None 表示“暂不可用”，调用方回退到缓存或内置列表。
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Option<DohRecord>;
}

/// 从应答中挑选 TTL 最大的有效 IPv4 记录（稳定排序，TTL 相同取靠前者）。
pub fn select_answer(response: &DohResponse) -> Option<DohRecord> {
    if let Some(status) = response.status {
        if status != 0 {
            return None;
        }
    }
    let answers = response.answer.as_deref().unwrap_or_default();
    let mut valid: Vec<&DohAnswer> = answers.iter().filter(|a| a.is_valid_ipv4()).collect();
    valid.sort_by(|a, b| b.ttl.unwrap_or(0).cmp(&a.ttl.unwrap_or(0)));
    valid.first().map(|a| DohRecord {
        ip: a.data.clone(),
        ttl: a.ttl.unwrap_or(DEFAULT_TTL_SECS),
    })
}

/// 基于 JSON API 的 DoH 解析器：`GET <base>/resolve?name=<host>&type=1`
pub struct DohResolver {
    base_url: Url,
    timeout: Duration,
    user_agent: String,
    tls: Arc<ClientConfig>,
}

impl DohResolver {
    pub fn new(cfg: &DohCfg) -> Result<Self> {
        let base_url = Url::parse(&cfg.base_url)
            .with_context(|| format!("parse doh base url '{}'", cfg.base_url))?;
        match base_url.scheme() {
            "https" | "http" => {}
            other => return Err(anyhow!("doh base url must be http(s), got '{}'", other)),
        }
        if base_url.host_str().is_none() {
            return Err(anyhow!("doh base url '{}' missing host", cfg.base_url));
        }
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(cfg.timeout_ms),
            user_agent: cfg.user_agent.clone(),
            tls: Arc::new(webpki_client_config()),
        })
    }

    /// 构造查询 URL
    pub fn query_url(&self, host: &str) -> Url {
        let mut url = self.base_url.clone();
        let path = format!("{}/resolve", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("name", host)
            .append_pair("type", "1");
        url
    }

    async fn fetch(&self, host: &str) -> Result<(StatusCode, Bytes)> {
        let url = self.query_url(host);
        let server = url
            .host_str()
            .ok_or_else(|| anyhow!("doh url missing host"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow!("doh url missing port"))?;
        let mut target = url.path().to_string();
        if let Some(q) = url.query() {
            target.push('?');
            target.push_str(q);
        }
        let host_header = match url.port() {
            Some(p) => format!("{}:{}", server, p),
            None => server.clone(),
        };
        let req = Request::builder()
            .method("GET")
            .uri(target)
            .header(HOST, host_header)
            .header(ACCEPT, "application/dns-json")
            .header(USER_AGENT, self.user_agent.as_str())
            .body(Body::empty())
            .context("build doh request")?;

        let tcp = TcpStream::connect((server.as_str(), port))
            .await
            .with_context(|| format!("connect doh server {}:{}", server, port))?;
        if url.scheme() == "https" {
            let name = rustls::ServerName::try_from(server.as_str())
                .map_err(|e| anyhow!("invalid doh server name {}: {}", server, e))?;
            let tls = TlsConnector::from(self.tls.clone())
                .connect(name, tcp)
                .await
                .context("doh tls handshake")?;
            send_request(tls, req).await
        } else {
            send_request(tcp, req).await
        }
    }
}

async fn send_request<S>(stream: S, req: Request<Body>) -> Result<(StatusCode, Bytes)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::handshake(stream)
        .await
        .context("doh http handshake")?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(target = "doh", "conn ended: {:?}", e);
        }
    });
    let resp = sender.send_request(req).await.context("send doh request")?;
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .context("read doh body")?;
    Ok((status, body))
}

#[async_trait]
impl HostResolver for DohResolver {
    async fn resolve(&self, host: &str) -> Option<DohRecord> {
        tracing::debug!(target = "doh", host, "doh query");
        let (status, body) = match timeout(self.timeout, self.fetch(host)).await {
            Ok(Ok(res)) => res,
            Ok(Err(err)) => {
                tracing::warn!(target = "doh", host, error = %err, "doh query failed");
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    target = "doh",
                    host,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "doh query timed out"
                );
                return None;
            }
        };
        if status != StatusCode::OK {
            tracing::warn!(target = "doh", host, status = status.as_u16(), "doh http status not ok");
            return None;
        }
        let parsed: DohResponse = match serde_json::from_slice(&body) {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(target = "doh", host, error = %err, "doh response decode failed");
                return None;
            }
        };
        let picked = select_answer(&parsed);
        match &picked {
            Some(rec) => {
                tracing::info!(target = "doh", host, ip = rec.ip.as_str(), ttl = rec.ttl, "doh resolved")
            }
            None => tracing::warn!(
                target = "doh",
                host,
                status = parsed.status.unwrap_or_default(),
                "doh returned no usable ipv4 answer"
            ),
        }
        picked
    }
}
