use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingInfo { pub connect_ms: u32, pub tls_ms: u32, pub first_byte_ms: u32, pub total_ms: u32 }

/// 下载进度：已接收字节数，以及（头部解析后）声明的总长度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress { pub received: u64, pub expected: Option<u64> }

impl Progress {
  /// 0.0..=1.0；总长度未知时返回 None
  pub fn fraction(&self) -> Option<f64> {
    match self.expected {
      Some(0) => Some(1.0),
      Some(total) => Some((self.received as f64 / total as f64).min(1.0)),
      None => None,
    }
  }
}

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// 解析后的 HTTP 响应：状态码、头部（名称小写）与已解码的 body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
  pub status: u16,
  pub headers: HashMap<String, String>,
  pub body: Vec<u8>,
}

impl ParsedResponse {
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
  }
}

/// 返回给调用方的响应描述；body 单独返回。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
  pub ok: bool,
  pub status: u16,
  pub headers: HashMap<String, String>,
  pub url: String,
  pub ip: String,
  pub timing: TimingInfo,
  pub body_size: usize,
}

/// 单次直连请求的输入。header 按插入顺序写出。
#[derive(Clone)]
pub struct DirectRequest {
  pub method: String,
  pub path: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
  pub timeout: Option<Duration>,
  pub on_progress: Option<ProgressCallback>,
}

impl DirectRequest {
  pub fn new<M: Into<String>, P: Into<String>>(method: M, path: P) -> Self {
    Self {
      method: method.into(),
      path: path.into(),
      headers: Vec::new(),
      body: None,
      timeout: None,
      on_progress: None,
    }
  }

  pub fn get<P: Into<String>>(path: P) -> Self {
    Self::new("GET", path)
  }

  pub fn post<P: Into<String>>(path: P, body: Vec<u8>) -> Self {
    Self::new("POST", path).body(body)
  }

  pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn body(mut self, body: Vec<u8>) -> Self {
    self.body = Some(body);
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn on_progress<F>(mut self, f: F) -> Self
  where
    F: Fn(Progress) + Send + Sync + 'static,
  {
    self.on_progress = Some(Arc::new(f));
    self
  }

  /// 大小写不敏感地查找调用方提供的 header
  pub fn has_header(&self, name: &str) -> bool {
    self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
  }
}

impl fmt::Debug for DirectRequest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DirectRequest")
      .field("method", &self.method)
      .field("path", &self.path)
      .field("headers", &self.headers)
      .field("body_len", &self.body.as_ref().map(|b| b.len()))
      .field("timeout", &self.timeout)
      .field("on_progress", &self.on_progress.is_some())
      .finish()
  }
}
