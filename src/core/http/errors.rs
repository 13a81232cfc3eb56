//! Direct connection error types

use std::io;

use thiserror::Error;

/// 直连传输错误。单个候选 IP 的错误只在内部用于健康度反馈，
/// 调用方只会看到 [`DirectError::AllCandidatesFailed`]。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectError {
    #[error("timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("empty response")]
    EmptyResponse,

    #[error("incomplete data: expected {expected} bytes, received {received}")]
    IncompleteData { expected: usize, received: usize },

    #[error("chunked decode error: {0}")]
    ChunkedDecode(String),

    #[error("gzip decompression error: {0}")]
    Gzip(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("no candidate ip available")]
    NoCandidates,

    #[error("all candidates failed, last error: {last_error}")]
    AllCandidatesFailed { last_error: Box<DirectError> },
}

impl DirectError {
    /// 将 socket / TLS 层的 io::Error 归类；tokio-rustls 会把 rustls::Error 包在 io::Error 中。
    pub fn from_io(err: io::Error) -> Self {
        if let Some(inner) = err.get_ref() {
            if let Some(tls) = inner.downcast_ref::<rustls::Error>() {
                return DirectError::Tls(tls.to_string());
            }
        }
        match err.kind() {
            io::ErrorKind::TimedOut => DirectError::Timeout,
            _ => DirectError::Io(err.to_string()),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            DirectError::Timeout => "timeout",
            DirectError::Cancelled => "cancelled",
            DirectError::EmptyResponse => "empty_response",
            DirectError::IncompleteData { .. } => "incomplete_data",
            DirectError::ChunkedDecode(_) => "chunked",
            DirectError::Gzip(_) => "gzip",
            DirectError::Tls(_) => "tls",
            DirectError::Io(_) => "io",
            DirectError::NoCandidates => "no_candidates",
            DirectError::AllCandidatesFailed { .. } => "exhausted",
        }
    }

    /// 对 AllCandidatesFailed 返回其最后一个底层错误，其余返回自身。
    pub fn root(&self) -> &DirectError {
        match self {
            DirectError::AllCandidatesFailed { last_error } => last_error.root(),
            other => other,
        }
    }
}

impl From<io::Error> for DirectError {
    fn from(err: io::Error) -> Self {
        DirectError::from_io(err)
    }
}
