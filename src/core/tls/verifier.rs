use std::time::SystemTime;

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, Error as TlsError, ServerName};
use x509_parser::prelude::*;

use super::util::subject_matches_identity;

/// 直连证书校验器：只检查叶子证书 Subject 是否包含期望的身份子串
/// （例如 "pixiv.net" / "pximg.net"），不做证书链与主机名校验。
///
/// 直连时 ServerName 是 IP 地址，默认的 WebPKI 主机名校验必然失败；
/// 握手签名仍由 rustls 默认实现按叶子证书公钥验证。
#[derive(Debug, Clone)]
pub struct IdentityVerifier {
    identities: Vec<String>,
}

impl IdentityVerifier {
    pub fn new(identities: Vec<String>) -> Self {
        let identities = identities
            .into_iter()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { identities }
    }

    pub fn identities(&self) -> &[String] {
        &self.identities
    }

    /// 解析叶子证书 Subject 并做身份匹配；返回匹配到的 Subject 文本。
    pub fn check_leaf(&self, end_entity: &Certificate) -> Result<String, TlsError> {
        let subject = leaf_subject(end_entity)?;
        if subject_matches_identity(&subject, &self.identities) {
            Ok(subject)
        } else {
            Err(TlsError::General(format!(
                "certificate subject '{}' does not match expected identity",
                subject
            )))
        }
    }
}

/// 提取叶子证书 Subject 的文本形式（如 `CN=*.pximg.net, O=pixiv Inc.`）。
pub fn leaf_subject(cert: &Certificate) -> Result<String, TlsError> {
    let (_, parsed) = X509Certificate::from_der(&cert.0)
        .map_err(|e| TlsError::General(format!("certificate parse error: {e}")))?;
    Ok(parsed.subject().to_string())
}

impl ServerCertVerifier for IdentityVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        _intermediates: &[Certificate],
        server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, TlsError> {
        match self.check_leaf(end_entity) {
            Ok(subject) => {
                tracing::debug!(target = "tls", subject = subject.as_str(), "certificate identity accepted");
                Ok(ServerCertVerified::assertion())
            }
            Err(err) => {
                tracing::warn!(target = "tls", server = ?server_name, error = %err, "certificate identity rejected");
                Err(err)
            }
        }
    }
}
