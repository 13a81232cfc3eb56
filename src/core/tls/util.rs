use std::net::IpAddr;
use std::sync::Arc;

use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};

use super::verifier::IdentityVerifier;

/// 直连只允许 HTTP/1.1，避免 ALPN 协商到 h2（本层无法解析，且部分源站在 SNI 与 IP 路由不一致时会拒绝）。
pub const ALPN_HTTP11: &[u8] = b"http/1.1";

/// Subject 文本（大小写不敏感）包含任一身份子串即视为匹配；空列表拒绝一切。
pub fn subject_matches_identity(subject: &str, identities: &[String]) -> bool {
    if identities.is_empty() {
        return false;
    }
    let lower = subject.to_ascii_lowercase();
    identities
        .iter()
        .any(|id| !id.is_empty() && lower.contains(&id.to_ascii_lowercase()))
}

fn webpki_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(ta.subject, ta.spki, ta.name_constraints)
    }));
    root_store
}

/// 标准校验（系统内置根证书 + 主机名校验）的客户端配置，用于 DoH 等未被干扰的上游。
pub fn webpki_client_config() -> ClientConfig {
    let mut cfg = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(webpki_root_store())
        .with_no_client_auth();
    cfg.alpn_protocols = vec![ALPN_HTTP11.to_vec()];
    cfg
}

/// 直连使用的客户端配置：ALPN 固定为 http/1.1，证书校验替换为身份子串校验。
pub fn create_direct_client_config(identities: &[String]) -> ClientConfig {
    let mut cfg = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(RootCertStore::empty())
        .with_no_client_auth();
    cfg.alpn_protocols = vec![ALPN_HTTP11.to_vec()];
    cfg.dangerous()
        .set_certificate_verifier(Arc::new(IdentityVerifier::new(identities.to_vec())));
    cfg
}

/// 以 IP 作为 ServerName：rustls 不会为 IP 地址发送 SNI 扩展。
pub fn server_name_for_ip(ip: IpAddr) -> ServerName {
    ServerName::IpAddress(ip)
}
