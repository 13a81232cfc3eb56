use super::types::DirectRequest;

/// 由本层写出、调用方同名 header 会被忽略
const RESERVED_HEADERS: &[&str] = &["host", "content-length", "connection"];

/// 调用方未提供时补齐的默认 header
#[derive(Debug, Clone)]
pub struct HeaderDefaults {
    pub user_agent: String,
    pub referer: String,
}

/// Referer 只对 pixiv 自家域名补齐
pub fn wants_referer(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host.contains("pixiv") || host.contains("pximg")
}

/// 名称非空且不含 `:`，名称和值都不含 CR/LF
fn is_safe_header(name: &str, value: &str) -> bool {
    let breaks = |s: &str| s.contains('\r') || s.contains('\n');
    !name.trim().is_empty() && !name.contains(':') && !breaks(name) && !breaks(value)
}

/// 手工序列化 HTTP/1.1 请求：
/// 请求行、Host、Content-Length、默认 header、调用方 header、`Connection: close`、空行、body。
pub fn serialize_request(host: &str, req: &DirectRequest, defaults: &HeaderDefaults) -> Vec<u8> {
    let body = req.body.as_deref().unwrap_or_default();
    let path = if req.path.is_empty() { "/" } else { req.path.as_str() };
    let method = req.method.trim().to_ascii_uppercase();

    let mut head = String::with_capacity(256);
    head.push_str(&format!("{method} {path} HTTP/1.1\r\n"));
    head.push_str(&format!("Host: {host}\r\n"));
    head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    if !req.has_header("user-agent") {
        head.push_str(&format!("User-Agent: {}\r\n", defaults.user_agent));
    }
    if !req.has_header("accept-encoding") {
        head.push_str("Accept-Encoding: gzip\r\n");
    }
    if !req.has_header("referer") && wants_referer(host) {
        head.push_str(&format!("Referer: {}\r\n", defaults.referer));
    }
    for (name, value) in &req.headers {
        if RESERVED_HEADERS.iter().any(|r| name.eq_ignore_ascii_case(r)) {
            continue;
        }
        if !is_safe_header(name, value) {
            tracing::warn!(target = "direct", host, header = %name.escape_debug(), "header with line break or bad name dropped");
            continue;
        }
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("Connection: close\r\n\r\n");

    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> HeaderDefaults {
        HeaderDefaults {
            user_agent: "PixivIOSApp/7.13.3 (iOS 14.6; iPhone12,1)".into(),
            referer: "https://www.pixiv.net/".into(),
        }
    }

    #[test]
    fn get_with_defaults() {
        let req = DirectRequest::get("/img-original/img/1.jpg");
        let raw = String::from_utf8(serialize_request("i.pximg.net", &req, &defaults())).unwrap();
        assert_eq!(
            raw,
            "GET /img-original/img/1.jpg HTTP/1.1\r\n\
             Host: i.pximg.net\r\n\
             Content-Length: 0\r\n\
             User-Agent: PixivIOSApp/7.13.3 (iOS 14.6; iPhone12,1)\r\n\
             Accept-Encoding: gzip\r\n\
             Referer: https://www.pixiv.net/\r\n\
             Connection: close\r\n\r\n"
        );
    }

    #[test]
    fn caller_headers_override_defaults() {
        let req = DirectRequest::post("/auth/token", b"grant_type=refresh_token".to_vec())
            .header("user-agent", "custom")
            .header("Host", "evil.example")
            .header("Connection", "keep-alive")
            .header("content-length", "999")
            .header("Content-Type", "application/x-www-form-urlencoded");
        let raw = String::from_utf8(serialize_request("oauth.secure.pixiv.net", &req, &defaults())).unwrap();
        assert!(raw.starts_with("POST /auth/token HTTP/1.1\r\nHost: oauth.secure.pixiv.net\r\nContent-Length: 24\r\n"));
        assert!(raw.contains("user-agent: custom\r\n"));
        assert!(!raw.contains("PixivIOSApp"));
        assert!(!raw.contains("evil.example"));
        assert!(!raw.contains("keep-alive"));
        assert!(!raw.contains("999"));
        assert!(raw.ends_with("Connection: close\r\n\r\ngrant_type=refresh_token"));
    }

    #[test]
    fn no_referer_for_foreign_host() {
        let req = DirectRequest::get("");
        let raw = String::from_utf8(serialize_request("example.com", &req, &defaults())).unwrap();
        assert!(raw.starts_with("GET / HTTP/1.1\r\n"));
        assert!(!raw.contains("Referer"));
    }

    #[test]
    fn line_breaks_in_caller_headers_are_dropped() {
        let req = DirectRequest::get("/v1/user/detail")
            .header("X-Client-Time", "2024\r\nX-Injected: 1")
            .header("X-Evil\r\nX-Other", "v")
            .header("Bad:Name", "v")
            .header("Authorization", "Bearer token");
        let raw = String::from_utf8(serialize_request("app-api.pixiv.net", &req, &defaults())).unwrap();
        assert!(!raw.contains("X-Injected"));
        assert!(!raw.contains("X-Evil"));
        assert!(!raw.contains("Bad:Name"));
        assert!(raw.contains("Authorization: Bearer token\r\n"));
        let head = raw.trim_end_matches("\r\n");
        assert_eq!(head.split("\r\n").count(), 8);
    }
}
