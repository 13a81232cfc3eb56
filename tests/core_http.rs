//! 直连客户端端到端测试：本地 TLS 源站（127.0.0.x）+ 内存缓存 + 计数解析器

mod common;

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flate2::write::GzEncoder;
use flate2::Compression;
use pixiv_direct_lib::core::http::{DirectError, DirectRequest, Endpoint, EndpointKind};

use common::test_client;
use common::tls_server::{loopback, plain_response, spawn_origin, Reply};

fn endpoint(kind: EndpointKind, port: u16, ips: &[String]) -> Endpoint {
    let host = match kind {
        EndpointKind::Image => "i.pximg.net",
        _ => "app-api.pixiv.net",
    };
    Endpoint::new(kind, host, port, ips.to_vec())
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

async fn wait_for_calls(resolver: &common::resolver::CountingResolver, want: usize) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while resolver.calls() < want && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_plain_get_succeeds() {
    let origin = spawn_origin(loopback(1), 0, "i.pximg.net", Reply::Bytes(plain_response("200 OK", b"jpeg bytes"))).await;
    let t = test_client();
    let ep = endpoint(EndpointKind::Image, origin.port(), &[origin.ip()]);

    let (body, env) = t.client.request(&ep, DirectRequest::get("/img-original/img/1.jpg")).await.unwrap();
    assert_eq!(body, b"jpeg bytes");
    assert_eq!(env.status, 200);
    assert!(env.ok);
    assert_eq!(env.ip, "127.0.0.1");
    assert_eq!(env.url, "https://i.pximg.net/img-original/img/1.jpg");
    assert_eq!(env.body_size, body.len());
    assert_eq!(t.client.health().score("127.0.0.1"), 1.0);

    let req = origin.last_request().unwrap();
    assert!(req.starts_with("GET /img-original/img/1.jpg HTTP/1.1\r\nHost: i.pximg.net\r\n"));
    assert!(req.contains("Referer: https://www.pixiv.net/\r\n"));
    assert!(req.contains("Accept-Encoding: gzip\r\n"));
    assert!(req.ends_with("Connection: close\r\n\r\n"));
    assert_eq!(t.client.limiter().in_flight(), 0);
}

#[tokio::test]
async fn test_chunked_gzip_body_decoded() {
    let payload = br#"{"illusts":[{"id":1}],"next_url":null}"#.repeat(20);
    let compressed = gzip(&payload);
    let (a, b) = compressed.split_at(compressed.len() / 3);
    let mut raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Encoding: gzip\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    for part in [a, b] {
        raw.extend_from_slice(format!("{:x}\r\n", part.len()).as_bytes());
        raw.extend_from_slice(part);
        raw.extend_from_slice(b"\r\n");
    }
    raw.extend_from_slice(b"0\r\n\r\n");

    let origin = spawn_origin(loopback(1), 0, "*.pixiv.net", Reply::Bytes(raw)).await;
    let t = test_client();
    let ep = endpoint(EndpointKind::Api, origin.port(), &[origin.ip()]);
    let (body, env) = t.client.request(&ep, DirectRequest::get("/v1/illust/recommended")).await.unwrap();
    assert_eq!(body, payload);
    assert_eq!(env.headers.get("content-type").map(String::as_str), Some("application/json"));
}

#[tokio::test]
async fn test_error_status_is_not_a_failure() {
    let origin = spawn_origin(loopback(1), 0, "app-api.pixiv.net", Reply::Bytes(plain_response("404 Not Found", b"{}"))).await;
    let t = test_client();
    let ep = endpoint(EndpointKind::Api, origin.port(), &[origin.ip()]);
    let (body, env) = t.client.request(&ep, DirectRequest::get("/missing")).await.unwrap();
    assert_eq!(env.status, 404);
    assert!(!env.ok);
    assert_eq!(body, b"{}");
    assert_eq!(t.client.health().score("127.0.0.1"), 1.0);
}

#[tokio::test]
async fn test_cached_ip_tried_first() {
    let fallback = spawn_origin(loopback(1), 0, "i.pximg.net", Reply::Bytes(plain_response("200 OK", b"fallback"))).await;
    let cached = spawn_origin(loopback(2), fallback.port(), "i.pximg.net", Reply::Bytes(plain_response("200 OK", b"cached"))).await;
    let t = test_client();
    t.client.cache().store(&cached.ip(), "i.pximg.net");
    t.client.health().report_failure(&cached.ip());
    t.client.health().report_failure(&fallback.ip());
    let ep = endpoint(EndpointKind::Image, fallback.port(), &[fallback.ip()]);

    assert_eq!(t.client.candidates(&ep), vec!["127.0.0.2".to_string(), "127.0.0.1".to_string()]);
    let (body, env) = t.client.request(&ep, DirectRequest::get("/c/1.jpg")).await.unwrap();
    assert_eq!(body, b"cached");
    assert_eq!(env.ip, "127.0.0.2");
    assert_eq!(fallback.accepted.load(Ordering::SeqCst), 0);
    assert!((t.client.health().score("127.0.0.2") - 0.85).abs() < 1e-9);
    assert!((t.client.health().score("127.0.0.1") - 0.8).abs() < 1e-9);

    let (_, again) = t.client.request(&ep, DirectRequest::get("/c/2.jpg")).await.unwrap();
    assert_eq!(again.ip, "127.0.0.2");
    // 满分时成功不再上涨
    for _ in 0..3 {
        t.client.health().report_success("127.0.0.2");
    }
    assert_eq!(t.client.health().score("127.0.0.2"), 1.0);
}

#[tokio::test]
async fn test_healthier_ip_ranked_first() {
    let weak = spawn_origin(loopback(1), 0, "i.pximg.net", Reply::Bytes(plain_response("200 OK", b"weak"))).await;
    let strong = spawn_origin(loopback(2), weak.port(), "i.pximg.net", Reply::Bytes(plain_response("200 OK", b"strong"))).await;
    let t = test_client();
    let health = t.client.health();
    health.report_failure("127.0.0.1");
    health.report_failure("127.0.0.1");
    health.report_failure("127.0.0.2");

    let ep = endpoint(EndpointKind::Image, weak.port(), &[weak.ip(), strong.ip()]);
    let (body, env) = t.client.request(&ep, DirectRequest::get("/x.png")).await.unwrap();
    assert_eq!(body, b"strong");
    assert_eq!(env.ip, "127.0.0.2");
    assert!((health.score("127.0.0.2") - 0.85).abs() < 1e-9);
    assert!((health.score("127.0.0.1") - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn test_falls_through_to_next_candidate() {
    let bad = spawn_origin(loopback(1), 0, "attacker.invalid", Reply::Bytes(plain_response("200 OK", b"bad"))).await;
    let good = spawn_origin(loopback(2), bad.port(), "i.pximg.net", Reply::Bytes(plain_response("200 OK", b"good"))).await;
    let t = test_client();
    let ep = endpoint(EndpointKind::Image, bad.port(), &[bad.ip(), good.ip()]);

    let (body, env) = t.client.request(&ep, DirectRequest::get("/y.png")).await.unwrap();
    assert_eq!(body, b"good");
    assert_eq!(env.ip, "127.0.0.2");
    assert!((t.client.health().score("127.0.0.1") - 0.8).abs() < 1e-9);
    assert!(bad.last_request().is_none());
    // 图片请求成功时不触发刷新
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(t.resolver.calls(), 0);
}

#[tokio::test]
async fn test_all_candidates_fail_triggers_single_refresh_for_image() {
    let a = spawn_origin(loopback(1), 0, "example.com", Reply::Bytes(plain_response("200 OK", b"x"))).await;
    let b = spawn_origin(loopback(2), a.port(), "example.com", Reply::Bytes(plain_response("200 OK", b"x"))).await;
    let t = test_client();
    let ep = endpoint(EndpointKind::Image, a.port(), &[a.ip(), b.ip()]);

    let err = t.client.request(&ep, DirectRequest::get("/z.png")).await.unwrap_err();
    match &err {
        DirectError::AllCandidatesFailed { last_error } => {
            assert!(matches!(**last_error, DirectError::Tls(_)), "{last_error:?}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!((t.client.health().score("127.0.0.1") - 0.8).abs() < 1e-9);
    assert!((t.client.health().score("127.0.0.2") - 0.8).abs() < 1e-9);

    wait_for_calls(&t.resolver, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(t.resolver.calls(), 1);
    assert_eq!(t.client.limiter().in_flight(), 0);
}

#[tokio::test]
async fn test_api_failure_does_not_refresh() {
    let a = spawn_origin(loopback(1), 0, "example.com", Reply::Bytes(plain_response("200 OK", b"x"))).await;
    let t = test_client();
    let ep = endpoint(EndpointKind::Api, a.port(), &[a.ip()]);
    let err = t.client.request(&ep, DirectRequest::get("/v1/user")).await.unwrap_err();
    assert_eq!(err.category(), "exhausted");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(t.resolver.calls(), 0);
}

#[tokio::test]
async fn test_no_candidates() {
    let t = test_client();
    let ep = endpoint(EndpointKind::Api, 443, &[]);
    let err = t.client.request(&ep, DirectRequest::get("/")).await.unwrap_err();
    assert_eq!(err.root(), &DirectError::NoCandidates);
}

#[tokio::test]
async fn test_stalled_origin_times_out() {
    let origin = spawn_origin(loopback(1), 0, "i.pximg.net", Reply::Stall).await;
    let t = test_client();
    let ep = endpoint(EndpointKind::Image, origin.port(), &[origin.ip()]);

    let started = Instant::now();
    let err = t
        .client
        .request(&ep, DirectRequest::get("/slow.jpg").timeout(Duration::from_millis(300)))
        .await
        .unwrap_err();
    assert_eq!(err.root(), &DirectError::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!((t.client.health().score("127.0.0.1") - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_short_body_is_incomplete() {
    let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nonly a few bytes".to_vec();
    let origin = spawn_origin(loopback(1), 0, "i.pximg.net", Reply::Bytes(raw)).await;
    let t = test_client();
    let ep = endpoint(EndpointKind::Image, origin.port(), &[origin.ip()]);
    let err = t.client.request(&ep, DirectRequest::get("/cut.jpg")).await.unwrap_err();
    assert_eq!(err.root(), &DirectError::IncompleteData { expected: 100, received: 16 });
}

#[tokio::test]
async fn test_refused_connection_is_io_error() {
    // 先占用端口再释放，得到一个大概率无人监听的端口
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let t = test_client();
    let ep = endpoint(EndpointKind::Api, port, &["127.0.0.1".to_string()]);
    let err = t.client.request(&ep, DirectRequest::get("/")).await.unwrap_err();
    assert!(matches!(err.root(), DirectError::Io(_)), "{err:?}");
}

#[tokio::test]
async fn test_progress_reported() {
    let body = vec![7u8; 200_000];
    let origin = spawn_origin(loopback(1), 0, "i.pximg.net", Reply::Bytes(plain_response("200 OK", &body))).await;
    let t = test_client();
    let ep = endpoint(EndpointKind::Image, origin.port(), &[origin.ip()]);

    let last = Arc::new(AtomicU64::new(0));
    let expected = Arc::new(AtomicU64::new(0));
    let req = {
        let last = last.clone();
        let expected = expected.clone();
        DirectRequest::get("/big.png").on_progress(move |p| {
            last.store(p.received, Ordering::SeqCst);
            if let Some(total) = p.expected {
                expected.store(total, Ordering::SeqCst);
            }
        })
    };
    let (got, _) = t.client.request(&ep, req).await.unwrap();
    assert_eq!(got.len(), body.len());
    assert_eq!(last.load(Ordering::SeqCst), body.len() as u64);
    assert_eq!(expected.load(Ordering::SeqCst), body.len() as u64);
}

#[tokio::test]
async fn test_post_body_and_caller_headers() {
    let origin = spawn_origin(loopback(1), 0, "oauth.secure.pixiv.net", Reply::Bytes(plain_response("200 OK", b"{\"access_token\":\"t\"}"))).await;
    let t = test_client();
    let ep = Endpoint::new(EndpointKind::OAuth, "oauth.secure.pixiv.net", origin.port(), vec![origin.ip()]);
    let req = DirectRequest::post("/auth/token", b"grant_type=refresh_token".to_vec())
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("User-Agent", "PixivAndroidApp/5.0.234 (Android 11; Pixel 5)");
    let (body, _) = t.client.request(&ep, req).await.unwrap();
    assert_eq!(body, b"{\"access_token\":\"t\"}");
    let seen = origin.last_request().unwrap();
    assert!(seen.starts_with("POST /auth/token HTTP/1.1\r\nHost: oauth.secure.pixiv.net\r\nContent-Length: 24\r\n"));
    assert!(seen.contains("User-Agent: PixivAndroidApp/5.0.234"));
    assert!(!seen.contains("PixivIOSApp"));
}
