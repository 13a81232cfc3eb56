use std::process::ExitCode;

use pixiv_direct_lib::core::config::loader;
use pixiv_direct_lib::logging::init_logging_with_level;
use pixiv_direct_lib::{DirectClient, DirectRequest, Endpoint, EndpointKind};

// 用法: pixiv-direct [<oauth|api|accounts|image> <path>]
#[tokio::main]
async fn main() -> ExitCode {
    let cfg = match loader::load_or_init() {
        Ok(cfg) => cfg,
        Err(err) => {
            init_logging_with_level("info");
            tracing::error!(target = "config", error = %err, "load config failed");
            return ExitCode::FAILURE;
        }
    };
    init_logging_with_level(&cfg.logging.log_level);

    let client = match DirectClient::from_config(&cfg) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(target = "app", error = %err, "build direct client failed");
            return ExitCode::FAILURE;
        }
    };
    client.refresh_if_needed().await;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (kind, path) = match args.as_slice() {
        [] => return ExitCode::SUCCESS,
        [kind, path] => (kind, path),
        _ => {
            eprintln!("usage: pixiv-direct [<oauth|api|accounts|image> <path>]");
            return ExitCode::from(2);
        }
    };
    let kind: EndpointKind = match kind.parse() {
        Ok(kind) => kind,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    match client.request(&Endpoint::builtin(kind), DirectRequest::get(path.as_str())).await {
        Ok((body, envelope)) => {
            println!("{} {} via {} ({} bytes, {} ms)", envelope.status, envelope.url, envelope.ip, body.len(), envelope.timing.total_ms);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("request failed: {err}");
            ExitCode::FAILURE
        }
    }
}
