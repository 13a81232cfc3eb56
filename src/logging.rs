// tracing 初始化
use tracing_subscriber::{fmt, EnvFilter};

/// 默认级别 info；`RUST_LOG` 优先。
pub fn init_logging() {
    init_logging_with_level("info");
}

/// 以配置中的级别作为回退；`RUST_LOG` 存在时优先生效。
pub fn init_logging_with_level(level: &str) {
    // 若已经初始化，避免重复 panic
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
    tracing::info!(target = "app", level, "tracing initialized");
}
