pub mod config;
pub mod http;
pub mod ip_pool;
pub mod tls;
