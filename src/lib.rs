pub mod core;
pub mod logging;

pub use crate::core::http::{DirectClient, DirectError, DirectRequest, Endpoint, EndpointKind};
