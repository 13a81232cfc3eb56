pub mod buffer;
pub mod client;
pub mod completion;
pub mod endpoint;
pub mod errors;
pub mod limiter;
pub mod parser;
pub mod types;
pub mod wire;

pub use client::DirectClient;
pub use endpoint::{Endpoint, EndpointKind};
pub use errors::DirectError;
pub use limiter::{AdmissionLimiter, AdmissionPermit};
pub use types::{DirectRequest, Progress, ResponseEnvelope};
