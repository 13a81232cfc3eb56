pub mod cache;
pub mod dns;
pub mod health;
pub mod store;

pub use cache::IpCache;
pub use dns::{DohAnswer, DohRecord, DohResolver, DohResponse, HostResolver};
pub use health::{HealthPolicy, HealthTracker};
pub use store::KvStore;
