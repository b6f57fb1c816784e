pub mod model;
pub mod ports;

pub use model::{
    ActionOutcome, ProbeEndpoint, ResourceKind, RetryPolicy, SecretMap, ServiceHealth,
};
pub use ports::{ResourceApi, Storage};
