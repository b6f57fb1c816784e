pub mod health;
pub mod idempotent;
pub mod ledger;
pub mod orchestrator;
pub mod session;
pub mod transport;

pub use crate::domain::model::{ActionOutcome, ResourceKind, RetryPolicy, ServiceHealth};
pub use crate::domain::ports::{ResourceApi, Storage};
pub use crate::utils::error::Result;
