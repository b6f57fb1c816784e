pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::adapters::storage::LocalStorage;
pub use crate::config::StackConfig;
pub use crate::core::health::HealthGate;
pub use crate::core::ledger::{LedgerSummary, ResultLedger};
pub use crate::core::orchestrator::SetupOrchestrator;
pub use crate::core::session::{Credentials, SessionGuard};
pub use crate::core::transport::{ApiRequest, ApiResponse, RequestBody, RetryingTransport, TransportError};
pub use crate::domain::model::{ActionOutcome, RetryPolicy, ServiceHealth};
pub use crate::utils::error::{Result, SetupError};
