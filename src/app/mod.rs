//! Application layer containing business logic and shared state.

pub mod address_policy;
pub mod lock_policy;
pub mod quote_service;
pub mod reconciliation;
pub mod service;
pub mod state;
pub mod verification;
pub mod worker;

pub use address_policy::AddressPolicy;
pub use lock_policy::{LockPolicy, LockPolicyConfig};
pub use quote_service::QuoteService;
pub use reconciliation::ReconciliationService;
pub use service::ExchangeService;
pub use state::AppState;
pub use verification::VerificationResolver;
pub use worker::{ReconciliationWorker, WorkerConfig, spawn_worker};
