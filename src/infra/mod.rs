//! Infrastructure layer implementations.

pub mod address;
pub mod auth;
pub mod database;
pub mod provider;

pub use address::ChainAddressValidator;
pub use auth::JwtIdentityResolver;
pub use database::{PostgresClient, PostgresConfig};
pub use provider::{HttpExchangeProvider, ProviderConfig};
