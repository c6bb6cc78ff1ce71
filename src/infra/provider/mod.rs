//! Exchange provider integrations.

pub mod http;

pub use http::{
    DEFAULT_PROVIDER_API_URL, DEFAULT_PROVIDER_TIMEOUT_SECS, HttpExchangeProvider, ProviderConfig,
};
