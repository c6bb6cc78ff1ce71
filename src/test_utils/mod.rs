//! Test utilities and mock implementations.

pub mod mocks;

pub use mocks::{
    MockAccountStore, MockConfig, MockExchangeProvider, MockExchangeStore,
    StaticIdentityResolver,
};
