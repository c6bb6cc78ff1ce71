//! Application state management.

use std::sync::Arc;

use secrecy::SecretString;

use crate::domain::{AccountStore, ExchangeProvider, ExchangeStore, IdentityResolver};
use crate::infra::ChainAddressValidator;

use super::address_policy::AddressPolicy;
use super::lock_policy::{LockPolicy, LockPolicyConfig};
use super::quote_service::QuoteService;
use super::reconciliation::ReconciliationService;
use super::service::ExchangeService;
use super::verification::VerificationResolver;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ExchangeService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub quotes: Arc<QuoteService>,
    pub address_policy: Arc<AddressPolicy>,
    /// Resolves bearer tokens on the creation endpoint; absent means every caller is anonymous
    pub identity_resolver: Option<Arc<dyn IdentityResolver>>,
    /// Shared secret guarding the reconciliation trigger and admin routes
    pub reconcile_secret: Option<SecretString>,
}

impl AppState {
    /// Wire every service over the given adapters
    #[must_use]
    pub fn new(
        store: Arc<dyn ExchangeStore>,
        accounts: Arc<dyn AccountStore>,
        provider: Arc<dyn ExchangeProvider>,
        lock_config: LockPolicyConfig,
    ) -> Self {
        let quotes = Arc::new(QuoteService::new(Arc::clone(&provider)));
        let verification = Arc::new(VerificationResolver::new(accounts));
        let address_policy = Arc::new(AddressPolicy::new(Arc::new(ChainAddressValidator::new())));
        let service = Arc::new(ExchangeService::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            Arc::clone(&quotes),
            Arc::clone(&verification),
            Arc::clone(&address_policy),
            LockPolicy::new(lock_config),
        ));
        let reconciliation = Arc::new(ReconciliationService::new(
            store,
            provider,
            Arc::clone(&quotes),
            verification,
        ));

        Self {
            service,
            reconciliation,
            quotes,
            address_policy,
            identity_resolver: None,
            reconcile_secret: None,
        }
    }

    /// Add an identity resolver (builder pattern)
    #[must_use]
    pub fn with_identity_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.identity_resolver = Some(resolver);
        self
    }

    /// Add the reconciliation trigger secret (builder pattern)
    #[must_use]
    pub fn with_reconcile_secret(mut self, secret: SecretString) -> Self {
        self.reconcile_secret = Some(secret);
        self
    }
}
