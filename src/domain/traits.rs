//! Domain traits defining contracts for external systems.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::error::AppError;
use super::types::{
    ExchangeRecord, ExchangeStatus, FailureLogEntry, ProviderExchange, ProviderExchangeRequest,
    ProviderExchangeStatus, UserIdentity,
};

/// Settlement networks addresses are validated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Bitcoin,
    Ethereum,
    BinanceSmartChain,
    Tron,
    Solana,
    Litecoin,
    Dogecoin,
}

impl Network {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bitcoin => "bitcoin",
            Self::Ethereum => "ethereum",
            Self::BinanceSmartChain => "bsc",
            Self::Tron => "tron",
            Self::Solana => "solana",
            Self::Litecoin => "litecoin",
            Self::Dogecoin => "dogecoin",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Third-party exchange-rate, quote and settlement provider
#[async_trait]
pub trait ExchangeProvider: Send + Sync {
    /// Whether the provider credential is present
    fn is_configured(&self) -> bool;

    /// Floating-rate estimate of the output amount for `amount` of `from`
    async fn estimate(&self, from: &str, to: &str, amount: Decimal) -> Result<Decimal, AppError>;

    /// Create an exchange on the provider side
    async fn create_exchange(
        &self,
        request: &ProviderExchangeRequest,
    ) -> Result<ProviderExchange, AppError>;

    /// Live status of an exchange
    async fn get_exchange_status(&self, id: &str) -> Result<ProviderExchangeStatus, AppError>;

    /// Every currency the provider supports, passed through unmodified
    async fn list_currencies(&self) -> Result<Vec<serde_json::Value>, AppError>;
}

/// Persistence of exchange records and the failure log
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    /// Check database connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    async fn insert_exchange(&self, record: &ExchangeRecord) -> Result<(), AppError>;

    async fn get_exchange(&self, id: &str) -> Result<Option<ExchangeRecord>, AppError>;

    /// Find a record by its own id or by the id of its follow-on exchange
    async fn find_by_provider_id(&self, id: &str) -> Result<Option<ExchangeRecord>, AppError>;

    /// Every record currently held pending verification
    async fn list_locked_exchanges(&self) -> Result<Vec<ExchangeRecord>, AppError>;

    /// Record that a held exchange was re-checked; status is left alone
    async fn touch_verification_check(
        &self,
        id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Move a held exchange to `exchanging`, only if it is still `locked`.
    /// Returns `false` when the precondition did not hold.
    async fn unlock_exchange(
        &self,
        id: &str,
        completed_exchange_id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Mirror a provider status onto a record that is not held.
    /// Returns `false` when no row was updated.
    async fn update_status(&self, id: &str, status: &ExchangeStatus) -> Result<bool, AppError>;

    /// Append to the failed-swap audit log
    async fn log_failure(&self, entry: &FailureLogEntry) -> Result<(), AppError>;
}

/// Read access (plus the verified-flag write-back) to the account store
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Account-level verification flag; `None` when the user is unknown
    async fn account_verified_flag(&self, user_id: &str) -> Result<Option<bool>, AppError>;

    /// Whether any identity submission of the user is in the `Verified` state
    async fn has_verified_submission(&self, user_id: &str) -> Result<bool, AppError>;

    /// Set the account-level verification flag
    async fn mark_account_verified(&self, user_id: &str) -> Result<(), AppError>;
}

/// Network address-format checks (checksums, charsets, lengths)
pub trait AddressValidator: Send + Sync {
    fn is_valid(&self, network: Network, address: &str) -> bool;
}

/// Resolves a caller credential to a user identity
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, credential: &str) -> Result<UserIdentity, AppError>;
}
