//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    AppError, ConfigError, DatabaseError, ExternalServiceError, QuoteFailure, ValidationError,
};
pub use traits::{
    AccountStore, AddressValidator, ExchangeProvider, ExchangeStore, IdentityResolver, Network,
};
pub use types::{
    ANONYMOUS_USER_ID, AddressValidation, CreateExchangeRequest, CreateExchangeResponse,
    ErrorResponse, ExchangeKind, ExchangeRecord, ExchangeStatus, ExchangeView, FailureLogEntry,
    FailureStage, HealthResponse, HealthStatus, MIN_AMOUNT_ERROR, OriginalRequest,
    ProviderExchange, ProviderExchangeRequest, ProviderExchangeStatus, QuoteResult, RateQuery,
    ReconcileOutcome, ReconciliationEntry, ReconciliationReport, Routing, StatusResponse,
    UserIdentity, ValidateAddressRequest,
};
