//! Domain types with validation support.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Error code the quote adapter uses for provider minimum-amount rejections
pub const MIN_AMOUNT_ERROR: &str = "MIN_AMOUNT";

/// User id recorded on exchanges created without an authenticated identity
pub const ANONYMOUS_USER_ID: &str = "anonymous";

/// Rate commitment mode of an exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    #[default]
    Floating,
    Fixed,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Floating => "floating",
            Self::Fixed => "fixed",
        }
    }
}

impl std::str::FromStr for ExchangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "floating" => Ok(Self::Floating),
            "fixed" => Ok(Self::Fixed),
            _ => Err(format!("Invalid exchange kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of an exchange.
///
/// Provider statuses are mirrored verbatim, so values this service does not
/// know about are carried in [`ExchangeStatus::Other`] instead of rejected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExchangeStatus {
    #[default]
    Waiting,
    Confirming,
    Exchanging,
    Sending,
    Finished,
    Failed,
    Refunded,
    Expired,
    /// Held at the custodial holding address pending identity verification
    Locked,
    Other(String),
}

impl ExchangeStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Waiting => "waiting",
            Self::Confirming => "confirming",
            Self::Exchanging => "exchanging",
            Self::Sending => "sending",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Expired => "expired",
            Self::Locked => "locked",
            Self::Other(raw) => raw,
        }
    }

    /// No further automatic transition happens from a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Refunded | Self::Expired
        )
    }
}

impl From<&str> for ExchangeStatus {
    fn from(s: &str) -> Self {
        match s {
            "waiting" => Self::Waiting,
            "confirming" => Self::Confirming,
            "exchanging" => Self::Exchanging,
            "sending" => Self::Sending,
            "finished" => Self::Finished,
            "failed" => Self::Failed,
            "refunded" => Self::Refunded,
            "expired" => Self::Expired,
            "locked" => Self::Locked,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ExchangeStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<ExchangeStatus> for String {
    fn from(status: ExchangeStatus) -> Self {
        status.as_str().to_string()
    }
}

impl utoipa::PartialSchema for ExchangeStatus {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        utoipa::openapi::ObjectBuilder::new()
            .schema_type(utoipa::openapi::schema::Type::String)
            .description(Some("Exchange status as reported by the provider, or `locked`"))
            .into()
    }
}

impl ToSchema for ExchangeStatus {}

impl std::fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The destination the user actually asked for, kept while funds are held
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginalRequest {
    pub currency_to: String,
    pub address_to: String,
    pub extra_id_to: Option<String>,
    pub expected_amount: Option<Decimal>,
}

/// Where the provider was told to send the output of an exchange
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "routing", rename_all = "snake_case")]
pub enum Routing {
    /// Straight to the user's requested destination
    #[default]
    Direct,
    /// To the custodial holding wallet; the user's request is replayed later
    Held { original: OriginalRequest },
}

/// One swap attempt and its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    /// Provider-assigned identifier
    pub id: String,
    pub kind: ExchangeKind,
    pub currency_from: String,
    /// Currency sent to the provider (the holding currency while held)
    pub currency_to: String,
    pub amount_from: Decimal,
    pub expected_amount: Option<Decimal>,
    /// Deposit address generated by the provider
    pub address_from: Option<String>,
    /// Destination given to the provider (the holding wallet while held)
    pub address_to: String,
    pub extra_id_to: Option<String>,
    pub extra_id_from: Option<String>,
    pub status: ExchangeStatus,
    pub is_logged_in: bool,
    pub user_id: String,
    pub routing: Routing,
    /// Provider id of the follow-on exchange created when a held exchange is released
    pub completed_exchange_id: Option<String>,
    pub verification_checked_at: Option<DateTime<Utc>>,
    pub referral_earnings: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExchangeRecord {
    /// True exactly while the record sits in the `locked` status
    pub fn is_locked(&self) -> bool {
        self.status == ExchangeStatus::Locked
    }

    pub fn original(&self) -> Option<&OriginalRequest> {
        match &self.routing {
            Routing::Held { original } => Some(original),
            Routing::Direct => None,
        }
    }
}

/// Body of the exchange creation endpoint.
///
/// Every field is optional on the wire so that missing values can be reported
/// together instead of failing on the first one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateExchangeRequest {
    #[schema(example = "usdt")]
    #[validate(length(max = 20, message = "Ticker is too long"))]
    pub currency_from: Option<String>,
    #[schema(example = "btc")]
    #[validate(length(max = 20, message = "Ticker is too long"))]
    pub currency_to: Option<String>,
    #[schema(example = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq")]
    #[validate(length(max = 128, message = "Address is too long"))]
    pub address_to: Option<String>,
    #[schema(value_type = Option<String>, example = "1500")]
    pub amount: Option<Decimal>,
    #[validate(length(max = 64, message = "Extra id is too long"))]
    pub extra_id_to: Option<String>,
    #[validate(length(max = 128, message = "Address is too long"))]
    pub user_refund_address: Option<String>,
    #[validate(length(max = 64, message = "Extra id is too long"))]
    pub user_refund_extra_id: Option<String>,
}

impl CreateExchangeRequest {
    /// Names of required fields that are absent or blank
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        let blank = |v: &Option<String>| v.as_deref().map(str::trim).is_none_or(str::is_empty);
        if blank(&self.currency_from) {
            missing.push("currency_from".to_string());
        }
        if blank(&self.currency_to) {
            missing.push("currency_to".to_string());
        }
        if blank(&self.address_to) {
            missing.push("address_to".to_string());
        }
        if self.amount.is_none() {
            missing.push("amount".to_string());
        }
        missing
    }
}

/// Creation request as submitted to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderExchangeRequest {
    pub from: String,
    pub to: String,
    pub address: String,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_extra_id: Option<String>,
    pub fixed: bool,
}

/// Provider creation payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderExchange {
    pub id: String,
    pub payin_address: Option<String>,
    #[serde(default)]
    pub payin_extra_id: Option<String>,
    pub payout_address: Option<String>,
    #[serde(default)]
    pub payout_extra_id: Option<String>,
    pub from_currency: Option<String>,
    pub to_currency: Option<String>,
    /// Provider-quoted output amount
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub refund_address: Option<String>,
    #[serde(default)]
    pub refund_extra_id: Option<String>,
}

/// Live provider view of an exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderExchangeStatus {
    pub id: String,
    pub status: ExchangeStatus,
}

/// Response of the creation endpoint: provider payload plus lock state
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateExchangeResponse {
    #[serde(flatten)]
    pub exchange: ProviderExchange,
    pub is_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Public view of a stored exchange
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeView {
    pub id: String,
    pub kind: ExchangeKind,
    pub currency_from: String,
    pub currency_to: String,
    #[schema(value_type = String)]
    pub amount_from: Decimal,
    #[schema(value_type = Option<String>)]
    pub expected_amount: Option<Decimal>,
    pub address_from: Option<String>,
    pub address_to: String,
    pub extra_id_to: Option<String>,
    pub extra_id_from: Option<String>,
    pub status: ExchangeStatus,
    pub is_logged_in: bool,
    pub is_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_currency_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_address_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub original_expected_amount: Option<Decimal>,
    pub completed_exchange_id: Option<String>,
    pub verification_checked_at: Option<DateTime<Utc>>,
    #[schema(value_type = String)]
    pub referral_earnings: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Advisory shown while funds are held
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExchangeView {
    pub fn from_record(record: &ExchangeRecord, advisory: &str) -> Self {
        let original = record.original();
        Self {
            id: record.id.clone(),
            kind: record.kind,
            currency_from: record.currency_from.clone(),
            currency_to: record.currency_to.clone(),
            amount_from: record.amount_from,
            expected_amount: record.expected_amount,
            address_from: record.address_from.clone(),
            address_to: record.address_to.clone(),
            extra_id_to: record.extra_id_to.clone(),
            extra_id_from: record.extra_id_from.clone(),
            status: record.status.clone(),
            is_logged_in: record.is_logged_in,
            is_locked: record.is_locked(),
            original_currency_to: original.map(|o| o.currency_to.clone()),
            original_address_to: original.map(|o| o.address_to.clone()),
            original_expected_amount: original.and_then(|o| o.expected_amount),
            completed_exchange_id: record.completed_exchange_id.clone(),
            verification_checked_at: record.verification_checked_at,
            referral_earnings: record.referral_earnings,
            created_at: record.created_at,
            updated_at: record.updated_at,
            message: record.is_locked().then(|| advisory.to_string()),
        }
    }
}

/// Normalized quote outcome: `{ rate }` or `{ error, minAmount?, currency? }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum QuoteResult {
    Rate {
        rate: String,
    },
    Error {
        error: String,
        #[serde(rename = "minAmount", default, skip_serializing_if = "Option::is_none")]
        min_amount: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        currency: Option<String>,
    },
}

impl QuoteResult {
    pub fn rate(&self) -> Option<&str> {
        match self {
            Self::Rate { rate } => Some(rate),
            Self::Error { .. } => None,
        }
    }

    pub fn is_min_amount(&self) -> bool {
        matches!(self, Self::Error { error, .. } if error == MIN_AMOUNT_ERROR)
    }
}

/// Query string of the rate endpoint
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RateQuery {
    pub from: String,
    pub to: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
}

/// Body of the address validation endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ValidateAddressRequest {
    #[validate(length(min = 1, max = 128, message = "Address must be 1-128 characters"))]
    pub address: String,
    #[validate(length(min = 1, max = 20, message = "Currency must be 1-20 characters"))]
    pub currency: String,
}

/// Result of an address check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressValidation {
    pub is_valid: bool,
    pub message: String,
}

impl AddressValidation {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            message: "Address is valid".to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
        }
    }
}

/// Identity resolved from a caller's credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: String,
}

/// Per-record outcome of a reconciliation run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Unlocked,
    StillLocked,
    Error,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlocked => "unlocked",
            Self::StillLocked => "still_locked",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationEntry {
    pub exchange_id: String,
    pub status: ReconcileOutcome,
    pub message: String,
}

/// Report returned by the reconciliation trigger
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReconciliationReport {
    pub success: bool,
    pub processed: usize,
    pub results: Vec<ReconciliationEntry>,
}

impl ReconciliationReport {
    pub fn new(results: Vec<ReconciliationEntry>) -> Self {
        Self {
            success: true,
            processed: results.len(),
            results,
        }
    }

    pub fn count(&self, outcome: ReconcileOutcome) -> usize {
        self.results.iter().filter(|r| r.status == outcome).count()
    }
}

/// Body of the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: ExchangeStatus,
}

/// Stage at which an exchange attempt failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    ProviderCreate,
    Persistence,
    Reconciliation,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderCreate => "provider_create",
            Self::Persistence => "persistence",
            Self::Reconciliation => "reconciliation",
        }
    }
}

/// Append-only audit entry for a failed swap attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureLogEntry {
    pub id: String,
    pub exchange_id: Option<String>,
    pub user_id: String,
    pub stage: FailureStage,
    pub request: serde_json::Value,
    pub error: String,
    pub created_at: DateTime<Utc>,
}

impl FailureLogEntry {
    pub fn new(
        stage: FailureStage,
        exchange_id: Option<String>,
        user_id: impl Into<String>,
        request: serde_json::Value,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            exchange_id,
            user_id: user_id.into(),
            stage,
            request,
            error: error.into(),
            created_at: Utc::now(),
        }
    }
}

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Some systems degraded but functional
    Degraded,
    /// Critical systems unavailable
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall system status
    pub status: HealthStatus,
    /// Database health status
    pub database: HealthStatus,
    /// Exchange provider integration status
    pub provider: HealthStatus,
    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
    /// Application version
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    #[must_use]
    pub fn new(database: HealthStatus, provider: HealthStatus) -> Self {
        let status = match (&database, &provider) {
            (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
            (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            database,
            provider,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Structured error body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status code (or the provider's status code for provider rejections)
    #[schema(example = 400)]
    pub code: u16,
    /// Error type identifier
    #[schema(example = "validation_error")]
    pub error: String,
    /// Human-readable description
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_fields: Option<Vec<String>>,
    #[serde(rename = "minAmount", skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: u16, error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code,
            error: error.into(),
            description: description.into(),
            missing_fields: None,
            min_amount: None,
            currency: None,
        }
    }
}
