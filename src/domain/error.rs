//! Error taxonomy shared by every layer.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("External service error: {0}")]
    ExternalService(#[from] ExternalServiceError),

    /// Quote could not be obtained (includes provider minimum-amount rejections)
    #[error("Quote error: {0}")]
    Quote(QuoteFailure),

    /// Provider refused to create an exchange
    #[error("Provider rejected exchange ({status_code}): {message}")]
    ProviderRejected { status_code: u16, message: String },

    /// Provider created the exchange but the local record could not be written.
    /// Money may already be moving upstream.
    #[error(
        "Exchange {exchange_id} created upstream but not persisted at {occurred_at}: {message}"
    )]
    PersistenceAfterCreate {
        exchange_id: String,
        requested: serde_json::Value,
        occurred_at: DateTime<Utc>,
        message: String,
    },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Rate limit exceeded")]
    RateLimited,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Validation failed: {0}")]
    Multiple(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Exchange provider API key is not configured")]
    MissingProviderKey,

    #[error("Holding wallet address is not configured")]
    MissingHoldingAddress,

    #[error("Reconciliation secret is not configured")]
    MissingReconcileSecret,

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound(err.to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Duplicate(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(err.to_string())
            }
            _ => Self::Query(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExternalServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Provider returned {status_code}: {message}")]
    ApiError {
        status_code: u16,
        /// Machine-readable `error` field of the provider body, if any
        error: Option<String>,
        /// Human-readable `message`/`description` of the provider body
        message: String,
    },

    #[error("Failed to parse provider response: {0}")]
    ParseError(String),

    #[error("Provider rate limited: {0}")]
    RateLimited(String),
}

impl From<reqwest::Error> for ExternalServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Structured quote failure, kept rich enough for the caller to retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteFailure {
    #[error("Amount is below the provider minimum{}", min_amount.as_ref().map(|m| format!(" of {m}")).unwrap_or_default())]
    MinAmount {
        min_amount: Option<String>,
        currency: String,
    },

    #[error("{0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_message_lists_fields() {
        let err = ValidationError::MissingFields(vec!["amount".to_string(), "address_to".to_string()]);
        assert_eq!(err.to_string(), "Missing required fields: amount, address_to");
    }

    #[test]
    fn test_min_amount_message() {
        let err = QuoteFailure::MinAmount {
            min_amount: Some("50.5".to_string()),
            currency: "USDTERC20".to_string(),
        };
        assert_eq!(err.to_string(), "Amount is below the provider minimum of 50.5");

        let err = QuoteFailure::MinAmount {
            min_amount: None,
            currency: "BTC".to_string(),
        };
        assert_eq!(err.to_string(), "Amount is below the provider minimum");
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_not_found() {
        let err = DatabaseError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }
}
