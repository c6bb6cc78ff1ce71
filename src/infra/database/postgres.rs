//! PostgreSQL database client implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

use crate::domain::{
    AccountStore, AppError, DatabaseError, ExchangeKind, ExchangeRecord, ExchangeStatus,
    ExchangeStore, FailureLogEntry, OriginalRequest, Routing,
};

/// Approval status of an identity submission that proves identity
const VERIFIED_SUBMISSION_STATUS: &str = "Verified";

const EXCHANGE_COLUMNS: &str = r#"
    id, kind, currency_from, currency_to, amount_from, expected_amount,
    address_from, address_to, extra_id_to, extra_id_from, status,
    is_logged_in, user_id, is_locked, original_currency_to, original_address_to,
    original_extra_id_to, original_expected_amount, completed_exchange_id,
    verification_checked_at, referral_earnings, created_at, updated_at
"#;

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// PostgreSQL database client with connection pooling
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client with custom configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client with default configuration
    pub async fn with_defaults(database_url: &str) -> Result<Self, AppError> {
        Self::new(database_url, PostgresConfig::default()).await
    }

    /// Run database migrations using sqlx migrate
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Migration(e.to_string())))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying connection pool (for testing)
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Parse a database row into an ExchangeRecord.
    /// Nullable `original_*` columns become [`Routing::Held`] when present.
    fn row_to_exchange(row: &sqlx::postgres::PgRow) -> Result<ExchangeRecord, AppError> {
        let kind_str: String = row.get("kind");
        let status_str: String = row.get("status");
        let original_currency_to: Option<String> = row.get("original_currency_to");
        let original_address_to: Option<String> = row.get("original_address_to");

        let routing = match (original_currency_to, original_address_to) {
            (Some(currency_to), Some(address_to)) => Routing::Held {
                original: OriginalRequest {
                    currency_to,
                    address_to,
                    extra_id_to: row.get("original_extra_id_to"),
                    expected_amount: row.get("original_expected_amount"),
                },
            },
            _ => Routing::Direct,
        };

        Ok(ExchangeRecord {
            id: row.get("id"),
            kind: kind_str.parse().unwrap_or(ExchangeKind::Floating),
            currency_from: row.get("currency_from"),
            currency_to: row.get("currency_to"),
            amount_from: row.get("amount_from"),
            expected_amount: row.get("expected_amount"),
            address_from: row.get("address_from"),
            address_to: row.get("address_to"),
            extra_id_to: row.get("extra_id_to"),
            extra_id_from: row.get("extra_id_from"),
            status: ExchangeStatus::from(status_str),
            is_logged_in: row.get("is_logged_in"),
            user_id: row.get("user_id"),
            routing,
            completed_exchange_id: row.get("completed_exchange_id"),
            verification_checked_at: row.get("verification_checked_at"),
            referral_earnings: row.get("referral_earnings"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ExchangeStore for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(id = %record.id, status = %record.status))]
    async fn insert_exchange(&self, record: &ExchangeRecord) -> Result<(), AppError> {
        let original = record.original();

        sqlx::query(
            r#"
            INSERT INTO exchanges (
                id, kind, currency_from, currency_to, amount_from, expected_amount,
                address_from, address_to, extra_id_to, extra_id_from, status,
                is_logged_in, user_id, is_locked, original_currency_to, original_address_to,
                original_extra_id_to, original_expected_amount, completed_exchange_id,
                verification_checked_at, referral_earnings, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(&record.id)
        .bind(record.kind.as_str())
        .bind(&record.currency_from)
        .bind(&record.currency_to)
        .bind(record.amount_from)
        .bind(record.expected_amount)
        .bind(&record.address_from)
        .bind(&record.address_to)
        .bind(&record.extra_id_to)
        .bind(&record.extra_id_from)
        .bind(record.status.as_str())
        .bind(record.is_logged_in)
        .bind(&record.user_id)
        .bind(record.is_locked())
        .bind(original.map(|o| o.currency_to.as_str()))
        .bind(original.map(|o| o.address_to.as_str()))
        .bind(original.and_then(|o| o.extra_id_to.as_deref()))
        .bind(original.and_then(|o| o.expected_amount))
        .bind(&record.completed_exchange_id)
        .bind(record.verification_checked_at)
        .bind(record.referral_earnings)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_exchange(&self, id: &str) -> Result<Option<ExchangeRecord>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM exchanges WHERE id = $1",
            EXCHANGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        row.as_ref().map(Self::row_to_exchange).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_provider_id(&self, id: &str) -> Result<Option<ExchangeRecord>, AppError> {
        // A direct id match wins over a follow-on match
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM exchanges
            WHERE id = $1 OR completed_exchange_id = $1
            ORDER BY (id = $1) DESC
            LIMIT 1
            "#,
            EXCHANGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        row.as_ref().map(Self::row_to_exchange).transpose()
    }

    #[instrument(skip(self))]
    async fn list_locked_exchanges(&self) -> Result<Vec<ExchangeRecord>, AppError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM exchanges
            WHERE is_locked = TRUE
            ORDER BY created_at ASC
            "#,
            EXCHANGE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        rows.iter().map(Self::row_to_exchange).collect()
    }

    #[instrument(skip(self))]
    async fn touch_verification_check(
        &self,
        id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE exchanges
            SET verification_checked_at = $1,
                updated_at = NOW()
            WHERE id = $2 AND is_locked = TRUE
            "#,
        )
        .bind(checked_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn unlock_exchange(
        &self,
        id: &str,
        completed_exchange_id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE exchanges
            SET status = 'exchanging',
                is_locked = FALSE,
                completed_exchange_id = $1,
                verification_checked_at = $2,
                updated_at = NOW()
            WHERE id = $3 AND is_locked = TRUE AND status = 'locked'
            "#,
        )
        .bind(completed_exchange_id)
        .bind(checked_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: &str, status: &ExchangeStatus) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE exchanges
            SET status = $1,
                updated_at = NOW()
            WHERE id = $2 AND is_locked = FALSE
            "#,
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, entry), fields(stage = %entry.stage.as_str()))]
    async fn log_failure(&self, entry: &FailureLogEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO exchange_failures (id, exchange_id, user_id, stage, request, error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.exchange_id)
        .bind(&entry.user_id)
        .bind(entry.stage.as_str())
        .bind(&entry.request)
        .bind(&entry.error)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(())
    }
}

#[async_trait]
impl AccountStore for PostgresClient {
    #[instrument(skip(self))]
    async fn account_verified_flag(&self, user_id: &str) -> Result<Option<bool>, AppError> {
        let row = sqlx::query("SELECT is_verified FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(row.map(|r| r.get::<bool, _>("is_verified")))
    }

    #[instrument(skip(self))]
    async fn has_verified_submission(&self, user_id: &str) -> Result<bool, AppError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM identity_verifications
                WHERE user_id = $1 AND status = $2
            ) AS verified
            "#,
        )
        .bind(user_id)
        .bind(VERIFIED_SUBMISSION_STATUS)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(row.get("verified"))
    }

    #[instrument(skip(self))]
    async fn mark_account_verified(&self, user_id: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET is_verified = TRUE,
                updated_at = NOW()
            WHERE id = $1 AND is_verified = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }
}
