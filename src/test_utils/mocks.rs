//! Mock implementations for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::{
    AccountStore, AppError, ConfigError, DatabaseError, ExchangeProvider, ExchangeRecord,
    ExchangeStatus, ExchangeStore, ExternalServiceError, FailureLogEntry, IdentityResolver,
    ProviderExchange, ProviderExchangeRequest, ProviderExchangeStatus, UserIdentity,
};

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }

    fn message(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "Mock error".to_string())
    }
}

/// Canned provider API failure, rebuilt into an `AppError` on every call
#[derive(Debug, Clone)]
struct ApiFailure {
    status_code: u16,
    error: Option<String>,
    message: String,
}

impl ApiFailure {
    fn to_error(&self) -> AppError {
        AppError::ExternalService(ExternalServiceError::ApiError {
            status_code: self.status_code,
            error: self.error.clone(),
            message: self.message.clone(),
        })
    }
}

// ============================================================================
// Exchange store
// ============================================================================

/// In-memory exchange store for testing
pub struct MockExchangeStore {
    storage: Arc<Mutex<HashMap<String, ExchangeRecord>>>,
    failures: Arc<Mutex<Vec<FailureLogEntry>>>,
    config: MockConfig,
    is_healthy: AtomicBool,
    fail_inserts: AtomicBool,
    fail_unlocks: AtomicBool,
    release_after_listing: AtomicBool,
}

impl MockExchangeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            storage: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(Vec::new())),
            config,
            is_healthy: AtomicBool::new(true),
            fail_inserts: AtomicBool::new(false),
            fail_unlocks: AtomicBool::new(false),
            release_after_listing: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Make only `insert_exchange` fail; reads and the failure log keep working
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::Relaxed);
    }

    /// Make only `unlock_exchange` fail
    pub fn set_fail_unlocks(&self, fail: bool) {
        self.fail_unlocks.store(fail, Ordering::Relaxed);
    }

    /// After each listing, move the listed records out of `locked` as a
    /// concurrent run would
    pub fn set_release_after_listing(&self, release: bool) {
        self.release_after_listing.store(release, Ordering::Relaxed);
    }

    /// Seed a record directly
    pub fn seed(&self, record: ExchangeRecord) {
        self.storage
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<ExchangeRecord> {
        self.storage.lock().unwrap().get(id).cloned()
    }

    pub fn get_all_items(&self) -> Vec<ExchangeRecord> {
        self.storage.lock().unwrap().values().cloned().collect()
    }

    pub fn failure_log(&self) -> Vec<FailureLogEntry> {
        self.failures.lock().unwrap().clone()
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            return Err(AppError::Database(DatabaseError::Query(
                self.config.message(),
            )));
        }
        Ok(())
    }
}

impl Default for MockExchangeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeStore for MockExchangeStore {
    async fn health_check(&self) -> Result<(), AppError> {
        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Unhealthy".to_string(),
            )));
        }
        self.check_should_fail()
    }

    async fn insert_exchange(&self, record: &ExchangeRecord) -> Result<(), AppError> {
        self.check_should_fail()?;
        if self.fail_inserts.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "connection reset".to_string(),
            )));
        }
        let mut storage = self.storage.lock().unwrap();
        if storage.contains_key(&record.id) {
            return Err(AppError::Database(DatabaseError::Duplicate(
                record.id.clone(),
            )));
        }
        storage.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_exchange(&self, id: &str) -> Result<Option<ExchangeRecord>, AppError> {
        self.check_should_fail()?;
        Ok(self.get(id))
    }

    async fn find_by_provider_id(&self, id: &str) -> Result<Option<ExchangeRecord>, AppError> {
        self.check_should_fail()?;
        let storage = self.storage.lock().unwrap();
        if let Some(record) = storage.get(id) {
            return Ok(Some(record.clone()));
        }
        Ok(storage
            .values()
            .find(|r| r.completed_exchange_id.as_deref() == Some(id))
            .cloned())
    }

    async fn list_locked_exchanges(&self) -> Result<Vec<ExchangeRecord>, AppError> {
        self.check_should_fail()?;
        let mut storage = self.storage.lock().unwrap();
        let mut locked: Vec<ExchangeRecord> =
            storage.values().filter(|r| r.is_locked()).cloned().collect();
        locked.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        if self.release_after_listing.load(Ordering::Relaxed) {
            for record in storage.values_mut().filter(|r| r.is_locked()) {
                record.status = ExchangeStatus::Exchanging;
            }
        }
        Ok(locked)
    }

    async fn touch_verification_check(
        &self,
        id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.check_should_fail()?;
        let mut storage = self.storage.lock().unwrap();
        if let Some(record) = storage.get_mut(id).filter(|r| r.is_locked()) {
            record.verification_checked_at = Some(checked_at);
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn unlock_exchange(
        &self,
        id: &str,
        completed_exchange_id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        self.check_should_fail()?;
        if self.fail_unlocks.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Query(
                "unlock rejected".to_string(),
            )));
        }
        let mut storage = self.storage.lock().unwrap();
        match storage.get_mut(id).filter(|r| r.is_locked()) {
            Some(record) => {
                record.status = ExchangeStatus::Exchanging;
                record.completed_exchange_id = Some(completed_exchange_id.to_string());
                record.verification_checked_at = Some(checked_at);
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_status(&self, id: &str, status: &ExchangeStatus) -> Result<bool, AppError> {
        self.check_should_fail()?;
        let mut storage = self.storage.lock().unwrap();
        match storage.get_mut(id).filter(|r| !r.is_locked()) {
            Some(record) => {
                record.status = status.clone();
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn log_failure(&self, entry: &FailureLogEntry) -> Result<(), AppError> {
        self.check_should_fail()?;
        self.failures.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

// ============================================================================
// Account store
// ============================================================================

/// In-memory account store for testing
pub struct MockAccountStore {
    flags: Mutex<HashMap<String, bool>>,
    verified_submissions: Mutex<HashSet<String>>,
    config: MockConfig,
    fail_write_back: AtomicBool,
    write_backs: AtomicUsize,
}

impl MockAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            flags: Mutex::new(HashMap::new()),
            verified_submissions: Mutex::new(HashSet::new()),
            config,
            fail_write_back: AtomicBool::new(false),
            write_backs: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn add_user(&self, user_id: &str, is_verified: bool) {
        self.flags
            .lock()
            .unwrap()
            .insert(user_id.to_string(), is_verified);
    }

    /// Record an approved identity submission without touching the account flag
    pub fn add_verified_submission(&self, user_id: &str) {
        self.verified_submissions
            .lock()
            .unwrap()
            .insert(user_id.to_string());
    }

    pub fn set_fail_write_back(&self, fail: bool) {
        self.fail_write_back.store(fail, Ordering::Relaxed);
    }

    pub fn is_flag_set(&self, user_id: &str) -> bool {
        self.flags
            .lock()
            .unwrap()
            .get(user_id)
            .copied()
            .unwrap_or(false)
    }

    pub fn write_back_count(&self) -> usize {
        self.write_backs.load(Ordering::Relaxed)
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            return Err(AppError::Database(DatabaseError::Connection(
                self.config.message(),
            )));
        }
        Ok(())
    }
}

impl Default for MockAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MockAccountStore {
    async fn account_verified_flag(&self, user_id: &str) -> Result<Option<bool>, AppError> {
        self.check_should_fail()?;
        Ok(self.flags.lock().unwrap().get(user_id).copied())
    }

    async fn has_verified_submission(&self, user_id: &str) -> Result<bool, AppError> {
        self.check_should_fail()?;
        Ok(self.verified_submissions.lock().unwrap().contains(user_id))
    }

    async fn mark_account_verified(&self, user_id: &str) -> Result<(), AppError> {
        self.write_backs.fetch_add(1, Ordering::Relaxed);
        if self.fail_write_back.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Query(
                "write-back rejected".to_string(),
            )));
        }
        self.flags
            .lock()
            .unwrap()
            .insert(user_id.to_string(), true);
        Ok(())
    }
}

// ============================================================================
// Exchange provider
// ============================================================================

/// Programmable exchange provider for testing
pub struct MockExchangeProvider {
    config: MockConfig,
    configured: AtomicBool,
    estimate: Mutex<Decimal>,
    estimate_failure: Mutex<Option<ApiFailure>>,
    estimate_calls: Mutex<Vec<(String, String, Decimal)>>,
    create_failure: Mutex<Option<ApiFailure>>,
    rejected_addresses: Mutex<HashSet<String>>,
    created: Mutex<Vec<ProviderExchangeRequest>>,
    statuses: Mutex<HashMap<String, ExchangeStatus>>,
    next_id: AtomicUsize,
}

impl MockExchangeProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            configured: AtomicBool::new(true),
            estimate: Mutex::new(Decimal::ONE),
            estimate_failure: Mutex::new(None),
            estimate_calls: Mutex::new(Vec::new()),
            create_failure: Mutex::new(None),
            rejected_addresses: Mutex::new(HashSet::new()),
            created: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    /// Provider with no API key: every call is a configuration error
    #[must_use]
    pub fn unconfigured() -> Self {
        let provider = Self::new();
        provider.configured.store(false, Ordering::Relaxed);
        provider
    }

    pub fn set_estimate(&self, estimate: Decimal) {
        *self.estimate.lock().unwrap() = estimate;
    }

    pub fn fail_estimates(&self, status_code: u16, error: Option<&str>, message: &str) {
        *self.estimate_failure.lock().unwrap() = Some(ApiFailure {
            status_code,
            error: error.map(str::to_string),
            message: message.to_string(),
        });
    }

    pub fn fail_creates(&self, status_code: u16, message: &str) {
        *self.create_failure.lock().unwrap() = Some(ApiFailure {
            status_code,
            error: None,
            message: message.to_string(),
        });
    }

    /// Reject creation requests paying out to this address only
    pub fn reject_address(&self, address: &str) {
        self.rejected_addresses
            .lock()
            .unwrap()
            .insert(address.to_string());
    }

    pub fn set_status(&self, id: &str, status: ExchangeStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(id.to_string(), status);
    }

    pub fn estimate_calls(&self) -> Vec<(String, String, Decimal)> {
        self.estimate_calls.lock().unwrap().clone()
    }

    pub fn created_requests(&self) -> Vec<ProviderExchangeRequest> {
        self.created.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<(), AppError> {
        if !self.configured.load(Ordering::Relaxed) {
            return Err(AppError::Config(ConfigError::MissingProviderKey));
        }
        if self.config.should_fail {
            return Err(AppError::ExternalService(ExternalServiceError::Network(
                self.config.message(),
            )));
        }
        Ok(())
    }
}

impl Default for MockExchangeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeProvider for MockExchangeProvider {
    fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Relaxed)
    }

    async fn estimate(&self, from: &str, to: &str, amount: Decimal) -> Result<Decimal, AppError> {
        self.check_available()?;
        self.estimate_calls
            .lock()
            .unwrap()
            .push((from.to_string(), to.to_string(), amount));
        if let Some(failure) = self.estimate_failure.lock().unwrap().as_ref() {
            return Err(failure.to_error());
        }
        Ok(*self.estimate.lock().unwrap())
    }

    async fn create_exchange(
        &self,
        request: &ProviderExchangeRequest,
    ) -> Result<ProviderExchange, AppError> {
        self.check_available()?;
        if let Some(failure) = self.create_failure.lock().unwrap().as_ref() {
            return Err(failure.to_error());
        }
        if self
            .rejected_addresses
            .lock()
            .unwrap()
            .contains(&request.address)
        {
            return Err(AppError::ExternalService(ExternalServiceError::ApiError {
                status_code: 400,
                error: Some("not_valid_address".to_string()),
                message: format!("Invalid payout address: {}", request.address),
            }));
        }

        self.created.lock().unwrap().push(request.clone());
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = format!("mock_ex_{n}");
        self.set_status(&id, ExchangeStatus::Waiting);

        Ok(ProviderExchange {
            id,
            payin_address: Some(format!("payin_{n}")),
            payin_extra_id: None,
            payout_address: Some(request.address.clone()),
            payout_extra_id: request.extra_id.clone(),
            from_currency: Some(request.from.clone()),
            to_currency: Some(request.to.clone()),
            amount: Some(*self.estimate.lock().unwrap()),
            refund_address: request.refund_address.clone(),
            refund_extra_id: request.refund_extra_id.clone(),
        })
    }

    async fn get_exchange_status(&self, id: &str) -> Result<ProviderExchangeStatus, AppError> {
        self.check_available()?;
        self.statuses
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .map(|status| ProviderExchangeStatus {
                id: id.to_string(),
                status,
            })
            .ok_or_else(|| {
                AppError::ExternalService(ExternalServiceError::ApiError {
                    status_code: 404,
                    error: Some("not_found".to_string()),
                    message: format!("Transaction {id} not found"),
                })
            })
    }

    async fn list_currencies(&self) -> Result<Vec<serde_json::Value>, AppError> {
        self.check_available()?;
        Ok(vec![
            serde_json::json!({ "ticker": "btc", "name": "Bitcoin" }),
            serde_json::json!({ "ticker": "usdttrc20", "name": "Tether (TRC20)" }),
        ])
    }
}

// ============================================================================
// Identity resolver
// ============================================================================

/// Resolves a fixed set of tokens to user ids
#[derive(Default)]
pub struct StaticIdentityResolver {
    tokens: HashMap<String, String>,
}

impl StaticIdentityResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: &str, user_id: &str) -> Self {
        self.tokens.insert(token.to_string(), user_id.to_string());
        self
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn resolve(&self, credential: &str) -> Result<UserIdentity, AppError> {
        self.tokens
            .get(credential)
            .map(|user_id| UserIdentity {
                user_id: user_id.clone(),
            })
            .ok_or_else(|| AppError::Authentication("Unknown token".to_string()))
    }
}
