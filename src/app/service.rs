//! Exchange creation, lookup and provider status synchronization.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use validator::Validate;

use crate::domain::{
    ANONYMOUS_USER_ID, AppError, ConfigError, CreateExchangeRequest, CreateExchangeResponse,
    ExchangeKind, ExchangeProvider, ExchangeRecord, ExchangeStatus, ExchangeStore, ExchangeView,
    ExternalServiceError, FailureLogEntry, FailureStage, HealthResponse, HealthStatus,
    OriginalRequest, ProviderExchangeRequest, Routing, UserIdentity, ValidationError,
};

use super::address_policy::AddressPolicy;
use super::lock_policy::LockPolicy;
use super::quote_service::QuoteService;
use super::verification::VerificationResolver;

/// Creation request with every required field present
struct ExchangeDraft {
    currency_from: String,
    currency_to: String,
    address_to: String,
    amount: Decimal,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ExchangeDraft {
    fn from_request(request: &CreateExchangeRequest) -> Result<Self, AppError> {
        let (Some(currency_from), Some(currency_to), Some(address_to), Some(amount)) = (
            non_blank(&request.currency_from),
            non_blank(&request.currency_to),
            non_blank(&request.address_to),
            request.amount,
        ) else {
            return Err(ValidationError::MissingFields(request.missing_fields()).into());
        };

        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;

        if amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidField {
                field: "amount".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(Self {
            currency_from: currency_from.to_ascii_lowercase(),
            currency_to: currency_to.to_ascii_lowercase(),
            address_to,
            amount,
        })
    }
}

/// Surface a provider API failure with the provider's own status code and message
pub(crate) fn provider_failure(err: AppError) -> AppError {
    match err {
        AppError::ExternalService(ExternalServiceError::ApiError {
            status_code,
            message,
            ..
        }) => AppError::ProviderRejected {
            status_code,
            message,
        },
        other => other,
    }
}

/// Best-effort append to the failure log
pub(crate) async fn append_failure(store: &dyn ExchangeStore, entry: FailureLogEntry) {
    if let Err(e) = store.log_failure(&entry).await {
        warn!(
            stage = %entry.stage.as_str(),
            exchange_id = ?entry.exchange_id,
            error = %e,
            "Failed to append to failure log"
        );
    }
}

/// Application service for the exchange lifecycle
pub struct ExchangeService {
    store: Arc<dyn ExchangeStore>,
    provider: Arc<dyn ExchangeProvider>,
    quotes: Arc<QuoteService>,
    verification: Arc<VerificationResolver>,
    address_policy: Arc<AddressPolicy>,
    lock_policy: LockPolicy,
}

impl ExchangeService {
    #[must_use]
    pub fn new(
        store: Arc<dyn ExchangeStore>,
        provider: Arc<dyn ExchangeProvider>,
        quotes: Arc<QuoteService>,
        verification: Arc<VerificationResolver>,
        address_policy: Arc<AddressPolicy>,
        lock_policy: LockPolicy,
    ) -> Self {
        Self {
            store,
            provider,
            quotes,
            verification,
            address_policy,
            lock_policy,
        }
    }

    pub fn lock_policy(&self) -> &LockPolicy {
        &self.lock_policy
    }

    /// Create an exchange with the provider, holding it in custody when the
    /// lock policy requires, and persist the record.
    #[instrument(skip(self, request, identity), fields(user_id = identity.map_or(ANONYMOUS_USER_ID, |i| i.user_id.as_str())))]
    pub async fn create_exchange(
        &self,
        request: &CreateExchangeRequest,
        identity: Option<&UserIdentity>,
    ) -> Result<CreateExchangeResponse, AppError> {
        let draft = ExchangeDraft::from_request(request).inspect_err(|e| {
            warn!(error = %e, "Exchange request rejected");
        })?;

        // Held exchanges replay this destination later, so it is checked up front
        let destination = self
            .address_policy
            .validate(&draft.address_to, &draft.currency_to);
        if !destination.is_valid {
            warn!(currency_to = %draft.currency_to, reason = %destination.message, "Destination address rejected");
            return Err(ValidationError::InvalidAddress(destination.message).into());
        }

        if !self.provider.is_configured() {
            error!(config_error = true, "Exchange provider API key is not configured");
            return Err(ConfigError::MissingProviderKey.into());
        }

        let verified = match identity {
            Some(identity) => match self.verification.is_verified(&identity.user_id).await {
                Ok(verified) => verified,
                Err(e) => {
                    warn!(user_id = %identity.user_id, error = %e, "Verification lookup failed, treating as unverified");
                    false
                }
            },
            None => false,
        };

        let locked = self.lock_policy.should_lock(draft.amount, verified);
        info!(
            amount = %draft.amount,
            verified,
            locked,
            threshold = %self.lock_policy.threshold(),
            "Lock decision made"
        );

        let (target_currency, target_address, target_extra_id, quoted, routing) = if locked {
            let holding_address = self.lock_policy.holding_address().inspect_err(|_| {
                error!(config_error = true, "Holding address is not configured");
            })?;
            let holding_currency = self.lock_policy.holding_currency();

            let quoted = self
                .quotes
                .quote(&draft.currency_from, holding_currency, draft.amount)
                .await
                .map_err(AppError::Quote)?;

            let original_expected = self
                .quotes
                .quote(&draft.currency_from, &draft.currency_to, draft.amount)
                .await
                .ok();

            let routing = Routing::Held {
                original: OriginalRequest {
                    currency_to: draft.currency_to.clone(),
                    address_to: draft.address_to.clone(),
                    extra_id_to: non_blank(&request.extra_id_to),
                    expected_amount: original_expected,
                },
            };
            (
                holding_currency.to_string(),
                holding_address.to_string(),
                None,
                Some(quoted),
                routing,
            )
        } else {
            (
                draft.currency_to.clone(),
                draft.address_to.clone(),
                non_blank(&request.extra_id_to),
                None,
                Routing::Direct,
            )
        };

        let provider_request = ProviderExchangeRequest {
            from: draft.currency_from.clone(),
            to: target_currency.clone(),
            address: target_address.clone(),
            amount: draft.amount,
            extra_id: target_extra_id.clone(),
            refund_address: non_blank(&request.user_refund_address),
            refund_extra_id: non_blank(&request.user_refund_extra_id),
            fixed: false,
        };
        let user_id = identity
            .map(|i| i.user_id.clone())
            .unwrap_or_else(|| ANONYMOUS_USER_ID.to_string());
        let requested = serde_json::json!({
            "request": serde_json::to_value(request).unwrap_or_default(),
            "provider_request": serde_json::to_value(&provider_request).unwrap_or_default(),
        });

        let exchange = match self.provider.create_exchange(&provider_request).await {
            Ok(exchange) => exchange,
            Err(e) => {
                error!(error = %e, "Provider exchange creation failed");
                append_failure(
                    self.store.as_ref(),
                    FailureLogEntry::new(
                        FailureStage::ProviderCreate,
                        None,
                        &user_id,
                        requested,
                        e.to_string(),
                    ),
                )
                .await;
                return Err(provider_failure(e));
            }
        };

        let now = Utc::now();
        let record = ExchangeRecord {
            id: exchange.id.clone(),
            kind: ExchangeKind::Floating,
            currency_from: draft.currency_from,
            currency_to: target_currency,
            amount_from: draft.amount,
            expected_amount: exchange.amount.or(quoted),
            address_from: exchange.payin_address.clone(),
            address_to: target_address,
            extra_id_to: target_extra_id,
            extra_id_from: exchange.payin_extra_id.clone(),
            status: if locked {
                ExchangeStatus::Locked
            } else {
                ExchangeStatus::Waiting
            },
            is_logged_in: identity.is_some(),
            user_id: user_id.clone(),
            routing,
            completed_exchange_id: None,
            verification_checked_at: None,
            referral_earnings: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.store.insert_exchange(&record).await {
            let occurred_at = Utc::now();
            error!(
                exchange_id = %record.id,
                error = %e,
                "Exchange created upstream but not persisted"
            );
            append_failure(
                self.store.as_ref(),
                FailureLogEntry::new(
                    FailureStage::Persistence,
                    Some(record.id.clone()),
                    &user_id,
                    requested.clone(),
                    e.to_string(),
                ),
            )
            .await;
            return Err(AppError::PersistenceAfterCreate {
                exchange_id: record.id,
                requested,
                occurred_at,
                message: e.to_string(),
            });
        }

        info!(exchange_id = %record.id, status = %record.status, "Exchange created");

        Ok(CreateExchangeResponse {
            exchange,
            is_locked: locked,
            message: locked.then(|| self.lock_policy.advisory_message().to_string()),
        })
    }

    /// Get an exchange record by id
    #[instrument(skip(self))]
    pub async fn get_exchange(&self, id: &str) -> Result<ExchangeView, AppError> {
        self.store
            .get_exchange(id)
            .await?
            .map(|record| ExchangeView::from_record(&record, self.lock_policy.advisory_message()))
            .ok_or_else(|| AppError::NotFound(format!("Exchange {id} not found")))
    }

    /// Currently locked exchanges, oldest first
    #[instrument(skip(self))]
    pub async fn list_locked(&self) -> Result<Vec<ExchangeView>, AppError> {
        let records = self.store.list_locked_exchanges().await?;
        Ok(records
            .iter()
            .map(|r| ExchangeView::from_record(r, self.lock_policy.advisory_message()))
            .collect())
    }

    /// Mirror the provider's live status into the matching record.
    ///
    /// Matches on the record id or the follow-on exchange id. Locked records
    /// are left alone until reconciliation releases them. With no matching
    /// record the provider status is returned without persisting anything.
    #[instrument(skip(self))]
    pub async fn sync_status(&self, id: &str) -> Result<ExchangeStatus, AppError> {
        let live = self
            .provider
            .get_exchange_status(id)
            .await
            .map_err(provider_failure)?;

        match self.store.find_by_provider_id(id).await? {
            Some(record) if record.is_locked() => {
                debug!(exchange_id = %record.id, provider_status = %live.status, "Record is locked, status not mirrored");
            }
            Some(record) if record.status == live.status => {
                debug!(exchange_id = %record.id, status = %live.status, "Status unchanged");
            }
            Some(record) => {
                let updated = self.store.update_status(&record.id, &live.status).await?;
                info!(
                    exchange_id = %record.id,
                    from = %record.status,
                    to = %live.status,
                    updated,
                    "Exchange status mirrored from provider"
                );
            }
            None => {
                debug!(provider_id = %id, status = %live.status, "No local record, returning provider status");
            }
        }

        Ok(live.status)
    }

    /// Pass-through of the provider's active currency list
    #[instrument(skip(self))]
    pub async fn list_currencies(&self) -> Result<Vec<serde_json::Value>, AppError> {
        self.provider
            .list_currencies()
            .await
            .map_err(provider_failure)
    }

    /// Perform health check on all dependencies
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let db_health = match self.store.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        };
        let provider_health = if self.provider.is_configured() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthResponse::new(db_health, provider_health)
    }
}
