//! Locked-exchange reconciliation.
//!
//! One run walks every locked record sequentially. Users who have verified
//! since creation get a follow-on provider exchange from the holding
//! currency to their original destination; everyone else only has the
//! check timestamp refreshed. A failure on one record is reported in the
//! run's results and never stops the run. Scheduling lives outside this
//! module (the HTTP trigger or [`super::worker`]).

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::domain::{
    AppError, ExchangeProvider, ExchangeRecord, ExchangeStore, FailureLogEntry, FailureStage,
    ProviderExchangeRequest, ReconcileOutcome, ReconciliationEntry, ReconciliationReport,
};

use super::quote_service::QuoteService;
use super::service::append_failure;
use super::verification::VerificationResolver;

pub struct ReconciliationService {
    store: Arc<dyn ExchangeStore>,
    provider: Arc<dyn ExchangeProvider>,
    quotes: Arc<QuoteService>,
    verification: Arc<VerificationResolver>,
}

fn entry(record: &ExchangeRecord, status: ReconcileOutcome, message: impl Into<String>) -> ReconciliationEntry {
    ReconciliationEntry {
        exchange_id: record.id.clone(),
        status,
        message: message.into(),
    }
}

impl ReconciliationService {
    #[must_use]
    pub fn new(
        store: Arc<dyn ExchangeStore>,
        provider: Arc<dyn ExchangeProvider>,
        quotes: Arc<QuoteService>,
        verification: Arc<VerificationResolver>,
    ) -> Self {
        Self {
            store,
            provider,
            quotes,
            verification,
        }
    }

    /// Re-evaluate every locked exchange once.
    /// Only listing the candidates can fail the run as a whole.
    #[instrument(skip(self))]
    pub async fn reconcile_locked_exchanges(&self) -> Result<ReconciliationReport, AppError> {
        let locked = self.store.list_locked_exchanges().await?;
        info!(count = locked.len(), "Reconciling locked exchanges");

        let mut results = Vec::with_capacity(locked.len());
        for record in &locked {
            let result = self.reconcile_one(record).await;
            match result.status {
                ReconcileOutcome::Error => {
                    warn!(exchange_id = %record.id, user_id = %record.user_id, outcome = %result.status, message = %result.message, "Reconciliation failed for exchange")
                }
                _ => {
                    info!(exchange_id = %record.id, user_id = %record.user_id, outcome = %result.status, "Exchange reconciled")
                }
            }
            results.push(result);
        }

        let report = ReconciliationReport::new(results);
        info!(
            processed = report.processed,
            unlocked = report.count(ReconcileOutcome::Unlocked),
            still_locked = report.count(ReconcileOutcome::StillLocked),
            errors = report.count(ReconcileOutcome::Error),
            "Reconciliation run complete"
        );
        Ok(report)
    }

    async fn reconcile_one(&self, record: &ExchangeRecord) -> ReconciliationEntry {
        let Some(original) = record.original() else {
            return entry(
                record,
                ReconcileOutcome::Error,
                "Locked exchange has no original destination",
            );
        };

        let verified = match self.verification.is_verified(&record.user_id).await {
            Ok(verified) => verified,
            Err(e) => {
                return entry(
                    record,
                    ReconcileOutcome::Error,
                    format!("Verification check failed: {e}"),
                );
            }
        };

        let checked_at = Utc::now();

        if !verified {
            return match self
                .store
                .touch_verification_check(&record.id, checked_at)
                .await
            {
                Ok(()) => entry(record, ReconcileOutcome::StillLocked, "User not yet verified"),
                Err(e) => entry(
                    record,
                    ReconcileOutcome::Error,
                    format!("Failed to record verification check: {e}"),
                ),
            };
        }

        let Some(amount) = record.expected_amount else {
            return entry(
                record,
                ReconcileOutcome::Error,
                "Locked exchange has no held amount to forward",
            );
        };

        // The record's destination is the holding currency it was locked into
        let holding_currency = record.currency_to.as_str();

        let expected_out = match self
            .quotes
            .quote(holding_currency, &original.currency_to, amount)
            .await
        {
            Ok(estimate) => estimate,
            Err(failure) => {
                return entry(
                    record,
                    ReconcileOutcome::Error,
                    format!("Quote failed: {failure}"),
                );
            }
        };

        let follow_on = ProviderExchangeRequest {
            from: holding_currency.to_string(),
            to: original.currency_to.clone(),
            address: original.address_to.clone(),
            amount,
            extra_id: original.extra_id_to.clone(),
            refund_address: None,
            refund_extra_id: None,
            fixed: false,
        };

        let exchange = match self.provider.create_exchange(&follow_on).await {
            Ok(exchange) => exchange,
            Err(e) => {
                self.log_failure(record, &follow_on, None, e.to_string())
                    .await;
                return entry(
                    record,
                    ReconcileOutcome::Error,
                    format!("Provider rejected follow-on exchange: {e}"),
                );
            }
        };

        match self
            .store
            .unlock_exchange(&record.id, &exchange.id, checked_at)
            .await
        {
            Ok(true) => entry(
                record,
                ReconcileOutcome::Unlocked,
                format!(
                    "Follow-on exchange {} created, expecting {} {}",
                    exchange.id,
                    expected_out.normalize(),
                    original.currency_to
                ),
            ),
            Ok(false) => {
                let message = format!(
                    "Exchange was no longer locked; follow-on exchange {} needs manual review",
                    exchange.id
                );
                self.log_failure(record, &follow_on, Some(&exchange.id), message.clone())
                    .await;
                entry(record, ReconcileOutcome::Error, message)
            }
            Err(e) => {
                error!(exchange_id = %record.id, follow_on_id = %exchange.id, error = %e, "Follow-on exchange created but unlock not persisted");
                let message = format!(
                    "Follow-on exchange {} created but unlock not persisted: {e}",
                    exchange.id
                );
                self.log_failure(record, &follow_on, Some(&exchange.id), message.clone())
                    .await;
                entry(record, ReconcileOutcome::Error, message)
            }
        }
    }

    async fn log_failure(
        &self,
        record: &ExchangeRecord,
        follow_on: &ProviderExchangeRequest,
        follow_on_id: Option<&str>,
        error: String,
    ) {
        let request = serde_json::json!({
            "provider_request": serde_json::to_value(follow_on).unwrap_or_default(),
            "follow_on_id": follow_on_id,
        });
        append_failure(
            self.store.as_ref(),
            FailureLogEntry::new(
                FailureStage::Reconciliation,
                Some(record.id.clone()),
                &record.user_id,
                request,
                error,
            ),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ANONYMOUS_USER_ID, ExchangeKind, ExchangeStatus, OriginalRequest, Routing,
    };
    use crate::test_utils::{MockAccountStore, MockExchangeProvider, MockExchangeStore};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const BTC_ADDRESS: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";

    struct Harness {
        store: Arc<MockExchangeStore>,
        accounts: Arc<MockAccountStore>,
        provider: Arc<MockExchangeProvider>,
        service: ReconciliationService,
    }

    fn harness() -> Harness {
        let store = Arc::new(MockExchangeStore::new());
        let accounts = Arc::new(MockAccountStore::new());
        let provider = Arc::new(MockExchangeProvider::new());
        let service = ReconciliationService::new(
            store.clone(),
            provider.clone(),
            Arc::new(QuoteService::new(provider.clone())),
            Arc::new(VerificationResolver::new(accounts.clone())),
        );
        Harness {
            store,
            accounts,
            provider,
            service,
        }
    }

    fn locked_record(id: &str, user_id: &str, age_secs: i64) -> ExchangeRecord {
        let created = Utc::now() - Duration::seconds(age_secs);
        ExchangeRecord {
            id: id.to_string(),
            kind: ExchangeKind::Floating,
            currency_from: "usdt".to_string(),
            currency_to: "usdttrc20".to_string(),
            amount_from: dec!(1500),
            expected_amount: Some(dec!(1497.5)),
            address_from: Some("payin".to_string()),
            address_to: "THolding".to_string(),
            extra_id_to: None,
            extra_id_from: None,
            status: ExchangeStatus::Locked,
            is_logged_in: user_id != ANONYMOUS_USER_ID,
            user_id: user_id.to_string(),
            routing: Routing::Held {
                original: OriginalRequest {
                    currency_to: "btc".to_string(),
                    address_to: format!("{BTC_ADDRESS}-{id}"),
                    extra_id_to: None,
                    expected_amount: Some(dec!(0.023)),
                },
            },
            completed_exchange_id: None,
            verification_checked_at: None,
            referral_earnings: Decimal::ZERO,
            created_at: created,
            updated_at: created,
        }
    }

    #[tokio::test]
    async fn test_empty_run() {
        let h = harness();
        let report = h.service.reconcile_locked_exchanges().await.unwrap();
        assert!(report.success);
        assert_eq!(report.processed, 0);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_unverified_user_stays_locked() {
        let h = harness();
        h.accounts.add_user("u1", false);
        h.store.seed(locked_record("ex_1", "u1", 60));

        let report = h.service.reconcile_locked_exchanges().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.results[0].status, ReconcileOutcome::StillLocked);

        let record = h.store.get("ex_1").unwrap();
        assert!(record.is_locked());
        assert_eq!(record.status, ExchangeStatus::Locked);
        assert!(record.verification_checked_at.is_some());
        assert!(h.provider.created_requests().is_empty());
    }

    #[tokio::test]
    async fn test_verified_user_is_unlocked() {
        let h = harness();
        h.accounts.add_user("u1", false);
        h.accounts.add_verified_submission("u1");
        h.store.seed(locked_record("ex_1", "u1", 60));

        let report = h.service.reconcile_locked_exchanges().await.unwrap();
        assert_eq!(report.results[0].status, ReconcileOutcome::Unlocked);

        let sent = &h.provider.created_requests()[0];
        assert_eq!(sent.from, "usdttrc20");
        assert_eq!(sent.to, "btc");
        assert_eq!(sent.amount, dec!(1497.5));
        assert_eq!(sent.address, format!("{BTC_ADDRESS}-ex_1"));

        let record = h.store.get("ex_1").unwrap();
        assert_eq!(record.status, ExchangeStatus::Exchanging);
        assert!(!record.is_locked());
        assert_eq!(record.completed_exchange_id.as_deref(), Some("mock_ex_1"));
        assert!(record.verification_checked_at.is_some());
        // Original destination is kept for audit
        assert_eq!(record.original().unwrap().currency_to, "btc");
        // Verification flag was written back
        assert!(h.accounts.is_flag_set("u1"));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_run() {
        let h = harness();
        for (id, age) in [("ex_1", 300), ("ex_2", 200), ("ex_3", 100)] {
            h.accounts.add_user(&format!("user_{id}"), true);
            h.store
                .seed(locked_record(id, &format!("user_{id}"), age));
        }
        h.provider.reject_address(&format!("{BTC_ADDRESS}-ex_2"));

        let report = h.service.reconcile_locked_exchanges().await.unwrap();
        assert_eq!(report.processed, 3);
        let outcomes: Vec<_> = report
            .results
            .iter()
            .map(|r| (r.exchange_id.as_str(), r.status))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("ex_1", ReconcileOutcome::Unlocked),
                ("ex_2", ReconcileOutcome::Error),
                ("ex_3", ReconcileOutcome::Unlocked),
            ]
        );

        let failed = h.store.get("ex_2").unwrap();
        assert!(failed.is_locked());
        assert!(failed.verification_checked_at.is_none());
        assert!(failed.completed_exchange_id.is_none());

        let log = h.store.failure_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].stage, FailureStage::Reconciliation);
    }

    #[tokio::test]
    async fn test_record_released_concurrently_is_reported() {
        let h = harness();
        h.accounts.add_user("u1", true);
        h.store.seed(locked_record("ex_1", "u1", 60));
        h.store.set_release_after_listing(true);

        let report = h.service.reconcile_locked_exchanges().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.results[0].status, ReconcileOutcome::Error);
        assert!(report.results[0].message.contains("mock_ex_1"));

        // The concurrent release is not overwritten
        let record = h.store.get("ex_1").unwrap();
        assert_eq!(record.status, ExchangeStatus::Exchanging);
        assert!(record.completed_exchange_id.is_none());

        let log = h.store.failure_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].stage, FailureStage::Reconciliation);
        assert_eq!(log[0].exchange_id.as_deref(), Some("ex_1"));
        assert_eq!(log[0].request["follow_on_id"], "mock_ex_1");
    }

    #[tokio::test]
    async fn test_unlock_write_failure_is_reported() {
        let h = harness();
        h.accounts.add_user("u1", true);
        h.accounts.add_user("u2", false);
        h.store.seed(locked_record("ex_1", "u1", 60));
        h.store.seed(locked_record("ex_2", "u2", 30));
        h.store.set_fail_unlocks(true);

        let report = h.service.reconcile_locked_exchanges().await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.results[0].status, ReconcileOutcome::Error);
        assert!(report.results[0].message.contains("mock_ex_1"));
        assert!(report.results[0].message.contains("unlock not persisted"));
        // The run carries on past the failed write
        assert_eq!(report.results[1].status, ReconcileOutcome::StillLocked);

        assert!(h.store.get("ex_1").unwrap().is_locked());
        assert_eq!(h.provider.created_requests().len(), 1);

        let log = h.store.failure_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].stage, FailureStage::Reconciliation);
        assert_eq!(log[0].request["follow_on_id"], "mock_ex_1");
    }

    #[tokio::test]
    async fn test_quote_failure_is_reported() {
        let h = harness();
        h.accounts.add_user("u1", true);
        h.store.seed(locked_record("ex_1", "u1", 60));
        h.provider
            .fail_estimates(400, Some("pair_is_inactive"), "Pair is inactive");

        let report = h.service.reconcile_locked_exchanges().await.unwrap();
        assert_eq!(report.results[0].status, ReconcileOutcome::Error);
        assert!(report.results[0].message.contains("Pair is inactive"));
        assert!(h.store.get("ex_1").unwrap().is_locked());
        assert!(h.provider.created_requests().is_empty());
    }

    #[tokio::test]
    async fn test_unlocked_and_terminal_records_untouched() {
        let h = harness();
        h.accounts.add_user("u1", true);
        let mut done = locked_record("ex_done", "u1", 60);
        done.status = ExchangeStatus::Finished;
        let mut released = locked_record("ex_released", "u1", 60);
        released.status = ExchangeStatus::Exchanging;
        h.store.seed(done.clone());
        h.store.seed(released.clone());

        let report = h.service.reconcile_locked_exchanges().await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(h.store.get("ex_done").unwrap(), done);
        assert_eq!(h.store.get("ex_released").unwrap(), released);
    }

    #[tokio::test]
    async fn test_rerun_after_unlock_is_noop() {
        let h = harness();
        h.accounts.add_user("u1", true);
        h.store.seed(locked_record("ex_1", "u1", 60));

        h.service.reconcile_locked_exchanges().await.unwrap();
        let report = h.service.reconcile_locked_exchanges().await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(h.provider.created_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_listing_failure_fails_run() {
        let store = Arc::new(MockExchangeStore::failing("db down"));
        let provider = Arc::new(MockExchangeProvider::new());
        let service = ReconciliationService::new(
            store,
            provider.clone(),
            Arc::new(QuoteService::new(provider)),
            Arc::new(VerificationResolver::new(Arc::new(MockAccountStore::new()))),
        );
        assert!(service.reconcile_locked_exchanges().await.is_err());
    }
}
