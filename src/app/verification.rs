//! Identity verification status.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::{AccountStore, AppError};

/// Decides whether a user currently counts as verified
pub struct VerificationResolver {
    accounts: Arc<dyn AccountStore>,
}

impl VerificationResolver {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    /// True when the account flag is set, or an approved submission exists.
    ///
    /// In the second case the account flag is written back so later checks
    /// short-circuit. A failed write-back is logged and does not change the
    /// answer.
    #[instrument(skip(self))]
    pub async fn is_verified(&self, user_id: &str) -> Result<bool, AppError> {
        if self.accounts.account_verified_flag(user_id).await? == Some(true) {
            return Ok(true);
        }

        if !self.accounts.has_verified_submission(user_id).await? {
            return Ok(false);
        }

        match self.accounts.mark_account_verified(user_id).await {
            Ok(()) => info!(user_id = %user_id, "Account verification flag written back"),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to write back verification flag")
            }
        }
        Ok(true)
    }
}
