//! Lock decision for new exchanges.
//!
//! Large exchanges from callers that are anonymous or unverified are routed
//! to a custodial holding currency and address until the owner verifies.
//! The threshold is compared against the raw source amount; no price
//! conversion happens, so 1000 units of a low-value coin lock as readily as
//! 1000 units of a stablecoin.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;

use crate::domain::{AppError, ConfigError};

pub const DEFAULT_LOCK_THRESHOLD: Decimal = dec!(1000);
pub const DEFAULT_HOLDING_CURRENCY: &str = "usdttrc20";
pub const LOCK_ADVISORY_MESSAGE: &str = "This exchange is held pending identity verification. \
     Your funds are safe and will be sent to your address once your identity is verified.";

/// Lock policy settings
#[derive(Debug, Clone)]
pub struct LockPolicyConfig {
    pub threshold: Decimal,
    pub holding_currency: String,
    pub holding_address: Option<String>,
    pub advisory_message: String,
}

impl Default for LockPolicyConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LOCK_THRESHOLD,
            holding_currency: DEFAULT_HOLDING_CURRENCY.to_string(),
            holding_address: None,
            advisory_message: LOCK_ADVISORY_MESSAGE.to_string(),
        }
    }
}

impl LockPolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let threshold = match env::var("LOCK_THRESHOLD").ok().filter(|v| !v.is_empty()) {
            Some(raw) => raw
                .parse::<Decimal>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "LOCK_THRESHOLD".to_string(),
                    message: e.to_string(),
                })?,
            None => DEFAULT_LOCK_THRESHOLD,
        };

        let holding_currency = env::var("HOLDING_CURRENCY")
            .ok()
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_HOLDING_CURRENCY.to_string());

        let holding_address = env::var("HOLDING_ADDRESS")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(Self {
            threshold,
            holding_currency,
            holding_address,
            ..Default::default()
        })
    }

    #[must_use]
    pub fn with_holding_address(mut self, address: impl Into<String>) -> Self {
        self.holding_address = Some(address.into());
        self
    }
}

/// Pure lock decision plus the custodial destination it routes to
#[derive(Debug, Clone)]
pub struct LockPolicy {
    config: LockPolicyConfig,
}

impl LockPolicy {
    #[must_use]
    pub fn new(config: LockPolicyConfig) -> Self {
        Self { config }
    }

    /// `amount >= threshold` and the caller is not a verified user.
    /// Anonymous callers pass `verified = false`.
    pub fn should_lock(&self, amount: Decimal, verified: bool) -> bool {
        amount >= self.config.threshold && !verified
    }

    pub fn holding_currency(&self) -> &str {
        &self.config.holding_currency
    }

    pub fn holding_address(&self) -> Result<&str, AppError> {
        self.config
            .holding_address
            .as_deref()
            .ok_or(AppError::Config(ConfigError::MissingHoldingAddress))
    }

    pub fn advisory_message(&self) -> &str {
        &self.config.advisory_message
    }

    pub fn threshold(&self) -> Decimal {
        self.config.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> LockPolicy {
        LockPolicy::new(LockPolicyConfig::default().with_holding_address("THolding"))
    }

    #[test]
    fn test_below_threshold_never_locks() {
        let policy = policy();
        for amount in [dec!(0), dec!(10), dec!(999.99999999)] {
            assert!(!policy.should_lock(amount, false));
            assert!(!policy.should_lock(amount, true));
        }
    }

    #[test]
    fn test_at_or_above_threshold_locks_unverified() {
        let policy = policy();
        assert!(policy.should_lock(dec!(1000), false));
        assert!(policy.should_lock(dec!(1500), false));
        assert!(policy.should_lock(dec!(1000000), false));
    }

    #[test]
    fn test_verified_never_locks() {
        let policy = policy();
        assert!(!policy.should_lock(dec!(1000), true));
        assert!(!policy.should_lock(dec!(1500), true));
    }

    #[test]
    fn test_threshold_is_in_source_units() {
        // 1000 units of a coin worth a fraction of a cent still locks: the
        // amount is not price-converted before the comparison.
        let policy = policy();
        assert!(policy.should_lock(dec!(1000), false));
        // And 0.5 BTC, worth far more than the threshold in fiat, does not.
        assert!(!policy.should_lock(dec!(0.5), false));
    }

    #[test]
    fn test_missing_holding_address_is_config_error() {
        let policy = LockPolicy::new(LockPolicyConfig::default());
        assert!(matches!(
            policy.holding_address(),
            Err(AppError::Config(ConfigError::MissingHoldingAddress))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = LockPolicyConfig::default();
        assert_eq!(config.threshold, dec!(1000));
        assert_eq!(config.holding_currency, "usdttrc20");
        assert!(!config.advisory_message.is_empty());
    }
}
