//! Floating-rate quotes with provider error normalization.
//!
//! Every failure resolves to the error-shaped [`QuoteResult`]; nothing here
//! returns `Err` to the caller. Recognising the provider's "below minimum"
//! answer relies on free text, so that parsing lives in one place:
//! [`parse_min_amount`].

use std::sync::{Arc, LazyLock};

use regex::Regex;
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use crate::domain::{
    AppError, ExchangeProvider, ExternalServiceError, MIN_AMOUNT_ERROR, QuoteFailure, QuoteResult,
};

/// Logical tickers that the provider only knows by a chain-qualified name
const PROVIDER_TICKERS: &[(&str, &str)] = &[
    ("USDT", "USDTERC20"),
    ("USDC", "USDCERC20"),
    ("BUSD", "BUSDBSC"),
];

/// Provider error codes that mean "amount outside the accepted range"
const MIN_AMOUNT_CODES: &[&str] = &["deposit_too_small", "out_of_range"];

static MIN_AMOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Min:\s*([0-9]+(?:\.[0-9]+)?)").expect("min amount pattern is valid")
});

/// Translate a logical ticker into the provider's network-qualified ticker.
/// Unmapped tickers pass through uppercased.
pub fn provider_ticker(ticker: &str) -> String {
    let upper = ticker.trim().to_ascii_uppercase();
    PROVIDER_TICKERS
        .iter()
        .find(|(logical, _)| *logical == upper)
        .map(|(_, mapped)| (*mapped).to_string())
        .unwrap_or(upper)
}

/// Extract the `Min: <value>` token from unstructured provider text
pub fn parse_min_amount(text: &str) -> Option<String> {
    MIN_AMOUNT_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn is_min_amount_error(code: Option<&str>, message: &str) -> bool {
    code.is_some_and(|c| MIN_AMOUNT_CODES.contains(&c))
        || message.contains("fall within the range")
        || MIN_AMOUNT_PATTERN.is_match(message)
}

/// Classify a provider failure for the ticker being quoted from
pub fn normalize_failure(err: &AppError, from_ticker: &str) -> QuoteFailure {
    match err {
        AppError::ExternalService(ExternalServiceError::ApiError { error, message, .. }) => {
            if is_min_amount_error(error.as_deref(), message) {
                QuoteFailure::MinAmount {
                    min_amount: parse_min_amount(message)
                        .or_else(|| error.as_deref().and_then(parse_min_amount)),
                    currency: from_ticker.to_string(),
                }
            } else {
                QuoteFailure::Unavailable(message.clone())
            }
        }
        other => QuoteFailure::Unavailable(other.to_string()),
    }
}

impl From<QuoteFailure> for QuoteResult {
    fn from(failure: QuoteFailure) -> Self {
        match failure {
            QuoteFailure::MinAmount {
                min_amount,
                currency,
            } => QuoteResult::Error {
                error: MIN_AMOUNT_ERROR.to_string(),
                min_amount,
                currency: Some(currency),
            },
            QuoteFailure::Unavailable(message) => QuoteResult::Error {
                error: message,
                min_amount: None,
                currency: None,
            },
        }
    }
}

/// Quote adapter over the exchange provider
pub struct QuoteService {
    provider: Arc<dyn ExchangeProvider>,
}

impl QuoteService {
    #[must_use]
    pub fn new(provider: Arc<dyn ExchangeProvider>) -> Self {
        Self { provider }
    }

    /// Estimated output amount, or the normalized failure
    #[instrument(skip(self))]
    pub async fn quote(&self, from: &str, to: &str, amount: Decimal) -> Result<Decimal, QuoteFailure> {
        let from_ticker = provider_ticker(from);
        let to_ticker = provider_ticker(to);

        match self
            .provider
            .estimate(
                &from_ticker.to_ascii_lowercase(),
                &to_ticker.to_ascii_lowercase(),
                amount,
            )
            .await
        {
            Ok(estimate) => {
                debug!(from = %from_ticker, to = %to_ticker, estimate = %estimate, "Quote obtained");
                Ok(estimate)
            }
            Err(e) => {
                let failure = normalize_failure(&e, &from_ticker);
                warn!(from = %from_ticker, to = %to_ticker, error = %e, "Quote failed");
                Err(failure)
            }
        }
    }

    /// `{ rate }` on success, `{ error, minAmount?, currency? }` otherwise
    pub async fn get_rate(&self, from: &str, to: &str, amount: Decimal) -> QuoteResult {
        match self.quote(from, to, amount).await {
            Ok(estimate) => QuoteResult::Rate {
                rate: estimate.normalize().to_string(),
            },
            Err(failure) => failure.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockConfig, MockExchangeProvider};
    use rust_decimal_macros::dec;

    fn range_error(message: &str) -> AppError {
        AppError::ExternalService(ExternalServiceError::ApiError {
            status_code: 400,
            error: Some("out_of_range".to_string()),
            message: message.to_string(),
        })
    }

    const RANGE_MESSAGE: &str = "Amount does not fall within the range. Min: 50.5 Max: 100000";

    #[test]
    fn test_provider_ticker_mapping() {
        assert_eq!(provider_ticker("usdt"), "USDTERC20");
        assert_eq!(provider_ticker("USDC"), "USDCERC20");
        assert_eq!(provider_ticker("busd"), "BUSDBSC");
        assert_eq!(provider_ticker("btc"), "BTC");
        assert_eq!(provider_ticker("usdttrc20"), "USDTTRC20");
    }

    #[test]
    fn test_parse_min_amount() {
        assert_eq!(
            parse_min_amount("Amount does not fall within the range. Min: 50.5 Max: 10000"),
            Some("50.5".to_string())
        );
        assert_eq!(parse_min_amount("Min:0.0021"), Some("0.0021".to_string()));
        assert_eq!(parse_min_amount("Min: 12"), Some("12".to_string()));
        assert_eq!(parse_min_amount("Amount is too small"), None);
    }

    #[test]
    fn test_normalize_range_error_with_value() {
        let failure = normalize_failure(&range_error(RANGE_MESSAGE), "USDTERC20");
        assert_eq!(
            failure,
            QuoteFailure::MinAmount {
                min_amount: Some("50.5".to_string()),
                currency: "USDTERC20".to_string()
            }
        );
    }

    #[test]
    fn test_normalize_range_error_without_value() {
        let failure = normalize_failure(&range_error("Amount does not fall within the range"), "BTC");
        assert_eq!(
            failure,
            QuoteFailure::MinAmount {
                min_amount: None,
                currency: "BTC".to_string()
            }
        );
    }

    #[test]
    fn test_normalize_other_errors() {
        let err = AppError::ExternalService(ExternalServiceError::ApiError {
            status_code: 400,
            error: Some("pair_is_inactive".to_string()),
            message: "Pair is inactive".to_string(),
        });
        assert_eq!(
            normalize_failure(&err, "BTC"),
            QuoteFailure::Unavailable("Pair is inactive".to_string())
        );

        let err = AppError::ExternalService(ExternalServiceError::Timeout("10s".to_string()));
        assert!(matches!(
            normalize_failure(&err, "BTC"),
            QuoteFailure::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_get_rate_success() {
        let provider = Arc::new(MockExchangeProvider::new());
        provider.set_estimate(dec!(0.0234500));
        let service = QuoteService::new(provider.clone());

        let result = service.get_rate("usdt", "btc", dec!(1500)).await;
        assert_eq!(result.rate(), Some("0.02345"));

        let calls = provider.estimate_calls();
        assert_eq!(
            calls,
            vec![("usdterc20".to_string(), "btc".to_string(), dec!(1500))]
        );
    }

    #[tokio::test]
    async fn test_get_rate_min_amount() {
        let provider = Arc::new(MockExchangeProvider::new());
        provider.fail_estimates(400, Some("out_of_range"), RANGE_MESSAGE);
        let service = QuoteService::new(provider);

        let result = service.get_rate("usdt", "btc", dec!(10)).await;
        assert!(result.is_min_amount());
        assert_eq!(
            result,
            QuoteResult::Error {
                error: MIN_AMOUNT_ERROR.to_string(),
                min_amount: Some("50.5".to_string()),
                currency: Some("USDTERC20".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_get_rate_transport_failure_resolves_to_error() {
        let provider = Arc::new(MockExchangeProvider::with_config(MockConfig::failure(
            "connection refused",
        )));
        let service = QuoteService::new(provider);

        let result = service.get_rate("btc", "eth", dec!(1)).await;
        assert!(result.rate().is_none());
        assert!(!result.is_min_amount());
    }
}
