//! HTTP exchange provider implementation.
//!
//! Talks to the third-party exchange provider's REST API: estimates,
//! exchange creation, exchange status and the currency list. Every call
//! carries the API key as a query credential and is bounded by the client
//! timeout; nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error, instrument, warn};

use crate::domain::{
    AppError, ConfigError, ExchangeProvider, ExternalServiceError, ProviderExchange,
    ProviderExchangeRequest, ProviderExchangeStatus,
};

/// Default provider API base URL
pub const DEFAULT_PROVIDER_API_URL: &str = "https://api.changenow.io/v1";

/// Default per-request timeout
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;

/// Provider connection settings
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_PROVIDER_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("PROVIDER_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(SecretString::from);
        let base_url = std::env::var("PROVIDER_API_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_PROVIDER_API_URL.to_string());
        let timeout_secs = std::env::var("PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS);

        Self {
            api_key,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Error body returned by the provider on non-2xx responses
#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResponse {
    estimated_amount: Decimal,
}

/// Exchange provider reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpExchangeProvider {
    http_client: Client,
    api_key: Option<SecretString>,
    base_url: String,
}

impl HttpExchangeProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                AppError::Config(ConfigError::InvalidValue {
                    key: "PROVIDER_TIMEOUT_SECS".to_string(),
                    message: e.to_string(),
                })
            })?;

        Ok(Self {
            http_client,
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .ok_or(AppError::Config(ConfigError::MissingProviderKey))
    }

    /// Turn a non-2xx response into an `ApiError` carrying the provider's fields
    async fn error_from_response(response: Response) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: ProviderErrorBody = serde_json::from_str(&body).unwrap_or_default();

        error!(status = %status, body = %body, "Exchange provider returned error");

        if status.as_u16() == 429 {
            return AppError::ExternalService(ExternalServiceError::RateLimited(body));
        }

        let message = parsed
            .description
            .or(parsed.message)
            .or_else(|| parsed.error.clone())
            .unwrap_or(body);

        AppError::ExternalService(ExternalServiceError::ApiError {
            status_code: status.as_u16(),
            error: parsed.error,
            message,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, AppError> {
        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Exchange provider request failed");
            AppError::ExternalService(ExternalServiceError::from(e))
        })?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl ExchangeProvider for HttpExchangeProvider {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self))]
    async fn estimate(&self, from: &str, to: &str, amount: Decimal) -> Result<Decimal, AppError> {
        let api_key = self.api_key()?;
        let url = format!("{}/exchange-amount", self.base_url);
        debug!(url = %url, "Requesting floating-rate estimate");

        let amount = amount.normalize().to_string();
        let response = self
            .send(self.http_client.get(&url).query(&[
                ("from", from),
                ("to", to),
                ("amount", amount.as_str()),
                ("fixed", "false"),
                ("api_key", api_key),
            ]))
            .await?;

        let estimate: EstimateResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse estimate response");
            AppError::ExternalService(ExternalServiceError::ParseError(e.to_string()))
        })?;

        Ok(estimate.estimated_amount)
    }

    #[instrument(skip(self, request), fields(from = %request.from, to = %request.to, amount = %request.amount))]
    async fn create_exchange(
        &self,
        request: &ProviderExchangeRequest,
    ) -> Result<ProviderExchange, AppError> {
        let api_key = self.api_key()?;
        let url = format!("{}/transactions", self.base_url);

        let response = self
            .send(
                self.http_client
                    .post(&url)
                    .query(&[("api_key", api_key)])
                    .json(request),
            )
            .await?;

        let exchange: ProviderExchange = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse exchange creation response");
            AppError::ExternalService(ExternalServiceError::ParseError(e.to_string()))
        })?;

        debug!(id = %exchange.id, "Provider exchange created");
        Ok(exchange)
    }

    #[instrument(skip(self))]
    async fn get_exchange_status(&self, id: &str) -> Result<ProviderExchangeStatus, AppError> {
        let api_key = self.api_key()?;
        let url = format!("{}/transactions/{}", self.base_url, id);

        let response = self
            .send(self.http_client.get(&url).query(&[("api_key", api_key)]))
            .await?;

        response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse exchange status response");
            AppError::ExternalService(ExternalServiceError::ParseError(e.to_string()))
        })
    }

    #[instrument(skip(self))]
    async fn list_currencies(&self) -> Result<Vec<serde_json::Value>, AppError> {
        let api_key = self.api_key()?;
        let url = format!("{}/currencies", self.base_url);

        let response = self
            .send(
                self.http_client
                    .get(&url)
                    .query(&[("active", "true"), ("api_key", api_key)]),
            )
            .await?;

        let currencies: Vec<serde_json::Value> = response.json().await.map_err(|e| {
            warn!(error = %e, "Failed to parse currency list");
            AppError::ExternalService(ExternalServiceError::ParseError(e.to_string()))
        })?;

        Ok(currencies)
    }
}
