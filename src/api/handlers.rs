//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
};
use tracing::{debug, error};
use utoipa::OpenApi;
use validator::Validate;

use crate::app::AppState;
use crate::domain::{
    AddressValidation, AppError, CreateExchangeRequest, CreateExchangeResponse, DatabaseError,
    ErrorResponse, ExchangeKind, ExchangeStatus, ExchangeView, ExternalServiceError,
    HealthResponse, HealthStatus, MIN_AMOUNT_ERROR, ProviderExchange, QuoteFailure, QuoteResult,
    RateQuery, ReconcileOutcome, ReconciliationEntry, ReconciliationReport, StatusResponse,
    UserIdentity, ValidateAddressRequest, ValidationError,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Exchange Gateway API",
        version = "0.1.0",
        description = "Crypto exchange front end with verification-gated locked exchanges",
        license(
            name = "MIT"
        )
    ),
    paths(
        create_exchange_handler,
        get_exchange_handler,
        exchange_status_handler,
        rate_handler,
        validate_address_handler,
        currencies_handler,
        health_check_handler,
        liveness_handler,
        readiness_handler,
        crate::api::admin::reconcile_handler,
        crate::api::admin::list_locked_handler,
    ),
    components(
        schemas(
            CreateExchangeRequest,
            CreateExchangeResponse,
            ProviderExchange,
            ExchangeView,
            ExchangeKind,
            ExchangeStatus,
            StatusResponse,
            QuoteResult,
            RateQuery,
            ValidateAddressRequest,
            AddressValidation,
            ReconciliationReport,
            ReconciliationEntry,
            ReconcileOutcome,
            HealthResponse,
            HealthStatus,
            ErrorResponse,
        )
    ),
    tags(
        (name = "exchanges", description = "Exchange creation and tracking"),
        (name = "quotes", description = "Rates, currencies and address checks"),
        (name = "admin", description = "Reconciliation and locked exchange review"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Bearer token from the Authorization header, if any
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Unresolvable or absent credentials make the caller anonymous
fn resolve_identity(state: &AppState, headers: &HeaderMap) -> Option<UserIdentity> {
    let token = bearer_token(headers)?;
    let resolver = state.identity_resolver.as_ref()?;
    match resolver.resolve(token) {
        Ok(identity) => Some(identity),
        Err(e) => {
            debug!(error = %e, "Identity not resolved, continuing as anonymous");
            None
        }
    }
}

/// Create an exchange
///
/// Large exchanges from anonymous or unverified callers are routed to a
/// custodial holding wallet until the owner verifies; the response then
/// carries `isLocked: true` and an advisory `message`.
#[utoipa::path(
    post,
    path = "/exchanges",
    tag = "exchanges",
    request_body = CreateExchangeRequest,
    responses(
        (status = 200, description = "Exchange created", body = CreateExchangeResponse),
        (status = 400, description = "Missing fields or quote error", body = ErrorResponse),
        (status = 500, description = "Configuration or persistence error", body = ErrorResponse),
        (status = 502, description = "Provider error", body = ErrorResponse)
    )
)]
pub async fn create_exchange_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateExchangeRequest>, JsonRejection>,
) -> Result<Json<CreateExchangeResponse>, AppError> {
    let Json(payload) = payload?;
    let identity = resolve_identity(&state, &headers);
    let response = state
        .service
        .create_exchange(&payload, identity.as_ref())
        .await?;
    Ok(Json(response))
}

/// Get an exchange record by ID
#[utoipa::path(
    get,
    path = "/exchanges/{id}",
    tag = "exchanges",
    params(
        ("id" = String, Path, description = "Provider exchange ID")
    ),
    responses(
        (status = 200, description = "Exchange found", body = ExchangeView),
        (status = 404, description = "Exchange not found", body = ErrorResponse)
    )
)]
pub async fn get_exchange_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExchangeView>, AppError> {
    let view = state.service.get_exchange(&id).await?;
    Ok(Json(view))
}

/// Live exchange status, mirrored into the local record
#[utoipa::path(
    get,
    path = "/exchanges/{id}/status",
    tag = "exchanges",
    params(
        ("id" = String, Path, description = "Provider exchange ID or follow-on exchange ID")
    ),
    responses(
        (status = 200, description = "Provider status", body = StatusResponse),
        (status = 502, description = "Provider error", body = ErrorResponse)
    )
)]
pub async fn exchange_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let status = state.service.sync_status(&id).await?;
    Ok(Json(StatusResponse { status }))
}

/// Floating-rate quote
#[utoipa::path(
    get,
    path = "/rate",
    tag = "quotes",
    params(
        ("from" = String, Query, description = "Source ticker"),
        ("to" = String, Query, description = "Destination ticker"),
        ("amount" = String, Query, description = "Source amount")
    ),
    responses(
        (status = 200, description = "`{ rate }` or `{ error, minAmount?, currency? }`", body = QuoteResult),
        (status = 400, description = "Malformed query string", body = ErrorResponse)
    )
)]
pub async fn rate_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RateQuery>, QueryRejection>,
) -> Result<Json<QuoteResult>, AppError> {
    let Query(query) = query?;
    Ok(Json(
        state
            .quotes
            .get_rate(&query.from, &query.to, query.amount)
            .await,
    ))
}

/// Validate a destination address for a ticker
#[utoipa::path(
    post,
    path = "/addresses/validate",
    tag = "quotes",
    request_body = ValidateAddressRequest,
    responses(
        (status = 200, description = "Validation result", body = AddressValidation),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
pub async fn validate_address_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ValidateAddressRequest>, JsonRejection>,
) -> Result<Json<AddressValidation>, AppError> {
    let Json(payload) = payload?;
    if payload.address.trim().is_empty() {
        return Err(AppError::Validation(ValidationError::MissingFields(vec![
            "address".to_string(),
        ])));
    }
    payload
        .validate()
        .map_err(|e| AppError::Validation(ValidationError::Multiple(e.to_string())))?;
    Ok(Json(
        state
            .address_policy
            .validate(&payload.address, &payload.currency),
    ))
}

/// Active currencies, passed through from the provider
#[utoipa::path(
    get,
    path = "/currencies",
    tag = "quotes",
    responses(
        (status = 200, description = "Provider currency list (JSON array, provider schema)"),
        (status = 502, description = "Provider error", body = ErrorResponse)
    )
)]
pub async fn currencies_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<serde_json::Value>>, AppError> {
    let currencies = state.service.list_currencies().await?;
    Ok(Json(currencies))
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Application is ready to serve traffic"),
        (status = 503, description = "Application is not ready")
    )
)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let health = state.service.health_check().await;
    match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = %rejection.status(), "Rejected request body");
        AppError::Validation(ValidationError::MalformedRequest(rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        debug!(status = %rejection.status(), "Rejected query string");
        AppError::Validation(ValidationError::MalformedRequest(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type) = match &self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            AppError::Database(db_err) => match db_err {
                DatabaseError::Connection(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "database_error")
                }
                DatabaseError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                DatabaseError::Duplicate(_) => (StatusCode::CONFLICT, "duplicate"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },
            AppError::ExternalService(ext_err) => match ext_err {
                ExternalServiceError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                ExternalServiceError::RateLimited(_) => {
                    (StatusCode::TOO_MANY_REQUESTS, "rate_limited")
                }
                _ => (StatusCode::BAD_GATEWAY, "provider_error"),
            },
            AppError::Quote(QuoteFailure::MinAmount { .. }) => {
                (StatusCode::BAD_REQUEST, MIN_AMOUNT_ERROR)
            }
            AppError::Quote(QuoteFailure::Unavailable(_)) => {
                (StatusCode::BAD_GATEWAY, "quote_error")
            }
            AppError::ProviderRejected { status_code, .. } => (
                StatusCode::from_u16(*status_code)
                    .ok()
                    .filter(StatusCode::is_client_error)
                    .unwrap_or(StatusCode::BAD_GATEWAY),
                "provider_error",
            ),
            AppError::PersistenceAfterCreate { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error")
            }
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, "authentication_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error")
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        };

        let description = match &self {
            AppError::ProviderRejected { message, .. } => message.clone(),
            AppError::Quote(failure) => failure.to_string(),
            other => other.to_string(),
        };

        match &self {
            AppError::Config(_) => {
                error!(config_error = true, message = %description, "Configuration error");
            }
            AppError::PersistenceAfterCreate {
                exchange_id,
                occurred_at,
                ..
            } => {
                error!(
                    exchange_id = %exchange_id,
                    occurred_at = %occurred_at,
                    message = %description,
                    "Exchange requires manual reconciliation"
                );
            }
            _ if status.is_server_error() => {
                error!(error_type = %error_type, message = %description, "Server error");
            }
            _ => {}
        }

        let mut body = ErrorResponse::new(status.as_u16(), error_type, description);
        match self {
            AppError::Validation(ValidationError::MissingFields(fields)) => {
                body.missing_fields = Some(fields);
            }
            AppError::Quote(QuoteFailure::MinAmount {
                min_amount,
                currency,
            }) => {
                body.min_amount = min_amount;
                body.currency = Some(currency);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConfigError;
    use axum::body::to_bytes;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_missing_fields_body() {
        let (status, body) = body_of(AppError::Validation(ValidationError::MissingFields(vec![
            "amount".to_string(),
        ])))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["missing_fields"][0], "amount");
    }

    #[tokio::test]
    async fn test_min_amount_body() {
        let (status, body) = body_of(AppError::Quote(QuoteFailure::MinAmount {
            min_amount: Some("50.5".to_string()),
            currency: "USDTERC20".to_string(),
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "MIN_AMOUNT");
        assert_eq!(body["minAmount"], "50.5");
        assert_eq!(body["currency"], "USDTERC20");
    }

    #[tokio::test]
    async fn test_provider_rejection_keeps_client_status() {
        let (status, body) = body_of(AppError::ProviderRejected {
            status_code: 422,
            message: "Invalid address".to_string(),
        })
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["description"], "Invalid address");

        let (status, _) = body_of(AppError::ProviderRejected {
            status_code: 500,
            message: "boom".to_string(),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_config_and_persistence_are_server_errors() {
        let (status, body) = body_of(AppError::Config(ConfigError::MissingProviderKey)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "configuration_error");

        let (status, body) = body_of(AppError::PersistenceAfterCreate {
            exchange_id: "ex_1".to_string(),
            requested: serde_json::json!({}),
            occurred_at: chrono::Utc::now(),
            message: "connection reset".to_string(),
        })
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "persistence_error");
        assert!(body["description"].as_str().unwrap().contains("ex_1"));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
