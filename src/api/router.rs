//! Router construction, middleware and rate limiting.

use std::env;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use governor::{DefaultDirectRateLimiter, Quota};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::app::AppState;
use crate::domain::AppError;

use super::admin::{list_locked_handler, reconcile_handler};
use super::handlers::{
    ApiDoc, create_exchange_handler, currencies_handler, exchange_status_handler,
    get_exchange_handler, health_check_handler, liveness_handler, rate_handler,
    readiness_handler, validate_address_handler,
};

const REQUEST_BODY_LIMIT: usize = 64 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Global request rate limit settings
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 20,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            requests_per_second: env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.requests_per_second),
            burst_size: env::var("RATE_LIMIT_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.burst_size),
        }
    }

    fn quota(&self) -> Quota {
        let rps = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst_size).unwrap_or(rps);
        Quota::per_second(rps).allow_burst(burst)
    }
}

async fn rate_limit_middleware(
    State(limiter): State<Arc<DefaultDirectRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if limiter.check().is_err() {
        warn!(path = %request.uri().path(), "Rate limit exceeded");
        return AppError::RateLimited.into_response();
    }
    next.run(request).await
}

fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/exchanges", post(create_exchange_handler))
        .route("/exchanges/{id}", get(get_exchange_handler))
        .route("/exchanges/{id}/status", get(exchange_status_handler))
        .route("/rate", get(rate_handler))
        .route("/currencies", get(currencies_handler))
        .route("/addresses/validate", post(validate_address_handler))
        .route("/admin/reconcile", post(reconcile_handler).get(reconcile_handler))
        .route("/admin/exchanges/locked", get(list_locked_handler))
        .with_state(state)
}

fn health_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .with_state(state)
}

fn with_common_layers(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(RequestBodyLimitLayer::new(REQUEST_BODY_LIMIT))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Router without rate limiting
pub fn create_router(state: Arc<AppState>) -> Router {
    with_common_layers(api_routes(Arc::clone(&state)).merge(health_routes(state)))
}

/// Router with a global rate limit on API routes; health probes are exempt
pub fn create_router_with_rate_limit(state: Arc<AppState>, config: RateLimitConfig) -> Router {
    let limiter = Arc::new(DefaultDirectRateLimiter::direct(config.quota()));
    let limited = api_routes(Arc::clone(&state))
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    with_common_layers(limited.merge(health_routes(state)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_config_default() {
        let config = RateLimitConfig::default();
        assert_eq!(config.requests_per_second, 10);
        assert_eq!(config.burst_size, 20);
    }

    #[test]
    fn test_zero_values_fall_back_to_minimum_quota() {
        let config = RateLimitConfig {
            requests_per_second: 0,
            burst_size: 0,
        };
        assert_eq!(config.quota().burst_size().get(), 1);
    }
}
