//! Application entry point.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::SecretString;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use exchange_gateway::api::{RateLimitConfig, create_router, create_router_with_rate_limit};
use exchange_gateway::app::{AppState, LockPolicyConfig, WorkerConfig, spawn_worker};
use exchange_gateway::infra::{
    HttpExchangeProvider, JwtIdentityResolver, PostgresClient, PostgresConfig, ProviderConfig,
};

/// Application configuration
struct Config {
    database_url: String,
    host: String,
    port: u16,
    provider_config: ProviderConfig,
    lock_config: LockPolicyConfig,
    /// Bearer secret for the reconciliation trigger and admin routes
    reconcile_secret: Option<SecretString>,
    /// HS256 secret for identity tokens; absent means every caller is anonymous
    jwt_secret: Option<SecretString>,
    enable_rate_limiting: bool,
    rate_limit_config: RateLimitConfig,
    worker_config: WorkerConfig,
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);
        let enable_rate_limiting = env::var("ENABLE_RATE_LIMITING")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let reconcile_secret = env::var("RECONCILE_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);
        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let lock_config = LockPolicyConfig::from_env().context("Invalid lock policy configuration")?;

        Ok(Self {
            database_url,
            host,
            port,
            provider_config: ProviderConfig::from_env(),
            lock_config,
            reconcile_secret,
            jwt_secret,
            enable_rate_limiting,
            rate_limit_config: RateLimitConfig::from_env(),
            worker_config: WorkerConfig::from_env(),
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("Exchange Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    info!("Initializing infrastructure...");

    let postgres_client =
        PostgresClient::new(&config.database_url, PostgresConfig::default()).await?;
    postgres_client.run_migrations().await?;
    let postgres_client = Arc::new(postgres_client);
    info!("   ✓ Database connected and migrations applied");

    let provider = HttpExchangeProvider::new(config.provider_config.clone())?;
    if config.provider_config.api_key.is_some() {
        info!(base_url = %config.provider_config.base_url, "   ✓ Exchange provider configured");
    } else {
        warn!(config_error = true, "   ⚠ PROVIDER_API_KEY not set - exchange creation will fail");
    }

    if config.lock_config.holding_address.is_none() {
        warn!(
            config_error = true,
            "   ⚠ HOLDING_ADDRESS not set - exchanges that must lock will fail"
        );
    }
    info!(
        threshold = %config.lock_config.threshold,
        holding_currency = %config.lock_config.holding_currency,
        "   ✓ Lock policy loaded"
    );

    let mut app_state = AppState::new(
        postgres_client.clone(),
        postgres_client,
        Arc::new(provider),
        config.lock_config.clone(),
    );

    if let Some(secret) = config.jwt_secret.as_ref() {
        app_state = app_state.with_identity_resolver(Arc::new(JwtIdentityResolver::new(secret)));
        info!("   ✓ Identity tokens enabled");
    } else {
        warn!("   ⚠ JWT_SECRET not set - every caller is treated as anonymous");
    }

    if let Some(secret) = config.reconcile_secret.clone() {
        app_state = app_state.with_reconcile_secret(secret);
        info!("   ✓ Reconciliation trigger secured");
    } else {
        warn!(
            config_error = true,
            "   ⚠ RECONCILE_SECRET not set - reconciliation trigger will reject every call"
        );
    }

    let app_state = Arc::new(app_state);

    let worker_shutdown_tx = if config.worker_config.enabled {
        let (_worker_handle, shutdown_tx) = spawn_worker(
            Arc::clone(&app_state.reconciliation),
            config.worker_config.clone(),
        );
        info!(
            interval_secs = config.worker_config.interval.as_secs(),
            "   ✓ Reconciliation worker started"
        );
        Some(shutdown_tx)
    } else {
        info!("   ○ Reconciliation worker disabled (external trigger only)");
        None
    };

    let router = if config.enable_rate_limiting {
        info!("   ✓ Rate limiting enabled");
        create_router_with_rate_limit(app_state, config.rate_limit_config)
    } else {
        info!("   ○ Rate limiting disabled");
        create_router(app_state)
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server starting on http://{}", addr);
    info!("Swagger UI available at http://{}/swagger-ui", addr);
    info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(tx) = worker_shutdown_tx {
        let _ = tx.send(true);
    }

    info!("Server shutdown complete");
    Ok(())
}
