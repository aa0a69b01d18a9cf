//! # Newsdesk API Server
//!
//! Serves the session endpoints of the newsdesk CMS: login, registration,
//! token refresh, logout and role-gated routes.
//!
//! ## Startup
//!
//! 1. Load configuration from the environment (`.env` honoured)
//! 2. Connect to PostgreSQL and run migrations
//! 3. Create the bootstrap admin if configured
//! 4. Serve until Ctrl-C
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p newsdesk-api
//! ```

use std::sync::Arc;

use anyhow::Context;
use newsdesk_api::{
    app::{build_router, AppState},
    config::Config,
};
use newsdesk_shared::{
    account::AccountService,
    auth::{
        jwt::TokenService,
        password::{CredentialHasher, HashingPool},
    },
    db::{self, pool::DatabaseConfig},
    store::PgUserStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "newsdesk_api=debug,newsdesk_shared=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Newsdesk API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = db::pool::create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..DatabaseConfig::default()
    })
    .await
    .context("failed to connect to database")?;

    db::migrations::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    let tokens = Arc::new(TokenService::new(config.jwt.token_config()));
    let hashing = HashingPool::new(CredentialHasher::new()?, config.auth.hash_concurrency);
    let accounts = AccountService::new(Arc::new(PgUserStore::new(pool.clone())), hashing, tokens);

    if let Some(admin) = &config.bootstrap_admin {
        let created = accounts
            .ensure_admin(&admin.username, &admin.email, &admin.password)
            .await
            .context("failed to create bootstrap admin")?;
        if !created {
            tracing::debug!(username = %admin.username, "Bootstrap admin already exists");
        }
    }

    let bind_address = config.bind_address();
    let app = build_router(AppState::new(accounts, config));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    db::pool::close_pool(pool).await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
