use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use vrin_auth::crypto::CryptoEngine;
use vrin_auth::identity::{IdentityProvider, JwksKeyStore, StytchClient};
use vrin_auth::legacy::{HttpLegacyBackend, LegacyBackend};
use vrin_auth::store::{CredentialLedger, MemoryLedger, PgLedger};
use vrin_auth::{api, AppState, Config, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vrin_auth=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("vrin-auth v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}:{}", config.host, config.port);

    let ledger: Arc<dyn CredentialLedger> = match (&config.database_url, &config.master_key) {
        (Some(db_url), Some(master_key)) => {
            let crypto = CryptoEngine::new(master_key)?;
            let ledger = PgLedger::new(db_url, crypto).await?;
            ledger.migrate().await?;
            info!("Credential ledger: PostgreSQL, migrated ✓");
            Arc::new(ledger)
        }
        _ => {
            tracing::warn!(
                "DATABASE_URL not set: credential ledger is in memory and \
                 member → legacy account links are lost on restart"
            );
            Arc::new(MemoryLedger::new())
        }
    };

    let identity: Arc<dyn IdentityProvider> = Arc::new(StytchClient::from_config(&config));
    let legacy: Arc<dyn LegacyBackend> = Arc::new(HttpLegacyBackend::new(
        config.legacy_api_url.clone(),
        config.legacy_api_key.clone(),
    ));
    info!("Stytch API: {}", config.stytch_base_url());

    let jwks = JwksKeyStore::new(&config.stytch_base_url(), &config.stytch_project_id);
    match jwks.warm_cache().await {
        Ok(()) => info!("JWKS keys cached ✓ (local session verification enabled)"),
        Err(e) => {
            tracing::warn!(
                "⚠️  Failed to fetch JWKS keys: {e}. \
                 Session JWT verification will retry on first request."
            );
        }
    }

    let state: SharedState = Arc::new(AppState::new(
        config.clone(),
        identity,
        legacy,
        ledger,
        Some(jwks),
    ));

    let app = api::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready ✓");
    axum::serve(listener, app).await?;

    Ok(())
}
