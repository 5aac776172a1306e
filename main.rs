//! Payments gateway
//!
//! Read-only HTTP view of the payment contracts: supported networks, resolved
//! contract addresses, on-chain fee distributions and payment record refreshes.
//!
//! ## Storage Backends
//!
//! - **Firestore**: used when `FIRESTORE_PROJECT_ID` is set
//! - **In-Memory**: default (data lost on restart)

use jobboard_payments::{
    gateway::{router, GatewayState},
    store::{ConfigStore, FirestoreStore, InMemoryConfigStore},
    PaymentsConfig, RpcProviderFactory,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// How often pending payment records are re-checked
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = PaymentsConfig::from_env()?;
    config.validate()?;

    let store: Arc<dyn ConfigStore> = match &config.firestore {
        Some(firestore) => {
            tracing::info!(project = %firestore.project_id, "Using Firestore storage");
            Arc::new(FirestoreStore::new(firestore.clone())?)
        }
        None => {
            tracing::info!("Using in-memory storage");
            Arc::new(InMemoryConfigStore::new())
        }
    };
    let providers = Arc::new(RpcProviderFactory::new().with_timeout(config.rpc_timeout));
    let state = GatewayState::new(&config, store, providers);

    let payments = state.payments.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            match payments.refresh_pending().await {
                Ok(records) if !records.is_empty() => {
                    tracing::info!(count = records.len(), "Refreshed pending payments")
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Pending payment refresh failed"),
            }
        }
    });

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %config.bind_address, "Payments gateway listening");
    tracing::info!("Routes: GET /health, GET /networks, GET /networks/normalize?name=, GET /contracts/{{family}}/{{network}}, GET /fees/{{network}}, POST /payments/{{id}}/refresh");

    axum::serve(listener, app).await?;

    Ok(())
}
