//! Roam Sync - headless runner that keeps a trip store in sync.
//!
//! Loads the first page of trips from the configured API, then refreshes it
//! on the poll interval and logs item counts and budget totals until Ctrl-C.

use roam_client::{Config, HttpRemote};
use roam_engine::{
    AlwaysVisible, ComputedAggregator, LoadOutcome, PollingRegistry, StateStore, Trip,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roam_client=debug,roam_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Roam sync against {}", config.api_url);

    let remote = HttpRemote::<Trip>::new(reqwest::Client::new(), config.api_url.clone())
        .with_auth_token(config.auth_token.clone());
    let store = StateStore::new_shared(Arc::new(remote), &config.store);
    let totals = Arc::new(ComputedAggregator::new(store.subscribe()));

    let registry = PollingRegistry::new_shared(Arc::new(AlwaysVisible));
    let poller = registry.controller("trips");

    poller.start(config.store.poll_interval, {
        let store = Arc::clone(&store);
        let totals = Arc::clone(&totals);
        move || {
            let store = Arc::clone(&store);
            let totals = Arc::clone(&totals);
            async move {
                match store.load_first().await {
                    Ok(LoadOutcome::Loaded { .. }) => tracing::info!(
                        trips = store.len(),
                        has_more = store.has_more(),
                        total_budget = totals.total(),
                        destinations = totals.count_by_category().len(),
                        "trips refreshed"
                    ),
                    Ok(outcome) => tracing::debug!(?outcome, "refresh skipped"),
                    Err(err) => tracing::error!("Refresh failed: {}", err),
                }
            }
        }
    })?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    poller.stop();

    Ok(())
}
