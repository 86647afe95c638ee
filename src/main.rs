//! Join Manager server - main entry point.
//!
//! Starts the Actix-web server exposing the join-manager HTTP surface, and
//! a background task that periodically sweeps join sources for retention.

mod api;
mod config;
mod error;
mod join;
mod middleware;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use tokio::time::interval;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::joins::ProviderRegistry;
use crate::config::Config;
use crate::join::{FeatureProvider, InMemoryProvider, Manager};

/// Spawns the background retention sweep (spec §4.3), mirroring the
/// periodic-ticker shape of a storage cleanup service.
fn start_retention_task(manager: Arc<Manager>, interval_secs: u64) {
    tokio::spawn(async move {
        if !manager.is_enabled() {
            return;
        }
        info!("Starting join retention sweep (every {interval_secs}s)");
        let mut ticker = interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match web::block({
                let manager = manager.clone();
                move || manager.sweep()
            })
            .await
            {
                Ok(Ok(report)) => {
                    if report.removed_for_age > 0
                        || report.removed_for_count > 0
                        || report.orphans_reaped > 0
                    {
                        info!(
                            "Retention sweep: {} removed for age, {} removed for count, {} orphans reaped",
                            report.removed_for_age, report.removed_for_count, report.orphans_reaped
                        );
                    }
                }
                Ok(Err(e)) => error!("Retention sweep failed: {}", e),
                Err(e) => error!("Retention sweep task panicked: {}", e),
            }
        }
    });
}

/// Demonstration provider registry: a single synthetic "buildings"
/// collection, since the real feature-provider integration is out of
/// scope for this crate.
fn demo_provider_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    let provider: Arc<dyn FeatureProvider> = Arc::new(InMemoryProvider::new(
        "feature",
        vec![("id", true)],
        vec!["id", "name", "area"],
    ));
    registry.insert("buildings".to_string(), provider);
    registry
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - JOIN_ENABLED/JOIN_SOURCE_DIR/JOIN_MAX_DAYS/JOIN_MAX_FILES configure the joins feature");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Join Manager Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    let manager = Manager::from_config(config.joins.as_manager_config())
        .expect("failed to initialize join manager");
    let manager = Arc::new(manager);

    if manager.is_enabled() {
        info!("Joins feature enabled (source dir: {:?})", config.joins.source_dir);
    } else {
        info!("Joins feature disabled (set JOIN_ENABLED=true to turn it on)");
    }

    let sweep_interval_secs = if config.is_development() { 60 } else { 3600 };
    start_retention_task(manager.clone(), sweep_interval_secs);

    let providers = web::Data::new(demo_provider_registry());
    let bind_address = config.bind_address();

    info!("Starting server at http://{}", bind_address);

    let manager_data = web::Data::from(manager);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::RequestLogger)
            .app_data(manager_data.clone())
            .app_data(providers.clone())
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_join_routes),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
