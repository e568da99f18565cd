use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod api;
mod config;
mod db;
mod error;
mod predictor;

use api::AppState;
use config::Config;
use db::Database;
use predictor::{
    ClassifierRegistry, EnsemblePredictor, FailurePolicy, FeatureEngineer, PredictionService,
    WeatherCache,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    // Classifiers are loaded once and shared read-only
    let registry = ClassifierRegistry::load_dir(Path::new(&config.models_dir))?;
    for m in registry.describe() {
        info!("Model {} weight {:.3}", m.name, m.weight);
    }
    let policy = if config.renormalize_on_model_failure {
        FailurePolicy::Renormalize
    } else {
        FailurePolicy::KeepWeights
    };

    let weather = WeatherCache::new(
        Arc::new(db.clone()),
        Duration::from_secs(config.weather_cache_ttl_secs),
    );
    let service = PredictionService::new(
        db,
        FeatureEngineer::new(config.recent_form_window, config.head_to_head_window),
        EnsemblePredictor::new(Arc::new(registry), policy),
        weather,
        config.default_parlay_selections,
    );

    // One-shot mode: print a week's predictions and exit
    if let Some((season, week)) = config.one_shot() {
        let batch = service.weekly(season, week).await?;
        if !batch.failures.is_empty() {
            warn!("{} contest(s) could not be predicted", batch.failures.len());
        }
        println!("{}", serde_json::to_string_pretty(&batch)?);
        return Ok(());
    }

    let app = api::router(AppState { service });
    let addr: SocketAddr = config.api_addr.parse()?;
    info!("Prediction API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
