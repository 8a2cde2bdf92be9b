//! `helm` — the execution engine binary. Loads configuration, wires the
//! reference connector and its dependent services together behind one
//! [`ExecutionRouter`], then drives a single configured run mode to
//! completion or until ctrl-c.
//!
//! Wiring order (config → connector → services → lifecycle → mode
//! dispatch) follows `xbot/app/main.py`; `main.rs` itself stays thin,
//! parsing flags and immediately delegating.

mod cli;
mod modes;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use helm_connectors::{config_from_symbol_map, Credentials, ReferenceConnector};
use helm_core::config::{AppConfig, Mode};
use helm_core::connector::Connector;
use helm_core::heartbeat::{HeartbeatConfig, HeartbeatService};
use helm_core::lifecycle::{LifecycleController, TaskFactory};
use helm_core::market_cache::MarketCache;
use helm_core::market_data::MarketDataService;
use helm_core::monitoring::{MetricsRegistry, MetricsServer, MetricsServerConfig};
use helm_core::order_service::OrderService;
use helm_core::position::PositionService;
use helm_core::risk::{RiskLimits, RiskService};
use helm_core::router::ExecutionRouter;
use helm_core::tracking_limit::TrackingLimitEngine;
use helm_core::utils::logger::init_logger;

use cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("helm: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    args.apply_overrides(&mut config);
    config.validate().context("validating configuration")?;

    init_logger(&config.log_level, config.json_logs);
    info!(venue = %config.venue, symbol = %config.symbol, mode = ?config.mode, "starting helm");

    let credentials = match &config.credentials_path {
        Some(path) => Credentials::load(path)
            .with_context(|| format!("loading credentials {}", path.display()))?,
        None => Credentials::default(),
    };

    // Diagnostic mode never needs the private order-update stream; every
    // other mode does.
    let enable_private_stream = !matches!(config.mode, Mode::Diagnostic);
    let symbol_map = config.symbol_map_strings();
    let connector_config = config_from_symbol_map(
        &config.venue,
        config.rest_base_url.clone(),
        config.ws_url.clone(),
        &symbol_map,
        credentials,
        enable_private_stream,
    );
    let connector: Arc<dyn Connector> = Arc::new(ReferenceConnector::new(connector_config)?);

    let market_data = Arc::new(MarketDataService::new(connector.clone(), symbol_map));
    let position_service = Arc::new(PositionService::new());
    let metrics_registry = Arc::new(MetricsRegistry::new().context("registering metrics")?);
    let risk_limits = RiskLimits {
        max_position: config.risk.max_position,
        max_notional: config.risk.max_notional,
    };
    let risk_service = Arc::new(
        RiskService::new(market_data.clone(), position_service.clone(), risk_limits)
            .with_metrics(metrics_registry.clone()),
    );
    let order_service = Arc::new(
        OrderService::new(
            connector.clone(),
            market_data.clone(),
            risk_service.clone(),
            config.log_dir.clone(),
        )
        .with_metrics(metrics_registry.clone()),
    );
    let tracking_engine = Arc::new(
        TrackingLimitEngine::new(market_data.clone()).with_metrics(metrics_registry.clone()),
    );
    let cache = Arc::new(MarketCache::new());

    let router = ExecutionRouter::new(
        order_service.clone(),
        tracking_engine,
        risk_service,
        position_service,
        market_data,
        cache,
    );

    let factories = order_update_factories(connector.as_ref(), order_service.clone());
    let lifecycle = Arc::new(LifecycleController::new(connector.clone(), factories));
    lifecycle
        .start()
        .await
        .context("starting connector and background tasks")?;

    let metrics_server = MetricsServer::new(MetricsServerConfig::default(), metrics_registry);
    let metrics_handle = tokio::spawn(async move {
        if let Err(err) = metrics_server.serve().await {
            error!(error = %err, "metrics server exited");
        }
    });

    let heartbeat = build_heartbeat(&config, connector.clone())?;
    if let Some(heartbeat) = &heartbeat {
        heartbeat.start().await;
    }

    let result = tokio::select! {
        result = modes::run(&config, &router) => result,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("ctrl-c received, shutting down"),
                Err(err) => warn!(error = %err, "failed to listen for ctrl-c, shutting down anyway"),
            }
            Ok(())
        }
    };

    if let Some(heartbeat) = &heartbeat {
        heartbeat.stop().await;
    }
    metrics_handle.abort();
    lifecycle.stop().await;

    result
}

/// Builds the single background task that drains a connector's
/// order-update push feed into `OrderService::ingest_update`, if the
/// connector runs one. A diagnostic connector with no private stream
/// yields no factories at all.
fn order_update_factories(connector: &dyn Connector, order_service: Arc<OrderService>) -> Vec<TaskFactory> {
    let Some(update_rx) = connector.take_update_receiver() else {
        return Vec::new();
    };
    let update_rx = Arc::new(AsyncMutex::new(Some(update_rx)));
    let factory: TaskFactory = Box::new(move || {
        let order_service = order_service.clone();
        let update_rx = update_rx.clone();
        Box::pin(async move {
            let mut rx = match update_rx.lock().await.take() {
                Some(rx) => rx,
                None => return,
            };
            while let Some(update) = rx.recv().await {
                if let Err(err) = order_service.ingest_update(update.into()).await {
                    warn!(error = %err, "dropping order update for unknown order");
                }
            }
        })
    });
    vec![factory]
}

fn build_heartbeat(
    config: &AppConfig,
    connector: Arc<dyn Connector>,
) -> Result<Option<Arc<HeartbeatService>>> {
    let Some(settings) = &config.heartbeat else {
        return Ok(None);
    };
    let heartbeat_config = HeartbeatConfig {
        url: settings.url.clone(),
        interval: std::time::Duration::from_secs_f64(settings.interval_secs),
        timeout: std::time::Duration::from_secs_f64(settings.timeout_secs),
        bearer_token: settings.bearer_token.clone(),
    };
    let service = HeartbeatService::new(
        connector,
        "helm".to_string(),
        config.venue.clone(),
        heartbeat_config,
    )
    .context("constructing heartbeat service")?;
    Ok(Some(Arc::new(service)))
}
