use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_matching_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use housing_match::config::AppConfig;
use housing_match::error::AppError;
use housing_match::matching::{spawn_sweep_task, MatchingDeps, MatchingService, StaticFxRates, SystemClock};
use housing_match::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let fx = Arc::new(StaticFxRates::new(config.fx.rates.clone()));
    let deps = MatchingDeps::in_memory(fx, Arc::new(SystemClock));
    let (service, worker) = MatchingService::new(deps, &config.matching);
    let service = Arc::new(service);
    let worker_handle = worker.spawn();
    let sweep_handle = spawn_sweep_task(
        service.sweeper(),
        service.index(),
        config.matching.sweep_interval,
    );

    let app = with_matching_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, rates = config.fx.rates.len(), "housing match service ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    sweep_handle.abort();
    worker_handle.abort();
    info!("housing match service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for shutdown signal");
    }
}
