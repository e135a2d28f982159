use crate::cli::ServeArgs;
use crate::infra::{AppState, Components};
use crate::routes::with_application_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use intern_apply::config::AppConfig;
use intern_apply::error::AppError;
use intern_apply::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let components = Components::for_serving(&config)?;
    let shutdown = CancellationToken::new();

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let app = with_application_routes(components, shutdown.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        ledger = %config.ledger.path.display(),
        "internship application desk ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown, readiness_flag))
        .await?;
    Ok(())
}

/// Resolves on Ctrl-C after cancelling every in-flight worker.
async fn wait_for_shutdown(
    shutdown: CancellationToken,
    readiness: Arc<std::sync::atomic::AtomicBool>,
) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    readiness.store(false, Ordering::Release);
    info!("shutdown requested, stopping automation workers");
    shutdown.cancel();
}
