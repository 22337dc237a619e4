use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryBackendGateway};
use crate::routes::with_cancellation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use class_cancel::config::AppConfig;
use class_cancel::error::AppError;
use class_cancel::telemetry;
use class_cancel::workflows::cancellation::{
    BackendGateway, CancellationSessions, Clock, HttpBackendGateway, SystemClock,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
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

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    if args.in_memory {
        warn!("serving against the seeded in-memory backend");
        let gateway = InMemoryBackendGateway::seeded(Arc::clone(&clock))?;
        serve(config, gateway, clock).await
    } else {
        info!(backend = %config.gateway.base_url, timeout = ?config.gateway.timeout, "using http backend");
        let gateway = HttpBackendGateway::from_config(&config.gateway, Arc::clone(&clock))?;
        serve(config, gateway, clock).await
    }
}

async fn serve<G>(config: AppConfig, gateway: G, clock: Arc<dyn Clock>) -> Result<(), AppError>
where
    G: BackendGateway + 'static,
{
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    if config.cancellation.default_identity.is_some() {
        info!("default identity fallback enabled");
    }
    let sessions = Arc::new(
        CancellationSessions::new(Arc::new(gateway), clock, config.cancellation.settings())
            .with_idle_timeout(config.cancellation.idle_timeout),
    );
    spawn_idle_sweeper(Arc::clone(&sessions));

    let app = with_cancellation_routes(sessions)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "class cancellation service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Closes abandoned sessions between requests; opening a session sweeps too.
fn spawn_idle_sweeper<G>(sessions: Arc<CancellationSessions<G>>)
where
    G: BackendGateway + 'static,
{
    let period = (sessions.idle_timeout() / 2).max(std::time::Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            let now = ticker.tick().await;
            sessions.sweep_idle(now).await;
        }
    });
}
