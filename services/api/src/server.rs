use crate::cli::ServeArgs;
use crate::infra::{in_memory_service, AppState};
use crate::routes::with_benefit_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use benefit_requests::config::AppConfig;
use benefit_requests::error::AppError;
use benefit_requests::telemetry;
use std::sync::atomic::Ordering;
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
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let (service, _storage) = in_memory_service(config.uploads.max_file_bytes);

    let app = with_benefit_routes(Arc::new(service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        max_upload_bytes = config.uploads.max_file_bytes,
        "benefit request service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
