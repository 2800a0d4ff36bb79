use crate::cli::ServeArgs;
use crate::infra::{open_store, AppState, LogNotificationSender};
use crate::routes::with_governance_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use gradegate::config::AppConfig;
use gradegate::error::AppError;
use gradegate::telemetry;
use gradegate::workflows::otp::OtpVerifier;
use gradegate::workflows::results::{PublicationLockGovernor, ResultWorkflowService};
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

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(open_store(&config.storage)?);
    let notifier = Arc::new(LogNotificationSender);
    let results = Arc::new(ResultWorkflowService::new(store.clone(), notifier.clone()));
    let governor = Arc::new(PublicationLockGovernor::new(store.clone(), notifier.clone()));
    let verifier = Arc::new(OtpVerifier::new(config.otp.policy(), notifier));

    let app = with_governance_routes(results, governor, verifier)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        snapshot = ?store.snapshot_path(),
        "result governance service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
