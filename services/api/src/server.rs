use crate::cli::ServeArgs;
use crate::infra::{load_engine_config, AppState, InMemoryOutcomeRepository};
use crate::routes::with_triage_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use soc_assist::config::AppConfig;
use soc_assist::error::AppError;
use soc_assist::telemetry;
use soc_assist::triage::TriageService;
use soc_assist::versions::ConfigurationRegistry;
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

    let engine_config = load_engine_config(config.engine.config_path.as_deref())?;
    let registry = Arc::new(ConfigurationRegistry::new(engine_config));
    let repository = Arc::new(InMemoryOutcomeRepository::default());
    let triage_service = Arc::new(TriageService::new(
        registry.clone(),
        repository,
        config.engine.calibration,
        config.engine.report_top_n,
    ));

    let app = with_triage_routes(triage_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        config_version = registry.active().version,
        "severity scoring service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
