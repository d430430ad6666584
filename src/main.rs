use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tracing::info;

use property_consents::config::AppConfig;
use property_consents::consent::{
    consent_router, Application, ApplicationDirectory, ApplicationId, AuditAttribution,
    ConsentMailer, ConsentRequestId, ConsentRequestSummary, ConsentResolver, ConsentState,
    ConsentTokenService, DirectoryError, EmailTransport, SubStatus, SubmitterId, TransportError,
};
use property_consents::error::AppError;
use property_consents::telemetry;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Property Consents Service",
    about = "Coordinate property owner consent for installation applications",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

/// Development transport that records each send in the log instead of
/// calling the transactional-email provider.
struct LoggingTransport;

#[async_trait]
impl EmailTransport for LoggingTransport {
    async fn send(
        &self,
        recipient: &str,
        template_id: &str,
        personalisation: &BTreeMap<String, String>,
    ) -> Result<(), TransportError> {
        info!(
            %recipient,
            %template_id,
            variables = personalisation.len(),
            "email dispatched (logging transport)"
        );
        Ok(())
    }
}

/// Placeholder directory used until the Applications API client is wired in;
/// every call reports the service as unavailable.
struct UnconfiguredDirectory;

impl UnconfiguredDirectory {
    fn unavailable(&self) -> DirectoryError {
        DirectoryError::Unavailable("applications directory client not configured".to_string())
    }
}

#[async_trait]
impl ApplicationDirectory for UnconfiguredDirectory {
    async fn consent_request_summary(
        &self,
        _id: ConsentRequestId,
    ) -> Result<ConsentRequestSummary, DirectoryError> {
        Err(self.unavailable())
    }

    async fn applications_by_uprn(&self, _uprn: &str) -> Result<Vec<Application>, DirectoryError> {
        Err(self.unavailable())
    }

    async fn application_by_reference(
        &self,
        _reference_number: &str,
    ) -> Result<Application, DirectoryError> {
        Err(self.unavailable())
    }

    async fn business_account_email(
        &self,
        _submitter_id: SubmitterId,
    ) -> Result<String, DirectoryError> {
        Err(self.unavailable())
    }

    async fn update_application_status(
        &self,
        _application_id: ApplicationId,
        _status: SubStatus,
        _attribution: &AuditAttribution,
    ) -> Result<Vec<String>, DirectoryError> {
        Err(self.unavailable())
    }

    async fn register_consent_received(
        &self,
        _id: ConsentRequestId,
        _updated_by: &str,
        _attribution: &AuditAttribution,
    ) -> Result<(), DirectoryError> {
        Err(self.unavailable())
    }

    async fn store_service_feedback(
        &self,
        _feedback: BTreeMap<String, String>,
        _attribution: &AuditAttribution,
    ) -> Result<(), DirectoryError> {
        Err(self.unavailable())
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
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
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let tokens = ConsentTokenService::new(config.consent.token_secret.clone());
    let mailer = Arc::new(ConsentMailer::new(
        Arc::new(LoggingTransport),
        config.consent.templates.clone(),
        tokens,
        config.consent.portal_base_url.clone(),
        config.consent.token_validity_days,
    ));
    let consent_state = Arc::new(ConsentState {
        resolver: ConsentResolver::new(Arc::new(UnconfiguredDirectory), mailer.clone()),
        mailer,
    });

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(consent_router(consent_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        token_validity_days = config.consent.token_validity_days,
        "property consents service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
