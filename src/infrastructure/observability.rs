use crate::config::Observability;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init_tracing(settings: &Observability) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}=info", env!("CARGO_CRATE_NAME"))));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if settings.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if result.is_ok() {
        tracing::info!(
            service = %settings.service_name,
            json = settings.json_logs,
            "tracing_initialized"
        );
    }
}

/// Install the Prometheus recorder and return the handle used by `/metrics`.
///
/// Returns `None` when metrics are disabled or a recorder is already installed.
pub fn init_metrics(settings: &Observability) -> Option<PrometheusHandle> {
    if !settings.enable_metrics {
        return None;
    }
    PrometheusBuilder::new().install_recorder().ok()
}
