//! Recorder for the `metrics` facade used by the HTTP middleware.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static RECORDER: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the process-wide Prometheus recorder. Safe to call more than once;
/// only the first call installs anything.
pub fn install_metrics_recorder() -> Option<&'static PrometheusHandle> {
    RECORDER
        .get_or_try_init(|| PrometheusBuilder::new().install_recorder())
        .map_err(|e| {
            tracing::warn!(error = %e, "Failed to install metrics recorder");
            e
        })
        .ok()
}

/// Render everything recorded through the `metrics` facade.
pub fn render_recorded_metrics() -> String {
    RECORDER.get().map(|h| h.render()).unwrap_or_default()
}
