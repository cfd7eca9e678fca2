//! Prometheus metrics exporter (spec §6 "AMBIENT metrics"). Counters and
//! histograms are recorded at their point of origin (router checkouts, bus
//! drops, ...); this module only owns the recorder and the `/metrics`
//! render handler.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new().install_recorder().expect("prometheus recorder installs exactly once per process")
}

pub async fn metrics_handler(axum::extract::State(state): axum::extract::State<crate::state::AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}
