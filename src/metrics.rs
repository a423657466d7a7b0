//! Metrics exporter.
use eyre::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{net::SocketAddr, time::Duration};
use tracing::info;

/// Installs the Prometheus recorder and serves it at `addr`.
///
/// The recorder will perform upkeep every 5 seconds.
pub fn setup_exporter(addr: SocketAddr) -> eyre::Result<PrometheusHandle> {
    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .upkeep_timeout(Duration::from_secs(5))
        .build()
        .wrap_err("failed to build metrics recorder")?;

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).wrap_err("could not set metrics recorder")?;
    tokio::spawn(exporter);

    info!(%addr, "Started metrics server");
    Ok(handle)
}
