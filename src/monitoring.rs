use crate::error::TaskMasterError;
use anyhow::Result;
use metrics::{Counter, Gauge, counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::LazyLock};
use tracing::{error, info};

// Global metrics
pub static MESSAGES_RECEIVED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("task_master_channel_messages_total"));
pub static PUSH_EVENTS_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("task_master_push_events_total"));
pub static ALERTS_EXPIRED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("task_master_alerts_expired_total"));
pub static RECONNECT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("task_master_reconnects_total"));
pub static API_ERRORS_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("task_master_api_errors_total"));
pub static CONNECTED_GAUGE: LazyLock<Gauge> =
    LazyLock::new(|| gauge!("task_master_channel_connected"));
pub static UNREAD_GAUGE: LazyLock<Gauge> =
    LazyLock::new(|| gauge!("task_master_unread_notifications"));

pub async fn setup_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", "task-master-client")
        .add_global_label("version", env!("CARGO_PKG_VERSION"));

    match builder.install() {
        Ok(()) => {
            info!(
                "Prometheus metrics server started on http://{}/metrics",
                addr
            );

            // Initialize metrics with default values
            MESSAGES_RECEIVED_COUNTER.absolute(0);
            PUSH_EVENTS_COUNTER.absolute(0);
            ALERTS_EXPIRED_COUNTER.absolute(0);
            RECONNECT_COUNTER.absolute(0);
            API_ERRORS_COUNTER.absolute(0);
            CONNECTED_GAUGE.set(0.0);
            UNREAD_GAUGE.set(0.0);

            Ok(())
        }
        Err(e) => {
            error!("Failed to start metrics server: {}", e);
            Err(TaskMasterError::MetricsError(e.to_string()).into())
        }
    }
}
