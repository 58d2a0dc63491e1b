use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::Filter;
use warp::Reply;

use crate::MonitoringConfig;


lazy_static! {
    pub static ref LIVE_HANDLES_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("live_handles", "Objects currently registered in a handle registry"),
        &["registry"]
    )
    .expect("metric can not be created");

    pub static ref SCHEDULER_QUEUES_METRIC: IntGauge = IntGauge::new(
        "scheduler_queues",
        "Keys with at least one live waiter in a key scheduler"
    )
    .expect("metric can not be created");

    pub static ref SUBSCRIPTIONS_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("subscriptions", "Depth subscriptions recorded per datamodel cache"),
        &["dm"]
    )
    .expect("metric can not be created");

    pub static ref DISPATCHED_CALLBACKS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("dispatched_callbacks", "Node and link callbacks invoked"),
        &["dm", "update_type"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER_ONCE: Once = Once::new();

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(LIVE_HANDLES_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(SCHEDULER_QUEUES_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(SUBSCRIPTIONS_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DISPATCHED_CALLBACKS_METRIC.clone()))
        .expect("collector can be registered");
}

/// Registers the crate collectors with the global [`REGISTRY`] exactly once.
pub fn init_metrics() {
    REGISTER_ONCE.call_once(|| register_custom_metrics(&REGISTRY));
}

/// Prometheus text exposition of `registry`.
pub(crate) fn encode_metrics(registry: &Registry) -> String {
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}

/// `GET /metrics` serving the global [`REGISTRY`].
pub(crate) fn metrics_route() -> BoxedFilter<(Response,)> {
    warp::get()
        .and(warp::path!("metrics"))
        .map(|| encode_metrics(&REGISTRY).into_response())
        .boxed()
}

/// Standalone Prometheus endpoint on `prometheus_port`. Returns immediately
/// when monitoring is disabled.
pub async fn start_server(
    config: &MonitoringConfig,
    mut shutdown_signal: watch::Receiver<()>,
) {
    if !config.prometheus_enabled {
        return;
    }
    let addr = match config.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("metrics server not started: {}", e);
            return;
        }
    };
    init_metrics();

    let (addr, server) =
        warp::serve(metrics_route()).bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown_signal.changed().await;
        });
    info!("metrics server listening on {}", addr);
    server.await;
}
