use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;

use config::ConfigError;
use serde_json::json;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Filter;
use warp::Reply;

use super::DiagnosticsRegistry;
use crate::constants::DIAGNOSTICS_ID_PARAM;
use crate::metrics::init_metrics;
use crate::metrics::metrics_route;
use crate::DiagnosticsConfig;
use crate::Error;
use crate::Result;

/// All diagnostics routes:
///
/// - `GET /debug/<prefix>` lists the registered caches
/// - `GET /debug/<prefix>?id=<id>` dumps one cache
/// - `GET /metrics` serves the Prometheus registry
pub fn routes(
    config: &DiagnosticsConfig,
    registry: Arc<DiagnosticsRegistry>,
) -> BoxedFilter<(Response,)> {
    let debug = warp::get()
        .and(debug_path(&config.segments()))
        .and(warp::path::end())
        .and(warp::query::<HashMap<String, String>>())
        .map(move |query: HashMap<String, String>| handle_debug(&registry, &query));

    debug.or(metrics_route()).unify().boxed()
}

/// Binds the diagnostics server without running it.
///
/// The returned future serves requests until `shutdown` fires or its sender
/// is dropped. Port 0 binds an ephemeral port; the bound address is returned.
///
/// # Errors
/// `Error::Config` for an unparsable listen address, `Error::Fatal` when the
/// socket cannot be bound.
pub fn bind(
    config: &DiagnosticsConfig,
    registry: Arc<DiagnosticsRegistry>,
    mut shutdown: watch::Receiver<()>,
) -> Result<(SocketAddr, impl Future<Output = ()>)> {
    let ip: IpAddr = config.listen_address.parse().map_err(|e| {
        Error::Config(ConfigError::Message(format!(
            "diagnostics.listen_address {}: {}",
            config.listen_address, e
        )))
    })?;
    init_metrics();

    let (addr, server) = warp::serve(routes(config, registry))
        .try_bind_with_graceful_shutdown((ip, config.port), async move {
            let _ = shutdown.changed().await;
        })
        .map_err(|e| Error::Fatal(format!("diagnostics server failed to bind: {}", e)))?;

    info!("diagnostics server listening on {}/debug/{}", addr, config.path_prefix);
    Ok((addr, server))
}

/// Serves the diagnostics endpoint until `shutdown` fires. Returns at once
/// when diagnostics are disabled.
pub async fn start_server(
    config: &DiagnosticsConfig,
    registry: Arc<DiagnosticsRegistry>,
    shutdown: watch::Receiver<()>,
) -> Result<()> {
    if !config.enabled {
        debug!("diagnostics disabled");
        return Ok(());
    }
    let (_, server) = bind(config, registry, shutdown)?;
    server.await;
    info!("diagnostics server stopped");
    Ok(())
}

fn debug_path(segments: &[String]) -> BoxedFilter<()> {
    segments
        .iter()
        .fold(warp::path("debug").boxed(), |filter, segment| {
            filter.and(warp::path(segment.clone())).boxed()
        })
}

fn handle_debug(
    registry: &DiagnosticsRegistry,
    query: &HashMap<String, String>,
) -> Response {
    if query.is_empty() {
        return json_reply(&registry.list(), StatusCode::OK);
    }

    let id = match query.get(DIAGNOSTICS_ID_PARAM).filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => {
            return error_reply(&Error::InvalidRequest(format!(
                "missing cache {}",
                DIAGNOSTICS_ID_PARAM
            )))
        }
    };

    match registry.dump(id) {
        Ok(dump) => json_reply(&dump, StatusCode::OK),
        Err(e) => error_reply(&e),
    }
}

fn json_reply<T: serde::Serialize>(
    body: &T,
    status: StatusCode,
) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn error_reply(e: &Error) -> Response {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    warn!(%status, "diagnostics request failed: {}", e);
    json_reply(&json!({ "error": e.to_string() }), status)
}
