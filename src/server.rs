//! Wake and status HTTP endpoint
//!
//! The reverse proxy routes requests for sleeping backends here. Any
//! request carrying a Host header triggers a wake-up for that hostname and
//! answers 503 with a Refresh header plus the readiness hints, so a
//! browser parked on the page retries until the backend is up and the
//! proxy routes it away from us. A few fixed paths serve controller
//! status instead.

use crate::core::Core;
use crate::discovery::ResolveError;
use crate::error::{json_error_response, WakeErrorCode};
use crate::host::{short, ContainerSummary, Host};
use hyper::body::Bytes;
use hyper::header::HOST;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use http_body_util::Full;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Version information for status pages
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Seconds a waiting client is told to wait before retrying
const REFRESH_SECONDS: u32 = 2;

/// Helper to create a simple response - infallible with valid StatusCode
fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum")
}

/// Helper to create a JSON response
fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum and static header")
}

/// HTTP server fronting the controller
pub struct WakeServer<H: Host> {
    bind_addr: SocketAddr,
    core: Arc<Core<H>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<H: Host> WakeServer<H> {
    pub fn new(bind_addr: SocketAddr, core: Arc<Core<H>>, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            bind_addr,
            core,
            shutdown_rx,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "Wake endpoint listening");

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let core = Arc::clone(&self.core);
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, addr, core).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Wake endpoint shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn serve_connection<H: Host>(
    stream: tokio::net::TcpStream,
    _addr: SocketAddr,
    core: Arc<Core<H>>,
) -> anyhow::Result<()> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let core = Arc::clone(&core);
        async move { handle_request(req, core).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

async fn handle_request<H: Host>(
    req: Request<hyper::body::Incoming>,
    core: Arc<Core<H>>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path();
    debug!(method = %req.method(), path, "Wake endpoint request");

    let response = match path {
        // Liveness of the controller itself
        "/health" => response(StatusCode::OK, "ok"),

        "/version" => {
            let version_info = serde_json::json!({
                "name": PKG_NAME,
                "version": VERSION,
            });
            json_response(StatusCode::OK, version_info.to_string())
        }

        "/status" => render_status(&core).await,

        // Anything else is a wake-up request for the Host header's backend
        _ => wake(&req, &core).await,
    };

    Ok(response)
}

async fn wake<H: Host>(
    req: &Request<hyper::body::Incoming>,
    core: &Arc<Core<H>>,
) -> Response<Full<Bytes>> {
    let Some(hostname) = request_hostname(req) else {
        return json_error_response(
            WakeErrorCode::MissingHostHeader,
            "request carries no Host header",
        );
    };

    match core.start_host(&hostname).await {
        Ok(ack) => {
            let body = serde_json::json!({
                "status": "starting",
                "hostname": hostname,
                "wait_for_code": ack.wait_for_code,
                "wait_for_path": ack.wait_for_path,
            });
            Response::builder()
                .status(StatusCode::SERVICE_UNAVAILABLE)
                .header("content-type", "application/json")
                .header("Refresh", REFRESH_SECONDS.to_string())
                .body(Full::new(Bytes::from(body.to_string())))
                .expect("valid response with StatusCode enum and static headers")
        }
        Err(ResolveError::HostNotFound { hostname }) => json_error_response(
            WakeErrorCode::UnknownHost,
            format!("no container found for host: {}", hostname),
        ),
        Err(ResolveError::Host(e)) => {
            warn!(%hostname, error = %e, "runtime error during wake-up");
            json_error_response(WakeErrorCode::RuntimeUnavailable, e.to_string())
        }
    }
}

/// Host header with any port stripped
fn request_hostname<B>(req: &Request<B>) -> Option<String> {
    let raw = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())?;

    let host = raw.rsplit_once(':').map_or(raw, |(h, _)| h);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

async fn render_status<H: Host>(core: &Arc<Core<H>>) -> Response<Full<Bytes>> {
    let active: Vec<serde_json::Value> = core
        .active_containers()
        .await
        .iter()
        .map(|entry| {
            serde_json::json!({
                "name": entry.name(),
                "cid": entry.short_id(),
                "idle_secs": entry.idle_for().as_secs(),
                "stop_delay_secs": entry.stop_delay().as_secs(),
                "pinned": entry.pinned(),
            })
        })
        .collect();

    let qualifying = match core.qualifying_containers().await {
        Ok(containers) => containers.iter().map(summary_json).collect(),
        Err(e) => {
            warn!(error = %e, "unable to list qualifying containers");
            Vec::new()
        }
    };

    let providers = match core.provider_containers().await {
        Ok(containers) => containers.iter().map(summary_json).collect(),
        Err(e) => {
            warn!(error = %e, "unable to list provider containers");
            Vec::new()
        }
    };

    let body = serde_json::json!({
        "active": active,
        "qualifying": qualifying,
        "providers": providers,
    });
    json_response(StatusCode::OK, body.to_string())
}

fn summary_json(ct: &ContainerSummary) -> serde_json::Value {
    serde_json::json!({
        "name": ct.name,
        "cid": short(&ct.cid),
        "image": ct.image,
        "running": ct.running,
    })
}
