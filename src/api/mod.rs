//! Read-only status endpoint
//!
//! Serves the report of the generation pass as JSON over HTTP/1.1 with
//! hyper, on a current-thread runtime owned by a background thread.
//!
//! Routes:
//! - `/ping`
//! - `/v1/config` (values with secrets redacted, plus the contributing layers)
//! - `/v1/globals`
//! - `/v1/templates`
//! - `/v1/template/<id>`
//! - `/v1/conflicts`

use std::convert::Infallible;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Server, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::engine::Report;

/// Connections that have not sent a full request head by then are dropped
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Status endpoint errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to bind status endpoint on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A routed response
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }

    fn into_http(self) -> hyper::Response<Body> {
        let body = serde_json::to_vec_pretty(&self.body).unwrap_or_default();
        let mut response = hyper::Response::new(Body::from(body));
        *response.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

/// Map a request to a response
pub fn route(method: &str, path: &str, report: &Report) -> Response {
    if method != "GET" {
        return Response::error(405, "method not allowed");
    }

    let path = path.split('?').next().unwrap_or(path);
    match path {
        "/ping" => Response::ok(json!({ "status": "ok" })),
        "/v1/config" => Response::ok(json!({
            "created_at": report.config.created_at(),
            "sources": report.config.sources(),
            "values": report.redacted_config(),
        })),
        "/v1/globals" => Response::ok(report.global_values.clone().into_value()),
        "/v1/templates" => Response::ok(json!(report.template_ids())),
        "/v1/conflicts" => Response::ok(json!(report.conflicts)),
        _ => match path.strip_prefix("/v1/template/") {
            Some(id) => match report.templates.get(id) {
                Some(template) => Response::ok(json!(template)),
                None => Response::error(404, "template not found"),
            },
            None => Response::error(404, "not found"),
        },
    }
}

/// Answer one HTTP request from the report
pub fn respond(request: &Request<Body>, report: &Report) -> hyper::Response<Body> {
    let method = request.method().as_str();
    let path = request.uri().path();
    let response = route(method, path, report);
    debug!(method = %method, path = %path, status = response.status, "status request");
    response.into_http()
}

/// Background status server
#[derive(Debug)]
pub struct StatusServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl StatusServer {
    /// Bind `addr` and serve `report` from a background thread
    pub fn spawn(addr: SocketAddr, report: Arc<Report>) -> Result<Self, ApiError> {
        let listener = TcpListener::bind(addr).map_err(|source| ApiError::Bind { addr, source })?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let handle = thread::Builder::new()
            .name("status-api".to_string())
            .spawn(move || runtime.block_on(serve(listener, report)))?;

        info!(addr = %addr, "status endpoint listening");
        Ok(Self { addr, handle })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

async fn serve(listener: TcpListener, report: Arc<Report>) {
    let make_service = make_service_fn(move |_conn| {
        let report = Arc::clone(&report);
        async move {
            Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                let report = Arc::clone(&report);
                async move { Ok::<_, Infallible>(respond(&request, &report)) }
            }))
        }
    });

    let builder = match Server::from_tcp(listener) {
        Ok(builder) => builder,
        Err(e) => {
            warn!(error = %e, "status endpoint failed to start");
            return;
        }
    };

    if let Err(e) = builder
        .http1_header_read_timeout(HEADER_READ_TIMEOUT)
        .serve(make_service)
        .await
    {
        warn!(error = %e, "status endpoint stopped");
    }
}
