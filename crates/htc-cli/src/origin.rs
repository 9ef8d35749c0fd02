//! Mock origin server built from `handle` stanzas
//!
//! Every inbound request is buffered once, checked against the matching
//! handler's assertions, and answered with the handler's canned response.
//! Failed assertions do not change the response; they are recorded and
//! reported once the run is over.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use actix_web::dev::ServerHandle;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use bytes::Bytes;
use htc_core::evaluator::check_all;
use htc_core::{HandlerStanza, ResponseSpec};
use log::{debug, error};

/// Answers `UP!` so the runner can tell the origin (or a proxy in front of it) is up
pub const INTERNAL_CHECK_PATH: &str = "/httpTesterInternalCheck";

/// Largest inbound body the origin buffers; bigger ones are recorded as failures
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

struct OriginState {
    handlers: Vec<HandlerStanza>,
    failures: Arc<Mutex<Vec<String>>>,
}

impl OriginState {
    fn record(&self, failure: String) {
        error!("origin: {}", failure);
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(failure);
    }
}

/// A running mock origin
pub struct Origin {
    addr: SocketAddr,
    handle: ServerHandle,
    failures: Arc<Mutex<Vec<String>>>,
}

impl Origin {
    /// Bind to `127.0.0.1:port` (0 picks a free port) and start serving.
    /// Must be called from within the actix runtime.
    pub fn start(handlers: Vec<HandlerStanza>, port: u16) -> std::io::Result<Origin> {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let state = web::Data::new(OriginState {
            handlers,
            failures: Arc::clone(&failures),
        });

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
                .default_service(web::to(dispatch))
        })
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", port))?;

        let addr = server.addrs().first().copied().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "origin bound no address")
        })?;

        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        debug!("origin listening on {}", addr);
        Ok(Origin {
            addr,
            handle,
            failures,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn check_url(&self) -> String {
        format!("http://{}{}", self.addr, INTERNAL_CHECK_PATH)
    }

    /// Failures recorded so far, in arrival order
    pub fn failures(&self) -> Vec<String> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stop without draining open connections
    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

/// Pick the handler for `path`: an exact match, otherwise the longest
/// pattern ending in `/` that prefixes the path
pub fn route<'h>(handlers: &'h [HandlerStanza], path: &str) -> Option<&'h HandlerStanza> {
    if let Some(exact) = handlers.iter().find(|h| h.uri_path == path) {
        return Some(exact);
    }
    handlers
        .iter()
        .filter(|h| h.uri_path.ends_with('/') && path.starts_with(h.uri_path.as_str()))
        .max_by_key(|h| h.uri_path.len())
}

async fn dispatch(
    req: HttpRequest,
    body: Result<Bytes, actix_web::Error>,
    state: web::Data<OriginState>,
) -> HttpResponse {
    let path = req.path();
    if path == INTERNAL_CHECK_PATH {
        return HttpResponse::Ok().body("UP!");
    }

    let handler = match route(&state.handlers, path) {
        Some(handler) => handler,
        None => {
            debug!("origin: no handler for {}", path);
            return HttpResponse::NotFound().body("404 page not found\n");
        }
    };
    debug!("origin: {} {} handled by '{}'", req.method(), path, handler.uri_path);

    let body = match body {
        Ok(body) => body,
        Err(e) => {
            state.record(format!("cannot read request body for {}: {}", path, e));
            return e.error_response();
        }
    };

    match buffer_request(&req, body) {
        Ok(inbound) => match check_all(&handler.expectations, &inbound) {
            Ok(failures) => {
                for failure in failures {
                    state.record(failure.to_string());
                }
            }
            Err(e) => state.record(e.to_string()),
        },
        Err(e) => state.record(format!("cannot inspect request to {}: {}", path, e)),
    }

    respond(&handler.response, &state)
}

/// Rebuild the inbound request as an `http::Request` over its buffered body
fn buffer_request(req: &HttpRequest, body: Bytes) -> Result<http::Request<Bytes>, http::Error> {
    let mut builder = http::Request::builder()
        .method(req.method().as_str())
        .uri(req.uri().to_string());
    for (name, value) in req.headers() {
        builder = builder.header(name.as_str(), value.as_bytes());
    }
    builder.body(body)
}

fn respond(spec: &ResponseSpec, state: &OriginState) -> HttpResponse {
    let status = match StatusCode::from_u16(spec.status) {
        Ok(status) => status,
        Err(_) => {
            state.record(format!("cannot send invalid status code {}", spec.status));
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let mut builder = HttpResponse::build(status);
    for (name, value) in &spec.headers {
        builder.insert_header((name.as_str(), value.as_str()));
    }
    builder.body(spec.body.clone())
}
