//! Request counting and logging middleware.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

/// Counters shared by every request on one server.
#[derive(Debug)]
pub struct RequestStats {
    started_at: Instant,
    requests: AtomicU64,
    logging: bool,
}

impl RequestStats {
    /// Start counting now.
    pub fn new(logging: bool) -> Self {
        Self {
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
            logging,
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Seconds since the server started.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    fn record(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }
}

/// Middleware counting every request and logging its outcome.
pub async fn request_logging_middleware(
    State(stats): State<Arc<RequestStats>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    stats.record();

    // Skip if request logging is disabled
    if !stats.logging {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms,
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms,
            "Request completed with client error"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms,
            "Request completed"
        );
    }

    response
}
