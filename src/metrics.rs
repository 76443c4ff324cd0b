//! Prometheus metrics.
//!
//! A process-global recorder from `metrics-exporter-prometheus`, RED
//! metrics over every HTTP request via middleware, a handful of domain
//! counters (signups, logins, upload/download traffic), and the
//! `/metrics` exposition handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Counter of HTTP requests, labeled by method, path template, status.
pub const HTTP_REQUESTS_TOTAL: &str = "docvault_http_requests_total";

/// Histogram of request durations in seconds, labeled by method and path
/// template.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "docvault_http_request_duration_seconds";

/// Total completed signups (counter).
pub const SIGNUPS_TOTAL: &str = "docvault_signups_total";

/// Total successful logins (counter).
pub const LOGINS_TOTAL: &str = "docvault_logins_total";

/// Total accepted uploads (counter).
pub const UPLOADS_TOTAL: &str = "docvault_uploads_total";

/// Total served downloads (counter).
pub const DOWNLOADS_TOTAL: &str = "docvault_downloads_total";

/// Total bytes accepted in uploads (counter).
pub const BYTES_UPLOADED_TOTAL: &str = "docvault_bytes_uploaded_total";

/// Total bytes served in downloads (counter).
pub const BYTES_DOWNLOADED_TOTAL: &str = "docvault_bytes_downloaded_total";

// -- Global recorder installation ---------------------------------------------

/// Handle to the process-global recorder, set once at startup.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global metrics recorder. Calling this twice returns the
/// handle installed the first time.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Attach help text to every metric. Call once after [`init_metrics`].
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "HTTP requests handled");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "Request duration in seconds"
    );
    describe_counter!(SIGNUPS_TOTAL, "Total completed signups");
    describe_counter!(LOGINS_TOTAL, "Total successful logins");
    describe_counter!(UPLOADS_TOTAL, "Total accepted uploads");
    describe_counter!(DOWNLOADS_TOTAL, "Total served downloads");
    describe_counter!(BYTES_UPLOADED_TOTAL, "Total bytes accepted in uploads");
    describe_counter!(BYTES_DOWNLOADED_TOTAL, "Total bytes served in downloads");
}

// -- Metrics middleware -------------------------------------------------------

/// Records a request counter and a duration histogram for every request
/// passing through. Runs as the outermost layer so the measured time
/// covers the whole stack. `/metrics` itself is not instrumented.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(elapsed);

    response
}

// -- Path normalization -------------------------------------------------------

/// Collapse a concrete request path to its route template so per-file
/// identifiers never become label values. `/files/download/5a4e...`
/// becomes `/files/download/{file_id}`; anything unrouted lands in
/// `/other`.
fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/health" | "/metrics" | "/openapi.json" | "/auth/signup" | "/auth/verify-email"
        | "/auth/login" | "/auth/make-ops-user" | "/files/upload" | "/files/download"
        | "/files/list" => path.to_string(),
        _ => {
            if path.starts_with("/files/download/") {
                "/files/download/{file_id}".to_string()
            } else if path.starts_with("/files/") {
                "/files/{file_id}".to_string()
            } else {
                "/other".to_string()
            }
        }
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Prometheus exposition text. Only routed when
/// metrics are enabled, which is also when the recorder gets installed.
pub async fn metrics_handler() -> impl IntoResponse {
    let handle = PROMETHEUS_HANDLE
        .get()
        .expect("Prometheus recorder not initialized");
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        handle.render(),
    )
}

// -- Tests --------------------------------------------------------------------
