//! HTTP API server.
//!
//! Routes:
//! - `POST /api/run-test` runs a test and returns `{success, metrics}`
//! - `GET /api/health` returns `{status: "OK", timestamp}`
//! - `GET /api/last-run` returns the dashboard snapshot
//! - `GET /metrics` serves Prometheus metrics
//!
//! Every response carries CORS and basic security headers. `/api` routes are
//! rate limited per client IP.

use chrono::{SecondsFormat, Utc};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use hyper::body::HttpBody;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::dashboard::{Dashboard, TestExecutor};
use crate::display::{
    format_duration, render_summary, render_timeline, running_message, test_badge,
};
use crate::metrics::{
    gather_metrics_string, API_REQUESTS_TOTAL, TEST_RUNS_IN_FLIGHT, TEST_RUNS_TOTAL,
    TEST_RUN_DURATION_SECONDS,
};
use crate::mock::MockExecutor;
use crate::results::TestMetrics;
use crate::runner::{K6Runner, RunError};
use crate::test_config::TestConfig;

type IpRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Boxed server future returned by [`bind`].
pub type ServerFuture = Pin<Box<dyn Future<Output = Result<(), hyper::Error>> + Send>>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: hyper::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] hyper::Error),
}

/// Shared state of all request handlers.
pub struct AppState {
    config: ServerConfig,
    executor: Arc<dyn TestExecutor>,
    dashboard: Mutex<Dashboard>,
    limiter: Option<IpRateLimiter>,
}

impl AppState {
    /// Picks the k6 runner or the mock executor according to `config`.
    pub fn from_config(config: ServerConfig) -> Self {
        let executor: Arc<dyn TestExecutor> = if config.use_mock_metrics {
            Arc::new(MockExecutor::new(config.mock_delay))
        } else {
            Arc::new(K6Runner::new(config.runner_config()))
        };
        Self::with_executor(config, executor)
    }

    pub fn with_executor(config: ServerConfig, executor: Arc<dyn TestExecutor>) -> Self {
        let limiter = build_limiter(config.rate_limit_max, config.rate_limit_window);
        Self {
            config,
            executor,
            dashboard: Mutex::new(Dashboard::new()),
            limiter,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn executor_name(&self) -> &'static str {
        self.executor.name()
    }
}

fn build_limiter(max: u32, window: Duration) -> Option<IpRateLimiter> {
    let burst = NonZeroU32::new(max)?;
    let quota = Quota::with_period(window / max)?.allow_burst(burst);
    Some(RateLimiter::keyed(quota))
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Serialize)]
struct RunTestBody<'a> {
    success: bool,
    metrics: &'a TestMetrics,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: String,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json; charset=utf-8"),
            );
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize response body");
            let mut response = Response::new(Body::from("Internal server error"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn error_response(status: StatusCode, error: &str, details: Option<String>) -> Response<Body> {
    json_response(status, &ErrorBody { error, details })
}

fn apply_default_headers(response: &mut Response<Body>) {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        header::X_DNS_PREFETCH_CONTROL,
        HeaderValue::from_static("off"),
    );
}

fn preflight_response() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,HEAD,PUT,PATCH,POST,DELETE"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

/// Label for the request metric; unknown paths share one label.
fn route_label(method: &Method, path: &str) -> &'static str {
    match (method, path) {
        (&Method::OPTIONS, _) => "preflight",
        (_, "/api/run-test") => "run-test",
        (_, "/api/health") => "health",
        (_, "/api/last-run") => "last-run",
        (_, "/metrics") => "metrics",
        _ => "other",
    }
}

enum BodyError {
    TooLarge,
    Read(hyper::Error),
}

async fn read_body_limited(req: Request<Body>, limit: usize) -> Result<Vec<u8>, BodyError> {
    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.map_or(false, |len| len > limit) {
        return Err(BodyError::TooLarge);
    }

    let mut body = req.into_body();
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(BodyError::Read)?;
        if buf.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

async fn run_test(state: Arc<AppState>, req: Request<Body>) -> Response<Body> {
    let body = match read_body_limited(req, state.config.max_body_bytes).await {
        Ok(body) => body,
        Err(BodyError::TooLarge) => {
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large", None)
        }
        Err(BodyError::Read(e)) => {
            warn!(error = %e, "Failed to read request body");
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid request body",
                Some(e.to_string()),
            );
        }
    };

    let config: TestConfig = match serde_json::from_slice(&body) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Rejected malformed test configuration");
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid request body",
                Some(e.to_string()),
            );
        }
    };

    if let Err(e) = state.dashboard.lock().await.begin(&config) {
        warn!(error = %e, url = %config.url, "Rejected invalid test configuration");
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid test configuration",
            Some(e.to_string()),
        );
    }

    // Detached from the connection: the run is recorded even if the client
    // goes away before it finishes.
    let run_state = state.clone();
    let run = tokio::spawn(async move { execute_run(&run_state, &config).await });

    match run.await {
        Ok(Ok(metrics)) => json_response(
            StatusCode::OK,
            &RunTestBody {
                success: true,
                metrics: &metrics,
            },
        ),
        Ok(Err(e)) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.summary(),
            Some(e.to_string()),
        ),
        Err(e) => {
            error!(error = %e, "Test run task failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                None,
            )
        }
    }
}

/// Runs an accepted test and records its outcome on the dashboard and metrics.
async fn execute_run(state: &AppState, config: &TestConfig) -> Result<TestMetrics, RunError> {
    info!(
        executor = state.executor.name(),
        badge = %test_badge(config),
        "{}",
        running_message(config)
    );
    TEST_RUNS_IN_FLIGHT.inc();
    let timer = TEST_RUN_DURATION_SECONDS.start_timer();
    let result = state.executor.execute(config).await;
    timer.observe_duration();
    TEST_RUNS_IN_FLIGHT.dec();

    let notification = state.dashboard.lock().await.complete(&result);
    debug!(title = %notification.title, description = %notification.description, "Run finished");

    match &result {
        Ok(metrics) => {
            TEST_RUNS_TOTAL.with_label_values(&["success"]).inc();
            info!(
                executor = state.executor.name(),
                total_requests = metrics.summary.total_requests,
                avg_response = %format_duration(metrics.summary.avg_response_time),
                p95_response = %format_duration(metrics.summary.p95_response_time),
                "Test run succeeded"
            );
            debug!(
                "\n{}\n{}",
                render_summary(metrics),
                render_timeline(&metrics.timeline)
            );
        }
        Err(e) => {
            TEST_RUNS_TOTAL.with_label_values(&["failed"]).inc();
            error!(executor = state.executor.name(), error = %e, "Test run failed");
        }
    }

    result
}

fn health() -> Response<Body> {
    json_response(
        StatusCode::OK,
        &HealthBody {
            status: "OK",
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        },
    )
}

async fn last_run(state: &AppState) -> Response<Body> {
    let snapshot = state.dashboard.lock().await.snapshot();
    json_response(StatusCode::OK, &snapshot)
}

fn metrics_response() -> Response<Body> {
    let mut response = Response::new(Body::from(gather_metrics_string()));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}

/// Handles one request.
pub async fn handle(
    state: Arc<AppState>,
    remote: SocketAddr,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let route = route_label(&method, &path);

    let rate_limited = path.starts_with("/api/")
        && method != Method::OPTIONS
        && state
            .limiter
            .as_ref()
            .map_or(false, |limiter| limiter.check_key(&remote.ip()).is_err());

    let mut response = if method == Method::OPTIONS {
        preflight_response()
    } else if rate_limited {
        warn!(client = %remote.ip(), path = %path, "Rate limit exceeded");
        error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests from this IP, please try again later.",
            None,
        )
    } else {
        match (&method, path.as_str()) {
            (&Method::POST, "/api/run-test") => run_test(state.clone(), req).await,
            (&Method::GET, "/api/health") => health(),
            (&Method::GET, "/api/last-run") => last_run(&state).await,
            (&Method::GET, "/metrics") => metrics_response(),
            _ => error_response(StatusCode::NOT_FOUND, "Not found", None),
        }
    };

    apply_default_headers(&mut response);

    API_REQUESTS_TOTAL
        .with_label_values(&[route, response.status().as_str()])
        .inc();
    debug!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        client = %remote,
        "Handled request"
    );

    Ok(response)
}

/// Binds the server and returns its local address and the future that runs
/// it until `shutdown` resolves.
pub fn bind<F>(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(SocketAddr, ServerFuture), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let make_svc = make_service_fn(move |conn: &AddrStream| {
        let state = state.clone();
        let remote = conn.remote_addr();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle(state.clone(), remote, req)))
        }
    });

    let server = Server::try_bind(&addr)
        .map_err(|source| ServerError::Bind { addr, source })?
        .serve(make_svc);
    let local_addr = server.local_addr();

    Ok((local_addr, Box::pin(server.with_graceful_shutdown(shutdown))))
}

/// Runs the server until Ctrl-C.
pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    let addr = config.socket_addr();
    let state = Arc::new(AppState::from_config(config));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    let executor = state.executor_name();
    let (local_addr, server) = bind(state, addr, shutdown)?;
    info!(
        addr = %local_addr,
        executor = executor,
        "API Perf Tester backend listening"
    );

    server.await?;
    info!("Server stopped");
    Ok(())
}
