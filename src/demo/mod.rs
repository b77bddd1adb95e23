//! Synthetic load target used to manufacture latency and errors.
//!
//! `GET /api/fast` answers immediately; `GET /api/slow/{id}` sleeps 200-1199ms
//! and fails roughly one call in a hundred. Every request to those two routes
//! is timed into `http_server_requests_seconds{application="performance-demo"}`,
//! scraped from `GET /actuator/prometheus`, which is the series the default
//! detection queries read once a Prometheus server scrapes this target.

use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{routing::get, Router};
use prometheus::{HistogramOpts, HistogramVec, Registry, TextEncoder};
use rand::Rng;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

pub const FAILURE_MESSAGE: &str = "Simulated database connection failure!";

/// `application` label the default queries filter on.
pub const APPLICATION: &str = "performance-demo";

pub const SCRAPE_PATH: &str = "/actuator/prometheus";

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Request timings for the demo routes, kept in a registry private to one router.
#[derive(Clone)]
pub struct DemoMetrics {
    registry: Registry,
    requests: HistogramVec,
}

impl DemoMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let requests = HistogramVec::new(
            HistogramOpts::new("http_server_requests_seconds", "Duration of HTTP server requests")
                .const_label("application", APPLICATION),
            &["method", "uri", "status", "outcome"],
        )?;
        let registry = Registry::new();
        registry.register(Box::new(requests.clone()))?;
        Ok(Self { registry, requests })
    }

    fn observe(&self, method: &str, uri: &str, status: StatusCode, elapsed: Duration) {
        self.requests
            .with_label_values(&[method, uri, status.as_str(), outcome(status)])
            .observe(elapsed.as_secs_f64());
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

/// Status class label, e.g. `SERVER_ERROR` for any 5xx.
fn outcome(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "INFORMATIONAL",
        200..=299 => "SUCCESS",
        300..=399 => "REDIRECTION",
        400..=499 => "CLIENT_ERROR",
        500..=599 => "SERVER_ERROR",
        _ => "UNKNOWN",
    }
}

async fn record(State(metrics): State<DemoMetrics>, req: Request, next: Next) -> Response {
    // Route template, so /api/slow/1 and /api/slow/2 share one series.
    let uri = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "UNKNOWN".to_owned());
    let method = req.method().as_str().to_owned();

    let started = Instant::now();
    let response = next.run(req).await;
    metrics.observe(&method, &uri, response.status(), started.elapsed());
    response
}

async fn scrape(State(metrics): State<DemoMetrics>) -> Result<String, StatusCode> {
    metrics.render().map_err(|e| {
        error!(error = %e, "failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(metrics: DemoMetrics) -> Router {
    Router::new()
        .route("/api/fast", get(fast))
        .route("/api/slow/{id}", get(slow))
        .route_layer(middleware::from_fn_with_state(metrics.clone(), record))
        .route(SCRAPE_PATH, get(scrape))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

async fn fast() -> &'static str {
    "This was fast!"
}

async fn slow(Path(id): Path<String>) -> Result<String, (StatusCode, &'static str)> {
    let (delay_ms, fail) = {
        let mut rng = rand::thread_rng();
        (200 + rng.gen_range(0..1000u64), rng.gen_range(0..100) == 1)
    };
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    if fail {
        warn!(%id, "simulated failure");
        return Err((StatusCode::INTERNAL_SERVER_ERROR, FAILURE_MESSAGE));
    }
    Ok(format!("Data for {} (after {}ms)", id, delay_ms))
}

/// Serve the demo target until the process is interrupted.
pub async fn serve(bind: &str) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = bind.parse()?;
    let app = router(DemoMetrics::new()?);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, scrape = SCRAPE_PATH, "demo target listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn body_text(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8_lossy(&body).into_owned()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_fast_endpoint() {
        let response = router(DemoMetrics::new().unwrap())
            .oneshot(get_req("/api/fast"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "This was fast!");
    }

    #[tokio::test]
    async fn test_slow_endpoint_delays() {
        let started = std::time::Instant::now();
        let response = router(DemoMetrics::new().unwrap())
            .oneshot(get_req("/api/slow/42"))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));

        let status = response.status();
        let text = body_text(response).await;
        if status == StatusCode::OK {
            assert!(text.starts_with("Data for 42 (after "));
        } else {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(text, FAILURE_MESSAGE);
        }
    }

    #[tokio::test]
    async fn test_requests_are_scrapeable() {
        let app = router(DemoMetrics::new().unwrap());

        let response = app.clone().oneshot(get_req("/api/fast")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_req(SCRAPE_PATH)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;

        assert!(text.contains("http_server_requests_seconds_bucket{"));
        assert!(text.contains("http_server_requests_seconds_count{"));
        assert!(text.contains("application=\"performance-demo\""));
        assert!(text.contains("uri=\"/api/fast\""));
        assert!(text.contains("outcome=\"SUCCESS\""));
        // The scrape endpoint does not time itself.
        assert!(!text.contains(SCRAPE_PATH));
    }

    #[test]
    fn test_outcome_classes() {
        assert_eq!(outcome(StatusCode::OK), "SUCCESS");
        assert_eq!(outcome(StatusCode::NOT_FOUND), "CLIENT_ERROR");
        assert_eq!(outcome(StatusCode::INTERNAL_SERVER_ERROR), "SERVER_ERROR");
    }
}
