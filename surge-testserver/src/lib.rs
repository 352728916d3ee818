use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_DATA: &str = "/data";
pub const PATH_JOB: &str = "/job";
pub const PATH_HEALTHZ: &str = "/healthz";
pub const PATH_FLAKY: &str = "/flaky";
pub const PATH_STATUS: &str = "/status/{code}";

/// Delay applied by `/data` when the request does not override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDelay {
    pub min: Duration,
    pub max: Duration,
}

impl DataDelay {
    pub const NONE: Self = Self {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };
}

impl Default for DataDelay {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    data_total: Arc<AtomicU64>,
    jobs_total: Arc<AtomicU64>,
    flaky_total: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed)
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn data_total(&self) -> u64 {
        self.data_total.load(Ordering::Relaxed)
    }

    pub fn jobs_total(&self) -> u64 {
        self.jobs_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
struct AppState {
    stats: TestServerStats,
    data_delay: DataDelay,
    ready: Arc<AtomicBool>,
}

#[derive(Debug, Deserialize)]
struct DelayQuery {
    delay_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct DataItem {
    id: u32,
    name: String,
    value: f64,
    timestamp: f64,
    metadata: DataMetadata,
}

#[derive(Debug, Serialize)]
struct DataMetadata {
    category: &'static str,
    tags: Vec<String>,
}

fn random_item() -> DataItem {
    let mut rng = rand::rng();
    let categories = ["A", "B", "C", "D"];
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();

    DataItem {
        id: rng.random_range(1..=1000),
        name: format!("Item_{}", rng.random_range(1..=100)),
        value: rng.random_range(0.0..100.0),
        timestamp,
        metadata: DataMetadata {
            category: categories[rng.random_range(0..categories.len())],
            tags: (0..rng.random_range(1..=5))
                .map(|i| format!("tag_{i}"))
                .collect(),
        },
    }
}

fn unavailable() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "detail": "Service is shutting down" })),
    )
}

async fn handle_data(
    State(state): State<AppState>,
    Query(query): Query<DelayQuery>,
) -> Result<Json<DataItem>, (StatusCode, Json<serde_json::Value>)> {
    TestServerStats::inc(&state.stats.requests_total);
    if !state.ready.load(Ordering::Relaxed) {
        return Err(unavailable());
    }
    TestServerStats::inc(&state.stats.data_total);

    let delay = match query.delay_ms {
        Some(ms) => Duration::from_millis(ms),
        None if state.data_delay.max > state.data_delay.min => {
            rand::rng().random_range(state.data_delay.min..=state.data_delay.max)
        }
        None => state.data_delay.min,
    };
    if !delay.is_zero() {
        sleep(delay).await;
    }

    Ok(Json(random_item()))
}

async fn handle_job(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    TestServerStats::inc(&state.stats.requests_total);
    if !state.ready.load(Ordering::Relaxed) {
        return unavailable();
    }
    let n = TestServerStats::inc(&state.stats.jobs_total);

    (
        StatusCode::OK,
        Json(json!({ "task_id": format!("job-{n:08}"), "status": "Job started" })),
    )
}

async fn handle_healthz(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    TestServerStats::inc(&state.stats.requests_total);
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, Json(json!({ "status": "healthy" })))
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "Service is shutting down" })),
        )
    }
}

/// Fails every other request with a 500.
async fn handle_flaky(State(state): State<AppState>) -> StatusCode {
    TestServerStats::inc(&state.stats.requests_total);
    if TestServerStats::inc(&state.stats.flaky_total) % 2 == 0 {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

async fn handle_status(State(state): State<AppState>, Path(code): Path<u16>) -> StatusCode {
    TestServerStats::inc(&state.stats.requests_total);
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route(PATH_DATA, get(handle_data))
        .route(PATH_JOB, get(handle_job))
        .route(PATH_HEALTHZ, get(handle_healthz))
        .route(PATH_FLAKY, get(handle_flaky))
        .route(PATH_STATUS, get(handle_status))
        .with_state(state)
}

/// Router for the standalone binary. `ready` flips to `false` when shutdown starts.
pub fn router(stats: TestServerStats, data_delay: DataDelay, ready: Arc<AtomicBool>) -> Router {
    build_router(AppState {
        stats,
        data_delay,
        ready,
    })
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Starts on an ephemeral port with `/data` answering immediately.
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with_delay(DataDelay::NONE).await
    }

    pub async fn start_with_delay(data_delay: DataDelay) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone(), data_delay, Arc::new(AtomicBool::new(true)));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
