#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use surge_core::surge_metrics::{Observation, Registry};
use surge_core::{
    HttpTarget, HttpTransport, HttpWorkUnit, IterationContext, RunConfig, RunReport, Scheduler,
    Stage, TransportError, WorkError, WorkUnit,
};
use surge_http::{HttpRequest, HttpResponse};
use tokio_util::sync::CancellationToken;

pub type StatusFn = Arc<dyn Fn(u64) -> u16 + Send + Sync>;

/// In-process transport with a fixed latency and a status chosen per call.
pub struct MockTransport {
    latency: Duration,
    status: StatusFn,
    calls: AtomicU64,
}

impl MockTransport {
    pub fn new(latency: Duration) -> Self {
        Self::with_status(latency, Arc::new(|_| 200))
    }

    pub fn with_status(latency: Duration, status: StatusFn) -> Self {
        Self {
            latency,
            status,
            calls: AtomicU64::new(0),
        }
    }

    /// Every other request answers 500.
    pub fn half_failing(latency: Duration) -> Self {
        Self::with_status(latency, Arc::new(|n| if n % 2 == 0 { 200 } else { 500 }))
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, _req: HttpRequest) -> Result<HttpResponse, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;
        Ok(HttpResponse {
            status: (self.status)(n),
            body: Bytes::from_static(b"{\"ok\":true}"),
            headers: Vec::new(),
            bytes_sent: 64,
            bytes_received: 96,
        })
    }
}

/// Generic work unit counting started and finished executions.
pub struct CountingWork {
    latency: Option<Duration>,
    panic_once: AtomicBool,
    pub started: AtomicU64,
    pub finished: AtomicU64,
}

impl CountingWork {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            panic_once: AtomicBool::new(false),
            started: AtomicU64::new(0),
            finished: AtomicU64::new(0),
        }
    }

    /// Never finishes an iteration.
    pub fn hanging() -> Self {
        Self {
            latency: None,
            ..Self::new(Duration::ZERO)
        }
    }

    /// Panics on the first execution, then behaves like [`CountingWork::new`].
    pub fn panicking_once(latency: Duration) -> Self {
        Self {
            panic_once: AtomicBool::new(true),
            ..Self::new(latency)
        }
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WorkUnit for CountingWork {
    async fn execute(&self, _ctx: &IterationContext) -> Result<Vec<Observation>, WorkError> {
        self.started.fetch_add(1, Ordering::Relaxed);
        if self.panic_once.swap(false, Ordering::Relaxed) {
            panic!("work unit blew up");
        }
        match self.latency {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
        self.finished.fetch_add(1, Ordering::Relaxed);
        Ok(Vec::new())
    }
}

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

pub fn stages(list: &[(u64, u64)]) -> Vec<Stage> {
    list.iter().map(|&(d, t)| Stage::new(secs(d), t)).collect()
}

pub fn http_work(transport: Arc<MockTransport>) -> Arc<HttpWorkUnit> {
    let target = HttpTarget::new("http://mock.local");
    Arc::new(
        HttpWorkUnit::new(transport, target).unwrap_or_else(|e| panic!("http work unit: {e}")),
    )
}

pub fn scheduler(config: RunConfig) -> Scheduler {
    Scheduler::new(config, Arc::new(Registry::default()))
        .unwrap_or_else(|e| panic!("scheduler: {e}"))
}

pub async fn run(scheduler: &Scheduler, work: Arc<dyn WorkUnit>) -> RunReport {
    scheduler
        .start(work, CancellationToken::new())
        .await
        .unwrap_or_else(|e| panic!("run: {e}"))
}

pub fn assert_slot_accounting(report: &RunReport) {
    let s = report.slots;
    assert_eq!(
        s.spawned,
        s.completed + s.abandoned + s.faulted,
        "every spawned slot must be accounted for: {s:?}"
    );
}
