use std::time::Duration;

use rand::Rng;

use crate::checks::Check;
use crate::error::{Error, Result};
use crate::thresholds::ThresholdSet;

pub const DEFAULT_TICK: Duration = Duration::from_millis(100);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_THRESHOLD_CHECK_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Pause between iterations, drawn uniformly from `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
}

impl ThinkTime {
    pub fn fixed(d: Duration) -> Self {
        Self { min: d, max: d }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max > self.min {
            rng.random_range(self.min..=self.max)
        } else {
            self.min
        }
    }
}

/// Run shape. Immutable once the scheduler starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub start_vus: u64,
    pub stages: Vec<Stage>,
    pub thresholds: Vec<ThresholdSet>,
    pub think_time: Option<ThinkTime>,
    /// Global concurrency cap. Targets above it are clamped and the run is marked degraded.
    pub max_vus: Option<u64>,
    pub tick: Duration,
    /// How long stopping waits for in-flight iterations before abandoning them.
    pub graceful_stop: Duration,
    pub threshold_check_interval: Duration,
}

impl RunConfig {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            start_vus: 0,
            stages,
            thresholds: Vec::new(),
            think_time: None,
            max_vus: None,
            tick: DEFAULT_TICK,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            threshold_check_interval: DEFAULT_THRESHOLD_CHECK_INTERVAL,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration))
    }

    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::NoStages);
        }
        if self.total_duration().is_zero() {
            return Err(Error::ZeroDuration);
        }
        if self.tick.is_zero() {
            return Err(Error::InvalidTick);
        }
        if self.threshold_check_interval.is_zero() {
            return Err(Error::InvalidThresholdCheckInterval);
        }
        if let Some(tt) = self.think_time
            && tt.min > tt.max
        {
            return Err(Error::InvalidThinkTime {
                min: tt.min,
                max: tt.max,
            });
        }
        if self.max_vus == Some(0) {
            return Err(Error::InvalidMaxVus);
        }
        for set in &self.thresholds {
            set.parse()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: http::Method,
    /// Path (and optional query) appended to the base URL.
    pub path: String,
    pub weight: u32,
}

impl Endpoint {
    pub fn get(path: impl Into<String>, weight: u32) -> Self {
        Self {
            method: http::Method::GET,
            path: path.into(),
            weight,
        }
    }
}

/// Target of the built-in HTTP work unit.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    pub base_url: String,
    pub endpoints: Vec<Endpoint>,
    pub checks: Vec<Check>,
    pub timeout: Option<Duration>,
}

impl HttpTarget {
    /// `/data` and `/job` picked with equal probability, checked for a 200 answered within 5s.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoints: vec![Endpoint::get("/data", 1), Endpoint::get("/job", 1)],
            checks: vec![
                Check::status("status is 200", 200),
                Check::duration_below("response time < 5000ms", Duration::from_millis(5000)),
            ],
            timeout: None,
        }
    }

    pub fn url_for(&self, endpoint: &Endpoint) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), endpoint.path)
    }

    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|_| Error::InvalidBaseUrl(self.base_url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(Error::InvalidBaseUrl(self.base_url.clone()));
        }

        for ep in &self.endpoints {
            if !ep.path.starts_with('/') {
                return Err(Error::InvalidEndpoint {
                    path: ep.path.clone(),
                    reason: "path must start with `/`".to_string(),
                });
            }
            if url::Url::parse(&self.url_for(ep)).is_err() {
                return Err(Error::InvalidEndpoint {
                    path: ep.path.clone(),
                    reason: "not a valid URL path".to_string(),
                });
            }
        }

        if self.endpoints.iter().all(|ep| ep.weight == 0) {
            return Err(Error::NoEndpoints);
        }
        Ok(())
    }
}
