use std::sync::Arc;

use async_trait::async_trait;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use surge_http::HttpRequest;
use surge_metrics::Observation;
use tokio::time::Instant;

use crate::builtin::{
    CHECKS, DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS,
};
use crate::checks::CheckInput;
use crate::config::{Endpoint, HttpTarget};
use crate::error::{Error, Result, WorkError};
use crate::transport::HttpTransport;
use crate::work::{IterationContext, WorkUnit};

/// Status codes counted as successful responses.
fn is_expected_status(status: u16) -> bool {
    (200..400).contains(&status)
}

/// Work unit issuing one HTTP request per iteration against a weighted endpoint choice.
pub struct HttpWorkUnit {
    transport: Arc<dyn HttpTransport>,
    target: HttpTarget,
    urls: Vec<String>,
    weights: WeightedIndex<u32>,
}

impl HttpWorkUnit {
    pub fn new(transport: Arc<dyn HttpTransport>, target: HttpTarget) -> Result<Self> {
        target.validate()?;
        let weights = WeightedIndex::new(target.endpoints.iter().map(|e| e.weight))
            .map_err(|_| Error::NoEndpoints)?;
        let urls = target.endpoints.iter().map(|e| target.url_for(e)).collect();

        Ok(Self {
            transport,
            target,
            urls,
            weights,
        })
    }

    pub fn target(&self) -> &HttpTarget {
        &self.target
    }

    fn pick(&self) -> (&Endpoint, &str) {
        let idx = self.weights.sample(&mut rand::rng());
        (&self.target.endpoints[idx], &self.urls[idx])
    }
}

#[async_trait]
impl WorkUnit for HttpWorkUnit {
    async fn execute(
        &self,
        _ctx: &IterationContext,
    ) -> std::result::Result<Vec<Observation>, WorkError> {
        let (endpoint, url) = self.pick();
        let req = HttpRequest::new(endpoint.method.clone(), url).with_timeout(self.target.timeout);

        let started = Instant::now();
        let result = self.transport.send(req).await;
        let duration = started.elapsed();

        let method = endpoint.method.as_str();
        let path = endpoint.path.as_str();
        let duration_ms = duration.as_secs_f64() * 1000.0;

        let mut out = Vec::with_capacity(6 + self.target.checks.len());
        let (response, failed) = match &result {
            Ok(res) => {
                let status = res.status.to_string();
                let tags = [
                    ("method", method),
                    ("endpoint", path),
                    ("status", status.as_str()),
                ];
                out.push(Observation::new(HTTP_REQS, 1.0).tags(tags));
                out.push(Observation::new(HTTP_REQ_DURATION, duration_ms).tags(tags));
                out.push(Observation::new(DATA_SENT, res.bytes_sent as f64).tag("endpoint", path));
                out.push(
                    Observation::new(DATA_RECEIVED, res.bytes_received as f64)
                        .tag("endpoint", path),
                );
                (Some(res), !is_expected_status(res.status))
            }
            Err(err) => {
                tracing::debug!(endpoint = path, error = %err, "request failed");
                let kind = err.kind.to_string();
                let tags = [
                    ("method", method),
                    ("endpoint", path),
                    ("error", kind.as_str()),
                ];
                out.push(Observation::new(HTTP_REQS, 1.0).tags(tags));
                out.push(Observation::new(HTTP_REQ_DURATION, duration_ms).tags(tags));
                (None, true)
            }
        };

        out.push(
            Observation::flag(HTTP_REQ_FAILED, failed)
                .tag("method", method)
                .tag("endpoint", path),
        );

        let input = CheckInput { response, duration };
        for check in &self.target.checks {
            let passed = check.evaluate(&input);
            out.push(Observation::flag(CHECKS, passed).tag("check", check.name.as_str()));
        }

        Ok(out)
    }
}
