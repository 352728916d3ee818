use surge_metrics::{MetricSnapshot, MetricValue, MetricsSnapshot, Registry, SeriesData};

use crate::error::{Error, Result};
use crate::result::{FailureReason, TestResult, ThresholdFailure, ThresholdOutcome};
use crate::thresholds::{ThresholdAgg, ThresholdSet, parse_metric_selector, parse_threshold_expr};

/// Checks that every threshold parses and names a registered metric.
pub fn validate_thresholds(sets: &[ThresholdSet], registry: &Registry) -> Result<()> {
    for set in sets {
        let parsed = set.parse()?;
        if !registry.is_registered(&parsed.name) {
            return Err(Error::UnknownThresholdMetric(parsed.name));
        }
    }
    Ok(())
}

/// Evaluates every expression of every set against `snapshot`.
///
/// Pure: the same inputs always give the same result, and no expression short-circuits the
/// others.
pub fn evaluate(sets: &[ThresholdSet], snapshot: MetricsSnapshot) -> TestResult {
    let thresholds = evaluate_outcomes(sets, &snapshot);

    let failed_thresholds: Vec<ThresholdFailure> = thresholds
        .iter()
        .filter_map(|o| {
            o.failure.map(|reason| ThresholdFailure {
                metric: o.metric.clone(),
                expression: o.expression.clone(),
                observed: o.observed,
                reason,
            })
        })
        .collect();

    TestResult {
        passed: failed_thresholds.is_empty(),
        snapshot,
        thresholds,
        failed_thresholds,
    }
}

pub(crate) fn evaluate_outcomes(
    sets: &[ThresholdSet],
    snapshot: &MetricsSnapshot,
) -> Vec<ThresholdOutcome> {
    let mut out = Vec::new();

    for set in sets {
        let outcome = |expression: &str, observed: Option<f64>, failure| ThresholdOutcome {
            metric: set.metric.clone(),
            expression: expression.to_string(),
            observed,
            failure,
        };

        let target = parse_metric_selector(&set.metric)
            .ok()
            .and_then(|(name, selector)| snapshot.get(&name).map(|m| (m, selector)));

        let Some((metric, selector)) = target else {
            let reason = if parse_metric_selector(&set.metric).is_ok() {
                FailureReason::MissingMetric
            } else {
                FailureReason::InvalidExpression
            };
            for expr in &set.expressions {
                out.push(outcome(expr, None, Some(reason)));
            }
            continue;
        };

        let data = metric.aggregate(&selector);
        let has_data = has_samples(metric, &selector, &data);

        for raw in &set.expressions {
            let Ok(expr) = parse_threshold_expr(raw) else {
                out.push(outcome(raw, None, Some(FailureReason::InvalidExpression)));
                continue;
            };

            if !has_data {
                let failure = (!set.allow_empty).then_some(FailureReason::NoData);
                out.push(outcome(raw, None, failure));
                continue;
            }

            let (failure, observed) = match observed_value(&data, expr.agg) {
                None => (Some(FailureReason::UnsupportedAggregation), None),
                Some(None) => (Some(FailureReason::NoData), None),
                Some(Some(v)) => {
                    let failure =
                        (!expr.op.compare(v, expr.value)).then_some(FailureReason::Violated);
                    (failure, Some(v))
                }
            };
            out.push(outcome(raw, observed, failure));
        }
    }

    out
}

fn has_samples(metric: &MetricSnapshot, selector: &[(String, String)], data: &SeriesData) -> bool {
    match data.samples() {
        Some(n) => n > 0,
        // Gauges carry no sample count; any written series counts as data.
        None => metric.matching(selector).next().is_some(),
    }
}

/// `None` when the aggregation does not apply to the data's kind; `Some(None)` when it applies
/// but has no defined value.
fn observed_value(data: &SeriesData, agg: ThresholdAgg) -> Option<Option<f64>> {
    match (data, agg) {
        (SeriesData::Counter(v), ThresholdAgg::Count) => Some(Some(*v as f64)),

        (SeriesData::Gauge(v), ThresholdAgg::Value | ThresholdAgg::Min | ThresholdAgg::Max) => {
            Some(Some(*v as f64))
        }

        (SeriesData::Rate { total, hits }, ThresholdAgg::Rate) => {
            Some((*total > 0).then(|| *hits as f64 / *total as f64))
        }
        (SeriesData::Rate { total, .. }, ThresholdAgg::Count) => Some(Some(*total as f64)),

        (SeriesData::Trend(_), ThresholdAgg::Count) => Some(data.samples().map(|n| n as f64)),
        (SeriesData::Trend(_), ThresholdAgg::Med) => Some(data.quantile(0.5)),
        (SeriesData::Trend(_), ThresholdAgg::P(p)) => Some(data.quantile(p / 100.0)),
        (SeriesData::Trend(_), ThresholdAgg::Avg | ThresholdAgg::Min | ThresholdAgg::Max) => {
            let MetricValue::Trend(t) = data.value() else {
                return None;
            };
            Some(match agg {
                ThresholdAgg::Avg => t.avg,
                ThresholdAgg::Min => t.min,
                _ => t.max,
            })
        }

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_metrics::{MetricKind, Observation};

    fn registry() -> Registry {
        let reg = Registry::default();
        for (name, kind) in [
            ("http_req_duration", MetricKind::Trend),
            ("http_req_failed", MetricKind::Rate),
            ("http_reqs", MetricKind::Counter),
            ("vus", MetricKind::Gauge),
        ] {
            reg.register(name, kind)
                .unwrap_or_else(|e| panic!("register {name}: {e}"));
        }
        reg
    }

    fn record(reg: &Registry, obs: Observation) {
        assert!(reg.record(&obs), "rejected {obs:?}");
    }

    #[test]
    fn missing_metric_fails_every_expression() {
        let reg = registry();
        let sets = vec![ThresholdSet::new("nope", ["count>0", "rate<1"])];

        let result = evaluate(&sets, reg.snapshot());
        assert!(!result.passed);
        assert_eq!(result.failed_thresholds.len(), 2);
        assert!(
            result
                .failed_thresholds
                .iter()
                .all(|f| f.reason == FailureReason::MissingMetric && f.observed.is_none())
        );
    }

    #[test]
    fn empty_metric_is_no_data_unless_allowed() {
        let reg = registry();
        let strict = vec![ThresholdSet::new("http_req_duration", ["p(95)<2000"])];
        let lenient =
            vec![ThresholdSet::new("http_req_duration", ["p(95)<2000"]).with_allow_empty(true)];

        let result = evaluate(&strict, reg.snapshot());
        assert_eq!(result.failed_thresholds[0].reason, FailureReason::NoData);

        let result = evaluate(&lenient, reg.snapshot());
        assert!(result.passed);
        assert!(result.thresholds[0].passed());
    }

    #[test]
    fn kind_mismatch_is_unsupported() {
        let reg = registry();
        record(&reg, Observation::new("http_reqs", 3.0));
        record(&reg, Observation::flag("http_req_failed", false));

        let sets = vec![
            ThresholdSet::new("http_reqs", ["p(95)<10", "count==3"]),
            ThresholdSet::new("http_req_failed", ["avg<1"]),
        ];
        let result = evaluate(&sets, reg.snapshot());
        let reasons: Vec<_> = result.thresholds.iter().map(|o| o.failure).collect();
        assert_eq!(
            reasons,
            vec![
                Some(FailureReason::UnsupportedAggregation),
                None,
                Some(FailureReason::UnsupportedAggregation)
            ]
        );
    }

    #[test]
    fn evaluates_trend_rate_and_gauge() {
        let reg = registry();
        for v in 1..=100 {
            record(&reg, Observation::new("http_req_duration", v as f64));
        }
        for i in 0..100 {
            record(&reg, Observation::flag("http_req_failed", i == 0));
        }
        record(&reg, Observation::new("vus", 25.0));

        let sets = vec![
            ThresholdSet::new(
                "http_req_duration",
                ["p(95)<2000", "med<=51", "avg==50.5", "max<100"],
            ),
            ThresholdSet::new("http_req_failed", ["rate<0.02", "rate<0.01"]),
            ThresholdSet::new("vus", ["value>=25"]),
        ];
        let result = evaluate(&sets, reg.snapshot());

        let failed: Vec<_> = result
            .failed_thresholds
            .iter()
            .map(|f| (f.metric.as_str(), f.expression.as_str()))
            .collect();
        assert_eq!(
            failed,
            vec![
                ("http_req_duration", "max<100"),
                ("http_req_failed", "rate<0.01")
            ]
        );
        assert_eq!(result.failed_thresholds[1].observed, Some(0.01));
        assert_eq!(result.thresholds.len(), 7);
    }

    #[test]
    fn selector_narrows_series() {
        let reg = registry();
        record(
            &reg,
            Observation::new("http_req_duration", 10.0).tag("endpoint", "/job"),
        );
        record(
            &reg,
            Observation::new("http_req_duration", 2500.0).tag("endpoint", "/data"),
        );

        let sets = vec![
            ThresholdSet::new("http_req_duration{endpoint:/job}", ["max<100"]),
            ThresholdSet::new("http_req_duration{endpoint:/data}", ["max<100"]),
            ThresholdSet::new("http_req_duration{endpoint:/nope}", ["max<100"]),
        ];
        let result = evaluate(&sets, reg.snapshot());
        let reasons: Vec<_> = result.thresholds.iter().map(|o| o.failure).collect();
        assert_eq!(
            reasons,
            vec![
                None,
                Some(FailureReason::Violated),
                Some(FailureReason::NoData)
            ]
        );
    }

    #[test]
    fn evaluation_is_idempotent() {
        let reg = registry();
        for v in [5.0, 50.0, 500.0] {
            record(&reg, Observation::new("http_req_duration", v));
        }
        let sets = vec![
            ThresholdSet::new("http_req_duration", ["p(90)<100", "avg<1000"]),
            ThresholdSet::new("missing", ["count>0"]),
        ];

        let snapshot = reg.snapshot();
        let a = evaluate(&sets, snapshot.clone());
        let b = evaluate(&sets, snapshot);
        assert_eq!(a.passed, b.passed);
        assert_eq!(a.thresholds, b.thresholds);
        assert_eq!(a.failed_thresholds, b.failed_thresholds);
    }

    #[test]
    fn validate_rejects_unknown_metric() {
        let reg = registry();
        let ok = vec![ThresholdSet::new("http_req_failed{endpoint:/data}", ["rate<0.01"])];
        assert!(validate_thresholds(&ok, &reg).is_ok());

        let bad = vec![ThresholdSet::new("http_req_duraton", ["p(95)<2000"])];
        assert!(matches!(
            validate_thresholds(&bad, &reg),
            Err(Error::UnknownThresholdMetric(name)) if name == "http_req_duraton"
        ));
    }
}
