use std::fmt::Write as _;

use surge_core::{RunOutcome, RunReport, ThresholdOutcome};

use super::format::*;
use crate::output::view;

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();
    let snap = &report.result.snapshot;

    out.push_str("summary\n");
    writeln!(
        &mut out,
        "  outcome: {}{}",
        view::outcome_label(&report.outcome),
        outcome_detail(&report.outcome)
    )
    .ok();
    writeln!(&mut out, "  elapsed: {}", format_duration(report.elapsed)).ok();

    let s = &report.slots;
    writeln!(
        &mut out,
        "  vus: peak {} (spawned {}, retired {}, abandoned {}, faulted {})",
        s.peak, s.spawned, s.retired, s.abandoned, s.faulted
    )
    .ok();

    let totals = view::totals(snap);
    writeln!(
        &mut out,
        "  requests: {} (failed {}, {:.2}%)",
        totals.requests,
        totals.failed_requests,
        view::pct(totals.failed_requests, totals.requests)
    )
    .ok();
    writeln!(&mut out, "  iterations: {}", totals.iterations).ok();
    writeln!(
        &mut out,
        "  bytes: recv {} sent {}",
        format_bytes(totals.bytes_received),
        format_bytes(totals.bytes_sent)
    )
    .ok();

    match view::latency(snap) {
        Some(t) => {
            writeln!(
                &mut out,
                "  latency = p50={} p90={} p95={} p99={} mean={} max={} (n={})",
                format_ms_opt(t.p50),
                format_ms_opt(t.p90),
                format_ms_opt(t.p95),
                format_ms_opt(t.p99),
                format_ms_opt(t.avg),
                format_ms_opt(t.max),
                t.count
            )
            .ok();
        }
        None => out.push_str("  latency: n/a\n"),
    }

    let endpoints = view::endpoints(snap);
    if !endpoints.is_empty() {
        out.push_str("  endpoints:\n");
        for e in endpoints {
            writeln!(
                &mut out,
                "    {}: {} req, {} failed, p95={}",
                e.endpoint,
                e.requests,
                e.failed,
                format_ms_opt(e.p95_ms)
            )
            .ok();
        }
    }

    let checks = view::checks(snap);
    if !checks.is_empty() {
        out.push_str("  checks:\n");
        for c in checks {
            let total = c.passes.saturating_add(c.fails);
            writeln!(
                &mut out,
                "    {}: {:.2}% ({} / {})",
                c.name,
                view::pct(c.passes, total),
                c.passes,
                total
            )
            .ok();
        }
    }

    if report.dropped_observations > 0 {
        writeln!(
            &mut out,
            "  dropped observations: {}",
            report.dropped_observations
        )
        .ok();
    }

    if !report.result.thresholds.is_empty() {
        out.push_str("\nthresholds\n");
        for t in &report.result.thresholds {
            render_threshold(t, &mut out);
        }
    }

    out
}

fn outcome_detail(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::AbortedByThreshold { metric, expression } => {
            format!(" ({metric}: {expression})")
        }
        RunOutcome::Degraded { reason } => format!(" ({reason})"),
        RunOutcome::Completed | RunOutcome::Cancelled => String::new(),
    }
}

fn render_threshold(t: &ThresholdOutcome, out: &mut String) {
    let mark = if t.passed() { "ok  " } else { "FAIL" };
    let observed = t
        .observed
        .map_or_else(|| "-".to_string(), |v| format!("{v:.4}"));
    match t.failure {
        Some(reason) => writeln!(
            out,
            "  {mark} {}: {} (observed {observed}, {reason})",
            t.metric, t.expression
        ),
        None => writeln!(
            out,
            "  {mark} {}: {} (observed {observed})",
            t.metric, t.expression
        ),
    }
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::view::tests::sample_report;

    #[test]
    fn summary_lists_totals_checks_and_thresholds() {
        let text = render(&sample_report());

        assert!(text.starts_with("summary\n"));
        assert!(text.contains("  outcome: completed\n"));
        assert!(text.contains("  requests: 3 (failed 1, 33.33%)"));
        assert!(text.contains("    /data: 2 req, 1 failed"));
        assert!(text.contains("    status is 200: 66.67% (2 / 3)"));
        assert!(text.contains("FAIL http_req_failed: rate<0.01 (observed 0.3333, violated)"));
    }

    #[test]
    fn aborted_outcome_names_the_threshold() {
        let mut report = sample_report();
        report.outcome = RunOutcome::AbortedByThreshold {
            metric: "http_req_failed".to_string(),
            expression: "rate<0.01".to_string(),
        };
        let text = render(&report);
        assert!(text.contains("  outcome: aborted_by_threshold (http_req_failed: rate<0.01)"));
    }
}
