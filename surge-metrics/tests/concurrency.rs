use std::sync::Arc;

use proptest::prelude::*;
use surge_metrics::{MetricKind, MetricValue, Observation, Registry, SeriesData};

fn registry() -> Arc<Registry> {
    let reg = Registry::default();
    for (name, kind) in [
        ("reqs", MetricKind::Counter),
        ("failed", MetricKind::Rate),
        ("latency", MetricKind::Trend),
    ] {
        reg.register(name, kind)
            .unwrap_or_else(|e| panic!("register {name}: {e}"));
    }
    Arc::new(reg)
}

fn hammer(reg: &Arc<Registry>, threads: usize, per_thread: usize) {
    std::thread::scope(|scope| {
        for t in 0..threads {
            let reg = reg.clone();
            scope.spawn(move || {
                let endpoint = if t % 2 == 0 { "/data" } else { "/job" };
                for i in 0..per_thread {
                    let reqs = Observation::new("reqs", 1.0).tag("endpoint", endpoint);
                    let failed = Observation::flag("failed", i % 4 == 0);
                    let latency = Observation::new("latency", (i % 500) as f64 + 0.5)
                        .tag("endpoint", endpoint);
                    assert!(reg.record(&reqs));
                    assert!(reg.record(&failed));
                    assert!(reg.record(&latency));
                }
            });
        }
    });
}

#[test]
fn concurrent_records_are_never_lost() {
    let reg = registry();
    hammer(&reg, 8, 10_000);

    let snap = reg.snapshot();
    let expected = 8 * 10_000;
    assert_eq!(snap.counter("reqs"), expected as u64);

    match snap.aggregate("failed", &[]) {
        Some(SeriesData::Rate { total, hits }) => {
            assert_eq!(total, expected as u64);
            assert_eq!(hits, (8 * 2_500) as u64);
        }
        other => panic!("expected rate, got {other:?}"),
    }

    let Some(MetricValue::Trend(t)) = snap.aggregate("latency", &[]).map(|d| d.value()) else {
        panic!("expected trend");
    };
    assert_eq!(t.count, expected as u64);
    assert_eq!(reg.dropped(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn counts_match_for_any_thread_layout(threads in 1usize..8, per_thread in 1usize..400) {
        let reg = registry();
        hammer(&reg, threads, per_thread);

        let snap = reg.snapshot();
        let expected = (threads * per_thread) as u64;
        prop_assert_eq!(snap.counter("reqs"), expected);
        prop_assert_eq!(snap.aggregate("failed", &[]).and_then(|d| d.samples()), Some(expected));
        prop_assert_eq!(snap.aggregate("latency", &[]).and_then(|d| d.samples()), Some(expected));
    }
}
