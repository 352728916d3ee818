use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use surge_metrics::{MetricKind, Observation, Registry};

const QUANTILES: [f64; 5] = [0.5, 0.75, 0.9, 0.95, 0.99];
const TOLERANCE: f64 = 0.01;

/// Nearest-rank quantile over sorted samples.
fn exact_quantile(sorted: &[f64], q: f64) -> f64 {
    let rank = (q * sorted.len() as f64).ceil().max(1.0) as usize;
    sorted[rank.min(sorted.len()) - 1]
}

fn assert_quantiles_within_bound(samples: Vec<f64>) {
    let reg = Registry::default();
    reg.register("latency", MetricKind::Trend)
        .unwrap_or_else(|e| panic!("register: {e}"));
    for v in &samples {
        assert!(reg.record(&Observation::new("latency", *v)));
    }

    let mut sorted = samples;
    sorted.sort_by(f64::total_cmp);

    let data = reg
        .snapshot()
        .aggregate("latency", &[])
        .unwrap_or_else(|| panic!("latency not registered"));

    for q in QUANTILES {
        let exact = exact_quantile(&sorted, q);
        let approx = data
            .quantile(q)
            .unwrap_or_else(|| panic!("no quantile for {q}"));
        let err = (approx - exact).abs() / exact;
        assert!(
            err <= TOLERANCE,
            "q={q}: approx {approx} vs exact {exact} (relative error {err})"
        );
    }
}

#[test]
fn uniform_latencies() {
    let mut rng = StdRng::seed_from_u64(7);
    let samples = (0..50_000)
        .map(|_| rng.random_range(1.0..3000.0))
        .collect();
    assert_quantiles_within_bound(samples);
}

#[test]
fn long_tail_latencies() {
    let mut rng = StdRng::seed_from_u64(42);
    // Pareto-like tail: most requests fast, a few orders of magnitude slower.
    let samples = (0..50_000)
        .map(|_| {
            let u: f64 = rng.random_range(0.0001..1.0);
            5.0 / u.powf(0.8)
        })
        .collect();
    assert_quantiles_within_bound(samples);
}
