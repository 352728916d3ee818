use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of independently locked histogram stripes per trend series.
pub(crate) const STRIPES: usize = 8;

/// Significant digits kept by every histogram.
///
/// Three digits bound the relative error of any recorded (and therefore any quantile) value to
/// 0.1%.
pub const SIGNIFICANT_DIGITS: u8 = 3;

/// Trend samples are stored as integer microseconds.
pub(crate) const MICROS_PER_MILLI: f64 = 1000.0;

pub(crate) fn new_histogram() -> Histogram<u64> {
    // Auto-resizing: memory grows with the observed range, not with the sample count.
    match Histogram::<u64>::new(SIGNIFICANT_DIGITS) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

static NEXT_STRIPE: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static HOME_STRIPE: usize = NEXT_STRIPE.fetch_add(1, Ordering::Relaxed) % STRIPES;
}

#[derive(Debug)]
struct Stripe {
    hist: Histogram<u64>,
    sum_us: u64,
}

/// Merged, owned view of a trend series.
#[derive(Debug, Clone)]
pub struct TrendData {
    pub(crate) hist: Histogram<u64>,
    pub(crate) sum_us: u64,
}

impl TrendData {
    pub(crate) fn empty() -> Self {
        Self {
            hist: new_histogram(),
            sum_us: 0,
        }
    }

    pub(crate) fn merge(&mut self, other: &TrendData) {
        let _ = self.hist.add(&other.hist);
        self.sum_us = self.sum_us.saturating_add(other.sum_us);
    }

    pub fn count(&self) -> u64 {
        self.hist.len()
    }
}

/// Trend storage sharded across several mutex-protected histograms.
///
/// Each thread has a home stripe; when it is busy the recorder tries the other stripes before
/// blocking, so producers on different worker threads rarely wait on each other.
#[derive(Debug)]
pub(crate) struct StripedHistogram {
    stripes: Box<[Mutex<Stripe>]>,
}

impl StripedHistogram {
    pub(crate) fn new() -> Self {
        let stripes = (0..STRIPES)
            .map(|_| {
                Mutex::new(Stripe {
                    hist: new_histogram(),
                    sum_us: 0,
                })
            })
            .collect();
        Self { stripes }
    }

    pub(crate) fn record(&self, value_us: u64) -> bool {
        let home = HOME_STRIPE.with(|s| *s);

        for offset in 0..STRIPES {
            let idx = (home + offset) % STRIPES;
            if let Some(mut stripe) = self.stripes[idx].try_lock() {
                return Self::record_into(&mut stripe, value_us);
            }
        }

        let mut stripe = self.stripes[home].lock();
        Self::record_into(&mut stripe, value_us)
    }

    fn record_into(stripe: &mut Stripe, value_us: u64) -> bool {
        if stripe.hist.record(value_us).is_err() {
            return false;
        }
        stripe.sum_us = stripe.sum_us.saturating_add(value_us);
        true
    }

    /// Merges all stripes. Each stripe is copied under its own lock, so count and sum agree.
    pub(crate) fn merged(&self) -> TrendData {
        let mut out = TrendData::empty();
        for stripe in self.stripes.iter() {
            let stripe = stripe.lock();
            let _ = out.hist.add(&stripe.hist);
            out.sum_us = out.sum_us.saturating_add(stripe.sum_us);
        }
        out
    }
}
