use statrs::statistics::{Data, OrderStatistics, Statistics};
use tracing::debug;

/// Samples per chunk before the buffer is folded into running chunk
/// statistics. Bounds memory at genome scale regardless of candidate count.
pub const CHUNK_CAPACITY: usize = 20_000;

pub const FIXED_STAT_ROWS: [&str; 6] = ["median", "mean", "stddev", "n", "min", "max"];

const HISTOGRAM_BUCKETS: usize = 10;

/// Memory-bounded aggregation of one measurement's value distribution.
///
/// Samples accumulate in a fixed-size buffer; each full buffer is reduced to
/// its median/mean/sample-stddev and appended to three running lists. The
/// reported median/mean/stddev are the arithmetic mean of the per-chunk
/// values. This is a deliberate approximation, not an exact global
/// statistic: the chunking exists to keep memory flat over tens of millions
/// of samples, and the averaged form is part of the contract. n/min/max are
/// exact.
#[derive(Debug)]
pub struct ChunkedStats {
    capacity: usize,
    buffer: Vec<f64>,
    chunk_medians: Vec<f64>,
    chunk_means: Vec<f64>,
    chunk_stddevs: Vec<f64>,
    n: u64,
    min: f64,
    max: f64,
    histogram: Option<Histogram>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSummary {
    pub median: f64,
    pub mean: f64,
    pub stddev: f64,
    pub n: u64,
    pub min: f64,
    pub max: f64,
}

impl ChunkedStats {
    pub fn new() -> Self {
        Self::with_capacity(CHUNK_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ChunkedStats {
            capacity: capacity.max(1),
            buffer: Vec::new(),
            chunk_medians: Vec::new(),
            chunk_means: Vec::new(),
            chunk_stddevs: Vec::new(),
            n: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            histogram: None,
        }
    }

    /// Replaces the histogram with fresh buckets over [lo, hi). Existing
    /// bucket counts are discarded, so bounds belong in the configuration,
    /// set before sampling starts.
    pub fn set_histogram_bounds(&mut self, lo: f64, hi: f64) {
        self.histogram = Some(Histogram::new(lo, hi));
    }

    pub fn record(&mut self, value: f64) {
        self.n += 1;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        if let Some(h) = self.histogram.as_mut() {
            h.add(value);
        }
        self.buffer.push(value);
        if self.buffer.len() >= self.capacity {
            self.roll_chunk();
        }
    }

    fn roll_chunk(&mut self) {
        let (median, mean, stddev) = chunk_statistics(&self.buffer);
        self.chunk_medians.push(median);
        self.chunk_means.push(mean);
        self.chunk_stddevs.push(stddev);
        debug!(
            "rolled chunk #{}: median={:.6} mean={:.6} stddev={:.6}",
            self.chunk_medians.len(),
            median,
            mean,
            stddev
        );
        self.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Chunk-averaged summary over everything recorded so far. A trailing
    /// partial buffer participates as one more chunk; the accumulator itself
    /// is left untouched.
    pub fn summary(&self) -> Option<StatsSummary> {
        if self.n == 0 {
            return None;
        }
        let mut medians = self.chunk_medians.clone();
        let mut means = self.chunk_means.clone();
        let mut stddevs = self.chunk_stddevs.clone();
        if !self.buffer.is_empty() {
            let (median, mean, stddev) = chunk_statistics(&self.buffer);
            medians.push(median);
            means.push(mean);
            stddevs.push(stddev);
        }
        Some(StatsSummary {
            median: (&medians).mean(),
            mean: (&means).mean(),
            stddev: (&stddevs).mean(),
            n: self.n,
            min: self.min,
            max: self.max,
        })
    }

    /// Statistics-file rows: the fixed names in declaration order, then the
    /// histogram buckets ascending, then the out-of-range overflow count.
    pub fn rows(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        match self.summary() {
            Some(s) => {
                out.push(("median".to_string(), format_stat(s.median)));
                out.push(("mean".to_string(), format_stat(s.mean)));
                out.push(("stddev".to_string(), format_stat(s.stddev)));
                out.push(("n".to_string(), s.n.to_string()));
                out.push(("min".to_string(), format_stat(s.min)));
                out.push(("max".to_string(), format_stat(s.max)));
            }
            None => {
                for name in FIXED_STAT_ROWS {
                    let value = if name == "n" { "0".to_string() } else { String::new() };
                    out.push((name.to_string(), value));
                }
            }
        }
        if let Some(h) = &self.histogram {
            out.extend(h.rows());
        }
        out
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.chunk_medians.clear();
        self.chunk_means.clear();
        self.chunk_stddevs.clear();
        self.n = 0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
        if let Some(h) = self.histogram.as_mut() {
            h.reset();
        }
    }
}

fn chunk_statistics(values: &[f64]) -> (f64, f64, f64) {
    let mean = values.mean();
    let stddev = if values.len() < 2 { 0.0 } else { values.std_dev() };
    let mut data = Data::new(values.to_vec());
    let median = data.median();
    (median, mean, stddev)
}

fn format_stat(v: f64) -> String {
    if v.is_finite() {
        format!("{:.6}", v)
    } else {
        String::new()
    }
}

/// Incremental fixed-width histogram with an overflow bucket for values
/// outside the configured range.
#[derive(Debug)]
pub struct Histogram {
    lo: f64,
    hi: f64,
    buckets: [u64; HISTOGRAM_BUCKETS],
    overflow: u64,
}

impl Histogram {
    pub fn new(lo: f64, hi: f64) -> Self {
        let (lo, hi) = if hi > lo { (lo, hi) } else { (lo, lo + 1.0) };
        Histogram {
            lo,
            hi,
            buckets: [0; HISTOGRAM_BUCKETS],
            overflow: 0,
        }
    }

    pub fn add(&mut self, value: f64) {
        if !value.is_finite() || value < self.lo || value >= self.hi {
            self.overflow += 1;
            return;
        }
        let width = (self.hi - self.lo) / HISTOGRAM_BUCKETS as f64;
        let idx = ((value - self.lo) / width) as usize;
        self.buckets[idx.min(HISTOGRAM_BUCKETS - 1)] += 1;
    }

    pub fn rows(&self) -> Vec<(String, String)> {
        let width = (self.hi - self.lo) / HISTOGRAM_BUCKETS as f64;
        let mut out = Vec::with_capacity(HISTOGRAM_BUCKETS + 1);
        for (i, count) in self.buckets.iter().enumerate() {
            let lo = self.lo + width * i as f64;
            let hi = self.lo + width * (i + 1) as f64;
            out.push((
                format!("{}-{}", format_bound(lo), format_bound(hi)),
                count.to_string(),
            ));
        }
        out.push(("overflow".to_string(), self.overflow.to_string()));
        out
    }

    pub fn reset(&mut self) {
        self.buckets = [0; HISTOGRAM_BUCKETS];
        self.overflow = 0;
    }
}

fn format_bound(v: f64) -> String {
    // Snap accumulated floating error before printing bucket names
    let v = (v * 1e6).round() / 1e6;
    if (v - v.round()).abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        format!("{}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exact_counters_and_single_chunk() {
        let mut stats = ChunkedStats::new();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.record(v);
        }
        let s = stats.summary().unwrap();
        assert_eq!(s.n, 5);
        assert_relative_eq!(s.min, 1.0);
        assert_relative_eq!(s.max, 5.0);
        assert_relative_eq!(s.median, 3.0);
        assert_relative_eq!(s.mean, 3.0);
        // sample stddev of 1..=5
        assert_relative_eq!(s.stddev, 1.5811388300841898, epsilon = 1e-12);
    }

    #[test]
    fn chunk_averaging_is_mean_of_chunk_statistics() {
        // Capacity 4 forces two full chunks with different medians: the
        // summary must average them, not recompute a global median.
        let mut stats = ChunkedStats::with_capacity(4);
        for v in [1.0, 1.0, 1.0, 1.0] {
            stats.record(v);
        }
        for v in [9.0, 9.0, 9.0, 9.0] {
            stats.record(v);
        }
        let s = stats.summary().unwrap();
        assert_relative_eq!(s.median, 5.0);
        assert_relative_eq!(s.mean, 5.0);
        assert_eq!(s.n, 8);
        assert_relative_eq!(s.min, 1.0);
        assert_relative_eq!(s.max, 9.0);
    }

    #[test]
    fn partial_trailing_chunk_counts() {
        let mut stats = ChunkedStats::with_capacity(4);
        for v in [2.0, 2.0, 2.0, 2.0] {
            stats.record(v);
        }
        stats.record(10.0); // partial buffer of one
        let s = stats.summary().unwrap();
        assert_relative_eq!(s.median, 6.0); // mean of chunk medians 2 and 10
        assert_eq!(s.n, 5);
    }

    #[test]
    fn summary_does_not_consume_state() {
        let mut stats = ChunkedStats::with_capacity(4);
        for v in [1.0, 2.0, 3.0] {
            stats.record(v);
        }
        let first = stats.summary().unwrap();
        let second = stats.summary().unwrap();
        assert_eq!(first, second);
        stats.record(4.0);
        assert_eq!(stats.summary().unwrap().n, 4);
    }

    #[test]
    fn histogram_buckets_and_overflow() {
        let mut h = Histogram::new(0.0, 100.0);
        h.add(0.0);
        h.add(5.0);
        h.add(95.0);
        h.add(100.0); // hi is exclusive
        h.add(-1.0);
        let rows = h.rows();
        assert_eq!(rows.len(), 11);
        assert_eq!(rows[0], ("0-10".to_string(), "2".to_string()));
        assert_eq!(rows[9], ("90-100".to_string(), "1".to_string()));
        assert_eq!(rows[10], ("overflow".to_string(), "2".to_string()));
    }

    #[test]
    fn clear_resets_everything() {
        let mut stats = ChunkedStats::with_capacity(2);
        stats.set_histogram_bounds(0.0, 1.0);
        for v in [0.1, 0.2, 0.3] {
            stats.record(v);
        }
        stats.clear();
        assert!(stats.is_empty());
        assert!(stats.summary().is_none());
        let rows = stats.rows();
        assert_eq!(rows[3], ("n".to_string(), "0".to_string()));
    }
}
