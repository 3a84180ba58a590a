//! Linear-bucket histogram with atomic counters.
//!
//! Buckets cover the inclusive range `[min, max]`; values outside are
//! clamped to the first/last bucket. `record` is a single relaxed
//! increment, cheap enough for allocator hot paths.

use core::sync::atomic::{AtomicU64, Ordering};

pub struct Histogram {
    min: u64,
    max: u64,
    width: u64,
    counts: Box<[AtomicU64]>,
}

/// Value copy of the counters at one point in time.
#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    pub min: u64,
    pub max: u64,
    pub buckets: usize,
    pub counts: Vec<u64>,
}

impl Histogram {
    pub fn new(min: u64, max: u64, buckets: usize) -> Self {
        let max = max.max(min);
        let buckets = buckets.max(1);
        let span = max - min + 1;
        let width = span.div_ceil(buckets as u64).max(1);
        let counts = (0..buckets).map(|_| AtomicU64::new(0)).collect();
        Histogram {
            min,
            max,
            width,
            counts,
        }
    }

    #[inline]
    fn index_for(&self, v: u64) -> usize {
        if v <= self.min {
            return 0;
        }
        if v >= self.max {
            return self.counts.len() - 1;
        }
        let idx = ((v - self.min) / self.width) as usize;
        idx.min(self.counts.len() - 1)
    }

    #[inline]
    pub fn record(&self, v: u64) {
        self.counts[self.index_for(v)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            min: self.min,
            max: self.max,
            buckets: self.counts.len(),
            counts: self
                .counts
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_samples() {
        let h = Histogram::new(10, 19, 10);
        h.record(0);
        h.record(10);
        h.record(19);
        h.record(1000);
        let s = h.snapshot();
        assert_eq!(s.counts[0], 2);
        assert_eq!(s.counts[9], 2);
        assert_eq!(s.counts.iter().sum::<u64>(), 4);
    }

    #[test]
    fn spreads_samples_across_buckets() {
        let h = Histogram::new(0, 63, 64);
        for v in 0..64 {
            h.record(v);
        }
        let s = h.snapshot();
        assert!(s.counts.iter().all(|&c| c == 1));
    }

    #[test]
    fn degenerate_range_still_counts() {
        let h = Histogram::new(5, 5, 4);
        h.record(5);
        h.record(7);
        let s = h.snapshot();
        assert_eq!(s.counts.iter().sum::<u64>(), 2);
    }
}
