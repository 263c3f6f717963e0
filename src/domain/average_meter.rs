use serde::{Deserialize, Serialize};

/// Running average of a scalar, weighted by how many items each value covers.
///
/// The training loop feeds it the mean loss of every batch together with
/// the batch size, so `get()` is the per-sample average since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageMeter {
    pub sum: f64,
    pub cnt: usize,
    pub avg: f64,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `val` observed over `n` items. Calls with `n == 0` are ignored.
    pub fn update(&mut self, val: f64, n: usize) {
        if n > 0 {
            self.sum += val * n as f64;
            self.cnt += n;
            self.avg = self.sum / self.cnt as f64;
        }
    }

    pub fn get(&self) -> f64 {
        self.avg
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_average() {
        let mut meter = AverageMeter::new();
        meter.update(1.0, 2);
        meter.update(4.0, 1);
        // (1*2 + 4*1) / 3
        assert!((meter.get() - 2.0).abs() < 1e-12);
        assert_eq!(meter.cnt, 3);
    }

    #[test]
    fn test_zero_count_is_ignored() {
        let mut meter = AverageMeter::new();
        meter.update(3.0, 4);
        meter.update(100.0, 0);
        assert_eq!(meter.get(), 3.0);
        assert_eq!(meter.cnt, 4);
    }

    #[test]
    fn test_empty_meter_reads_zero() {
        let meter = AverageMeter::new();
        assert_eq!(meter.get(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut meter = AverageMeter::new();
        meter.update(2.0, 10);
        meter.reset();
        assert_eq!(meter, AverageMeter::default());
    }
}
