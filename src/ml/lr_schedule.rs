/// Linear warmup followed by linear decay to a floor.
///
/// ```text
/// factor(k) = (k + 1) / warmup                           k <  warmup
///           = 1 - (1 - min_ratio) (k - warmup) / (total - warmup)
///             floored at min_ratio                        k >= warmup
/// lr(k)     = base_lr * factor(k)
/// ```
///
/// `k` counts optimizer steps taken so far; call [`LinearWarmup::step`]
/// once after every optimizer step.
#[derive(Debug, Clone)]
pub struct LinearWarmup {
    base_lr:   f64,
    warmup:    usize,
    total:     usize,
    min_ratio: f64,
    current:   usize,
}

impl LinearWarmup {
    pub fn new(base_lr: f64, warmup: usize, total: usize, min_ratio: f64) -> Self {
        Self { base_lr, warmup, total, min_ratio, current: 0 }
    }

    /// Resume the schedule at `step` optimizer steps.
    pub fn starting_at(mut self, step: usize) -> Self {
        self.current = step;
        self
    }

    pub fn factor_at(&self, k: usize) -> f64 {
        if k < self.warmup {
            return (k + 1) as f64 / self.warmup as f64;
        }
        let span = self.total.saturating_sub(self.warmup);
        if span == 0 {
            return 1.0;
        }
        let progress = (k - self.warmup) as f64 / span as f64;
        (1.0 - (1.0 - self.min_ratio) * progress).max(self.min_ratio)
    }

    /// Learning rate for the next optimizer step.
    pub fn lr(&self) -> f64 {
        self.base_lr * self.factor_at(self.current)
    }

    pub fn step(&mut self) {
        self.current += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_ramps_to_base() {
        let mut s = LinearWarmup::new(1e-3, 4, 100, 0.05);
        let lrs: Vec<f64> = (0..5).map(|_| { let lr = s.lr(); s.step(); lr }).collect();
        let expect = [0.25e-3, 0.5e-3, 0.75e-3, 1e-3, 1e-3];
        for (a, b) in lrs.iter().zip(expect) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_decays_to_floor() {
        let s = LinearWarmup::new(2.0, 10, 110, 0.05);
        // halfway through the decay: 1 - 0.95 / 2
        assert!((s.factor_at(60) - 0.525).abs() < 1e-12);
        assert!((s.factor_at(110) - 0.05).abs() < 1e-12);
        assert!((s.factor_at(10_000) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_resume() {
        let s = LinearWarmup::new(1.0, 10, 110, 0.05).starting_at(60);
        assert!((s.lr() - 0.525).abs() < 1e-12);
    }
}
