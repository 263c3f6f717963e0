use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};

/// Flag raised by Ctrl-C. The training loop polls it between steps,
/// writes a checkpoint and returns.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// Install the process-wide Ctrl-C handler. Can only be called once.
    pub fn install() -> Result<Self> {
        let interrupt = Self::default();
        let flag = interrupt.flag.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nInterrupted, finishing current step...");
            flag.store(true, Ordering::SeqCst);
        })
        .context("Failed to set Ctrl-C handler")?;
        Ok(interrupt)
    }

    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_flag() {
        let a = Interrupt::default();
        let b = a.clone();
        assert!(!b.is_raised());
        a.raise();
        assert!(b.is_raised());
    }
}
