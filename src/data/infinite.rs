// ============================================================
// Layer 4 — Infinite Loader
// ============================================================
// The training loop is measured in optimisation steps, not epochs.
// InfiniteLoader turns any re-iterable batch source into a stream
// that restarts the source whenever a pass ends, and stops once a
// step budget is spent.
//
//   pass 1: b1 b2 b3 | pass 2: b1' b2' b3' | pass 3: b1'' ...
//                      ^ shuffled again by the source
//
// Reference: Rust Book §13 (Iterators)

use std::sync::Arc;

use burn::data::dataloader::DataLoader;

/// Something that can be iterated from the start any number of times.
pub trait Epochs {
    type Item;

    fn epoch(&self) -> Box<dyn Iterator<Item = Self::Item> + '_>;
}

/// Burn's DataLoader restarts (and reshuffles) on every `iter()` call.
impl<O> Epochs for Arc<dyn DataLoader<O>> {
    type Item = O;

    fn epoch(&self) -> Box<dyn Iterator<Item = O> + '_> {
        Box::new(self.iter())
    }
}

impl<T: Clone> Epochs for Vec<T> {
    type Item = T;

    fn epoch(&self) -> Box<dyn Iterator<Item = T> + '_> {
        Box::new(self.iter().cloned())
    }
}

/// Yields batches from `source` forever, or until `budget` batches were produced.
pub struct InfiniteLoader<'a, S: Epochs> {
    source:  &'a S,
    current: Box<dyn Iterator<Item = S::Item> + 'a>,
    budget:  Option<usize>,
    yielded: usize,
}

impl<'a, S: Epochs> InfiniteLoader<'a, S> {
    pub fn new(source: &'a S, budget: Option<usize>) -> Self {
        Self { source, current: source.epoch(), budget, yielded: 0 }
    }

    pub fn yielded(&self) -> usize {
        self.yielded
    }
}

impl<'a, S: Epochs> Iterator for InfiniteLoader<'a, S> {
    type Item = S::Item;

    fn next(&mut self) -> Option<S::Item> {
        if self.budget.is_some_and(|budget| self.yielded >= budget) {
            return None;
        }
        let item = match self.current.next() {
            Some(item) => item,
            None => {
                // one restart per call: a source that is empty right after
                // a restart has nothing to give
                self.current = self.source.epoch();
                self.current.next()?
            }
        };
        self.yielded += 1;
        Some(item)
    }
}

/// Drops the short trailing batch of every pass, like `drop_last=True`.
pub struct FullBatches<S: Epochs> {
    pub inner:      S,
    pub batch_size: usize,
    pub size_of:    fn(&<S as Epochs>::Item) -> usize,
}

impl<S: Epochs> Epochs for FullBatches<S> {
    type Item = S::Item;

    fn epoch(&self) -> Box<dyn Iterator<Item = S::Item> + '_> {
        let batch_size = self.batch_size;
        let size_of    = self.size_of;
        Box::new(self.inner.epoch().filter(move |b| size_of(b) == batch_size))
    }
}
