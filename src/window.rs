use std::collections::VecDeque;
use std::ops::RangeInclusive;

/// Values reserved up front. Longer histories grow as values arrive.
const PREALLOCATED: usize = 1024;

/// Fixed-capacity history of the most recent values of a node, newest first.
///
/// A stored `None` marks a value that describes a time outside of the trace.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct History {
    values: VecDeque<Option<f64>>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity.min(PREALLOCATED)),
            capacity,
        }
    }

    pub fn push(&mut self, value: Option<f64>) {
        if self.values.len() == self.capacity {
            self.values.pop_back();
        }

        self.values.push_front(value);
    }

    /// The value pushed `lag` steps ago, or `None` if it was never pushed or is undefined.
    pub fn get(&self, lag: usize) -> Option<f64> {
        self.values.get(lag).copied().flatten()
    }

    /// Every defined value pushed within the given range of lags.
    pub fn window(&self, lags: RangeInclusive<usize>) -> impl Iterator<Item = f64> + '_ {
        let (first, last) = lags.into_inner();

        self.values
            .iter()
            .skip(first)
            .take(last.saturating_add(1).saturating_sub(first))
            .filter_map(|value| *value)
    }
}
