//! Values indexed by discrete time step.
//!
//! A [`Trace`] holds the robustness of an output once the monitor has settled it, and the samples
//! given to the [`offline`](crate::offline) evaluator. Times need not be contiguous.
//!
//! ```rust
//! use pastiche::Trace;
//!
//! let trace = Trace::from_iter([(0, 1.0), (1, -2.0), (2, 0.5)]);
//!
//! assert_eq!(trace.at_time(1), Some(&-2.0));
//! assert_eq!(trace.times().collect::<Vec<_>>(), vec![0, 1, 2]);
//! ```
use std::collections::btree_map::{self, BTreeMap};
use std::iter::Map;
use std::ops::{Index, RangeBounds};

#[derive(Debug, Clone, PartialEq)]
pub struct Trace<T> {
    steps: BTreeMap<usize, T>,
}

impl<T> Trace<T> {
    pub fn new() -> Self {
        Self { steps: BTreeMap::new() }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn at_time(&self, time: usize) -> Option<&T> {
        self.steps.get(&time)
    }

    /// Set the value at `time`, returning the value it replaces.
    pub fn insert(&mut self, time: usize, value: T) -> Option<T> {
        self.steps.insert(time, value)
    }

    /// Values at the times within `bounds` that are present in the trace, oldest first.
    pub fn window<R>(&self, bounds: R) -> impl Iterator<Item = &T> + '_
    where
        R: RangeBounds<usize>,
    {
        self.steps.range(bounds).map(|(_, value)| value)
    }

    pub fn times(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps.keys().copied()
    }

    pub fn states(&self) -> impl Iterator<Item = &T> + '_ {
        self.steps.values()
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.into_iter()
    }

    /// Transform every value, keeping its time.
    pub fn map_states<F, U>(self, f: F) -> Trace<U>
    where
        F: Fn(T) -> U,
    {
        self.steps.into_iter().map(|(time, value)| (time, f(value))).collect()
    }
}

impl<T> Default for Trace<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for Trace<T> {
    type Output = T;

    /// Panics if `time` is not present in the trace.
    fn index(&self, time: usize) -> &T {
        &self.steps[&time]
    }
}

type Entry<'a, T> = (&'a usize, &'a T);

/// Iterator over `(time, &value)` pairs in chronological order.
pub type Iter<'a, T> = Map<btree_map::Iter<'a, usize, T>, fn(Entry<'a, T>) -> (usize, &'a T)>;

impl<'a, T> IntoIterator for &'a Trace<T> {
    type Item = (usize, &'a T);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        let copy_time: fn(Entry<'a, T>) -> (usize, &'a T) = |(time, value)| (*time, value);
        self.steps.iter().map(copy_time)
    }
}

impl<T> IntoIterator for Trace<T> {
    type Item = (usize, T);
    type IntoIter = btree_map::IntoIter<usize, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

impl<T> FromIterator<(usize, T)> for Trace<T> {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (usize, T)>,
    {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Trace;

    #[test]
    fn sparse_times() {
        let trace = Trace::from_iter([(4, -1.0), (0, 2.5), (9, 0.0)]);

        assert_eq!(trace.len(), 3);
        assert_eq!(trace.times().collect::<Vec<_>>(), vec![0, 4, 9]);
        assert_eq!(trace.at_time(3), None);
        assert_eq!(trace[9], 0.0);
    }

    #[test]
    fn window_skips_absent_times() {
        let trace = Trace::from_iter([(1, 1.0), (2, 2.0), (5, 5.0), (6, 6.0)]);

        assert_eq!(trace.window(2..=5).copied().collect::<Vec<_>>(), vec![2.0, 5.0]);
        assert_eq!(trace.window(7..).count(), 0);
    }

    #[test]
    fn insert_replaces() {
        let mut trace = Trace::new();

        assert_eq!(trace.insert(3, 1.0), None);
        assert_eq!(trace.insert(3, -1.0), Some(1.0));
        assert_eq!(trace.iter().collect::<Vec<_>>(), vec![(3, &-1.0)]);
    }

    #[test]
    fn map_states_keeps_times() {
        let trace = Trace::from_iter([(2, 1.0), (3, -4.0)]);
        let negated = trace.map_states(|state: f64| -state);

        assert_eq!(negated, Trace::from_iter([(2, -1.0), (3, 4.0)]));
    }
}
