//! Lattice operations over robustness values.
//!
//! Conjunction and `always`/`historically` windows combine their operands with [`Meet::min`],
//! while disjunction and `eventually`/`once` windows use [`Join::max`]. When a window contains no
//! samples at all (for example `once[2:3]` evaluated at step 0) the operator reports the identity
//! element of its combining operation: [`Top`] for `min`, [`Bottom`] for `max`.
//!
//! A NaN robustness is never discarded: combining it with any other value yields NaN.

/// Type with a global maximum, the identity element of [`Meet::min`].
///
/// ```rust
/// use pastiche::metrics::Top;
/// assert_eq!(f64::top(), f64::INFINITY);
/// ```
pub trait Top {
    fn top() -> Self;
}

/// Type with a global minimum, the identity element of [`Join::max`].
///
/// ```rust
/// use pastiche::metrics::Bottom;
/// assert_eq!(f64::bottom(), f64::NEG_INFINITY);
/// ```
pub trait Bottom {
    fn bottom() -> Self;
}

/// Type that can compute the [infimum] of two values.
///
/// [infimum]: https://en.wikipedia.org/wiki/Infimum_and_supremum
pub trait Meet: PartialOrd {
    fn min(&self, other: &Self) -> Self;
}

/// Type that can compute the [supremum] of two values.
///
/// [supremum]: https://en.wikipedia.org/wiki/Infimum_and_supremum
pub trait Join: PartialOrd {
    fn max(&self, other: &Self) -> Self;
}

impl Top for f64 {
    fn top() -> Self {
        f64::INFINITY
    }
}

impl Bottom for f64 {
    fn bottom() -> Self {
        f64::NEG_INFINITY
    }
}

/// An undefined operand (such as the result of `0 / 0`) makes the result undefined.
impl Meet for f64 {
    fn min(&self, other: &Self) -> Self {
        if self.is_nan() || other.is_nan() {
            f64::NAN
        } else {
            f64::min(*self, *other)
        }
    }
}

/// An undefined operand (such as the result of `0 / 0`) makes the result undefined.
impl Join for f64 {
    fn max(&self, other: &Self) -> Self {
        if self.is_nan() || other.is_nan() {
            f64::NAN
        } else {
            f64::max(*self, *other)
        }
    }
}

/// Combine a sequence of values with [`Meet::min`], starting from [`Top`].
pub fn infimum<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    values.into_iter().fold(f64::top(), |acc, value| Meet::min(&acc, &value))
}

/// Combine a sequence of values with [`Join::max`], starting from [`Bottom`].
pub fn supremum<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    values.into_iter().fold(f64::bottom(), |acc, value| Join::max(&acc, &value))
}
