//! Dimension model: named numeric axes and per-run iteration ranges
//!
//! Every formula argument that varies along an axis is a [`Dimension`]: a
//! position on a named axis. The time axis `"t"` is distinguished; secondary
//! axes (scenario, cohort, ...) are an open set declared with [`Axis::named`]
//! without touching the engine. Arithmetic and comparisons delegate to the
//! underlying value once axis identity is confirmed; a plain integer operand
//! always assumes the left operand's axis.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Rem, Sub};
use std::sync::{Mutex, OnceLock};

use crate::error::ConfigError;

/// The distinguished time axis. Exactly one time parameter is permitted per
/// formula signature.
pub const TIME: Axis = Axis::named("t");

/// Names leaked by [`Axis::intern`] so that every axis can stay a plain
/// `Copy` handle over a `'static` string.
static INTERNED: OnceLock<Mutex<Vec<&'static str>>> = OnceLock::new();

/// Identity of a named numeric axis
#[derive(Debug, Clone, Copy)]
pub struct Axis {
    name: &'static str,
}

impl Axis {
    /// Declare an axis over a static name. This is the usual way to introduce
    /// a new secondary axis:
    ///
    /// ```
    /// use calc_engine::dimension::Axis;
    ///
    /// const SCENARIO: Axis = Axis::named("scenario");
    /// ```
    pub const fn named(name: &'static str) -> Self {
        Axis { name }
    }

    /// Declare an axis over a runtime-supplied name (e.g. from configuration).
    /// The name is interned for the lifetime of the process.
    pub fn intern(name: &str) -> Self {
        let mut interned = INTERNED
            .get_or_init(|| Mutex::new(Vec::new()))
            .lock()
            .expect("axis interner poisoned");
        if let Some(existing) = interned.iter().find(|n| **n == name) {
            return Axis { name: existing };
        }
        let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
        interned.push(leaked);
        Axis { name: leaked }
    }

    /// The axis name
    pub fn name(self) -> &'static str {
        self.name
    }

    /// Whether this is the distinguished time axis
    pub fn is_time(self) -> bool {
        self == TIME
    }
}

impl PartialEq for Axis {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Axis {}

impl std::hash::Hash for Axis {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A position along a named axis
///
/// Pure value semantics: cheap to copy, immutable, no shared state. Mixing
/// two dimensions from different axes in arithmetic or comparison is a
/// programming error and panics with the offending axis names.
#[derive(Debug, Clone, Copy)]
pub struct Dimension {
    axis: Axis,
    value: i64,
}

impl Dimension {
    /// Create a dimension value on the given axis
    pub fn new(axis: Axis, value: i64) -> Self {
        Dimension { axis, value }
    }

    /// Create a value on the time axis
    pub fn time(value: i64) -> Self {
        Dimension::new(TIME, value)
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    fn check_same_axis(&self, other: &Dimension, operation: &str) {
        if self.axis != other.axis {
            panic!(
                "cannot {} dimensions on different axes: `{}` and `{}`",
                operation, self.axis, other.axis
            );
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.axis, self.value)
    }
}

impl From<Dimension> for i64 {
    fn from(dim: Dimension) -> i64 {
        dim.value
    }
}

macro_rules! dimension_binop {
    ($trait:ident, $method:ident, $op:tt, $verb:literal) => {
        impl $trait<Dimension> for Dimension {
            type Output = Dimension;

            fn $method(self, rhs: Dimension) -> Dimension {
                self.check_same_axis(&rhs, $verb);
                Dimension::new(self.axis, self.value $op rhs.value)
            }
        }

        impl $trait<i64> for Dimension {
            type Output = Dimension;

            fn $method(self, rhs: i64) -> Dimension {
                Dimension::new(self.axis, self.value $op rhs)
            }
        }
    };
}

dimension_binop!(Add, add, +, "add");
dimension_binop!(Sub, sub, -, "subtract");
dimension_binop!(Mul, mul, *, "multiply");
dimension_binop!(Div, div, /, "divide");
dimension_binop!(Rem, rem, %, "take the remainder of");

impl PartialEq for Dimension {
    fn eq(&self, other: &Self) -> bool {
        self.check_same_axis(other, "compare");
        self.value == other.value
    }
}

impl PartialEq<i64> for Dimension {
    fn eq(&self, other: &i64) -> bool {
        self.value == *other
    }
}

impl PartialOrd for Dimension {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.check_same_axis(other, "compare");
        self.value.partial_cmp(&other.value)
    }
}

impl PartialOrd<i64> for Dimension {
    fn partial_cmp(&self, other: &i64) -> Option<Ordering> {
        self.value.partial_cmp(other)
    }
}

/// Iteration domain for one materialization run: the ordered time values to
/// project plus the finite candidate sets for each secondary axis in play
#[derive(Debug, Clone, Default)]
pub struct DimensionRanges {
    time_values: Vec<i64>,
    secondary: Vec<(Axis, Vec<i64>)>,
}

impl DimensionRanges {
    /// Declare the time range (ordered; usually ascending so recursive
    /// formulas evaluate against an already-warm cache)
    pub fn new(time_values: impl IntoIterator<Item = i64>) -> Self {
        DimensionRanges {
            time_values: time_values.into_iter().collect(),
            secondary: Vec::new(),
        }
    }

    /// Add the candidate values for one secondary axis. Each axis may appear
    /// at most once.
    pub fn with_secondary(
        mut self,
        axis: Axis,
        values: impl IntoIterator<Item = i64>,
    ) -> Result<Self, ConfigError> {
        if self.secondary.iter().any(|(a, _)| *a == axis) {
            return Err(ConfigError::DuplicateSecondaryRange { axis });
        }
        self.secondary.push((axis, values.into_iter().collect()));
        Ok(self)
    }

    pub fn time_values(&self) -> &[i64] {
        &self.time_values
    }

    /// Whether any secondary ranges were supplied at all. When none are,
    /// formulas declaring secondary axes degrade to their unspecialized
    /// template instead of failing materialization.
    pub fn has_secondary_ranges(&self) -> bool {
        !self.secondary.is_empty()
    }

    pub fn secondary_axes(&self) -> impl Iterator<Item = Axis> + '_ {
        self.secondary.iter().map(|(axis, _)| *axis)
    }

    pub(crate) fn secondary_values(&self, axis: Axis) -> Option<&[i64]> {
        self.secondary
            .iter()
            .find(|(a, _)| *a == axis)
            .map(|(_, values)| values.as_slice())
    }

    /// Cartesian product of the value ranges for the given axes, in the order
    /// the axes are listed. Returns the first axis with no supplied range on
    /// failure.
    pub(crate) fn combinations(&self, axes: &[Axis]) -> Result<Vec<Vec<Dimension>>, Axis> {
        let mut combos: Vec<Vec<Dimension>> = vec![Vec::new()];
        for &axis in axes {
            let values = self.secondary_values(axis).ok_or(axis)?;
            let mut expanded = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for &value in values {
                    let mut next = combo.clone();
                    next.push(Dimension::new(axis, value));
                    expanded.push(next);
                }
            }
            combos = expanded;
        }
        Ok(combos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: Axis = Axis::named("scenario");
    const COHORT: Axis = Axis::named("cohort");

    #[test]
    fn test_arithmetic_with_scalars() {
        let t = Dimension::time(12);

        assert_eq!((t + 1).value(), 13);
        assert_eq!((t - 1).value(), 11);
        assert_eq!((t * 2).value(), 24);
        assert_eq!((t / 3).value(), 4);
        assert_eq!((t % 12).value(), 0);
        assert!((t - 1).axis().is_time());
    }

    #[test]
    fn test_arithmetic_with_same_axis() {
        let a = Dimension::new(SCENARIO, 5);
        let b = Dimension::new(SCENARIO, 3);

        assert_eq!((a + b).value(), 8);
        assert_eq!((a - b).value(), 2);
        assert_eq!((a * b).value(), 15);
    }

    #[test]
    fn test_comparisons() {
        let t = Dimension::time(10);

        assert!(t == 10);
        assert!(t > 9);
        assert!(t < 11);
        assert!(t >= 10);
        assert!(t % 2 == 0);
        assert!(Dimension::time(10) == Dimension::time(10));
        assert!(Dimension::time(9) < Dimension::time(10));
    }

    #[test]
    #[should_panic(expected = "different axes")]
    fn test_cross_axis_arithmetic_panics() {
        let _ = Dimension::time(1) + Dimension::new(SCENARIO, 1);
    }

    #[test]
    #[should_panic(expected = "different axes")]
    fn test_cross_axis_comparison_panics() {
        let _ = Dimension::new(SCENARIO, 1) == Dimension::new(COHORT, 1);
    }

    #[test]
    fn test_interned_axis_matches_named() {
        let interned = Axis::intern("scenario");
        assert_eq!(interned, SCENARIO);
        // Interning twice yields the same handle
        assert_eq!(Axis::intern("scenario"), interned);
    }

    #[test]
    fn test_duplicate_secondary_range_rejected() {
        let result = DimensionRanges::new(0..12)
            .with_secondary(SCENARIO, [1, 2])
            .unwrap()
            .with_secondary(SCENARIO, [3]);

        assert!(matches!(
            result,
            Err(ConfigError::DuplicateSecondaryRange { .. })
        ));
    }

    #[test]
    fn test_combinations_follow_declaration_order() {
        let ranges = DimensionRanges::new(0..12)
            .with_secondary(SCENARIO, [1, 2])
            .unwrap()
            .with_secondary(COHORT, [10, 20])
            .unwrap();

        let combos = ranges.combinations(&[SCENARIO, COHORT]).unwrap();
        let flat: Vec<Vec<i64>> = combos
            .iter()
            .map(|combo| combo.iter().map(|d| d.value()).collect())
            .collect();

        assert_eq!(flat, vec![
            vec![1, 10],
            vec![1, 20],
            vec![2, 10],
            vec![2, 20],
        ]);

        // First coordinate of every combination is the first-listed axis
        assert!(combos.iter().all(|combo| combo[0].axis() == SCENARIO));
    }

    #[test]
    fn test_combinations_missing_axis() {
        let ranges = DimensionRanges::new(0..12)
            .with_secondary(SCENARIO, [1, 2])
            .unwrap();

        assert_eq!(ranges.combinations(&[COHORT]), Err(COHORT));
    }

    #[test]
    fn test_combinations_with_no_axes() {
        let ranges = DimensionRanges::new(0..12);
        assert_eq!(ranges.combinations(&[]).unwrap(), vec![Vec::<Dimension>::new()]);
    }
}
