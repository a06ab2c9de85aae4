//! Elementwise divergence between an old and a new value

use crate::value::{format_number, RuntimeValue};
use std::cmp::Ordering;
use std::fmt;

/// Reasons the statistics cannot be computed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    /// Value has no numeric view
    #[error("{which} value is not numeric")]
    NonNumeric {
        /// `old` or `new`
        which: &'static str,
    },

    /// Shapes neither match nor broadcast
    #[error("cannot compare shape {old:?} with shape {new:?}")]
    ShapeMismatch {
        /// Shape of the old value
        old: Vec<usize>,
        /// Shape of the new value
        new: Vec<usize>,
    },

    /// Nothing to compare
    #[error("values are empty")]
    Empty,
}

/// Summary of one difference array
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffStats {
    /// Largest difference
    pub max: f64,
    /// Mean difference
    pub mean: f64,
    /// Median difference
    pub median: f64,
    /// Population standard deviation
    pub std: f64,
    /// `(new, old)` at the first position of the maximum
    pub at_max: (f64, f64),
}

/// Absolute and relative difference statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Divergence {
    /// `|new - old|`
    pub abs: DiffStats,
    /// `|new - old| / max(|new| + |old|, REL_FLOOR)`
    pub rel: DiffStats,
}

/// Denominator floor of the relative difference, so `0 vs 0` stays finite
pub const REL_FLOOR: f64 = 1e-8;

/// Compare `new` against `old` element by element
///
/// A single-element value broadcasts against the other one.
///
/// # Errors
/// `NonNumeric`, `ShapeMismatch` or `Empty`.
pub fn divergence(old: &RuntimeValue, new: &RuntimeValue) -> Result<Divergence, StatsError> {
    let (old_shape, old_data) = old.numeric().ok_or(StatsError::NonNumeric { which: "old" })?;
    let (new_shape, new_data) = new.numeric().ok_or(StatsError::NonNumeric { which: "new" })?;

    let pairs: Vec<(f64, f64)> = if old_shape == new_shape {
        new_data.iter().copied().zip(old_data.iter().copied()).collect()
    } else if let [o] = old_data {
        new_data.iter().map(|&n| (n, *o)).collect()
    } else if let [n] = new_data {
        old_data.iter().map(|&o| (*n, o)).collect()
    } else {
        return Err(StatsError::ShapeMismatch {
            old: old_shape.to_vec(),
            new: new_shape.to_vec(),
        });
    };
    if pairs.is_empty() {
        return Err(StatsError::Empty);
    }

    let abs: Vec<f64> = pairs.iter().map(|(n, o)| (n - o).abs()).collect();
    let rel: Vec<f64> = pairs
        .iter()
        .zip(&abs)
        .map(|((n, o), diff)| diff / (n.abs() + o.abs()).max(REL_FLOOR))
        .collect();
    Ok(Divergence {
        abs: summarize(&abs, &pairs),
        rel: summarize(&rel, &pairs),
    })
}

fn summarize(diff: &[f64], pairs: &[(f64, f64)]) -> DiffStats {
    #[allow(clippy::cast_precision_loss)]
    let count = diff.len() as f64;
    let mean = diff.iter().sum::<f64>() / count;
    let variance = diff.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / count;

    let mut arg_max = 0;
    for (i, d) in diff.iter().enumerate() {
        if d.total_cmp(&diff[arg_max]) == Ordering::Greater {
            arg_max = i;
        }
    }

    let mut sorted = diff.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    DiffStats {
        max: diff[arg_max],
        mean,
        median,
        std: variance.sqrt(),
        at_max: pairs[arg_max],
    }
}

fn write_section(f: &mut fmt::Formatter<'_>, kind: &str, stats: &DiffStats) -> fmt::Result {
    writeln!(f, "  Max {kind} Diff:  {}", stats.max)?;
    writeln!(f, "  Mean {kind} Diff:  {}", stats.mean)?;
    writeln!(f, "  Median {kind} Diff:  {}", stats.median)?;
    writeln!(f, "  Std {kind} Diff:  {}", stats.std)?;
    writeln!(
        f,
        "  Value at Max Diff:  ({}, {})",
        format_number(stats.at_max.0),
        format_number(stats.at_max.1)
    )
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_section(f, "Abs", &self.abs)?;
        write_section(f, "Rel", &self.rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fgraph_core::DType;

    fn vector(data: &[f64]) -> RuntimeValue {
        RuntimeValue::array(DType::Float64, vec![data.len()], data.to_vec()).unwrap()
    }

    #[test]
    fn abs_and_rel_statistics() {
        let old = vector(&[1.0, 2.0, 3.0, 4.0]);
        let new = vector(&[1.0, 2.0, 3.0, 8.0]);
        let div = divergence(&old, &new).unwrap();

        assert_eq!(div.abs.max, 4.0);
        assert_eq!(div.abs.mean, 1.0);
        assert_eq!(div.abs.median, 0.0);
        assert!((div.abs.std - 3.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(div.abs.at_max, (8.0, 4.0));
        assert!((div.rel.max - 4.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn zeros_do_not_divide_by_zero() {
        let div = divergence(&vector(&[0.0, 0.0]), &vector(&[0.0, 1.0])).unwrap();
        assert_eq!(div.rel.max, 1.0);
        assert_eq!(div.rel.median, 0.5);
        assert_eq!(div.rel.at_max, (1.0, 0.0));
    }

    #[test]
    fn first_maximum_wins() {
        let div = divergence(&vector(&[0.0, 0.0]), &vector(&[2.0, -2.0])).unwrap();
        assert_eq!(div.abs.at_max, (2.0, 0.0));
    }

    #[test]
    fn scalars_broadcast() {
        let div = divergence(&RuntimeValue::Scalar(1.0), &vector(&[1.0, 3.0])).unwrap();
        assert_eq!(div.abs.max, 2.0);
    }

    #[test]
    fn unusable_inputs_are_reported() {
        assert_eq!(
            divergence(&vector(&[1.0, 2.0]), &vector(&[1.0, 2.0, 3.0])),
            Err(StatsError::ShapeMismatch {
                old: vec![2],
                new: vec![3]
            })
        );
        assert_eq!(divergence(&vector(&[]), &vector(&[])), Err(StatsError::Empty));
        assert_eq!(
            divergence(&RuntimeValue::Opaque("<tuple>".into()), &vector(&[1.0])),
            Err(StatsError::NonNumeric { which: "old" })
        );
    }
}
