//! Runtime values handed over by the consistency checker

use fgraph_core::DType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors building a runtime value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// Element count does not match the shape
    #[error("shape {shape:?} holds {expected} elements, got {found}")]
    ElementCount {
        /// Requested shape
        shape: Vec<usize>,
        /// Product of the shape
        expected: usize,
        /// Number of elements supplied
        found: usize,
    },
}

/// A value computed for a variable at run time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuntimeValue {
    /// Dense array, stored row-major
    Array {
        /// Element type
        dtype: DType,
        /// Length of every dimension
        shape: Vec<usize>,
        /// Byte stride of every dimension
        strides: Vec<isize>,
        /// Elements, widened to f64
        data: Vec<f64>,
    },
    /// Plain number
    Scalar(f64),
    /// Anything without a numeric view, kept as its printed form
    Opaque(String),
}

impl RuntimeValue {
    /// Contiguous row-major array of `dtype`
    ///
    /// # Errors
    /// `ElementCount` if `data` does not fill `shape` exactly.
    pub fn array(dtype: DType, shape: Vec<usize>, data: Vec<f64>) -> Result<Self, ValueError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ValueError::ElementCount {
                shape,
                expected,
                found: data.len(),
            });
        }
        let strides = contiguous_strides(&shape, item_size(dtype));
        Ok(Self::Array {
            dtype,
            shape,
            strides,
            data,
        })
    }

    /// Short name of the value's kind
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Array { .. } => "ndarray",
            Self::Scalar(_) => "float",
            Self::Opaque(_) => "opaque",
        }
    }

    /// `(shape, dtype, strides)` for arrays
    #[must_use]
    pub fn layout(&self) -> Option<(&[usize], DType, &[isize])> {
        match self {
            Self::Array {
                dtype,
                shape,
                strides,
                ..
            } => Some((shape.as_slice(), *dtype, strides.as_slice())),
            _ => None,
        }
    }

    /// Shape and elements of the numeric view
    pub(crate) fn numeric(&self) -> Option<(&[usize], &[f64])> {
        match self {
            Self::Array { shape, data, .. } => Some((shape.as_slice(), data.as_slice())),
            Self::Scalar(value) => Some((SCALAR_SHAPE, std::slice::from_ref(value))),
            Self::Opaque(_) => None,
        }
    }
}

const SCALAR_SHAPE: &[usize] = &[];

fn item_size(dtype: DType) -> isize {
    match dtype {
        DType::Bool => 1,
        DType::Int32 | DType::Float32 => 4,
        DType::Int64 | DType::Float64 => 8,
    }
}

fn contiguous_strides(shape: &[usize], item: isize) -> Vec<isize> {
    let mut strides = vec![item; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        let len = isize::try_from(shape[axis + 1]).unwrap_or(isize::MAX);
        strides[axis] = strides[axis + 1].saturating_mul(len);
    }
    strides
}

/// Numbers print the way numpy prints them: integral floats keep a
/// trailing dot
pub(crate) fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.0}.")
    } else {
        format!("{value}")
    }
}

fn write_nested(f: &mut fmt::Formatter<'_>, shape: &[usize], data: &[f64]) -> fmt::Result {
    let Some((&len, rest)) = shape.split_first() else {
        return f.write_str(&data.first().map_or_else(String::new, |v| format_number(*v)));
    };
    let chunk = rest.iter().product::<usize>();
    f.write_str("[")?;
    for i in 0..len {
        if i > 0 {
            f.write_str(if rest.is_empty() { " " } else { "\n " })?;
        }
        write_nested(f, rest, data.get(i * chunk..(i + 1) * chunk).unwrap_or(&[]))?;
    }
    f.write_str("]")
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array { shape, data, .. } => write_nested(f, shape, data),
            Self::Scalar(value) => f.write_str(&format_number(*value)),
            Self::Opaque(text) => f.write_str(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_are_row_major_bytes() {
        let value = RuntimeValue::array(DType::Float32, vec![2, 3], vec![0.0; 6]).unwrap();
        let (shape, dtype, strides) = value.layout().unwrap();
        assert_eq!(shape, &[2, 3]);
        assert_eq!(dtype, DType::Float32);
        assert_eq!(strides, &[12, 4]);
    }

    #[test]
    fn element_count_is_checked() {
        let err = RuntimeValue::array(DType::Float64, vec![2, 2], vec![1.0]).unwrap_err();
        assert_eq!(
            err,
            ValueError::ElementCount {
                shape: vec![2, 2],
                expected: 4,
                found: 1
            }
        );
    }

    #[test]
    fn display_nests_rows() {
        let value = RuntimeValue::array(DType::Float64, vec![2, 2], vec![1.0, 2.5, 3.0, 4.0]).unwrap();
        assert_eq!(value.to_string(), "[[1. 2.5]\n [3. 4.]]");
        assert_eq!(RuntimeValue::Scalar(-2.0).to_string(), "-2.");
    }
}
