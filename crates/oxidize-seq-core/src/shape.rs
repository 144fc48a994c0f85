use crate::error::{TensorError, TensorResult};
use serde::{Deserialize, Serialize};

/// Dimensions of a tensor, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    pub fn scalar() -> Self {
        Shape { dims: vec![] }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Size along a specific axis.
    pub fn dim(&self, axis: usize) -> TensorResult<usize> {
        self.dims.get(axis).copied().ok_or(TensorError::InvalidAxis {
            axis,
            ndim: self.ndim(),
        })
    }

    /// Total number of elements. A scalar holds one.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.dims.clone()
    }

    /// `(rows, cols)` of a matrix-shaped tensor.
    pub fn matrix(&self) -> TensorResult<(usize, usize)> {
        match self.dims.as_slice() {
            [rows, cols] => Ok((*rows, *cols)),
            _ => Err(TensorError::DimensionMismatch(format!(
                "expected a 2-D tensor, got shape {}",
                self
            ))),
        }
    }

    /// Row-major (C-order) strides.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Result shape of broadcasting `a` against `b` (NumPy rules).
    pub fn broadcast_shape(a: &Shape, b: &Shape) -> TensorResult<Shape> {
        let ndim = a.ndim().max(b.ndim());
        let mut result = vec![0usize; ndim];

        for i in 0..ndim {
            let da = if i < a.ndim() { a.dims[a.ndim() - 1 - i] } else { 1 };
            let db = if i < b.ndim() { b.dims[b.ndim() - 1 - i] } else { 1 };

            result[ndim - 1 - i] = match (da, db) {
                (x, y) if x == y => x,
                (1, y) => y,
                (x, 1) => x,
                _ => {
                    return Err(TensorError::BroadcastError {
                        a: a.to_vec(),
                        b: b.to_vec(),
                    })
                }
            };
        }

        Ok(Shape::new(result))
    }

    /// Shape with the last two dims swapped.
    pub fn transposed(&self) -> TensorResult<Shape> {
        if self.ndim() < 2 {
            return Err(TensorError::InvalidOperation(
                "Cannot transpose tensor with fewer than 2 dimensions".to_string(),
            ));
        }
        let mut dims = self.dims.clone();
        let n = dims.len();
        dims.swap(n - 2, n - 1);
        Ok(Shape::new(dims))
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_basics() {
        let s = Shape::new(vec![3, 4]);
        assert_eq!(s.ndim(), 2);
        assert_eq!(s.numel(), 12);
        assert_eq!(s.dim(1).unwrap(), 4);
        assert!(s.dim(2).is_err());
        assert_eq!(s.matrix().unwrap(), (3, 4));
        assert!(Shape::new(vec![3]).matrix().is_err());
    }

    #[test]
    fn test_strides() {
        assert_eq!(Shape::new(vec![3, 4, 5]).strides(), vec![20, 5, 1]);
        assert!(Shape::scalar().strides().is_empty());
    }

    #[test]
    fn test_broadcast_row_against_matrix() {
        let a = Shape::new(vec![5, 3]);
        let b = Shape::new(vec![1, 3]);
        assert_eq!(Shape::broadcast_shape(&a, &b).unwrap().dims(), &[5, 3]);

        let col = Shape::new(vec![5, 1]);
        assert_eq!(Shape::broadcast_shape(&a, &col).unwrap().dims(), &[5, 3]);
    }

    #[test]
    fn test_broadcast_error() {
        let a = Shape::new(vec![3, 4]);
        let b = Shape::new(vec![3, 5]);
        assert!(matches!(
            Shape::broadcast_shape(&a, &b),
            Err(TensorError::BroadcastError { .. })
        ));
    }

    #[test]
    fn test_scalar() {
        let s = Shape::scalar();
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.numel(), 1);
        assert_eq!(s.to_string(), "()");
    }
}
