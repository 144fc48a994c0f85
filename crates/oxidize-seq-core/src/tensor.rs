use crate::dtype::Float;
use crate::error::{TensorError, TensorResult};
use crate::shape::Shape;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense N-dimensional tensor.
///
/// Stores data in a flat contiguous `Vec<T>` with row-major (C-order) layout.
/// Every operation returns a fresh tensor; nothing is shared between values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Float")]
pub struct Tensor<T: Float> {
    data: Vec<T>,
    shape: Shape,
}

// ─── Construction ───────────────────────────────────────────────────────────

impl<T: Float> Tensor<T> {
    /// Create a tensor from raw data and shape.
    pub fn new(data: Vec<T>, shape: Vec<usize>) -> TensorResult<Self> {
        let s = Shape::new(shape);
        if data.len() != s.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: s.to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Tensor { data, shape: s })
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::full(shape, T::ZERO)
    }

    pub fn ones(shape: Vec<usize>) -> Self {
        Self::full(shape, T::ONE)
    }

    /// Create a tensor filled with a constant value.
    pub fn full(shape: Vec<usize>, value: T) -> Self {
        let s = Shape::new(shape);
        Tensor {
            data: vec![value; s.numel()],
            shape: s,
        }
    }

    /// Create a scalar tensor (0-d).
    pub fn scalar(value: T) -> Self {
        Tensor {
            data: vec![value],
            shape: Shape::scalar(),
        }
    }

    /// Create a 1-D tensor from a slice.
    pub fn from_slice(data: &[T]) -> Self {
        Tensor {
            data: data.to_vec(),
            shape: Shape::new(vec![data.len()]),
        }
    }

    /// Create a 2-D tensor from a list of equally long rows.
    pub fn from_vec2d(rows: &[Vec<T>]) -> TensorResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(TensorError::ShapeMismatch {
                expected: vec![cols],
                got: vec![bad.len()],
            });
        }
        let flat: Vec<T> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::new(flat, vec![rows.len(), cols])
    }

    /// Uniform samples in `[low, high)` from a seeded generator.
    pub fn rand_uniform(shape: Vec<usize>, low: f64, high: f64, seed: u64) -> Self {
        let s = Shape::new(shape);
        let mut rng = StdRng::seed_from_u64(seed);
        let data = (0..s.numel())
            .map(|_| T::from_f64(rng.gen_range(low..high)))
            .collect();
        Tensor { data, shape: s }
    }

    /// Standard normal samples (Box-Muller) from a seeded generator.
    pub fn randn(shape: Vec<usize>, seed: u64) -> Self {
        let s = Shape::new(shape);
        let mut rng = StdRng::seed_from_u64(seed);
        let n = s.numel();
        let mut data = Vec::with_capacity(n + 1);
        while data.len() < n {
            let u1: f64 = rng.gen::<f64>().max(1e-10);
            let u2: f64 = rng.gen::<f64>();
            let r = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * std::f64::consts::PI * u2;
            data.push(T::from_f64(r * theta.cos()));
            data.push(T::from_f64(r * theta.sin()));
        }
        data.truncate(n);
        Tensor { data, shape: s }
    }

    /// One-hot rows: `result[i, ids[i]] = 1`, shape `[ids.len(), n_classes]`.
    pub fn one_hot(ids: &[usize], n_classes: usize) -> TensorResult<Self> {
        let mut data = vec![T::ZERO; ids.len() * n_classes];
        for (i, &id) in ids.iter().enumerate() {
            if id >= n_classes {
                return Err(TensorError::IndexOutOfBounds {
                    index: id,
                    axis: 1,
                    size: n_classes,
                });
            }
            data[i * n_classes + id] = T::ONE;
        }
        Tensor::new(data, vec![ids.len(), n_classes])
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_vec(&self) -> Vec<usize> {
        self.shape.to_vec()
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Number of rows of a 2-D tensor.
    pub fn rows(&self) -> TensorResult<usize> {
        Ok(self.shape.matrix()?.0)
    }

    /// Number of columns of a 2-D tensor.
    pub fn cols(&self) -> TensorResult<usize> {
        Ok(self.shape.matrix()?.1)
    }

    /// The single element of a one-element tensor.
    pub fn item(&self) -> TensorResult<T> {
        if self.data.len() != 1 {
            return Err(TensorError::InvalidOperation(format!(
                "item() requires exactly 1 element, got {}",
                self.data.len()
            )));
        }
        Ok(self.data[0])
    }

    fn offset(&self, indices: &[usize]) -> TensorResult<usize> {
        if indices.len() != self.ndim() {
            return Err(TensorError::DimensionMismatch(format!(
                "Expected {} indices, got {}",
                self.ndim(),
                indices.len()
            )));
        }
        let strides = self.shape.strides();
        let mut offset = 0;
        for (axis, (&idx, &size)) in indices.iter().zip(self.shape.dims()).enumerate() {
            if idx >= size {
                return Err(TensorError::IndexOutOfBounds {
                    index: idx,
                    axis,
                    size,
                });
            }
            offset += idx * strides[axis];
        }
        Ok(offset)
    }

    pub fn get(&self, indices: &[usize]) -> TensorResult<T> {
        Ok(self.data[self.offset(indices)?])
    }

    pub fn set(&mut self, indices: &[usize], value: T) -> TensorResult<()> {
        let offset = self.offset(indices)?;
        self.data[offset] = value;
        Ok(())
    }

    /// Row `i` of a 2-D tensor as a 1-D tensor.
    pub fn row(&self, i: usize) -> TensorResult<Tensor<T>> {
        let (rows, cols) = self.shape.matrix()?;
        if i >= rows {
            return Err(TensorError::IndexOutOfBounds {
                index: i,
                axis: 0,
                size: rows,
            });
        }
        Ok(Tensor::from_slice(&self.data[i * cols..(i + 1) * cols]))
    }

    // ─── Shape Manipulation ─────────────────────────────────────────────────

    pub fn reshape(&self, new_shape: Vec<usize>) -> TensorResult<Tensor<T>> {
        let ns = Shape::new(new_shape);
        if self.numel() != ns.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: ns.to_vec(),
                got: self.shape_vec(),
            });
        }
        Ok(Tensor {
            data: self.data.clone(),
            shape: ns,
        })
    }

    /// Matrix transpose.
    pub fn t(&self) -> TensorResult<Tensor<T>> {
        let (rows, cols) = self.shape.matrix()?;
        let mut data = vec![T::ZERO; self.numel()];
        for i in 0..rows {
            for j in 0..cols {
                data[j * rows + i] = self.data[i * cols + j];
            }
        }
        Ok(Tensor {
            data,
            shape: self.shape.transposed()?,
        })
    }

    /// Insert a dimension of size 1 at `axis`.
    pub fn unsqueeze(&self, axis: usize) -> TensorResult<Tensor<T>> {
        let mut dims = self.shape.to_vec();
        if axis > dims.len() {
            return Err(TensorError::InvalidAxis {
                axis,
                ndim: self.ndim(),
            });
        }
        dims.insert(axis, 1);
        Ok(Tensor {
            data: self.data.clone(),
            shape: Shape::new(dims),
        })
    }

    /// Rows `start..end` of a 2-D tensor.
    pub fn slice_rows(&self, start: usize, end: usize) -> TensorResult<Tensor<T>> {
        let (rows, cols) = self.shape.matrix()?;
        if start >= end || end > rows {
            return Err(TensorError::IndexOutOfBounds {
                index: end,
                axis: 0,
                size: rows,
            });
        }
        Tensor::new(
            self.data[start * cols..end * cols].to_vec(),
            vec![end - start, cols],
        )
    }

    // ─── Element-wise Unary Operations ──────────────────────────────────────

    pub fn apply<F: Fn(T) -> T>(&self, f: F) -> Tensor<T> {
        Tensor {
            data: self.data.iter().map(|&x| f(x)).collect(),
            shape: self.shape.clone(),
        }
    }

    pub fn exp(&self) -> Tensor<T> { self.apply(T::exp) }
    pub fn ln(&self) -> Tensor<T> { self.apply(T::ln) }
    pub fn sqrt(&self) -> Tensor<T> { self.apply(T::sqrt) }
    pub fn neg(&self) -> Tensor<T> { self.apply(|x| -x) }

    pub fn powf(&self, n: T) -> Tensor<T> {
        self.apply(|x| x.powf(n))
    }

    pub fn add_scalar(&self, s: T) -> Tensor<T> { self.apply(|x| x + s) }
    pub fn mul_scalar(&self, s: T) -> Tensor<T> { self.apply(|x| x * s) }
    pub fn div_scalar(&self, s: T) -> Tensor<T> { self.apply(|x| x / s) }

    /// Replace every element whose `mask` entry is `true` with `value`.
    pub fn masked_fill(&self, mask: &[bool], value: T) -> TensorResult<Tensor<T>> {
        if mask.len() != self.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape_vec(),
                got: vec![mask.len()],
            });
        }
        let data = self
            .data
            .iter()
            .zip(mask)
            .map(|(&x, &m)| if m { value } else { x })
            .collect();
        Ok(Tensor {
            data,
            shape: self.shape.clone(),
        })
    }

    // ─── Element-wise Binary Operations (with broadcasting) ─────────────────

    fn broadcast_binary_op<F: Fn(T, T) -> T>(
        &self,
        other: &Tensor<T>,
        op: F,
    ) -> TensorResult<Tensor<T>> {
        if self.shape == other.shape {
            let data = self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(&a, &b)| op(a, b))
                .collect();
            return Ok(Tensor {
                data,
                shape: self.shape.clone(),
            });
        }

        let out_shape = Shape::broadcast_shape(&self.shape, &other.shape)?;
        let ndim = out_shape.ndim();
        let out_strides = out_shape.strides();

        // Strides of each operand aligned to the output rank; broadcast axes get 0.
        let aligned = |s: &Shape| -> Vec<usize> {
            let lead = ndim - s.ndim();
            let strides = s.strides();
            (0..ndim)
                .map(|d| {
                    if d < lead || s.dims()[d - lead] == 1 {
                        0
                    } else {
                        strides[d - lead]
                    }
                })
                .collect()
        };
        let a_strides = aligned(&self.shape);
        let b_strides = aligned(&other.shape);

        let data = (0..out_shape.numel())
            .map(|flat| {
                let mut remaining = flat;
                let (mut a_off, mut b_off) = (0usize, 0usize);
                for d in 0..ndim {
                    let idx = remaining / out_strides[d];
                    remaining %= out_strides[d];
                    a_off += idx * a_strides[d];
                    b_off += idx * b_strides[d];
                }
                op(self.data[a_off], other.data[b_off])
            })
            .collect();

        Ok(Tensor {
            data,
            shape: out_shape,
        })
    }

    pub fn add(&self, other: &Tensor<T>) -> TensorResult<Tensor<T>> {
        self.broadcast_binary_op(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Tensor<T>) -> TensorResult<Tensor<T>> {
        self.broadcast_binary_op(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Tensor<T>) -> TensorResult<Tensor<T>> {
        self.broadcast_binary_op(other, |a, b| a * b)
    }

    pub fn div(&self, other: &Tensor<T>) -> TensorResult<Tensor<T>> {
        self.broadcast_binary_op(other, |a, b| a / b)
    }

    // ─── Reduction Operations ───────────────────────────────────────────────

    pub fn sum_all(&self) -> T {
        self.data.iter().copied().sum()
    }

    pub fn mean_all(&self) -> T {
        self.sum_all() / T::from_usize(self.numel())
    }

    pub fn max_all(&self) -> TensorResult<T> {
        self.data
            .iter()
            .copied()
            .reduce(T::max)
            .ok_or(TensorError::EmptyTensor)
    }

    /// Largest absolute element-wise difference between two same-shaped tensors.
    pub fn max_abs_diff(&self, other: &Tensor<T>) -> TensorResult<T> {
        if self.shape != other.shape {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape_vec(),
                got: other.shape_vec(),
            });
        }
        Ok(self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| (a - b).abs())
            .fold(T::ZERO, T::max))
    }

    /// Sum along `axis`, removing that dimension.
    pub fn sum_axis(&self, axis: usize) -> TensorResult<Tensor<T>> {
        self.reduce_axis(axis, T::ZERO, |acc, x| acc + x)
    }

    /// Mean along `axis`, removing that dimension.
    pub fn mean_axis(&self, axis: usize) -> TensorResult<Tensor<T>> {
        let axis_size = self.shape.dim(axis)?;
        Ok(self.sum_axis(axis)?.div_scalar(T::from_usize(axis_size)))
    }

    /// Max along `axis`, removing that dimension.
    pub fn max_axis(&self, axis: usize) -> TensorResult<Tensor<T>> {
        self.reduce_axis(axis, T::NEG_INFINITY, T::max)
    }

    /// Population variance along `axis`.
    pub fn var_axis(&self, axis: usize) -> TensorResult<Tensor<T>> {
        let mean = self.mean_axis(axis)?.unsqueeze(axis)?;
        let centered = self.sub(&mean)?;
        centered.mul(&centered)?.mean_axis(axis)
    }

    fn reduce_axis<F: Fn(T, T) -> T>(&self, axis: usize, init: T, f: F) -> TensorResult<Tensor<T>> {
        let dims = self.shape.dims();
        if axis >= dims.len() {
            return Err(TensorError::InvalidAxis {
                axis,
                ndim: self.ndim(),
            });
        }

        let outer: usize = dims[..axis].iter().product();
        let axis_size = dims[axis];
        let inner: usize = dims[axis + 1..].iter().product();

        let mut result = vec![init; outer * inner];
        for o in 0..outer {
            for a in 0..axis_size {
                for i in 0..inner {
                    let dst = o * inner + i;
                    result[dst] = f(result[dst], self.data[o * axis_size * inner + a * inner + i]);
                }
            }
        }

        let mut new_dims = dims.to_vec();
        new_dims.remove(axis);
        Tensor::new(result, new_dims)
    }

    /// Column index of the largest value in every row of a 2-D tensor.
    /// Ties resolve to the lowest index.
    pub fn argmax_rows(&self) -> TensorResult<Vec<usize>> {
        let (rows, cols) = self.shape.matrix()?;
        if cols == 0 {
            return Err(TensorError::EmptyTensor);
        }
        Ok((0..rows)
            .map(|r| {
                let row = &self.data[r * cols..(r + 1) * cols];
                let mut best = 0;
                for (j, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = j;
                    }
                }
                best
            })
            .collect())
    }

    // ─── Matrix Multiply ────────────────────────────────────────────────────

    /// 2-D matrix product.
    pub fn matmul(&self, other: &Tensor<T>) -> TensorResult<Tensor<T>> {
        let (m, k) = self.shape.matrix()?;
        let (k2, n) = other.shape.matrix()?;
        if k != k2 {
            return Err(TensorError::DimensionMismatch(format!(
                "matmul: inner dimensions must match, got {} and {}",
                k, k2
            )));
        }

        let mut data = vec![T::ZERO; m * n];
        for i in 0..m {
            for p in 0..k {
                let a = self.data[i * k + p];
                let b_row = &other.data[p * n..(p + 1) * n];
                let out_row = &mut data[i * n..(i + 1) * n];
                for (o, &b) in out_row.iter_mut().zip(b_row) {
                    *o += a * b;
                }
            }
        }
        Tensor::new(data, vec![m, n])
    }

    // ─── Softmax ────────────────────────────────────────────────────────────

    /// Softmax along the last axis, max-shifted for stability.
    pub fn softmax(&self) -> TensorResult<Tensor<T>> {
        if self.ndim() == 0 {
            return Ok(Tensor::scalar(T::ONE));
        }
        let axis_size = self.shape.dims()[self.ndim() - 1];
        let mut data = self.data.clone();
        if axis_size == 0 {
            return Tensor::new(data, self.shape_vec());
        }

        for chunk in data.chunks_mut(axis_size) {
            let max_val = chunk.iter().copied().fold(T::NEG_INFINITY, T::max);
            let mut sum = T::ZERO;
            for x in chunk.iter_mut() {
                *x = (*x - max_val).exp();
                sum += *x;
            }
            for x in chunk.iter_mut() {
                *x = *x / sum;
            }
        }

        Ok(Tensor {
            data,
            shape: self.shape.clone(),
        })
    }

    pub fn has_nan(&self) -> bool {
        self.data.iter().any(|v| v.is_nan())
    }
}

impl<T: Float> PartialEq for Tensor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

// ─── Display ────────────────────────────────────────────────────────────────

impl<T: Float> fmt::Display for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape.dims() {
            [] => write!(f, "tensor({})", self.data[0]),
            [_] => {
                write!(f, "tensor([")?;
                for (i, v) in self.data.iter().take(8).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:.4}", v)?;
                }
                if self.numel() > 8 {
                    write!(f, ", ...")?;
                }
                write!(f, "])")
            }
            [rows, cols] => {
                writeln!(f, "tensor([")?;
                for i in 0..(*rows).min(8) {
                    write!(f, "  [")?;
                    for j in 0..(*cols).min(8) {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{:.4}", self.data[i * cols + j])?;
                    }
                    if *cols > 8 {
                        write!(f, ", ...")?;
                    }
                    writeln!(f, "],")?;
                }
                if *rows > 8 {
                    writeln!(f, "  ...")?;
                }
                write!(f, "], shape={})", self.shape)
            }
            _ => write!(f, "tensor(shape={}, numel={})", self.shape, self.numel()),
        }
    }
}
