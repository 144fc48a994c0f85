use oxidize_seq_core::{Tensor, TensorError, TensorResult};

/// Score written into masked attention positions before the softmax.
pub const MASK_FILL: f64 = -1e9;

/// Boolean `rows × cols` matrix; `true` at `(i, j)` blocks query `i` from key `j`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskMatrix {
    rows: usize,
    cols: usize,
    blocked: Vec<bool>,
}

impl MaskMatrix {
    pub fn new(rows: usize, cols: usize, blocked: Vec<bool>) -> TensorResult<Self> {
        if blocked.len() != rows * cols {
            return Err(TensorError::ShapeMismatch {
                expected: vec![rows, cols],
                got: vec![blocked.len()],
            });
        }
        Ok(MaskMatrix { rows, cols, blocked })
    }

    /// Build a mask from a predicate over `(query, key)`.
    pub fn from_fn(rows: usize, cols: usize, f: impl Fn(usize, usize) -> bool) -> Self {
        let blocked = (0..rows)
            .flat_map(|i| (0..cols).map(move |j| (i, j)))
            .map(|(i, j)| f(i, j))
            .collect();
        MaskMatrix { rows, cols, blocked }
    }

    /// Strict upper triangle: `true` iff `j > i`.
    pub fn causal(n: usize) -> Self {
        Self::from_fn(n, n, |i, j| j > i)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_blocked(&self, i: usize, j: usize) -> bool {
        i < self.rows && j < self.cols && self.blocked[i * self.cols + j]
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.blocked
    }

    /// `1.0` where attention is allowed, `0.0` where blocked.
    pub(crate) fn keep_tensor(&self) -> Tensor<f64> {
        let mut t = Tensor::ones(vec![self.rows, self.cols]);
        for (v, &b) in t.data_mut().iter_mut().zip(&self.blocked) {
            if b {
                *v = 0.0;
            }
        }
        t
    }

    /// [`MASK_FILL`] where blocked, `0.0` elsewhere.
    pub(crate) fn fill_tensor(&self) -> Tensor<f64> {
        let mut t = Tensor::zeros(vec![self.rows, self.cols]);
        for (v, &b) in t.data_mut().iter_mut().zip(&self.blocked) {
            if b {
                *v = MASK_FILL;
            }
        }
        t
    }
}

/// Masking applied to attention scores.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mask {
    /// Every query sees every key.
    #[default]
    None,
    /// Causal mask for an `n × n` self-attention.
    Causal(usize),
    /// Caller-supplied mask.
    Explicit(MaskMatrix),
}

impl Mask {
    /// The concrete matrix for a `q_len × k_len` score matrix, if any.
    pub fn resolve(&self, q_len: usize, k_len: usize) -> TensorResult<Option<MaskMatrix>> {
        let matrix = match self {
            Mask::None => return Ok(None),
            Mask::Causal(n) => {
                if *n != q_len || *n != k_len {
                    return Err(TensorError::DimensionMismatch(format!(
                        "causal mask of size {n} cannot cover scores of shape [{q_len}, {k_len}]"
                    )));
                }
                MaskMatrix::causal(*n)
            }
            Mask::Explicit(m) => {
                if m.rows != q_len || m.cols != k_len {
                    return Err(TensorError::DimensionMismatch(format!(
                        "mask shape [{}, {}] does not match scores of shape [{q_len}, {k_len}]",
                        m.rows, m.cols
                    )));
                }
                m.clone()
            }
        };
        Ok(Some(matrix))
    }
}
