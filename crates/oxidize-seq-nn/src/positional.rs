use oxidize_seq_autodiff::Variable;
use oxidize_seq_core::{Tensor, TensorError, TensorResult};

/// Fixed sinusoidal position table, added to token embeddings.
///
/// Row `pos`, column `2i` holds `sin(pos / 10000^(2i/d_model))` and column
/// `2i+1` holds the matching cosine. The table is built once and never
/// changes; it is rebuilt from `d_model` and `max_len` rather than stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionalEncoder {
    d_model: usize,
    max_len: usize,
    table: Tensor<f64>,
}

impl PositionalEncoder {
    pub fn new(d_model: usize, max_len: usize) -> Self {
        let mut table = Tensor::zeros(vec![max_len, d_model]);
        for (idx, value) in table.data_mut().iter_mut().enumerate() {
            let (pos, col) = (idx / d_model, idx % d_model);
            let pair = (col / 2 * 2) as f64;
            let angle = pos as f64 / 10000f64.powf(pair / d_model as f64);
            *value = if col % 2 == 0 { angle.sin() } else { angle.cos() };
        }
        PositionalEncoder {
            d_model,
            max_len,
            table,
        }
    }

    pub fn d_model(&self) -> usize {
        self.d_model
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// The full `max_len × d_model` table.
    pub fn table(&self) -> &Tensor<f64> {
        &self.table
    }

    /// The first `seq_len` rows of the table.
    pub fn slice(&self, seq_len: usize) -> TensorResult<Tensor<f64>> {
        if seq_len > self.max_len {
            return Err(TensorError::SequenceTooLong {
                len: seq_len,
                max_len: self.max_len,
            });
        }
        if seq_len == 0 {
            return Err(TensorError::EmptySequence);
        }
        self.table.slice_rows(0, seq_len)
    }

    fn check_input(&self, shape: &[usize]) -> TensorResult<usize> {
        match shape {
            [rows, cols] if *cols == self.d_model => Ok(*rows),
            _ => Err(TensorError::DimensionMismatch(format!(
                "positional encoding expects [seq_len, {}], got {:?}",
                self.d_model, shape
            ))),
        }
    }

    /// `x + pe[0..seq_len]` on a plain tensor.
    pub fn encode_tensor(&self, x: &Tensor<f64>) -> TensorResult<Tensor<f64>> {
        let seq_len = self.check_input(x.shape().dims())?;
        x.add(&self.slice(seq_len)?)
    }

    /// `x + pe[0..seq_len]` recorded on `x`'s graph.
    pub fn encode<'g>(&self, x: &Variable<'g>) -> TensorResult<Variable<'g>> {
        let seq_len = self.check_input(&x.shape_vec())?;
        let pe = x.graph().input(self.slice(seq_len)?);
        x.add(&pe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use oxidize_seq_autodiff::Graph;

    #[test]
    fn test_row_zero_alternates() {
        let pe = PositionalEncoder::new(6, 10);
        let row0 = pe.table().row(0).unwrap();
        assert_eq!(row0.data(), &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_deterministic() {
        let a = PositionalEncoder::new(8, 12);
        let b = PositionalEncoder::new(8, 12);
        let bits = |t: &Tensor<f64>| t.data().iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(a.table()), bits(b.table()));
    }

    #[test]
    fn test_closed_form_values() {
        let pe = PositionalEncoder::new(4, 5);
        let t = pe.table();
        // pos 3, column pair 2 -> 3 / 10000^(2/4) = 0.03
        assert_abs_diff_eq!(t.get(&[3, 2]).unwrap(), 0.03f64.sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(t.get(&[3, 3]).unwrap(), 0.03f64.cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(t.get(&[1, 0]).unwrap(), 1.0f64.sin(), epsilon = 1e-12);
    }

    #[test]
    fn test_odd_width() {
        let pe = PositionalEncoder::new(3, 2);
        assert_eq!(pe.table().shape_vec(), vec![2, 3]);
        assert_eq!(pe.table().row(0).unwrap().data(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_encode_adds_table() {
        let pe = PositionalEncoder::new(2, 4);
        let x = Tensor::ones(vec![3, 2]);
        let out = pe.encode_tensor(&x).unwrap();
        assert_eq!(out.shape_vec(), vec![3, 2]);
        assert_eq!(out.row(0).unwrap().data(), &[1.0, 2.0]);

        let g = Graph::new();
        let v = pe.encode(&g.input(x)).unwrap();
        assert_eq!(v.data(), &out);
    }

    #[test]
    fn test_too_long_is_index_error() {
        let pe = PositionalEncoder::new(2, 4);
        let err = pe.encode_tensor(&Tensor::zeros(vec![5, 2])).unwrap_err();
        assert_eq!(err, TensorError::SequenceTooLong { len: 5, max_len: 4 });
        assert_eq!(err.kind(), oxidize_seq_core::ErrorKind::Index);
    }

    #[test]
    fn test_width_mismatch() {
        let pe = PositionalEncoder::new(2, 4);
        let err = pe.encode_tensor(&Tensor::zeros(vec![3, 3])).unwrap_err();
        assert!(matches!(err, TensorError::DimensionMismatch(_)));
    }
}
