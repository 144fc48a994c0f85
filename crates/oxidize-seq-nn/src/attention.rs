use oxidize_seq_autodiff::{Parameter, Variable};
use oxidize_seq_core::{TensorError, TensorResult};

use crate::init::Initializer;
use crate::layers::Linear;
use crate::mask::Mask;
use crate::module::Module;

/// Single-head scaled dot-product attention.
///
/// ```text
/// Q = q_in·Wq   K = k_in·Wk   V = v_in·Wv
/// out = softmax(mask(Q·Kᵗ / √d_model))·V
/// ```
///
/// Projections carry no bias. Masked scores are set to [`MASK_FILL`]
/// before the softmax, so their weights come out as exactly zero.
///
/// [`MASK_FILL`]: crate::mask::MASK_FILL
#[derive(Debug, Clone)]
pub struct AttentionBlock {
    w_q: Linear,
    w_k: Linear,
    w_v: Linear,
    d_model: usize,
}

impl AttentionBlock {
    pub fn new(init: &mut Initializer, name: &str, d_model: usize) -> Self {
        AttentionBlock {
            w_q: Linear::new(init, &format!("{name}.w_q"), d_model, d_model, false),
            w_k: Linear::new(init, &format!("{name}.w_k"), d_model, d_model, false),
            w_v: Linear::new(init, &format!("{name}.w_v"), d_model, d_model, false),
            d_model,
        }
    }

    pub fn d_model(&self) -> usize {
        self.d_model
    }

    /// Attention output, `seq_len_q × d_model`.
    pub fn attend<'g>(
        &self,
        q_in: &Variable<'g>,
        k_in: &Variable<'g>,
        v_in: &Variable<'g>,
        mask: &Mask,
    ) -> TensorResult<Variable<'g>> {
        self.attend_with_weights(q_in, k_in, v_in, mask)
            .map(|(out, _)| out)
    }

    /// Attention output together with the `seq_len_q × seq_len_k` weight matrix.
    pub fn attend_with_weights<'g>(
        &self,
        q_in: &Variable<'g>,
        k_in: &Variable<'g>,
        v_in: &Variable<'g>,
        mask: &Mask,
    ) -> TensorResult<(Variable<'g>, Variable<'g>)> {
        let q_len = self.check_width("query", q_in)?;
        let k_len = self.check_width("key", k_in)?;
        let v_len = self.check_width("value", v_in)?;
        if k_len != v_len {
            return Err(TensorError::DimensionMismatch(format!(
                "key has {k_len} rows but value has {v_len}"
            )));
        }
        let resolved = mask.resolve(q_len, k_len)?;

        let q = self.w_q.forward(q_in)?;
        let k = self.w_k.forward(k_in)?;
        let v = self.w_v.forward(v_in)?;

        let mut scores = q
            .matmul(&k.t()?)?
            .mul_scalar(1.0 / (self.d_model as f64).sqrt());
        if let Some(m) = resolved {
            let g = scores.graph();
            scores = scores
                .mul(&g.input(m.keep_tensor()))?
                .add(&g.input(m.fill_tensor()))?;
        }

        let weights = scores.softmax_rows()?;
        let out = weights.matmul(&v)?;
        Ok((out, weights))
    }

    fn check_width(&self, role: &str, x: &Variable<'_>) -> TensorResult<usize> {
        let shape = x.shape_vec();
        match shape.as_slice() {
            &[rows, cols] if cols == self.d_model => Ok(rows),
            _ => Err(TensorError::DimensionMismatch(format!(
                "attention {role} expects [seq_len, {}], got {:?}",
                self.d_model, shape
            ))),
        }
    }
}

impl Module for AttentionBlock {
    fn parameters(&self) -> Vec<&Parameter> {
        [&self.w_q, &self.w_k, &self.w_v]
            .into_iter()
            .flat_map(|l| l.parameters())
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = self.w_q.parameters_mut();
        params.extend(self.w_k.parameters_mut());
        params.extend(self.w_v.parameters_mut());
        params
    }
}
