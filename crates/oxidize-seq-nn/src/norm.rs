use oxidize_seq_autodiff::{Parameter, Variable};
use oxidize_seq_core::{TensorError, TensorResult};

use crate::init::Initializer;
use crate::module::Module;

/// Per-row layer normalization: y = (x - μ) / √(σ² + ε) * γ + β
///
/// μ and σ² are the mean and population variance of each row.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    gamma: Parameter,
    beta: Parameter,
    d_model: usize,
    eps: f64,
}

impl LayerNorm {
    pub fn new(init: &mut Initializer, name: &str, d_model: usize, eps: f64) -> Self {
        LayerNorm {
            gamma: init.ones(format!("{name}.gamma"), vec![1, d_model]),
            beta: init.zeros(format!("{name}.beta"), vec![1, d_model]),
            d_model,
            eps,
        }
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    pub fn forward<'g>(&self, x: &Variable<'g>) -> TensorResult<Variable<'g>> {
        let shape = x.shape_vec();
        if shape.len() != 2 || shape[1] != self.d_model {
            return Err(TensorError::DimensionMismatch(format!(
                "layer norm expects [n, {}], got {:?}",
                self.d_model, shape
            )));
        }
        let g = x.graph();
        let centered = x.sub(&x.mean_rows()?)?;
        let var = centered.mul(&centered)?.mean_rows()?;
        let normalized = centered.div(&var.add_scalar(self.eps).pow(0.5))?;
        normalized.mul(&g.bind(&self.gamma))?.add(&g.bind(&self.beta))
    }
}

impl Module for LayerNorm {
    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.gamma, &self.beta]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.gamma, &mut self.beta]
    }
}

/// Residual connection followed by [`LayerNorm`]: `norm(sublayer + residual)`.
#[derive(Debug, Clone)]
pub struct ResidualNorm {
    norm: LayerNorm,
}

impl ResidualNorm {
    pub fn new(init: &mut Initializer, name: &str, d_model: usize, eps: f64) -> Self {
        ResidualNorm {
            norm: LayerNorm::new(init, name, d_model, eps),
        }
    }

    pub fn apply<'g>(
        &self,
        sublayer_output: &Variable<'g>,
        residual: &Variable<'g>,
    ) -> TensorResult<Variable<'g>> {
        if sublayer_output.shape_vec() != residual.shape_vec() {
            return Err(TensorError::DimensionMismatch(format!(
                "residual shape {:?} does not match sublayer output {:?}",
                residual.shape_vec(),
                sublayer_output.shape_vec()
            )));
        }
        self.norm.forward(&sublayer_output.add(residual)?)
    }
}

impl Module for ResidualNorm {
    fn parameters(&self) -> Vec<&Parameter> {
        self.norm.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.norm.parameters_mut()
    }
}
