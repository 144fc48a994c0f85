use oxidize_seq_autodiff::{Graph, Parameter, Variable};
use oxidize_seq_core::{Tensor, TensorError, TensorResult};

use crate::init::Initializer;
use crate::module::Module;

/// Fully connected layer: `y = xW (+ b)`.
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Parameter,
    bias: Option<Parameter>,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Xavier-uniform weight, zero bias when `with_bias` is set.
    pub fn new(
        init: &mut Initializer,
        name: &str,
        in_features: usize,
        out_features: usize,
        with_bias: bool,
    ) -> Self {
        let weight = init.xavier(format!("{name}.weight"), in_features, out_features);
        let bias = with_bias.then(|| init.zeros(format!("{name}.bias"), vec![1, out_features]));
        Linear {
            weight,
            bias,
            in_features,
            out_features,
        }
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Parameter> {
        self.bias.as_ref()
    }

    pub fn forward<'g>(&self, x: &Variable<'g>) -> TensorResult<Variable<'g>> {
        let shape = x.shape_vec();
        if shape.len() != 2 || shape[1] != self.in_features {
            return Err(TensorError::DimensionMismatch(format!(
                "{} expects [n, {}], got {:?}",
                self.weight.name(),
                self.in_features,
                shape
            )));
        }
        let g = x.graph();
        let xw = x.matmul(&g.bind(&self.weight))?;
        match &self.bias {
            Some(b) => xw.add(&g.bind(b)),
            None => Ok(xw),
        }
    }
}

impl Module for Linear {
    fn parameters(&self) -> Vec<&Parameter> {
        std::iter::once(&self.weight).chain(self.bias.as_ref()).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        std::iter::once(&mut self.weight)
            .chain(self.bias.as_mut())
            .collect()
    }
}

/// Token embedding table, `vocab_size × d_model`.
///
/// Lookup is a one-hot product so the table receives gradients through the
/// ordinary matmul rule.
#[derive(Debug, Clone)]
pub struct Embedding {
    table: Parameter,
    vocab_size: usize,
    d_model: usize,
}

impl Embedding {
    pub fn new(init: &mut Initializer, name: &str, vocab_size: usize, d_model: usize) -> Self {
        Embedding {
            table: init.normal(format!("{name}.table"), vec![vocab_size, d_model]),
            vocab_size,
            d_model,
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn d_model(&self) -> usize {
        self.d_model
    }

    pub fn table(&self) -> &Parameter {
        &self.table
    }

    /// Rows of the table for `ids`, as a `seq_len × d_model` variable.
    pub fn lookup<'g>(&self, g: &'g Graph, ids: &[usize]) -> TensorResult<Variable<'g>> {
        if ids.is_empty() {
            return Err(TensorError::EmptySequence);
        }
        if let Some(&token) = ids.iter().find(|&&id| id >= self.vocab_size) {
            return Err(TensorError::TokenOutOfRange {
                token,
                vocab_size: self.vocab_size,
            });
        }
        let one_hot = g.input(Tensor::one_hot(ids, self.vocab_size)?);
        one_hot.matmul(&g.bind(&self.table))
    }
}

impl Module for Embedding {
    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.table]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.table]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxidize_seq_autodiff::backward;

    #[test]
    fn test_linear_shapes() {
        let mut init = Initializer::new(0);
        let lin = Linear::new(&mut init, "ff", 4, 3, true);
        let g = Graph::new();
        let y = lin.forward(&g.input(Tensor::ones(vec![5, 4]))).unwrap();
        assert_eq!(y.shape_vec(), vec![5, 3]);
        assert_eq!(lin.num_parameters(), 4 * 3 + 3);
    }

    #[test]
    fn test_linear_without_bias() {
        let mut init = Initializer::new(0);
        let lin = Linear::new(&mut init, "w_q", 2, 2, false);
        assert!(lin.bias().is_none());
        assert_eq!(lin.parameters().len(), 1);
        assert_eq!(lin.weight().name(), "w_q.weight");
    }

    #[test]
    fn test_linear_width_mismatch() {
        let mut init = Initializer::new(0);
        let lin = Linear::new(&mut init, "ff", 4, 3, true);
        let g = Graph::new();
        let err = lin.forward(&g.input(Tensor::ones(vec![2, 3]))).unwrap_err();
        assert!(matches!(err, TensorError::DimensionMismatch(_)));
    }

    #[test]
    fn test_embedding_lookup_picks_rows() {
        let mut init = Initializer::new(3);
        let emb = Embedding::new(&mut init, "embedding", 5, 2);
        let g = Graph::new();
        let out = emb.lookup(&g, &[4, 0, 4]).unwrap();
        let table = emb.table().value();
        assert_eq!(out.data().row(0).unwrap(), table.row(4).unwrap());
        assert_eq!(out.data().row(1).unwrap(), table.row(0).unwrap());
        assert_eq!(out.data().row(2).unwrap(), table.row(4).unwrap());
    }

    #[test]
    fn test_embedding_gradient_hits_used_rows() {
        let mut init = Initializer::new(3);
        let emb = Embedding::new(&mut init, "embedding", 4, 2);
        let g = Graph::new();
        let loss = emb.lookup(&g, &[1, 1, 3]).unwrap().sum();
        let grads = backward(&loss).unwrap();
        let grad = grads.wrt(emb.table()).unwrap();
        assert_eq!(grad.data(), &[0.0, 0.0, 2.0, 2.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_embedding_errors() {
        let mut init = Initializer::new(3);
        let emb = Embedding::new(&mut init, "embedding", 4, 2);
        let g = Graph::new();
        assert_eq!(
            emb.lookup(&g, &[0, 4]).unwrap_err(),
            TensorError::TokenOutOfRange {
                token: 4,
                vocab_size: 4
            }
        );
        assert_eq!(emb.lookup(&g, &[]).unwrap_err(), TensorError::EmptySequence);
    }
}
