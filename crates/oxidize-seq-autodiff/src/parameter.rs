use oxidize_seq_core::{Tensor, TensorError, TensorResult};
use serde::{Deserialize, Serialize};

/// A named, trainable weight tensor.
///
/// Layers own their parameters directly. The name is a dotted path such as
/// `decoder.self_attention.w_q`; it keys gradients, optimizer state and
/// checkpoint entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    name: String,
    value: Tensor<f64>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: Tensor<f64>) -> Self {
        Parameter {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Tensor<f64> {
        &self.value
    }

    pub fn shape_vec(&self) -> Vec<usize> {
        self.value.shape_vec()
    }

    pub fn numel(&self) -> usize {
        self.value.numel()
    }

    /// Replace the value. The new tensor must have the same shape.
    pub fn set_value(&mut self, value: Tensor<f64>) -> TensorResult<()> {
        if value.shape() != self.value.shape() {
            return Err(TensorError::ShapeMismatch {
                expected: self.value.shape_vec(),
                got: value.shape_vec(),
            });
        }
        self.value = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_value_checks_shape() {
        let mut p = Parameter::new("norm.gamma", Tensor::ones(vec![1, 4]));
        assert!(p.set_value(Tensor::zeros(vec![1, 4])).is_ok());
        assert_eq!(p.value().sum_all(), 0.0);

        let err = p.set_value(Tensor::zeros(vec![4, 1])).unwrap_err();
        assert!(matches!(err, TensorError::ShapeMismatch { .. }));
        assert_eq!(p.name(), "norm.gamma");
    }
}
