use std::collections::HashMap;

use oxidize_seq_autodiff::{Gradients, Parameter};
use oxidize_seq_core::{Tensor, TensorResult};

/// Trait for optimizers.
///
/// State is keyed by parameter name, so the same optimizer can be stepped
/// with a fresh `parameters_mut()` borrow every iteration.
pub trait Optimizer {
    /// Update every parameter that has a gradient in `grads`.
    fn step(&mut self, params: Vec<&mut Parameter>, grads: &Gradients) -> TensorResult<()>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);
}

/// Stochastic Gradient Descent with optional momentum.
#[derive(Debug, Clone)]
pub struct SGD {
    pub lr: f64,
    pub momentum: f64,
    velocities: HashMap<String, Tensor<f64>>,
}

impl SGD {
    pub fn new(lr: f64, momentum: f64) -> Self {
        SGD {
            lr,
            momentum,
            velocities: HashMap::new(),
        }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: Vec<&mut Parameter>, grads: &Gradients) -> TensorResult<()> {
        let mut updated = 0;
        for param in params {
            let Some(grad) = grads.wrt(param) else {
                continue;
            };
            let velocity = self
                .velocities
                .entry(param.name().to_string())
                .or_insert_with(|| Tensor::zeros(param.shape_vec()));

            // v = momentum * v - lr * grad
            *velocity = velocity
                .mul_scalar(self.momentum)
                .sub(&grad.mul_scalar(self.lr))?;

            // param += v
            let next = param.value().add(velocity)?;
            param.set_value(next)?;
            updated += 1;
        }
        log::debug!("sgd step: {} parameters updated", updated);
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }
}

/// Adam optimizer.
#[derive(Debug, Clone)]
pub struct Adam {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub t: usize,
    m: HashMap<String, Tensor<f64>>, // first moment
    v: HashMap<String, Tensor<f64>>, // second moment
}

impl Adam {
    pub fn new(lr: f64) -> Self {
        Adam {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            m: HashMap::new(),
            v: HashMap::new(),
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: Vec<&mut Parameter>, grads: &Gradients) -> TensorResult<()> {
        self.t += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t as i32);

        for param in params {
            let Some(grad) = grads.wrt(param) else {
                continue;
            };
            let name = param.name().to_string();
            let m = self
                .m
                .entry(name.clone())
                .or_insert_with(|| Tensor::zeros(param.shape_vec()));
            *m = m
                .mul_scalar(self.beta1)
                .add(&grad.mul_scalar(1.0 - self.beta1))?;
            let m_hat = m.mul_scalar(1.0 / bias_correction1);

            let v = self
                .v
                .entry(name)
                .or_insert_with(|| Tensor::zeros(param.shape_vec()));
            let grad_sq = grad.mul(grad)?;
            *v = v
                .mul_scalar(self.beta2)
                .add(&grad_sq.mul_scalar(1.0 - self.beta2))?;
            let v_hat = v.mul_scalar(1.0 / bias_correction2);

            let denom = v_hat.sqrt().add_scalar(self.epsilon);
            let update = m_hat.div(&denom)?.mul_scalar(self.lr);
            let next = param.value().sub(&update)?;
            param.set_value(next)?;
        }
        log::debug!("adam step {}", self.t);
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }
}
