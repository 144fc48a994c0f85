use oxidize_seq_autodiff::Parameter;
use oxidize_seq_core::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic source of initial parameter values.
///
/// Each tensor draws its own seed from one generator seeded by the model
/// seed, so two models built from the same config are identical.
#[derive(Debug, Clone)]
pub struct Initializer {
    rng: StdRng,
}

impl Initializer {
    pub fn new(seed: u64) -> Self {
        Initializer {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn next_seed(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Xavier-uniform `[fan_in, fan_out]` matrix.
    pub fn xavier(&mut self, name: impl Into<String>, fan_in: usize, fan_out: usize) -> Parameter {
        let scale = (6.0 / (fan_in + fan_out) as f64).sqrt();
        let seed = self.next_seed();
        let value = Tensor::rand_uniform(vec![fan_in, fan_out], -scale, scale, seed);
        Parameter::new(name, value)
    }

    /// Standard normal tensor.
    pub fn normal(&mut self, name: impl Into<String>, shape: Vec<usize>) -> Parameter {
        let seed = self.next_seed();
        Parameter::new(name, Tensor::randn(shape, seed))
    }

    pub fn zeros(&mut self, name: impl Into<String>, shape: Vec<usize>) -> Parameter {
        Parameter::new(name, Tensor::zeros(shape))
    }

    pub fn ones(&mut self, name: impl Into<String>, shape: Vec<usize>) -> Parameter {
        Parameter::new(name, Tensor::ones(shape))
    }
}
