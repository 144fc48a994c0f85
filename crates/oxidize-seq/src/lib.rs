//! # oxidize-seq
//!
//! Attention-based sequence models written in pure Rust.
//!
//! ## Modules
//!
//! - **core** — Tensor engine: dense row-major arrays with broadcasting, reductions, softmax
//! - **autodiff** — Explicit computation graph, named parameters, reverse-mode gradients
//! - **nn** — Positional encoding, attention, residual norm, encoder/decoder blocks, the three models
//! - **loss** — Cross-entropy over logits
//! - **optim** — Optimizers: SGD (momentum), Adam
//! - **io** — Checkpoints: model config plus named weights as JSON
//!
//! ## Example
//!
//! ```no_run
//! use oxidize_seq::nn::{ModelConfig, Sequence, SequenceModel};
//! use oxidize_seq::optim::Adam;
//!
//! let mut model = SequenceModel::from_config(&ModelConfig::causal_decoder(16, 8, 5))?;
//! let mut optimizer = Adam::new(0.05);
//! let input = Sequence::Tokens(vec![0, 1, 2, 4, 3]);
//! let _loss = oxidize_seq::train_step(&mut model, &mut optimizer, &input, &[1, 2, 4, 3, 4])?;
//! # Ok::<(), oxidize_seq::core::TensorError>(())
//! ```

pub mod training;

pub use training::train_step;

/// Core tensor engine.
pub use oxidize_seq_core as core;

/// Automatic differentiation.
pub use oxidize_seq_autodiff as autodiff;

/// Sequence model layers and configurations.
pub use oxidize_seq_nn as nn;

/// Loss functions.
pub use oxidize_seq_loss as loss;

/// Optimizers.
pub use oxidize_seq_optim as optim;

/// Checkpoint persistence.
pub use oxidize_seq_io as io;
