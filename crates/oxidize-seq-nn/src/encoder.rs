use oxidize_seq_autodiff::{Graph, Parameter, Variable};
use oxidize_seq_core::TensorResult;

use crate::attention::AttentionBlock;
use crate::init::Initializer;
use crate::layers::{Embedding, Linear};
use crate::mask::Mask;
use crate::module::Module;
use crate::norm::ResidualNorm;
use crate::positional::PositionalEncoder;

/// Bidirectional encoder block.
///
/// ```text
/// ids → embed → +pos = p
///     → a  = self_attend(p, p, p)
///     → r1 = norm(a + p)
///     → out = norm(ff(r1) + r1)
/// ```
#[derive(Debug, Clone)]
pub struct EncoderBlock {
    embedding: Embedding,
    positional: PositionalEncoder,
    self_attention: AttentionBlock,
    attention_norm: ResidualNorm,
    feed_forward: Linear,
    feed_forward_norm: ResidualNorm,
}

impl EncoderBlock {
    pub fn new(
        init: &mut Initializer,
        name: &str,
        vocab_size: usize,
        d_model: usize,
        max_len: usize,
        eps: f64,
    ) -> Self {
        EncoderBlock {
            embedding: Embedding::new(init, &format!("{name}.embedding"), vocab_size, d_model),
            positional: PositionalEncoder::new(d_model, max_len),
            self_attention: AttentionBlock::new(init, &format!("{name}.self_attention"), d_model),
            attention_norm: ResidualNorm::new(init, &format!("{name}.attention_norm"), d_model, eps),
            feed_forward: Linear::new(init, &format!("{name}.feed_forward"), d_model, d_model, true),
            feed_forward_norm: ResidualNorm::new(
                init,
                &format!("{name}.feed_forward_norm"),
                d_model,
                eps,
            ),
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.embedding.vocab_size()
    }

    pub fn d_model(&self) -> usize {
        self.embedding.d_model()
    }

    pub fn max_len(&self) -> usize {
        self.positional.max_len()
    }

    /// Contextual embeddings for `ids`, `seq_len × d_model`.
    pub fn encode<'g>(&self, g: &'g Graph, ids: &[usize]) -> TensorResult<Variable<'g>> {
        log::trace!("encoder forward, seq_len={}", ids.len());
        let p = self.positional.encode(&self.embedding.lookup(g, ids)?)?;
        let a = self.self_attention.attend(&p, &p, &p, &Mask::None)?;
        let r1 = self.attention_norm.apply(&a, &p)?;
        let f = self.feed_forward.forward(&r1)?;
        self.feed_forward_norm.apply(&f, &r1)
    }
}

impl Module for EncoderBlock {
    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.embedding.parameters();
        params.extend(self.self_attention.parameters());
        params.extend(self.attention_norm.parameters());
        params.extend(self.feed_forward.parameters());
        params.extend(self.feed_forward_norm.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = self.embedding.parameters_mut();
        params.extend(self.self_attention.parameters_mut());
        params.extend(self.attention_norm.parameters_mut());
        params.extend(self.feed_forward.parameters_mut());
        params.extend(self.feed_forward_norm.parameters_mut());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxidize_seq_core::TensorError;

    fn encoder() -> EncoderBlock {
        EncoderBlock::new(&mut Initializer::new(5), "encoder", 8, 4, 6, 1e-5)
    }

    #[test]
    fn test_encode_shape() {
        let enc = encoder();
        let g = Graph::new();
        let out = enc.encode(&g, &[0, 2, 3, 6, 7, 1]).unwrap();
        assert_eq!(out.shape_vec(), vec![6, 4]);
        assert!(!out.data().has_nan());
    }

    #[test]
    fn test_parameter_names_are_unique() {
        let enc = encoder();
        let mut names: Vec<&str> = enc.parameters().iter().map(|p| p.name()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        // embedding, 3 projections, 2 norms x 2, ff weight + bias
        assert_eq!(total, 1 + 3 + 4 + 2);
    }

    #[test]
    fn test_encode_errors() {
        let enc = encoder();
        let g = Graph::new();
        assert_eq!(
            enc.encode(&g, &[0, 8]).unwrap_err(),
            TensorError::TokenOutOfRange {
                token: 8,
                vocab_size: 8
            }
        );
        assert_eq!(
            enc.encode(&g, &[0; 7]).unwrap_err(),
            TensorError::SequenceTooLong { len: 7, max_len: 6 }
        );
        assert_eq!(enc.encode(&g, &[]).unwrap_err(), TensorError::EmptySequence);
    }

    #[test]
    fn test_same_seed_same_output() {
        let g = Graph::new();
        let a = encoder().encode(&g, &[1, 2, 3]).unwrap();
        let b = encoder().encode(&g, &[1, 2, 3]).unwrap();
        assert_eq!(a.data(), b.data());
    }
}
