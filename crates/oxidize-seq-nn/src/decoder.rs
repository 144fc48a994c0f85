use oxidize_seq_autodiff::{Graph, Parameter, Variable};
use oxidize_seq_core::{TensorError, TensorResult};

use crate::attention::AttentionBlock;
use crate::init::Initializer;
use crate::layers::{Embedding, Linear};
use crate::mask::Mask;
use crate::module::Module;
use crate::norm::ResidualNorm;
use crate::positional::PositionalEncoder;

#[derive(Debug, Clone)]
struct CrossAttention {
    attention: AttentionBlock,
    norm: ResidualNorm,
}

/// Decoder block with causal self-attention.
///
/// ```text
/// ids → embed → +pos = p
///     → a  = self_attend(p, p, p, causal)
///     → r1 = norm(a + p)
///     → c  = cross_attend(r1, enc, enc)       (full decoder only)
///     → r2 = norm(c + r1)
///     → out = norm(ff(r2) + r2)
/// ```
///
/// A block built with [`DecoderBlock::causal_only`] has no cross-attention
/// sublayer at all and feeds `r1` straight into the feed-forward step.
#[derive(Debug, Clone)]
pub struct DecoderBlock {
    embedding: Embedding,
    positional: PositionalEncoder,
    self_attention: AttentionBlock,
    self_attention_norm: ResidualNorm,
    cross: Option<CrossAttention>,
    feed_forward: Linear,
    feed_forward_norm: ResidualNorm,
}

impl DecoderBlock {
    /// Full decoder block, attending to encoder output.
    pub fn new(
        init: &mut Initializer,
        name: &str,
        vocab_size: usize,
        d_model: usize,
        max_len: usize,
        eps: f64,
    ) -> Self {
        Self::build(init, name, vocab_size, d_model, max_len, eps, true)
    }

    /// Decoder block without the cross-attention sublayer.
    pub fn causal_only(
        init: &mut Initializer,
        name: &str,
        vocab_size: usize,
        d_model: usize,
        max_len: usize,
        eps: f64,
    ) -> Self {
        Self::build(init, name, vocab_size, d_model, max_len, eps, false)
    }

    fn build(
        init: &mut Initializer,
        name: &str,
        vocab_size: usize,
        d_model: usize,
        max_len: usize,
        eps: f64,
        with_cross: bool,
    ) -> Self {
        let embedding = Embedding::new(init, &format!("{name}.embedding"), vocab_size, d_model);
        let self_attention = AttentionBlock::new(init, &format!("{name}.self_attention"), d_model);
        let self_attention_norm =
            ResidualNorm::new(init, &format!("{name}.self_attention_norm"), d_model, eps);
        let cross = with_cross.then(|| CrossAttention {
            attention: AttentionBlock::new(init, &format!("{name}.cross_attention"), d_model),
            norm: ResidualNorm::new(init, &format!("{name}.cross_attention_norm"), d_model, eps),
        });
        DecoderBlock {
            embedding,
            positional: PositionalEncoder::new(d_model, max_len),
            self_attention,
            self_attention_norm,
            cross,
            feed_forward: Linear::new(init, &format!("{name}.feed_forward"), d_model, d_model, true),
            feed_forward_norm: ResidualNorm::new(
                init,
                &format!("{name}.feed_forward_norm"),
                d_model,
                eps,
            ),
        }
    }

    pub fn has_cross_attention(&self) -> bool {
        self.cross.is_some()
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

    /// Decoder output for `ids` attending to `encoder_out`, `seq_len × d_model`.
    pub fn decode<'g>(
        &self,
        g: &'g Graph,
        ids: &[usize],
        encoder_out: &Variable<'g>,
    ) -> TensorResult<Variable<'g>> {
        let cross = self.cross.as_ref().ok_or_else(|| {
            TensorError::InvalidOperation(
                "decode needs a cross-attention sublayer; use decode_causal".to_string(),
            )
        })?;
        let enc_shape = encoder_out.shape_vec();
        if enc_shape.len() != 2 || enc_shape[1] != self.d_model() {
            return Err(TensorError::DimensionMismatch(format!(
                "encoder output must be [source_len, {}], got {:?}",
                self.d_model(),
                enc_shape
            )));
        }
        log::trace!(
            "decoder forward, target_len={} source_len={}",
            ids.len(),
            enc_shape[0]
        );

        let r1 = self.causal_self_attention(g, ids)?;
        let c = cross.attention.attend(&r1, encoder_out, encoder_out, &Mask::None)?;
        let r2 = cross.norm.apply(&c, &r1)?;
        self.feed_forward_step(&r2)
    }

    /// Decoder output for `ids` with no encoder input.
    pub fn decode_causal<'g>(&self, g: &'g Graph, ids: &[usize]) -> TensorResult<Variable<'g>> {
        if self.cross.is_some() {
            return Err(TensorError::InvalidOperation(
                "block has a cross-attention sublayer; use decode with encoder output".to_string(),
            ));
        }
        log::trace!("causal decoder forward, seq_len={}", ids.len());
        let r1 = self.causal_self_attention(g, ids)?;
        self.feed_forward_step(&r1)
    }

    fn causal_self_attention<'g>(&self, g: &'g Graph, ids: &[usize]) -> TensorResult<Variable<'g>> {
        let p = self.positional.encode(&self.embedding.lookup(g, ids)?)?;
        let a = self
            .self_attention
            .attend(&p, &p, &p, &Mask::Causal(ids.len()))?;
        self.self_attention_norm.apply(&a, &p)
    }

    fn feed_forward_step<'g>(&self, x: &Variable<'g>) -> TensorResult<Variable<'g>> {
        let f = self.feed_forward.forward(x)?;
        self.feed_forward_norm.apply(&f, x)
    }
}

impl Module for DecoderBlock {
    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.embedding.parameters();
        params.extend(self.self_attention.parameters());
        params.extend(self.self_attention_norm.parameters());
        if let Some(cross) = &self.cross {
            params.extend(cross.attention.parameters());
            params.extend(cross.norm.parameters());
        }
        params.extend(self.feed_forward.parameters());
        params.extend(self.feed_forward_norm.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = self.embedding.parameters_mut();
        params.extend(self.self_attention.parameters_mut());
        params.extend(self.self_attention_norm.parameters_mut());
        if let Some(cross) = &mut self.cross {
            params.extend(cross.attention.parameters_mut());
            params.extend(cross.norm.parameters_mut());
        }
        params.extend(self.feed_forward.parameters_mut());
        params.extend(self.feed_forward_norm.parameters_mut());
        params
    }
}
