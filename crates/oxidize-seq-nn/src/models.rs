//! The three sequence model configurations built on the shared blocks.
//!
//! Every model exposes `forward` on an explicit [`Graph`] for training and
//! `predict` for plain inference on a fresh graph.

use oxidize_seq_autodiff::{Graph, Parameter, Variable};
use oxidize_seq_core::{Tensor, TensorError, TensorResult};
use rayon::prelude::*;

use crate::config::{ModelConfig, ModelKind};
use crate::decoder::DecoderBlock;
use crate::encoder::EncoderBlock;
use crate::init::Initializer;
use crate::layers::Linear;
use crate::module::Module;

fn wrong_kind(expected: &str, config: &ModelConfig) -> TensorError {
    TensorError::InvalidConfig(format!(
        "expected a {expected} config, got {:?}",
        config.kind
    ))
}

// ─── Encoder-only classifier ────────────────────────────────────────────────

/// Encoder followed by a linear classifier over the first position.
///
/// Position 0 is expected to hold a classification marker token.
#[derive(Debug, Clone)]
pub struct EncoderClassifier {
    config: ModelConfig,
    encoder: EncoderBlock,
    classifier: Linear,
}

impl EncoderClassifier {
    pub fn new(config: &ModelConfig) -> TensorResult<Self> {
        config.validate()?;
        let ModelKind::EncoderClassifier {
            vocab_size,
            num_classes,
        } = config.kind
        else {
            return Err(wrong_kind("encoder classifier", config));
        };
        let mut init = Initializer::new(config.seed);
        let d = config.d_model;
        let model = EncoderClassifier {
            config: config.clone(),
            encoder: EncoderBlock::new(&mut init, "encoder", vocab_size, d, config.max_len, config.layer_norm_eps),
            classifier: Linear::new(&mut init, "classifier", d, num_classes, true),
        };
        log::debug!(
            "built encoder classifier: d_model={} vocab={} classes={} params={}",
            d,
            vocab_size,
            num_classes,
            model.num_parameters()
        );
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Class logits, `1 × num_classes`.
    pub fn forward<'g>(&self, g: &'g Graph, ids: &[usize]) -> TensorResult<Variable<'g>> {
        let encoded = self.encoder.encode(g, ids)?;
        self.classifier.forward(&encoded.slice_rows(0, 1)?)
    }

    pub fn predict(&self, ids: &[usize]) -> TensorResult<Tensor<f64>> {
        let g = Graph::new();
        Ok(self.forward(&g, ids)?.into_data())
    }
}

impl Module for EncoderClassifier {
    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.encoder.parameters();
        params.extend(self.classifier.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = self.encoder.parameters_mut();
        params.extend(self.classifier.parameters_mut());
        params
    }
}

// ─── Decoder-only causal model ──────────────────────────────────────────────

/// Causal decoder with one next-token logit row per position.
///
/// The decoder block is built without cross-attention.
#[derive(Debug, Clone)]
pub struct CausalDecoder {
    config: ModelConfig,
    decoder: DecoderBlock,
    output: Linear,
}

impl CausalDecoder {
    pub fn new(config: &ModelConfig) -> TensorResult<Self> {
        config.validate()?;
        let ModelKind::CausalDecoder { vocab_size } = config.kind else {
            return Err(wrong_kind("causal decoder", config));
        };
        let mut init = Initializer::new(config.seed);
        let d = config.d_model;
        let model = CausalDecoder {
            config: config.clone(),
            decoder: DecoderBlock::causal_only(&mut init, "decoder", vocab_size, d, config.max_len, config.layer_norm_eps),
            output: Linear::new(&mut init, "output", d, vocab_size, true),
        };
        log::debug!(
            "built causal decoder: d_model={} vocab={} params={}",
            d,
            vocab_size,
            model.num_parameters()
        );
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Next-token logits, `seq_len × vocab_size`.
    pub fn forward<'g>(&self, g: &'g Graph, ids: &[usize]) -> TensorResult<Variable<'g>> {
        let decoded = self.decoder.decode_causal(g, ids)?;
        self.output.forward(&decoded)
    }

    pub fn predict(&self, ids: &[usize]) -> TensorResult<Tensor<f64>> {
        let g = Graph::new();
        Ok(self.forward(&g, ids)?.into_data())
    }
}

impl Module for CausalDecoder {
    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.decoder.parameters();
        params.extend(self.output.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = self.decoder.parameters_mut();
        params.extend(self.output.parameters_mut());
        params
    }
}

// ─── Encoder-decoder transducer ─────────────────────────────────────────────

/// Encoder-decoder model producing target-vocabulary logits per target position.
///
/// The full target sequence is given at once (teacher forcing).
#[derive(Debug, Clone)]
pub struct Transducer {
    config: ModelConfig,
    encoder: EncoderBlock,
    decoder: DecoderBlock,
    output: Linear,
}

impl Transducer {
    pub fn new(config: &ModelConfig) -> TensorResult<Self> {
        config.validate()?;
        let ModelKind::Transducer {
            source_vocab_size,
            target_vocab_size,
        } = config.kind
        else {
            return Err(wrong_kind("transducer", config));
        };
        let mut init = Initializer::new(config.seed);
        let (d, max_len, eps) = (config.d_model, config.max_len, config.layer_norm_eps);
        let model = Transducer {
            config: config.clone(),
            encoder: EncoderBlock::new(&mut init, "encoder", source_vocab_size, d, max_len, eps),
            decoder: DecoderBlock::new(&mut init, "decoder", target_vocab_size, d, max_len, eps),
            output: Linear::new(&mut init, "output", d, target_vocab_size, true),
        };
        log::debug!(
            "built transducer: d_model={} source_vocab={} target_vocab={} params={}",
            d,
            source_vocab_size,
            target_vocab_size,
            model.num_parameters()
        );
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Target logits, `target_len × target_vocab_size`.
    pub fn forward<'g>(
        &self,
        g: &'g Graph,
        source: &[usize],
        target: &[usize],
    ) -> TensorResult<Variable<'g>> {
        let encoded = self.encoder.encode(g, source)?;
        let decoded = self.decoder.decode(g, target, &encoded)?;
        self.output.forward(&decoded)
    }

    pub fn predict(&self, source: &[usize], target: &[usize]) -> TensorResult<Tensor<f64>> {
        let g = Graph::new();
        Ok(self.forward(&g, source, target)?.into_data())
    }
}

impl Module for Transducer {
    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.encoder.parameters();
        params.extend(self.decoder.parameters());
        params.extend(self.output.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = self.encoder.parameters_mut();
        params.extend(self.decoder.parameters_mut());
        params.extend(self.output.parameters_mut());
        params
    }
}

// ─── Config-driven wrapper ──────────────────────────────────────────────────

/// One input example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sequence {
    /// A single token sequence (classifier, causal decoder).
    Tokens(Vec<usize>),
    /// Source and target sequences (transducer).
    Pair { source: Vec<usize>, target: Vec<usize> },
}

/// Any of the three configurations, selected by [`ModelConfig::kind`].
#[derive(Debug, Clone)]
pub enum SequenceModel {
    EncoderClassifier(EncoderClassifier),
    CausalDecoder(CausalDecoder),
    Transducer(Transducer),
}

impl SequenceModel {
    pub fn from_config(config: &ModelConfig) -> TensorResult<Self> {
        Ok(match config.kind {
            ModelKind::EncoderClassifier { .. } => {
                SequenceModel::EncoderClassifier(EncoderClassifier::new(config)?)
            }
            ModelKind::CausalDecoder { .. } => SequenceModel::CausalDecoder(CausalDecoder::new(config)?),
            ModelKind::Transducer { .. } => SequenceModel::Transducer(Transducer::new(config)?),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        match self {
            SequenceModel::EncoderClassifier(m) => m.config(),
            SequenceModel::CausalDecoder(m) => m.config(),
            SequenceModel::Transducer(m) => m.config(),
        }
    }

    pub fn forward<'g>(&self, g: &'g Graph, input: &Sequence) -> TensorResult<Variable<'g>> {
        match (self, input) {
            (SequenceModel::EncoderClassifier(m), Sequence::Tokens(ids)) => m.forward(g, ids),
            (SequenceModel::CausalDecoder(m), Sequence::Tokens(ids)) => m.forward(g, ids),
            (SequenceModel::Transducer(m), Sequence::Pair { source, target }) => {
                m.forward(g, source, target)
            }
            (SequenceModel::Transducer(_), Sequence::Tokens(_)) => Err(TensorError::InvalidOperation(
                "transducer needs a source/target pair".to_string(),
            )),
            (_, Sequence::Pair { .. }) => Err(TensorError::InvalidOperation(
                "single-sequence model got a source/target pair".to_string(),
            )),
        }
    }

    pub fn predict(&self, input: &Sequence) -> TensorResult<Tensor<f64>> {
        let g = Graph::new();
        Ok(self.forward(&g, input)?.into_data())
    }

    /// Predict every input in parallel, one graph per sequence.
    pub fn predict_batch(&self, inputs: &[Sequence]) -> TensorResult<Vec<Tensor<f64>>> {
        log::trace!("batch prediction over {} sequences", inputs.len());
        inputs.par_iter().map(|input| self.predict(input)).collect()
    }
}

impl Module for SequenceModel {
    fn parameters(&self) -> Vec<&Parameter> {
        match self {
            SequenceModel::EncoderClassifier(m) => m.parameters(),
            SequenceModel::CausalDecoder(m) => m.parameters(),
            SequenceModel::Transducer(m) => m.parameters(),
        }
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        match self {
            SequenceModel::EncoderClassifier(m) => m.parameters_mut(),
            SequenceModel::CausalDecoder(m) => m.parameters_mut(),
            SequenceModel::Transducer(m) => m.parameters_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_emits_one_row() {
        let model = EncoderClassifier::new(&ModelConfig::encoder_classifier(2, 6, 8, 2)).unwrap();
        let logits = model.predict(&[0, 2, 3, 6, 7, 1]).unwrap();
        assert_eq!(logits.shape_vec(), vec![1, 2]);
    }

    #[test]
    fn test_causal_decoder_shape() {
        let model = CausalDecoder::new(&ModelConfig::causal_decoder(4, 8, 5)).unwrap();
        let logits = model.predict(&[0, 1, 2, 4, 3]).unwrap();
        assert_eq!(logits.shape_vec(), vec![5, 5]);
    }

    #[test]
    fn test_transducer_shape_follows_target() {
        let model = Transducer::new(&ModelConfig::transducer(4, 8, 6, 16)).unwrap();
        let logits = model.predict(&[0, 1, 2, 3, 4, 5], &[0, 1, 2]).unwrap();
        assert_eq!(logits.shape_vec(), vec![3, 16]);
    }

    #[test]
    fn test_kind_mismatch() {
        let config = ModelConfig::causal_decoder(4, 8, 5);
        assert!(matches!(
            Transducer::new(&config),
            Err(TensorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_wrong_input_form() {
        let model = SequenceModel::from_config(&ModelConfig::transducer(4, 8, 6, 16)).unwrap();
        assert!(matches!(
            model.predict(&Sequence::Tokens(vec![0, 1])),
            Err(TensorError::InvalidOperation(_))
        ));
        let model = SequenceModel::from_config(&ModelConfig::causal_decoder(4, 8, 5)).unwrap();
        let pair = Sequence::Pair {
            source: vec![0],
            target: vec![0],
        };
        assert!(matches!(model.predict(&pair), Err(TensorError::InvalidOperation(_))));
    }

    #[test]
    fn test_predict_batch_matches_sequential() {
        let model = SequenceModel::from_config(&ModelConfig::causal_decoder(4, 8, 5)).unwrap();
        let inputs: Vec<Sequence> = (0..6)
            .map(|n| Sequence::Tokens((0..=n).map(|i| i % 5).collect()))
            .collect();
        let batch = model.predict_batch(&inputs).unwrap();
        assert_eq!(batch.len(), inputs.len());
        for (input, logits) in inputs.iter().zip(&batch) {
            assert_eq!(&model.predict(input).unwrap(), logits);
        }
    }

    #[test]
    fn test_predict_batch_propagates_errors() {
        let model = SequenceModel::from_config(&ModelConfig::causal_decoder(4, 8, 5)).unwrap();
        let inputs = vec![Sequence::Tokens(vec![0, 1]), Sequence::Tokens(vec![9])];
        assert!(matches!(
            model.predict_batch(&inputs),
            Err(TensorError::TokenOutOfRange { token: 9, .. })
        ));
    }

    #[test]
    fn test_same_config_same_model() {
        let config = ModelConfig::transducer(4, 8, 6, 16).with_seed(3);
        let a = SequenceModel::from_config(&config).unwrap();
        let b = SequenceModel::from_config(&config).unwrap();
        let pair = Sequence::Pair {
            source: vec![0, 1, 2],
            target: vec![0, 4],
        };
        assert_eq!(a.predict(&pair).unwrap(), b.predict(&pair).unwrap());
        assert_eq!(a.num_parameters(), b.num_parameters());
    }

    #[test]
    fn test_parameter_count() {
        // d=2, V=8, C=2: embedding 16, attention 12, norms 8, ff 6, classifier 6
        let model = EncoderClassifier::new(&ModelConfig::encoder_classifier(2, 6, 8, 2)).unwrap();
        assert_eq!(model.num_parameters(), 16 + 12 + 8 + 6 + 6);
    }
}
