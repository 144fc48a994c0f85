use oxidize_seq_core::{TensorError, TensorResult};
use serde::{Deserialize, Serialize};

fn default_layer_norm_eps() -> f64 {
    1e-5
}

fn default_seed() -> u64 {
    42
}

/// Which of the three model configurations to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelKind {
    EncoderClassifier {
        vocab_size: usize,
        num_classes: usize,
    },
    CausalDecoder {
        vocab_size: usize,
    },
    Transducer {
        source_vocab_size: usize,
        target_vocab_size: usize,
    },
}

/// Hyperparameters of a [`SequenceModel`](crate::models::SequenceModel).
///
/// ```json
/// { "d_model": 16, "max_len": 8,
///   "kind": { "type": "causal_decoder", "vocab_size": 5 } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub d_model: usize,
    pub max_len: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub kind: ModelKind,
}

impl ModelConfig {
    pub fn new(d_model: usize, max_len: usize, kind: ModelKind) -> Self {
        ModelConfig {
            d_model,
            max_len,
            layer_norm_eps: default_layer_norm_eps(),
            seed: default_seed(),
            kind,
        }
    }

    pub fn encoder_classifier(d_model: usize, max_len: usize, vocab_size: usize, num_classes: usize) -> Self {
        Self::new(d_model, max_len, ModelKind::EncoderClassifier { vocab_size, num_classes })
    }

    pub fn causal_decoder(d_model: usize, max_len: usize, vocab_size: usize) -> Self {
        Self::new(d_model, max_len, ModelKind::CausalDecoder { vocab_size })
    }

    pub fn transducer(
        d_model: usize,
        max_len: usize,
        source_vocab_size: usize,
        target_vocab_size: usize,
    ) -> Self {
        Self::new(
            d_model,
            max_len,
            ModelKind::Transducer {
                source_vocab_size,
                target_vocab_size,
            },
        )
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_layer_norm_eps(mut self, eps: f64) -> Self {
        self.layer_norm_eps = eps;
        self
    }

    pub fn validate(&self) -> TensorResult<()> {
        let invalid = |msg: &str| Err(TensorError::InvalidConfig(msg.to_string()));
        if self.d_model == 0 {
            return invalid("d_model must be positive");
        }
        if self.max_len == 0 {
            return invalid("max_len must be positive");
        }
        if !(self.layer_norm_eps > 0.0 && self.layer_norm_eps.is_finite()) {
            return invalid("layer_norm_eps must be a positive finite number");
        }
        let sizes_ok = match self.kind {
            ModelKind::EncoderClassifier {
                vocab_size,
                num_classes,
            } => vocab_size > 0 && num_classes > 0,
            ModelKind::CausalDecoder { vocab_size } => vocab_size > 0,
            ModelKind::Transducer {
                source_vocab_size,
                target_vocab_size,
            } => source_vocab_size > 0 && target_vocab_size > 0,
        };
        if !sizes_ok {
            return invalid("vocabulary and class counts must be positive");
        }
        Ok(())
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> TensorResult<Self> {
        let config: ModelConfig = serde_json::from_str(json)
            .map_err(|e| TensorError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> TensorResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| TensorError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let json = r#"{ "d_model": 16, "max_len": 8,
                        "kind": { "type": "causal_decoder", "vocab_size": 5 } }"#;
        let config = ModelConfig::from_json_str(json).unwrap();
        assert_eq!(config.layer_norm_eps, 1e-5);
        assert_eq!(config.seed, 42);
        assert_eq!(config.kind, ModelKind::CausalDecoder { vocab_size: 5 });
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ModelConfig::transducer(8, 10, 6, 16)
            .with_seed(7)
            .with_layer_norm_eps(1e-6);
        let json = config.to_json_string().unwrap();
        assert!(json.contains("\"type\": \"transducer\""));
        assert_eq!(ModelConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        assert!(ModelConfig::causal_decoder(0, 4, 5).validate().is_err());
        assert!(ModelConfig::causal_decoder(4, 0, 5).validate().is_err());
        assert!(ModelConfig::encoder_classifier(4, 4, 8, 0).validate().is_err());
        assert!(ModelConfig::causal_decoder(4, 4, 5)
            .with_layer_norm_eps(0.0)
            .validate()
            .is_err());
        assert!(ModelConfig::encoder_classifier(2, 6, 8, 2).validate().is_ok());
    }

    #[test]
    fn test_malformed_json() {
        let err = ModelConfig::from_json_str("{ \"d_model\": 4 }").unwrap_err();
        assert!(matches!(err, TensorError::InvalidConfig(_)));
    }
}
