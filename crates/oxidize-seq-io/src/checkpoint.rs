use std::collections::HashMap;
use std::fs;
use std::path::Path;

use oxidize_seq_core::{Tensor, TensorError};
use oxidize_seq_nn::{ModelConfig, Module, SequenceModel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed checkpoint: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("Checkpoint has no tensor named {0}")]
    MissingTensor(String),

    #[error("Checkpoint tensor {0} does not belong to this model")]
    UnexpectedTensor(String),
}

/// One stored weight tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorEntry {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

/// Model config plus every named weight tensor.
///
/// Positional tables are not stored; they are rebuilt from `d_model` and
/// `max_len` when the model is reconstructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub config: ModelConfig,
    pub tensors: Vec<TensorEntry>,
}

impl Checkpoint {
    pub fn from_model(model: &SequenceModel) -> Self {
        let tensors = model
            .parameters()
            .into_iter()
            .map(|p| TensorEntry {
                name: p.name().to_string(),
                shape: p.shape_vec(),
                data: p.value().data().to_vec(),
            })
            .collect();
        Checkpoint {
            config: model.config().clone(),
            tensors,
        }
    }

    pub fn get(&self, name: &str) -> Option<&TensorEntry> {
        self.tensors.iter().find(|t| t.name == name)
    }

    /// Rebuild the model from the config, then overwrite every weight.
    pub fn into_model(self) -> Result<SequenceModel, CheckpointError> {
        let mut model = SequenceModel::from_config(&self.config)?;
        let mut stored: HashMap<String, TensorEntry> = self
            .tensors
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();

        for param in model.parameters_mut() {
            let entry = stored
                .remove(param.name())
                .ok_or_else(|| CheckpointError::MissingTensor(param.name().to_string()))?;
            if entry.shape != param.shape_vec() {
                return Err(TensorError::DimensionMismatch(format!(
                    "{}: stored shape {:?}, model expects {:?}",
                    entry.name,
                    entry.shape,
                    param.shape_vec()
                ))
                .into());
            }
            param.set_value(Tensor::new(entry.data, entry.shape)?)?;
        }

        if let Some(name) = stored.into_keys().min() {
            return Err(CheckpointError::UnexpectedTensor(name));
        }
        Ok(model)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CheckpointError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Save a model's config and weights as JSON.
pub fn save_checkpoint(model: &SequenceModel, path: impl AsRef<Path>) -> Result<(), CheckpointError> {
    let path = path.as_ref();
    let checkpoint = Checkpoint::from_model(model);
    checkpoint.save(path)?;
    log::info!(
        "saved checkpoint with {} tensors to {}",
        checkpoint.tensors.len(),
        path.display()
    );
    Ok(())
}

/// Load a model saved with [`save_checkpoint`].
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<SequenceModel, CheckpointError> {
    let path = path.as_ref();
    let checkpoint = Checkpoint::load(path)?;
    log::info!(
        "loaded checkpoint with {} tensors from {}",
        checkpoint.tensors.len(),
        path.display()
    );
    checkpoint.into_model()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxidize_seq_nn::Sequence;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("oxidize-seq-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn test_save_and_load() {
        let config = ModelConfig::transducer(4, 8, 6, 16).with_seed(5);
        let mut model = SequenceModel::from_config(&config).unwrap();
        // move one weight away from its seeded value
        {
            let mut params = model.parameters_mut();
            let shifted = params[0].value().add_scalar(0.25);
            params[0].set_value(shifted).unwrap();
        }

        let path = temp_path("roundtrip");
        save_checkpoint(&model, &path).unwrap();
        let loaded = load_checkpoint(&path).unwrap();
        fs::remove_file(&path).unwrap();

        let pair = Sequence::Pair {
            source: vec![0, 1, 2, 3],
            target: vec![0, 1, 2],
        };
        assert_eq!(loaded.config(), model.config());
        let diff = loaded
            .predict(&pair)
            .unwrap()
            .max_abs_diff(&model.predict(&pair).unwrap())
            .unwrap();
        assert!(diff < 1e-9);
    }

    #[test]
    fn test_positional_table_not_stored() {
        let model = SequenceModel::from_config(&ModelConfig::causal_decoder(4, 8, 5)).unwrap();
        let checkpoint = Checkpoint::from_model(&model);
        assert_eq!(checkpoint.tensors.len(), model.parameters().len());
        assert!(checkpoint.tensors.iter().all(|t| !t.name.contains("positional")));
    }

    #[test]
    fn test_missing_tensor() {
        let model = SequenceModel::from_config(&ModelConfig::causal_decoder(4, 8, 5)).unwrap();
        let mut checkpoint = Checkpoint::from_model(&model);
        let removed = checkpoint.tensors.remove(0).name;
        match checkpoint.into_model() {
            Err(CheckpointError::MissingTensor(name)) => assert_eq!(name, removed),
            other => panic!("expected MissingTensor, got {other:?}"),
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let model = SequenceModel::from_config(&ModelConfig::causal_decoder(4, 8, 5)).unwrap();
        let mut checkpoint = Checkpoint::from_model(&model);
        checkpoint.tensors[0].shape = vec![1, checkpoint.tensors[0].data.len()];
        assert!(matches!(
            checkpoint.into_model(),
            Err(CheckpointError::Tensor(TensorError::DimensionMismatch(_)))
        ));
    }

    #[test]
    fn test_unexpected_tensor() {
        let model = SequenceModel::from_config(&ModelConfig::causal_decoder(4, 8, 5)).unwrap();
        let mut checkpoint = Checkpoint::from_model(&model);
        checkpoint.tensors.push(TensorEntry {
            name: "extra.weight".to_string(),
            shape: vec![1],
            data: vec![0.0],
        });
        assert!(matches!(
            checkpoint.into_model(),
            Err(CheckpointError::UnexpectedTensor(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_checkpoint(temp_path("does-not-exist")).unwrap_err();
        assert!(matches!(err, CheckpointError::Io(_)));
    }
}
