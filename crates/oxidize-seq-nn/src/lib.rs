pub mod module;
pub mod init;
pub mod positional;
pub mod mask;
pub mod layers;
pub mod norm;
pub mod attention;
pub mod encoder;
pub mod decoder;
pub mod config;
pub mod models;

pub use module::Module;
pub use init::Initializer;
pub use positional::PositionalEncoder;
pub use mask::{Mask, MaskMatrix, MASK_FILL};
pub use layers::{Embedding, Linear};
pub use norm::{LayerNorm, ResidualNorm};
pub use attention::AttentionBlock;
pub use encoder::EncoderBlock;
pub use decoder::DecoderBlock;
pub use config::{ModelConfig, ModelKind};
pub use models::{CausalDecoder, EncoderClassifier, Sequence, SequenceModel, Transducer};
