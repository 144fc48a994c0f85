use thiserror::Error;

/// Core error type shared by the tensor engine, the tape and every layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TensorError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Cannot broadcast shapes {a:?} and {b:?}")]
    BroadcastError { a: Vec<usize>, b: Vec<usize> },

    #[error("Index out of bounds: index {index} for axis {axis} with size {size}")]
    IndexOutOfBounds {
        index: usize,
        axis: usize,
        size: usize,
    },

    #[error("Token id {token} is outside the vocabulary of size {vocab_size}")]
    TokenOutOfRange { token: usize, vocab_size: usize },

    #[error("Sequence length {len} exceeds the positional table length {max_len}")]
    SequenceTooLong { len: usize, max_len: usize },

    #[error("Invalid axis: {axis} for tensor with {ndim} dimensions")]
    InvalidAxis { axis: usize, ndim: usize },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Empty tensor")]
    EmptyTensor,

    #[error("Empty token sequence")]
    EmptySequence,
}

/// Coarse classification of a [`TensorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Shapes or feature widths of the operands disagree.
    Dimension,
    /// A token id or a position falls outside its valid range.
    Index,
    Other,
}

impl TensorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TensorError::ShapeMismatch { .. }
            | TensorError::DimensionMismatch(_)
            | TensorError::BroadcastError { .. } => ErrorKind::Dimension,
            TensorError::IndexOutOfBounds { .. }
            | TensorError::TokenOutOfRange { .. }
            | TensorError::SequenceTooLong { .. } => ErrorKind::Index,
            _ => ErrorKind::Other,
        }
    }
}

pub type TensorResult<T> = Result<T, TensorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let e = TensorError::TokenOutOfRange { token: 9, vocab_size: 8 };
        assert_eq!(e.kind(), ErrorKind::Index);
        let e = TensorError::SequenceTooLong { len: 12, max_len: 10 };
        assert_eq!(e.kind(), ErrorKind::Index);
        let e = TensorError::DimensionMismatch("width".into());
        assert_eq!(e.kind(), ErrorKind::Dimension);
        assert_eq!(TensorError::EmptySequence.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_error_display() {
        let e = TensorError::TokenOutOfRange { token: 9, vocab_size: 8 };
        assert_eq!(
            e.to_string(),
            "Token id 9 is outside the vocabulary of size 8"
        );
    }
}
