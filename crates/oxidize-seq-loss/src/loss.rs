use oxidize_seq_autodiff::Variable;
use oxidize_seq_core::{Tensor, TensorError, TensorResult};

fn check_targets(shape: &[usize], targets: &[usize]) -> TensorResult<usize> {
    let (rows, n_classes) = match shape {
        &[rows, cols] => (rows, cols),
        _ => {
            return Err(TensorError::DimensionMismatch(format!(
                "cross-entropy expects [n, n_classes] logits, got {shape:?}"
            )))
        }
    };
    if targets.is_empty() {
        return Err(TensorError::EmptySequence);
    }
    if targets.len() != rows {
        return Err(TensorError::DimensionMismatch(format!(
            "{} targets for {} logit rows",
            targets.len(),
            rows
        )));
    }
    if let Some(&token) = targets.iter().find(|&&t| t >= n_classes) {
        return Err(TensorError::TokenOutOfRange {
            token,
            vocab_size: n_classes,
        });
    }
    Ok(n_classes)
}

/// Cross-entropy over raw logits, recorded on the logits' graph.
///
/// logits: `[n, n_classes]`, one row per position; targets: one class id per row.
///
/// L = -mean(log_softmax(logits)[i, targets[i]])
pub fn cross_entropy<'g>(logits: &Variable<'g>, targets: &[usize]) -> TensorResult<Variable<'g>> {
    let n_classes = check_targets(&logits.shape_vec(), targets)?;
    let one_hot = logits.graph().input(Tensor::one_hot(targets, n_classes)?);
    let picked = logits.log_softmax_rows()?.mul(&one_hot)?.sum();
    Ok(picked.mul_scalar(-1.0 / targets.len() as f64))
}

/// Cross-entropy on plain tensors, for evaluation.
pub fn cross_entropy_loss(logits: &Tensor<f64>, targets: &[usize]) -> TensorResult<f64> {
    check_targets(logits.shape().dims(), targets)?;
    let probs = logits.softmax()?;
    let mut total = 0.0;
    for (i, &t) in targets.iter().enumerate() {
        total -= probs.get(&[i, t])?.max(1e-15).ln();
    }
    Ok(total / targets.len() as f64)
}

/// Fraction of rows whose arg-max equals the target.
pub fn accuracy(logits: &Tensor<f64>, targets: &[usize]) -> TensorResult<f64> {
    check_targets(logits.shape().dims(), targets)?;
    let predicted = logits.argmax_rows()?;
    let correct = predicted.iter().zip(targets).filter(|(p, t)| p == t).count();
    Ok(correct as f64 / targets.len() as f64)
}
