use oxidize_seq_autodiff::{backward, Graph};
use oxidize_seq_core::TensorResult;
use oxidize_seq_loss::cross_entropy;
use oxidize_seq_nn::{Module, Sequence, SequenceModel};
use oxidize_seq_optim::Optimizer;

/// One teacher-forced update: forward, cross-entropy, backward, optimizer step.
///
/// `targets` holds one class id per logit row. Returns the loss before the update.
pub fn train_step<O: Optimizer>(
    model: &mut SequenceModel,
    optimizer: &mut O,
    input: &Sequence,
    targets: &[usize],
) -> TensorResult<f64> {
    let (loss, grads) = {
        let g = Graph::new();
        let logits = model.forward(&g, input)?;
        let loss = cross_entropy(&logits, targets)?;
        let grads = backward(&loss)?;
        let value = loss.data().item()?;
        (value, grads)
    };
    log::trace!("train step: loss={:.6} grad_norm={:.6}", loss, grads.global_norm());
    optimizer.step(model.parameters_mut(), &grads)?;
    Ok(loss)
}
