use oxidize_seq_autodiff::Parameter;

/// A component that owns trainable parameters.
///
/// Composite blocks collect their children's parameters in a fixed order,
/// so the same model always lists its parameters identically.
pub trait Module {
    /// All trainable parameters, read-only.
    fn parameters(&self) -> Vec<&Parameter>;

    /// All trainable parameters, for an optimizer or a checkpoint loader.
    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;

    /// Total number of scalar weights.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }
}
