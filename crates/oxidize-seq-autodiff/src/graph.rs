use std::cell::{Ref, RefCell};
use std::collections::HashMap;

use oxidize_seq_core::Tensor;

use crate::parameter::Parameter;
use crate::variable::Variable;

/// Identifier of a node on a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// The operation that produced a node.
#[derive(Debug, Clone)]
pub enum Op {
    /// Input constant or bound parameter.
    Leaf,
    /// Element-wise addition (broadcasting).
    Add(NodeId, NodeId),
    /// Element-wise subtraction (broadcasting).
    Sub(NodeId, NodeId),
    /// Element-wise multiplication (broadcasting).
    Mul(NodeId, NodeId),
    /// Element-wise division (broadcasting).
    Div(NodeId, NodeId),
    /// Matrix multiplication.
    MatMul(NodeId, NodeId),
    /// Matrix transpose.
    Transpose(NodeId),
    Neg(NodeId),
    Exp(NodeId),
    Ln(NodeId),
    /// Element-wise power by a scalar exponent.
    Pow(NodeId, f64),
    MulScalar(NodeId, f64),
    AddScalar(NodeId, f64),
    /// Sum of all elements to a scalar.
    SumAll(NodeId),
    /// Mean of all elements to a scalar.
    MeanAll(NodeId),
    /// Per-row sum of a matrix, kept as an `[rows, 1]` column.
    SumRows(NodeId),
    /// Contiguous row range `start..end` of a matrix.
    SliceRows { src: NodeId, start: usize },
}

/// A node on the tape.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub op: Op,
    pub value: Tensor<f64>,
    pub requires_grad: bool,
}

/// Tape on which one forward computation is recorded.
///
/// Every forward call receives its graph explicitly; intermediate tensors
/// live here and nowhere else. A graph is meant for a single sequence on a
/// single thread and is dropped after `backward` (or right away for pure
/// inference).
#[derive(Debug, Default)]
pub struct Graph {
    nodes: RefCell<Vec<Node>>,
    bindings: RefCell<HashMap<String, NodeId>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node and return its id.
    pub(crate) fn push(&self, op: Op, value: Tensor<f64>, requires_grad: bool) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len());
        nodes.push(Node {
            id,
            op,
            value,
            requires_grad,
        });
        id
    }

    pub(crate) fn nodes(&self) -> Ref<'_, Vec<Node>> {
        self.nodes.borrow()
    }

    pub(crate) fn requires_grad(&self, id: NodeId) -> bool {
        self.nodes.borrow()[id.0].requires_grad
    }

    /// Place a constant on the tape. No gradient flows into it.
    pub fn input(&self, data: Tensor<f64>) -> Variable<'_> {
        let node_id = self.push(Op::Leaf, data.clone(), false);
        Variable::from_parts(self, node_id, data)
    }

    /// Place a trainable parameter on the tape.
    ///
    /// Binding the same parameter twice returns the existing node, so all
    /// uses of one weight accumulate into a single gradient.
    pub fn bind(&self, param: &Parameter) -> Variable<'_> {
        if let Some(&id) = self.bindings.borrow().get(param.name()) {
            let value = self.nodes.borrow()[id.0].value.clone();
            return Variable::from_parts(self, id, value);
        }
        let node_id = self.push(Op::Leaf, param.value().clone(), true);
        self.bindings
            .borrow_mut()
            .insert(param.name().to_string(), node_id);
        Variable::from_parts(self, node_id, param.value().clone())
    }

    /// Names of the parameters bound so far, with their node ids.
    pub fn bound_parameters(&self) -> Vec<(String, NodeId)> {
        let mut bound: Vec<(String, NodeId)> = self
            .bindings
            .borrow()
            .iter()
            .map(|(name, &id)| (name.clone(), id))
            .collect();
        bound.sort_by_key(|(_, id)| id.0);
        bound
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_is_idempotent() {
        let g = Graph::new();
        let p = Parameter::new("w", Tensor::ones(vec![2, 2]));
        let a = g.bind(&p);
        let b = g.bind(&p);
        assert_eq!(a.node_id(), b.node_id());
        assert_eq!(g.len(), 1);
        assert_eq!(g.bound_parameters(), vec![("w".to_string(), a.node_id())]);
    }

    #[test]
    fn test_inputs_do_not_require_grad() {
        let g = Graph::new();
        let x = g.input(Tensor::zeros(vec![3]));
        assert!(!g.requires_grad(x.node_id()));
        assert!(g.bound_parameters().is_empty());
    }
}
