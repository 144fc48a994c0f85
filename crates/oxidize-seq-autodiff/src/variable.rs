use std::fmt;

use oxidize_seq_core::{Tensor, TensorError, TensorResult};

use crate::graph::{Graph, NodeId, Op};

/// A tensor recorded on a [`Graph`].
///
/// Variables are cheap handles: the value is kept alongside the node id so
/// forward code can inspect shapes without touching the tape.
#[derive(Clone)]
pub struct Variable<'g> {
    graph: &'g Graph,
    node_id: NodeId,
    data: Tensor<f64>,
}

impl fmt::Debug for Variable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("node_id", &self.node_id)
            .field("shape", &self.data.shape_vec())
            .finish()
    }
}

impl<'g> Variable<'g> {
    pub(crate) fn from_parts(graph: &'g Graph, node_id: NodeId, data: Tensor<f64>) -> Self {
        Variable {
            graph,
            node_id,
            data,
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn data(&self) -> &Tensor<f64> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<f64> {
        self.data
    }

    pub fn shape_vec(&self) -> Vec<usize> {
        self.data.shape_vec()
    }

    fn unary(&self, op: Op, result: Tensor<f64>) -> Variable<'g> {
        let requires_grad = self.graph.requires_grad(self.node_id);
        let node_id = self.graph.push(op, result.clone(), requires_grad);
        Variable::from_parts(self.graph, node_id, result)
    }

    fn binary(&self, other: &Variable<'g>, op: Op, result: Tensor<f64>) -> TensorResult<Variable<'g>> {
        if !std::ptr::eq(self.graph, other.graph) {
            return Err(TensorError::InvalidOperation(
                "operands are recorded on different graphs".to_string(),
            ));
        }
        let requires_grad =
            self.graph.requires_grad(self.node_id) || self.graph.requires_grad(other.node_id);
        let node_id = self.graph.push(op, result.clone(), requires_grad);
        Ok(Variable::from_parts(self.graph, node_id, result))
    }

    /// Element-wise addition.
    pub fn add(&self, other: &Variable<'g>) -> TensorResult<Variable<'g>> {
        let result = self.data.add(&other.data)?;
        self.binary(other, Op::Add(self.node_id, other.node_id), result)
    }

    /// Element-wise subtraction.
    pub fn sub(&self, other: &Variable<'g>) -> TensorResult<Variable<'g>> {
        let result = self.data.sub(&other.data)?;
        self.binary(other, Op::Sub(self.node_id, other.node_id), result)
    }

    /// Element-wise multiplication.
    pub fn mul(&self, other: &Variable<'g>) -> TensorResult<Variable<'g>> {
        let result = self.data.mul(&other.data)?;
        self.binary(other, Op::Mul(self.node_id, other.node_id), result)
    }

    /// Element-wise division.
    pub fn div(&self, other: &Variable<'g>) -> TensorResult<Variable<'g>> {
        let result = self.data.div(&other.data)?;
        self.binary(other, Op::Div(self.node_id, other.node_id), result)
    }

    /// Matrix multiplication.
    pub fn matmul(&self, other: &Variable<'g>) -> TensorResult<Variable<'g>> {
        let result = self.data.matmul(&other.data)?;
        self.binary(other, Op::MatMul(self.node_id, other.node_id), result)
    }

    /// Matrix transpose.
    pub fn t(&self) -> TensorResult<Variable<'g>> {
        let result = self.data.t()?;
        Ok(self.unary(Op::Transpose(self.node_id), result))
    }

    pub fn neg(&self) -> Variable<'g> {
        self.unary(Op::Neg(self.node_id), self.data.neg())
    }

    pub fn exp(&self) -> Variable<'g> {
        self.unary(Op::Exp(self.node_id), self.data.exp())
    }

    pub fn ln(&self) -> Variable<'g> {
        self.unary(Op::Ln(self.node_id), self.data.ln())
    }

    /// Element-wise power with a scalar exponent.
    pub fn pow(&self, n: f64) -> Variable<'g> {
        self.unary(Op::Pow(self.node_id, n), self.data.powf(n))
    }

    pub fn mul_scalar(&self, s: f64) -> Variable<'g> {
        self.unary(Op::MulScalar(self.node_id, s), self.data.mul_scalar(s))
    }

    pub fn add_scalar(&self, s: f64) -> Variable<'g> {
        self.unary(Op::AddScalar(self.node_id, s), self.data.add_scalar(s))
    }

    /// Sum of all elements.
    pub fn sum(&self) -> Variable<'g> {
        let result = Tensor::scalar(self.data.sum_all());
        self.unary(Op::SumAll(self.node_id), result)
    }

    /// Mean of all elements.
    pub fn mean(&self) -> Variable<'g> {
        let result = Tensor::scalar(self.data.mean_all());
        self.unary(Op::MeanAll(self.node_id), result)
    }

    /// Per-row sum of a matrix as an `[rows, 1]` column.
    pub fn sum_rows(&self) -> TensorResult<Variable<'g>> {
        let rows = self.data.rows()?;
        let result = self.data.sum_axis(1)?.reshape(vec![rows, 1])?;
        Ok(self.unary(Op::SumRows(self.node_id), result))
    }

    /// Per-row mean of a matrix as an `[rows, 1]` column.
    pub fn mean_rows(&self) -> TensorResult<Variable<'g>> {
        let cols = self.data.cols()?;
        Ok(self.sum_rows()?.mul_scalar(1.0 / cols as f64))
    }

    /// Rows `start..end` of a matrix.
    pub fn slice_rows(&self, start: usize, end: usize) -> TensorResult<Variable<'g>> {
        let result = self.data.slice_rows(start, end)?;
        Ok(self.unary(
            Op::SliceRows {
                src: self.node_id,
                start,
            },
            result,
        ))
    }

    /// Softmax over the last axis of a matrix.
    ///
    /// The row maximum is subtracted as a constant; softmax is invariant to
    /// that shift, so the gradient is unaffected.
    pub fn softmax_rows(&self) -> TensorResult<Variable<'g>> {
        let shifted = self.shift_by_row_max()?;
        let e = shifted.exp();
        let denom = e.sum_rows()?;
        e.div(&denom)
    }

    /// Log-softmax over the last axis of a matrix.
    pub fn log_softmax_rows(&self) -> TensorResult<Variable<'g>> {
        let shifted = self.shift_by_row_max()?;
        let log_denom = shifted.exp().sum_rows()?.ln();
        shifted.sub(&log_denom)
    }

    fn shift_by_row_max(&self) -> TensorResult<Variable<'g>> {
        let rows = self.data.rows()?;
        let max = self.data.max_axis(1)?.reshape(vec![rows, 1])?;
        self.sub(&self.graph.input(max))
    }
}
