use std::collections::HashMap;

use oxidize_seq_core::{Tensor, TensorError, TensorResult};

use crate::graph::{NodeId, Op};
use crate::parameter::Parameter;
use crate::variable::Variable;

/// Gradients produced by [`backward`], addressable by node or by parameter.
#[derive(Debug, Clone, Default)]
pub struct Gradients {
    by_node: HashMap<NodeId, Tensor<f64>>,
    by_param: HashMap<String, Tensor<f64>>,
}

impl Gradients {
    /// Gradient with respect to a parameter bound on the graph, if it was used.
    pub fn wrt(&self, param: &Parameter) -> Option<&Tensor<f64>> {
        self.by_param.get(param.name())
    }

    /// Gradient with respect to any recorded variable that requires grad.
    pub fn of(&self, var: &Variable<'_>) -> Option<&Tensor<f64>> {
        self.by_node.get(&var.node_id())
    }

    /// Number of parameters that received a gradient.
    pub fn num_parameters(&self) -> usize {
        self.by_param.len()
    }

    /// L2 norm over all parameter gradients.
    pub fn global_norm(&self) -> f64 {
        self.by_param
            .values()
            .flat_map(|g| g.data().iter())
            .map(|x| x * x)
            .sum::<f64>()
            .sqrt()
    }
}

/// Reverse-mode differentiation of `loss` over the graph it was recorded on.
///
/// A non-scalar `loss` is seeded with ones, i.e. the gradient of its sum.
pub fn backward(loss: &Variable<'_>) -> TensorResult<Gradients> {
    let graph = loss.graph();
    let nodes = graph.nodes();
    let mut grads: HashMap<NodeId, Tensor<f64>> = HashMap::new();
    grads.insert(loss.node_id(), Tensor::ones(loss.shape_vec()));

    for node in nodes[..=loss.node_id().0].iter().rev() {
        let grad = match grads.get(&node.id) {
            Some(g) if node.requires_grad => g.clone(),
            _ => continue,
        };
        let value_of = |id: NodeId| &nodes[id.0].value;
        let mut push = |id: NodeId, g: Tensor<f64>| -> TensorResult<()> {
            if nodes[id.0].requires_grad {
                accumulate_grad(&mut grads, id, g, &nodes[id.0].value.shape_vec())?;
            }
            Ok(())
        };

        match node.op {
            Op::Leaf => {}
            Op::Add(a, b) => {
                push(a, grad.clone())?;
                push(b, grad)?;
            }
            Op::Sub(a, b) => {
                push(a, grad.clone())?;
                push(b, grad.neg())?;
            }
            Op::Mul(a, b) => {
                push(a, grad.mul(value_of(b))?)?;
                push(b, grad.mul(value_of(a))?)?;
            }
            Op::Div(a, b) => {
                let bv = value_of(b);
                push(a, grad.div(bv)?)?;
                // d/db (a / b) = -a / b²
                let gb = grad.mul(value_of(a))?.div(&bv.mul(bv)?)?.neg();
                push(b, gb)?;
            }
            Op::MatMul(a, b) => {
                push(a, grad.matmul(&value_of(b).t()?)?)?;
                push(b, value_of(a).t()?.matmul(&grad)?)?;
            }
            Op::Transpose(a) => push(a, grad.t()?)?,
            Op::Neg(a) => push(a, grad.neg())?,
            Op::Exp(a) => push(a, grad.mul(&node.value)?)?,
            Op::Ln(a) => push(a, grad.div(value_of(a))?)?,
            Op::Pow(a, n) => {
                let local = value_of(a).powf(n - 1.0).mul_scalar(n);
                push(a, grad.mul(&local)?)?;
            }
            Op::MulScalar(a, s) => push(a, grad.mul_scalar(s))?,
            Op::AddScalar(a, _) => push(a, grad)?,
            Op::SumAll(a) => {
                let g = Tensor::full(value_of(a).shape_vec(), grad.item()?);
                push(a, g)?;
            }
            Op::MeanAll(a) => {
                let input = value_of(a);
                let scale = grad.item()? / input.numel() as f64;
                push(a, Tensor::full(input.shape_vec(), scale))?;
            }
            Op::SumRows(a) => {
                // [rows, 1] column broadcast back across every column
                let g = Tensor::ones(value_of(a).shape_vec()).mul(&grad)?;
                push(a, g)?;
            }
            Op::SliceRows { src, start } => {
                let source = value_of(src);
                let cols = source.cols()?;
                let mut g = Tensor::zeros(source.shape_vec());
                let offset = start * cols;
                g.data_mut()[offset..offset + grad.numel()].copy_from_slice(grad.data());
                push(src, g)?;
            }
        }
    }

    let by_param = graph
        .bound_parameters()
        .into_iter()
        .filter_map(|(name, id)| grads.get(&id).map(|g| (name, g.clone())))
        .collect::<HashMap<_, _>>();
    log::trace!(
        "backward over {} nodes, {} parameter gradients",
        nodes.len(),
        by_param.len()
    );

    Ok(Gradients {
        by_node: grads,
        by_param,
    })
}

/// Accumulate gradient into the map, undoing any broadcast first.
fn accumulate_grad(
    grads: &mut HashMap<NodeId, Tensor<f64>>,
    node_id: NodeId,
    incoming: Tensor<f64>,
    target_shape: &[usize],
) -> TensorResult<()> {
    let grad = reduce_broadcast(incoming, target_shape)?;
    match grads.get_mut(&node_id) {
        Some(existing) => *existing = existing.add(&grad)?,
        None => {
            grads.insert(node_id, grad);
        }
    }
    Ok(())
}

/// Reduce a gradient to `target_shape` by summing over broadcast axes.
fn reduce_broadcast(grad: Tensor<f64>, target_shape: &[usize]) -> TensorResult<Tensor<f64>> {
    if grad.shape().dims() == target_shape {
        return Ok(grad);
    }
    if target_shape.is_empty() {
        return Ok(Tensor::scalar(grad.sum_all()));
    }

    let mut result = grad;
    while result.ndim() > target_shape.len() {
        result = result.sum_axis(0)?;
    }
    for (axis, &size) in target_shape.iter().enumerate() {
        if size == 1 && result.shape().dim(axis)? > 1 {
            result = result.sum_axis(axis)?.unsqueeze(axis)?;
        }
    }

    if result.shape().dims() != target_shape {
        if result.numel() != target_shape.iter().product::<usize>() {
            return Err(TensorError::ShapeMismatch {
                expected: target_shape.to_vec(),
                got: result.shape_vec(),
            });
        }
        result = result.reshape(target_shape.to_vec())?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use approx::assert_abs_diff_eq;

    /// Central-difference gradient of `f` with respect to every element of `x`.
    fn numeric_grad<F>(x: &Tensor<f64>, f: F) -> Tensor<f64>
    where
        F: Fn(&Tensor<f64>) -> f64,
    {
        let h = 1e-6;
        let mut out = Tensor::zeros(x.shape_vec());
        for i in 0..x.numel() {
            let mut plus = x.clone();
            plus.data_mut()[i] += h;
            let mut minus = x.clone();
            minus.data_mut()[i] -= h;
            out.data_mut()[i] = (f(&plus) - f(&minus)) / (2.0 * h);
        }
        out
    }

    fn sample() -> Tensor<f64> {
        Tensor::from_vec2d(&[vec![0.3, -1.2, 0.8], vec![1.5, 0.1, -0.4]]).unwrap()
    }

    #[test]
    fn test_simple_gradient() {
        // f(x) = x², df/dx = 2x
        let g = Graph::new();
        let p = Parameter::new("x", Tensor::scalar(3.0));
        let x = g.bind(&p);
        let y = x.mul(&x).unwrap();
        let grads = backward(&y).unwrap();
        assert_abs_diff_eq!(grads.wrt(&p).unwrap().item().unwrap(), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_broadcast_bias_gradient() {
        // f = sum(x + b) with b: [1, 3] broadcast over 2 rows
        let g = Graph::new();
        let b = Parameter::new("b", Tensor::zeros(vec![1, 3]));
        let x = g.input(sample());
        let loss = x.add(&g.bind(&b)).unwrap().sum();
        let grads = backward(&loss).unwrap();
        assert_eq!(grads.wrt(&b).unwrap().data(), &[2.0, 2.0, 2.0]);
        assert!(grads.of(&x).is_none());
    }

    #[test]
    fn test_matmul_gradient_matches_numeric() {
        let w0 = Tensor::from_vec2d(&[vec![0.2, -0.5], vec![0.7, 0.1], vec![-0.3, 0.4]]).unwrap();
        let x = sample();
        let f = |w: &Tensor<f64>| {
            let y = x.matmul(w).unwrap();
            y.mul(&y).unwrap().sum_all()
        };

        let g = Graph::new();
        let p = Parameter::new("w", w0.clone());
        let y = g.input(x.clone()).matmul(&g.bind(&p)).unwrap();
        let loss = y.mul(&y).unwrap().sum();
        let grads = backward(&loss).unwrap();

        let expected = numeric_grad(&w0, f);
        assert!(grads.wrt(&p).unwrap().max_abs_diff(&expected).unwrap() < 1e-5);
    }

    #[test]
    fn test_softmax_gradient_matches_numeric() {
        let weights = Tensor::from_vec2d(&[vec![1.0, -2.0, 0.5], vec![0.3, 0.9, -1.1]]).unwrap();
        let f = |x: &Tensor<f64>| x.softmax().unwrap().mul(&weights).unwrap().sum_all();

        let x0 = sample();
        let g = Graph::new();
        let p = Parameter::new("x", x0.clone());
        let s = g.bind(&p).softmax_rows().unwrap();
        let loss = s.mul(&g.input(weights.clone())).unwrap().sum();
        let grads = backward(&loss).unwrap();

        let expected = numeric_grad(&x0, f);
        assert!(grads.wrt(&p).unwrap().max_abs_diff(&expected).unwrap() < 1e-5);
    }

    #[test]
    fn test_row_normalization_gradient_matches_numeric() {
        let weights = Tensor::from_vec2d(&[vec![0.4, -0.7, 1.3], vec![-0.2, 0.5, 0.9]]).unwrap();
        let eps = 1e-5;
        let f = |x: &Tensor<f64>| {
            let mean = x.mean_axis(1).unwrap().unsqueeze(1).unwrap();
            let var = x.var_axis(1).unwrap().unsqueeze(1).unwrap();
            let norm = x.sub(&mean).unwrap().div(&var.add_scalar(eps).sqrt()).unwrap();
            norm.mul(&weights).unwrap().sum_all()
        };

        let x0 = sample();
        let g = Graph::new();
        let p = Parameter::new("x", x0.clone());
        let x = g.bind(&p);
        let centered = x.sub(&x.mean_rows().unwrap()).unwrap();
        let var = centered.mul(&centered).unwrap().mean_rows().unwrap();
        let norm = centered.div(&var.add_scalar(eps).pow(0.5)).unwrap();
        let loss = norm.mul(&g.input(weights.clone())).unwrap().sum();
        let grads = backward(&loss).unwrap();

        let expected = numeric_grad(&x0, f);
        assert!(grads.wrt(&p).unwrap().max_abs_diff(&expected).unwrap() < 1e-4);
    }

    #[test]
    fn test_slice_rows_gradient() {
        let g = Graph::new();
        let p = Parameter::new("x", sample());
        let loss = g.bind(&p).slice_rows(1, 2).unwrap().sum();
        let grads = backward(&loss).unwrap();
        assert_eq!(grads.wrt(&p).unwrap().data(), &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_shared_parameter_accumulates() {
        // f = sum(w) + sum(w), each use contributes ones
        let g = Graph::new();
        let p = Parameter::new("w", Tensor::zeros(vec![2, 2]));
        let a = g.bind(&p).sum();
        let b = g.bind(&p).sum();
        let grads = backward(&a.add(&b).unwrap()).unwrap();
        assert_eq!(grads.wrt(&p).unwrap().data(), &[2.0; 4]);
        assert_eq!(grads.num_parameters(), 1);
        assert_abs_diff_eq!(grads.global_norm(), 4.0, epsilon = 1e-12);
    }
}
