pub mod graph;
pub mod variable;
pub mod parameter;
pub mod backward;

pub use graph::{Graph, NodeId};
pub use variable::Variable;
pub use parameter::Parameter;
pub use backward::{backward, Gradients};
