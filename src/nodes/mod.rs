//! Node families.
//!
//! Each family is a plain parameter record implementing
//! [`NodeBehavior`](crate::graph::NodeBehavior). Primitive families write
//! their arithmetic once in an `evaluate` function over
//! [`ExecutionContext`] and call it from both `compute` and `compile`.
pub mod accumulator;
pub mod bias;
pub mod binary;
pub mod constant;
pub mod fully_connected;
pub mod input;
pub mod matrix_vector;
pub mod output;
pub mod sub_model;
pub mod unary;

pub use accumulator::AccumulatorNode;
pub use bias::BiasNode;
pub use binary::BinaryOperationNode;
pub use constant::ConstantNode;
pub use fully_connected::FullyConnectedNode;
pub use input::InputNode;
pub use matrix_vector::MatrixVectorProductNode;
pub use output::OutputNode;
pub use sub_model::SubModelNode;
pub use unary::UnaryOperationNode;

use cranelift::codegen::ir;

use crate::error::{GraphError, GraphResult, ValueError, ValueResult};
use crate::graph::NodeFamily;
use crate::value::{ElementType, MemoryLayout, Value, Vector};

/// A packed vector of `size` elements at an emitted address.
pub(crate) fn emitted_vector(ty: ElementType, address: ir::Value, size: usize) -> ValueResult<Vector> {
    Vector::new(Value::emitted(ty, address).with_layout(MemoryLayout::vector(size)))
}

pub(crate) fn input_at(inputs: &[Vector], index: usize, expected: usize) -> GraphResult<&Vector> {
    if inputs.len() != expected {
        return Err(GraphError::InputCountMismatch {
            expected,
            found: inputs.len(),
        });
    }
    inputs.get(index).ok_or(GraphError::InputCountMismatch {
        expected,
        found: inputs.len(),
    })
}

/// Alignment of a data object holding elements of `ty`.
pub(crate) fn alignment(ty: ElementType) -> u64 {
    ty.size_in_bytes() as u64
}

/// Rejects element types that have no arithmetic.
pub(crate) fn check_arithmetic(ty: ElementType, operation: &'static str) -> GraphResult<()> {
    if ty == ElementType::Boolean {
        return Err(ValueError::UnsupportedOperation { operation, ty }.into());
    }
    Ok(())
}

pub(crate) fn check_non_empty(size: usize, family: NodeFamily) -> GraphResult<()> {
    if size == 0 {
        return Err(GraphError::EmptyPort { family });
    }
    Ok(())
}

#[cfg(test)]
mod tests;
