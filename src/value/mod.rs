//! Dual-mode value algebra.
//!
//! [`Scalar`], [`Vector`] and [`Matrix`] are typed views over a [`Value`].
//! Every operation on them is expressed through an [`ExecutionContext`]:
//! with an [`ImmediateContext`] the operation happens now on host memory,
//! with an [`EmissionContext`] it is emitted as native code. Node
//! implementations write their arithmetic once against these views and get
//! both interpretation and compilation from it.

pub mod context;
pub mod emission;
pub mod immediate;
pub mod layout;
pub mod matrix;
pub mod scalar;
pub mod types;
#[allow(clippy::module_inception)]
pub mod value;
pub mod vector;

pub use context::{ExecutionContext, IndexBody};
pub use emission::EmissionContext;
pub use immediate::ImmediateContext;
pub use layout::{DimensionOrder, MemoryLayout};
pub use matrix::Matrix;
pub use scalar::Scalar;
pub use types::{BinaryOperation, ElementType, HostData, ScalarValue, UnaryOperation};
pub use value::Value;
pub use vector::Vector;

#[cfg(test)]
mod tests;
