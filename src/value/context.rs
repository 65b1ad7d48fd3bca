use super::layout::MemoryLayout;
use super::scalar::Scalar;
use super::types::{BinaryOperation, ElementType, UnaryOperation};
use super::value::Value;
use crate::error::ValueResult;

/// Loop body handed to [`ExecutionContext::for_each`]; receives one index
/// scalar per dimension.
pub type IndexBody<'b> = dyn FnMut(&mut dyn ExecutionContext, &[Scalar]) -> ValueResult<()> + 'b;

/// The primitive operations every value-algebra operation reduces to.
///
/// [`ImmediateContext`](super::ImmediateContext) performs them on host memory;
/// [`EmissionContext`](super::EmissionContext) emits native instructions that
/// perform them when the generated function runs. Algorithms written against
/// this trait therefore run or compile from the same source.
pub trait ExecutionContext {
    fn name(&self) -> &'static str;

    /// Fresh zero-initialized storage for `layout`.
    fn allocate(&mut self, ty: ElementType, layout: &MemoryLayout) -> ValueResult<Value>;

    /// The same view moved to the element at `indices`. The layout is kept.
    fn offset(&mut self, value: &Value, indices: &[Scalar]) -> ValueResult<Value>;

    fn binary(&mut self, op: BinaryOperation, lhs: &Scalar, rhs: &Scalar) -> ValueResult<Scalar>;

    fn unary(&mut self, op: UnaryOperation, operand: &Scalar) -> ValueResult<Scalar>;

    /// Writes `source` into the addressable scalar `destination`.
    fn store(&mut self, destination: &Scalar, source: &Scalar) -> ValueResult<()>;

    /// Runs `body` for every index tuple of `layout` in row-major logical order.
    fn for_each(&mut self, layout: &MemoryLayout, body: &mut IndexBody<'_>) -> ValueResult<()>;
}
