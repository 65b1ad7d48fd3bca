use serde::{Deserialize, Serialize};

use super::{check_arithmetic, input_at};
use crate::compiler::CompileSession;
use crate::emitter::FunctionEmitter;
use crate::error::{CompileResult, GraphResult, TransformResult, ValueError, ValueResult};
use crate::graph::{InputPort, ModelTransformer, NodeBehavior, NodeId, OutputPort, PortRef};
use crate::value::{
    EmissionContext, ExecutionContext, HostData, ImmediateContext, UnaryOperation, Vector,
};

/// Applies a unary operation to every element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnaryOperationNode {
    pub input: InputPort,
    pub operation: UnaryOperation,
}

impl UnaryOperationNode {
    pub fn new(source: PortRef, operation: UnaryOperation) -> Self {
        Self {
            input: InputPort::new("input", source),
            operation,
        }
    }

    pub fn evaluate(&self, ctx: &mut dyn ExecutionContext, input: &Vector) -> ValueResult<Vector> {
        let output = input.copy(ctx)?;
        output.apply(ctx, self.operation)?;
        Ok(output)
    }
}

impl NodeBehavior for UnaryOperationNode {
    fn inputs(&self) -> Vec<&InputPort> {
        vec![&self.input]
    }

    fn inputs_mut(&mut self) -> Vec<&mut InputPort> {
        vec![&mut self.input]
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![OutputPort::new("output", self.input.ty, self.input.size)]
    }

    fn validate(&self) -> GraphResult<()> {
        check_arithmetic(self.input.ty, self.operation.name())?;
        if self.operation == UnaryOperation::Sqrt && !self.input.ty.is_float() {
            return Err(ValueError::UnsupportedOperation {
                operation: self.operation.name(),
                ty: self.input.ty,
            }
            .into());
        }
        Ok(())
    }

    fn refine(&self, _id: NodeId, _transformer: &mut ModelTransformer) -> TransformResult<bool> {
        Ok(false)
    }

    fn compute(
        &mut self,
        ctx: &mut ImmediateContext,
        inputs: &[Vector],
        _external: Option<&HostData>,
    ) -> GraphResult<Vec<Vector>> {
        Ok(vec![self.evaluate(ctx, input_at(inputs, 0, 1)?)?])
    }

    fn compile(
        &self,
        _id: NodeId,
        _session: &mut CompileSession,
        function: &mut FunctionEmitter<'_>,
        inputs: &[Vector],
    ) -> CompileResult<Vec<Vector>> {
        let mut ctx = EmissionContext::new(function);
        Ok(vec![self.evaluate(&mut ctx, input_at(inputs, 0, 1)?)?])
    }
}
