use serde::{Deserialize, Serialize};

use super::{check_arithmetic, input_at};
use crate::compiler::CompileSession;
use crate::emitter::FunctionEmitter;
use crate::error::{CompileResult, GraphError, GraphResult, TransformResult, ValueResult};
use crate::graph::{InputPort, ModelTransformer, NodeBehavior, NodeId, OutputPort, PortRef};
use crate::value::{
    BinaryOperation, EmissionContext, ExecutionContext, HostData, ImmediateContext, Vector,
};

/// Elementwise `lhs op rhs`. A one-element `rhs` is broadcast over `lhs`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinaryOperationNode {
    pub lhs: InputPort,
    pub rhs: InputPort,
    pub operation: BinaryOperation,
}

impl BinaryOperationNode {
    pub fn new(lhs: PortRef, rhs: PortRef, operation: BinaryOperation) -> Self {
        Self {
            lhs: InputPort::new("lhs", lhs),
            rhs: InputPort::new("rhs", rhs),
            operation,
        }
    }

    pub fn evaluate(
        &self,
        ctx: &mut dyn ExecutionContext,
        lhs: &Vector,
        rhs: &Vector,
    ) -> ValueResult<Vector> {
        let output = lhs.copy(ctx)?;
        if rhs.size() == 1 && lhs.size() != 1 {
            let scalar = rhs.at(ctx, 0usize)?;
            output.update_scalar(ctx, self.operation, &scalar)?;
        } else {
            output.update(ctx, self.operation, rhs)?;
        }
        Ok(output)
    }
}

impl NodeBehavior for BinaryOperationNode {
    fn inputs(&self) -> Vec<&InputPort> {
        vec![&self.lhs, &self.rhs]
    }

    fn inputs_mut(&mut self) -> Vec<&mut InputPort> {
        vec![&mut self.lhs, &mut self.rhs]
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![OutputPort::new("output", self.lhs.ty, self.lhs.size)]
    }

    fn validate(&self) -> GraphResult<()> {
        check_arithmetic(self.lhs.ty, self.operation.name())?;
        if self.rhs.ty != self.lhs.ty {
            return Err(GraphError::PortTypeMismatch {
                port: self.rhs.name.clone(),
                expected: self.lhs.ty,
                found: self.rhs.ty,
            });
        }
        if self.rhs.size != self.lhs.size && self.rhs.size != 1 {
            return Err(GraphError::PortSizeMismatch {
                port: self.rhs.name.clone(),
                expected: self.lhs.size,
                found: self.rhs.size,
            });
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
        let (lhs, rhs) = (input_at(inputs, 0, 2)?, input_at(inputs, 1, 2)?);
        Ok(vec![self.evaluate(ctx, lhs, rhs)?])
    }

    fn compile(
        &self,
        _id: NodeId,
        _session: &mut CompileSession,
        function: &mut FunctionEmitter<'_>,
        inputs: &[Vector],
    ) -> CompileResult<Vec<Vector>> {
        let (lhs, rhs) = (input_at(inputs, 0, 2)?, input_at(inputs, 1, 2)?);
        let mut ctx = EmissionContext::new(function);
        Ok(vec![self.evaluate(&mut ctx, lhs, rhs)?])
    }
}
