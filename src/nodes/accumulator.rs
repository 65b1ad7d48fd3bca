use serde::{Deserialize, Serialize};

use super::{alignment, check_arithmetic, emitted_vector, input_at};
use crate::compiler::CompileSession;
use crate::emitter::FunctionEmitter;
use crate::error::{CompileResult, GraphError, GraphResult, TransformResult, ValueResult};
use crate::graph::{InputPort, ModelTransformer, NodeBehavior, NodeId, OutputPort, PortRef};
use crate::value::{EmissionContext, ExecutionContext, HostData, ImmediateContext, Vector};

/// Running elementwise sum of its input across invocations.
///
/// Compiled maps keep the sum in a zero-initialized data object that the
/// map's reset function clears.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorNode {
    pub input: InputPort,
    pub state: HostData,
}

impl AccumulatorNode {
    pub fn new(source: PortRef) -> Self {
        Self {
            state: HostData::zeros(source.ty, source.size),
            input: InputPort::new("input", source),
        }
    }

    pub fn evaluate(
        &self,
        ctx: &mut dyn ExecutionContext,
        state: &Vector,
        input: &Vector,
    ) -> ValueResult<Vector> {
        state.add_assign(ctx, input)?;
        state.copy(ctx)
    }
}

impl NodeBehavior for AccumulatorNode {
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
        check_arithmetic(self.input.ty, "accumulate")?;
        if self.state.element_type() != self.input.ty {
            return Err(GraphError::PortTypeMismatch {
                port: "state".to_string(),
                expected: self.input.ty,
                found: self.state.element_type(),
            });
        }
        if self.state.len() != self.input.size {
            return Err(GraphError::PortSizeMismatch {
                port: "state".to_string(),
                expected: self.input.size,
                found: self.state.len(),
            });
        }
        Ok(())
    }

    fn has_state(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.state.clear();
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
        let state = Vector::from_data(self.state.clone());
        let output = self.evaluate(ctx, &state, input_at(inputs, 0, 1)?)?;
        self.state = state.to_host_data()?;
        Ok(vec![output])
    }

    fn compile(
        &self,
        _id: NodeId,
        session: &mut CompileSession,
        function: &mut FunctionEmitter<'_>,
        inputs: &[Vector],
    ) -> CompileResult<Vec<Vector>> {
        let ty = self.input.ty;
        let size = self.input.size;
        let (data, address) = function.state_data(ty.size_in_bytes() * size, alignment(ty))?;
        session.register_state(data, ty, size);
        let state = emitted_vector(ty, address, size)?;
        let mut ctx = EmissionContext::new(function);
        Ok(vec![self.evaluate(&mut ctx, &state, input_at(inputs, 0, 1)?)?])
    }
}
