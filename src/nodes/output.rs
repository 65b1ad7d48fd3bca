use serde::{Deserialize, Serialize};

use super::input_at;
use crate::compiler::CompileSession;
use crate::emitter::FunctionEmitter;
use crate::error::{CompileResult, GraphResult, TransformResult};
use crate::graph::{InputPort, ModelTransformer, NodeBehavior, NodeId, OutputPort, PortRef};
use crate::value::{HostData, ImmediateContext, Vector};

/// Marks a value as a result of the model. Passes its input through.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputNode {
    pub input: InputPort,
}

impl OutputNode {
    pub fn new(source: PortRef) -> Self {
        Self {
            input: InputPort::new("input", source),
        }
    }
}

impl NodeBehavior for OutputNode {
    fn inputs(&self) -> Vec<&InputPort> {
        vec![&self.input]
    }

    fn inputs_mut(&mut self) -> Vec<&mut InputPort> {
        vec![&mut self.input]
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![OutputPort::new("output", self.input.ty, self.input.size)]
    }

    fn refine(&self, _id: NodeId, _transformer: &mut ModelTransformer) -> TransformResult<bool> {
        Ok(false)
    }

    fn compute(
        &mut self,
        _ctx: &mut ImmediateContext,
        inputs: &[Vector],
        _external: Option<&HostData>,
    ) -> GraphResult<Vec<Vector>> {
        Ok(vec![input_at(inputs, 0, 1)?.clone()])
    }

    fn compile(
        &self,
        _id: NodeId,
        _session: &mut CompileSession,
        _function: &mut FunctionEmitter<'_>,
        inputs: &[Vector],
    ) -> CompileResult<Vec<Vector>> {
        Ok(vec![input_at(inputs, 0, 1)?.clone()])
    }
}
