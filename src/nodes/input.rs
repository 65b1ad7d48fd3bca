use serde::{Deserialize, Serialize};

use super::{check_non_empty, emitted_vector};
use crate::compiler::CompileSession;
use crate::emitter::FunctionEmitter;
use crate::error::{CompileResult, GraphError, GraphResult, TransformResult};
use crate::graph::{InputPort, ModelTransformer, NodeBehavior, NodeFamily, NodeId, OutputPort};
use crate::value::{ElementType, HostData, ImmediateContext, Vector};

/// Entry point for caller-supplied data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputNode {
    pub ty: ElementType,
    pub size: usize,
}

impl InputNode {
    pub fn new(ty: ElementType, size: usize) -> Self {
        Self { ty, size }
    }
}

impl NodeBehavior for InputNode {
    fn inputs(&self) -> Vec<&InputPort> {
        Vec::new()
    }

    fn inputs_mut(&mut self) -> Vec<&mut InputPort> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![OutputPort::new("output", self.ty, self.size)]
    }

    fn validate(&self) -> GraphResult<()> {
        check_non_empty(self.size, NodeFamily::Input)
    }

    fn refine(&self, _id: NodeId, _transformer: &mut ModelTransformer) -> TransformResult<bool> {
        Ok(false)
    }

    fn compute(
        &mut self,
        _ctx: &mut ImmediateContext,
        _inputs: &[Vector],
        external: Option<&HostData>,
    ) -> GraphResult<Vec<Vector>> {
        let data = external.ok_or(GraphError::InputCountMismatch {
            expected: 1,
            found: 0,
        })?;
        if data.element_type() != self.ty {
            return Err(GraphError::PortTypeMismatch {
                port: "output".to_string(),
                expected: self.ty,
                found: data.element_type(),
            });
        }
        if data.len() != self.size {
            return Err(GraphError::PortSizeMismatch {
                port: "output".to_string(),
                expected: self.size,
                found: data.len(),
            });
        }
        Ok(vec![Vector::from_data(data.clone())])
    }

    fn compile(
        &self,
        id: NodeId,
        session: &mut CompileSession,
        _function: &mut FunctionEmitter<'_>,
        _inputs: &[Vector],
    ) -> CompileResult<Vec<Vector>> {
        let address = session.input_argument(id)?;
        Ok(vec![emitted_vector(self.ty, address, self.size)?])
    }
}
