use serde::{Deserialize, Serialize};

use super::{alignment, check_non_empty, emitted_vector};
use crate::compiler::CompileSession;
use crate::emitter::FunctionEmitter;
use crate::error::{CompileResult, GraphResult, TransformResult};
use crate::graph::{InputPort, ModelTransformer, NodeBehavior, NodeFamily, NodeId, OutputPort};
use crate::value::{HostData, ImmediateContext, Vector};

/// A fixed vector, emitted as read-only data when compiled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantNode {
    pub values: HostData,
}

impl ConstantNode {
    pub fn new(values: impl Into<HostData>) -> Self {
        Self {
            values: values.into(),
        }
    }
}

impl NodeBehavior for ConstantNode {
    fn inputs(&self) -> Vec<&InputPort> {
        Vec::new()
    }

    fn inputs_mut(&mut self) -> Vec<&mut InputPort> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![OutputPort::new(
            "output",
            self.values.element_type(),
            self.values.len(),
        )]
    }

    fn validate(&self) -> GraphResult<()> {
        check_non_empty(self.values.len(), NodeFamily::Constant)
    }

    fn refine(&self, _id: NodeId, _transformer: &mut ModelTransformer) -> TransformResult<bool> {
        Ok(false)
    }

    fn compute(
        &mut self,
        _ctx: &mut ImmediateContext,
        _inputs: &[Vector],
        _external: Option<&HostData>,
    ) -> GraphResult<Vec<Vector>> {
        Ok(vec![Vector::from_data(self.values.clone())])
    }

    fn compile(
        &self,
        _id: NodeId,
        _session: &mut CompileSession,
        function: &mut FunctionEmitter<'_>,
        _inputs: &[Vector],
    ) -> CompileResult<Vec<Vector>> {
        let ty = self.values.element_type();
        let address = function.constant_data(self.values.to_bytes(), alignment(ty))?;
        Ok(vec![emitted_vector(ty, address, self.values.len())?])
    }
}
