use serde::{Deserialize, Serialize};

use super::{check_arithmetic, input_at, BinaryOperationNode, ConstantNode};
use crate::compiler::CompileSession;
use crate::emitter::FunctionEmitter;
use crate::error::{CompileError, CompileResult, GraphError, GraphResult, TransformResult};
use crate::graph::{InputPort, ModelTransformer, NodeBehavior, NodeFamily, NodeId, OutputPort, PortRef};
use crate::value::{BinaryOperation, HostData, ImmediateContext, Vector};

/// Adds a fixed bias vector. Refines into a constant and an elementwise add.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiasNode {
    pub input: InputPort,
    pub bias: HostData,
}

impl BiasNode {
    pub fn new(source: PortRef, bias: impl Into<HostData>) -> Self {
        Self {
            input: InputPort::new("input", source),
            bias: bias.into(),
        }
    }

    fn output(&self) -> OutputPort {
        OutputPort::new("output", self.input.ty, self.input.size)
    }
}

impl NodeBehavior for BiasNode {
    fn inputs(&self) -> Vec<&InputPort> {
        vec![&self.input]
    }

    fn inputs_mut(&mut self) -> Vec<&mut InputPort> {
        vec![&mut self.input]
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![self.output()]
    }

    fn validate(&self) -> GraphResult<()> {
        check_arithmetic(self.input.ty, "bias")?;
        if self.bias.element_type() != self.input.ty {
            return Err(GraphError::PortTypeMismatch {
                port: "bias".to_string(),
                expected: self.input.ty,
                found: self.bias.element_type(),
            });
        }
        if self.bias.len() != self.input.size {
            return Err(GraphError::PortSizeMismatch {
                port: "bias".to_string(),
                expected: self.input.size,
                found: self.bias.len(),
            });
        }
        Ok(())
    }

    fn is_primitive(&self) -> bool {
        false
    }

    fn refine(&self, id: NodeId, transformer: &mut ModelTransformer) -> TransformResult<bool> {
        let mut lhs = transformer.transform_input(&self.input)?;
        lhs.name = "lhs".to_string();
        let constant = transformer.add_node(ConstantNode::new(self.bias.clone()))?;
        let rhs = InputPort::new("rhs", transformer.output(constant, 0)?);
        let add = transformer.add_node(BinaryOperationNode {
            lhs,
            rhs,
            operation: BinaryOperation::Add,
        })?;
        let sum = transformer.output(add, 0)?;
        let old = self.output().at(transformer.source_model(), id, 0);
        transformer.map_output(old, sum)?;
        Ok(true)
    }

    fn compute(
        &mut self,
        ctx: &mut ImmediateContext,
        inputs: &[Vector],
        _external: Option<&HostData>,
    ) -> GraphResult<Vec<Vector>> {
        let output = input_at(inputs, 0, 1)?.copy(ctx)?;
        output.add_assign(ctx, &Vector::from_data(self.bias.clone()))?;
        Ok(vec![output])
    }

    fn compile(
        &self,
        id: NodeId,
        _session: &mut CompileSession,
        _function: &mut FunctionEmitter<'_>,
        _inputs: &[Vector],
    ) -> CompileResult<Vec<Vector>> {
        Err(CompileError::NotCompilable {
            node: id,
            family: NodeFamily::Bias,
        })
    }
}
