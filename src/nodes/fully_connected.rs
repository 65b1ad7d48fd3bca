use serde::{Deserialize, Serialize};

use super::{check_arithmetic, input_at, BiasNode, MatrixVectorProductNode, UnaryOperationNode};
use crate::compiler::CompileSession;
use crate::emitter::FunctionEmitter;
use crate::error::{CompileError, CompileResult, GraphError, GraphResult, TransformResult};
use crate::graph::{InputPort, ModelTransformer, NodeBehavior, NodeFamily, NodeId, OutputPort, PortRef};
use crate::value::{
    DimensionOrder, HostData, ImmediateContext, Matrix, MemoryLayout, UnaryOperation, Value, Vector,
};

/// A dense layer: `activation(weights * input + bias)`.
///
/// Refines into a matrix-vector product followed by a [`BiasNode`], which
/// refines further on the next pass, and an optional unary activation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FullyConnectedNode {
    pub input: InputPort,
    pub weights: HostData,
    pub bias: HostData,
    pub rows: usize,
    pub columns: usize,
    pub order: DimensionOrder,
    pub activation: Option<UnaryOperation>,
}

impl FullyConnectedNode {
    pub fn new(
        source: PortRef,
        weights: impl Into<HostData>,
        bias: impl Into<HostData>,
        rows: usize,
        columns: usize,
    ) -> Self {
        Self {
            input: InputPort::new("input", source),
            weights: weights.into(),
            bias: bias.into(),
            rows,
            columns,
            order: DimensionOrder::RowMajor,
            activation: None,
        }
    }

    pub fn with_order(mut self, order: DimensionOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_activation(mut self, activation: UnaryOperation) -> Self {
        self.activation = Some(activation);
        self
    }

    fn output(&self) -> OutputPort {
        OutputPort::new("output", self.input.ty, self.rows)
    }
}

impl NodeBehavior for FullyConnectedNode {
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
        check_arithmetic(self.input.ty, "fully connected")?;
        for (port, data) in [("weights", &self.weights), ("bias", &self.bias)] {
            if data.element_type() != self.input.ty {
                return Err(GraphError::PortTypeMismatch {
                    port: port.to_string(),
                    expected: self.input.ty,
                    found: data.element_type(),
                });
            }
        }
        let sizes = [
            ("weights", self.rows * self.columns, self.weights.len()),
            ("bias", self.rows, self.bias.len()),
            (self.input.name.as_str(), self.columns, self.input.size),
        ];
        for (port, expected, found) in sizes {
            if expected != found {
                return Err(GraphError::PortSizeMismatch {
                    port: port.to_string(),
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    fn is_primitive(&self) -> bool {
        false
    }

    fn refine(&self, id: NodeId, transformer: &mut ModelTransformer) -> TransformResult<bool> {
        let input = transformer.transform_input(&self.input)?;
        let product = transformer.add_node(MatrixVectorProductNode {
            input,
            weights: self.weights.clone(),
            rows: self.rows,
            columns: self.columns,
            order: self.order,
        })?;
        let product = transformer.output(product, 0)?;
        let biased = transformer.add_node(BiasNode::new(product, self.bias.clone()))?;
        let mut result = transformer.output(biased, 0)?;
        if let Some(activation) = self.activation {
            let activated = transformer.add_node(UnaryOperationNode::new(result, activation))?;
            result = transformer.output(activated, 0)?;
        }
        let old = self.output().at(transformer.source_model(), id, 0);
        transformer.map_output(old, result)?;
        Ok(true)
    }

    fn compute(
        &mut self,
        ctx: &mut ImmediateContext,
        inputs: &[Vector],
        _external: Option<&HostData>,
    ) -> GraphResult<Vec<Vector>> {
        let layout = MemoryLayout::matrix(self.rows, self.columns, self.order);
        let weights = Matrix::new(Value::from_data(self.weights.clone(), layout)?)?;
        let output = Vector::allocate(ctx, self.input.ty, self.rows)?;
        weights.multiply_vector(ctx, input_at(inputs, 0, 1)?, &output)?;
        output.add_assign(ctx, &Vector::from_data(self.bias.clone()))?;
        if let Some(activation) = self.activation {
            output.apply(ctx, activation)?;
        }
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
            family: NodeFamily::FullyConnected,
        })
    }
}
