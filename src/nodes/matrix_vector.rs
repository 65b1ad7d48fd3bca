use serde::{Deserialize, Serialize};

use super::{alignment, check_arithmetic, input_at};
use crate::compiler::CompileSession;
use crate::emitter::FunctionEmitter;
use crate::error::{CompileResult, GraphError, GraphResult, TransformResult, ValueResult};
use crate::graph::{InputPort, ModelTransformer, NodeBehavior, NodeId, OutputPort, PortRef};
use crate::value::{
    DimensionOrder, EmissionContext, ExecutionContext, HostData, ImmediateContext, Matrix,
    MemoryLayout, Value, Vector,
};

/// `output = weights * input` for a fixed `rows x columns` weight matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatrixVectorProductNode {
    pub input: InputPort,
    pub weights: HostData,
    pub rows: usize,
    pub columns: usize,
    pub order: DimensionOrder,
}

impl MatrixVectorProductNode {
    pub fn new(
        source: PortRef,
        weights: impl Into<HostData>,
        rows: usize,
        columns: usize,
        order: DimensionOrder,
    ) -> Self {
        Self {
            input: InputPort::new("input", source),
            weights: weights.into(),
            rows,
            columns,
            order,
        }
    }

    fn layout(&self) -> MemoryLayout {
        MemoryLayout::matrix(self.rows, self.columns, self.order)
    }

    pub fn evaluate(
        &self,
        ctx: &mut dyn ExecutionContext,
        weights: &Matrix,
        input: &Vector,
    ) -> ValueResult<Vector> {
        let output = Vector::allocate(ctx, input.element_type(), self.rows)?;
        weights.multiply_vector(ctx, input, &output)?;
        Ok(output)
    }
}

impl NodeBehavior for MatrixVectorProductNode {
    fn inputs(&self) -> Vec<&InputPort> {
        vec![&self.input]
    }

    fn inputs_mut(&mut self) -> Vec<&mut InputPort> {
        vec![&mut self.input]
    }

    fn outputs(&self) -> Vec<OutputPort> {
        vec![OutputPort::new("output", self.input.ty, self.rows)]
    }

    fn validate(&self) -> GraphResult<()> {
        check_arithmetic(self.input.ty, "matrix-vector product")?;
        if self.weights.element_type() != self.input.ty {
            return Err(GraphError::PortTypeMismatch {
                port: self.input.name.clone(),
                expected: self.weights.element_type(),
                found: self.input.ty,
            });
        }
        if self.weights.len() != self.rows * self.columns {
            return Err(GraphError::PortSizeMismatch {
                port: "weights".to_string(),
                expected: self.rows * self.columns,
                found: self.weights.len(),
            });
        }
        if self.input.size != self.columns {
            return Err(GraphError::PortSizeMismatch {
                port: self.input.name.clone(),
                expected: self.columns,
                found: self.input.size,
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
        let weights = Matrix::new(Value::from_data(self.weights.clone(), self.layout())?)?;
        Ok(vec![self.evaluate(ctx, &weights, input_at(inputs, 0, 1)?)?])
    }

    fn compile(
        &self,
        _id: NodeId,
        _session: &mut CompileSession,
        function: &mut FunctionEmitter<'_>,
        inputs: &[Vector],
    ) -> CompileResult<Vec<Vector>> {
        let ty = self.weights.element_type();
        let address = function.constant_data(self.weights.to_bytes(), alignment(ty))?;
        let weights = Matrix::new(Value::emitted(ty, address).with_layout(self.layout()))?;
        let mut ctx = EmissionContext::new(function);
        Ok(vec![self.evaluate(&mut ctx, &weights, input_at(inputs, 0, 1)?)?])
    }
}
