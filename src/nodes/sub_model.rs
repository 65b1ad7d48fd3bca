use serde::{Deserialize, Serialize};

use crate::compiler::CompileSession;
use crate::emitter::FunctionEmitter;
use crate::error::{CompileResult, GraphError, GraphResult, TransformResult, ValueResult};
use crate::graph::{InputPort, Map, ModelTransformer, NodeBehavior, NodeId, OutputPort, PortRef};
use crate::value::{EmissionContext, HostData, ImmediateContext, Vector};

/// Evaluates a nested [`Map`] as a single node.
///
/// Compiled as a separate function that the parent calls with pointers to
/// the argument and result buffers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubModelNode {
    pub inputs: Vec<InputPort>,
    pub map: Box<Map>,
}

impl SubModelNode {
    /// Binds `sources[i]` to the i-th input of `map`.
    pub fn new(map: Map, sources: &[PortRef]) -> Self {
        let inputs = map
            .inputs()
            .iter()
            .zip(sources)
            .map(|(input, &source)| InputPort::new(input.name.clone(), source))
            .collect();
        Self {
            inputs,
            map: Box::new(map),
        }
    }

    pub fn map(&self) -> &Map {
        &self.map
    }
}

impl NodeBehavior for SubModelNode {
    fn inputs(&self) -> Vec<&InputPort> {
        self.inputs.iter().collect()
    }

    fn inputs_mut(&mut self) -> Vec<&mut InputPort> {
        self.inputs.iter_mut().collect()
    }

    fn outputs(&self) -> Vec<OutputPort> {
        self.map
            .outputs()
            .iter()
            .map(|output| OutputPort::new(output.name.clone(), output.port.ty, output.port.size))
            .collect()
    }

    fn validate(&self) -> GraphResult<()> {
        self.map.validate()?;
        let expected = self.map.inputs();
        if expected.len() != self.inputs.len() {
            return Err(GraphError::InputCountMismatch {
                expected: expected.len(),
                found: self.inputs.len(),
            });
        }
        for (port, input) in self.inputs.iter().zip(expected) {
            if port.ty != input.ty {
                return Err(GraphError::PortTypeMismatch {
                    port: port.name.clone(),
                    expected: input.ty,
                    found: port.ty,
                });
            }
            if port.size != input.size {
                return Err(GraphError::PortSizeMismatch {
                    port: port.name.clone(),
                    expected: input.size,
                    found: port.size,
                });
            }
        }
        Ok(())
    }

    fn has_state(&self) -> bool {
        self.map.has_state()
    }

    fn reset(&mut self) {
        self.map.reset();
    }

    fn is_primitive(&self) -> bool {
        self.map.model().is_refined()
    }

    fn refine(&self, id: NodeId, transformer: &mut ModelTransformer) -> TransformResult<bool> {
        let map = self.map.refine(transformer.context())?;
        let inputs = self
            .inputs
            .iter()
            .map(|input| transformer.transform_input(input))
            .collect::<TransformResult<Vec<_>>>()?;
        let outputs = self.outputs();
        let new_id = transformer.add_node(SubModelNode {
            inputs,
            map: Box::new(map),
        })?;
        for (index, port) in outputs.iter().enumerate() {
            let new_port = transformer.output(new_id, index)?;
            let old = port.at(transformer.source_model(), id, index);
            transformer.map_output(old, new_port)?;
        }
        Ok(true)
    }

    fn compute(
        &mut self,
        _ctx: &mut ImmediateContext,
        inputs: &[Vector],
        _external: Option<&HostData>,
    ) -> GraphResult<Vec<Vector>> {
        let arguments = inputs
            .iter()
            .map(Vector::to_host_data)
            .collect::<ValueResult<Vec<_>>>()?;
        let results = self.map.compute(&arguments)?;
        Ok(results.into_iter().map(Vector::from_data).collect())
    }

    fn compile(
        &self,
        id: NodeId,
        session: &mut CompileSession,
        function: &mut FunctionEmitter<'_>,
        inputs: &[Vector],
    ) -> CompileResult<Vec<Vector>> {
        let callee = session.callee(id)?;
        let mut arguments = inputs
            .iter()
            .map(|input| input.value().emitted_address())
            .collect::<ValueResult<Vec<_>>>()?;

        let mut ctx = EmissionContext::new(function);
        let results = self
            .map
            .outputs()
            .iter()
            .map(|output| Vector::allocate(&mut ctx, output.port.ty, output.port.size))
            .collect::<ValueResult<Vec<_>>>()?;
        for result in &results {
            arguments.push(result.value().emitted_address()?);
        }

        function.call(callee, &arguments);
        Ok(results)
    }
}
