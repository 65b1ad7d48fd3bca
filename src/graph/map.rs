use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::model::Model;
use super::port::{NodeId, PortRef};
use super::transform::{ModelTransformer, PortMap, TransformContext};
use crate::error::{GraphError, GraphResult, TransformError, TransformResult};
use crate::nodes::InputNode;
use crate::value::{ElementType, HostData};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapInput {
    pub name: String,
    pub node: NodeId,
    pub ty: ElementType,
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapOutput {
    pub name: String,
    pub port: PortRef,
}

/// A model with named, ordered inputs and outputs.
///
/// Inputs bind [`InputNode`]s, outputs bind arbitrary output ports. A map is
/// the unit that [`MapCompiler`](crate::compiler::MapCompiler) turns into one
/// native function, whose arguments follow the input order and then the
/// output order.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "MapDocument")]
pub struct Map {
    model: Model,
    inputs: Vec<MapInput>,
    outputs: Vec<MapOutput>,
}

#[derive(Deserialize)]
struct MapDocument {
    model: Model,
    inputs: Vec<MapInput>,
    outputs: Vec<MapOutput>,
}

impl From<MapDocument> for Map {
    fn from(document: MapDocument) -> Self {
        let MapDocument {
            model,
            inputs,
            mut outputs,
        } = document;
        for output in &mut outputs {
            output.port.model = model.id();
        }
        Self {
            model,
            inputs,
            outputs,
        }
    }
}

impl Map {
    pub fn new(
        model: Model,
        inputs: &[(&str, NodeId)],
        outputs: &[(&str, PortRef)],
    ) -> GraphResult<Self> {
        let inputs = inputs
            .iter()
            .map(|&(name, node)| {
                let input = model.node_as::<InputNode>(node)?;
                Ok(MapInput {
                    name: name.to_string(),
                    node,
                    ty: input.ty,
                    size: input.size,
                })
            })
            .collect::<GraphResult<Vec<_>>>()?;
        let outputs = outputs
            .iter()
            .map(|&(name, port)| MapOutput {
                name: name.to_string(),
                port,
            })
            .collect();
        let map = Self {
            model,
            inputs,
            outputs,
        };
        map.validate()?;
        Ok(map)
    }

    /// Checks the model and every binding.
    pub fn validate(&self) -> GraphResult<()> {
        self.model.validate()?;

        let mut names = HashSet::new();
        let invalid = |name: &str, reason: &str| GraphError::InvalidMapBinding {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        for name in self
            .inputs
            .iter()
            .map(|input| &input.name)
            .chain(self.outputs.iter().map(|output| &output.name))
        {
            if !names.insert(name.as_str()) {
                return Err(invalid(name, "duplicate name"));
            }
        }

        let mut bound = HashSet::new();
        for input in &self.inputs {
            let node = self.model.node_as::<InputNode>(input.node)?;
            if node.ty != input.ty || node.size != input.size {
                return Err(invalid(&input.name, "signature differs from its input node"));
            }
            if !bound.insert(input.node) {
                return Err(invalid(&input.name, "input node bound twice"));
            }
        }
        if let Some((node, _)) = self
            .model
            .nodes_by_type::<InputNode>()
            .find(|(id, _)| !bound.contains(id))
        {
            return Err(GraphError::MissingInput(node));
        }

        for output in &self.outputs {
            let port = self.model.output(output.port.node, output.port.index)?;
            if port != output.port {
                return Err(invalid(&output.name, "port type or size differs from the model"));
            }
        }
        Ok(())
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn inputs(&self) -> &[MapInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[MapOutput] {
        &self.outputs
    }

    pub fn has_state(&self) -> bool {
        self.model.has_state()
    }

    pub fn reset(&mut self) {
        self.model.reset();
    }

    /// Evaluates the map on the host; one value per declared input, in order.
    pub fn compute(&mut self, inputs: &[HostData]) -> GraphResult<Vec<HostData>> {
        if inputs.len() != self.inputs.len() {
            return Err(GraphError::InputCountMismatch {
                expected: self.inputs.len(),
                found: inputs.len(),
            });
        }
        let bound: HashMap<NodeId, HostData> = self
            .inputs
            .iter()
            .zip(inputs)
            .map(|(input, data)| (input.node, data.clone()))
            .collect();

        let values = self.model.compute(&bound)?;
        self.outputs
            .iter()
            .map(|output| {
                values
                    .get(&output.port.key())
                    .cloned()
                    .ok_or_else(|| GraphError::UnresolvedPort {
                        port: output.name.clone(),
                        node: output.port.node,
                        index: output.port.index,
                    })
            })
            .collect()
    }

    /// A copy of this map built through a [`ModelTransformer`].
    pub fn copy(&self) -> TransformResult<Map> {
        let mut transformer = ModelTransformer::default();
        let (model, ports) = transformer.copy_model(&self.model)?;
        self.rebind(model, &ports)
    }

    /// This map with every composite node refined into primitives.
    pub fn refine(&self, context: &TransformContext) -> TransformResult<Map> {
        let mut transformer = ModelTransformer::new(*context);
        let (model, ports) = transformer.refine_model(&self.model)?;
        self.rebind(model, &ports)
    }

    fn rebind(&self, model: Model, ports: &PortMap) -> TransformResult<Map> {
        let unmapped = |port: &PortRef| TransformError::UnmappedOutput {
            node: port.node,
            port: port.index,
        };
        let mut inputs = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let old = self.model.output(input.node, 0)?;
            let new = ports.get(&old).ok_or_else(|| unmapped(&old))?;
            inputs.push(MapInput {
                node: new.node,
                ..input.clone()
            });
        }
        let mut outputs = Vec::with_capacity(self.outputs.len());
        for output in &self.outputs {
            let port = ports.get(&output.port).ok_or_else(|| unmapped(&output.port))?;
            outputs.push(MapOutput {
                name: output.name.clone(),
                port,
            });
        }
        let map = Map {
            model,
            inputs,
            outputs,
        };
        map.validate()?;
        Ok(map)
    }
}
