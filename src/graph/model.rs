use std::collections::{HashMap, HashSet};
use std::fmt;

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use super::node::{Node, NodeVariant};
use super::port::{InputPort, ModelId, NodeId, OutputPort, PortRef, MAX_NODE_PORTS};
use super::topology::{topological_sort, TopologyError};
use crate::error::{GraphError, GraphResult, ValueError};
use crate::nodes::InputNode;
use crate::value::{ExecutionContext, HostData, ImmediateContext, Vector};

/// Values of every output port after [`Model::compute`], keyed by `(node, output index)`.
pub type PortValues = HashMap<(NodeId, usize), HostData>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeData {
    pub node: Node,
    pub outputs: ArrayVec<OutputPort, MAX_NODE_PORTS>,
}

/// An insertion-ordered dataflow graph.
///
/// Nodes live in a slot map and refer to each other's outputs through
/// [`PortRef`] handles. [`Model::add_node`] only accepts references to nodes
/// that are already present, so a model built through it is acyclic by
/// construction. Deserialized models should be checked with
/// [`Model::validate`].
///
/// Every model carries a [`ModelId`] that its ports are stamped with. A
/// clone keeps the id, so ports taken from a model stay valid in its clones.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "ModelDocument")]
pub struct Model {
    #[serde(skip)]
    id: ModelId,
    nodes: SlotMap<NodeId, NodeData>,
    order: Vec<NodeId>,
}

/// Serialized form of a [`Model`], before it is given an identity.
#[derive(Deserialize)]
struct ModelDocument {
    nodes: SlotMap<NodeId, NodeData>,
    order: Vec<NodeId>,
}

impl From<ModelDocument> for Model {
    fn from(document: ModelDocument) -> Self {
        let id = ModelId::fresh();
        let mut nodes = document.nodes;
        for data in nodes.values_mut() {
            for input in data.node.inputs_mut() {
                for source in &mut input.sources {
                    source.model = id;
                }
            }
        }
        Self {
            id,
            nodes,
            order: document.order,
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Self {
            id: ModelId::fresh(),
            nodes: SlotMap::with_key(),
            order: Vec::new(),
        }
    }
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn add_node(&mut self, node: impl Into<Node>) -> GraphResult<NodeId> {
        let node = node.into();
        let family = node.family();
        node.validate()?;

        let inputs = node.inputs();
        if inputs.len() > MAX_NODE_PORTS {
            return Err(GraphError::TooManyPorts {
                family,
                count: inputs.len(),
                limit: MAX_NODE_PORTS,
            });
        }
        for input in inputs {
            self.check_input(input)?;
        }

        let declared = node.outputs();
        let count = declared.len();
        let outputs: ArrayVec<OutputPort, MAX_NODE_PORTS> = declared
            .into_iter()
            .take(MAX_NODE_PORTS)
            .collect();
        if outputs.len() != count {
            return Err(GraphError::TooManyPorts {
                family,
                count,
                limit: MAX_NODE_PORTS,
            });
        }

        let id = self.nodes.insert(NodeData { node, outputs });
        self.order.push(id);
        log::trace!("added {} node {:?}", family, id);
        Ok(id)
    }

    /// Checks an input port against the producers it references.
    fn check_input(&self, input: &InputPort) -> GraphResult<()> {
        input.check()?;
        for source in &input.sources {
            let producer = self.resolve(input, source)?;
            if producer.ty != source.ty {
                return Err(GraphError::PortTypeMismatch {
                    port: input.name.clone(),
                    expected: producer.ty,
                    found: source.ty,
                });
            }
            if producer.size != source.size {
                return Err(GraphError::PortSizeMismatch {
                    port: input.name.clone(),
                    expected: producer.size,
                    found: source.size,
                });
            }
        }
        Ok(())
    }

    fn resolve(&self, input: &InputPort, source: &PortRef) -> GraphResult<&OutputPort> {
        Some(source)
            .filter(|source| source.model == self.id)
            .and_then(|source| self.nodes.get(source.node))
            .and_then(|data| data.outputs.get(source.index))
            .ok_or_else(|| GraphError::UnresolvedPort {
                port: input.name.clone(),
                node: source.node,
                index: source.index,
            })
    }

    pub fn node(&self, id: NodeId) -> GraphResult<&Node> {
        self.node_data(id).map(|data| &data.node)
    }

    pub fn node_data(&self, id: NodeId) -> GraphResult<&NodeData> {
        self.nodes.get(id).ok_or(GraphError::UnknownNode(id))
    }

    /// Typed access to a node, failing if it belongs to another family.
    pub fn node_as<T: NodeVariant>(&self, id: NodeId) -> GraphResult<&T> {
        self.node(id)?.downcast::<T>()
    }

    pub fn output(&self, id: NodeId, index: usize) -> GraphResult<PortRef> {
        let data = self.node_data(id)?;
        data.outputs
            .get(index)
            .map(|port| port.at(self.id, id, index))
            .ok_or_else(|| GraphError::UnresolvedPort {
                port: format!("output {}", index),
                node: id,
                index,
            })
    }

    pub fn outputs(&self, id: NodeId) -> GraphResult<&[OutputPort]> {
        Ok(&self.node_data(id)?.outputs)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Nodes in insertion order. The iterator is lazy and can be cloned to restart.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + Clone + '_ {
        self.order
            .iter()
            .filter_map(move |&id| self.nodes.get(id).map(|data| (id, &data.node)))
    }

    /// Nodes of one family, in insertion order.
    pub fn nodes_by_type<'a, T: NodeVariant + 'a>(&'a self) -> impl Iterator<Item = (NodeId, &'a T)> + 'a {
        self.nodes()
            .filter_map(|(id, node)| T::from_node(node).map(|typed| (id, typed)))
    }

    /// Distinct producer nodes feeding `id`, in port order.
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.nodes
            .get(id)
            .map(|data| {
                data.node
                    .inputs()
                    .into_iter()
                    .flat_map(|input| input.sources.iter().map(|source| source.node))
                    .filter(|node| seen.insert(*node))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn sort(&self, roots: Vec<NodeId>) -> GraphResult<Vec<NodeId>> {
        topological_sort(roots, |id| self.dependencies(*id)).map_err(
            |TopologyError::CycleDetected { path }| GraphError::CycleDetected { path },
        )
    }

    /// Every node, dependencies first. Independent nodes keep insertion order.
    pub fn topological_order(&self) -> GraphResult<Vec<NodeId>> {
        self.sort(self.order.clone())
    }

    /// `id` and all of its ancestors, dependencies first.
    pub fn visit_ancestors(&self, id: NodeId) -> GraphResult<Vec<NodeId>> {
        self.node_data(id)?;
        self.sort(vec![id])
    }

    /// Re-checks every invariant [`Model::add_node`] enforces, plus acyclicity.
    pub fn validate(&self) -> GraphResult<()> {
        let ordered: HashSet<NodeId> = self.order.iter().copied().collect();
        if let Some(orphan) = self.nodes.keys().find(|id| !ordered.contains(id)) {
            return Err(GraphError::UnknownNode(orphan));
        }
        for &id in &self.order {
            let data = self.node_data(id)?;
            data.node.validate()?;
            if data.node.outputs() != data.outputs.as_slice() {
                return Err(GraphError::UnresolvedPort {
                    port: format!("{} outputs", data.node.family()),
                    node: id,
                    index: data.outputs.len(),
                });
            }
            for input in data.node.inputs() {
                self.check_input(input)?;
            }
        }
        self.topological_order().map(|_| ())
    }

    pub fn has_state(&self) -> bool {
        self.nodes().any(|(_, node)| node.has_state())
    }

    pub fn reset(&mut self) {
        for data in self.nodes.values_mut() {
            data.node.reset();
        }
    }

    /// Whether every node can be compiled without further refinement.
    pub fn is_refined(&self) -> bool {
        self.nodes().all(|(_, node)| node.is_primitive())
    }

    /// Evaluates the model on the host. `inputs` supplies data for every
    /// [`InputNode`].
    pub fn compute(&mut self, inputs: &HashMap<NodeId, HostData>) -> GraphResult<PortValues> {
        let order = self.topological_order()?;
        let mut ctx = ImmediateContext::new();
        let mut values: HashMap<(NodeId, usize), Vector> = HashMap::new();

        for id in order {
            let data = self.nodes.get_mut(id).ok_or(GraphError::UnknownNode(id))?;
            let arguments = data
                .node
                .inputs()
                .into_iter()
                .map(|port| {
                    gather_input(&mut ctx, port, |source| {
                        values
                            .get(&source.key())
                            .cloned()
                            .ok_or_else(|| GraphError::UnresolvedPort {
                                port: port.name.clone(),
                                node: source.node,
                                index: source.index,
                            })
                    })
                })
                .collect::<GraphResult<Vec<_>>>()?;

            let external = if data.node.is::<InputNode>() {
                Some(inputs.get(&id).ok_or(GraphError::MissingInput(id))?)
            } else {
                None
            };
            let results = data.node.compute(&mut ctx, &arguments, external)?;
            if results.len() != data.outputs.len() {
                return Err(GraphError::UnresolvedPort {
                    port: format!("{} outputs", data.node.family()),
                    node: id,
                    index: results.len(),
                });
            }
            for (index, result) in results.into_iter().enumerate() {
                values.insert((id, index), result);
            }
        }

        values
            .into_iter()
            .map(|(key, vector)| Ok((key, vector.to_host_data()?)))
            .collect()
    }
}

/// Assembles the value of an input port from its sources.
///
/// A single source is passed through as a view; several sources are copied
/// into fresh storage in port order.
pub(crate) fn gather_input<E: From<ValueError>>(
    ctx: &mut dyn ExecutionContext,
    port: &InputPort,
    mut lookup: impl FnMut(&PortRef) -> Result<Vector, E>,
) -> Result<Vector, E> {
    if let [source] = port.sources.as_slice() {
        return lookup(source);
    }
    let joined = Vector::allocate(ctx, port.ty, port.size)?;
    let mut offset = 0;
    for source in &port.sources {
        let part = lookup(source)?;
        joined.sub_vector(ctx, offset, source.size)?.assign(ctx, &part)?;
        offset += source.size;
    }
    Ok(joined)
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = self.topological_order().map_err(|_| fmt::Error)?;
        for id in order {
            let Some(data) = self.nodes.get(id) else {
                continue;
            };
            write!(f, "{:?} {}(", id, data.node.family())?;
            for (i, input) in data.node.inputs().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: ", input.name)?;
                for (j, source) in input.sources.iter().enumerate() {
                    if j > 0 {
                        write!(f, " ++ ")?;
                    }
                    write!(f, "{}", source)?;
                }
            }
            write!(f, ") ->")?;
            for output in &data.outputs {
                write!(f, " {}<{:?};{}>", output.name, output.ty, output.size)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
