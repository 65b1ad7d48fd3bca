use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::model::Model;
use super::node::Node;
use super::port::{InputPort, ModelId, NodeId, PortRef};
use crate::error::{TransformError, TransformResult};

pub const DEFAULT_REFINEMENT_ITERATIONS: usize = 10;

/// Settings shared by every pass of a transformation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformContext {
    /// Upper bound on refinement passes before giving up.
    pub max_refinement_iterations: usize,
}

impl Default for TransformContext {
    fn default() -> Self {
        Self {
            max_refinement_iterations: DEFAULT_REFINEMENT_ITERATIONS,
        }
    }
}

/// Correspondence between the ports of a source model and a model built from it.
#[derive(Clone, Debug, Default)]
pub struct PortMap {
    ports: HashMap<(NodeId, usize), PortRef>,
    origins: HashMap<NodeId, NodeId>,
}

impl PortMap {
    /// Maps every port of `model` onto itself.
    pub fn identity(model: &Model) -> Self {
        let mut map = Self::default();
        for (id, _) in model.nodes() {
            map.origins.insert(id, id);
            if let Ok(outputs) = model.outputs(id) {
                for (index, port) in outputs.iter().enumerate() {
                    map.ports.insert((id, index), port.at(model.id(), id, index));
                }
            }
        }
        map
    }

    /// Port in the new model that replaced `old`.
    pub fn get(&self, old: &PortRef) -> Option<PortRef> {
        self.ports.get(&old.key()).copied()
    }

    /// Source node that `node` in the new model was created for.
    pub fn origin(&self, node: NodeId) -> Option<NodeId> {
        self.origins.get(&node).copied()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// `self` followed by `next`: maps ports of the model `self` started from
    /// onto ports of the model `next` produced.
    pub fn compose(&self, next: &PortMap) -> PortMap {
        let ports = self
            .ports
            .iter()
            .filter_map(|(&key, middle)| next.get(middle).map(|port| (key, port)))
            .collect();
        let origins = next
            .origins
            .iter()
            .map(|(&node, middle)| (node, self.origin(*middle).unwrap_or(*middle)))
            .collect();
        PortMap { ports, origins }
    }
}

/// Builds a new [`Model`] from an old one, node by node.
///
/// Each source node is visited in topological order and asked to add its
/// replacement through [`ModelTransformer::add_node`], rewiring its inputs
/// with [`ModelTransformer::transform_input`] and registering every one of
/// its outputs with [`ModelTransformer::map_output`]. A node that leaves an
/// output unmapped aborts the pass.
#[derive(Debug, Default)]
pub struct ModelTransformer {
    context: TransformContext,
    source: ModelId,
    model: Model,
    ports: PortMap,
    current: Option<NodeId>,
}

impl ModelTransformer {
    pub fn new(context: TransformContext) -> Self {
        Self {
            context,
            ..Default::default()
        }
    }

    pub fn context(&self) -> &TransformContext {
        &self.context
    }

    /// One-to-one copy of `model`.
    pub fn copy_model(&mut self, model: &Model) -> TransformResult<(Model, PortMap)> {
        let (copy, ports, _) = self.pass(model, false)?;
        Ok((copy, ports))
    }

    /// Refines `model` until no node expands any further.
    ///
    /// Fails with [`TransformError::RefinementLimitExceeded`] if composite
    /// nodes remain after the configured number of passes.
    pub fn refine_model(&mut self, model: &Model) -> TransformResult<(Model, PortMap)> {
        let limit = self.context.max_refinement_iterations;
        let mut current = model.clone();
        let mut mapping = PortMap::identity(model);

        for iteration in 0..limit {
            let (next, ports, changed) = self.pass(&current, true)?;
            mapping = mapping.compose(&ports);
            current = next;
            log::debug!(
                "refinement pass {}: {} nodes, changed: {}",
                iteration + 1,
                current.len(),
                changed
            );
            if !changed {
                return Ok((current, mapping));
            }
        }

        if current.is_refined() {
            Ok((current, mapping))
        } else {
            Err(TransformError::RefinementLimitExceeded { iterations: limit })
        }
    }

    fn pass(&mut self, model: &Model, refine: bool) -> TransformResult<(Model, PortMap, bool)> {
        self.source = model.id();
        self.model = Model::new();
        self.ports = PortMap::default();
        let mut changed = false;

        for id in model.topological_order()? {
            let data = model.node_data(id)?;
            self.current = Some(id);
            if refine {
                changed |= self.refine_node(id, &data.node)?;
            } else {
                data.node.copy(id, self)?;
            }
            for index in 0..data.outputs.len() {
                if !self.ports.ports.contains_key(&(id, index)) {
                    self.current = None;
                    return Err(TransformError::UnmappedOutput {
                        node: id,
                        port: index,
                    });
                }
            }
        }

        self.current = None;
        Ok((
            std::mem::take(&mut self.model),
            std::mem::take(&mut self.ports),
            changed,
        ))
    }

    fn refine_node(&mut self, id: NodeId, node: &Node) -> TransformResult<bool> {
        if node.is_primitive() {
            node.copy(id, self)?;
            return Ok(false);
        }
        log::trace!("refining {} node {:?}", node.family(), id);
        node.refine(id, self)
    }

    /// Rewires `input` from the source model onto the model being built.
    pub fn transform_input(&self, input: &InputPort) -> TransformResult<InputPort> {
        let sources = input
            .sources
            .iter()
            .map(|source| self.corresponding_port(source))
            .collect::<TransformResult<Vec<_>>>()?;
        Ok(InputPort {
            name: input.name.clone(),
            ty: input.ty,
            size: input.size,
            sources,
        })
    }

    /// Adds a node to the model being built.
    pub fn add_node(&mut self, node: impl Into<Node>) -> TransformResult<NodeId> {
        let id = self.model.add_node(node)?;
        if let Some(origin) = self.current {
            self.ports.origins.insert(id, origin);
        }
        Ok(id)
    }

    pub fn output(&self, node: NodeId, index: usize) -> TransformResult<PortRef> {
        Ok(self.model.output(node, index)?)
    }

    /// Records that `new` replaces `old`. Both must carry the same element type and size.
    pub fn map_output(&mut self, old: PortRef, new: PortRef) -> TransformResult<()> {
        let reason = if old.ty != new.ty {
            Some(format!("element type {:?} != {:?}", old.ty, new.ty))
        } else if old.size != new.size {
            Some(format!("size {} != {}", old.size, new.size))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(TransformError::IncompatiblePorts {
                old: old.to_string(),
                new: new.to_string(),
                reason,
            });
        }
        self.ports.ports.insert(old.key(), new);
        Ok(())
    }

    /// Port in the model being built that replaces `old`, if it was mapped already.
    pub fn corresponding_port(&self, old: &PortRef) -> TransformResult<PortRef> {
        Some(old)
            .filter(|old| old.model == self.source)
            .and_then(|old| self.ports.get(old))
            .ok_or(TransformError::UnmappedSource {
                node: old.node,
                index: old.index,
            })
    }

    /// Model the current pass reads from.
    pub fn source_model(&self) -> ModelId {
        self.source
    }

    /// Source node being transformed right now.
    pub fn source_node(&self) -> Option<NodeId> {
        self.current
    }

    /// The partially built model.
    pub fn model(&self) -> &Model {
        &self.model
    }
}
