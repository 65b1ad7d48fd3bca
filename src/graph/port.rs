use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::error::{GraphError, GraphResult};
use crate::value::ElementType;

pub const MAX_NODE_PORTS: usize = 32;

new_key_type! { pub struct NodeId; }

/// Identity of one [`Model`](super::Model) instance.
///
/// Node ids are slot keys and repeat across models; the model id tells
/// their ports apart. The default id belongs to no model.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModelId(u64);

impl ModelId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A typed reference to one output port of a node.
///
/// The element type and size travel with the reference so that consumers
/// can be checked without a model lookup; [`Model::add_node`](super::Model::add_node)
/// rejects references that disagree with the producer, or that were taken
/// from another model.
///
/// The owning model is not serialized. A deserialized [`Model`](super::Model)
/// rebinds the references it contains to itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    #[serde(skip)]
    pub model: ModelId,
    pub node: NodeId,
    pub index: usize,
    pub ty: ElementType,
    pub size: usize,
}

impl PortRef {
    pub fn key(&self) -> (NodeId, usize) {
        (self.node, self.index)
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}.{}<{:?};{}>",
            self.node, self.index, self.ty, self.size
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPort {
    pub name: String,
    pub ty: ElementType,
    pub size: usize,
}

impl OutputPort {
    pub fn new(name: impl Into<String>, ty: ElementType, size: usize) -> Self {
        Self {
            name: name.into(),
            ty,
            size,
        }
    }

    pub fn at(&self, model: ModelId, node: NodeId, index: usize) -> PortRef {
        PortRef {
            model,
            node,
            index,
            ty: self.ty,
            size: self.size,
        }
    }
}

/// A node input: the concatenation of one or more producer outputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputPort {
    pub name: String,
    pub ty: ElementType,
    pub size: usize,
    pub sources: Vec<PortRef>,
}

impl InputPort {
    pub fn new(name: impl Into<String>, source: PortRef) -> Self {
        Self {
            name: name.into(),
            ty: source.ty,
            size: source.size,
            sources: vec![source],
        }
    }

    /// Concatenates `sources` in order. All sources must share an element type.
    pub fn concat(name: impl Into<String>, sources: &[PortRef]) -> GraphResult<Self> {
        let name = name.into();
        let first = sources.first().ok_or_else(|| GraphError::PortSizeMismatch {
            port: name.clone(),
            expected: 1,
            found: 0,
        })?;
        if let Some(other) = sources.iter().find(|s| s.ty != first.ty) {
            return Err(GraphError::PortTypeMismatch {
                port: name,
                expected: first.ty,
                found: other.ty,
            });
        }
        Ok(Self {
            ty: first.ty,
            size: sources.iter().map(|s| s.size).sum(),
            sources: sources.to_vec(),
            name,
        })
    }

    /// Checks the declared type and size against the sources.
    pub fn check(&self) -> GraphResult<()> {
        if let Some(source) = self.sources.iter().find(|s| s.ty != self.ty) {
            return Err(GraphError::PortTypeMismatch {
                port: self.name.clone(),
                expected: self.ty,
                found: source.ty,
            });
        }
        let total: usize = self.sources.iter().map(|s| s.size).sum();
        if total != self.size {
            return Err(GraphError::PortSizeMismatch {
                port: self.name.clone(),
                expected: self.size,
                found: total,
            });
        }
        Ok(())
    }
}
