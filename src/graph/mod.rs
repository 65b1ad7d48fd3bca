mod map;
mod model;
mod node;
mod port;
pub mod topology;
mod transform;

#[cfg(test)]
mod tests;

pub use map::{Map, MapInput, MapOutput};
pub(crate) use model::gather_input;
pub use model::{Model, NodeData, PortValues};
pub use node::{Node, NodeBehavior, NodeFamily, NodeVariant};
pub use port::{InputPort, ModelId, NodeId, OutputPort, PortRef, MAX_NODE_PORTS};
pub use transform::{ModelTransformer, PortMap, TransformContext, DEFAULT_REFINEMENT_ITERATIONS};
