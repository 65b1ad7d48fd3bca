use std::fmt;

use serde::{Deserialize, Serialize};

use super::port::{InputPort, NodeId, OutputPort};
use super::transform::ModelTransformer;
use crate::compiler::CompileSession;
use crate::emitter::FunctionEmitter;
use crate::error::{CompileResult, GraphError, GraphResult, TransformResult};
use crate::nodes::{
    AccumulatorNode, BiasNode, BinaryOperationNode, ConstantNode, FullyConnectedNode, InputNode,
    MatrixVectorProductNode, OutputNode, SubModelNode, UnaryOperationNode,
};
use crate::value::{HostData, ImmediateContext, Vector};

/// Tag identifying the kind of a [`Node`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeFamily {
    Input,
    Constant,
    Output,
    UnaryOperation,
    BinaryOperation,
    MatrixVectorProduct,
    Accumulator,
    Bias,
    FullyConnected,
    SubModel,
}

impl fmt::Display for NodeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Behavior every node family provides.
///
/// `compute` evaluates the node on host data; `compile` emits the same
/// evaluation into a function. Families that share their arithmetic between
/// the two write it once against [`ExecutionContext`](crate::value::ExecutionContext).
pub trait NodeBehavior {
    fn inputs(&self) -> Vec<&InputPort>;

    fn inputs_mut(&mut self) -> Vec<&mut InputPort>;

    fn outputs(&self) -> Vec<OutputPort>;

    /// Family-specific structural checks, run when the node is added.
    fn validate(&self) -> GraphResult<()> {
        Ok(())
    }

    fn has_state(&self) -> bool {
        false
    }

    fn reset(&mut self) {}

    /// Whether the compiler can emit this node directly.
    fn is_primitive(&self) -> bool {
        true
    }

    /// Replaces this node in the transformer's output model with an
    /// equivalent subgraph. Returns whether anything other than a plain copy
    /// was emitted.
    fn refine(&self, id: NodeId, transformer: &mut ModelTransformer) -> TransformResult<bool>;

    fn compute(
        &mut self,
        ctx: &mut ImmediateContext,
        inputs: &[Vector],
        external: Option<&HostData>,
    ) -> GraphResult<Vec<Vector>>;

    fn compile(
        &self,
        id: NodeId,
        session: &mut CompileSession,
        function: &mut FunctionEmitter<'_>,
        inputs: &[Vector],
    ) -> CompileResult<Vec<Vector>>;
}

/// Typed access to one node family inside a [`Node`].
pub trait NodeVariant: Sized + Into<Node> {
    const FAMILY: NodeFamily;

    fn from_node(node: &Node) -> Option<&Self>;

    fn from_node_mut(node: &mut Node) -> Option<&mut Self>;
}

macro_rules! node_families {
    ($($family:ident => $ty:ident),* $(,)?) => {
        /// A node in a [`Model`](super::Model). The set of families is closed.
        #[derive(Clone, Debug, Serialize, Deserialize)]
        pub enum Node {
            $($family($ty),)*
        }

        impl Node {
            pub fn family(&self) -> NodeFamily {
                match self {
                    $(Node::$family(_) => NodeFamily::$family,)*
                }
            }

            fn behavior(&self) -> &dyn NodeBehavior {
                match self {
                    $(Node::$family(node) => node,)*
                }
            }

            fn behavior_mut(&mut self) -> &mut dyn NodeBehavior {
                match self {
                    $(Node::$family(node) => node,)*
                }
            }
        }

        $(
            impl From<$ty> for Node {
                fn from(node: $ty) -> Self {
                    Node::$family(node)
                }
            }

            impl NodeVariant for $ty {
                const FAMILY: NodeFamily = NodeFamily::$family;

                fn from_node(node: &Node) -> Option<&Self> {
                    match node {
                        Node::$family(inner) => Some(inner),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn from_node_mut(node: &mut Node) -> Option<&mut Self> {
                    match node {
                        Node::$family(inner) => Some(inner),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )*
    };
}

node_families! {
    Input => InputNode,
    Constant => ConstantNode,
    Output => OutputNode,
    UnaryOperation => UnaryOperationNode,
    BinaryOperation => BinaryOperationNode,
    MatrixVectorProduct => MatrixVectorProductNode,
    Accumulator => AccumulatorNode,
    Bias => BiasNode,
    FullyConnected => FullyConnectedNode,
    SubModel => SubModelNode,
}

impl Node {
    /// Checked downcast to a concrete family.
    pub fn downcast<T: NodeVariant>(&self) -> GraphResult<&T> {
        T::from_node(self).ok_or(GraphError::NodeTypeMismatch {
            expected: T::FAMILY,
            found: self.family(),
        })
    }

    pub fn downcast_mut<T: NodeVariant>(&mut self) -> GraphResult<&mut T> {
        let found = self.family();
        T::from_node_mut(self).ok_or(GraphError::NodeTypeMismatch {
            expected: T::FAMILY,
            found,
        })
    }

    pub fn is<T: NodeVariant>(&self) -> bool {
        self.family() == T::FAMILY
    }

    pub fn inputs(&self) -> Vec<&InputPort> {
        self.behavior().inputs()
    }

    pub fn inputs_mut(&mut self) -> Vec<&mut InputPort> {
        self.behavior_mut().inputs_mut()
    }

    pub fn outputs(&self) -> Vec<OutputPort> {
        self.behavior().outputs()
    }

    pub fn validate(&self) -> GraphResult<()> {
        self.behavior().validate()
    }

    pub fn has_state(&self) -> bool {
        self.behavior().has_state()
    }

    pub fn reset(&mut self) {
        self.behavior_mut().reset()
    }

    pub fn is_primitive(&self) -> bool {
        self.behavior().is_primitive()
    }

    /// Adds a verbatim copy of this node, with its inputs rewired, to the
    /// transformer's output model and maps every output onto the copy.
    pub fn copy(&self, id: NodeId, transformer: &mut ModelTransformer) -> TransformResult<()> {
        let mut node = self.clone();
        for input in node.inputs_mut() {
            *input = transformer.transform_input(input)?;
        }
        let new_id = transformer.add_node(node)?;
        for (index, port) in self.outputs().iter().enumerate() {
            let new_port = transformer.output(new_id, index)?;
            let old = port.at(transformer.source_model(), id, index);
            transformer.map_output(old, new_port)?;
        }
        Ok(())
    }

    pub fn refine(&self, id: NodeId, transformer: &mut ModelTransformer) -> TransformResult<bool> {
        self.behavior().refine(id, transformer)
    }

    pub(crate) fn compute(
        &mut self,
        ctx: &mut ImmediateContext,
        inputs: &[Vector],
        external: Option<&HostData>,
    ) -> GraphResult<Vec<Vector>> {
        self.behavior_mut().compute(ctx, inputs, external)
    }

    pub(crate) fn compile(
        &self,
        id: NodeId,
        session: &mut CompileSession,
        function: &mut FunctionEmitter<'_>,
        inputs: &[Vector],
    ) -> CompileResult<Vec<Vector>> {
        self.behavior().compile(id, session, function, inputs)
    }
}
