use std::collections::{BTreeMap, HashMap};

use cranelift::codegen::ir;
use cranelift_module::DataId;

use super::map_compiler::MapFunctions;
use crate::emitter::FunctionEmitter;
use crate::error::{CompileResult, EmitError, GraphError};
use crate::graph::NodeId;
use crate::value::ElementType;

/// A persistent buffer owned by a stateful node.
#[derive(Copy, Clone, Debug)]
pub(crate) struct StateBuffer {
    pub(crate) data: DataId,
    pub(crate) ty: ElementType,
    pub(crate) count: usize,
}

/// Per-map bookkeeping shared between the compiler and the nodes it emits.
#[derive(Debug, Default)]
pub struct CompileSession {
    pub(crate) inputs: HashMap<NodeId, ir::Value>,
    pub(crate) callees: BTreeMap<NodeId, MapFunctions>,
    pub(crate) state: Vec<StateBuffer>,
}

impl CompileSession {
    /// Pointer argument carrying the data of an input node.
    pub fn input_argument(&self, node: NodeId) -> CompileResult<ir::Value> {
        self.inputs
            .get(&node)
            .copied()
            .ok_or_else(|| GraphError::MissingInput(node).into())
    }

    /// Entry function compiled for a nested map.
    pub fn callee(&self, node: NodeId) -> CompileResult<cranelift_module::FuncId> {
        self.callees
            .get(&node)
            .map(|functions| functions.entry)
            .ok_or_else(|| EmitError::UnknownFunction(format!("nested map of {:?}", node)).into())
    }

    /// Registers a data object that the map's reset function must zero.
    pub fn register_state(&mut self, data: DataId, ty: ElementType, count: usize) {
        self.state.push(StateBuffer { data, ty, count });
    }

    /// Zeroes every state buffer and resets every nested map.
    pub(crate) fn emit_reset(&self, function: &mut FunctionEmitter<'_>) {
        for buffer in &self.state {
            let address = function.address_of(buffer.data);
            function.memory_clear(address, buffer.ty, buffer.count);
        }
        for callee in self.callees.values() {
            function.call(callee.reset, &[]);
        }
    }
}
