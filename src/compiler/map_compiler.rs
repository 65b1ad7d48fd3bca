use std::collections::{HashMap, HashSet};

use cranelift::prelude::{InstBuilder, MemFlags};
use cranelift_module::FuncId;

use super::compiled::CompiledMap;
use super::session::CompileSession;
use super::settings::CompilerSettings;
use crate::emitter::{FunctionEmitter, FunctionSignature, ModuleEmitter};
use crate::error::{CompileError, CompileResult};
use crate::graph::{gather_input, Map, Model, NodeId};
use crate::nodes::{emitted_vector, SubModelNode};
use crate::value::{EmissionContext, Vector};

/// Functions emitted for one map.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MapFunctions {
    /// `fn(inputs..., outputs...)`, one pointer per buffer.
    pub entry: FuncId,
    /// `fn()`, clears persistent state.
    pub reset: FuncId,
    /// `fn(args: *const *mut u8)`, calls `entry` with `args[0..n]`.
    pub invoke: FuncId,
}

/// Turns a [`Map`] into native functions.
///
/// Each map becomes an entry function named after it, plus `<name>_reset`
/// and `<name>_invoke`. Nested maps are compiled first under
/// `<name>_<index>` and called from the parent.
#[derive(Clone, Debug, Default)]
pub struct MapCompiler {
    settings: CompilerSettings,
}

impl MapCompiler {
    pub fn new(settings: CompilerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    pub fn compile(&self, map: &Map, name: &str) -> CompileResult<CompiledMap> {
        log::info!("compiling map {}", name);
        let refined;
        let map = if self.settings.refine_before_compile {
            refined = map.refine(&self.settings.transform_context())?;
            &refined
        } else {
            map
        };

        let mut module = ModuleEmitter::new(name, &self.settings.target, self.settings.optimizer())?;
        let functions = self.compile_map(&mut module, map, name)?;
        let finished = module.finish()?;
        CompiledMap::new(finished, name, map, functions)
    }

    /// Emits `map` and its nested maps into `module`.
    pub fn compile_map(
        &self,
        module: &mut ModuleEmitter,
        map: &Map,
        name: &str,
    ) -> CompileResult<MapFunctions> {
        let mut session = CompileSession::default();
        for (index, (id, nested)) in map.model().nodes_by_type::<SubModelNode>().enumerate() {
            let callee = self.compile_map(module, nested.map(), &format!("{}_{}", name, index))?;
            session.callees.insert(id, callee);
        }

        let schedule = schedule(map.model())?;
        let pointer = module.pointer_type();
        let arity = map.inputs().len() + map.outputs().len();
        let signature = FunctionSignature::new(vec![pointer; arity], Vec::new());

        let entry = module.emit_function(name, &signature, |function| {
            emit_body(map, &schedule, &mut session, function)?;
            Ok::<_, CompileError>(Vec::new())
        })?;

        let reset = module.emit_function(
            &format!("{}_reset", name),
            &FunctionSignature::default(),
            |function| {
                session.emit_reset(function);
                Ok::<_, CompileError>(Vec::new())
            },
        )?;

        let invoke = module.emit_function(
            &format!("{}_invoke", name),
            &FunctionSignature::new(vec![pointer], Vec::new()),
            |function| {
                let args = function.parameter(0)?;
                let stride = pointer.bytes() as i32;
                let arguments: Vec<_> = (0..arity)
                    .map(|i| {
                        function
                            .ins()
                            .load(pointer, MemFlags::trusted(), args, i as i32 * stride)
                    })
                    .collect();
                function.call(entry, &arguments);
                Ok::<_, CompileError>(Vec::new())
            },
        )?;

        log::debug!(
            "map {} compiled: {} nodes, {} state buffers, {} nested maps",
            name,
            schedule.len(),
            session.state.len(),
            session.callees.len()
        );
        Ok(MapFunctions {
            entry,
            reset,
            invoke,
        })
    }
}

/// Orders the nodes of `model` and checks that every producer precedes its consumers.
fn schedule(model: &Model) -> CompileResult<Vec<NodeId>> {
    let order = model.topological_order()?;
    let mut visited = HashSet::new();
    for &id in &order {
        for input in model.node(id)?.inputs() {
            if let Some(source) = input.sources.iter().find(|s| !visited.contains(&s.node)) {
                return Err(CompileError::Unbound {
                    node: id,
                    port: source.index,
                });
            }
        }
        visited.insert(id);
    }
    Ok(order)
}

fn emit_body(
    map: &Map,
    schedule: &[NodeId],
    session: &mut CompileSession,
    function: &mut FunctionEmitter<'_>,
) -> CompileResult<()> {
    for (index, input) in map.inputs().iter().enumerate() {
        session.inputs.insert(input.node, function.parameter(index)?);
    }

    let mut values: HashMap<(NodeId, usize), Vector> = HashMap::new();
    for &id in schedule {
        let node = map.model().node(id)?;
        if !node.is_primitive() {
            return Err(CompileError::NotCompilable {
                node: id,
                family: node.family(),
            });
        }
        log::trace!("emitting {} node {:?}", node.family(), id);

        let mut ctx = EmissionContext::new(function);
        let arguments = node
            .inputs()
            .into_iter()
            .map(|port| {
                gather_input(&mut ctx, port, |source| {
                    values
                        .get(&source.key())
                        .cloned()
                        .ok_or(CompileError::Unbound {
                            node: id,
                            port: source.index,
                        })
                })
            })
            .collect::<CompileResult<Vec<_>>>()?;

        let results = node.compile(id, session, function, &arguments)?;
        for (index, result) in results.into_iter().enumerate() {
            values.insert((id, index), result);
        }
    }

    let first_output = map.inputs().len();
    for (index, output) in map.outputs().iter().enumerate() {
        let value = values
            .get(&output.port.key())
            .cloned()
            .ok_or(CompileError::Unbound {
                node: output.port.node,
                port: output.port.index,
            })?;
        let address = function.parameter(first_output + index)?;
        let destination = emitted_vector(output.port.ty, address, output.port.size)?;
        let mut ctx = EmissionContext::new(function);
        destination.assign(&mut ctx, &value)?;
    }
    Ok(())
}
