use std::collections::{BTreeMap, BTreeSet};
use std::mem::ManuallyDrop;

use cranelift::codegen::{self, ir};
use cranelift::prelude::{AbiParam, FunctionBuilder, FunctionBuilderContext, Signature, Type};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};

use super::function::FunctionEmitter;
use super::optimizer::{ModulePass, Optimizer, PassRecord};
use super::target::TargetDescription;
use crate::error::{EmitError, EmitResult};

/// Parameter and return types of an emitted function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionSignature {
    pub params: Vec<Type>,
    pub returns: Vec<Type>,
}

impl FunctionSignature {
    pub fn new(params: Vec<Type>, returns: Vec<Type>) -> Self {
        Self { params, returns }
    }
}

/// Module-wide state that function emitters borrow while a body is built.
pub(crate) struct ModuleState {
    pub(crate) module: JITModule,
    functions: BTreeMap<String, FuncId>,
    defined: BTreeSet<String>,
    next_data: usize,
}

impl ModuleState {
    pub(crate) fn pointer_type(&self) -> Type {
        self.module.target_config().pointer_type()
    }

    pub(crate) fn function(&self, name: &str) -> EmitResult<FuncId> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| EmitError::UnknownFunction(name.to_string()))
    }

    pub(crate) fn declare_data(
        &mut self,
        prefix: &str,
        bytes: Option<Vec<u8>>,
        size: usize,
        align: u64,
    ) -> EmitResult<DataId> {
        let name = format!("{}_{}", prefix, self.next_data);
        self.next_data += 1;

        let writable = bytes.is_none();
        let id = self
            .module
            .declare_data(&name, Linkage::Local, writable, false)?;
        let mut description = DataDescription::new();
        match bytes {
            Some(bytes) => description.define(bytes.into_boxed_slice()),
            None => description.define_zeroinit(size.max(1)),
        }
        description.set_align(align);
        self.module.define_data(id, &description)?;
        log::trace!("declared data object {} ({} bytes)", name, size);
        Ok(id)
    }
}

/// Owns a JIT module and emits functions into it one at a time.
///
/// Each call to [`ModuleEmitter::emit_function`] brackets one function:
/// the body closure receives a [`FunctionEmitter`] positioned in the entry
/// block, and the function is sealed, optimized and defined when the
/// closure returns.
pub struct ModuleEmitter {
    name: String,
    target: TargetDescription,
    state: ModuleState,
    ctx: codegen::Context,
    builder_context: FunctionBuilderContext,
    optimizer: Optimizer,
}

impl ModuleEmitter {
    pub fn new(name: &str, target: &TargetDescription, optimizer: Optimizer) -> EmitResult<Self> {
        let isa = target.build_isa()?;
        let builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        let module = JITModule::new(builder);

        log::debug!("created module {} for {}", name, target.triple);

        Ok(Self {
            name: name.to_string(),
            target: target.clone(),
            ctx: module.make_context(),
            state: ModuleState {
                module,
                functions: BTreeMap::new(),
                defined: BTreeSet::new(),
                next_data: 0,
            },
            builder_context: FunctionBuilderContext::new(),
            optimizer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &TargetDescription {
        &self.target
    }

    pub fn pointer_type(&self) -> Type {
        self.state.pointer_type()
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    fn make_signature(&self, signature: &FunctionSignature) -> Signature {
        let mut sig = self.state.module.make_signature();
        sig.params
            .extend(signature.params.iter().map(|&ty| AbiParam::new(ty)));
        sig.returns
            .extend(signature.returns.iter().map(|&ty| AbiParam::new(ty)));
        sig
    }

    /// Declares an exported function so that others can call it before it
    /// is defined. Declaring the same name twice returns the same id.
    pub fn declare_function(
        &mut self,
        name: &str,
        signature: &FunctionSignature,
    ) -> EmitResult<FuncId> {
        if let Some(&id) = self.state.functions.get(name) {
            return Ok(id);
        }
        let sig = self.make_signature(signature);
        let id = self
            .state
            .module
            .declare_function(name, Linkage::Export, &sig)?;
        self.state.functions.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn function_id(&self, name: &str) -> EmitResult<FuncId> {
        self.state.function(name)
    }

    pub fn emit_function<F, E>(
        &mut self,
        name: &str,
        signature: &FunctionSignature,
        body: F,
    ) -> Result<FuncId, E>
    where
        F: FnOnce(&mut FunctionEmitter<'_>) -> Result<Vec<ir::Value>, E>,
        E: From<EmitError>,
    {
        let id = self.declare_function(name, signature)?;
        let sig = self.make_signature(signature);

        self.state.module.clear_context(&mut self.ctx);
        self.ctx.func.signature = sig;

        let emitted = {
            let builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_context);
            let mut function = FunctionEmitter::new(name, builder, &mut self.state);
            match body(&mut function) {
                Ok(returns) => {
                    function.finish(&returns);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };
        if let Err(e) = emitted {
            self.builder_context = FunctionBuilderContext::new();
            self.state.module.clear_context(&mut self.ctx);
            return Err(e);
        }

        log::trace!("{}", self.ctx.func.display());

        let isa = self.state.module.isa();
        self.optimizer
            .optimize_function(name, &mut self.ctx, isa)?;
        self.state
            .module
            .define_function(id, &mut self.ctx)
            .map_err(EmitError::from)?;
        self.state.module.clear_context(&mut self.ctx);
        self.state.defined.insert(name.to_string());

        log::debug!("defined function {} in module {}", name, self.name);
        Ok(id)
    }

    /// Runs the module passes and makes every defined function callable.
    pub fn finish(mut self) -> EmitResult<FinishedModule> {
        let passes = self.optimizer.module_passes().to_vec();
        let mut finalized = false;
        for pass in passes {
            match pass {
                ModulePass::CheckDeclarations => {
                    if let Some(missing) = self
                        .state
                        .functions
                        .keys()
                        .find(|name| !self.state.defined.contains(*name))
                    {
                        return Err(EmitError::UndefinedFunction(missing.clone()));
                    }
                }
                ModulePass::Finalize => {
                    if !finalized {
                        self.state.module.finalize_definitions()?;
                        finalized = true;
                    }
                }
            }
            self.optimizer.record_module_pass(pass);
        }
        if !finalized {
            self.state.module.finalize_definitions()?;
        }

        log::debug!(
            "finalized module {} with {} functions",
            self.name,
            self.state.defined.len()
        );

        Ok(FinishedModule {
            name: self.name,
            module: ManuallyDrop::new(self.state.module),
            functions: self.state.functions,
            history: self.optimizer.history().to_vec(),
        })
    }
}

/// A finalized module whose functions can be called.
///
/// The generated code lives as long as this value and is released when it
/// is dropped; function pointers must not be used after that.
pub struct FinishedModule {
    name: String,
    module: ManuallyDrop<JITModule>,
    functions: BTreeMap<String, FuncId>,
    history: Vec<PassRecord>,
}

impl FinishedModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry address of a defined function.
    pub fn function_pointer(&self, name: &str) -> EmitResult<*const u8> {
        let id = self
            .functions
            .get(name)
            .copied()
            .ok_or_else(|| EmitError::UnknownFunction(name.to_string()))?;
        Ok(self.module.get_finalized_function(id))
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Passes executed while this module was emitted.
    pub fn pass_history(&self) -> &[PassRecord] {
        &self.history
    }
}

impl Drop for FinishedModule {
    fn drop(&mut self) {
        log::trace!("freeing module {}", self.name);
        // SAFETY: `module` is not touched again, and callers were told not to
        // keep function pointers past the lifetime of this value.
        unsafe { ManuallyDrop::take(&mut self.module).free_memory() };
    }
}
