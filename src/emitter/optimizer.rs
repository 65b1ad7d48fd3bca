use cranelift::codegen;
use cranelift::codegen::isa::TargetIsa;
use serde::{Deserialize, Serialize};

use crate::error::{EmitError, EmitResult};

/// Passes run on each function right after it is emitted, before it is
/// handed to the code generator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionPass {
    /// Runs the IR verifier and fails emission on any error.
    Verify,
    EliminateUnreachableCode,
    DeadCodeElimination,
}

/// Passes run once over the whole module when emission finishes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModulePass {
    /// Fails if a function was declared for export but never defined.
    CheckDeclarations,
    /// Resolves relocations and makes the code executable.
    Finalize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassRecord {
    Function { function: String, pass: FunctionPass },
    Module(ModulePass),
}

/// Ordered function and module pass pipelines.
#[derive(Clone, Debug, Default)]
pub struct Optimizer {
    function_passes: Vec<FunctionPass>,
    module_passes: Vec<ModulePass>,
    history: Vec<PassRecord>,
}

impl Optimizer {
    /// An optimizer that runs no passes besides mandatory finalization.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        Self::with_passes(
            vec![
                FunctionPass::Verify,
                FunctionPass::EliminateUnreachableCode,
                FunctionPass::DeadCodeElimination,
            ],
            vec![ModulePass::CheckDeclarations, ModulePass::Finalize],
        )
    }

    pub fn with_passes(function_passes: Vec<FunctionPass>, module_passes: Vec<ModulePass>) -> Self {
        Self {
            function_passes,
            module_passes,
            history: Vec::new(),
        }
    }

    pub fn add_function_pass(&mut self, pass: FunctionPass) {
        self.function_passes.push(pass);
    }

    pub fn add_module_pass(&mut self, pass: ModulePass) {
        self.module_passes.push(pass);
    }

    pub fn function_passes(&self) -> &[FunctionPass] {
        &self.function_passes
    }

    pub fn module_passes(&self) -> &[ModulePass] {
        &self.module_passes
    }

    /// Every pass executed so far, in execution order.
    pub fn history(&self) -> &[PassRecord] {
        &self.history
    }

    pub(crate) fn optimize_function(
        &mut self,
        function: &str,
        ctx: &mut codegen::Context,
        isa: &dyn TargetIsa,
    ) -> EmitResult<()> {
        for &pass in &self.function_passes {
            log::trace!("running {:?} on {}", pass, function);
            match pass {
                FunctionPass::Verify => {
                    ctx.verify(isa).map_err(|errors| EmitError::Verifier {
                        function: function.to_string(),
                        errors: errors.to_string(),
                    })?;
                }
                FunctionPass::EliminateUnreachableCode => {
                    ctx.compute_cfg();
                    ctx.compute_domtree();
                    ctx.eliminate_unreachable_code(isa)
                        .map_err(|e| EmitError::Codegen(e.to_string()))?;
                }
                FunctionPass::DeadCodeElimination => {
                    ctx.compute_cfg();
                    ctx.compute_domtree();
                    ctx.dce(isa).map_err(|e| EmitError::Codegen(e.to_string()))?;
                }
            }
            self.history.push(PassRecord::Function {
                function: function.to_string(),
                pass,
            });
        }
        Ok(())
    }

    pub(crate) fn record_module_pass(&mut self, pass: ModulePass) {
        self.history.push(PassRecord::Module(pass));
    }
}
