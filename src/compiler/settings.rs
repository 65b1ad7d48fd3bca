use serde::{Deserialize, Serialize};

use crate::emitter::{FunctionPass, ModulePass, Optimizer, TargetDescription};
use crate::graph::{TransformContext, DEFAULT_REFINEMENT_ITERATIONS};

/// Options for [`MapCompiler`](super::MapCompiler).
///
/// Every field has a default, so a settings file only needs the fields it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    pub target: TargetDescription,
    /// Run the function passes below. When false only finalization runs.
    pub optimize: bool,
    pub function_passes: Vec<FunctionPass>,
    pub module_passes: Vec<ModulePass>,
    pub max_refinement_iterations: usize,
    /// Refine composite nodes before compiling. Without it, composites fail
    /// to compile.
    pub refine_before_compile: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        let standard = Optimizer::standard();
        Self {
            target: TargetDescription::host(),
            optimize: true,
            function_passes: standard.function_passes().to_vec(),
            module_passes: standard.module_passes().to_vec(),
            max_refinement_iterations: DEFAULT_REFINEMENT_ITERATIONS,
            refine_before_compile: true,
        }
    }
}

impl CompilerSettings {
    pub fn optimizer(&self) -> Optimizer {
        if self.optimize {
            Optimizer::with_passes(self.function_passes.clone(), self.module_passes.clone())
        } else {
            Optimizer::with_passes(Vec::new(), self.module_passes.clone())
        }
    }

    pub fn transform_context(&self) -> TransformContext {
        TransformContext {
            max_refinement_iterations: self.max_refinement_iterations,
        }
    }
}
