//! Native code emission on top of Cranelift.
//!
//! A [`ModuleEmitter`] owns a JIT module; functions are emitted into it one
//! at a time through a [`FunctionEmitter`], which offers structured control
//! flow (counted and conditional loops, if/else) so callers never wire
//! blocks by hand. The [`Optimizer`] runs its function passes on every
//! function as it is defined and its module passes when the module is
//! finished.

pub mod function;
pub mod loops;
pub mod module;
pub mod optimizer;
pub mod target;

pub use function::{clif_type, FunctionEmitter};
pub use loops::{ForLoop, LoopBlocks, LoopHints, LoopKind, LoopRecord};
pub use module::{FinishedModule, FunctionSignature, ModuleEmitter};
pub use optimizer::{FunctionPass, ModulePass, Optimizer, PassRecord};
pub use target::{OptLevel, TargetDescription};
