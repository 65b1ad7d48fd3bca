pub mod compiler;
pub mod emitter;
pub mod error;
pub mod graph;
pub mod nodes;
pub mod value;

pub use compiler::{CompiledMap, CompilerSettings, MapCompiler};
pub use error::{CompileError, EmitError, GraphError, TransformError, ValueError};
pub use graph::*;
pub use nodes::*;
