//! Compiles a [`Map`](crate::graph::Map) into native code.
//!
//! [`MapCompiler`] refines the map, schedules its nodes, asks each node to
//! emit itself through [`NodeBehavior::compile`](crate::graph::NodeBehavior::compile)
//! and returns a [`CompiledMap`] that can be called like
//! [`Map::compute`](crate::graph::Map::compute).
mod compiled;
mod map_compiler;
mod session;
mod settings;

pub use compiled::CompiledMap;
pub use map_compiler::{MapCompiler, MapFunctions};
pub use session::CompileSession;
pub use settings::CompilerSettings;
