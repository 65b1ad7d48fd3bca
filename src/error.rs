use thiserror::Error;

use crate::graph::{NodeFamily, NodeId};
use crate::value::ElementType;

/// Failures raised by the value algebra in either execution context.
#[derive(Error, Debug)]
pub enum ValueError {
    #[error("element type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        expected: ElementType,
        found: ElementType,
    },

    #[error("size mismatch: expected {expected:?}, found {found:?}")]
    SizeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("index {index} out of range for extent {extent}")]
    OutOfRange { index: i64, extent: usize },

    #[error("value has no memory layout")]
    Unconstrained,

    #[error("expected a {expected}-dimensional layout, found {found} dimensions")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("operation {operation} is not supported for {ty:?}")]
    UnsupportedOperation {
        operation: &'static str,
        ty: ElementType,
    },

    #[error("value belongs to a different execution context than {context}")]
    ContextMismatch { context: &'static str },

    #[error("integer division by zero")]
    DivideByZero,

    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// Structural errors in a [`Model`](crate::graph::Model) or [`Map`](crate::graph::Map).
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("port type mismatch on {port}: expected {expected:?}, found {found:?}")]
    PortTypeMismatch {
        port: String,
        expected: ElementType,
        found: ElementType,
    },

    #[error("port size mismatch on {port}: expected {expected}, found {found}")]
    PortSizeMismatch {
        port: String,
        expected: usize,
        found: usize,
    },

    #[error("port {port} refers to output {index} of node {node:?}, which does not exist")]
    UnresolvedPort {
        port: String,
        node: NodeId,
        index: usize,
    },

    #[error("cycle detected: {path:?}")]
    CycleDetected { path: Vec<NodeId> },

    #[error("expected a {expected:?} node, found {found:?}")]
    NodeTypeMismatch {
        expected: NodeFamily,
        found: NodeFamily,
    },

    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("invalid map binding {name}: {reason}")]
    InvalidMapBinding { name: String, reason: String },

    #[error("expected {expected} input values, got {found}")]
    InputCountMismatch { expected: usize, found: usize },

    #[error("no value supplied for input node {0:?}")]
    MissingInput(NodeId),

    #[error("{family:?} node declares {count} ports, more than the supported {limit}")]
    TooManyPorts {
        family: NodeFamily,
        count: usize,
        limit: usize,
    },

    #[error("{family:?} node has an empty port")]
    EmptyPort { family: NodeFamily },

    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Errors raised while copying or refining a model.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("node {node:?} left output {port} without a corresponding port")]
    UnmappedOutput { node: NodeId, port: usize },

    #[error("source port {index} of node {node:?} has no counterpart in the new model")]
    UnmappedSource { node: NodeId, index: usize },

    #[error("refinement did not reach a fixed point within {iterations} iterations")]
    RefinementLimitExceeded { iterations: usize },

    #[error("cannot map {old} onto {new}: {reason}")]
    IncompatiblePorts {
        old: String,
        new: String,
        reason: String,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Errors from the native emission backend.
#[derive(Error, Debug)]
pub enum EmitError {
    #[error("module error: {0}")]
    Module(#[from] cranelift_module::ModuleError),

    #[error("code generation failed: {0}")]
    Codegen(String),

    #[error("unsupported target {triple}: {reason}")]
    UnsupportedTarget { triple: String, reason: String },

    #[error("verifier rejected {function}: {errors}")]
    Verifier { function: String, errors: String },

    #[error("function {0} was declared but never defined")]
    UndefinedFunction(String),

    #[error("unknown function {0}")]
    UnknownFunction(String),

    #[error("function parameter {index} out of range ({count} parameters)")]
    MissingParameter { index: usize, count: usize },

    #[error("loop step must be non-zero")]
    InvalidLoopStep,
}

/// Top-level error of the map compiler.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error("node {node:?} has no value bound to input port {port}")]
    Unbound { node: NodeId, port: usize },

    #[error("{family:?} node {node:?} must be refined before compilation")]
    NotCompilable { node: NodeId, family: NodeFamily },
}

pub type ValueResult<T> = Result<T, ValueError>;
pub type GraphResult<T> = Result<T, GraphError>;
pub type TransformResult<T> = Result<T, TransformError>;
pub type EmitResult<T> = Result<T, EmitError>;
pub type CompileResult<T> = Result<T, CompileError>;
