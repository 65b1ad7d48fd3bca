use super::map_compiler::MapFunctions;
use crate::emitter::FinishedModule;
use crate::error::{CompileResult, GraphError};
use crate::graph::Map;
use crate::value::{ElementType, HostData};

type InvokeFn = unsafe extern "C" fn(*const *mut u8);
type ResetFn = unsafe extern "C" fn();

#[derive(Clone, Debug, PartialEq)]
struct BufferSignature {
    name: String,
    ty: ElementType,
    size: usize,
}

/// A map compiled to native code, callable with host data.
///
/// Owns the generated code; the entry points stay valid as long as this
/// value lives.
pub struct CompiledMap {
    name: String,
    module: FinishedModule,
    functions: MapFunctions,
    invoke: InvokeFn,
    reset: ResetFn,
    inputs: Vec<BufferSignature>,
    outputs: Vec<BufferSignature>,
}

impl CompiledMap {
    pub(crate) fn new(
        module: FinishedModule,
        name: &str,
        map: &Map,
        functions: MapFunctions,
    ) -> CompileResult<Self> {
        let invoke = module.function_pointer(&format!("{}_invoke", name))?;
        let reset = module.function_pointer(&format!("{}_reset", name))?;
        // SAFETY: both functions were emitted by `MapCompiler::compile_map`
        // with exactly these signatures.
        let (invoke, reset) = unsafe {
            (
                std::mem::transmute::<*const u8, InvokeFn>(invoke),
                std::mem::transmute::<*const u8, ResetFn>(reset),
            )
        };
        Ok(Self {
            name: name.to_string(),
            module,
            functions,
            invoke,
            reset,
            inputs: map
                .inputs()
                .iter()
                .map(|input| BufferSignature {
                    name: input.name.clone(),
                    ty: input.ty,
                    size: input.size,
                })
                .collect(),
            outputs: map
                .outputs()
                .iter()
                .map(|output| BufferSignature {
                    name: output.name.clone(),
                    ty: output.port.ty,
                    size: output.port.size,
                })
                .collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &FinishedModule {
        &self.module
    }

    pub fn functions(&self) -> MapFunctions {
        self.functions
    }

    /// Address of the entry function, `fn(inputs..., outputs...)` over
    /// pointers to packed element buffers.
    pub fn entry_point(&self) -> CompileResult<*const u8> {
        Ok(self.module.function_pointer(&self.name)?)
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|input| input.name.as_str())
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|output| output.name.as_str())
    }

    /// Runs the compiled code; one value per declared input, in order.
    pub fn compute(&mut self, inputs: &[HostData]) -> CompileResult<Vec<HostData>> {
        if inputs.len() != self.inputs.len() {
            return Err(GraphError::InputCountMismatch {
                expected: self.inputs.len(),
                found: inputs.len(),
            }
            .into());
        }
        for (signature, data) in self.inputs.iter().zip(inputs) {
            if data.element_type() != signature.ty {
                return Err(GraphError::PortTypeMismatch {
                    port: signature.name.clone(),
                    expected: signature.ty,
                    found: data.element_type(),
                }
                .into());
            }
            if data.len() != signature.size {
                return Err(GraphError::PortSizeMismatch {
                    port: signature.name.clone(),
                    expected: signature.size,
                    found: data.len(),
                }
                .into());
            }
        }

        let mut arguments: Vec<HostData> = inputs.to_vec();
        let mut results: Vec<HostData> = self
            .outputs
            .iter()
            .map(|output| HostData::zeros(output.ty, output.size))
            .collect();
        let pointers: Vec<*mut u8> = arguments
            .iter_mut()
            .chain(results.iter_mut())
            .map(HostData::as_mut_ptr)
            .collect();

        // SAFETY: every pointer addresses a buffer whose type and length
        // match the signature the entry function was compiled for, and the
        // buffers outlive the call.
        unsafe { (self.invoke)(pointers.as_ptr()) };
        Ok(results)
    }

    /// Clears the state of every stateful node, including nested maps.
    pub fn reset(&mut self) {
        // SAFETY: the reset function takes no arguments and only touches
        // data objects owned by this module.
        unsafe { (self.reset)() };
    }
}
