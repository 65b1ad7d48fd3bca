use cranelift::codegen::ir;
use cranelift::prelude::{
    types, EntityRef, FunctionBuilder, InstBuilder, IntCC, MemFlags, StackSlotData, StackSlotKind, Type,
    Variable,
};
use cranelift_frontend::FuncInstBuilder;
use cranelift_module::{DataId, FuncId, Module};

use super::loops::LoopRecord;
use super::module::ModuleState;
use crate::error::{EmitError, EmitResult};
use crate::value::{ElementType, ScalarValue};

/// Native type used to hold elements of `ty`.
pub fn clif_type(ty: ElementType) -> Type {
    match ty {
        ElementType::Boolean => types::I8,
        ElementType::Int32 => types::I32,
        ElementType::Int64 => types::I64,
        ElementType::Float => types::F32,
        ElementType::Double => types::F64,
    }
}

/// Builds the body of one function.
///
/// Obtained from [`ModuleEmitter::emit_function`](super::ModuleEmitter::emit_function);
/// instructions are appended to the current block, and structured helpers
/// such as [`FunctionEmitter::for_range`] create and wire blocks.
pub struct FunctionEmitter<'a> {
    name: String,
    pub(crate) builder: FunctionBuilder<'a>,
    pub(crate) state: &'a mut ModuleState,
    params: Vec<ir::Value>,
    next_variable: usize,
    pub(crate) loops: Vec<LoopRecord>,
}

impl<'a> FunctionEmitter<'a> {
    pub(crate) fn new(name: &str, mut builder: FunctionBuilder<'a>, state: &'a mut ModuleState) -> Self {
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let params = builder.block_params(entry).to_vec();
        Self {
            name: name.to_string(),
            builder,
            state,
            params,
            next_variable: 0,
            loops: Vec::new(),
        }
    }

    pub(crate) fn finish(mut self, returns: &[ir::Value]) {
        self.builder.ins().return_(returns);
        self.builder.seal_all_blocks();
        self.builder.finalize();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pointer_type(&self) -> Type {
        self.state.pointer_type()
    }

    pub fn parameter(&self, index: usize) -> EmitResult<ir::Value> {
        self.params
            .get(index)
            .copied()
            .ok_or(EmitError::MissingParameter {
                index,
                count: self.params.len(),
            })
    }

    pub fn parameter_count(&self) -> usize {
        self.params.len()
    }

    /// Instruction builder positioned at the end of the current block.
    pub fn ins(&mut self) -> FuncInstBuilder<'_, 'a> {
        self.builder.ins()
    }

    /// Loops emitted so far, in the order they were opened.
    pub fn loops(&self) -> &[LoopRecord] {
        &self.loops
    }

    pub fn literal(&mut self, value: ScalarValue) -> ir::Value {
        let ins = self.builder.ins();
        match value {
            ScalarValue::Boolean(v) => ins.iconst(types::I8, v as i64),
            ScalarValue::Int32(v) => ins.iconst(types::I32, v as i64),
            ScalarValue::Int64(v) => ins.iconst(types::I64, v),
            ScalarValue::Float(v) => ins.f32const(v),
            ScalarValue::Double(v) => ins.f64const(v),
        }
    }

    pub fn integer(&mut self, ty: Type, value: i64) -> ir::Value {
        self.builder.ins().iconst(ty, value)
    }

    pub fn declare_variable(&mut self, ty: Type, initial: ir::Value) -> Variable {
        let variable = Variable::new(self.next_variable);
        self.next_variable += 1;
        self.builder.declare_var(variable, ty);
        self.builder.def_var(variable, initial);
        variable
    }

    pub fn use_variable(&mut self, variable: Variable) -> ir::Value {
        self.builder.use_var(variable)
    }

    pub fn set_variable(&mut self, variable: Variable, value: ir::Value) {
        self.builder.def_var(variable, value);
    }

    /// Stack storage for `count` elements of `ty`; returns its address.
    pub fn allocate_stack(&mut self, ty: ElementType, count: usize) -> ir::Value {
        let bytes = (ty.size_in_bytes() * count.max(1)) as u32;
        let align_shift = ty.size_in_bytes().trailing_zeros() as u8;
        let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            bytes,
            align_shift,
        ));
        let pointer_type = self.pointer_type();
        self.builder.ins().stack_addr(pointer_type, slot, 0)
    }

    pub fn load(&mut self, ty: ElementType, address: ir::Value, offset: i32) -> ir::Value {
        self.builder
            .ins()
            .load(clif_type(ty), MemFlags::trusted(), address, offset)
    }

    pub fn store(&mut self, value: ir::Value, address: ir::Value, offset: i32) {
        self.builder
            .ins()
            .store(MemFlags::trusted(), value, address, offset);
    }

    /// `address + index * scale` with `index` widened or narrowed to pointer width.
    pub fn element_address(&mut self, address: ir::Value, index: ir::Value, scale: i64) -> ir::Value {
        let pointer_type = self.pointer_type();
        let index_type = self.builder.func.dfg.value_type(index);
        let index = if index_type.bits() < pointer_type.bits() {
            self.builder.ins().sextend(pointer_type, index)
        } else if index_type.bits() > pointer_type.bits() {
            self.builder.ins().ireduce(pointer_type, index)
        } else {
            index
        };
        let scaled = self.builder.ins().imul_imm(index, scale);
        self.builder.ins().iadd(address, scaled)
    }

    fn byte_count(&mut self, ty: ElementType, count: usize) -> ir::Value {
        let pointer_type = self.pointer_type();
        self.builder
            .ins()
            .iconst(pointer_type, (ty.size_in_bytes() * count) as i64)
    }

    /// Copies `count` elements between non-overlapping buffers.
    pub fn memory_copy(&mut self, destination: ir::Value, source: ir::Value, ty: ElementType, count: usize) {
        let size = self.byte_count(ty, count);
        let config = self.state.module.target_config();
        self.builder.call_memcpy(config, destination, source, size);
    }

    /// Like [`FunctionEmitter::memory_copy`], but the buffers may overlap.
    pub fn memory_move(&mut self, destination: ir::Value, source: ir::Value, ty: ElementType, count: usize) {
        let size = self.byte_count(ty, count);
        let config = self.state.module.target_config();
        self.builder.call_memmove(config, destination, source, size);
    }

    /// Zeroes `count` elements starting at `destination`.
    pub fn memory_clear(&mut self, destination: ir::Value, ty: ElementType, count: usize) {
        let size = self.byte_count(ty, count);
        let zero = self.builder.ins().iconst(types::I8, 0);
        let config = self.state.module.target_config();
        self.builder.call_memset(config, destination, zero, size);
    }

    fn data_address(&mut self, id: DataId) -> ir::Value {
        let global = self.state.module.declare_data_in_func(id, self.builder.func);
        let pointer_type = self.pointer_type();
        self.builder.ins().global_value(pointer_type, global)
    }

    /// Read-only data initialized with `bytes`; returns its address.
    pub fn constant_data(&mut self, bytes: Vec<u8>, align: u64) -> EmitResult<ir::Value> {
        let size = bytes.len();
        let id = self
            .state
            .declare_data(&format!("{}_const", self.name), Some(bytes), size, align)?;
        Ok(self.data_address(id))
    }

    /// Writable, zero-initialized data that outlives a single call.
    pub fn state_data(&mut self, size: usize, align: u64) -> EmitResult<(DataId, ir::Value)> {
        let id = self
            .state
            .declare_data(&format!("{}_state", self.name), None, size, align)?;
        Ok((id, self.data_address(id)))
    }

    /// Address of a data object declared earlier in this module.
    pub fn address_of(&mut self, id: DataId) -> ir::Value {
        self.data_address(id)
    }

    pub fn call(&mut self, callee: FuncId, args: &[ir::Value]) -> Vec<ir::Value> {
        let func_ref = self.state.module.declare_func_in_func(callee, self.builder.func);
        let call = self.builder.ins().call(func_ref, args);
        self.builder.inst_results(call).to_vec()
    }

    pub fn call_named(&mut self, callee: &str, args: &[ir::Value]) -> EmitResult<Vec<ir::Value>> {
        let id = self.state.function(callee)?;
        Ok(self.call(id, args))
    }

    /// Calls a function through a pointer held in a register.
    pub fn call_indirect(
        &mut self,
        signature: &super::FunctionSignature,
        callee: ir::Value,
        args: &[ir::Value],
    ) -> Vec<ir::Value> {
        let mut sig = self.state.module.make_signature();
        sig.params
            .extend(signature.params.iter().map(|&ty| ir::AbiParam::new(ty)));
        sig.returns
            .extend(signature.returns.iter().map(|&ty| ir::AbiParam::new(ty)));
        let sig_ref = self.builder.import_signature(sig);
        let call = self.builder.ins().call_indirect(sig_ref, callee, args);
        self.builder.inst_results(call).to_vec()
    }

    pub fn if_then(
        &mut self,
        condition: ir::Value,
        then: impl FnOnce(&mut Self) -> EmitResult<()>,
    ) -> EmitResult<()> {
        self.if_then_else(condition, then, |_| Ok(()))
    }

    pub fn if_then_else<E>(
        &mut self,
        condition: ir::Value,
        then: impl FnOnce(&mut Self) -> Result<(), E>,
        otherwise: impl FnOnce(&mut Self) -> Result<(), E>,
    ) -> Result<(), E> {
        let then_block = self.builder.create_block();
        let else_block = self.builder.create_block();
        let merge_block = self.builder.create_block();

        self.builder
            .ins()
            .brif(condition, then_block, &[], else_block, &[]);

        self.builder.switch_to_block(then_block);
        then(self)?;
        self.builder.ins().jump(merge_block, &[]);

        self.builder.switch_to_block(else_block);
        otherwise(self)?;
        self.builder.ins().jump(merge_block, &[]);

        self.builder.switch_to_block(merge_block);
        Ok(())
    }

    /// Integer comparison producing a branch condition.
    pub fn compare(&mut self, cond: IntCC, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.builder.ins().icmp(cond, lhs, rhs)
    }
}
