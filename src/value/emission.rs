use cranelift::codegen::ir;
use cranelift::prelude::{FloatCC, InstBuilder, IntCC};

use super::context::{ExecutionContext, IndexBody};
use super::layout::MemoryLayout;
use super::scalar::Scalar;
use super::types::{BinaryOperation, ElementType, UnaryOperation};
use super::value::{Storage, Value};
use crate::emitter::{clif_type, FunctionEmitter};
use crate::error::{ValueError, ValueResult};

/// Emits native instructions for value-algebra operations into a function.
pub struct EmissionContext<'f, 'a> {
    function: &'f mut FunctionEmitter<'a>,
}

impl<'f, 'a> EmissionContext<'f, 'a> {
    pub fn new(function: &'f mut FunctionEmitter<'a>) -> Self {
        Self { function }
    }

    pub fn function(&mut self) -> &mut FunctionEmitter<'a> {
        &mut *self.function
    }

    fn mismatch(&self) -> ValueError {
        ValueError::ContextMismatch {
            context: "emission",
        }
    }

    /// Brings a scalar into a register.
    pub fn read(&mut self, scalar: &Scalar) -> ValueResult<ir::Value> {
        match scalar.value().storage {
            Storage::Literal(value) => Ok(self.function.literal(value)),
            Storage::Register(value) => Ok(value),
            Storage::Address(address) => Ok(self.function.load(scalar.element_type(), address, 0)),
            Storage::Host { .. } => Err(self.mismatch()),
        }
    }

    fn emit_binary(
        &mut self,
        op: BinaryOperation,
        ty: ElementType,
        a: ir::Value,
        b: ir::Value,
    ) -> ValueResult<ir::Value> {
        use BinaryOperation::*;
        Ok(match ty {
            ElementType::Int32 | ElementType::Int64 => match op {
                Add => self.function.ins().iadd(a, b),
                Subtract => self.function.ins().isub(a, b),
                Multiply => self.function.ins().imul(a, b),
                Divide => self.wrapping_sdiv(clif_type(ty), a, b),
                Max => self.function.ins().smax(a, b),
                Min => self.function.ins().smin(a, b),
            },
            ElementType::Float | ElementType::Double => match op {
                Add => self.function.ins().fadd(a, b),
                Subtract => self.function.ins().fsub(a, b),
                Multiply => self.function.ins().fmul(a, b),
                Divide => self.function.ins().fdiv(a, b),
                Max | Min => self.float_extremum(op, a, b),
            },
            ElementType::Boolean => {
                return Err(ValueError::UnsupportedOperation {
                    operation: op.name(),
                    ty,
                })
            }
        })
    }

    /// `a / b` that wraps `MIN / -1` to `MIN` instead of trapping.
    fn wrapping_sdiv(&mut self, ty: ir::Type, a: ir::Value, b: ir::Value) -> ir::Value {
        let minus_one = self.function.integer(ty, -1);
        let one = self.function.integer(ty, 1);
        let by_minus_one = self.function.ins().icmp(IntCC::Equal, b, minus_one);
        let divisor = self.function.ins().select(by_minus_one, one, b);
        let quotient = self.function.ins().sdiv(a, divisor);
        let negated = self.function.ins().ineg(a);
        self.function.ins().select(by_minus_one, negated, quotient)
    }

    /// Float `max`/`min` that ignore a NaN operand, as `f32::max` does.
    fn float_extremum(&mut self, op: BinaryOperation, a: ir::Value, b: ir::Value) -> ir::Value {
        let a_nan = self.function.ins().fcmp(FloatCC::Unordered, a, a);
        let b_nan = self.function.ins().fcmp(FloatCC::Unordered, b, b);
        let extremum = if op == BinaryOperation::Max {
            self.function.ins().fmax(a, b)
        } else {
            self.function.ins().fmin(a, b)
        };
        let picked = self.function.ins().select(b_nan, a, extremum);
        self.function.ins().select(a_nan, b, picked)
    }

    fn emit_unary(&mut self, op: UnaryOperation, ty: ElementType, a: ir::Value) -> ValueResult<ir::Value> {
        use UnaryOperation::*;
        let unsupported = ValueError::UnsupportedOperation {
            operation: op.name(),
            ty,
        };
        Ok(match ty {
            ElementType::Int32 | ElementType::Int64 => match op {
                Abs => self.function.ins().iabs(a),
                Negate => self.function.ins().ineg(a),
                Square => self.function.ins().imul(a, a),
                Relu => {
                    let zero = self.function.integer(clif_type(ty), 0);
                    self.function.ins().smax(a, zero)
                }
                Sqrt => return Err(unsupported),
            },
            ElementType::Float | ElementType::Double => match op {
                Abs => self.function.ins().fabs(a),
                Negate => self.function.ins().fneg(a),
                Square => self.function.ins().fmul(a, a),
                Sqrt => self.function.ins().sqrt(a),
                Relu => {
                    let zero = if ty == ElementType::Float {
                        self.function.ins().f32const(0.0)
                    } else {
                        self.function.ins().f64const(0.0)
                    };
                    self.float_extremum(BinaryOperation::Max, a, zero)
                }
            },
            ElementType::Boolean => return Err(unsupported),
        })
    }

    fn nest(
        &mut self,
        sizes: &[usize],
        indices: &mut Vec<Scalar>,
        body: &mut IndexBody<'_>,
    ) -> ValueResult<()> {
        let Some((&size, rest)) = sizes.split_first() else {
            return body(self, &indices[..]);
        };
        self.function.for_count(size, |function, index| {
            indices.push(Scalar::register(ElementType::Int64, index));
            let result = EmissionContext::new(function).nest(rest, indices, body);
            indices.pop();
            result
        })
    }
}

impl ExecutionContext for EmissionContext<'_, '_> {
    fn name(&self) -> &'static str {
        "emission"
    }

    fn allocate(&mut self, ty: ElementType, layout: &MemoryLayout) -> ValueResult<Value> {
        let count = layout.memory_span();
        let address = self.function.allocate_stack(ty, count);
        self.function.memory_clear(address, ty, count.max(1));
        Ok(Value::address(ty, address, layout.clone()))
    }

    fn offset(&mut self, value: &Value, indices: &[Scalar]) -> ValueResult<Value> {
        let layout = value.layout()?;
        if indices.len() > layout.num_dimensions() {
            return Err(ValueError::DimensionMismatch {
                expected: layout.num_dimensions(),
                found: indices.len(),
            });
        }
        let Storage::Address(base) = value.storage else {
            return Err(self.mismatch());
        };

        let element_size = value.element_type().size_in_bytes() as i64;
        let mut address = base;
        let mut constant = 0i64;
        for (dimension, index) in indices.iter().enumerate() {
            let scale = layout.stride(dimension) as i64 * element_size;
            if let Some(literal) = index.as_literal() {
                let i = literal.as_integer().ok_or(ValueError::UnsupportedOperation {
                    operation: "index",
                    ty: literal.element_type(),
                })?;
                constant += i * scale;
            } else {
                let i = self.read(index)?;
                address = self.function.element_address(address, i, scale);
            }
        }
        if constant != 0 {
            address = self.function.ins().iadd_imm(address, constant);
        }
        Ok(Value::address(value.element_type(), address, layout.clone()))
    }

    fn binary(&mut self, op: BinaryOperation, lhs: &Scalar, rhs: &Scalar) -> ValueResult<Scalar> {
        let a = self.read(lhs)?;
        let b = self.read(rhs)?;
        let result = self.emit_binary(op, lhs.element_type(), a, b)?;
        Ok(Scalar::register(lhs.element_type(), result))
    }

    fn unary(&mut self, op: UnaryOperation, operand: &Scalar) -> ValueResult<Scalar> {
        let a = self.read(operand)?;
        let result = self.emit_unary(op, operand.element_type(), a)?;
        Ok(Scalar::register(operand.element_type(), result))
    }

    fn store(&mut self, destination: &Scalar, source: &Scalar) -> ValueResult<()> {
        let address = match destination.value().storage {
            Storage::Address(address) => address,
            Storage::Literal(_) | Storage::Register(_) => {
                return Err(ValueError::UnsupportedOperation {
                    operation: "store to non-addressable scalar",
                    ty: destination.element_type(),
                })
            }
            Storage::Host { .. } => return Err(self.mismatch()),
        };
        let value = self.read(source)?;
        self.function.store(value, address, 0);
        Ok(())
    }

    fn for_each(&mut self, layout: &MemoryLayout, body: &mut IndexBody<'_>) -> ValueResult<()> {
        let sizes = layout.sizes().to_vec();
        let mut indices = Vec::with_capacity(sizes.len());
        self.nest(&sizes, &mut indices, body)
    }
}
