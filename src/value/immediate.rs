use std::cell::RefCell;
use std::rc::Rc;

use super::context::{ExecutionContext, IndexBody};
use super::layout::MemoryLayout;
use super::scalar::Scalar;
use super::types::{BinaryOperation, ElementType, HostData, UnaryOperation};
use super::value::{Storage, Value};
use crate::error::{ValueError, ValueResult};

/// Evaluates the value algebra directly on host memory.
#[derive(Debug, Default)]
pub struct ImmediateContext {
    allocations: usize,
}

impl ImmediateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffers allocated through this context so far.
    pub fn allocations(&self) -> usize {
        self.allocations
    }
}

fn host_index(index: &Scalar) -> ValueResult<usize> {
    let value = index.get()?;
    let raw = value.as_integer().ok_or(ValueError::UnsupportedOperation {
        operation: "index",
        ty: value.element_type(),
    })?;
    usize::try_from(raw).map_err(|_| ValueError::OutOfRange {
        index: raw,
        extent: 0,
    })
}

impl ExecutionContext for ImmediateContext {
    fn name(&self) -> &'static str {
        "immediate"
    }

    fn allocate(&mut self, ty: ElementType, layout: &MemoryLayout) -> ValueResult<Value> {
        self.allocations += 1;
        let data = HostData::zeros(ty, layout.memory_span().max(1));
        Ok(Value::host(Rc::new(RefCell::new(data)), 0, layout.clone()))
    }

    fn offset(&mut self, value: &Value, indices: &[Scalar]) -> ValueResult<Value> {
        let layout = value.layout()?;
        if indices.len() > layout.num_dimensions() {
            return Err(ValueError::DimensionMismatch {
                expected: layout.num_dimensions(),
                found: indices.len(),
            });
        }
        let indices = indices
            .iter()
            .map(host_index)
            .collect::<ValueResult<Vec<_>>>()?;
        match &value.storage {
            Storage::Host { data, offset } => Ok(Value::host(
                Rc::clone(data),
                offset + layout.offset_of(&indices),
                layout.clone(),
            )),
            Storage::Literal(_) if indices.iter().all(|&i| i == 0) => Ok(value.clone()),
            _ => Err(ValueError::ContextMismatch {
                context: self.name(),
            }),
        }
    }

    fn binary(&mut self, op: BinaryOperation, lhs: &Scalar, rhs: &Scalar) -> ValueResult<Scalar> {
        Ok(Scalar::literal(lhs.get()?.binary(op, rhs.get()?)?))
    }

    fn unary(&mut self, op: UnaryOperation, operand: &Scalar) -> ValueResult<Scalar> {
        Ok(Scalar::literal(operand.get()?.unary(op)?))
    }

    fn store(&mut self, destination: &Scalar, source: &Scalar) -> ValueResult<()> {
        let value = source.get()?;
        match &destination.value().storage {
            Storage::Host { data, offset } => data.borrow_mut().set(*offset, value),
            Storage::Literal(_) => Err(ValueError::UnsupportedOperation {
                operation: "store to literal",
                ty: destination.element_type(),
            }),
            _ => Err(ValueError::ContextMismatch {
                context: self.name(),
            }),
        }
    }

    fn for_each(&mut self, layout: &MemoryLayout, body: &mut IndexBody<'_>) -> ValueResult<()> {
        layout.for_each_index(|indices| {
            let indices: Vec<Scalar> = indices
                .iter()
                .map(|&i| Scalar::literal(i as i64))
                .collect();
            body(&mut *self, &indices)
        })
    }
}
