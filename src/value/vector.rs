use super::context::ExecutionContext;
use super::layout::MemoryLayout;
use super::scalar::Scalar;
use super::types::{BinaryOperation, ElementType, HostData, ScalarValue, UnaryOperation};
use super::value::Value;
use crate::error::{ValueError, ValueResult};

/// A one-dimensional view over a [`Value`].
///
/// Views share storage: writing through a sub-vector is visible in the
/// vector it was taken from. Use [`Vector::copy`] for independent storage.
#[derive(Clone, Debug)]
pub struct Vector {
    value: Value,
    layout: MemoryLayout,
}

impl Vector {
    pub fn new(value: Value) -> ValueResult<Self> {
        let layout = value.layout()?.clone();
        if layout.num_dimensions() != 1 {
            return Err(ValueError::DimensionMismatch {
                expected: 1,
                found: layout.num_dimensions(),
            });
        }
        Ok(Self { value, layout })
    }

    /// A packed host vector holding `data`.
    pub fn from_data(data: impl Into<HostData>) -> Self {
        let data = data.into();
        let layout = MemoryLayout::vector(data.len());
        Self {
            value: Value::packed(data),
            layout,
        }
    }

    pub fn allocate(ctx: &mut dyn ExecutionContext, ty: ElementType, size: usize) -> ValueResult<Self> {
        Self::new(ctx.allocate(ty, &MemoryLayout::vector(size))?)
    }

    pub fn size(&self) -> usize {
        self.layout().size(0)
    }

    pub fn element_type(&self) -> ElementType {
        self.value.element_type()
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn at(&self, ctx: &mut dyn ExecutionContext, index: impl Into<Scalar>) -> ValueResult<Scalar> {
        let index = index.into();
        if let Some(i) = index.literal_index(self.size())? {
            if i >= self.size() {
                return Err(ValueError::OutOfRange {
                    index: i as i64,
                    extent: self.size(),
                });
            }
        }
        let element = ctx.offset(&self.value, &[index])?;
        Scalar::new(element.with_layout(MemoryLayout::scalar()))
    }

    /// A view of `size` elements starting at `offset`.
    pub fn sub_vector(
        &self,
        ctx: &mut dyn ExecutionContext,
        offset: impl Into<Scalar>,
        size: usize,
    ) -> ValueResult<Vector> {
        let offset = offset.into();
        let out_of_range = |index: usize| ValueError::OutOfRange {
            index: index as i64,
            extent: self.size(),
        };
        if size > self.size() {
            return Err(out_of_range(size));
        }
        if let Some(start) = offset.literal_index(self.size())? {
            if start + size > self.size() {
                return Err(out_of_range(start + size));
            }
        }
        let layout = self.layout().with_sizes(&[size])?;
        let view = ctx.offset(&self.value, &[offset])?;
        Vector::new(view.with_layout(layout))
    }

    /// Fresh storage holding the same elements.
    pub fn copy(&self, ctx: &mut dyn ExecutionContext) -> ValueResult<Vector> {
        let copy = Vector::new(ctx.allocate(self.element_type(), &self.layout().packed())?)?;
        copy.assign(ctx, self)?;
        Ok(copy)
    }

    fn check_compatible(&self, other: &Vector) -> ValueResult<()> {
        if self.size() != other.size() {
            return Err(ValueError::SizeMismatch {
                expected: vec![self.size()],
                found: vec![other.size()],
            });
        }
        if self.element_type() != other.element_type() {
            return Err(ValueError::TypeMismatch {
                expected: self.element_type(),
                found: other.element_type(),
            });
        }
        Ok(())
    }

    /// Elementwise copy of `source` into this view.
    pub fn assign(&self, ctx: &mut dyn ExecutionContext, source: &Vector) -> ValueResult<()> {
        self.check_compatible(source)?;
        ctx.for_each(self.layout(), &mut |ctx, index| {
            let destination = self.at(ctx, index[0].clone())?;
            let element = source.at(ctx, index[0].clone())?;
            destination.assign(ctx, &element)
        })
    }

    pub fn fill(&self, ctx: &mut dyn ExecutionContext, value: &Scalar) -> ValueResult<()> {
        ctx.for_each(self.layout(), &mut |ctx, index| {
            self.at(ctx, index[0].clone())?.assign(ctx, value)
        })
    }

    /// `self[i] = self[i] op other[i]`
    pub fn update(
        &self,
        ctx: &mut dyn ExecutionContext,
        op: BinaryOperation,
        other: &Vector,
    ) -> ValueResult<()> {
        self.check_compatible(other)?;
        ctx.for_each(self.layout(), &mut |ctx, index| {
            let element = self.at(ctx, index[0].clone())?;
            let rhs = other.at(ctx, index[0].clone())?;
            element.update(ctx, op, &rhs)
        })
    }

    /// `self[i] = self[i] op scalar`
    pub fn update_scalar(
        &self,
        ctx: &mut dyn ExecutionContext,
        op: BinaryOperation,
        scalar: &Scalar,
    ) -> ValueResult<()> {
        if self.element_type() != scalar.element_type() {
            return Err(ValueError::TypeMismatch {
                expected: self.element_type(),
                found: scalar.element_type(),
            });
        }
        ctx.for_each(self.layout(), &mut |ctx, index| {
            self.at(ctx, index[0].clone())?.update(ctx, op, scalar)
        })
    }

    pub fn apply(&self, ctx: &mut dyn ExecutionContext, op: UnaryOperation) -> ValueResult<()> {
        ctx.for_each(self.layout(), &mut |ctx, index| {
            let element = self.at(ctx, index[0].clone())?;
            let result = element.unary(ctx, op)?;
            element.assign(ctx, &result)
        })
    }

    pub fn add_assign(&self, ctx: &mut dyn ExecutionContext, other: &Vector) -> ValueResult<()> {
        self.update(ctx, BinaryOperation::Add, other)
    }

    pub fn sub_assign(&self, ctx: &mut dyn ExecutionContext, other: &Vector) -> ValueResult<()> {
        self.update(ctx, BinaryOperation::Subtract, other)
    }

    pub fn mul_assign(&self, ctx: &mut dyn ExecutionContext, other: &Vector) -> ValueResult<()> {
        self.update(ctx, BinaryOperation::Multiply, other)
    }

    pub fn div_assign(&self, ctx: &mut dyn ExecutionContext, other: &Vector) -> ValueResult<()> {
        self.update(ctx, BinaryOperation::Divide, other)
    }

    pub fn add_scalar(&self, ctx: &mut dyn ExecutionContext, scalar: &Scalar) -> ValueResult<()> {
        self.update_scalar(ctx, BinaryOperation::Add, scalar)
    }

    pub fn scale(&self, ctx: &mut dyn ExecutionContext, scalar: &Scalar) -> ValueResult<()> {
        self.update_scalar(ctx, BinaryOperation::Multiply, scalar)
    }

    /// Sum of elementwise products, accumulated in fresh scalar storage.
    pub fn dot(&self, ctx: &mut dyn ExecutionContext, other: &Vector) -> ValueResult<Scalar> {
        self.check_compatible(other)?;
        let sum = Scalar::new(ctx.allocate(self.element_type(), &MemoryLayout::scalar())?)?;
        sum.assign(ctx, &Scalar::literal(ScalarValue::zero(self.element_type())))?;
        ctx.for_each(self.layout(), &mut |ctx, index| {
            let a = self.at(ctx, index[0].clone())?;
            let b = other.at(ctx, index[0].clone())?;
            let product = a.multiply(ctx, &b)?;
            sum.update(ctx, BinaryOperation::Add, &product)
        })?;
        Ok(sum)
    }

    pub fn to_host_data(&self) -> ValueResult<HostData> {
        self.value.to_host_data()
    }
}
