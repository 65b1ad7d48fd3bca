use super::context::ExecutionContext;
use super::layout::{DimensionOrder, MemoryLayout};
use super::scalar::Scalar;
use super::types::{BinaryOperation, ElementType, HostData};
use super::value::Value;
use super::vector::Vector;
use crate::error::{ValueError, ValueResult};

/// A two-dimensional view over a [`Value`]. Indices are `(row, column)`
/// regardless of the dimension order of the underlying storage.
#[derive(Clone, Debug)]
pub struct Matrix {
    value: Value,
    layout: MemoryLayout,
}

impl Matrix {
    pub fn new(value: Value) -> ValueResult<Self> {
        let layout = value.layout()?.clone();
        if layout.num_dimensions() != 2 {
            return Err(ValueError::DimensionMismatch {
                expected: 2,
                found: layout.num_dimensions(),
            });
        }
        Ok(Self { value, layout })
    }

    /// Host matrix over `data`, which holds `rows * columns` elements in `order`.
    pub fn from_data(
        data: impl Into<HostData>,
        rows: usize,
        columns: usize,
        order: DimensionOrder,
    ) -> ValueResult<Self> {
        let data = data.into();
        if data.len() != rows * columns {
            return Err(ValueError::SizeMismatch {
                expected: vec![rows, columns],
                found: vec![data.len()],
            });
        }
        Self::new(Value::from_data(data, MemoryLayout::matrix(rows, columns, order))?)
    }

    pub fn allocate(
        ctx: &mut dyn ExecutionContext,
        ty: ElementType,
        rows: usize,
        columns: usize,
        order: DimensionOrder,
    ) -> ValueResult<Self> {
        Self::new(ctx.allocate(ty, &MemoryLayout::matrix(rows, columns, order))?)
    }

    pub fn rows(&self) -> usize {
        self.layout.size(0)
    }

    pub fn columns(&self) -> usize {
        self.layout.size(1)
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

    fn check_index(index: &Scalar, extent: usize) -> ValueResult<()> {
        if let Some(i) = index.literal_index(extent)? {
            if i >= extent {
                return Err(ValueError::OutOfRange {
                    index: i as i64,
                    extent,
                });
            }
        }
        Ok(())
    }

    pub fn at(
        &self,
        ctx: &mut dyn ExecutionContext,
        row: impl Into<Scalar>,
        column: impl Into<Scalar>,
    ) -> ValueResult<Scalar> {
        let (row, column) = (row.into(), column.into());
        Self::check_index(&row, self.rows())?;
        Self::check_index(&column, self.columns())?;
        let element = ctx.offset(&self.value, &[row, column])?;
        Scalar::new(element.with_layout(MemoryLayout::scalar()))
    }

    /// A `num_rows` by `num_columns` view whose top-left corner is `(row, column)`.
    pub fn sub_matrix(
        &self,
        ctx: &mut dyn ExecutionContext,
        row: impl Into<Scalar>,
        column: impl Into<Scalar>,
        num_rows: usize,
        num_columns: usize,
    ) -> ValueResult<Matrix> {
        let (row, column) = (row.into(), column.into());
        for (count, extent) in [(num_rows, self.rows()), (num_columns, self.columns())] {
            if count > extent {
                return Err(ValueError::OutOfRange {
                    index: count as i64,
                    extent,
                });
            }
        }
        if let Some(r) = row.literal_index(self.rows())? {
            if r + num_rows > self.rows() {
                return Err(ValueError::OutOfRange {
                    index: (r + num_rows) as i64,
                    extent: self.rows(),
                });
            }
        }
        if let Some(c) = column.literal_index(self.columns())? {
            if c + num_columns > self.columns() {
                return Err(ValueError::OutOfRange {
                    index: (c + num_columns) as i64,
                    extent: self.columns(),
                });
            }
        }
        let layout = self.layout.with_sizes(&[num_rows, num_columns])?;
        let view = ctx.offset(&self.value, &[row, column])?;
        Matrix::new(view.with_layout(layout))
    }

    pub fn row(&self, ctx: &mut dyn ExecutionContext, index: impl Into<Scalar>) -> ValueResult<Vector> {
        let index = index.into();
        Self::check_index(&index, self.rows())?;
        let view = ctx.offset(&self.value, &[index, Scalar::literal(0i64)])?;
        Vector::new(view.with_layout(self.layout.without_dimension(0)))
    }

    pub fn column(
        &self,
        ctx: &mut dyn ExecutionContext,
        index: impl Into<Scalar>,
    ) -> ValueResult<Vector> {
        let index = index.into();
        Self::check_index(&index, self.columns())?;
        let view = ctx.offset(&self.value, &[Scalar::literal(0i64), index])?;
        Vector::new(view.with_layout(self.layout.without_dimension(1)))
    }

    /// Fresh storage with the same elements and dimension nesting.
    pub fn copy(&self, ctx: &mut dyn ExecutionContext) -> ValueResult<Matrix> {
        let copy = Matrix::new(ctx.allocate(self.element_type(), &self.layout.packed())?)?;
        copy.assign(ctx, self)?;
        Ok(copy)
    }

    fn check_compatible(&self, other: &Matrix) -> ValueResult<()> {
        if self.rows() != other.rows() || self.columns() != other.columns() {
            return Err(ValueError::SizeMismatch {
                expected: vec![self.rows(), self.columns()],
                found: vec![other.rows(), other.columns()],
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

    /// Runs `body(ctx, row, column)` for every element, row-major.
    pub fn for_each(
        &self,
        ctx: &mut dyn ExecutionContext,
        mut body: impl FnMut(&mut dyn ExecutionContext, &Scalar, &Scalar) -> ValueResult<()>,
    ) -> ValueResult<()> {
        ctx.for_each(&self.layout, &mut |ctx, index| body(ctx, &index[0], &index[1]))
    }

    pub fn assign(&self, ctx: &mut dyn ExecutionContext, source: &Matrix) -> ValueResult<()> {
        self.check_compatible(source)?;
        self.for_each(ctx, |ctx, row, column| {
            let element = source.at(ctx, row.clone(), column.clone())?;
            self.at(ctx, row.clone(), column.clone())?.assign(ctx, &element)
        })
    }

    /// `self[r, c] = self[r, c] op other[r, c]`
    pub fn update(
        &self,
        ctx: &mut dyn ExecutionContext,
        op: BinaryOperation,
        other: &Matrix,
    ) -> ValueResult<()> {
        self.check_compatible(other)?;
        self.for_each(ctx, |ctx, row, column| {
            let rhs = other.at(ctx, row.clone(), column.clone())?;
            self.at(ctx, row.clone(), column.clone())?.update(ctx, op, &rhs)
        })
    }

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
        self.for_each(ctx, |ctx, row, column| {
            self.at(ctx, row.clone(), column.clone())?.update(ctx, op, scalar)
        })
    }

    pub fn add_assign(&self, ctx: &mut dyn ExecutionContext, other: &Matrix) -> ValueResult<()> {
        self.update(ctx, BinaryOperation::Add, other)
    }

    pub fn sub_assign(&self, ctx: &mut dyn ExecutionContext, other: &Matrix) -> ValueResult<()> {
        self.update(ctx, BinaryOperation::Subtract, other)
    }

    /// `output = self * vector`
    pub fn multiply_vector(
        &self,
        ctx: &mut dyn ExecutionContext,
        vector: &Vector,
        output: &Vector,
    ) -> ValueResult<()> {
        if vector.size() != self.columns() || output.size() != self.rows() {
            return Err(ValueError::SizeMismatch {
                expected: vec![self.rows(), self.columns()],
                found: vec![output.size(), vector.size()],
            });
        }
        for other in [vector.element_type(), output.element_type()] {
            if other != self.element_type() {
                return Err(ValueError::TypeMismatch {
                    expected: self.element_type(),
                    found: other,
                });
            }
        }
        ctx.for_each(&MemoryLayout::vector(self.rows()), &mut |ctx, index| {
            let row = self.row(ctx, index[0].clone())?;
            let sum = row.dot(ctx, vector)?;
            output.at(ctx, index[0].clone())?.assign(ctx, &sum)
        })
    }

    pub fn to_host_data(&self) -> ValueResult<HostData> {
        self.value.to_host_data()
    }
}
