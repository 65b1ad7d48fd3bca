use super::context::ExecutionContext;
use super::types::{BinaryOperation, ElementType, ScalarValue, UnaryOperation};
use super::value::Value;
use crate::error::{ValueError, ValueResult};

/// A zero-dimensional view over a [`Value`].
#[derive(Clone, Debug)]
pub struct Scalar {
    value: Value,
}

impl Scalar {
    pub fn new(value: Value) -> ValueResult<Self> {
        let dimensions = value.layout()?.num_dimensions();
        if dimensions != 0 {
            return Err(ValueError::DimensionMismatch {
                expected: 0,
                found: dimensions,
            });
        }
        Ok(Self { value })
    }

    pub fn literal(value: impl Into<ScalarValue>) -> Self {
        Self {
            value: Value::literal(value),
        }
    }

    pub(crate) fn register(ty: ElementType, value: cranelift::codegen::ir::Value) -> Self {
        Self {
            value: Value::register(ty, value),
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.value.element_type()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn as_literal(&self) -> Option<ScalarValue> {
        self.value.as_literal()
    }

    /// A literal index, if this scalar is one. Negative literals are out of range.
    pub(crate) fn literal_index(&self, extent: usize) -> ValueResult<Option<usize>> {
        let Some(literal) = self.as_literal() else {
            return Ok(None);
        };
        let raw = literal.as_integer().ok_or(ValueError::UnsupportedOperation {
            operation: "index",
            ty: literal.element_type(),
        })?;
        usize::try_from(raw)
            .map(Some)
            .map_err(|_| ValueError::OutOfRange { index: raw, extent })
    }

    /// Reads the element on the host. Fails for emitted values.
    pub fn get(&self) -> ValueResult<ScalarValue> {
        self.value.read_host(&[])
    }

    pub fn binary(
        &self,
        ctx: &mut dyn ExecutionContext,
        op: BinaryOperation,
        rhs: &Scalar,
    ) -> ValueResult<Scalar> {
        if self.element_type() != rhs.element_type() {
            return Err(ValueError::TypeMismatch {
                expected: self.element_type(),
                found: rhs.element_type(),
            });
        }
        if let (Some(a), Some(b)) = (self.as_literal(), rhs.as_literal()) {
            return Ok(Scalar::literal(a.binary(op, b)?));
        }
        ctx.binary(op, self, rhs)
    }

    pub fn unary(&self, ctx: &mut dyn ExecutionContext, op: UnaryOperation) -> ValueResult<Scalar> {
        if let Some(a) = self.as_literal() {
            return Ok(Scalar::literal(a.unary(op)?));
        }
        ctx.unary(op, self)
    }

    pub fn assign(&self, ctx: &mut dyn ExecutionContext, source: &Scalar) -> ValueResult<()> {
        if self.element_type() != source.element_type() {
            return Err(ValueError::TypeMismatch {
                expected: self.element_type(),
                found: source.element_type(),
            });
        }
        ctx.store(self, source)
    }

    /// `self = self op rhs`
    pub fn update(
        &self,
        ctx: &mut dyn ExecutionContext,
        op: BinaryOperation,
        rhs: &Scalar,
    ) -> ValueResult<()> {
        let result = self.binary(ctx, op, rhs)?;
        self.assign(ctx, &result)
    }

    pub fn add(&self, ctx: &mut dyn ExecutionContext, rhs: &Scalar) -> ValueResult<Scalar> {
        self.binary(ctx, BinaryOperation::Add, rhs)
    }

    pub fn multiply(&self, ctx: &mut dyn ExecutionContext, rhs: &Scalar) -> ValueResult<Scalar> {
        self.binary(ctx, BinaryOperation::Multiply, rhs)
    }
}

macro_rules! scalar_literal_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::literal(value)
                }
            }
        )*
    };
}

scalar_literal_from!(bool, i32, i64, f32, f64, ScalarValue);

impl From<usize> for Scalar {
    fn from(index: usize) -> Self {
        Scalar::literal(index as i64)
    }
}
