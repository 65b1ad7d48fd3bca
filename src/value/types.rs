use serde::{Deserialize, Serialize};

use crate::error::{ValueError, ValueResult};

/// Element types a port or value can carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Boolean,
    Int32,
    Int64,
    Float,
    Double,
}

impl ElementType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            ElementType::Boolean => 1,
            ElementType::Int32 | ElementType::Float => 4,
            ElementType::Int64 | ElementType::Double => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElementType::Float | ElementType::Double)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ElementType::Int32 | ElementType::Int64)
    }
}

/// Elementwise binary operations shared by nodes and the value algebra.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Max,
    Min,
}

impl BinaryOperation {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOperation::Add => "add",
            BinaryOperation::Subtract => "subtract",
            BinaryOperation::Multiply => "multiply",
            BinaryOperation::Divide => "divide",
            BinaryOperation::Max => "max",
            BinaryOperation::Min => "min",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperation {
    Abs,
    Negate,
    Sqrt,
    Square,
    Relu,
}

impl UnaryOperation {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOperation::Abs => "abs",
            UnaryOperation::Negate => "negate",
            UnaryOperation::Sqrt => "sqrt",
            UnaryOperation::Square => "square",
            UnaryOperation::Relu => "relu",
        }
    }
}

/// A single typed element known on the host.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
}

impl ScalarValue {
    pub fn zero(ty: ElementType) -> Self {
        match ty {
            ElementType::Boolean => ScalarValue::Boolean(false),
            ElementType::Int32 => ScalarValue::Int32(0),
            ElementType::Int64 => ScalarValue::Int64(0),
            ElementType::Float => ScalarValue::Float(0.0),
            ElementType::Double => ScalarValue::Double(0.0),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            ScalarValue::Boolean(_) => ElementType::Boolean,
            ScalarValue::Int32(_) => ElementType::Int32,
            ScalarValue::Int64(_) => ElementType::Int64,
            ScalarValue::Float(_) => ElementType::Float,
            ScalarValue::Double(_) => ElementType::Double,
        }
    }

    /// Integer payload, if this is an integer element.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            ScalarValue::Int32(v) => Some(v as i64),
            ScalarValue::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            ScalarValue::Boolean(v) => v as u8 as f64,
            ScalarValue::Int32(v) => v as f64,
            ScalarValue::Int64(v) => v as f64,
            ScalarValue::Float(v) => v as f64,
            ScalarValue::Double(v) => v,
        }
    }

    /// Evaluates `self op rhs` on the host. Integer arithmetic wraps.
    pub fn binary(self, op: BinaryOperation, rhs: ScalarValue) -> ValueResult<ScalarValue> {
        use BinaryOperation::*;
        use ScalarValue::*;

        let unsupported = || ValueError::UnsupportedOperation {
            operation: op.name(),
            ty: self.element_type(),
        };

        Ok(match (self, rhs) {
            (Int32(a), Int32(b)) => Int32(match op {
                Add => a.wrapping_add(b),
                Subtract => a.wrapping_sub(b),
                Multiply => a.wrapping_mul(b),
                Divide if b == 0 => return Err(ValueError::DivideByZero),
                Divide => a.wrapping_div(b),
                Max => a.max(b),
                Min => a.min(b),
            }),
            (Int64(a), Int64(b)) => Int64(match op {
                Add => a.wrapping_add(b),
                Subtract => a.wrapping_sub(b),
                Multiply => a.wrapping_mul(b),
                Divide if b == 0 => return Err(ValueError::DivideByZero),
                Divide => a.wrapping_div(b),
                Max => a.max(b),
                Min => a.min(b),
            }),
            (Float(a), Float(b)) => Float(match op {
                Add => a + b,
                Subtract => a - b,
                Multiply => a * b,
                Divide => a / b,
                Max => a.max(b),
                Min => a.min(b),
            }),
            (Double(a), Double(b)) => Double(match op {
                Add => a + b,
                Subtract => a - b,
                Multiply => a * b,
                Divide => a / b,
                Max => a.max(b),
                Min => a.min(b),
            }),
            (Boolean(_), Boolean(_)) => return Err(unsupported()),
            (lhs, rhs) => {
                return Err(ValueError::TypeMismatch {
                    expected: lhs.element_type(),
                    found: rhs.element_type(),
                })
            }
        })
    }

    pub fn unary(self, op: UnaryOperation) -> ValueResult<ScalarValue> {
        use ScalarValue::*;
        use UnaryOperation::*;

        let unsupported = || ValueError::UnsupportedOperation {
            operation: op.name(),
            ty: self.element_type(),
        };

        Ok(match self {
            Int32(v) => Int32(match op {
                Abs => v.wrapping_abs(),
                Negate => v.wrapping_neg(),
                Square => v.wrapping_mul(v),
                Relu => v.max(0),
                Sqrt => return Err(unsupported()),
            }),
            Int64(v) => Int64(match op {
                Abs => v.wrapping_abs(),
                Negate => v.wrapping_neg(),
                Square => v.wrapping_mul(v),
                Relu => v.max(0),
                Sqrt => return Err(unsupported()),
            }),
            Float(v) => Float(match op {
                Abs => v.abs(),
                Negate => -v,
                Square => v * v,
                Relu => v.max(0.0),
                Sqrt => v.sqrt(),
            }),
            Double(v) => Double(match op {
                Abs => v.abs(),
                Negate => -v,
                Square => v * v,
                Relu => v.max(0.0),
                Sqrt => v.sqrt(),
            }),
            Boolean(_) => return Err(unsupported()),
        })
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ScalarValue {
                fn from(value: $ty) -> Self {
                    ScalarValue::$variant(value)
                }
            }
        )*
    };
}

scalar_from!(bool => Boolean, i32 => Int32, i64 => Int64, f32 => Float, f64 => Double);

/// Dense, typed element storage owned by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostData {
    Boolean(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl HostData {
    pub fn zeros(ty: ElementType, len: usize) -> Self {
        match ty {
            ElementType::Boolean => HostData::Boolean(vec![false; len]),
            ElementType::Int32 => HostData::Int32(vec![0; len]),
            ElementType::Int64 => HostData::Int64(vec![0; len]),
            ElementType::Float => HostData::Float(vec![0.0; len]),
            ElementType::Double => HostData::Double(vec![0.0; len]),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            HostData::Boolean(_) => ElementType::Boolean,
            HostData::Int32(_) => ElementType::Int32,
            HostData::Int64(_) => ElementType::Int64,
            HostData::Float(_) => ElementType::Float,
            HostData::Double(_) => ElementType::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostData::Boolean(v) => v.len(),
            HostData::Int32(v) => v.len(),
            HostData::Int64(v) => v.len(),
            HostData::Float(v) => v.len(),
            HostData::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<ScalarValue> {
        match self {
            HostData::Boolean(v) => v.get(index).copied().map(ScalarValue::Boolean),
            HostData::Int32(v) => v.get(index).copied().map(ScalarValue::Int32),
            HostData::Int64(v) => v.get(index).copied().map(ScalarValue::Int64),
            HostData::Float(v) => v.get(index).copied().map(ScalarValue::Float),
            HostData::Double(v) => v.get(index).copied().map(ScalarValue::Double),
        }
    }

    pub fn set(&mut self, index: usize, value: ScalarValue) -> ValueResult<()> {
        let extent = self.len();
        let out_of_range = || ValueError::OutOfRange {
            index: index as i64,
            extent,
        };
        match (self, value) {
            (HostData::Boolean(v), ScalarValue::Boolean(x)) => {
                *v.get_mut(index).ok_or_else(out_of_range)? = x
            }
            (HostData::Int32(v), ScalarValue::Int32(x)) => {
                *v.get_mut(index).ok_or_else(out_of_range)? = x
            }
            (HostData::Int64(v), ScalarValue::Int64(x)) => {
                *v.get_mut(index).ok_or_else(out_of_range)? = x
            }
            (HostData::Float(v), ScalarValue::Float(x)) => {
                *v.get_mut(index).ok_or_else(out_of_range)? = x
            }
            (HostData::Double(v), ScalarValue::Double(x)) => {
                *v.get_mut(index).ok_or_else(out_of_range)? = x
            }
            (data, value) => {
                return Err(ValueError::TypeMismatch {
                    expected: data.element_type(),
                    found: value.element_type(),
                })
            }
        }
        Ok(())
    }

    /// Fills every element with the zero of its type.
    pub fn clear(&mut self) {
        *self = HostData::zeros(self.element_type(), self.len());
    }

    /// Native-endian byte image, as laid out in native memory.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            HostData::Boolean(v) => v.iter().map(|&b| b as u8).collect(),
            HostData::Int32(v) => v.iter().flat_map(|x| x.to_ne_bytes()).collect(),
            HostData::Int64(v) => v.iter().flat_map(|x| x.to_ne_bytes()).collect(),
            HostData::Float(v) => v.iter().flat_map(|x| x.to_ne_bytes()).collect(),
            HostData::Double(v) => v.iter().flat_map(|x| x.to_ne_bytes()).collect(),
        }
    }

    /// Raw pointer to the first element, for handing buffers to compiled code.
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        match self {
            HostData::Boolean(v) => v.as_mut_ptr() as *mut u8,
            HostData::Int32(v) => v.as_mut_ptr() as *mut u8,
            HostData::Int64(v) => v.as_mut_ptr() as *mut u8,
            HostData::Float(v) => v.as_mut_ptr() as *mut u8,
            HostData::Double(v) => v.as_mut_ptr() as *mut u8,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            HostData::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            HostData::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            HostData::Int32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            HostData::Int64(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! host_data_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for HostData {
                fn from(values: Vec<$ty>) -> Self {
                    HostData::$variant(values)
                }
            }

            impl From<&[$ty]> for HostData {
                fn from(values: &[$ty]) -> Self {
                    HostData::$variant(values.to_vec())
                }
            }
        )*
    };
}

host_data_from!(bool => Boolean, i32 => Int32, i64 => Int64, f32 => Float, f64 => Double);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_wraps() {
        let result = ScalarValue::Int32(i32::MAX)
            .binary(BinaryOperation::Add, ScalarValue::Int32(1))
            .unwrap();
        assert_eq!(result, ScalarValue::Int32(i32::MIN));
    }

    #[test]
    fn integer_division_by_zero_is_an_error() {
        let result = ScalarValue::Int64(4).binary(BinaryOperation::Divide, ScalarValue::Int64(0));
        assert!(matches!(result, Err(ValueError::DivideByZero)));
    }

    #[test]
    fn mixed_types_are_rejected() {
        let result = ScalarValue::Float(1.0).binary(BinaryOperation::Add, ScalarValue::Double(1.0));
        assert!(matches!(result, Err(ValueError::TypeMismatch { .. })));
    }

    #[test]
    fn sqrt_is_float_only() {
        assert!(ScalarValue::Int32(4).unary(UnaryOperation::Sqrt).is_err());
        assert_eq!(
            ScalarValue::Double(9.0).unary(UnaryOperation::Sqrt).unwrap(),
            ScalarValue::Double(3.0)
        );
    }

    #[test]
    fn host_data_set_checks_type_and_range() {
        let mut data = HostData::zeros(ElementType::Float, 2);
        assert!(data.set(1, ScalarValue::Float(2.0)).is_ok());
        assert!(matches!(
            data.set(2, ScalarValue::Float(1.0)),
            Err(ValueError::OutOfRange { index: 2, extent: 2 })
        ));
        assert!(matches!(
            data.set(0, ScalarValue::Int32(1)),
            Err(ValueError::TypeMismatch { .. })
        ));
        assert_eq!(data, HostData::Float(vec![0.0, 2.0]));
    }
}
