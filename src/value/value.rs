use std::cell::RefCell;
use std::rc::Rc;

use cranelift::codegen::ir;

use super::layout::MemoryLayout;
use super::types::{ElementType, HostData, ScalarValue};
use crate::error::{ValueError, ValueResult};

/// Where the elements of a [`Value`] live.
#[derive(Clone, Debug)]
pub(crate) enum Storage {
    /// A compile-time constant scalar.
    Literal(ScalarValue),
    /// Host memory shared between a buffer and its views.
    Host {
        data: Rc<RefCell<HostData>>,
        offset: usize,
    },
    /// Address of the first element in emitted code.
    Address(ir::Value),
    /// A scalar held in an emitted SSA register. Not addressable.
    Register(ir::Value),
}

/// A typed handle to data in either the immediate or the emission context.
///
/// A value starts out unconstrained when only its storage is known; views
/// such as [`Vector`](super::Vector) require a layout of matching rank.
#[derive(Clone, Debug)]
pub struct Value {
    ty: ElementType,
    layout: Option<MemoryLayout>,
    pub(crate) storage: Storage,
}

impl Value {
    pub fn literal(value: impl Into<ScalarValue>) -> Self {
        let value = value.into();
        Self {
            ty: value.element_type(),
            layout: Some(MemoryLayout::scalar()),
            storage: Storage::Literal(value),
        }
    }

    /// Host data with an explicit layout. The layout must fit inside the data.
    pub fn from_data(data: impl Into<HostData>, layout: MemoryLayout) -> ValueResult<Self> {
        let data = data.into();
        if layout.memory_span() > data.len() {
            return Err(ValueError::SizeMismatch {
                expected: vec![layout.memory_span()],
                found: vec![data.len()],
            });
        }
        Ok(Self {
            ty: data.element_type(),
            layout: Some(layout),
            storage: Storage::Host {
                data: Rc::new(RefCell::new(data)),
                offset: 0,
            },
        })
    }

    /// Host data viewed as a packed vector.
    pub fn packed(data: impl Into<HostData>) -> Self {
        let data = data.into();
        let layout = MemoryLayout::vector(data.len());
        Self {
            ty: data.element_type(),
            layout: Some(layout),
            storage: Storage::Host {
                data: Rc::new(RefCell::new(data)),
                offset: 0,
            },
        }
    }

    /// Host data without a layout.
    pub fn unconstrained(data: impl Into<HostData>) -> Self {
        let data = data.into();
        Self {
            ty: data.element_type(),
            layout: None,
            storage: Storage::Host {
                data: Rc::new(RefCell::new(data)),
                offset: 0,
            },
        }
    }

    /// Emitted memory starting at `address`. Unconstrained until a layout is set.
    pub fn emitted(ty: ElementType, address: ir::Value) -> Self {
        Self {
            ty,
            layout: None,
            storage: Storage::Address(address),
        }
    }

    pub(crate) fn register(ty: ElementType, value: ir::Value) -> Self {
        Self {
            ty,
            layout: Some(MemoryLayout::scalar()),
            storage: Storage::Register(value),
        }
    }

    pub(crate) fn host(data: Rc<RefCell<HostData>>, offset: usize, layout: MemoryLayout) -> Self {
        let ty = data.borrow().element_type();
        Self {
            ty,
            layout: Some(layout),
            storage: Storage::Host { data, offset },
        }
    }

    pub(crate) fn address(ty: ElementType, address: ir::Value, layout: MemoryLayout) -> Self {
        Self {
            ty,
            layout: Some(layout),
            storage: Storage::Address(address),
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.ty
    }

    pub fn is_constrained(&self) -> bool {
        self.layout.is_some()
    }

    pub fn layout(&self) -> ValueResult<&MemoryLayout> {
        self.layout.as_ref().ok_or(ValueError::Unconstrained)
    }

    pub fn set_layout(&mut self, layout: MemoryLayout) {
        self.layout = Some(layout);
    }

    pub fn with_layout(mut self, layout: MemoryLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.storage, Storage::Literal(_))
    }

    pub fn is_host(&self) -> bool {
        matches!(self.storage, Storage::Literal(_) | Storage::Host { .. })
    }

    pub fn is_emitted(&self) -> bool {
        matches!(self.storage, Storage::Address(_) | Storage::Register(_))
    }

    pub fn as_literal(&self) -> Option<ScalarValue> {
        match self.storage {
            Storage::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// Emitted address of the first element.
    pub fn emitted_address(&self) -> ValueResult<ir::Value> {
        match self.storage {
            Storage::Address(address) => Ok(address),
            _ => Err(ValueError::ContextMismatch {
                context: "emission",
            }),
        }
    }

    /// Reads the element at a logical index tuple from host storage.
    pub(crate) fn read_host(&self, indices: &[usize]) -> ValueResult<ScalarValue> {
        match &self.storage {
            Storage::Literal(value) => Ok(*value),
            Storage::Host { data, offset } => {
                let linear = offset + self.layout()?.offset_of(indices);
                let data = data.borrow();
                data.get(linear).ok_or(ValueError::OutOfRange {
                    index: linear as i64,
                    extent: data.len(),
                })
            }
            _ => Err(ValueError::ContextMismatch {
                context: "immediate",
            }),
        }
    }

    /// Gathers the active elements into dense host data, row-major.
    pub fn to_host_data(&self) -> ValueResult<HostData> {
        let layout = self.layout()?;
        let mut out = HostData::zeros(self.ty, layout.num_elements());
        let mut next = 0;
        layout.for_each_index(|indices| {
            out.set(next, self.read_host(indices)?)?;
            next += 1;
            Ok::<_, ValueError>(())
        })?;
        Ok(out)
    }
}
