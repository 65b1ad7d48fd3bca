use serde::{Deserialize, Serialize};

use crate::error::{ValueError, ValueResult};

/// Order in which the dimensions of a freshly allocated buffer are packed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimensionOrder {
    RowMajor,
    ColumnMajor,
}

/// Logical extents plus per-dimension element strides.
///
/// Dimensions are always listed in logical order (rows before columns). A
/// view into a larger buffer keeps the parent's strides, so the active region
/// may be smaller than the memory it spans.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryLayout {
    sizes: Vec<usize>,
    strides: Vec<usize>,
}

impl MemoryLayout {
    pub fn scalar() -> Self {
        Self {
            sizes: Vec::new(),
            strides: Vec::new(),
        }
    }

    pub fn vector(size: usize) -> Self {
        Self {
            sizes: vec![size],
            strides: vec![1],
        }
    }

    pub fn matrix(rows: usize, columns: usize, order: DimensionOrder) -> Self {
        let strides = match order {
            DimensionOrder::RowMajor => vec![columns, 1],
            DimensionOrder::ColumnMajor => vec![1, rows],
        };
        Self {
            sizes: vec![rows, columns],
            strides,
        }
    }

    pub fn from_parts(sizes: Vec<usize>, strides: Vec<usize>) -> ValueResult<Self> {
        if sizes.len() != strides.len() {
            return Err(ValueError::DimensionMismatch {
                expected: sizes.len(),
                found: strides.len(),
            });
        }
        Ok(Self { sizes, strides })
    }

    pub fn num_dimensions(&self) -> usize {
        self.sizes.len()
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn size(&self, dimension: usize) -> usize {
        self.sizes.get(dimension).copied().unwrap_or(1)
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn stride(&self, dimension: usize) -> usize {
        self.strides.get(dimension).copied().unwrap_or(0)
    }

    pub fn num_elements(&self) -> usize {
        self.sizes.iter().product()
    }

    /// Number of elements between the first and last active element, inclusive.
    pub fn memory_span(&self) -> usize {
        if self.sizes.iter().any(|&s| s == 0) {
            return 0;
        }
        1 + self
            .sizes
            .iter()
            .zip(&self.strides)
            .map(|(size, stride)| (size - 1) * stride)
            .sum::<usize>()
    }

    pub fn is_contiguous(&self) -> bool {
        self.memory_span() == self.num_elements()
    }

    /// Linear element offset of a logical index tuple.
    pub fn offset_of(&self, indices: &[usize]) -> usize {
        indices
            .iter()
            .zip(&self.strides)
            .map(|(index, stride)| index * stride)
            .sum()
    }

    /// Same strides, smaller extents.
    pub fn with_sizes(&self, sizes: &[usize]) -> ValueResult<Self> {
        if sizes.len() != self.sizes.len() {
            return Err(ValueError::DimensionMismatch {
                expected: self.sizes.len(),
                found: sizes.len(),
            });
        }
        Ok(Self {
            sizes: sizes.to_vec(),
            strides: self.strides.clone(),
        })
    }

    /// Drops one dimension, keeping the remaining extents and strides.
    pub fn without_dimension(&self, dimension: usize) -> Self {
        let mut sizes = self.sizes.clone();
        let mut strides = self.strides.clone();
        if dimension < sizes.len() {
            sizes.remove(dimension);
            strides.remove(dimension);
        }
        Self { sizes, strides }
    }

    /// A packed layout with the same extents whose dimensions nest in the
    /// same order as this one's strides.
    pub fn packed(&self) -> Self {
        let mut order: Vec<usize> = (0..self.sizes.len()).collect();
        order.sort_by(|&a, &b| self.strides[b].cmp(&self.strides[a]).then(a.cmp(&b)));

        let mut strides = vec![0; self.sizes.len()];
        let mut step = 1;
        for &dimension in order.iter().rev() {
            strides[dimension] = step;
            step *= self.sizes[dimension].max(1);
        }
        Self {
            sizes: self.sizes.clone(),
            strides,
        }
    }

    /// Visits every logical index tuple in row-major logical order.
    pub fn for_each_index<E>(
        &self,
        mut visit: impl FnMut(&[usize]) -> Result<(), E>,
    ) -> Result<(), E> {
        if self.sizes.iter().any(|&s| s == 0) {
            return Ok(());
        }
        let mut indices = vec![0; self.sizes.len()];
        loop {
            visit(&indices)?;
            let mut dimension = self.sizes.len();
            loop {
                if dimension == 0 {
                    return Ok(());
                }
                dimension -= 1;
                indices[dimension] += 1;
                if indices[dimension] < self.sizes[dimension] {
                    break;
                }
                indices[dimension] = 0;
            }
        }
    }
}
