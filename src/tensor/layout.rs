//! Layout: shape and strides of one operand, plus the broadcasting rule

use smallvec::SmallVec;
use std::fmt;

use crate::error::{Error, Result};

/// Stack allocation threshold for dimensions
/// Most tensors have 4 or fewer dimensions, so we stack-allocate up to 4
const STACK_DIMS: usize = 4;

/// Shape type: dimensions of a tensor
pub type Shape = SmallVec<[usize; STACK_DIMS]>;

/// Strides type: element offsets between consecutive elements along each dimension
/// NOTE: Strides are in ELEMENTS, not bytes
pub type Strides = SmallVec<[usize; STACK_DIMS]>;

/// Layout describes how a multi-index maps into an operand's storage
///
/// Address of element at indices [i0, i1, ..., in]:
///   i0 * strides[0] + i1 * strides[1] + ... + in * strides[n]
///
/// The element count of every layout fits in `usize`; constructors reject
/// shapes whose count does not.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    shape: Shape,
    strides: Strides,
}

impl Layout {
    /// Create a new contiguous (row-major/C-order) layout from a shape
    ///
    /// # Example
    /// ```
    /// use wgkern::tensor::Layout;
    /// let layout = Layout::contiguous(&[2, 3, 4])?;
    /// assert_eq!(layout.shape(), &[2, 3, 4]);
    /// assert_eq!(layout.strides(), &[12, 4, 1]);
    /// # Ok::<(), wgkern::error::Error>(())
    /// ```
    ///
    /// Fails with `GeometryOverflow` if the element count or a stride does
    /// not fit in `usize`.
    pub fn contiguous(shape: &[usize]) -> Result<Self> {
        checked_elem_count(shape)?;
        // a zero extent keeps the count small while outer strides can still overflow
        let strides = compute_contiguous_strides(shape).ok_or_else(|| {
            Error::geometry_overflow("stride", wide_product(shape.get(1..).unwrap_or(&[])))
        })?;
        Ok(Self {
            shape: shape.iter().copied().collect(),
            strides,
        })
    }

    /// Create a layout with explicit strides
    pub fn with_strides(shape: &[usize], strides: &[usize]) -> Result<Self> {
        if shape.len() != strides.len() {
            return Err(Error::InvalidArgument {
                arg: "strides",
                reason: format!(
                    "{} strides given for a rank-{} shape",
                    strides.len(),
                    shape.len()
                ),
            });
        }
        checked_elem_count(shape)?;
        Ok(Self {
            shape: shape.iter().copied().collect(),
            strides: strides.iter().copied().collect(),
        })
    }

    /// Create a scalar (0-dimensional) layout
    pub fn scalar() -> Self {
        Self {
            shape: SmallVec::new(),
            strides: SmallVec::new(),
        }
    }

    /// Get the shape
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the strides
    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of dimensions (rank)
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements
    #[inline]
    pub fn elem_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check if the layout is a scalar (0 dimensions)
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Check if memory is contiguous (row-major order)
    pub fn is_contiguous(&self) -> bool {
        self.is_scalar()
            || compute_contiguous_strides(&self.shape).is_some_and(|s| s == self.strides)
    }

    /// Decode a row-major element offset into a multi-index of this shape
    pub fn offset_to_indices(&self, mut offset: usize) -> Option<Shape> {
        if offset >= self.elem_count() {
            return None;
        }
        let mut indices: Shape = SmallVec::from_elem(0, self.ndim());
        for (slot, &dim) in indices.iter_mut().zip(self.shape.iter()).rev() {
            *slot = offset % dim;
            offset /= dim;
        }
        Some(indices)
    }

    /// Flat offset into this operand for an index of a (possibly larger) output
    ///
    /// The input's dimensions are right-aligned against `out_shape`. An input
    /// dimension of size 1 facing a larger output dimension contributes zero;
    /// every other dimension contributes `index * stride`. A scalar input always
    /// maps to offset 0.
    pub fn broadcast_offset(&self, out_shape: &[usize], out_index: &[usize]) -> Result<usize> {
        if out_index.len() != out_shape.len() {
            return Err(Error::InvalidArgument {
                arg: "out_index",
                reason: format!(
                    "index of rank {} for output of rank {}",
                    out_index.len(),
                    out_shape.len()
                ),
            });
        }
        if self.ndim() > out_shape.len() {
            return Err(Error::broadcast(&self.shape, out_shape));
        }

        let pad = out_shape.len() - self.ndim();
        let mut offset = 0usize;
        for (d, (&dim, &stride)) in self.shape.iter().zip(self.strides.iter()).enumerate() {
            let out_dim = out_shape[pad + d];
            let idx = out_index[pad + d];
            if idx >= out_dim {
                return Err(Error::InvalidArgument {
                    arg: "out_index",
                    reason: format!("index {idx} out of bounds for dimension of size {out_dim}"),
                });
            }
            if dim == out_dim {
                offset = idx
                    .checked_mul(stride)
                    .and_then(|term| offset.checked_add(term))
                    .ok_or_else(|| {
                        let wide = offset as u128 + idx as u128 * stride as u128;
                        Error::geometry_overflow("offset", wide)
                    })?;
            } else if dim != 1 {
                return Err(Error::broadcast(&self.shape, out_shape));
            }
        }
        Ok(offset)
    }

    /// Create a broadcast layout to a target shape
    ///
    /// Broadcast dimensions get stride 0. Returns None if not broadcastable
    /// or if the target's element count overflows.
    pub fn broadcast_to(&self, target: &[usize]) -> Option<Self> {
        if target.len() < self.ndim() || checked_elem_count(target).is_err() {
            return None;
        }

        let mut new_shape = Shape::new();
        let mut new_strides = Strides::new();

        // Pad with leading 1s
        let pad = target.len() - self.ndim();
        for &t in &target[..pad] {
            new_shape.push(t);
            new_strides.push(0);
        }

        for ((&s, &st), &t) in self
            .shape
            .iter()
            .zip(self.strides.iter())
            .zip(&target[pad..])
        {
            if s == t {
                new_shape.push(t);
                new_strides.push(st);
            } else if s == 1 {
                new_shape.push(t);
                new_strides.push(0);
            } else {
                return None;
            }
        }

        Some(Self {
            shape: new_shape,
            strides: new_strides,
        })
    }
}

/// Compute contiguous strides for a given shape (row-major order)
///
/// None if a stride or the element count overflows `usize`.
fn compute_contiguous_strides(shape: &[usize]) -> Option<Strides> {
    let mut strides: Strides = SmallVec::from_elem(0, shape.len());
    let mut stride = 1usize;
    for (slot, &dim) in strides.iter_mut().zip(shape.iter()).rev() {
        *slot = stride;
        stride = stride.checked_mul(dim)?;
    }
    Some(strides)
}

/// Element count of `shape`, or `GeometryOverflow` if it does not fit in `usize`
pub fn checked_elem_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| Error::geometry_overflow("element_count", wide_product(shape)))
}

/// Element count in `u128` for error reports, saturating
fn wide_product(shape: &[usize]) -> u128 {
    shape
        .iter()
        .fold(1u128, |acc, &dim| acc.saturating_mul(dim as u128))
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Layout {{ shape: {:?}, strides: {:?} }}",
            self.shape.as_slice(),
            self.strides.as_slice()
        )
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.shape.as_slice())
    }
}

/// Compute the broadcast shape of any number of shapes
///
/// Returns None if two non-1 dimensions at the same aligned position differ.
pub fn broadcast_shapes(shapes: &[&[usize]]) -> Option<Shape> {
    let max_ndim = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut result = Shape::with_capacity(max_ndim);

    for i in 0..max_ndim {
        let mut dim = 1usize;
        for shape in shapes {
            let d = if i < shape.len() {
                shape[shape.len() - 1 - i]
            } else {
                1
            };
            if d == dim || d == 1 {
                continue;
            }
            if dim != 1 {
                return None;
            }
            dim = d;
        }
        result.push(dim);
    }

    result.reverse();
    Some(result)
}
