//! TensorView: the read-only description of one kernel operand

use std::fmt;

use super::layout::Layout;
use crate::dtype::DType;
use crate::error::Result;

/// Immutable view of one operand: layout plus element type
///
/// A view carries no data and no device handle. Kernels borrow it for the
/// duration of one program build.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TensorView {
    layout: Layout,
    dtype: DType,
}

impl TensorView {
    /// Create a contiguous view of the given shape
    ///
    /// Fails with `GeometryOverflow` if the element count does not fit in `usize`.
    pub fn new(shape: &[usize], dtype: DType) -> Result<Self> {
        Ok(Self {
            layout: Layout::contiguous(shape)?,
            dtype,
        })
    }

    /// Create a view with explicit strides
    pub fn with_strides(shape: &[usize], strides: &[usize], dtype: DType) -> Result<Self> {
        Ok(Self {
            layout: Layout::with_strides(shape, strides)?,
            dtype,
        })
    }


    /// The layout of this view
    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Dimension sizes
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Strides in elements
    #[inline]
    pub fn strides(&self) -> &[usize] {
        self.layout.strides()
    }

    /// Rank
    #[inline]
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Number of logical elements
    #[inline]
    pub fn numel(&self) -> usize {
        self.layout.elem_count()
    }
}

impl fmt::Debug for TensorView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TensorView<{}>{:?}", self.dtype, self.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_accessors() {
        let view = TensorView::new(&[2, 3], DType::F32).unwrap();
        assert_eq!(view.shape(), &[2, 3]);
        assert_eq!(view.strides(), &[3, 1]);
        assert_eq!(view.numel(), 6);
        assert_eq!(view.ndim(), 2);
        assert_eq!(view.dtype(), DType::F32);
    }

    #[test]
    fn test_scalar_view() {
        let view = TensorView::new(&[], DType::I32).unwrap();
        assert_eq!(view.numel(), 1);
        assert_eq!(view.ndim(), 0);
    }

    #[test]
    fn test_view_rejects_overflowing_shape() {
        assert!(matches!(
            TensorView::new(&[1usize << 62, 8], DType::F32),
            Err(crate::error::Error::GeometryOverflow { .. })
        ));
        assert_eq!(TensorView::new(&[0, 1usize << 40], DType::F32).unwrap().numel(), 0);
    }
}
