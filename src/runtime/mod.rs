//! Execution adapter seam
//!
//! Kernels never touch a device. They talk to a [`ComputeContext`], which
//! supplies operand views, allocates outputs, and compiles and dispatches the
//! programs kernels describe.
//!
//! ```text
//! ComputeContext
//! ├── input(i)            -> TensorView
//! ├── output(i, shape)    -> TensorView (allocated by the host)
//! └── run_program(desc)   -> compile or reuse, bind, dispatch
//! ```
//!
//! With the `wgpu` feature, [`wgpu::WgpuContext`] implements the trait on a
//! real device.

#[cfg(feature = "wgpu")]
pub mod wgpu;

use crate::error::Result;
use crate::program::ProgramDescriptor;
use crate::tensor::TensorView;

/// Host-side services a kernel needs while computing
pub trait ComputeContext {
    /// View of input `index`
    fn input(&self, index: usize) -> Result<TensorView>;

    /// Allocate output `index` with `shape` and return its view
    ///
    /// The host decides the output element type.
    fn output(&mut self, index: usize, shape: &[usize]) -> Result<TensorView>;

    /// Compile (or reuse) and dispatch `program`
    ///
    /// Adapter failures come back as [`Error::Execution`] unchanged.
    ///
    /// [`Error::Execution`]: crate::error::Error::Execution
    fn run_program(&mut self, program: ProgramDescriptor) -> Result<()>;
}
