//! # wgkern
//!
//! **WGSL code generation and dispatch planning for broadcasting elementwise GPU kernels.**
//!
//! wgkern turns operand shapes, strides and dtypes into complete WGSL compute
//! modules, packs four logical elements per invocation, emits the index
//! arithmetic for numpy-style broadcasting, and computes a workgroup grid that
//! covers the output exactly.
//!
//! ## Features
//!
//! - **Elementwise kernels**: unary (Abs, Neg, Sqrt, Exp, Log, Ceil, Floor,
//!   Sigmoid, Relu) and binary (Add, Sub, Mul, Div, Pow) over `vec4` units
//! - **Broadcast select**: `Where` with a byte-packed bool condition
//! - **Program descriptors**: dependency-aware cache keys, uniform layouts,
//!   2-D/3-D dispatch folding past the per-dimension workgroup limit
//! - **Registration table**: versioned `(op, versions, dtypes) -> kernel` entries
//!
//! ## Quick Start
//!
//! ```rust
//! use wgkern::prelude::*;
//!
//! let kernel = default_registry().create("Where", 16, DType::F32)?;
//! let inputs = [
//!     TensorView::new(&[1, 3], DType::Bool)?,
//!     TensorView::new(&[2, 3], DType::F32)?,
//!     TensorView::new(&[2, 3], DType::F32)?,
//! ];
//! let shape = kernel.output_shape(&inputs)?;
//! let output = TensorView::new(&shape, DType::F32)?;
//!
//! let program = kernel.build_program(&inputs, &output)?;
//! let source = program.generate_source()?;
//! assert!(source.code.contains("fn main("));
//! assert_eq!(program.dispatch().as_slice(), &[1]);
//! # Ok::<(), wgkern::error::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `wgpu`: execution adapter that compiles, caches and dispatches programs
//! - `f16`: half-precision storage (needs the `shader-f16` device feature)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod dtype;
pub mod error;
pub mod ops;
pub mod program;
pub mod runtime;
pub mod shaders;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::{DType, DTypeSet};
    pub use crate::error::{Error, Result};
    pub use crate::ops::{KernelRegistry, OpKernel, default_registry};
    pub use crate::program::{DependencyLevel, ProgramDescriptor};
    pub use crate::runtime::ComputeContext;
    pub use crate::tensor::TensorView;

    #[cfg(feature = "wgpu")]
    pub use crate::runtime::wgpu::{WgpuContext, WgpuExecutor};
}
