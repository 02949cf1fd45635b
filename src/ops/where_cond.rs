//! Broadcasting conditional select
//!
//! `Where(condition, a, b)` takes `a` where the condition byte is non-zero and
//! `b` elsewhere. The three operands broadcast against each other; shapes and
//! strides reach the kernel through uniforms, so one compiled kernel serves
//! every shape of the same ranks.

use std::sync::Arc;

use super::OpKernel;
use super::elementwise::expect_inputs;
use crate::dtype::{DType, DTypeSet};
use crate::error::{Error, Result};
use crate::program::{DependencyLevel, ProgramDescriptor, UniformValue};
use crate::shaders::generator::WhereProgram;
use crate::tensor::{Shape, TensorView, broadcast_shapes};

/// Element types `Where` selects between
pub const WHERE_DTYPES: DTypeSet = DTypeSet::WGSL_NUMERIC;

/// Kernel for `Where`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WhereKernel;

impl WhereKernel {
    /// Create the kernel
    pub fn new() -> Self {
        Self
    }
}

impl OpKernel for WhereKernel {
    fn op(&self) -> &'static str {
        "Where"
    }

    fn num_inputs(&self) -> usize {
        3
    }

    /// Broadcast of condition, `a` and `b`
    fn output_shape(&self, inputs: &[TensorView]) -> Result<Shape> {
        let [c, a, b] = expect_inputs::<3>(self.op(), inputs)?;
        let ca = broadcast_shapes(&[c.shape(), a.shape()])
            .ok_or_else(|| Error::broadcast(c.shape(), a.shape()))?;
        broadcast_shapes(&[ca.as_slice(), b.shape()])
            .ok_or_else(|| Error::broadcast(&ca, b.shape()))
    }

    fn build_program(
        &self,
        inputs: &[TensorView],
        output: &TensorView,
    ) -> Result<ProgramDescriptor> {
        let [c, a, b] = expect_inputs::<3>(self.op(), inputs)?;
        if c.dtype() != DType::Bool {
            return Err(Error::unsupported_dtype(c.dtype(), "Where (condition)"));
        }
        if !WHERE_DTYPES.contains(a.dtype()) {
            return Err(Error::unsupported_dtype(a.dtype(), "Where"));
        }
        for other in [b, output] {
            if other.dtype() != a.dtype() {
                return Err(Error::DTypeMismatch {
                    lhs: a.dtype(),
                    rhs: other.dtype(),
                });
            }
        }

        let shape = self.output_shape(inputs)?;
        if output.shape() != shape.as_slice() {
            return Err(Error::shape_mismatch(&shape, output.shape()));
        }
        // Output elements are addressed by their row-major position
        if !output.layout().is_contiguous() {
            return Err(Error::InvalidArgument {
                arg: "output",
                reason: "Where writes a contiguous output".to_string(),
            });
        }

        let numel = output.numel();
        let output_size = u32::try_from(numel)
            .map_err(|_| Error::geometry_overflow("output_size", numel as u64))?;

        ProgramDescriptor::builder(self.op(), Arc::new(WhereProgram))
            .input(c.clone(), DependencyLevel::RankOnly)
            .input(a.clone(), DependencyLevel::RankOnly)
            .input(b.clone(), DependencyLevel::RankOnly)
            .output(output.clone(), DependencyLevel::RankOnly)
            .uniform("output_size", UniformValue::scalar_u32(output_size))
            .build()
    }
}
