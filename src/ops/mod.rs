//! Operator kernels and their registration table
//!
//! A kernel turns operand views into a [`ProgramDescriptor`] and hands it to
//! the execution adapter through a [`ComputeContext`].
//!
//! ```text
//! KernelRegistry::lookup(op, version, dtype)
//!   └── KernelDef::create() -> Box<dyn OpKernel>
//!         └── compute(ctx)
//!               ├── ctx.input(i)           operand views
//!               ├── output_shape(inputs)   identity or broadcast
//!               ├── ctx.output(0, shape)   result view
//!               ├── build_program(...)     ProgramDescriptor
//!               └── ctx.run_program(...)   compile (or reuse) and dispatch
//! ```
//!
//! # Operation Categories
//!
//! | Family  | Operators                                              | Program |
//! |---------|--------------------------------------------------------|---------|
//! | Unary   | Abs, Neg, Sqrt, Exp, Log, Ceil, Floor, Sigmoid, Relu   | flat    |
//! | Binary  | Add, Sub, Mul, Div, Pow                                | flat    |
//! | Select  | Where                                                  | broadcast |

pub mod elementwise;
pub mod registry;
pub mod where_cond;

use std::fmt;

pub use elementwise::{BinaryKernel, BinaryOp, UnaryKernel, UnaryOp};
pub use registry::{KernelDef, KernelFactory, KernelRegistry, default_registry};
pub use where_cond::WhereKernel;

use crate::error::{Error, Result};
use crate::program::ProgramDescriptor;
use crate::runtime::ComputeContext;
use crate::tensor::{Shape, TensorView};

/// One operator implementation
pub trait OpKernel: fmt::Debug + Send + Sync {
    /// Operator name
    fn op(&self) -> &'static str;

    /// Number of inputs read from the context
    fn num_inputs(&self) -> usize;

    /// Shape of the single output for the given inputs
    fn output_shape(&self, inputs: &[TensorView]) -> Result<Shape>;

    /// Describe the kernel invocation for `inputs` writing `output`
    fn build_program(
        &self,
        inputs: &[TensorView],
        output: &TensorView,
    ) -> Result<ProgramDescriptor>;

    /// Run the operator against `ctx`
    ///
    /// An empty output still builds (and so validates) the program but
    /// dispatches nothing.
    fn compute(&self, ctx: &mut dyn ComputeContext) -> Result<()> {
        let inputs = (0..self.num_inputs())
            .map(|i| ctx.input(i))
            .collect::<Result<Vec<_>>>()?;
        let shape = self.output_shape(&inputs)?;
        let output = ctx.output(0, &shape)?;
        if output.shape() != shape.as_slice() {
            return Err(Error::shape_mismatch(&shape, output.shape()));
        }

        let program = self.build_program(&inputs, &output)?;
        if program.dispatch().is_empty() {
            log::debug!("{}: empty output, nothing to dispatch", self.op());
            return Ok(());
        }
        ctx.run_program(program)
    }
}
