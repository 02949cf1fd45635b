//! Unary and binary elementwise kernels
//!
//! Both families run the flat [`ElementwiseProgram`]: operands are contiguous
//! and share the output shape, so one packed unit of each input maps to one
//! packed unit of the output.

use std::sync::Arc;

use super::OpKernel;
use crate::dtype::{DType, DTypeSet};
use crate::error::{Error, Result};
use crate::program::{DependencyLevel, ProgramDescriptor};
use crate::shaders::PACKING_WIDTH;
use crate::shaders::common::storage_type;
use crate::shaders::generator::ElementwiseProgram;
use crate::tensor::{Shape, TensorView};

/// Unary operation kind
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Absolute value: |a|
    Abs,
    /// Negation: -a
    Neg,
    /// Square root: sqrt(a)
    Sqrt,
    /// Exponential: e^a
    Exp,
    /// Natural log: ln(a)
    Log,
    /// Ceiling: ceil(a)
    Ceil,
    /// Floor: floor(a)
    Floor,
    /// Logistic: 1 / (1 + e^-a)
    Sigmoid,
    /// Rectifier: max(a, 0)
    Relu,
}

impl UnaryOp {
    /// Every unary operation
    pub const ALL: [Self; 9] = [
        Self::Abs,
        Self::Neg,
        Self::Sqrt,
        Self::Exp,
        Self::Log,
        Self::Ceil,
        Self::Floor,
        Self::Sigmoid,
        Self::Relu,
    ];

    /// Operator name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Abs => "Abs",
            Self::Neg => "Neg",
            Self::Sqrt => "Sqrt",
            Self::Exp => "Exp",
            Self::Log => "Log",
            Self::Ceil => "Ceil",
            Self::Floor => "Floor",
            Self::Sigmoid => "Sigmoid",
            Self::Relu => "Relu",
        }
    }

    /// Element types the operation is defined for
    pub const fn supported_dtypes(self) -> DTypeSet {
        match self {
            Self::Abs | Self::Neg | Self::Relu => DTypeSet::WGSL_SIGNED,
            _ => DTypeSet::WGSL_FLOATS,
        }
    }

    /// Elementwise program for this operation on `dtype`
    pub fn program(self, dtype: DType) -> Result<ElementwiseProgram> {
        let program = match self {
            Self::Abs => ElementwiseProgram::unary("abs(a)", ""),
            Self::Neg => ElementwiseProgram::unary("-a", ""),
            Self::Sqrt => ElementwiseProgram::unary("sqrt(a)", ""),
            Self::Exp => ElementwiseProgram::unary("exp(a)", ""),
            Self::Log => ElementwiseProgram::unary("log(a)", ""),
            Self::Ceil => ElementwiseProgram::unary("ceil(a)", ""),
            Self::Floor => ElementwiseProgram::unary("floor(a)", ""),
            Self::Sigmoid => ElementwiseProgram::unary(
                "sigmoid_v(a)",
                "fn sigmoid_v(v: x_value_t) -> x_value_t {\n  return 1.0 / (1.0 + exp(-v));\n}",
            ),
            // zero value of the packed type
            Self::Relu => ElementwiseProgram::unary(
                format!("max(a, {}())", storage_type(dtype, PACKING_WIDTH)?),
                "",
            ),
        };
        Ok(program)
    }
}

/// Binary operation kind
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Addition: a + b
    Add,
    /// Subtraction: a - b
    Sub,
    /// Multiplication: a * b
    Mul,
    /// Division: a / b
    Div,
    /// Power: a^b
    Pow,
}

impl BinaryOp {
    /// Every binary operation
    pub const ALL: [Self; 5] = [Self::Add, Self::Sub, Self::Mul, Self::Div, Self::Pow];

    /// Operator name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Sub => "Sub",
            Self::Mul => "Mul",
            Self::Div => "Div",
            Self::Pow => "Pow",
        }
    }

    /// Element types the operation is defined for
    pub const fn supported_dtypes(self) -> DTypeSet {
        match self {
            Self::Pow => DTypeSet::WGSL_FLOATS,
            _ => DTypeSet::WGSL_NUMERIC,
        }
    }

    /// WGSL expression over `a` and `b`
    pub const fn expression(self) -> &'static str {
        match self {
            Self::Add => "a + b",
            Self::Sub => "a - b",
            Self::Mul => "a * b",
            Self::Div => "a / b",
            Self::Pow => "pow(a, b)",
        }
    }
}

/// Kernel for one [`UnaryOp`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnaryKernel {
    op: UnaryOp,
}

impl UnaryKernel {
    /// Kernel for `op`
    pub fn new(op: UnaryOp) -> Self {
        Self { op }
    }
}

impl OpKernel for UnaryKernel {
    fn op(&self) -> &'static str {
        self.op.name()
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn output_shape(&self, inputs: &[TensorView]) -> Result<Shape> {
        let [x] = expect_inputs::<1>(self.op(), inputs)?;
        Ok(Shape::from_slice(x.shape()))
    }

    fn build_program(
        &self,
        inputs: &[TensorView],
        output: &TensorView,
    ) -> Result<ProgramDescriptor> {
        let [x] = expect_inputs::<1>(self.op(), inputs)?;
        check_flat_operand(self.op(), self.op.supported_dtypes(), x, output)?;

        let program = self.op.program(x.dtype())?;
        ProgramDescriptor::builder(self.op(), Arc::new(program))
            .input(x.clone(), DependencyLevel::TypeOnly)
            .output(output.clone(), DependencyLevel::TypeOnly)
            .build()
    }
}

/// Kernel for one [`BinaryOp`]
///
/// Operands must share shape and dtype; broadcasting binary operands is left
/// to the host engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryKernel {
    op: BinaryOp,
}

impl BinaryKernel {
    /// Kernel for `op`
    pub fn new(op: BinaryOp) -> Self {
        Self { op }
    }
}

impl OpKernel for BinaryKernel {
    fn op(&self) -> &'static str {
        self.op.name()
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn output_shape(&self, inputs: &[TensorView]) -> Result<Shape> {
        let [a, b] = expect_inputs::<2>(self.op(), inputs)?;
        if a.shape() != b.shape() {
            return Err(Error::shape_mismatch(a.shape(), b.shape()));
        }
        Ok(Shape::from_slice(a.shape()))
    }

    fn build_program(
        &self,
        inputs: &[TensorView],
        output: &TensorView,
    ) -> Result<ProgramDescriptor> {
        let [a, b] = expect_inputs::<2>(self.op(), inputs)?;
        check_flat_operand(self.op(), self.op.supported_dtypes(), a, output)?;
        check_flat_operand(self.op(), self.op.supported_dtypes(), b, output)?;

        let program = ElementwiseProgram::binary(self.op.expression(), "");
        ProgramDescriptor::builder(self.op(), Arc::new(program))
            .input(a.clone(), DependencyLevel::TypeOnly)
            .input(b.clone(), DependencyLevel::TypeOnly)
            .output(output.clone(), DependencyLevel::TypeOnly)
            .build()
    }
}

pub(super) fn expect_inputs<'a, const N: usize>(
    op: &str,
    inputs: &'a [TensorView],
) -> Result<&'a [TensorView; N]> {
    inputs.try_into().map_err(|_| Error::InvalidArgument {
        arg: "inputs",
        reason: format!("{op} takes {N} inputs, got {}", inputs.len()),
    })
}

/// An operand of a flat kernel: supported dtype, contiguous, same shape and
/// dtype as the output
fn check_flat_operand(
    op: &'static str,
    supported: DTypeSet,
    input: &TensorView,
    output: &TensorView,
) -> Result<()> {
    if !supported.contains(input.dtype()) {
        return Err(Error::unsupported_dtype(input.dtype(), op));
    }
    if input.dtype() != output.dtype() {
        return Err(Error::DTypeMismatch {
            lhs: input.dtype(),
            rhs: output.dtype(),
        });
    }
    if input.shape() != output.shape() {
        return Err(Error::shape_mismatch(output.shape(), input.shape()));
    }
    if !input.layout().is_contiguous() || !output.layout().is_contiguous() {
        return Err(Error::InvalidArgument {
            arg: "layout",
            reason: format!("{op} addresses operands flat and needs contiguous views"),
        });
    }
    Ok(())
}
