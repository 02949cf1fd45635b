//! Common test utilities
#![allow(dead_code)]

use wgkern::dtype::DType;
use wgkern::error::{Error, Result};
use wgkern::program::ProgramDescriptor;
use wgkern::runtime::ComputeContext;
use wgkern::tensor::TensorView;

/// In-memory context recording every program a kernel runs
#[derive(Debug, Default)]
pub struct RecordingContext {
    pub inputs: Vec<TensorView>,
    pub output_dtype: Option<DType>,
    pub outputs: Vec<TensorView>,
    pub programs: Vec<ProgramDescriptor>,
}

impl RecordingContext {
    /// Context whose output takes the dtype of input `dtype_from`
    pub fn new(inputs: Vec<TensorView>, dtype_from: usize) -> Self {
        let output_dtype = inputs.get(dtype_from).map(TensorView::dtype);
        Self {
            inputs,
            output_dtype,
            ..Default::default()
        }
    }
}

impl ComputeContext for RecordingContext {
    fn input(&self, index: usize) -> Result<TensorView> {
        self.inputs.get(index).cloned().ok_or_else(|| Error::InvalidArgument {
            arg: "input",
            reason: format!("no input {index}"),
        })
    }

    fn output(&mut self, _index: usize, shape: &[usize]) -> Result<TensorView> {
        let dtype = self.output_dtype.ok_or_else(|| Error::InvalidArgument {
            arg: "output",
            reason: "no output dtype".to_string(),
        })?;
        let view = TensorView::new(shape, dtype)?;
        self.outputs.push(view.clone());
        Ok(view)
    }

    fn run_program(&mut self, program: ProgramDescriptor) -> Result<()> {
        self.programs.push(program);
        Ok(())
    }
}

/// Context whose adapter always fails
#[derive(Debug)]
pub struct FailingContext {
    pub inputs: Vec<TensorView>,
    pub output_dtype: DType,
}

impl ComputeContext for FailingContext {
    fn input(&self, index: usize) -> Result<TensorView> {
        self.inputs.get(index).cloned().ok_or_else(|| Error::InvalidArgument {
            arg: "input",
            reason: format!("no input {index}"),
        })
    }

    fn output(&mut self, _index: usize, shape: &[usize]) -> Result<TensorView> {
        TensorView::new(shape, self.output_dtype)
    }

    fn run_program(&mut self, _program: ProgramDescriptor) -> Result<()> {
        Err(Error::execution(std::io::Error::other("device lost")))
    }
}

/// Parse and validate WGSL with naga
pub fn validate_wgsl(source: &str) -> std::result::Result<(), String> {
    use naga::valid::{Capabilities, ValidationFlags, Validator};

    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| format!("WGSL parse error: {}", e.emit_to_string(source)))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map(|_| ())
        .map_err(|e| format!("WGSL validation error: {e:?}"))
}

/// Decode packed uniform bytes into `u32` words
pub fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
