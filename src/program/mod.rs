//! Program descriptors: the unit handed to the execution adapter
//!
//! A [`ProgramDescriptor`] names an operation, lists its operand views with the
//! [`DependencyLevel`] each contributes to the kernel cache key, carries the
//! program uniforms and the dispatch geometry, and knows how to produce its
//! WGSL source through the [`ShaderProgram`] that describes the kernel body.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wgkern::dtype::DType;
//! use wgkern::program::{DependencyLevel, ProgramDescriptor};
//! use wgkern::shaders::generator::ElementwiseProgram;
//! use wgkern::tensor::TensorView;
//!
//! let a = TensorView::new(&[2, 3], DType::F32).unwrap();
//! let b = TensorView::new(&[2, 3], DType::F32).unwrap();
//! let add = Arc::new(ElementwiseProgram::binary("a + b", ""));
//! let program = ProgramDescriptor::builder("Add", add)
//!     .input(a.clone(), DependencyLevel::TypeOnly)
//!     .input(b, DependencyLevel::TypeOnly)
//!     .output(a, DependencyLevel::TypeOnly)
//!     .build()
//!     .unwrap();
//! assert_eq!(program.packed_count(), 2);
//! assert_eq!(program.dispatch().as_slice(), &[1]);
//! ```

pub mod dispatch;
pub mod uniform;

use std::fmt;
use std::sync::Arc;

pub use dispatch::{
    DispatchGeometry, MAX_GROUPS_PER_DIMENSION, WORKGROUP_SIZE, packed_count, workgroup_count,
};
pub use uniform::{ProgramUniform, UniformValue, pack_uniforms};

use crate::error::{Error, Result};
use crate::shaders::common::storage_type;
use crate::shaders::helper::ShaderHelper;
use crate::shaders::variable::{UniformSource, VariableUsage};
use crate::shaders::{MAX_DIMS, PACKING_WIDTH};
use crate::tensor::TensorView;

/// How much of an operand's metadata a compiled kernel depends on
///
/// Governs what the operand contributes to the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyLevel {
    /// Reusable across any shape with the same element type
    TypeOnly,
    /// Reusable across shapes of equal rank; shapes come from uniforms
    RankOnly,
    /// Shape-specific; shapes and strides may be baked into the source
    Full,
}

/// Kernel body generator for one operation family
pub trait ShaderProgram: fmt::Debug + Send + Sync {
    /// Declare variables and write the kernel body into `shader`
    fn generate_shader_code(&self, shader: &mut ShaderHelper<'_>) -> Result<()>;

    /// Extra cache-key text distinguishing sources the operand signature does not
    ///
    /// The hint must be unambiguous: two different programs must not produce
    /// the same text.
    fn cache_hint(&self) -> String {
        String::new()
    }
}

/// One program input: operand view and its dependency level
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramInput {
    /// Operand view
    pub view: TensorView,
    /// Cache-key granularity for this operand
    pub dependency: DependencyLevel,
}

/// One program output: result view and its dependency level
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramOutput {
    /// Result view
    pub view: TensorView,
    /// Cache-key granularity for this result
    pub dependency: DependencyLevel,
}

/// Stable cache key of a program's generated source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramKey(String);

impl ProgramKey {
    /// Key text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// WGSL module generated for one program, plus the uniform layout it expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSource {
    /// Cache key of the program that produced this source
    pub key: ProgramKey,
    /// WGSL text
    pub code: String,
    /// Members of the `Uniforms` struct, in declaration order
    pub uniforms: Vec<UniformSlot>,
    /// Number of input storage bindings (bindings `0..inputs`)
    pub inputs: usize,
    /// Number of output storage bindings (following the inputs)
    pub outputs: usize,
}

/// One member of the generated `Uniforms` struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformSlot {
    /// Member name
    pub name: String,
    /// Member WGSL type
    pub wgsl_type: String,
    /// Where the value comes from at dispatch time
    pub source: UniformSource,
}

/// Everything the execution adapter needs to run one kernel invocation
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    name: String,
    shader: Arc<dyn ShaderProgram>,
    inputs: Vec<ProgramInput>,
    outputs: Vec<ProgramOutput>,
    uniforms: Vec<ProgramUniform>,
    packing_width: u32,
    packed_count: u32,
    workgroup_size: u32,
    dispatch: DispatchGeometry,
}

impl ProgramDescriptor {
    /// Start building a program
    pub fn builder(name: impl Into<String>, shader: Arc<dyn ShaderProgram>) -> ProgramBuilder {
        ProgramBuilder {
            name: name.into(),
            shader,
            inputs: Vec::new(),
            outputs: Vec::new(),
            uniforms: Vec::new(),
            packing_width: PACKING_WIDTH,
            workgroup_size: WORKGROUP_SIZE,
        }
    }

    /// Operation name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inputs in binding order
    #[inline]
    pub fn inputs(&self) -> &[ProgramInput] {
        &self.inputs
    }

    /// Outputs in binding order
    #[inline]
    pub fn outputs(&self) -> &[ProgramOutput] {
        &self.outputs
    }

    /// Program uniforms; the first is always `vec_size`
    #[inline]
    pub fn uniforms(&self) -> &[ProgramUniform] {
        &self.uniforms
    }

    /// Logical elements per execution unit
    #[inline]
    pub fn packing_width(&self) -> u32 {
        self.packing_width
    }

    /// Execution units covering the first output
    #[inline]
    pub fn packed_count(&self) -> u32 {
        self.packed_count
    }

    /// Invocations per workgroup
    #[inline]
    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    /// Workgroup grid
    #[inline]
    pub fn dispatch(&self) -> DispatchGeometry {
        self.dispatch
    }

    /// Cache key of this program's source
    ///
    /// Built from the name, the shader's cache hint, the workgroup size and
    /// packing width, and each operand's signature at its dependency level:
    /// dtype only, dtype plus rank, or dtype plus shape and strides. Names and
    /// hints are length-prefixed so distinct programs never share a key.
    pub fn cache_key(&self) -> ProgramKey {
        let hint = self.shader.cache_hint();
        let mut key = format!(
            "{}:{}|{}:{}|wg{}|w{}",
            self.name.len(),
            self.name,
            hint.len(),
            hint,
            self.workgroup_size,
            self.packing_width
        );
        key.push_str("|in");
        for input in &self.inputs {
            key.push(';');
            key.push_str(&signature(&input.view, input.dependency));
        }
        key.push_str("|out");
        for output in &self.outputs {
            key.push(';');
            key.push_str(&signature(&output.view, output.dependency));
        }
        ProgramKey(key)
    }

    /// Generate the WGSL module for this program
    ///
    /// Either the complete source is returned or an error; nothing partial.
    pub fn generate_source(&self) -> Result<GeneratedSource> {
        let mut helper = ShaderHelper::new(self);
        self.shader.generate_shader_code(&mut helper)?;
        let source = helper.finish()?;
        log::trace!("generated {} source:\n{}", self.name, source.code);
        Ok(source)
    }

    /// Values for every member of `source`'s uniform struct
    pub fn resolve_uniforms(&self, source: &GeneratedSource) -> Result<Vec<ProgramUniform>> {
        source
            .uniforms
            .iter()
            .map(|slot| {
                let value = match slot.source {
                    UniformSource::Program(i) => self.uniforms.get(i).map(|u| u.value.clone()),
                    UniformSource::Shape(usage, i) => {
                        self.view(usage, i).map(|v| u32_list(v.shape())).transpose()?
                    }
                    UniformSource::Strides(usage, i) => {
                        self.view(usage, i).map(|v| u32_list(v.strides())).transpose()?
                    }
                };
                let value = value.ok_or_else(|| Error::InvalidArgument {
                    arg: "uniforms",
                    reason: format!("no value for uniform '{}' in {}", slot.name, self.name),
                })?;
                Ok(ProgramUniform::new(slot.name.clone(), value))
            })
            .collect()
    }

    fn view(&self, usage: VariableUsage, index: usize) -> Option<&TensorView> {
        match usage {
            VariableUsage::Input => self.inputs.get(index).map(|i| &i.view),
            VariableUsage::Output => self.outputs.get(index).map(|o| &o.view),
        }
    }
}

fn signature(view: &TensorView, dependency: DependencyLevel) -> String {
    match dependency {
        DependencyLevel::TypeOnly => format!("T:{}", view.dtype()),
        DependencyLevel::RankOnly => format!("R:{}:{}", view.dtype(), view.ndim()),
        DependencyLevel::Full => format!(
            "F:{}:{:?}:{:?}",
            view.dtype(),
            view.shape(),
            view.strides()
        ),
    }
}

fn u32_list(values: &[usize]) -> Result<UniformValue> {
    values
        .iter()
        .map(|&v| u32::try_from(v).map_err(|_| Error::geometry_overflow("shape uniform", v as u64)))
        .collect::<Result<Vec<_>>>()
        .map(UniformValue::U32)
}

/// Builder for [`ProgramDescriptor`]
#[derive(Debug)]
pub struct ProgramBuilder {
    name: String,
    shader: Arc<dyn ShaderProgram>,
    inputs: Vec<ProgramInput>,
    outputs: Vec<ProgramOutput>,
    uniforms: Vec<ProgramUniform>,
    packing_width: u32,
    workgroup_size: u32,
}

impl ProgramBuilder {
    /// Append an input
    pub fn input(mut self, view: TensorView, dependency: DependencyLevel) -> Self {
        self.inputs.push(ProgramInput { view, dependency });
        self
    }

    /// Append an output
    pub fn output(mut self, view: TensorView, dependency: DependencyLevel) -> Self {
        self.outputs.push(ProgramOutput { view, dependency });
        self
    }

    /// Append a program uniform after `vec_size`
    pub fn uniform(mut self, name: impl Into<String>, value: UniformValue) -> Self {
        self.uniforms.push(ProgramUniform::new(name, value));
        self
    }

    /// Logical elements per execution unit (default 4)
    pub fn packing_width(mut self, width: u32) -> Self {
        self.packing_width = width;
        self
    }

    /// Invocations per workgroup (default [`WORKGROUP_SIZE`])
    pub fn workgroup_size(mut self, size: u32) -> Self {
        self.workgroup_size = size;
        self
    }

    /// Validate operands and compute the dispatch geometry
    ///
    /// Fails with `UnsupportedDType` if an operand cannot be stored at the
    /// packing width, `RankOverflow` past [`MAX_DIMS`], and `GeometryOverflow`
    /// if the first output does not fit the 32-bit dispatch range.
    pub fn build(self) -> Result<ProgramDescriptor> {
        let Some(first) = self.outputs.first() else {
            return Err(Error::InvalidArgument {
                arg: "outputs",
                reason: format!("program '{}' has no outputs", self.name),
            });
        };

        let views = self
            .inputs
            .iter()
            .map(|i| &i.view)
            .chain(self.outputs.iter().map(|o| &o.view));
        for view in views {
            if view.ndim() > MAX_DIMS {
                return Err(Error::RankOverflow {
                    rank: view.ndim(),
                    max: MAX_DIMS,
                });
            }
            storage_type(view.dtype(), self.packing_width)?;
        }

        let packed = packed_count(first.view.numel(), self.packing_width)?;
        let dispatch = DispatchGeometry::for_packed(packed, self.workgroup_size)?;

        let mut uniforms = Vec::with_capacity(self.uniforms.len() + 1);
        uniforms.push(ProgramUniform::new(
            "vec_size",
            UniformValue::scalar_u32(packed),
        ));
        uniforms.extend(self.uniforms);

        log::debug!(
            "built program {}: {} inputs, {} outputs, vec_size={}, groups={:?}",
            self.name,
            self.inputs.len(),
            self.outputs.len(),
            packed,
            dispatch.as_slice()
        );

        Ok(ProgramDescriptor {
            name: self.name,
            shader: self.shader,
            inputs: self.inputs,
            outputs: self.outputs,
            uniforms,
            packing_width: self.packing_width,
            packed_count: packed,
            workgroup_size: self.workgroup_size,
            dispatch,
        })
    }
}
