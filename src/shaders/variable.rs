//! Shader variables: one storage binding plus the helper code it needs
//!
//! A [`ShaderVariable`] wraps one program input or output. Its capability set
//! decides which supporting WGSL is emitted for it:
//!
//! | Capability           | Emits                                                |
//! |----------------------|------------------------------------------------------|
//! | `SHAPE_AND_STRIDE`   | `o2i_*` and `*_bi2o_*` helper functions              |
//! | `UNIFORM`            | shape/stride read from `uniforms` instead of literals|
//! | `INDICES_TYPE_ALIAS` | `alias <name>_indices_t = ...;`                      |
//!
//! Capabilities are validated once, when the variable is created.

use bitflags::bitflags;

use super::MAX_DIMS;
use super::builder::WgslBuilder;
use super::common::{is_valid_identifier, storage_type, u32_literal};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::program::DependencyLevel;
use crate::tensor::TensorView;

bitflags! {
    /// Independent helper-code capabilities of a shader variable
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Read shape and strides from the uniform buffer
        const UNIFORM = 1 << 0;
        /// Emit index/offset conversion and broadcast helpers
        const SHAPE_AND_STRIDE = 1 << 1;
        /// Emit a named alias for the indices type
        const INDICES_TYPE_ALIAS = 1 << 2;
    }
}

/// Whether a variable is read or written by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableUsage {
    /// Read-only storage binding
    Input,
    /// Read-write storage binding
    Output,
}

impl VariableUsage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// Origin of a value in the uniform buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformSource {
    /// The program uniform at this position
    Program(usize),
    /// Shape of a program input or output
    Shape(VariableUsage, usize),
    /// Strides of a program input or output
    Strides(VariableUsage, usize),
}

/// One kernel buffer binding
#[derive(Debug, Clone)]
pub struct ShaderVariable {
    name: String,
    usage: VariableUsage,
    index: usize,
    view: TensorView,
    dependency: DependencyLevel,
    width: u32,
    capabilities: Capabilities,
    storage_type: String,
}

impl ShaderVariable {
    pub(crate) fn new(
        name: &str,
        usage: VariableUsage,
        index: usize,
        view: TensorView,
        dependency: DependencyLevel,
        width: u32,
        capabilities: Capabilities,
    ) -> Result<Self> {
        if !is_valid_identifier(name) {
            return Err(Error::InvalidArgument {
                arg: "name",
                reason: format!("'{name}' is not a valid WGSL identifier"),
            });
        }
        if view.ndim() > MAX_DIMS {
            return Err(Error::RankOverflow {
                rank: view.ndim(),
                max: MAX_DIMS,
            });
        }
        let storage_type = storage_type(view.dtype(), width)?;

        let needs_shape = Capabilities::UNIFORM | Capabilities::INDICES_TYPE_ALIAS;
        if capabilities.intersects(needs_shape)
            && !capabilities.contains(Capabilities::SHAPE_AND_STRIDE)
        {
            return Err(Error::InvalidArgument {
                arg: "capabilities",
                reason: format!("'{name}' requests {capabilities:?} without SHAPE_AND_STRIDE"),
            });
        }
        if capabilities.contains(Capabilities::SHAPE_AND_STRIDE)
            && dependency == DependencyLevel::TypeOnly
        {
            return Err(Error::InvalidArgument {
                arg: "capabilities",
                reason: format!(
                    "'{name}' emits rank-dependent code but its program dependency is TypeOnly"
                ),
            });
        }

        Ok(Self {
            name: name.to_string(),
            usage,
            index,
            view,
            dependency,
            width,
            capabilities,
            storage_type,
        })
    }

    /// Binding name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element type of the bound tensor
    #[inline]
    pub fn dtype(&self) -> DType {
        self.view.dtype()
    }

    /// Rank of the bound tensor
    #[inline]
    pub fn rank(&self) -> usize {
        self.view.ndim()
    }

    /// Logical elements per storage unit
    #[inline]
    pub fn packing_width(&self) -> u32 {
        self.width
    }

    /// WGSL type of one storage unit, e.g. `vec4<f32>`
    #[inline]
    pub fn storage_type(&self) -> &str {
        &self.storage_type
    }

    /// Name of the value type alias, e.g. `x_value_t`
    pub fn value_type(&self) -> String {
        format!("{}_value_t", self.name)
    }

    /// Type used for multi-indices of this variable
    pub fn indices_type(&self) -> String {
        if self.capabilities.contains(Capabilities::INDICES_TYPE_ALIAS) {
            format!("{}_indices_t", self.name)
        } else {
            raw_indices_type(self.rank())
        }
    }

    /// Whether shape and strides come from the uniform buffer
    pub fn uses_uniform_shape(&self) -> bool {
        self.capabilities
            .contains(Capabilities::UNIFORM | Capabilities::SHAPE_AND_STRIDE)
            && self.dependency != DependencyLevel::Full
            && self.rank() > 0
    }

    /// Read expression for the storage unit at `offset`
    pub fn get_by_offset(&self, offset: &str) -> String {
        format!("{}[{}]", self.name, offset)
    }

    /// Write statement storing `value` into the storage unit at `offset`
    pub fn set_by_offset(&self, offset: &str, value: &str) -> Result<String> {
        if self.usage != VariableUsage::Output {
            return Err(Error::InvalidArgument {
                arg: "set_by_offset",
                reason: format!("'{}' is a read-only input", self.name),
            });
        }
        Ok(format!("{}[{}] = {};", self.name, offset, value))
    }

    /// Expression decoding a logical element offset into this variable's indices
    pub fn offset_to_indices(&self, offset: &str) -> Result<String> {
        self.require_shape("offset_to_indices")?;
        Ok(format!("o2i_{}({})", self.name, offset))
    }

    /// Expression computing this variable's element offset for `output`'s indices
    pub fn broadcasted_indices_to_offset(
        &self,
        indices: &str,
        output: &ShaderVariable,
    ) -> Result<String> {
        self.require_shape("broadcasted_indices_to_offset")?;
        output.require_shape("broadcasted_indices_to_offset")?;
        if output.usage != VariableUsage::Output {
            return Err(Error::InvalidArgument {
                arg: "output",
                reason: format!("'{}' is not a program output", output.name),
            });
        }
        if self.rank() > output.rank() {
            return Err(Error::broadcast(self.view.shape(), output.view.shape()));
        }
        Ok(format!("{}_bi2o_{}({})", self.name, output.name, indices))
    }

    /// Uniform struct fields this variable contributes
    pub(crate) fn uniform_fields(&self) -> Vec<(String, String, UniformSource)> {
        if !self.uses_uniform_shape() {
            return Vec::new();
        }
        let ty = uniform_array_type(self.rank());
        vec![
            (
                format!("{}_shape", self.name),
                ty.clone(),
                UniformSource::Shape(self.usage, self.index),
            ),
            (
                format!("{}_strides", self.name),
                ty,
                UniformSource::Strides(self.usage, self.index),
            ),
        ]
    }

    /// Storage binding declaration at `binding`
    pub(crate) fn binding_declaration(&self, binding: usize) -> String {
        let access = match self.usage {
            VariableUsage::Input => "read",
            VariableUsage::Output => "read_write",
        };
        format!(
            "@group(0) @binding({binding}) var<storage, {access}> {}: array<{}>;",
            self.name,
            self.value_type()
        )
    }

    /// Emit the supporting declarations of this variable
    ///
    /// Broadcast helpers are emitted against every output that also has
    /// `SHAPE_AND_STRIDE`.
    pub(crate) fn emit_declarations(
        &self,
        b: &mut WgslBuilder,
        outputs: &[ShaderVariable],
    ) -> Result<()> {
        let name = &self.name;
        b.declare_once(&format!("{name}::value_t"), |b| {
            b.line_fmt(format_args!(
                "alias {} = {};",
                self.value_type(),
                self.storage_type
            ));
        });

        if !self.capabilities.contains(Capabilities::SHAPE_AND_STRIDE) {
            return Ok(());
        }

        if self.capabilities.contains(Capabilities::INDICES_TYPE_ALIAS) {
            b.declare_once(&format!("{name}::indices_t"), |b| {
                b.line_fmt(format_args!(
                    "alias {}_indices_t = {};",
                    name,
                    raw_indices_type(self.rank())
                ));
            });
        }

        if !b.is_declared(&format!("{name}::o2i")) {
            let lines = self.offset_to_indices_fn()?;
            b.declare_once(&format!("{name}::o2i"), |b| {
                b.raw(&lines);
            });
        }

        if self.usage == VariableUsage::Input {
            for output in outputs {
                if !output.capabilities.contains(Capabilities::SHAPE_AND_STRIDE)
                    || self.rank() > output.rank()
                {
                    continue;
                }
                let key = format!("{name}::bi2o::{}", output.name);
                if b.is_declared(&key) {
                    continue;
                }
                let lines = self.broadcast_fn(output)?;
                b.declare_once(&key, |b| {
                    b.raw(&lines);
                });
            }
        }
        Ok(())
    }

    fn require_shape(&self, what: &'static str) -> Result<()> {
        if self.capabilities.contains(Capabilities::SHAPE_AND_STRIDE) {
            Ok(())
        } else {
            Err(Error::InvalidArgument {
                arg: what,
                reason: format!("'{}' was declared without SHAPE_AND_STRIDE", self.name),
            })
        }
    }

    /// Size of dimension `d` as a WGSL `u32` expression
    fn shape_at(&self, d: usize) -> Result<String> {
        if self.uses_uniform_shape() {
            Ok(uniform_component(&format!("{}_shape", self.name), d, self.rank()))
        } else {
            u32_literal(self.view.shape()[d])
        }
    }

    /// Stride of dimension `d` as a WGSL `u32` expression
    fn stride_at(&self, d: usize) -> Result<String> {
        if self.uses_uniform_shape() {
            Ok(uniform_component(&format!("{}_strides", self.name), d, self.rank()))
        } else {
            u32_literal(self.view.strides()[d])
        }
    }

    fn offset_to_indices_fn(&self) -> Result<String> {
        let mut b = WgslBuilder::new();
        b.open(format!(
            "fn o2i_{}(offset: u32) -> {}",
            self.name,
            self.indices_type()
        ));
        match self.rank() {
            0 => {
                b.line("return 0u;");
            }
            1 => {
                b.line("return offset;");
            }
            rank => {
                b.line_fmt(format_args!("var indices: {};", self.indices_type()));
                b.line("var current = offset;");
                for d in (1..rank).rev() {
                    let dim = self.shape_at(d)?;
                    b.line_fmt(format_args!("indices[{d}] = current % {dim};"));
                    b.line_fmt(format_args!("current = current / {dim};"));
                }
                b.line("indices[0] = current;");
                b.line("return indices;");
            }
        }
        b.close();
        Ok(b.finish())
    }

    /// Right-aligned broadcast of `output` indices into this variable's offset
    ///
    /// With uniform shapes the size-1 test happens at run time. With literal
    /// shapes broadcast dimensions are dropped while generating.
    fn broadcast_fn(&self, output: &ShaderVariable) -> Result<String> {
        let mut b = WgslBuilder::new();
        b.open(format!(
            "fn {}_bi2o_{}(indices: {}) -> u32",
            self.name,
            output.name,
            output.indices_type()
        ));

        let rank = self.rank();
        let out_rank = output.rank();
        let pad = out_rank - rank;
        if rank == 0 {
            b.line("return 0u;");
        } else if self.uses_uniform_shape() {
            b.line("var offset: u32 = 0u;");
            for d in 0..rank {
                let idx = index_component("indices", pad + d, out_rank);
                b.line_fmt(format_args!(
                    "offset += select({idx}, 0u, {} == 1u) * {};",
                    self.shape_at(d)?,
                    self.stride_at(d)?
                ));
            }
            b.line("return offset;");
        } else {
            let terms = (0..rank)
                .filter(|&d| self.view.shape()[d] != 1)
                .map(|d| {
                    Ok(format!(
                        "{} * {}",
                        index_component("indices", pad + d, out_rank),
                        self.stride_at(d)?
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            if terms.is_empty() {
                b.line("return 0u;");
            } else {
                b.line_fmt(format_args!("return {};", terms.join(" + ")));
            }
        }
        b.close();
        Ok(b.finish())
    }
}

impl std::fmt::Display for ShaderVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}#{} {}",
            self.usage.as_str(),
            self.name,
            self.index,
            self.storage_type
        )
    }
}

/// WGSL type holding a multi-index of the given rank
pub(crate) fn raw_indices_type(rank: usize) -> String {
    match rank {
        0 | 1 => "u32".to_string(),
        2..=4 => format!("vec{rank}<u32>"),
        _ => format!("array<u32, {rank}>"),
    }
}

/// WGSL type of a rank-long `u32` list inside the uniform struct
///
/// Uniform arrays need a 16-byte element stride, so long lists pack into `vec4`s.
pub(crate) fn uniform_array_type(len: usize) -> String {
    match len {
        1 => "u32".to_string(),
        2..=4 => format!("vec{len}<u32>"),
        _ => format!("array<vec4<u32>, {}>", len.div_ceil(4)),
    }
}

/// Access component `d` of a uniform list laid out by [`uniform_array_type`]
fn uniform_component(field: &str, d: usize, len: usize) -> String {
    match len {
        1 => format!("uniforms.{field}"),
        2..=4 => format!("uniforms.{field}[{d}]"),
        _ => format!("uniforms.{field}[{}][{}]", d / 4, d % 4),
    }
}

/// Access component `d` of an indices value of the given rank
fn index_component(indices: &str, d: usize, rank: usize) -> String {
    if rank == 1 {
        indices.to_string()
    } else {
        format!("{indices}[{d}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(
        name: &str,
        usage: VariableUsage,
        shape: &[usize],
        dependency: DependencyLevel,
        caps: Capabilities,
    ) -> Result<ShaderVariable> {
        ShaderVariable::new(
            name,
            usage,
            0,
            TensorView::new(shape, DType::F32).unwrap(),
            dependency,
            4,
            caps,
        )
    }

    fn full_caps() -> Capabilities {
        Capabilities::UNIFORM | Capabilities::SHAPE_AND_STRIDE | Capabilities::INDICES_TYPE_ALIAS
    }

    #[test]
    fn test_flat_access() {
        let x = var(
            "x",
            VariableUsage::Input,
            &[2, 3],
            DependencyLevel::TypeOnly,
            Capabilities::empty(),
        )
        .unwrap();
        assert_eq!(x.get_by_offset("global_idx"), "x[global_idx]");
        assert!(x.set_by_offset("global_idx", "a").is_err());
        assert!(x.offset_to_indices("0u").is_err());
        assert_eq!(x.storage_type(), "vec4<f32>");
        assert_eq!(x.value_type(), "x_value_t");
    }

    #[test]
    fn test_capability_validation() {
        // alias without shape support
        assert!(
            var(
                "x",
                VariableUsage::Input,
                &[2],
                DependencyLevel::RankOnly,
                Capabilities::INDICES_TYPE_ALIAS,
            )
            .is_err()
        );
        // shape helpers on a type-only dependency
        assert!(
            var(
                "x",
                VariableUsage::Input,
                &[2],
                DependencyLevel::TypeOnly,
                Capabilities::SHAPE_AND_STRIDE,
            )
            .is_err()
        );
        assert!(matches!(
            var(
                "x",
                VariableUsage::Input,
                &[1; 9],
                DependencyLevel::RankOnly,
                full_caps(),
            ),
            Err(Error::RankOverflow { rank: 9, max: 8 })
        ));
    }

    #[test]
    fn test_uniform_vs_literal_shape() {
        let uniform = var(
            "a",
            VariableUsage::Input,
            &[2, 3],
            DependencyLevel::RankOnly,
            full_caps(),
        )
        .unwrap();
        assert!(uniform.uses_uniform_shape());
        assert_eq!(uniform.shape_at(1).unwrap(), "uniforms.a_shape[1]");
        assert_eq!(uniform.uniform_fields().len(), 2);

        let baked = var(
            "a",
            VariableUsage::Input,
            &[2, 3],
            DependencyLevel::Full,
            full_caps(),
        )
        .unwrap();
        assert!(!baked.uses_uniform_shape());
        assert_eq!(baked.shape_at(1).unwrap(), "3u");
        assert_eq!(baked.stride_at(0).unwrap(), "3u");
        assert!(baked.uniform_fields().is_empty());
    }

    #[test]
    fn test_high_rank_uniform_access() {
        assert_eq!(uniform_array_type(6), "array<vec4<u32>, 2>");
        assert_eq!(uniform_component("x_shape", 5, 6), "uniforms.x_shape[1][1]");
        assert_eq!(raw_indices_type(6), "array<u32, 6>");
        assert_eq!(raw_indices_type(1), "u32");
    }

    #[test]
    fn test_literal_broadcast_drops_size_one_dims() {
        let c = var(
            "c",
            VariableUsage::Input,
            &[1, 3],
            DependencyLevel::Full,
            full_caps(),
        )
        .unwrap();
        let out = var(
            "out",
            VariableUsage::Output,
            &[2, 3],
            DependencyLevel::Full,
            full_caps(),
        )
        .unwrap();
        let func = c.broadcast_fn(&out).unwrap();
        assert!(func.contains("fn c_bi2o_out(indices: out_indices_t) -> u32"));
        assert!(func.contains("return indices[1] * 1u;"));
        assert!(!func.contains("indices[0]"));
    }

    #[test]
    fn test_broadcast_requires_rank_alignment() {
        let big = var(
            "big",
            VariableUsage::Input,
            &[2, 2, 3],
            DependencyLevel::RankOnly,
            full_caps(),
        )
        .unwrap();
        let out = var(
            "out",
            VariableUsage::Output,
            &[2, 3],
            DependencyLevel::RankOnly,
            full_caps(),
        )
        .unwrap();
        assert!(big.broadcasted_indices_to_offset("i", &out).is_err());
        assert!(big.broadcasted_indices_to_offset("i", &big).is_err());
    }

    #[test]
    fn test_declarations_emitted_once() {
        let a = var(
            "a",
            VariableUsage::Input,
            &[3],
            DependencyLevel::RankOnly,
            full_caps(),
        )
        .unwrap();
        let out = var(
            "out",
            VariableUsage::Output,
            &[2, 3],
            DependencyLevel::RankOnly,
            full_caps(),
        )
        .unwrap();
        let mut b = WgslBuilder::new();
        a.emit_declarations(&mut b, std::slice::from_ref(&out)).unwrap();
        a.emit_declarations(&mut b, std::slice::from_ref(&out)).unwrap();
        let code = b.finish();
        assert_eq!(code.matches("fn o2i_a(").count(), 1);
        assert_eq!(code.matches("fn a_bi2o_out(").count(), 1);
        assert_eq!(code.matches("alias a_indices_t = u32;").count(), 1);
        assert!(
            code.contains("select(indices[1], 0u, uniforms.a_shape == 1u) * uniforms.a_strides")
        );
    }
}
