//! Uniform values and their WGSL uniform-buffer layout

use crate::error::{Error, Result};
use crate::shaders::variable::uniform_array_type;

/// Value of one uniform struct member
///
/// A one-element list is a scalar, two to four elements a vector, and longer
/// lists an `array<vec4<_>, N>` (uniform arrays need a 16-byte stride).
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// Unsigned 32-bit values
    U32(Vec<u32>),
    /// Signed 32-bit values
    I32(Vec<i32>),
    /// 32-bit floats
    F32(Vec<f32>),
}

impl UniformValue {
    /// Single `u32` scalar
    pub fn scalar_u32(value: u32) -> Self {
        Self::U32(vec![value])
    }

    /// Number of components
    pub fn len(&self) -> usize {
        match self {
            Self::U32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    /// Whether the value has no components
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// WGSL type of the struct member
    pub fn wgsl_type(&self) -> Result<String> {
        let scalar = match self {
            Self::U32(_) => "u32",
            Self::I32(_) => "i32",
            Self::F32(_) => "f32",
        };
        let len = self.len();
        if len == 0 {
            return Err(Error::InvalidArgument {
                arg: "uniform",
                reason: "uniform values must have at least one component".to_string(),
            });
        }
        Ok(uniform_array_type(len).replace("u32", scalar))
    }

    /// Alignment and size in bytes under WGSL uniform layout rules
    fn align_and_size(&self) -> (usize, usize) {
        match self.len() {
            1 => (4, 4),
            2 => (8, 8),
            3 => (16, 12),
            4 => (16, 16),
            n => (16, 16 * n.div_ceil(4)),
        }
    }

    fn words(&self) -> Vec<u32> {
        match self {
            Self::U32(v) => v.clone(),
            Self::I32(v) => v.iter().map(|&x| x as u32).collect(),
            Self::F32(v) => v.iter().map(|x| x.to_bits()).collect(),
        }
    }
}

/// Named uniform struct member
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramUniform {
    /// Member name inside the `Uniforms` struct
    pub name: String,
    /// Member value
    pub value: UniformValue,
}

impl ProgramUniform {
    /// Create a named uniform
    pub fn new(name: impl Into<String>, value: UniformValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Pack uniforms into bytes laid out like the generated `Uniforms` struct
///
/// Members are placed at their WGSL alignment and the total is padded to a
/// multiple of 16 bytes.
pub fn pack_uniforms(uniforms: &[ProgramUniform]) -> Vec<u8> {
    let mut words: Vec<u32> = Vec::new();
    for uniform in uniforms {
        let (align, size) = uniform.value.align_and_size();
        let start = (words.len() * 4).next_multiple_of(align) / 4;
        words.resize(start, 0);
        let mut member = uniform.value.words();
        member.resize(size / 4, 0);
        words.extend(member);
    }
    words.resize((words.len() * 4).next_multiple_of(16) / 4, 0);
    bytemuck::cast_slice(&words).to_vec()
}
