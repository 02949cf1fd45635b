//! Common helper functions for WGSL shader generation

use crate::dtype::DType;
use crate::error::{Error, Result};

/// WGSL scalar type name for a given DType
pub fn wgsl_type(dtype: DType) -> Result<&'static str> {
    match dtype {
        DType::F32 => Ok("f32"),
        DType::I32 => Ok("i32"),
        DType::U32 => Ok("u32"),
        #[cfg(feature = "f16")]
        DType::F16 => Ok("f16"), // Requires the shader-f16 extension
        _ => Err(Error::UnsupportedDType {
            dtype,
            op: "wgpu_shader",
        }),
    }
}

/// WGSL type of one packed storage unit holding `width` logical elements
///
/// Numeric types pack into vectors. Bool packs four one-byte elements into a
/// single `u32` word, so it only supports a width of 4.
pub fn storage_type(dtype: DType, width: u32) -> Result<String> {
    if dtype == DType::Bool {
        return match width {
            4 => Ok("u32".to_string()),
            _ => Err(Error::UnsupportedDType {
                dtype,
                op: "wgpu_shader (bool mask needs packing width 4)",
            }),
        };
    }

    let t = wgsl_type(dtype)?;
    match width {
        1 => Ok(t.to_string()),
        2..=4 => Ok(format!("vec{width}<{t}>")),
        _ => Err(Error::InvalidArgument {
            arg: "packing_width",
            reason: format!("unsupported packing width {width}"),
        }),
    }
}

/// Check if a string is usable as a WGSL identifier for a binding
pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && !name.starts_with("__")
        && name != "_"
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `u32` literal as WGSL source
#[inline]
pub(crate) fn u32_literal(value: usize) -> Result<String> {
    let value = u32::try_from(value).map_err(|_| Error::InvalidArgument {
        arg: "shape",
        reason: format!("{value} does not fit in a 32-bit shader index"),
    })?;
    Ok(format!("{value}u"))
}
