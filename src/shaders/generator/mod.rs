//! Kernel bodies for each operation family
//!
//! | Program               | Inputs                         | Output        | Addressing |
//! |-----------------------|--------------------------------|---------------|------------|
//! | `ElementwiseProgram`  | `x` or `input_a`, `input_b`    | `y`           | flat       |
//! | `WhereProgram`        | `c_data`, `a_data`, `b_data`   | `output_data` | broadcast  |

pub mod elementwise;
pub mod where_cond;

pub use elementwise::ElementwiseProgram;
pub use where_cond::WhereProgram;

/// Parse and validate generated WGSL the way a device would
#[cfg(test)]
pub(crate) fn validate_wgsl(source: &str) -> std::result::Result<(), String> {
    use naga::valid::{Capabilities, ValidationFlags, Validator};

    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| format!("WGSL parse error: {}", e.emit_to_string(source)))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map(|_| ())
        .map_err(|e| format!("WGSL validation error: {e:?}"))
}
