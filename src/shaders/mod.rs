//! WGSL source generation for elementwise and broadcast kernels
//!
//! WGSL has no templates, so every kernel is assembled as text from the
//! operand views of one [`ProgramDescriptor`](crate::program::ProgramDescriptor).
//!
//! # Architecture
//!
//! ```text
//! ShaderProgram::generate_shader_code(&mut ShaderHelper)
//!     add_input / add_output  -> ShaderVariable (binding + helper functions)
//!     append_implementation   -> module-scope helper WGSL
//!     main_function_body      -> statements after global_idx is computed
//! ShaderHelper::finish()      -> GeneratedSource { code, uniform layout }
//! ```
//!
//! # Supported DTypes
//!
//! | DType | WGSL storage (width 4) | Notes |
//! |-------|------------------------|-------|
//! | F32   | `vec4<f32>`            | Always available |
//! | I32   | `vec4<i32>`            | Always available |
//! | U32   | `vec4<u32>`            | Always available |
//! | F16   | `vec4<f16>`            | `f16` feature, emits `enable f16;` |
//! | Bool  | `u32`                  | Four one-byte flags per word |

pub mod builder;
pub mod common;
pub mod generator;
pub mod helper;
pub mod variable;

pub use builder::WgslBuilder;
pub use common::{storage_type, wgsl_type};
pub use helper::ShaderHelper;
pub use variable::{Capabilities, ShaderVariable, UniformSource, VariableUsage};

pub use crate::program::{GeneratedSource, ShaderProgram, UniformSlot};

/// Logical elements processed per execution unit
pub const PACKING_WIDTH: u32 = 4;

/// Highest operand rank the index helpers support
pub const MAX_DIMS: usize = 8;
