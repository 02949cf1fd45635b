//! Flat elementwise kernels over packed `vec4` units
//!
//! One invocation loads one unit from each input, evaluates the operator
//! expression on whole vectors and stores one unit. Operands share the output
//! shape, so no index decoding is needed.

use crate::error::Result;
use crate::program::ShaderProgram;
use crate::shaders::helper::ShaderHelper;
use crate::shaders::variable::Capabilities;

/// Number of operands an elementwise expression reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ElementwiseArity {
    /// One input bound as `x`, read into `a`
    Unary,
    /// Two inputs bound as `input_a` and `input_b`, read into `a` and `b`
    Binary,
}

/// Elementwise kernel evaluating `expression` per packed unit
///
/// The expression is WGSL over `a` (and `b` for binary programs) typed as the
/// inputs' value type, e.g. `abs(a)` or `a + b`. `additional_impl` is emitted
/// at module scope before `main` and may define helpers the expression calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementwiseProgram {
    arity: ElementwiseArity,
    expression: String,
    additional_impl: String,
}

impl ElementwiseProgram {
    /// One-input program
    pub fn unary(expression: impl Into<String>, additional_impl: impl Into<String>) -> Self {
        Self {
            arity: ElementwiseArity::Unary,
            expression: expression.into(),
            additional_impl: additional_impl.into(),
        }
    }

    /// Two-input program
    pub fn binary(expression: impl Into<String>, additional_impl: impl Into<String>) -> Self {
        Self {
            arity: ElementwiseArity::Binary,
            expression: expression.into(),
            additional_impl: additional_impl.into(),
        }
    }

    /// Operator expression
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl ShaderProgram for ElementwiseProgram {
    fn generate_shader_code(&self, shader: &mut ShaderHelper<'_>) -> Result<()> {
        let mut body = vec![shader.guard_against_out_of_bounds("uniforms.vec_size")];
        match self.arity {
            ElementwiseArity::Unary => {
                let x = shader.add_input("x", Capabilities::empty())?;
                body.push(format!("let a = {};", x.get_by_offset("global_idx")));
            }
            ElementwiseArity::Binary => {
                let a = shader.add_input("input_a", Capabilities::empty())?;
                let b = shader.add_input("input_b", Capabilities::empty())?;
                body.push(format!("let a = {};", a.get_by_offset("global_idx")));
                body.push(format!("let b = {};", b.get_by_offset("global_idx")));
            }
        }
        let y = shader.add_output("y", Capabilities::empty())?;

        shader.append_implementation(self.additional_impl.as_str());
        body.push(y.set_by_offset("global_idx", &self.expression)?);
        shader.main_function_body(body);
        Ok(())
    }

    fn cache_hint(&self) -> String {
        format!(
            "{}:{}|{}",
            self.expression.len(),
            self.expression,
            self.additional_impl
        )
    }
}
