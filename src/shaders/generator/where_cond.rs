//! Ternary select with broadcasting: `output = condition ? a : b`
//!
//! Each invocation produces one packed output unit of four elements. Every
//! element decodes its own output indices and broadcasts them into the three
//! inputs independently, since neighbouring output elements may come from
//! different input units. The condition is a byte mask: four one-byte flags
//! per `u32` word, flag `k` of a word in bits `8k..8k+8`.

use crate::error::Result;
use crate::program::ShaderProgram;
use crate::shaders::PACKING_WIDTH;
use crate::shaders::builder::WgslBuilder;
use crate::shaders::helper::ShaderHelper;
use crate::shaders::variable::Capabilities;

/// Broadcasting `Where` kernel
///
/// Inputs are `c_data` (bool mask), `a_data` (taken where true) and `b_data`
/// (taken where false); the output is `output_data`. The program must carry an
/// `output_size` uniform holding the logical output element count, so the
/// tail elements of the last unit are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WhereProgram;

impl ShaderProgram for WhereProgram {
    fn generate_shader_code(&self, shader: &mut ShaderHelper<'_>) -> Result<()> {
        let caps = Capabilities::UNIFORM
            | Capabilities::SHAPE_AND_STRIDE
            | Capabilities::INDICES_TYPE_ALIAS;
        let c = shader.add_input("c_data", caps)?;
        let a = shader.add_input("a_data", caps)?;
        let b = shader.add_input("b_data", caps)?;
        let output = shader.add_output("output_data", caps)?;

        let mut body = vec![
            shader.guard_against_out_of_bounds("uniforms.vec_size"),
            format!("var output_value: {};", output.value_type()),
        ];

        let width = PACKING_WIDTH;
        for x in 0..width {
            let indices = format!("output_indices{x}");
            let mut block = WgslBuilder::new();
            block.line(format!("let output_offset{x} = global_idx * {width}u + {x}u;"));
            block.open(format!("if (output_offset{x} < uniforms.output_size)"));
            block.line(format!(
                "let {indices} = {};",
                output.offset_to_indices(&format!("output_offset{x}"))?
            ));
            for (var, tag) in [(&c, "c"), (&a, "a"), (&b, "b")] {
                block.line(format!(
                    "let offset_{tag}{x} = {};",
                    var.broadcasted_indices_to_offset(&indices, &output)?
                ));
                block.line(format!("let index_{tag}{x} = offset_{tag}{x} / {width}u;"));
                block.line(format!("let component_{tag}{x} = offset_{tag}{x} % {width}u;"));
            }
            block.line(format!(
                "let condition{x} = ({} & (0xffu << (component_c{x} * 8u))) != 0u;",
                c.get_by_offset(&format!("index_c{x}"))
            ));
            block.line(format!(
                "output_value[{x}] = select({}[component_b{x}], {}[component_a{x}], condition{x});",
                b.get_by_offset(&format!("index_b{x}")),
                a.get_by_offset(&format!("index_a{x}"))
            ));
            block.close();
            body.push(block.finish());
        }
        body.push(output.set_by_offset("global_idx", "output_value")?);

        shader.main_function_body(body);
        Ok(())
    }
}
