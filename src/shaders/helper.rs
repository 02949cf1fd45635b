//! Assembles one complete WGSL compute module for a program

use std::collections::HashSet;

use super::builder::WgslBuilder;
use super::common::is_valid_identifier;
use super::variable::{Capabilities, ShaderVariable, UniformSource, VariableUsage};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::program::{GeneratedSource, ProgramDescriptor, UniformSlot};

/// Collects variables, helper code and the main body of one kernel
///
/// Variables are bound in the order they are added: inputs first, taken from
/// the program's inputs in order, then outputs. The uniform struct follows the
/// last storage binding.
#[derive(Debug)]
pub struct ShaderHelper<'a> {
    program: &'a ProgramDescriptor,
    inputs: Vec<ShaderVariable>,
    outputs: Vec<ShaderVariable>,
    additional: Vec<String>,
    body: Vec<String>,
}

impl<'a> ShaderHelper<'a> {
    /// Start a module for `program`
    pub fn new(program: &'a ProgramDescriptor) -> Self {
        Self {
            program,
            inputs: Vec::new(),
            outputs: Vec::new(),
            additional: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Bind the next program input under `name`
    pub fn add_input(&mut self, name: &str, capabilities: Capabilities) -> Result<ShaderVariable> {
        let index = self.inputs.len();
        let input = self.program.inputs().get(index).ok_or_else(|| Error::InvalidArgument {
            arg: "add_input",
            reason: format!(
                "program '{}' has only {} inputs",
                self.program.name(),
                self.program.inputs().len()
            ),
        })?;
        self.check_unique(name)?;
        let var = ShaderVariable::new(
            name,
            VariableUsage::Input,
            index,
            input.view.clone(),
            input.dependency,
            self.program.packing_width(),
            capabilities,
        )?;
        self.inputs.push(var.clone());
        Ok(var)
    }

    /// Bind the next program output under `name`
    pub fn add_output(&mut self, name: &str, capabilities: Capabilities) -> Result<ShaderVariable> {
        let index = self.outputs.len();
        let output = self.program.outputs().get(index).ok_or_else(|| Error::InvalidArgument {
            arg: "add_output",
            reason: format!(
                "program '{}' has only {} outputs",
                self.program.name(),
                self.program.outputs().len()
            ),
        })?;
        self.check_unique(name)?;
        let var = ShaderVariable::new(
            name,
            VariableUsage::Output,
            index,
            output.view.clone(),
            output.dependency,
            self.program.packing_width(),
            capabilities,
        )?;
        self.outputs.push(var.clone());
        Ok(var)
    }

    /// Append module-scope WGSL emitted before `main`
    pub fn append_implementation(&mut self, code: impl Into<String>) {
        let code = code.into();
        if !code.trim().is_empty() {
            self.additional.push(code);
        }
    }

    /// Append statements to `main`, after `global_idx` is computed
    pub fn main_function_body<I, S>(&mut self, statements: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for statement in statements {
            self.body.extend(statement.as_ref().lines().map(str::to_string));
        }
    }

    /// Early return for invocations past `limit`
    pub fn guard_against_out_of_bounds(&self, limit: &str) -> String {
        format!("if (global_idx >= {limit}) {{ return; }}")
    }

    /// Produce the complete module
    ///
    /// Fails if the kernel did not bind every program input and output.
    pub fn finish(self) -> Result<GeneratedSource> {
        let program = self.program;
        if self.inputs.len() != program.inputs().len()
            || self.outputs.len() != program.outputs().len()
        {
            return Err(Error::InvalidArgument {
                arg: "variables",
                reason: format!(
                    "'{}' bound {} inputs and {} outputs, program has {} and {}",
                    program.name(),
                    self.inputs.len(),
                    self.outputs.len(),
                    program.inputs().len(),
                    program.outputs().len()
                ),
            });
        }

        let uniforms = self.uniform_layout()?;

        let mut b = WgslBuilder::new();
        let needs_f16 = self
            .inputs
            .iter()
            .chain(&self.outputs)
            .any(|v| v.dtype() == DType::F16);
        if needs_f16 {
            b.line("enable f16;");
            b.line("");
        }

        b.open("struct Uniforms");
        for slot in &uniforms {
            b.line_fmt(format_args!("{}: {},", slot.name, slot.wgsl_type));
        }
        b.close();
        b.line("");

        let variables: Vec<&ShaderVariable> = self.inputs.iter().chain(&self.outputs).collect();
        for (binding, var) in variables.iter().enumerate() {
            b.line(var.binding_declaration(binding));
        }
        b.line_fmt(format_args!(
            "@group(0) @binding({}) var<uniform> uniforms: Uniforms;",
            variables.len()
        ));
        b.line("");

        for var in &variables {
            var.emit_declarations(&mut b, &self.outputs)?;
        }
        b.line("");

        for code in &self.additional {
            b.raw(code);
            b.line("");
        }

        let wg = program.workgroup_size();
        b.line_fmt(format_args!("@compute @workgroup_size({wg}, 1, 1)"));
        b.open(
            "fn main(@builtin(workgroup_id) workgroup_id: vec3<u32>, \
             @builtin(local_invocation_index) local_idx: u32, \
             @builtin(num_workgroups) num_workgroups: vec3<u32>)",
        );
        b.line_fmt(format_args!(
            "let global_idx = (workgroup_id.z * num_workgroups.x * num_workgroups.y \
             + workgroup_id.y * num_workgroups.x + workgroup_id.x) * {wg}u + local_idx;"
        ));
        for statement in &self.body {
            b.line(statement.trim_end());
        }
        b.close();

        Ok(GeneratedSource {
            key: program.cache_key(),
            code: b.finish(),
            uniforms,
            inputs: self.inputs.len(),
            outputs: self.outputs.len(),
        })
    }

    /// Program uniforms, then the shape/stride uniforms of every variable
    fn uniform_layout(&self) -> Result<Vec<UniformSlot>> {
        let mut slots = Vec::new();
        for (i, uniform) in self.program.uniforms().iter().enumerate() {
            if !is_valid_identifier(&uniform.name) {
                return Err(Error::InvalidArgument {
                    arg: "uniform",
                    reason: format!("'{}' is not a valid WGSL identifier", uniform.name),
                });
            }
            slots.push(UniformSlot {
                name: uniform.name.clone(),
                wgsl_type: uniform.value.wgsl_type()?,
                source: UniformSource::Program(i),
            });
        }
        for var in self.inputs.iter().chain(&self.outputs) {
            for (name, wgsl_type, source) in var.uniform_fields() {
                slots.push(UniformSlot {
                    name,
                    wgsl_type,
                    source,
                });
            }
        }

        let mut seen = HashSet::new();
        for slot in &slots {
            if !seen.insert(slot.name.as_str()) {
                return Err(Error::InvalidArgument {
                    arg: "uniform",
                    reason: format!("duplicate uniform '{}'", slot.name),
                });
            }
        }
        Ok(slots)
    }

    fn check_unique(&self, name: &str) -> Result<()> {
        if self.inputs.iter().chain(&self.outputs).any(|v| v.name() == name) || name == "uniforms" {
            return Err(Error::InvalidArgument {
                arg: "name",
                reason: format!("variable '{name}' is already bound"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::program::{DependencyLevel, ShaderProgram, UniformValue};
    use crate::tensor::TensorView;

    #[derive(Debug)]
    struct Scale {
        bind_output: bool,
    }

    impl ShaderProgram for Scale {
        fn generate_shader_code(&self, shader: &mut ShaderHelper<'_>) -> Result<()> {
            let x = shader.add_input("x", Capabilities::empty())?;
            if self.bind_output {
                let y = shader.add_output("y", Capabilities::empty())?;
                shader.append_implementation(
                    "fn twice(v: vec4<f32>) -> vec4<f32> { return v * 2.0; }",
                );
                let guard = shader.guard_against_out_of_bounds("uniforms.vec_size");
                let value = format!("twice({}) * uniforms.scale", x.get_by_offset("global_idx"));
                let store = y.set_by_offset("global_idx", &value)?;
                shader.main_function_body([guard, store]);
            }
            Ok(())
        }
    }

    fn program(bind_output: bool) -> ProgramDescriptor {
        let view = TensorView::new(&[8], DType::F32).unwrap();
        ProgramDescriptor::builder("Scale", Arc::new(Scale { bind_output }))
            .input(view.clone(), DependencyLevel::TypeOnly)
            .output(view, DependencyLevel::TypeOnly)
            .uniform("scale", UniformValue::F32(vec![0.5]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_module_layout() {
        let source = program(true).generate_source().unwrap();
        let code = &source.code;

        assert!(code.contains("struct Uniforms {\n  vec_size: u32,\n  scale: f32,\n}"));
        assert!(code.contains("@group(0) @binding(0) var<storage, read> x: array<x_value_t>;"));
        assert!(
            code.contains("@group(0) @binding(1) var<storage, read_write> y: array<y_value_t>;")
        );
        assert!(code.contains("@group(0) @binding(2) var<uniform> uniforms: Uniforms;"));
        assert!(code.contains("alias x_value_t = vec4<f32>;"));
        assert!(code.contains("@compute @workgroup_size(64, 1, 1)"));
        assert!(code.contains("if (global_idx >= uniforms.vec_size) { return; }"));
        assert!(!code.contains("enable f16;"));

        let twice = code.find("fn twice").unwrap();
        let main = code.find("fn main").unwrap();
        assert!(twice < main);

        let body = &code[main..];
        let global = body.find("let global_idx").unwrap();
        let guard = body.find("if (global_idx").unwrap();
        assert!(global < guard);

        assert_eq!(source.inputs, 1);
        assert_eq!(source.outputs, 1);
        assert_eq!(source.uniforms.len(), 2);
    }

    #[test]
    fn test_unbound_variables_fail() {
        let err = program(false).generate_source().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "variables", .. }));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let program = program(true);
        let mut helper = ShaderHelper::new(&program);
        helper.add_input("x", Capabilities::empty()).unwrap();
        assert!(helper.add_output("x", Capabilities::empty()).is_err());
        assert!(helper.add_output("uniforms", Capabilities::empty()).is_err());
        // a second input does not exist
        assert!(helper.add_input("z", Capabilities::empty()).is_err());
    }
}
