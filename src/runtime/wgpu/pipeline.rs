//! Compiled-program cache
//!
//! Generated sources are keyed by [`ProgramKey`]: programs that would produce
//! the same WGSL share one shader module, pipeline and uniform layout.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, Buffer, BufferBindingType, ComputePipeline,
    ComputePipelineDescriptor, Device, PipelineLayoutDescriptor, ShaderModuleDescriptor,
    ShaderSource, ShaderStages,
};

use crate::error::Result;
use crate::program::{GeneratedSource, ProgramDescriptor, ProgramKey};

/// Everything needed to dispatch one cached program
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    /// Source and uniform layout the pipeline was built from
    pub source: Arc<GeneratedSource>,
    /// Compute pipeline with entry point `main`
    pub pipeline: Arc<ComputePipeline>,
    /// Layout of bind group 0
    pub layout: Arc<BindGroupLayout>,
}

/// Key for bind group layout cache
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayoutKey {
    /// Read-only storage buffers (program inputs)
    pub read_only: u32,
    /// Read-write storage buffers (program outputs)
    pub read_write: u32,
}

/// Cache of compiled programs and bind group layouts
pub struct PipelineCache {
    device: Arc<Device>,
    programs: Mutex<HashMap<ProgramKey, CompiledProgram>>,
    layouts: Mutex<HashMap<LayoutKey, Arc<BindGroupLayout>>>,
}

impl PipelineCache {
    /// Create an empty cache for `device`
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            programs: Mutex::new(HashMap::new()),
            layouts: Mutex::new(HashMap::new()),
        }
    }

    /// Get or compile the pipeline for `program`
    ///
    /// Source is only generated on a cache miss.
    pub fn get_or_compile(&self, program: &ProgramDescriptor) -> Result<CompiledProgram> {
        let key = program.cache_key();
        if let Some(compiled) = self.programs.lock().get(&key) {
            return Ok(compiled.clone());
        }

        log::debug!("pipeline cache miss for {}: {}", program.name(), key);
        let source = Arc::new(program.generate_source()?);
        let layout = self.get_or_create_layout(LayoutKey {
            read_only: source.inputs as u32,
            read_write: source.outputs as u32,
        });

        let module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some(program.name()),
            source: ShaderSource::Wgsl(source.code.as_str().into()),
        });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(&format!("{}_layout", program.name())),
                bind_group_layouts: &[&layout],
                immediate_size: 0,
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some(program.name()),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

        let compiled = CompiledProgram {
            source,
            pipeline: Arc::new(pipeline),
            layout,
        };
        // Another thread may have compiled the same key meanwhile; keep the first
        let mut programs = self.programs.lock();
        Ok(programs.entry(key).or_insert(compiled).clone())
    }

    /// Get or create the bind group layout: read-only storage, read-write
    /// storage, then one uniform buffer
    pub fn get_or_create_layout(&self, key: LayoutKey) -> Arc<BindGroupLayout> {
        let mut layouts = self.layouts.lock();

        if let Some(layout) = layouts.get(&key) {
            return layout.clone();
        }

        let storage = |binding: u32, read_only: bool| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStages::COMPUTE,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let mut entries = Vec::new();
        for i in 0..key.read_only {
            entries.push(storage(i, true));
        }
        for i in 0..key.read_write {
            entries.push(storage(key.read_only + i, false));
        }
        entries.push(BindGroupLayoutEntry {
            binding: key.read_only + key.read_write,
            visibility: ShaderStages::COMPUTE,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });

        let layout = self
            .device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("program_layout"),
                entries: &entries,
            });

        let layout = Arc::new(layout);
        layouts.insert(key, layout.clone());
        layout
    }

    /// Create a bind group binding `buffers` in order
    pub fn create_bind_group(&self, layout: &BindGroupLayout, buffers: &[&Buffer]) -> BindGroup {
        let entries: Vec<BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("program_bind_group"),
            layout,
            entries: &entries,
        })
    }

    /// Number of compiled programs
    pub fn len(&self) -> usize {
        self.programs.lock().len()
    }

    /// Whether nothing has been compiled yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCache")
            .field("programs", &self.len())
            .finish_non_exhaustive()
    }
}
