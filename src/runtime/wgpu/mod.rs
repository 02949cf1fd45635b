//! WebGPU execution adapter
//!
//! [`WgpuExecutor`] owns a device, its queue and a [`PipelineCache`].
//! [`WgpuContext`] binds uploaded operand buffers to a kernel and implements
//! [`ComputeContext`] on top of the executor.
//!
//! # Thread Safety
//!
//! `WgpuExecutor` is `Send + Sync`; the pipeline cache sits behind
//! `parking_lot` mutexes. A `WgpuContext` serves one kernel invocation.

mod pipeline;

pub use pipeline::{CompiledProgram, LayoutKey, PipelineCache};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use wgpu::{Buffer, BufferDescriptor, BufferUsages, Device, Queue};

use super::ComputeContext;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::program::{ProgramDescriptor, pack_uniforms, packed_count};
use crate::shaders::PACKING_WIDTH;
use crate::tensor::TensorView;

/// Error type for WebGPU operations.
#[derive(Debug, Clone)]
pub enum WgpuError {
    /// No suitable GPU adapter found.
    NoAdapter,
    /// Device request failed.
    DeviceError(String),
    /// Buffer operation failed.
    BufferError(String),
}

impl fmt::Display for WgpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WgpuError::NoAdapter => write!(f, "No suitable WebGPU adapter found"),
            WgpuError::DeviceError(msg) => write!(f, "WebGPU device error: {}", msg),
            WgpuError::BufferError(msg) => write!(f, "WebGPU buffer error: {}", msg),
        }
    }
}

impl std::error::Error for WgpuError {}

/// Device, queue and compiled-program cache
pub struct WgpuExecutor {
    device: Arc<Device>,
    queue: Arc<Queue>,
    adapter_name: String,
    pipeline_cache: PipelineCache,
}

impl fmt::Debug for WgpuExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuExecutor")
            .field("adapter", &self.adapter_name)
            .field("pipeline_cache", &self.pipeline_cache)
            .finish_non_exhaustive()
    }
}

impl WgpuExecutor {
    /// Open the default high-performance adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if no adapter is found or device creation fails.
    pub fn new() -> std::result::Result<Self, WgpuError> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> std::result::Result<Self, WgpuError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| WgpuError::NoAdapter)?;

        let required_features = if cfg!(feature = "f16") {
            adapter.features() & wgpu::Features::SHADER_F16
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("wgkern WebGPU Device"),
                required_features,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
                experimental_features: wgpu::ExperimentalFeatures::default(),
            })
            .await
            .map_err(|e| WgpuError::DeviceError(format!("{:?}", e)))?;

        let adapter_name = adapter.get_info().name;
        log::debug!("opened WebGPU adapter {adapter_name}");

        let device = Arc::new(device);
        Ok(Self {
            pipeline_cache: PipelineCache::new(device.clone()),
            device,
            queue: Arc::new(queue),
            adapter_name,
        })
    }

    /// Adapter name (e.g., "NVIDIA GeForce RTX 4090")
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Compiled-program cache
    #[inline]
    pub fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipeline_cache
    }

    /// Upload raw element bytes into a storage buffer
    ///
    /// The buffer is padded to whole packed units so the last unit can be
    /// loaded as a vector.
    pub fn upload(&self, label: &str, bytes: &[u8]) -> Buffer {
        let size = padded_size(bytes.len() as u64);
        let buffer = self.create_storage_buffer(label, size);
        let mut padded = bytes.to_vec();
        padded.resize(size as usize, 0);
        self.queue.write_buffer(&buffer, 0, &padded);
        buffer
    }

    /// Upload a bool mask, one byte per element
    pub fn upload_bools(&self, label: &str, values: &[bool]) -> Buffer {
        let bytes: Vec<u8> = values.iter().map(|&v| u8::from(v)).collect();
        self.upload(label, &bytes)
    }

    /// Create a storage buffer for tensor data.
    pub fn create_storage_buffer(&self, label: &str, size: u64) -> Buffer {
        self.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Read `len` bytes of a storage buffer back to the host (blocking).
    pub fn read_bytes(&self, buffer: &Buffer, len: u64) -> Result<Vec<u8>> {
        let size = padded_size(len);
        let staging = self.device.create_buffer(&BufferDescriptor {
            label: Some("staging"),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.submit_and_wait(encoder)?;

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(Duration::from_secs(60)),
            })
            .map_err(Error::execution)?;

        receiver
            .recv()
            .map_err(|_| {
                Error::execution(WgpuError::BufferError(
                    "map_async callback was not invoked".into(),
                ))
            })?
            .map_err(Error::execution)?;

        let bytes = slice.get_mapped_range()[..len as usize].to_vec();
        staging.unmap();
        Ok(bytes)
    }

    /// Read `count` elements of a `Pod` type back to the host.
    pub fn read<T: bytemuck::Pod>(&self, buffer: &Buffer, count: usize) -> Result<Vec<T>> {
        let bytes = self.read_bytes(buffer, (count * std::mem::size_of::<T>()) as u64)?;
        Ok(bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Compile (or reuse) and dispatch `program` with `buffers` bound in
    /// binding order: inputs, then outputs.
    pub fn dispatch(&self, program: &ProgramDescriptor, buffers: &[&Buffer]) -> Result<()> {
        let compiled = self.pipeline_cache.get_or_compile(program)?;
        let expected = compiled.source.inputs + compiled.source.outputs;
        if buffers.len() != expected {
            return Err(Error::InvalidArgument {
                arg: "buffers",
                reason: format!(
                    "{} binds {expected} storage buffers, got {}",
                    program.name(),
                    buffers.len()
                ),
            });
        }

        let uniforms = program.resolve_uniforms(&compiled.source)?;
        let bytes = pack_uniforms(&uniforms);
        let uniform_buffer = self.device.create_buffer(&BufferDescriptor {
            label: Some("uniforms"),
            size: bytes.len() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue.write_buffer(&uniform_buffer, 0, &bytes);

        let mut bound: Vec<&Buffer> = buffers.to_vec();
        bound.push(&uniform_buffer);
        let bind_group = self
            .pipeline_cache
            .create_bind_group(&compiled.layout, &bound);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(program.name()),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(program.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&compiled.pipeline);
            pass.set_bind_group(0, Some(&bind_group), &[]);
            let [x, y, z] = program.dispatch().groups();
            pass.dispatch_workgroups(x, y, z);
        }
        self.submit_and_wait(encoder)
    }

    /// Submit commands and wait for completion.
    fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) -> Result<()> {
        let submission = self.queue.submit(std::iter::once(encoder.finish()));
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: Some(Duration::from_secs(60)),
            })
            .map(|_| ())
            .map_err(Error::execution)
    }
}

/// Buffer size in bytes for `len` bytes of elements, padded to a whole
/// `vec4` unit and never zero
fn padded_size(len: u64) -> u64 {
    len.max(1).next_multiple_of(16)
}

/// Bytes a packed storage buffer needs for `view`
fn storage_bytes(view: &TensorView) -> Result<u64> {
    let elem = view
        .dtype()
        .size_in_bytes()
        .ok_or_else(|| Error::unsupported_dtype(view.dtype(), "wgpu buffer"))?;
    let units = packed_count(view.numel(), PACKING_WIDTH)? as u64;
    Ok(padded_size(units * PACKING_WIDTH as u64 * elem as u64))
}

/// Device buffer together with the view describing it
#[derive(Debug, Clone)]
pub struct DeviceTensor {
    /// Operand view
    pub view: TensorView,
    /// Backing storage buffer
    pub buffer: Arc<Buffer>,
}

/// [`ComputeContext`] for one kernel invocation on a [`WgpuExecutor`]
///
/// Inputs are uploaded by the caller; outputs are allocated on request with
/// the element types given at construction.
#[derive(Debug)]
pub struct WgpuContext<'a> {
    executor: &'a WgpuExecutor,
    inputs: Vec<DeviceTensor>,
    output_dtypes: Vec<DType>,
    outputs: Vec<Option<DeviceTensor>>,
}

impl<'a> WgpuContext<'a> {
    /// Context reading `inputs` and producing outputs of `output_dtypes`
    pub fn new(
        executor: &'a WgpuExecutor,
        inputs: Vec<DeviceTensor>,
        output_dtypes: Vec<DType>,
    ) -> Self {
        let outputs = vec![None; output_dtypes.len()];
        Self {
            executor,
            inputs,
            output_dtypes,
            outputs,
        }
    }

    /// Output `index`, once allocated
    pub fn output_tensor(&self, index: usize) -> Option<&DeviceTensor> {
        self.outputs.get(index).and_then(Option::as_ref)
    }
}

impl ComputeContext for WgpuContext<'_> {
    fn input(&self, index: usize) -> Result<TensorView> {
        self.inputs
            .get(index)
            .map(|t| t.view.clone())
            .ok_or_else(|| Error::InvalidArgument {
                arg: "input",
                reason: format!("no input {index}"),
            })
    }

    fn output(&mut self, index: usize, shape: &[usize]) -> Result<TensorView> {
        let dtype = *self.output_dtypes.get(index).ok_or_else(|| Error::InvalidArgument {
            arg: "output",
            reason: format!("no output {index}"),
        })?;
        let view = TensorView::new(shape, dtype)?;
        let buffer = self
            .executor
            .create_storage_buffer(&format!("output_{index}"), storage_bytes(&view)?);
        self.outputs[index] = Some(DeviceTensor {
            view: view.clone(),
            buffer: Arc::new(buffer),
        });
        Ok(view)
    }

    fn run_program(&mut self, program: ProgramDescriptor) -> Result<()> {
        let mut buffers: Vec<&Buffer> = self.inputs.iter().map(|t| t.buffer.as_ref()).collect();
        for (i, output) in self.outputs.iter().enumerate() {
            let tensor = output.as_ref().ok_or_else(|| Error::InvalidArgument {
                arg: "output",
                reason: format!("output {i} was never allocated"),
            })?;
            buffers.push(tensor.buffer.as_ref());
        }
        self.executor.dispatch(&program, &buffers)
    }
}
