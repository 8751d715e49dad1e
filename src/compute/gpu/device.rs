//! GPU device - wgpu compute pipeline running the mask kernel band by band.

use super::GpuError;
use crate::compute::{
    BYTES_PER_PIXEL, BuildError, ComputeDevice, DeviceClass, DeviceClock, DeviceDescriptor,
    DeviceError, KernelLaunch, ProfilingEvent, ProgramSource, Stage, check_launch, codes,
    copy_checked,
};
use crate::schema::{GpuDeviceConfig, PowerPreference};

/// Workgroup edge length, matching `@workgroup_size(16, 16, 1)` in the shader.
const WORKGROUP_SIZE: u32 = 16;

/// Uniform buffer struct for the mask shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct MaskParams {
    width: u32,
    height: u32,
    offset_y: u32,
    rows: u32,
    selector: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

/// Compiled pipeline for one entry point.
struct BuiltKernel {
    entry_point: String,
    pipeline: wgpu::ComputePipeline,
}

/// GPU-class compute device using WebGPU compute shaders.
///
/// Tile storage lives in host memory shared with the CPU device; each band
/// launch uploads the tile input, runs the pipeline over the band rows and
/// maps the band back, all inside the kernel's timed window.
pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    descriptor: DeviceDescriptor,
    clock: DeviceClock,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    kernel: Option<BuiltKernel>,
}

impl GpuDevice {
    /// Open the first adapter matching `config`.
    pub async fn new(config: &GpuDeviceConfig) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = match config.power_preference {
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        };
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: config.force_fallback_adapter,
            })
            .await
            .map_err(|_| GpuError::NoAdapter)?;

        let info = adapter.get_info();
        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Tile Dispatch GPU"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                ..Default::default()
            })
            .await?;

        let limits = device.limits();
        let adapter_max = limits
            .max_buffer_size
            .min(u64::from(limits.max_storage_buffer_binding_size));
        let max_alloc_bytes = config
            .max_alloc_bytes
            .map_or(adapter_max, |cap| cap.min(adapter_max));

        let max_extent = usize::try_from(
            u64::from(limits.max_compute_workgroups_per_dimension) * u64::from(WORKGROUP_SIZE),
        )
        .unwrap_or(usize::MAX);

        log::debug!(
            "opened GPU {} ({:?}, {:?}), max allocation {} bytes, max launch {}x{}",
            info.name,
            info.backend,
            info.device_type,
            max_alloc_bytes,
            max_extent,
            max_extent
        );

        let bind_group_layout = create_mask_bind_group_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mask Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            ..Default::default()
        });

        Ok(Self {
            device,
            queue,
            descriptor: DeviceDescriptor::new(info.name, DeviceClass::Gpu, max_alloc_bytes)
                .with_dispatch_limit(max_extent, max_extent),
            clock: DeviceClock::new(),
            bind_group_layout,
            pipeline_layout,
            kernel: None,
        })
    }

    fn error(&self, stage: Stage, code: i32, message: impl Into<String>) -> DeviceError {
        DeviceError::new(stage, self.descriptor.name.clone(), code, message)
    }

    /// Upload, dispatch over the band, copy back. Blocks until mapped.
    fn run_band(
        &self,
        pipeline: &wgpu::ComputePipeline,
        launch: KernelLaunch<'_>,
    ) -> Result<(), DeviceError> {
        let band_bytes = launch.output.len() as u64;
        let name = self.descriptor.name.as_str();
        let width = launch_dim(name, "width", launch.width)?;
        let height = launch_dim(name, "height", launch.height)?;
        let offset_y = launch_dim(name, "offset_y", launch.offset_y)?;
        let rows = launch_dim(name, "rows", launch.rows)?;

        let workgroups_x = width.div_ceil(WORKGROUP_SIZE);
        let workgroups_y = rows.div_ceil(WORKGROUP_SIZE);
        let max_groups = self.device.limits().max_compute_workgroups_per_dimension;
        if workgroups_x > max_groups || workgroups_y > max_groups {
            return Err(self.error(
                Stage::Kernel,
                codes::INVALID_WORK_GROUP_SIZE,
                format!(
                    "{}x{} workgroups exceed the per-dimension limit {}",
                    workgroups_x, workgroups_y, max_groups
                ),
            ));
        }

        let params = MaskParams {
            width,
            height,
            offset_y,
            rows,
            selector: launch.selector.selector(),
            _pad0: 0,
            _pad1: 0,
            _pad2: 0,
        };

        let params_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Mask Params"),
            size: std::mem::size_of::<MaskParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&params_buffer, 0, bytemuck::bytes_of(&params));

        let input_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Tile Input Buffer"),
            size: launch.input.len() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue.write_buffer(&input_buffer, 0, launch.input);

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Band Output Buffer"),
            size: band_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Band Staging Buffer"),
            size: band_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mask Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: input_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Band Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Mask Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups_x, workgroups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&output_buffer, 0, &staging_buffer, 0, band_bytes);
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| GpuError::from(e).into_device_error(Stage::Kernel, &self.descriptor.name))?;
        rx.recv()
            .map_err(|_| {
                self.error(
                    Stage::Kernel,
                    codes::MAP_FAILURE,
                    "map callback dropped before completion",
                )
            })?
            .map_err(|e| GpuError::from(e).into_device_error(Stage::Kernel, &self.descriptor.name))?;

        {
            let data = buffer_slice.get_mapped_range();
            launch.output.copy_from_slice(&data);
        }
        staging_buffer.unmap();

        Ok(())
    }
}

impl ComputeDevice for GpuDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn build(&mut self, program: &ProgramSource) -> Result<(), BuildError> {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Mask Shader"),
                source: wgpu::ShaderSource::Wgsl(program.source.clone()),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Mask Pipeline"),
                layout: Some(&self.pipeline_layout),
                module: &shader,
                entry_point: Some(program.entry_point.as_str()),
                compilation_options: Default::default(),
                cache: None,
            });

        if let Some(error) = pollster::block_on(scope.pop()) {
            return Err(BuildError {
                device: self.descriptor.name.clone(),
                entry_point: program.entry_point.clone(),
                log: error.to_string(),
            });
        }

        log::debug!("built `{}` for {}", program.entry_point, self.descriptor.name);
        self.kernel = Some(BuiltKernel {
            entry_point: program.entry_point.clone(),
            pipeline,
        });
        Ok(())
    }

    fn write_image(&self, storage: &mut [u8], data: &[u8]) -> Result<ProfilingEvent, DeviceError> {
        let (result, event) = self
            .clock
            .timed(|| copy_checked(&self.descriptor, Stage::Write, storage, data));
        result.map(|()| event)
    }

    fn enqueue_kernel(&self, launch: KernelLaunch<'_>) -> Result<ProfilingEvent, DeviceError> {
        let pipeline = match &self.kernel {
            Some(kernel) if kernel.entry_point == launch.entry_point => &kernel.pipeline,
            Some(_) | None => {
                return Err(self.error(
                    Stage::Kernel,
                    codes::INVALID_KERNEL_NAME,
                    format!("kernel `{}` was not built", launch.entry_point),
                ));
            }
        };
        check_launch(&self.descriptor, &launch)?;

        if launch.width * BYTES_PER_PIXEL == 0 || launch.rows == 0 {
            let now = self.clock.now_ns();
            return Ok(ProfilingEvent {
                start_ns: now,
                end_ns: now,
            });
        }

        let (result, event) = self.clock.timed(|| self.run_band(pipeline, launch));
        result.map(|()| event)
    }

    fn read_image(&self, storage: &[u8], dst: &mut [u8]) -> Result<ProfilingEvent, DeviceError> {
        let (result, event) = self
            .clock
            .timed(|| copy_checked(&self.descriptor, Stage::Read, dst, storage));
        result.map(|()| event)
    }
}

/// Convert a launch dimension to the shader's `u32`.
fn launch_dim(device: &str, what: &str, value: usize) -> Result<u32, DeviceError> {
    u32::try_from(value).map_err(|_| {
        DeviceError::new(
            Stage::Kernel,
            device,
            codes::INVALID_VALUE,
            format!("launch {} {} does not fit in 32 bits", what, value),
        )
    })
}

fn create_mask_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Mask Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}
