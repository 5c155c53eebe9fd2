use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytemuck::{Pod, Zeroable};
use instant::Instant;
use log::{debug, info};
use wgpu::util::DeviceExt;
use wgpu::*;

use super::{check_repeat, BenchmarkReport, ResizeBenchmark};
use crate::bgr_image::{BgrImage, CHANNELS};
use crate::error::{BenchError, BenchResult};
use crate::gpu::GpuContext;

const WORKGROUP_SIZE: u32 = 64;
const MAX_WORKGROUPS_PER_DIM: u32 = 65535;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct ResizeParams {
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
    scale_x: f32,
    scale_y: f32,
    out_words: u32,
    row_words: u32,
}

impl ResizeParams {
    fn new(src: (u32, u32), dst: (u32, u32)) -> Self {
        let out_words = padded_len(byte_len(dst)) as u32 / 4;
        let (dispatch_x, _) = dispatch_size(out_words);
        Self {
            src_width: src.0,
            src_height: src.1,
            dst_width: dst.0,
            dst_height: dst.1,
            scale_x: src.0 as f32 / dst.0 as f32,
            scale_y: src.1 as f32 / dst.1 as f32,
            out_words,
            row_words: dispatch_x * WORKGROUP_SIZE,
        }
    }
}

/// Device memory allocated once and overwritten on every iteration.
struct DeviceBuffers {
    src: Buffer,
    dst: Buffer,
    readback: Buffer,
    _params: Buffer,
    bind_group: BindGroup,
}

pub struct GpuResizeBenchmark {
    ctx: GpuContext,
    src_size: (u32, u32),
    target: (u32, u32),
    pipeline: ComputePipeline,
    buffers: DeviceBuffers,
    dispatch: (u32, u32),
    setup_times: Vec<(String, Duration)>,
}

impl GpuResizeBenchmark {
    /// Build the pipeline and allocate all device buffers for a fixed
    /// source and target size.
    ///
    /// Fails with [`BenchError::BufferTooLarge`] when either image does not
    /// fit in one storage binding on this device.
    pub fn new(
        ctx: GpuContext,
        src_size: (u32, u32),
        target: (u32, u32),
    ) -> BenchResult<Self> {
        let src_bytes = padded_len(byte_len(src_size)) as u64;
        let dst_bytes = padded_len(byte_len(target)) as u64;
        let limits = ctx.device.limits();
        check_buffer_size("Source image", src_bytes, &limits)?;
        check_buffer_size("Resized image", dst_bytes, &limits)?;

        let mut setup_times = Vec::new();
        let device = &ctx.device;
        let params = ResizeParams::new(src_size, target);

        let start = Instant::now();
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("resize_bilinear"),
            source: ShaderSource::Wgsl(Cow::Borrowed(include_str!(
                "./shaders/resize_bilinear.wgsl"
            ))),
        });
        setup_times.push(("Create shader module".to_string(), start.elapsed()));

        let start = Instant::now();
        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("resize_bind_group_layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                BindGroupLayoutEntry {
                    binding: 2,
                    visibility: ShaderStages::COMPUTE,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("resize_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("resize_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: PipelineCompilationOptions {
                constants: &HashMap::from([(
                    "WORKGROUP_SIZE".to_string(),
                    WORKGROUP_SIZE as f64,
                )]),
                zero_initialize_workgroup_memory: true,
            },
            cache: None,
        });
        setup_times.push(("Create compute pipeline".to_string(), start.elapsed()));

        let start = Instant::now();
        let src = device.create_buffer(&BufferDescriptor {
            label: Some("Source Buffer"),
            size: src_bytes,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let dst = device.create_buffer(&BufferDescriptor {
            label: Some("Destination Buffer"),
            size: dst_bytes,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = device.create_buffer(&BufferDescriptor {
            label: Some("Readback Buffer"),
            size: dst_bytes,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params_buffer = device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some("Resize Params"),
            contents: bytemuck::bytes_of(&params),
            usage: BufferUsages::UNIFORM,
        });
        setup_times.push((
            format!("Allocate device buffers ({} + {} bytes)", src_bytes, dst_bytes),
            start.elapsed(),
        ));

        let start = Instant::now();
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("resize_bind_group"),
            layout: &bind_group_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: src.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: dst.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });
        setup_times.push(("Create bind group".to_string(), start.elapsed()));

        Ok(Self {
            ctx,
            src_size,
            target,
            pipeline,
            buffers: DeviceBuffers {
                src,
                dst,
                readback,
                _params: params_buffer,
                bind_group,
            },
            dispatch: dispatch_size(params.out_words),
            setup_times,
        })
    }

    pub fn log_setup_times(&self) {
        info!("GPU Resource Creation Times");
        info!("{:-<60}", "");
        for (name, duration) in &self.setup_times {
            info!("{:<40} {:>15.3}", name, duration.as_secs_f64() * 1000.0);
        }
        info!("{:-<60}", "");
    }

    fn upload(&self, bytes: &[u8]) {
        // write_buffer needs 4-byte aligned sizes, the tail goes in a padded word.
        let aligned = bytes.len() & !3;
        if aligned > 0 {
            self.ctx
                .queue
                .write_buffer(&self.buffers.src, 0, &bytes[..aligned]);
        }
        let tail = &bytes[aligned..];
        if !tail.is_empty() {
            let mut word = [0u8; 4];
            word[..tail.len()].copy_from_slice(tail);
            self.ctx
                .queue
                .write_buffer(&self.buffers.src, aligned as u64, &word);
        }
    }

    fn submit_resize(&self) {
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("resize"),
            });
        {
            let mut compute_pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("resize_pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &self.buffers.bind_group, &[]);
            compute_pass.dispatch_workgroups(self.dispatch.0, self.dispatch.1, 1);
        }
        encoder.copy_buffer_to_buffer(
            &self.buffers.dst,
            0,
            &self.buffers.readback,
            0,
            self.buffers.readback.size(),
        );
        self.ctx.queue.submit(Some(encoder.finish()));
    }

    async fn download(&self, host: &mut [u8]) -> BenchResult<()> {
        let slice = self.buffers.readback.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.ctx.device.poll(MaintainBase::Wait);

        receiver
            .receive()
            .await
            .ok_or(BenchError::MapChannelClosed)??;
        {
            let data = slice.get_mapped_range();
            host.copy_from_slice(&data[..host.len()]);
        }
        self.buffers.readback.unmap();
        Ok(())
    }
}

#[async_trait]
impl ResizeBenchmark for GpuResizeBenchmark {
    fn name(&self) -> &str {
        "GPU"
    }

    async fn run(&mut self, src: &BgrImage, repeat: u32) -> BenchResult<BenchmarkReport> {
        check_repeat(repeat)?;
        if src.dimensions() != self.src_size {
            return Err(BenchError::SizeMismatch {
                width: self.src_size.0,
                height: self.src_size.1,
                actual_width: src.width(),
                actual_height: src.height(),
            });
        }
        let (width, height) = self.target;
        let mut host = vec![0u8; byte_len(self.target)];

        debug!(
            "GPU: resizing {}x{} -> {}x{} on {}, {} times, dispatch {:?}",
            src.width(),
            src.height(),
            width,
            height,
            self.ctx,
            repeat,
            self.dispatch
        );
        let start = Instant::now();
        for _ in 0..repeat {
            self.upload(src.as_bytes());
            self.submit_resize();
            self.download(&mut host).await?;
        }
        let elapsed = start.elapsed();

        Ok(BenchmarkReport {
            mode: self.name().to_string(),
            repeat,
            elapsed,
            output: BgrImage::from_raw(width, height, host)?,
        })
    }
}

fn storage_entry(binding: u32, read_only: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn check_buffer_size(what: &'static str, bytes: u64, limits: &Limits) -> BenchResult<()> {
    let limit = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    if bytes > limit {
        return Err(BenchError::BufferTooLarge { what, bytes, limit });
    }
    Ok(())
}

fn byte_len((width, height): (u32, u32)) -> usize {
    width as usize * height as usize * CHANNELS
}

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// Workgroup grid covering `words` invocations, spilling into y once x
/// reaches the per-dimension limit.
fn dispatch_size(words: u32) -> (u32, u32) {
    let groups = words.div_ceil(WORKGROUP_SIZE).max(1);
    if groups <= MAX_WORKGROUPS_PER_DIM {
        (groups, 1)
    } else {
        (MAX_WORKGROUPS_PER_DIM, groups.div_ceil(MAX_WORKGROUPS_PER_DIM))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmarks::cpu_resize::CpuResizeBenchmark;
    use crate::benchmarks::TARGET_SIZE;
    use crate::bgr_image::gradient;

    #[test]
    fn padding_rounds_up_to_words() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(3), 4);
        assert_eq!(padded_len(8), 8);
        assert_eq!(padded_len(byte_len((300, 300))), 270_000);
        assert_eq!(padded_len(byte_len((5, 1))), 16);
    }

    #[test]
    fn dispatch_covers_all_words() {
        assert_eq!(dispatch_size(1), (1, 1));
        assert_eq!(dispatch_size(64), (1, 1));
        assert_eq!(dispatch_size(65), (2, 1));
        assert_eq!(dispatch_size(67_500), (1055, 1));

        let words = 70_000 * WORKGROUP_SIZE;
        let (x, y) = dispatch_size(words);
        assert_eq!(x, MAX_WORKGROUPS_PER_DIM);
        assert!(x as u64 * y as u64 * WORKGROUP_SIZE as u64 >= words as u64);
    }

    #[test]
    fn params_match_sizes() {
        let p = ResizeParams::new((512, 512), TARGET_SIZE);
        assert_eq!(p.out_words, 67_500);
        assert_eq!(p.row_words, 1055 * WORKGROUP_SIZE);
        assert!((p.scale_x - 512.0 / 300.0).abs() < 1e-6);
        assert_eq!(std::mem::size_of::<ResizeParams>(), 32);
    }

    #[test]
    fn buffers_must_fit_device_limits() {
        let limits = Limits::default();
        let lena = padded_len(byte_len((512, 512))) as u64;
        assert!(check_buffer_size("Source image", lena, &limits).is_ok());

        // 8000x6000 BGR is 144 MB, over the default 128 MiB binding limit.
        let photo = padded_len(byte_len((8000, 6000))) as u64;
        let err = check_buffer_size("Source image", photo, &limits).unwrap_err();
        assert!(matches!(
            err,
            BenchError::BufferTooLarge {
                bytes: 144_000_000,
                limit: 134_217_728,
                ..
            }
        ));

        let tight = Limits {
            max_storage_buffer_binding_size: u32::MAX,
            max_buffer_size: 1024,
            ..Limits::default()
        };
        assert!(check_buffer_size("Resized image", 1024, &tight).is_ok());
        assert!(check_buffer_size("Resized image", 1028, &tight).is_err());
    }

    fn gpu_bench(src: (u32, u32), target: (u32, u32)) -> GpuResizeBenchmark {
        let ctx = pollster::block_on(GpuContext::new(true)).unwrap();
        GpuResizeBenchmark::new(ctx, src, target).unwrap()
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn matches_cpu_resize() {
        let src = gradient(512, 512);
        let mut gpu = gpu_bench(src.dimensions(), TARGET_SIZE);
        let mut cpu = CpuResizeBenchmark::new(TARGET_SIZE);

        let gpu_out = pollster::block_on(gpu.run(&src, 1)).unwrap().output;
        let cpu_out = pollster::block_on(cpu.run(&src, 1)).unwrap().output;

        assert_eq!(gpu_out.shape(), (300, 300, 3));
        assert_eq!(cpu_out.shape(), (300, 300, 3));
        let diff = gpu_out.max_abs_diff(&cpu_out).unwrap();
        assert!(diff <= 2, "max channel difference {diff}");
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn buffer_reuse_keeps_results() {
        let src = gradient(123, 77);
        let mut gpu = gpu_bench(src.dimensions(), (31, 45));
        let first = pollster::block_on(gpu.run(&src, 3)).unwrap();
        let second = pollster::block_on(gpu.run(&src, 3)).unwrap();
        assert_eq!(first.output, second.output);
        assert!(second.avg_ms().is_finite());
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn source_size_must_match_buffers() {
        let mut gpu = gpu_bench((64, 64), (10, 10));
        let err = pollster::block_on(gpu.run(&gradient(32, 64), 1)).unwrap_err();
        assert!(matches!(err, BenchError::SizeMismatch { .. }));
    }
}
