use std::fmt;

use log::{debug, warn};
use wgpu::*;

use crate::error::{BenchError, BenchResult};

/// Adapter, device and queue shared by the GPU benchmark.
///
/// `_instance` is declared last so it outlives `device` and `queue`.
pub struct GpuContext {
    pub device: Device,
    pub queue: Queue,
    pub adapter_info: AdapterInfo,
    _instance: Instance,
}

impl GpuContext {
    pub async fn new(allow_software: bool) -> BenchResult<Self> {
        let instance = Instance::default();

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await;
        check_adapter(adapter.as_ref().map(|a| a.get_info().device_type), allow_software)?;
        let adapter = adapter.ok_or(BenchError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        debug!(
            "Selected adapter: {} ({:?}, {:?})",
            adapter_info.name, adapter_info.backend, adapter_info.device_type
        );
        if !is_hardware(adapter_info.device_type) {
            warn!("Using software adapter {}", adapter_info.name);
        }

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("resize-latency"),
                    required_features: Features::empty(),
                    required_limits: Limits::default(),
                    memory_hints: MemoryHints::Performance,
                },
                None,
            )
            .await?;

        Ok(Self {
            device,
            queue,
            adapter_info,
            _instance: instance,
        })
    }
}

impl fmt::Display for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {:?})",
            self.adapter_info.name, self.adapter_info.backend, self.adapter_info.device_type
        )
    }
}

fn is_hardware(device_type: DeviceType) -> bool {
    !matches!(device_type, DeviceType::Cpu)
}

/// Accept or reject the adapter returned by the instance, if any.
fn check_adapter(device_type: Option<DeviceType>, allow_software: bool) -> BenchResult<()> {
    match device_type {
        None => Err(BenchError::NoAdapter),
        Some(t) if !is_hardware(t) && !allow_software => Err(BenchError::NoAdapter),
        Some(_) => Ok(()),
    }
}

/// Identity of an enumerated adapter, enough to tell physical devices apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AdapterKey {
    vendor: u32,
    device: u32,
    device_type: DeviceType,
    backend: Backend,
}

impl From<&AdapterInfo> for AdapterKey {
    fn from(info: &AdapterInfo) -> Self {
        Self {
            vendor: info.vendor,
            device: info.device,
            device_type: info.device_type,
            backend: info.backend,
        }
    }
}

/// Number of physical GPUs visible to wgpu.
pub fn count_gpu_devices() -> usize {
    let instance = Instance::default();
    let keys: Vec<AdapterKey> = instance
        .enumerate_adapters(Backends::all())
        .iter()
        .map(|adapter| AdapterKey::from(&adapter.get_info()))
        .collect();
    count_hardware(&keys)
}

fn is_primary(backend: Backend) -> bool {
    matches!(backend, Backend::Vulkan | Backend::Metal | Backend::Dx12)
}

/// One GPU shows up once per backend (e.g. Vulkan and GL). Count the
/// primary backends only when they expose anything, then drop repeats of
/// the same vendor/device pair.
fn count_hardware(adapters: &[AdapterKey]) -> usize {
    let hardware: Vec<&AdapterKey> = adapters
        .iter()
        .filter(|a| is_hardware(a.device_type))
        .collect();
    let has_primary = hardware.iter().any(|a| is_primary(a.backend));

    let mut seen: Vec<(u32, u32)> = Vec::new();
    for a in hardware {
        if has_primary && !is_primary(a.backend) {
            continue;
        }
        if !seen.contains(&(a.vendor, a.device)) {
            seen.push((a.vendor, a.device));
        }
    }
    seen.len()
}
