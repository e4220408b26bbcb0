//! GPU context and device management

use std::collections::HashMap;
use std::sync::Arc;

use gblur_core::{KernelKey, PixelFormat};
use tracing::{debug, info};
use wgpu::{Device, DeviceDescriptor, Features, Instance, Queue, TextureUsages};

use crate::formats::{usage_table, PIPELINE_USAGES};
use crate::shader_cache::ShaderCache;
use crate::{GpuError, GpuResult};

/// Environment variable selecting the wgpu backend set.
pub const BACKEND_ENV: &str = "GBLUR_BACKEND";

/// Device selection options.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub power_preference: wgpu::PowerPreference,
    pub backends: wgpu::Backends,
    /// Request `TIMESTAMP_QUERY` when the adapter offers it.
    pub request_timestamps: bool,
    pub force_fallback_adapter: bool,
}

impl Default for ContextOptions {
    /// High-performance adapter on every backend, timestamps requested.
    /// `GBLUR_BACKEND` overrides the backend set.
    fn default() -> Self {
        let backends = std::env::var(BACKEND_ENV)
            .ok()
            .and_then(|v| parse_backends(&v))
            .unwrap_or(wgpu::Backends::all());
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            backends,
            request_timestamps: true,
            force_fallback_adapter: false,
        }
    }
}

/// Parses a backend name as accepted by `GBLUR_BACKEND`.
pub fn parse_backends(name: &str) -> Option<wgpu::Backends> {
    match name.trim().to_ascii_lowercase().as_str() {
        "vulkan" | "vk" => Some(wgpu::Backends::VULKAN),
        "metal" | "mtl" => Some(wgpu::Backends::METAL),
        "dx12" | "d3d12" => Some(wgpu::Backends::DX12),
        "gl" | "gles" | "opengl" => Some(wgpu::Backends::GL),
        "all" => Some(wgpu::Backends::all()),
        _ => None,
    }
}

/// GPU context holding device, queue and compiled kernels
pub struct GpuContext {
    pub(crate) device: Arc<Device>,
    pub(crate) queue: Arc<Queue>,
    adapter_info: wgpu::AdapterInfo,
    timestamps: bool,
    /// Texture usages the device accepts, per registry format id.
    format_usages: HashMap<&'static str, TextureUsages>,
    shaders: ShaderCache,
}

impl GpuContext {
    /// Create new GPU context with default settings
    pub fn new() -> GpuResult<Self> {
        Self::with_options(ContextOptions::default())
    }

    /// Create context with explicit options
    pub fn with_options(options: ContextOptions) -> GpuResult<Self> {
        pollster::block_on(Self::new_async(options))
    }

    /// Check whether any adapter matches the default options.
    pub fn is_available() -> bool {
        let options = ContextOptions::default();
        pollster::block_on(async {
            let instance = Instance::new(&wgpu::InstanceDescriptor {
                backends: options.backends,
                ..Default::default()
            });
            instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: options.power_preference,
                    compatible_surface: None,
                    force_fallback_adapter: options.force_fallback_adapter,
                })
                .await
                .is_some()
        })
    }

    /// Async context creation
    pub async fn new_async(options: ContextOptions) -> GpuResult<Self> {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        let timestamps =
            options.request_timestamps && adapter.features().contains(Features::TIMESTAMP_QUERY);
        let required_features = if timestamps {
            Features::TIMESTAMP_QUERY
        } else {
            Features::empty()
        };

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("gblur_device"),
                    required_features,
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| GpuError::DeviceCreation(e.to_string()))?;

        let format_usages = usage_table(&adapter, device.features());
        let renderable: Vec<_> = format_usages
            .iter()
            .filter(|(_, usages)| usages.contains(PIPELINE_USAGES))
            .map(|(id, _)| *id)
            .collect();

        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            timestamps,
            renderable = renderable.len(),
            "GPU context ready"
        );
        debug!(?renderable, "renderable formats");

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
            timestamps,
            format_usages,
            shaders: ShaderCache::default(),
        })
    }

    /// Wrap an existing device and queue created from `adapter`.
    pub fn from_device(adapter: &wgpu::Adapter, device: Arc<Device>, queue: Arc<Queue>) -> Self {
        let timestamps = device.features().contains(Features::TIMESTAMP_QUERY);
        let format_usages = usage_table(adapter, device.features());
        Self {
            device,
            queue,
            adapter_info: adapter.get_info(),
            timestamps,
            format_usages,
            shaders: ShaderCache::default(),
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Get adapter info (GPU name, vendor, etc.)
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Get device name
    pub fn device_name(&self) -> &str {
        &self.adapter_info.name
    }

    /// Get backend type (Vulkan, DX12, Metal, etc.)
    pub fn backend(&self) -> wgpu::Backend {
        self.adapter_info.backend
    }

    /// Whether the device was created with `TIMESTAMP_QUERY`.
    pub fn supports_timestamps(&self) -> bool {
        self.timestamps
    }

    /// Texture usages the device accepts for `format`. Empty for formats
    /// without a wgpu mapping.
    pub fn allowed_usages(&self, format: &PixelFormat) -> TextureUsages {
        self.format_usages
            .get(format.id)
            .copied()
            .unwrap_or(TextureUsages::empty())
    }

    /// Whether blur pipelines can be built for `format_id` on this device.
    ///
    /// False for unknown ids and for formats the device cannot both sample
    /// and render into, such as the 32-bit float formats on GL.
    pub fn supports_format(&self, format_id: &str) -> bool {
        PixelFormat::lookup(format_id)
            .map(|format| self.allowed_usages(format).contains(PIPELINE_USAGES))
            .unwrap_or(false)
    }

    /// Compiled module for `key`, generated and validated on first use.
    pub fn shader(&self, key: &KernelKey) -> GpuResult<Arc<wgpu::ShaderModule>> {
        self.shaders.get_or_compile(&self.device, key)
    }

    /// Number of distinct kernels compiled on this context.
    pub fn cached_shaders(&self) -> usize {
        self.shaders.len()
    }

    /// Submit work without waiting
    pub fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Submit work and wait for completion
    pub fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) {
        self.submit(encoder);
        self.wait_idle();
    }

    /// Block until all submitted work has completed
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}

/// Runs `f` inside a validation error scope.
///
/// Validation errors raised by `f` come back as [`GpuError::Compilation`].
pub(crate) fn validated<T>(device: &Device, label: &str, f: impl FnOnce() -> T) -> GpuResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(value),
        Some(err) => {
            debug!(label, error = %err, "validation failed");
            Err(GpuError::Compilation {
                label: label.to_string(),
                message: err.to_string(),
            })
        }
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("device", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .field("timestamps", &self.timestamps)
            .field("cached_shaders", &self.shaders.len())
            .finish()
    }
}
