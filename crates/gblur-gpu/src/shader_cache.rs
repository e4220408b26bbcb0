//! Per-device cache of compiled blur kernels.
//!
//! Kernels are pure functions of [`KernelKey`], so a context compiles each
//! `(format, variant, edge)` combination at most once. A module that fails
//! validation is never cached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gblur_core::KernelKey;
use tracing::debug;

use crate::context::validated;
use crate::GpuResult;

#[derive(Default)]
pub struct ShaderCache {
    modules: Mutex<HashMap<KernelKey, Arc<wgpu::ShaderModule>>>,
}

impl ShaderCache {
    /// Returns the module for `key`, compiling it if needed.
    pub fn get_or_compile(
        &self,
        device: &wgpu::Device,
        key: &KernelKey,
    ) -> GpuResult<Arc<wgpu::ShaderModule>> {
        if let Some(module) = self.lock().get(key) {
            return Ok(module.clone());
        }

        let source = gblur_core::generate(key)?;
        let label = key.label();
        let module = validated(device, &label, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })?;
        debug!(kernel = %label, "compiled blur kernel");

        let module = Arc::new(module);
        self.lock().entry(*key).or_insert_with(|| module.clone());
        Ok(module)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<KernelKey, Arc<wgpu::ShaderModule>>> {
        self.modules.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ShaderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderCache").field("modules", &self.len()).finish()
    }
}
