//! GPU Gaussian blur pipelines on wgpu.
//!
//! Two strategies over the same generated kernels:
//! - [`DirectBlur`]: one render pass evaluating the full `(2r+1)²` window
//! - [`SeparableBlur`]: horizontal then vertical pass through a private,
//!   grow-only working surface
//!
//! Either can carry a [`DeviceTimer`] that brackets its passes with GPU
//! timestamps.
//!
//! # Architecture
//!
//! ```text
//! GpuContext (device, queue, shader cache)
//!     ├── Surface (texture + format, upload / readback)
//!     ├── DirectBlur ────┐
//!     ├── SeparableBlur ─┴── BlurPass (bind group layout, render pipeline, params)
//!     └── DeviceTimer (timestamp queries)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use gblur_gpu::{GpuContext, SeparableBlur, Surface};
//!
//! let ctx = GpuContext::new()?;
//! let input = Surface::upload(&ctx, "r8uint", 5, 5, &bytes, Surface::DEFAULT_USAGE)?;
//! let mut blur = SeparableBlur::create(&ctx, "r8uint")?;
//! let output = blur.blur(&input, 2, None)?;
//! let bytes = output.read_bytes(&ctx)?;
//! ```

pub mod context;
pub mod direct;
pub mod formats;
mod pass;
pub mod separable;
pub mod shader_cache;
pub mod surface;
pub mod timer;

pub use context::{ContextOptions, GpuContext};
pub use direct::DirectBlur;
pub use formats::{pixel_format_for, texture_format, PIPELINE_USAGES};
pub use separable::SeparableBlur;
pub use surface::Surface;
pub use timer::DeviceTimer;

use gblur_core::EdgeMode;
use thiserror::Error;

/// GPU operation errors
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to create device: {0}")]
    DeviceCreation(String),

    #[error("Failed to compile kernel {label}: {message}")]
    Compilation { label: String, message: String },

    #[error("Device lacks required capability: {0}")]
    DeviceCapability(String),

    #[error("Timer has no resolved timestamps")]
    TimerNotResolved,

    #[error("Buffer map failed: {0}")]
    MapFailed(String),

    #[error("{role} surface is missing {missing:?} usage")]
    MissingUsage {
        role: &'static str,
        missing: wgpu::TextureUsages,
    },

    #[error("Output surface is the input surface")]
    AliasedSurface,

    #[error("{0} used after destroy()")]
    Destroyed(&'static str),

    #[error(transparent)]
    Core(#[from] gblur_core::Error),
}

impl GpuError {
    /// Whether the error came from argument validation rather than the device.
    pub fn is_surface_mismatch(&self) -> bool {
        match self {
            Self::MissingUsage { .. } | Self::AliasedSurface => true,
            Self::Core(e) => e.is_surface_mismatch(),
            _ => false,
        }
    }
}

pub type GpuResult<T> = Result<T, GpuError>;

/// Creates a [`DirectBlur`], runs it once and destroys it.
pub fn blur_direct(
    ctx: &GpuContext,
    input: &Surface,
    radius: u32,
    output: Option<&Surface>,
    timer: Option<DeviceTimer>,
) -> GpuResult<(Surface, Option<DeviceTimer>)> {
    let mut pipeline = DirectBlur::create_with(ctx, input.format().id, EdgeMode::default(), timer)?;
    let result = pipeline.blur(input, radius, output)?;
    let timer = pipeline.take_timer();
    pipeline.destroy();
    Ok((result, timer))
}

/// Creates a [`SeparableBlur`], runs it once and destroys it.
pub fn blur_separable(
    ctx: &GpuContext,
    input: &Surface,
    radius: u32,
    output: Option<&Surface>,
    timer: Option<DeviceTimer>,
) -> GpuResult<(Surface, Option<DeviceTimer>)> {
    let mut pipeline =
        SeparableBlur::create_with(ctx, input.format().id, EdgeMode::default(), timer)?;
    let result = pipeline.blur(input, radius, output)?;
    let timer = pipeline.take_timer();
    pipeline.destroy();
    Ok((result, timer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_mismatch_classification() {
        let missing = GpuError::MissingUsage {
            role: "output",
            missing: wgpu::TextureUsages::RENDER_ATTACHMENT,
        };
        assert!(missing.is_surface_mismatch());
        assert!(missing.to_string().contains("output"));
        assert!(missing.to_string().contains("RENDER_ATTACHMENT"));
        assert!(GpuError::AliasedSurface.is_surface_mismatch());
        assert!(GpuError::Core(gblur_core::Error::size_mismatch((1, 1), (2, 2))).is_surface_mismatch());
        assert!(!GpuError::DeviceCapability("x".into()).is_surface_mismatch());
        assert!(!GpuError::Destroyed("DirectBlur").is_surface_mismatch());
    }
}
