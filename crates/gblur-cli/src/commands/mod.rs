//! CLI command implementations

pub mod bench;
pub mod blur;
pub mod formats;
pub mod sweep;

use anyhow::{Context, Result};
use gblur_core::{HostImage, PixelFormat};
use gblur_gpu::GpuContext;
use std::path::Path;

/// Format used for PNG input and output.
pub const PNG_FORMAT: &str = "rgba8unorm";

/// Load a PNG as an `rgba8unorm` image.
pub fn load_png(path: &Path) -> Result<HostImage> {
    let rgba = image::open(path)
        .with_context(|| format!("Failed to load: {}", path.display()))?
        .to_rgba8();
    let format = PixelFormat::lookup(PNG_FORMAT)?;
    let (width, height) = rgba.dimensions();
    HostImage::from_bytes(format, width, height, rgba.as_raw())
        .with_context(|| format!("Failed to decode: {}", path.display()))
}

/// Save an `rgba8unorm` image as PNG.
pub fn save_png(path: &Path, image: &HostImage) -> Result<()> {
    let rgba = image::RgbaImage::from_raw(image.width(), image.height(), image.to_bytes())
        .with_context(|| format!("Image is not {}: {}", PNG_FORMAT, image.format()))?;
    rgba.save(path)
        .with_context(|| format!("Failed to save: {}", path.display()))
}

/// Open the default GPU context.
pub fn open_gpu() -> Result<GpuContext> {
    let ctx = GpuContext::new().context("Failed to open GPU device")?;
    tracing::info!(device = ctx.device_name(), backend = ?ctx.backend(), "GPU ready");
    Ok(ctx)
}
