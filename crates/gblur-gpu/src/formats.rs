//! Mapping between registry formats and wgpu texture formats.

use std::collections::HashMap;

use gblur_core::{Error, PixelFormat, SampleDomain};
use wgpu::{TextureFormat, TextureUsages};

use crate::{GpuError, GpuResult};

/// Usages every blur pipeline needs from its format: sampled as input and
/// rendered into as output.
pub const PIPELINE_USAGES: TextureUsages = TextureUsages::TEXTURE_BINDING.union(TextureUsages::RENDER_ATTACHMENT);

/// wgpu texture format for a registered pixel format.
pub fn texture_format(format: &PixelFormat) -> GpuResult<TextureFormat> {
    let tf = match format.id {
        "r8uint" => TextureFormat::R8Uint,
        "rgba8uint" => TextureFormat::Rgba8Uint,
        "r32uint" => TextureFormat::R32Uint,
        "r32sint" => TextureFormat::R32Sint,
        "r32float" => TextureFormat::R32Float,
        "rg32float" => TextureFormat::Rg32Float,
        "rgba32float" => TextureFormat::Rgba32Float,
        "rgba8unorm" => TextureFormat::Rgba8Unorm,
        "bgra8unorm" => TextureFormat::Bgra8Unorm,
        other => return Err(Error::unsupported_format(other).into()),
    };
    Ok(tf)
}

/// Registry entry for a wgpu texture format.
pub fn pixel_format_for(format: TextureFormat) -> GpuResult<&'static PixelFormat> {
    let id = match format {
        TextureFormat::R8Uint => "r8uint",
        TextureFormat::Rgba8Uint => "rgba8uint",
        TextureFormat::R32Uint => "r32uint",
        TextureFormat::R32Sint => "r32sint",
        TextureFormat::R32Float => "r32float",
        TextureFormat::Rg32Float => "rg32float",
        TextureFormat::Rgba32Float => "rgba32float",
        TextureFormat::Rgba8Unorm => "rgba8unorm",
        TextureFormat::Bgra8Unorm => "bgra8unorm",
        other => return Err(Error::unsupported_format(format!("{other:?}")).into()),
    };
    Ok(PixelFormat::lookup(id)?)
}

/// Usages the device will accept for each registered format.
///
/// Downlevel devices (and devices created with
/// `TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES`) validate against the
/// adapter's format features, everything else against the WebGPU guarantees.
/// On GL, for example, the 32-bit float formats are not renderable.
pub(crate) fn usage_table(
    adapter: &wgpu::Adapter,
    device_features: wgpu::Features,
) -> HashMap<&'static str, TextureUsages> {
    let adapter_specific = device_features.contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
        || !adapter.get_downlevel_capabilities().is_webgpu_compliant();
    PixelFormat::all()
        .iter()
        .filter_map(|format| {
            let tf = texture_format(format).ok()?;
            let features = if adapter_specific {
                adapter.get_texture_format_features(tf)
            } else {
                tf.guaranteed_format_features(device_features)
            };
            Some((format.id, features.allowed_usages))
        })
        .collect()
}

/// Fails with [`GpuError::DeviceCapability`] unless `allowed` covers every
/// usage in `requested`.
pub(crate) fn require_usages(
    format: &PixelFormat,
    allowed: TextureUsages,
    requested: TextureUsages,
) -> GpuResult<()> {
    let missing = requested.difference(allowed);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(GpuError::DeviceCapability(format!(
            "{} textures do not support {:?} on this device",
            format.id, missing
        )))
    }
}

/// Sample type the bind group layout declares for textures of `format`.
pub(crate) fn sample_type(format: &PixelFormat) -> wgpu::TextureSampleType {
    match format.domain {
        SampleDomain::Float => wgpu::TextureSampleType::Float { filterable: false },
        SampleDomain::Uint => wgpu::TextureSampleType::Uint,
        SampleDomain::Sint => wgpu::TextureSampleType::Sint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_registered_format_maps_both_ways() {
        for fmt in PixelFormat::all() {
            let tf = texture_format(fmt).unwrap();
            assert_eq!(pixel_format_for(tf).unwrap().id, fmt.id);
            assert_eq!(tf.block_copy_size(None), Some(fmt.bytes_per_texel), "{fmt}");
        }
    }

    #[test]
    fn test_unregistered_texture_format() {
        let err = pixel_format_for(TextureFormat::Depth32Float).unwrap_err();
        assert!(matches!(err, crate::GpuError::Core(Error::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_require_usages() {
        let fmt = PixelFormat::lookup("rgba32float").unwrap();
        assert!(require_usages(fmt, TextureUsages::all(), PIPELINE_USAGES).is_ok());
        assert!(require_usages(fmt, PIPELINE_USAGES, TextureUsages::RENDER_ATTACHMENT).is_ok());
        assert!(require_usages(fmt, TextureUsages::empty(), TextureUsages::empty()).is_ok());

        // Float formats on GL: sampled and copied, never rendered into.
        let gl = TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_SRC | TextureUsages::COPY_DST;
        let err = require_usages(fmt, gl, PIPELINE_USAGES).unwrap_err();
        match err {
            GpuError::DeviceCapability(msg) => {
                assert!(msg.contains("rgba32float"), "{msg}");
                assert!(msg.contains("RENDER_ATTACHMENT"), "{msg}");
                assert!(!msg.contains("TEXTURE_BINDING"), "{msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_guaranteed_usages_cover_pipeline() {
        // Without downlevel restrictions every registered format is renderable.
        for fmt in PixelFormat::all() {
            let tf = texture_format(fmt).unwrap();
            let allowed = tf.guaranteed_format_features(wgpu::Features::empty()).allowed_usages;
            assert!(allowed.contains(PIPELINE_USAGES), "{fmt}: {allowed:?}");
        }
    }

    #[test]
    fn test_sample_types() {
        let uint = PixelFormat::lookup("rgba8uint").unwrap();
        assert_eq!(sample_type(uint), wgpu::TextureSampleType::Uint);
        let unorm = PixelFormat::lookup("bgra8unorm").unwrap();
        assert_eq!(sample_type(unorm), wgpu::TextureSampleType::Float { filterable: false });
    }
}
