//! Pixel format registry.
//!
//! Every surface a blur pipeline touches is described by a [`PixelFormat`]
//! entry from a fixed, immutable table. Entries are looked up by their
//! identifier (the wgpu/WebGPU texture format name) and never constructed by
//! callers, so the invariants below hold for every `&'static PixelFormat`.
//!
//! # Invariants
//!
//! - `bytes_per_texel == channel_count * element.byte_width()`
//! - `channel_count` is in `1..=4`
//! - normalized formats (`*unorm`) live in the [`SampleDomain::Float`] domain
//!
//! # Usage
//!
//! ```rust
//! use gblur_core::format::{PixelFormat, SampleDomain};
//!
//! let fmt = PixelFormat::lookup("rgba8uint").unwrap();
//! assert_eq!(fmt.channel_count, 4);
//! assert_eq!(fmt.domain, SampleDomain::Uint);
//! assert_eq!(fmt.opaque_alpha(), 255.0);
//! ```

use crate::error::{Error, Result};

/// Numeric domain the shader samples a texture in.
///
/// Drives the texture sample type of the bind group layout and the texel type
/// of generated kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleDomain {
    /// Floating point or normalized samples (`texture_2d<f32>`).
    Float,
    /// Unsigned integer samples (`texture_2d<u32>`).
    Uint,
    /// Signed integer samples (`texture_2d<i32>`).
    Sint,
}

impl SampleDomain {
    /// WGSL scalar type of samples in this domain.
    #[inline]
    pub const fn wgsl_scalar(&self) -> &'static str {
        match self {
            Self::Float => "f32",
            Self::Uint => "u32",
            Self::Sint => "i32",
        }
    }

    /// Whether samples are integers and must be rounded before the store.
    #[inline]
    pub const fn is_integer(&self) -> bool {
        !matches!(self, Self::Float)
    }
}

impl std::fmt::Display for SampleDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float => write!(f, "float"),
            Self::Uint => write!(f, "uint"),
            Self::Sint => write!(f, "sint"),
        }
    }
}

/// Storage type of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 8-bit unsigned, normalized to [0, 1] on sampling.
    U8Norm,
    /// 8-bit unsigned integer.
    U8,
    /// 32-bit unsigned integer.
    U32,
    /// 32-bit signed integer.
    I32,
    /// 32-bit IEEE 754 float.
    F32,
}

impl ElementType {
    /// Bytes per channel.
    #[inline]
    pub const fn byte_width(&self) -> u32 {
        match self {
            Self::U8Norm | Self::U8 => 1,
            Self::U32 | Self::I32 | Self::F32 => 4,
        }
    }

    /// Largest representable sample value in the sampling domain.
    ///
    /// Normalized and float elements report 1.0.
    #[inline]
    pub const fn max_sample(&self) -> f64 {
        match self {
            Self::U8Norm | Self::F32 => 1.0,
            Self::U8 => 255.0,
            Self::U32 => u32::MAX as f64,
            Self::I32 => i32::MAX as f64,
        }
    }

    /// Smallest representable sample value in the sampling domain.
    #[inline]
    pub const fn min_sample(&self) -> f64 {
        match self {
            Self::U8Norm | Self::U8 | Self::U32 => 0.0,
            Self::I32 => i32::MIN as f64,
            Self::F32 => f32::MIN as f64,
        }
    }
}

/// Immutable description of a registered pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    /// Registry identifier, identical to the WebGPU texture format name.
    pub id: &'static str,
    /// Bytes per texel in a densely packed row.
    pub bytes_per_texel: u32,
    /// Number of channels, 1 to 4.
    pub channel_count: u32,
    /// Domain the shader samples in.
    pub domain: SampleDomain,
    /// Per-channel storage type.
    pub element: ElementType,
}

const fn entry(
    id: &'static str,
    channel_count: u32,
    domain: SampleDomain,
    element: ElementType,
) -> PixelFormat {
    PixelFormat {
        id,
        bytes_per_texel: channel_count * element.byte_width(),
        channel_count,
        domain,
        element,
    }
}

/// All registered formats.
static REGISTRY: [PixelFormat; 9] = [
    entry("r8uint", 1, SampleDomain::Uint, ElementType::U8),
    entry("rgba8uint", 4, SampleDomain::Uint, ElementType::U8),
    entry("r32uint", 1, SampleDomain::Uint, ElementType::U32),
    entry("r32sint", 1, SampleDomain::Sint, ElementType::I32),
    entry("r32float", 1, SampleDomain::Float, ElementType::F32),
    entry("rg32float", 2, SampleDomain::Float, ElementType::F32),
    entry("rgba32float", 4, SampleDomain::Float, ElementType::F32),
    entry("rgba8unorm", 4, SampleDomain::Float, ElementType::U8Norm),
    entry("bgra8unorm", 4, SampleDomain::Float, ElementType::U8Norm),
];

impl PixelFormat {
    /// Looks up a registered format by identifier.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedFormat`] if `id` is not registered.
    pub fn lookup(id: &str) -> Result<&'static PixelFormat> {
        REGISTRY
            .iter()
            .find(|f| f.id == id)
            .ok_or_else(|| Error::unsupported_format(id))
    }

    /// Every registered format, in registry order.
    #[inline]
    pub fn all() -> &'static [PixelFormat] {
        &REGISTRY
    }

    /// WGSL texel type returned by `textureLoad` for this format.
    ///
    /// Always a 4-component vector; missing channels are filled by the sampler.
    pub fn texel_type(&self) -> String {
        format!("vec4<{}>", self.domain.wgsl_scalar())
    }

    /// Swizzle selecting the channels the format actually stores.
    #[inline]
    pub const fn channel_mask(&self) -> &'static str {
        match self.channel_count {
            1 => "r",
            2 => "rg",
            3 => "rgb",
            _ => "rgba",
        }
    }

    /// WGSL type used to accumulate weighted samples.
    ///
    /// Integer domains are promoted to `f32`.
    pub fn accumulator_type(&self) -> String {
        match self.channel_count {
            1 => "f32".to_string(),
            n => format!("vec{n}<f32>"),
        }
    }

    /// Alpha written when a blurred 4-channel texel is stored.
    ///
    /// 1.0 for float and normalized formats, the element maximum otherwise.
    #[inline]
    pub const fn opaque_alpha(&self) -> f64 {
        match self.domain {
            SampleDomain::Float => 1.0,
            SampleDomain::Uint | SampleDomain::Sint => self.element.max_sample(),
        }
    }

    /// Whether the format has an alpha channel that blurs override.
    #[inline]
    pub const fn has_alpha(&self) -> bool {
        self.channel_count == 4
    }

    /// Densely packed byte length of a `width` x `height` image.
    #[inline]
    pub const fn packed_len(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_texel as usize
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known() {
        let fmt = PixelFormat::lookup("r32float").unwrap();
        assert_eq!(fmt.bytes_per_texel, 4);
        assert_eq!(fmt.channel_count, 1);
        assert_eq!(fmt.domain, SampleDomain::Float);
        assert_eq!(fmt.texel_type(), "vec4<f32>");
    }

    #[test]
    fn test_lookup_unknown() {
        let err = PixelFormat::lookup("depth24plus").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { format } if format == "depth24plus"));
    }

    #[test]
    fn test_bytes_per_texel_invariant() {
        for fmt in PixelFormat::all() {
            assert!((1..=4).contains(&fmt.channel_count), "{fmt}");
            assert_eq!(
                fmt.bytes_per_texel,
                fmt.channel_count * fmt.element.byte_width(),
                "{fmt}"
            );
        }
    }

    #[test]
    fn test_ids_unique() {
        let all = PixelFormat::all();
        for (i, a) in all.iter().enumerate() {
            assert!(all[i + 1..].iter().all(|b| b.id != a.id), "duplicate {a}");
        }
    }

    #[test]
    fn test_masks_and_accumulators() {
        let r8 = PixelFormat::lookup("r8uint").unwrap();
        assert_eq!(r8.channel_mask(), "r");
        assert_eq!(r8.accumulator_type(), "f32");
        assert_eq!(r8.texel_type(), "vec4<u32>");

        let rg = PixelFormat::lookup("rg32float").unwrap();
        assert_eq!(rg.channel_mask(), "rg");
        assert_eq!(rg.accumulator_type(), "vec2<f32>");

        let sint = PixelFormat::lookup("r32sint").unwrap();
        assert_eq!(sint.texel_type(), "vec4<i32>");
    }

    #[test]
    fn test_opaque_alpha() {
        assert_eq!(PixelFormat::lookup("rgba8uint").unwrap().opaque_alpha(), 255.0);
        assert_eq!(PixelFormat::lookup("rgba32float").unwrap().opaque_alpha(), 1.0);
        assert_eq!(PixelFormat::lookup("bgra8unorm").unwrap().opaque_alpha(), 1.0);
        assert!(PixelFormat::lookup("rgba8unorm").unwrap().has_alpha());
        assert!(!PixelFormat::lookup("rg32float").unwrap().has_alpha());
    }

    #[test]
    fn test_packed_len() {
        let fmt = PixelFormat::lookup("rgba32float").unwrap();
        assert_eq!(fmt.packed_len(3, 2), 96);
    }
}
