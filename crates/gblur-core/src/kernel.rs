//! WGSL kernel generation for Gaussian blur.
//!
//! Generated programs are render programs: a full-screen triangle vertex
//! stage `vs` and a fragment stage `fs` that evaluates the Gaussian sum for
//! one output texel. The fragment stage reads its input with `textureLoad`,
//! so no sampler is involved and edge handling is explicit in the source.
//!
//! # Bindings
//!
//! ```text
//! @group(0) @binding(0)  texture_2d<T>        input surface
//! @group(0) @binding(1)  uniform BlurParams   { radius, direction, width, height }
//! ```
//!
//! `width`/`height` are the logical extent of the input. Taps outside that
//! extent follow the [`EdgeMode`], even when the bound texture is larger.
//!
//! # Kernel
//!
//! With σ = r / 3, each tap at offset `d` gets weight `exp(-|d|² / 2σ²)`.
//! Weights of every tap in the window are summed, out-of-range taps included,
//! and the result is divided by that sum. Integer formats accumulate in `f32`
//! and round to nearest before the store. Radius 0 returns the input texel.

use std::fmt::Write as _;

use crate::error::Result;
use crate::format::{PixelFormat, SampleDomain};

/// Byte size of the `BlurParams` uniform record.
pub const PARAMS_SIZE: u64 = 16;

/// Standard deviation used for a given radius.
#[inline]
pub fn sigma_for_radius(radius: u32) -> f32 {
    radius as f32 / 3.0
}

/// Radius actually evaluated for a `width` x `height` image.
///
/// Requested radii are clamped to the larger image dimension. This bounds
/// the tap loops, which would otherwise never terminate near `i32::MAX`.
/// Both the GPU kernels and the CPU reference blur with this radius.
#[inline]
pub fn effective_radius(radius: u32, width: u32, height: u32) -> u32 {
    radius.min(width.max(height))
}

/// Which convolution strategy a program implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelVariant {
    /// Full `(2r+1)²` window in one pass.
    Direct,
    /// One axis per pass, selected by `params.direction`.
    Separable,
}

impl std::fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Separable => write!(f, "separable"),
        }
    }
}

/// How taps outside the input extent are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EdgeMode {
    /// Out-of-range taps read zero but keep their weight.
    #[default]
    Zero,
    /// Out-of-range taps read the nearest edge texel.
    Clamp,
}

impl std::fmt::Display for EdgeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zero => write!(f, "zero"),
            Self::Clamp => write!(f, "clamp"),
        }
    }
}

impl std::str::FromStr for EdgeMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zero" => Ok(Self::Zero),
            "clamp" => Ok(Self::Clamp),
            other => Err(format!("unknown edge mode '{other}' (expected zero or clamp)")),
        }
    }
}

/// Identifies one generated program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    /// Registry id of the pixel format.
    pub format_id: &'static str,
    /// Convolution strategy.
    pub variant: KernelVariant,
    /// Edge policy.
    pub edge: EdgeMode,
}

impl KernelKey {
    /// Builds a key for a registered format.
    pub fn new(format: &'static PixelFormat, variant: KernelVariant, edge: EdgeMode) -> Self {
        Self {
            format_id: format.id,
            variant,
            edge,
        }
    }

    /// Debug label for shader modules and pipelines built from this key.
    pub fn label(&self) -> String {
        format!("gblur.{}.{}.{}", self.variant, self.format_id, self.edge)
    }
}

/// Generates the program identified by `key`.
///
/// # Errors
///
/// [`Error::UnsupportedFormat`](crate::Error::UnsupportedFormat) if the key
/// names an unregistered format.
pub fn generate(key: &KernelKey) -> Result<String> {
    let format = PixelFormat::lookup(key.format_id)?;
    Ok(match key.variant {
        KernelVariant::Direct => generate_direct_kernel(format, key.edge),
        KernelVariant::Separable => generate_separable_kernel(format, key.edge),
    })
}

/// Generates the single-pass 2D blur program for `format`.
pub fn generate_direct_kernel(format: &PixelFormat, edge: EdgeMode) -> String {
    let body = "    for (var i = -params.radius; i <= params.radius; i += 1) {\n\
                \x20       for (var j = -params.radius; j <= params.radius; j += 1) {\n\
                \x20           let w = exp(-(f32(i) * f32(i) + f32(j) * f32(j)) / denom);\n\
                \x20           sum += w * tap(coord + vec2<i32>(i, j));\n\
                \x20           weight_sum += w;\n\
                \x20       }\n\
                \x20   }\n";
    emit(format, edge, body)
}

/// Generates the one-axis blur program for `format`.
///
/// `params.direction` selects the axis: 0 is horizontal, 1 is vertical.
pub fn generate_separable_kernel(format: &PixelFormat, edge: EdgeMode) -> String {
    let body = "    let axis = select(vec2<i32>(1, 0), vec2<i32>(0, 1), params.direction == 1);\n\
                \x20   for (var i = -params.radius; i <= params.radius; i += 1) {\n\
                \x20       let w = exp(-(f32(i) * f32(i)) / denom);\n\
                \x20       sum += w * tap(coord + axis * i);\n\
                \x20       weight_sum += w;\n\
                \x20   }\n";
    emit(format, edge, body)
}

fn emit(format: &PixelFormat, edge: EdgeMode, body: &str) -> String {
    let scalar = format.domain.wgsl_scalar();
    let texel = format.texel_type();
    let acc = format.accumulator_type();
    let mask = format.channel_mask();

    let mut src = String::with_capacity(2048);

    // Writes to a String cannot fail.
    let _ = write!(
        src,
        "struct BlurParams {{
    radius: i32,
    direction: i32,
    width: i32,
    height: i32,
}};

@group(0) @binding(0) var src: texture_2d<{scalar}>;
@group(0) @binding(1) var<uniform> params: BlurParams;

struct VsOut {{
    @builtin(position) position: vec4<f32>,
}};

@vertex
fn vs(@builtin(vertex_index) index: u32) -> VsOut {{
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VsOut;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    return out;
}}

"
    );

    let _ = writeln!(src, "fn tap(coord: vec2<i32>) -> {acc} {{");
    match edge {
        EdgeMode::Zero => {
            let _ = write!(
                src,
                "    if (coord.x < 0 || coord.y < 0 || coord.x >= params.width || coord.y >= params.height) {{
        return {acc}(0.0);
    }}
    return {acc}(textureLoad(src, coord, 0).{mask});
}}

"
            );
        }
        EdgeMode::Clamp => {
            let _ = write!(
                src,
                "    let c = clamp(coord, vec2<i32>(0, 0), vec2<i32>(params.width - 1, params.height - 1));
    return {acc}(textureLoad(src, c, 0).{mask});
}}

"
            );
        }
    }

    let _ = write!(
        src,
        "@fragment
fn fs(@builtin(position) frag: vec4<f32>) -> @location(0) {texel} {{
    let coord = vec2<i32>(floor(frag.xy));
    if (params.radius == 0) {{
        return textureLoad(src, coord, 0);
    }}
    let sigma = f32(params.radius) / 3.0;
    let denom = 2.0 * sigma * sigma;
    var sum = {acc}(0.0);
    var weight_sum = 0.0;
{body}    let value = sum / weight_sum;
"
    );

    if format.domain.is_integer() {
        src.push_str("    let q = round(value);\n");
    } else {
        src.push_str("    let q = value;\n");
    }

    let store = match format.channel_count {
        1 => format!("{texel}({scalar}(q), {z}, {z}, {z})", z = zero_literal(format.domain)),
        2 => format!("{texel}(vec2<{scalar}>(q), {z}, {z})", z = zero_literal(format.domain)),
        3 => format!("{texel}(vec3<{scalar}>(q), {z})", z = zero_literal(format.domain)),
        _ => format!("{texel}(vec3<{scalar}>(q.rgb), {})", alpha_literal(format)),
    };
    let _ = writeln!(src, "    return {store};\n}}");

    src
}

fn zero_literal(domain: SampleDomain) -> &'static str {
    match domain {
        SampleDomain::Float => "0.0",
        SampleDomain::Uint => "0u",
        SampleDomain::Sint => "0i",
    }
}

fn alpha_literal(format: &PixelFormat) -> String {
    let alpha = format.opaque_alpha();
    match format.domain {
        SampleDomain::Float => format!("{alpha:.1}"),
        SampleDomain::Uint => format!("{}u", alpha as u64),
        SampleDomain::Sint => format!("{}i", alpha as i64),
    }
}
