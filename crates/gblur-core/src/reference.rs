//! CPU reference implementation of both blur strategies.
//!
//! Mirrors the generated GPU programs: `f32` accumulation, the same tap order,
//! explicit renormalization, rounding of integer domains on store and forced
//! alpha for 4-channel formats. Used to verify GPU output, by the CLI's
//! `--cpu` path and by the benchmarks.
//!
//! Rows are processed in parallel with rayon.
//!
//! # Example
//!
//! ```rust
//! use gblur_core::{EdgeMode, HostImage, PixelFormat};
//! use gblur_core::reference::blur_direct;
//!
//! let fmt = PixelFormat::lookup("r8uint").unwrap();
//! let mut point = HostImage::filled(fmt, 5, 5, 0.0).unwrap();
//! point.set(2, 2, 0, 255.0);
//!
//! let out = blur_direct(&point, 1, EdgeMode::Zero);
//! assert_eq!(out.get(2, 2, 0), 244.0);
//! ```

use rayon::prelude::*;
use tracing::trace;

use crate::error::{Error, Result};
use crate::format::{ElementType, PixelFormat};
use crate::kernel::{effective_radius, sigma_for_radius, EdgeMode};

/// Dense row-major image of samples in a format's numeric domain.
///
/// `r8uint` samples range over 0..=255, normalized formats over 0..=1.
/// Channels are stored in RGBA order regardless of the byte layout.
#[derive(Debug, Clone, PartialEq)]
pub struct HostImage {
    width: u32,
    height: u32,
    format: &'static PixelFormat,
    samples: Vec<f32>,
}

impl HostImage {
    /// Wraps `samples` (`width * height * channel_count` values).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDimensions`] for a zero extent,
    /// [`Error::BufferSizeMismatch`] if the sample count is wrong.
    pub fn new(
        format: &'static PixelFormat,
        width: u32,
        height: u32,
        samples: Vec<f32>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        let expected = width as usize * height as usize * format.channel_count as usize;
        if samples.len() != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            samples,
        })
    }

    /// Image with every sample set to `value`.
    pub fn filled(format: &'static PixelFormat, width: u32, height: u32, value: f32) -> Result<Self> {
        let len = width as usize * height as usize * format.channel_count as usize;
        Self::new(format, width, height, vec![value; len])
    }

    /// Decodes densely packed bytes in the format's layout.
    ///
    /// # Errors
    ///
    /// [`Error::BufferSizeMismatch`] if `bytes` is not exactly
    /// `width * height * bytes_per_texel` long.
    pub fn from_bytes(
        format: &'static PixelFormat,
        width: u32,
        height: u32,
        bytes: &[u8],
    ) -> Result<Self> {
        let expected = format.packed_len(width, height);
        if bytes.len() != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        let mut samples: Vec<f32> = match format.element {
            ElementType::U8Norm => bytes.iter().map(|&b| b as f32 / 255.0).collect(),
            ElementType::U8 => bytes.iter().map(|&b| b as f32).collect(),
            ElementType::U32 => bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
                .collect(),
            ElementType::I32 => bytes
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
                .collect(),
            ElementType::F32 => bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        };

        if is_bgra(format) {
            samples.chunks_exact_mut(4).for_each(|px| px.swap(0, 2));
        }

        Self::new(format, width, height, samples)
    }

    /// Encodes to densely packed bytes, quantizing to the element type.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.format.packed_len(self.width, self.height));
        let ch = self.format.channel_count as usize;

        for px in self.samples.chunks_exact(ch) {
            let mut texel = [0.0f32; 4];
            texel[..ch].copy_from_slice(px);
            if is_bgra(self.format) {
                texel.swap(0, 2);
            }
            for &v in &texel[..ch] {
                match self.format.element {
                    ElementType::U8Norm => {
                        out.push((v.clamp(0.0, 1.0) * 255.0).round() as u8);
                    }
                    ElementType::U8 => out.push(v.round_ties_even().clamp(0.0, 255.0) as u8),
                    ElementType::U32 => {
                        out.extend_from_slice(&(v.round_ties_even().max(0.0) as u32).to_le_bytes());
                    }
                    ElementType::I32 => {
                        out.extend_from_slice(&(v.round_ties_even() as i32).to_le_bytes());
                    }
                    ElementType::F32 => out.extend_from_slice(&v.to_le_bytes()),
                }
            }
        }
        out
    }

    /// Width in texels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel format.
    #[inline]
    pub fn format(&self) -> &'static PixelFormat {
        self.format
    }

    /// All samples, row-major, channels interleaved.
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[inline]
    fn index(&self, x: u32, y: u32, c: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.channel_count as usize
            + c as usize
    }

    /// Sample at `(x, y)` for channel `c`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate or channel is out of range.
    #[inline]
    pub fn get(&self, x: u32, y: u32, c: u32) -> f32 {
        self.samples[self.index(x, y, c)]
    }

    /// Sets the sample at `(x, y)` for channel `c`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate or channel is out of range.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, c: u32, value: f32) {
        let i = self.index(x, y, c);
        self.samples[i] = value;
    }

    /// Reads a tap, applying the edge policy to out-of-range coordinates.
    #[inline]
    fn tap(&self, x: i64, y: i64, c: usize, edge: EdgeMode) -> f32 {
        let (w, h) = (self.width as i64, self.height as i64);
        let (x, y) = match edge {
            EdgeMode::Zero => {
                if x < 0 || y < 0 || x >= w || y >= h {
                    return 0.0;
                }
                (x, y)
            }
            EdgeMode::Clamp => (x.clamp(0, w - 1), y.clamp(0, h - 1)),
        };
        let ch = self.format.channel_count as usize;
        self.samples[(y as usize * self.width as usize + x as usize) * ch + c]
    }

    /// Largest absolute per-sample difference against `other`.
    ///
    /// # Errors
    ///
    /// [`Error::SizeMismatch`] or [`Error::FormatMismatch`] if the images
    /// do not describe the same grid.
    pub fn max_abs_diff(&self, other: &HostImage) -> Result<f32> {
        if (self.width, self.height) != (other.width, other.height) {
            return Err(Error::size_mismatch(
                (self.width, self.height),
                (other.width, other.height),
            ));
        }
        if self.format.id != other.format.id {
            return Err(Error::format_mismatch(self.format.id, other.format.id));
        }
        Ok(self
            .samples
            .iter()
            .zip(&other.samples)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max))
    }

    /// Renders the samples as a text grid, one image row per line.
    pub fn to_matrix_string(&self) -> String {
        // Dimensions are validated on construction.
        format_matrix(
            &self.samples,
            self.format.channel_count as usize,
            self.height as usize,
            self.width as usize,
            ", ",
        )
        .unwrap_or_default()
    }
}

fn is_bgra(format: &PixelFormat) -> bool {
    format.id.starts_with("bgra")
}

/// Quantizes an accumulated value the way the texture store does.
#[inline]
pub fn quantize(format: &PixelFormat, value: f32) -> f32 {
    match format.element {
        ElementType::F32 => value,
        ElementType::U8Norm => (value.clamp(0.0, 1.0) * 255.0).round() / 255.0,
        element => value
            .round_ties_even()
            .clamp(element.min_sample() as f32, element.max_sample() as f32),
    }
}

/// Formats `rows * cols` texels of `channels` samples each.
///
/// Samples within a row are joined by `separator`; rows by newlines.
///
/// # Errors
///
/// [`Error::BufferSizeMismatch`] if `samples.len() != channels * rows * cols`.
///
/// ```rust
/// use gblur_core::format_matrix;
///
/// let m = format_matrix(&[1.0, 2.0, 3.0, 4.0], 1, 2, 2, ", ").unwrap();
/// assert_eq!(m, "1, 2\n3, 4");
/// ```
pub fn format_matrix<T: std::fmt::Display>(
    samples: &[T],
    channels: usize,
    rows: usize,
    cols: usize,
    separator: &str,
) -> Result<String> {
    let expected = channels * rows * cols;
    if samples.len() != expected {
        return Err(Error::BufferSizeMismatch {
            expected,
            actual: samples.len(),
        });
    }
    let row_len = channels * cols;
    if row_len == 0 {
        return Ok(String::new());
    }
    Ok(samples
        .chunks(row_len)
        .map(|row| {
            row.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(separator)
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Direct `(2r+1)²` Gaussian blur.
///
/// `radius` is clamped with [`effective_radius`].
pub fn blur_direct(input: &HostImage, radius: u32, edge: EdgeMode) -> HostImage {
    trace!(width = input.width, height = input.height, format = input.format.id, radius, "reference::blur_direct");

    let radius = effective_radius(radius, input.width, input.height);
    if radius == 0 {
        return input.clone();
    }
    let r = radius as i64;
    let sigma = sigma_for_radius(radius);
    let denom = 2.0 * sigma * sigma;

    convolve(input, |img, x, y, acc| {
        let ch = img.format.channel_count as usize;
        let mut weight_sum = 0.0f32;
        for i in -r..=r {
            for j in -r..=r {
                let w = (-((i * i + j * j) as f32) / denom).exp();
                for (c, a) in acc.iter_mut().enumerate().take(ch) {
                    *a += w * img.tap(x + i, y + j, c, edge);
                }
                weight_sum += w;
            }
        }
        weight_sum
    })
}

/// Two-pass separable Gaussian blur: horizontal, then vertical.
///
/// The intermediate image is quantized like the GPU working surface.
/// `radius` is clamped with [`effective_radius`].
pub fn blur_separable(input: &HostImage, radius: u32, edge: EdgeMode) -> HostImage {
    trace!(width = input.width, height = input.height, format = input.format.id, radius, "reference::blur_separable");

    let radius = effective_radius(radius, input.width, input.height);
    if radius == 0 {
        return input.clone();
    }
    let horizontal = blur_axis(input, radius, edge, (1, 0));
    blur_axis(&horizontal, radius, edge, (0, 1))
}

fn blur_axis(input: &HostImage, radius: u32, edge: EdgeMode, axis: (i64, i64)) -> HostImage {
    let r = radius as i64;
    let sigma = sigma_for_radius(radius);
    let denom = 2.0 * sigma * sigma;

    convolve(input, |img, x, y, acc| {
        let ch = img.format.channel_count as usize;
        let mut weight_sum = 0.0f32;
        for i in -r..=r {
            let w = (-((i * i) as f32) / denom).exp();
            for (c, a) in acc.iter_mut().enumerate().take(ch) {
                *a += w * img.tap(x + axis.0 * i, y + axis.1 * i, c, edge);
            }
            weight_sum += w;
        }
        weight_sum
    })
}

/// Runs `accumulate` for every texel in parallel rows, then renormalizes,
/// quantizes and forces alpha.
fn convolve<F>(input: &HostImage, accumulate: F) -> HostImage
where
    F: Fn(&HostImage, i64, i64, &mut [f32; 4]) -> f32 + Sync,
{
    let format = input.format;
    let ch = format.channel_count as usize;
    let row_len = input.width as usize * ch;
    let mut samples = vec![0.0f32; input.samples.len()];

    samples
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(ch).enumerate() {
                let mut acc = [0.0f32; 4];
                let weight_sum = accumulate(input, x as i64, y as i64, &mut acc);
                for (c, out) in px.iter_mut().enumerate() {
                    *out = quantize(format, acc[c] / weight_sum);
                }
                if format.has_alpha() {
                    px[3] = format.opaque_alpha() as f32;
                }
            }
        });

    HostImage {
        width: input.width,
        height: input.height,
        format,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn grid(format: &str, rows: &[[f32; 5]; 5]) -> HostImage {
        let fmt = PixelFormat::lookup(format).unwrap();
        let samples = rows.iter().flat_map(|r| r.iter().copied()).collect();
        HostImage::new(fmt, 5, 5, samples).unwrap()
    }

    fn assert_close(actual: &HostImage, expected: &[[f32; 5]; 5], tol: f32) {
        let expected = grid(actual.format().id, expected);
        let diff = actual.max_abs_diff(&expected).unwrap();
        assert!(
            diff <= tol,
            "max diff {diff} > {tol}\nactual:\n{}\nexpected:\n{}",
            actual.to_matrix_string(),
            expected.to_matrix_string()
        );
    }

    fn point() -> HostImage {
        let mut img = grid("r8uint", &[[0.0; 5]; 5]);
        img.set(2, 2, 0, 255.0);
        img
    }

    #[test]
    fn test_point_spread_radius_1() {
        let expected = [
            [0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 2.0, 0.0, 0.0],
            [0.0, 2.0, 244.0, 2.0, 0.0],
            [0.0, 0.0, 2.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0],
        ];
        assert_close(&blur_direct(&point(), 1, EdgeMode::Zero), &expected, 1.0);
        assert_close(&blur_separable(&point(), 1, EdgeMode::Zero), &expected, 1.0);
    }

    #[test]
    fn test_point_spread_radius_2() {
        let expected = [
            [0.0, 0.0, 1.0, 0.0, 0.0],
            [0.0, 9.0, 29.0, 9.0, 0.0],
            [1.0, 29.0, 91.0, 29.0, 1.0],
            [0.0, 9.0, 29.0, 9.0, 0.0],
            [0.0, 0.0, 1.0, 0.0, 0.0],
        ];
        assert_close(&blur_direct(&point(), 2, EdgeMode::Zero), &expected, 1.0);
        assert_close(&blur_separable(&point(), 2, EdgeMode::Zero), &expected, 1.0);
    }

    #[test]
    fn test_float_point_spread() {
        let mut img = grid("r32float", &[[0.0; 5]; 5]);
        img.set(2, 2, 0, 1.0);

        let v0 = 0.000_118_103_49_f32;
        let v1 = 0.010_631_336_f32;
        let v2 = 0.957_002_2_f32;
        let expected = [
            [0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, v0, v1, v0, 0.0],
            [0.0, v1, v2, v1, 0.0],
            [0.0, v0, v1, v0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0],
        ];
        let direct = blur_direct(&img, 1, EdgeMode::Zero);
        assert_close(&direct, &expected, 1e-6);
        assert_abs_diff_eq!(direct.get(2, 2, 0), v2, epsilon = 1e-6);

        let separable = blur_separable(&img, 1, EdgeMode::Zero);
        assert_close(&separable, &expected, 1e-6);
    }

    #[test]
    fn test_horizontal_edge() {
        let input = [
            [0.0; 5],
            [0.0; 5],
            [255.0; 5],
            [0.0; 5],
            [0.0; 5],
        ];
        let expected = [
            [0.0; 5],
            [2.0; 5],
            [246.0, 249.0, 249.0, 249.0, 246.0],
            [2.0; 5],
            [0.0; 5],
        ];
        let img = grid("r8uint", &input);
        assert_close(&blur_direct(&img, 1, EdgeMode::Zero), &expected, 1.0);
        assert_close(&blur_separable(&img, 1, EdgeMode::Zero), &expected, 1.0);
    }

    #[test]
    fn test_checkerboard() {
        let mut input = [[0.0f32; 5]; 5];
        for (y, row) in input.iter_mut().enumerate() {
            for (x, v) in row.iter_mut().enumerate() {
                if (x + y) % 2 == 0 {
                    *v = 255.0;
                }
            }
        }
        let expected = [
            [244.0, 8.0, 244.0, 8.0, 244.0],
            [8.0, 244.0, 10.0, 244.0, 8.0],
            [244.0, 10.0, 244.0, 10.0, 244.0],
            [8.0, 244.0, 10.0, 244.0, 8.0],
            [244.0, 8.0, 244.0, 8.0, 244.0],
        ];
        let img = grid("r8uint", &input);
        assert_close(&blur_direct(&img, 1, EdgeMode::Zero), &expected, 1.0);
        assert_close(&blur_separable(&img, 1, EdgeMode::Zero), &expected, 1.0);
    }

    #[test]
    fn test_gradient() {
        let input = [[0.0, 50.0, 100.0, 150.0, 200.0]; 5];
        let edge_row = [0.0, 49.0, 98.0, 148.0, 195.0];
        let mid_row = [0.0, 50.0, 100.0, 150.0, 197.0];
        let expected = [edge_row, mid_row, mid_row, mid_row, edge_row];
        let img = grid("r8uint", &input);
        assert_close(&blur_direct(&img, 1, EdgeMode::Zero), &expected, 1.0);
        assert_close(&blur_separable(&img, 1, EdgeMode::Zero), &expected, 1.0);
    }

    #[test]
    fn test_radius_zero_identity_all_formats() {
        for fmt in PixelFormat::all() {
            let n = 4 * 3 * fmt.channel_count as usize;
            let samples: Vec<f32> = (0..n).map(|i| quantize(fmt, (i % 7) as f32 * 0.125)).collect();
            let img = HostImage::new(fmt, 4, 3, samples).unwrap();
            assert_eq!(blur_direct(&img, 0, EdgeMode::Zero), img, "{fmt}");
            assert_eq!(blur_separable(&img, 0, EdgeMode::Clamp), img, "{fmt}");
        }
    }

    #[test]
    fn test_constant_interior_preserved() {
        let fmt = PixelFormat::lookup("r8uint").unwrap();
        let img = HostImage::filled(fmt, 7, 7, 100.0).unwrap();
        for radius in 0..=2 {
            let r = radius;
            for out in [blur_direct(&img, radius, EdgeMode::Zero), blur_separable(&img, radius, EdgeMode::Zero)] {
                for y in r..7 - r {
                    for x in r..7 - r {
                        assert_eq!(out.get(x, y, 0), 100.0, "r={radius} at ({x},{y})");
                    }
                }
            }
        }
    }

    #[test]
    fn test_constant_clamp_everywhere() {
        let fmt = PixelFormat::lookup("r32float").unwrap();
        let img = HostImage::filled(fmt, 6, 4, 0.5).unwrap();
        for radius in [1, 3, 5] {
            let out = blur_direct(&img, radius, EdgeMode::Clamp);
            assert!(out.samples().iter().all(|&v| (v - 0.5).abs() < 1e-6));
            let out = blur_separable(&img, radius, EdgeMode::Clamp);
            assert!(out.samples().iter().all(|&v| (v - 0.5).abs() < 1e-6));
        }
    }

    #[test]
    fn test_alpha_forced_opaque() {
        let fmt = PixelFormat::lookup("rgba8uint").unwrap();
        let img = HostImage::filled(fmt, 3, 3, 17.0).unwrap();
        let out = blur_direct(&img, 1, EdgeMode::Clamp);
        assert_eq!(out.get(1, 1, 0), 17.0);
        assert_eq!(out.get(1, 1, 3), 255.0);

        let fmt = PixelFormat::lookup("rgba32float").unwrap();
        let img = HostImage::filled(fmt, 3, 3, 0.25).unwrap();
        let out = blur_separable(&img, 2, EdgeMode::Clamp);
        assert_eq!(out.get(0, 0, 3), 1.0);
    }

    #[test]
    fn test_direct_separable_agree() {
        let fmt = PixelFormat::lookup("r8uint").unwrap();
        let samples = (0..16 * 16).map(|i| ((i * 37) % 256) as f32).collect();
        let img = HostImage::new(fmt, 16, 16, samples).unwrap();
        for radius in [1, 2, 4] {
            let a = blur_direct(&img, radius, EdgeMode::Zero);
            let b = blur_separable(&img, radius, EdgeMode::Zero);
            assert!(a.max_abs_diff(&b).unwrap() <= 1.0, "radius {radius}");
        }
    }

    #[test]
    fn test_huge_radius_clamped_to_extent() {
        let fmt = PixelFormat::lookup("r8uint").unwrap();
        let samples = (0..6 * 4).map(|i| ((i * 53) % 256) as f32).collect();
        let img = HostImage::new(fmt, 6, 4, samples).unwrap();
        for edge in [EdgeMode::Zero, EdgeMode::Clamp] {
            let expected = blur_direct(&img, 6, edge);
            assert_eq!(blur_direct(&img, u32::MAX, edge).max_abs_diff(&expected).unwrap(), 0.0);
            assert_eq!(blur_direct(&img, 1000, edge).max_abs_diff(&expected).unwrap(), 0.0);

            let expected = blur_separable(&img, 6, edge);
            assert_eq!(blur_separable(&img, u32::MAX, edge).max_abs_diff(&expected).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_bytes_roundtrip_bgra() {
        let fmt = PixelFormat::lookup("bgra8unorm").unwrap();
        let bytes = [10u8, 20, 30, 255, 40, 50, 60, 128];
        let img = HostImage::from_bytes(fmt, 2, 1, &bytes).unwrap();
        // Red comes from byte 2.
        assert_abs_diff_eq!(img.get(0, 0, 0), 30.0 / 255.0);
        assert_abs_diff_eq!(img.get(0, 0, 2), 10.0 / 255.0);
        assert_eq!(img.to_bytes(), bytes);
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        let fmt = PixelFormat::lookup("r32float").unwrap();
        let err = HostImage::from_bytes(fmt, 2, 2, &[0u8; 12]).unwrap_err();
        assert!(matches!(err, Error::BufferSizeMismatch { expected: 16, actual: 12 }));
        assert!(matches!(
            HostImage::filled(fmt, 0, 2, 0.0),
            Err(Error::InvalidDimensions { width: 0, height: 2 })
        ));
    }

    #[test]
    fn test_format_matrix() {
        let rgb = [255u8, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
        let out = format_matrix(&rgb, 3, 2, 2, " ").unwrap();
        assert_eq!(out, "255 0 0 0 255 0\n0 0 255 255 255 255");

        let err = format_matrix(&[1.0f32; 3], 1, 2, 2, ", ").unwrap_err();
        assert!(matches!(err, Error::BufferSizeMismatch { expected: 4, actual: 3 }));
    }

    #[test]
    fn test_quantize() {
        let r8 = PixelFormat::lookup("r8uint").unwrap();
        assert_eq!(quantize(r8, 2.5), 2.0);
        assert_eq!(quantize(r8, 3.5), 4.0);
        assert_eq!(quantize(r8, 300.0), 255.0);
        let unorm = PixelFormat::lookup("rgba8unorm").unwrap();
        assert_abs_diff_eq!(quantize(unorm, 0.5), 128.0 / 255.0);
    }
}
