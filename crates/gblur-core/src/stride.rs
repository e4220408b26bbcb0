//! Row stride helpers for padded GPU readback.
//!
//! Texture-to-buffer copies require each row to start at a multiple of
//! [`COPY_ROW_ALIGNMENT`] bytes, so readback buffers carry padding at the end
//! of every row. [`slice_rows`] strips it again.

use crate::error::StrideError;

/// Row alignment required for texture/buffer copies, in bytes.
pub const COPY_ROW_ALIGNMENT: u32 = 256;

/// Rounds `value` up to the next multiple of `multiple`.
///
/// A `multiple` of 0 returns `value` unchanged.
///
/// ```rust
/// use gblur_core::align_to;
///
/// assert_eq!(align_to(5, 256), 256);
/// assert_eq!(align_to(512, 256), 512);
/// ```
#[inline]
pub const fn align_to(value: u32, multiple: u32) -> u32 {
    if multiple == 0 {
        return value;
    }
    value.div_ceil(multiple) * multiple
}

/// Padded row stride for a texture row of `unpadded` bytes.
#[inline]
pub const fn padded_row_stride(unpadded: u32) -> u32 {
    align_to(unpadded, COPY_ROW_ALIGNMENT)
}

/// Copies the first `target_stride` bytes of every `source_stride`-byte row.
///
/// # Errors
///
/// One [`StrideError`] variant per violated precondition:
/// empty buffer, zero stride, a length that is not a whole number of rows,
/// or a target stride longer than the source stride.
pub fn slice_rows(
    buffer: &[u8],
    source_stride: usize,
    target_stride: usize,
) -> Result<Vec<u8>, StrideError> {
    if buffer.is_empty() {
        return Err(StrideError::EmptyBuffer);
    }
    if source_stride == 0 || target_stride == 0 {
        return Err(StrideError::ZeroStride {
            source_stride,
            target_stride,
        });
    }
    if buffer.len() % source_stride != 0 {
        return Err(StrideError::UnevenLength {
            len: buffer.len(),
            source_stride,
        });
    }
    if target_stride > source_stride {
        return Err(StrideError::TargetExceedsSource {
            source_stride,
            target_stride,
        });
    }

    if target_stride == source_stride {
        return Ok(buffer.to_vec());
    }

    let rows = buffer.len() / source_stride;
    let mut out = Vec::with_capacity(rows * target_stride);
    for row in buffer.chunks_exact(source_stride) {
        out.extend_from_slice(&row[..target_stride]);
    }
    Ok(out)
}
