//! Error types for gblur-core operations.
//!
//! # Overview
//!
//! The [`Error`] enum covers the failure modes of the host-side building
//! blocks:
//! - Format lookups against the registry
//! - Surface size/format validation shared by both blur pipelines
//! - Padded row slicing during readback ([`StrideError`])
//! - Host image construction from raw samples or bytes
//!
//! Failures of work run through the [`RequestCoalescer`](crate::RequestCoalescer)
//! are reported as [`CoalescedTaskError`], which wraps whatever error type
//! the work function produces.
//!
//! # Usage
//!
//! ```rust
//! use gblur_core::{Error, PixelFormat};
//!
//! let err = PixelFormat::lookup("rgb9e5ufloat").unwrap_err();
//! assert!(matches!(err, Error::UnsupportedFormat { .. }));
//! ```
//!
//! # Dependencies
//!
//! - [`thiserror`] - For derive macro error implementation

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by format lookups, surface validation and host buffers.
///
/// # Categories
///
/// - **Format errors**: [`UnsupportedFormat`](Error::UnsupportedFormat), [`FormatMismatch`](Error::FormatMismatch)
/// - **Dimension errors**: [`SizeMismatch`](Error::SizeMismatch), [`InvalidDimensions`](Error::InvalidDimensions)
/// - **Buffer errors**: [`InvalidRowStride`](Error::InvalidRowStride), [`BufferSizeMismatch`](Error::BufferSizeMismatch)
#[derive(Debug, Error)]
pub enum Error {
    /// The format identifier is not in the registry.
    #[error("unsupported pixel format: {format}")]
    UnsupportedFormat {
        /// Identifier that was looked up
        format: String,
    },

    /// Output surface dimensions disagree with the input surface.
    #[error("size mismatch: output {output_width}x{output_height} vs input {input_width}x{input_height}")]
    SizeMismatch {
        /// Input width
        input_width: u32,
        /// Input height
        input_height: u32,
        /// Output width
        output_width: u32,
        /// Output height
        output_height: u32,
    },

    /// A surface format disagrees with the format the operation expects.
    #[error("format mismatch: expected {expected}, got {got}")]
    FormatMismatch {
        /// Expected format identifier
        expected: &'static str,
        /// Actual format identifier
        got: &'static str,
    },

    /// Padded row slicing preconditions were violated.
    #[error("invalid row stride: {0}")]
    InvalidRowStride(#[from] StrideError),

    /// A sample or byte buffer has the wrong length for its dimensions.
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch {
        /// Expected element count
        expected: usize,
        /// Actual element count
        actual: usize,
    },

    /// Width or height is zero.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },
}

impl Error {
    /// Creates an [`Error::UnsupportedFormat`] error.
    #[inline]
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates an [`Error::SizeMismatch`] error from `(width, height)` pairs.
    #[inline]
    pub fn size_mismatch(input: (u32, u32), output: (u32, u32)) -> Self {
        Self::SizeMismatch {
            input_width: input.0,
            input_height: input.1,
            output_width: output.0,
            output_height: output.1,
        }
    }

    /// Creates an [`Error::FormatMismatch`] error.
    #[inline]
    pub fn format_mismatch(expected: &'static str, got: &'static str) -> Self {
        Self::FormatMismatch { expected, got }
    }

    /// Returns `true` for size or format disagreements between surfaces.
    ///
    /// These are per-call failures; the pipeline that raised them stays usable.
    #[inline]
    pub fn is_surface_mismatch(&self) -> bool {
        matches!(self, Self::SizeMismatch { .. } | Self::FormatMismatch { .. })
    }
}

/// Precondition violations of [`slice_rows`](crate::slice_rows).
///
/// Each violated precondition has its own variant so callers can tell a
/// truncated readback apart from a misconfigured stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StrideError {
    /// The source buffer has no bytes.
    #[error("input buffer is empty")]
    EmptyBuffer,

    /// Source or target stride is zero.
    #[error("row strides must be positive (source {source_stride}, target {target_stride})")]
    ZeroStride {
        /// Bytes per source row
        source_stride: usize,
        /// Bytes per target row
        target_stride: usize,
    },

    /// Buffer length is not a whole number of source rows.
    #[error("buffer of {len} bytes is not divisible by source stride {source_stride}")]
    UnevenLength {
        /// Buffer length in bytes
        len: usize,
        /// Bytes per source row
        source_stride: usize,
    },

    /// Target rows would be longer than source rows.
    #[error("target stride {target_stride} exceeds source stride {source_stride}")]
    TargetExceedsSource {
        /// Bytes per source row
        source_stride: usize,
        /// Bytes per target row
        target_stride: usize,
    },
}

/// Failure of a work function driven by a [`RequestCoalescer`](crate::RequestCoalescer).
///
/// Returned to the caller whose `request()` was the active drainer. Carries
/// the most recent failure and how many executions failed during that drain.
/// The coalescer itself keeps working after returning this.
#[derive(Debug, Error)]
#[error("coalesced task failed ({failures} failure(s) during drain): {source}")]
pub struct CoalescedTaskError<E> {
    #[source]
    source: E,
    failures: usize,
}

impl<E> CoalescedTaskError<E> {
    pub(crate) fn new(source: E) -> Self {
        Self { source, failures: 1 }
    }

    /// Replaces the carried failure with a newer one, keeping the count.
    pub(crate) fn supersede(self, source: E) -> Self {
        Self {
            source,
            failures: self.failures + 1,
        }
    }

    /// The most recent failure.
    pub fn error(&self) -> &E {
        &self.source
    }

    /// Consumes the wrapper, returning the most recent failure.
    pub fn into_inner(self) -> E {
        self.source
    }

    /// Number of failed executions during the drain.
    pub fn failures(&self) -> usize {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_mismatch_message() {
        let err = Error::size_mismatch((64, 32), (32, 64));
        let msg = err.to_string();
        assert!(msg.contains("32x64"));
        assert!(msg.contains("64x32"));
        assert!(err.is_surface_mismatch());
    }

    #[test]
    fn test_stride_error_conversion() {
        let err: Error = StrideError::EmptyBuffer.into();
        assert!(matches!(err, Error::InvalidRowStride(StrideError::EmptyBuffer)));
        assert!(!err.is_surface_mismatch());
    }

    #[test]
    fn test_coalesced_error_counts_failures() {
        let err = CoalescedTaskError::new(StrideError::EmptyBuffer)
            .supersede(StrideError::ZeroStride { source_stride: 0, target_stride: 4 });
        assert_eq!(err.failures(), 2);
        assert!(matches!(err.error(), StrideError::ZeroStride { .. }));
        assert!(err.to_string().contains("2 failure(s)"));
    }
}
