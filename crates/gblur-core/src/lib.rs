//! # gblur-core
//!
//! Device-independent building blocks for GPU Gaussian blur.
//!
//! This crate holds everything the blur pipelines need that does not touch a
//! graphics device:
//!
//! - [`PixelFormat`] - Immutable registry of supported texture formats
//! - [`kernel`] - WGSL generation for direct and separable blur programs
//! - [`slice_rows`], [`align_to`] - Padded readback helpers
//! - [`reference`] - CPU implementation of both strategies, used for
//!   verification and as a fallback
//! - [`RequestCoalescer`] - Single-flight, latest-wins async request driver
//!
//! ## Crate Structure
//!
//! ```text
//! gblur-core (this crate)
//!    ^
//!    |
//!    +-- gblur-gpu   (wgpu pipelines, surfaces, device timer)
//!    +-- gblur-cli   (gblur binary)
//!    +-- gblur-bench (criterion benchmarks)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use gblur_core::{generate_direct_kernel, EdgeMode, PixelFormat};
//!
//! let fmt = PixelFormat::lookup("r8uint")?;
//! let wgsl = generate_direct_kernel(fmt, EdgeMode::Zero);
//! assert!(wgsl.contains("texture_2d<u32>"));
//! # Ok::<(), gblur_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod coalesce;
pub mod error;
pub mod format;
pub mod kernel;
pub mod reference;
pub mod stride;

// Re-exports for convenience
pub use coalesce::RequestCoalescer;
pub use error::*;
pub use format::*;
pub use kernel::{
    effective_radius, generate, generate_direct_kernel, generate_separable_kernel,
    sigma_for_radius, EdgeMode, KernelKey, KernelVariant, PARAMS_SIZE,
};
pub use reference::{format_matrix, quantize, HostImage};
pub use stride::{align_to, padded_row_stride, slice_rows, COPY_ROW_ALIGNMENT};

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```
/// use gblur_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::coalesce::RequestCoalescer;
    pub use crate::error::{CoalescedTaskError, Error, Result, StrideError};
    pub use crate::format::{ElementType, PixelFormat, SampleDomain};
    pub use crate::kernel::{EdgeMode, KernelKey, KernelVariant};
    pub use crate::reference::HostImage;
}
