//! Single-pass 2D Gaussian blur.
//!
//! Every output texel evaluates the full `(2r+1)²` window, so cost grows
//! with the square of the radius. See [`SeparableBlur`](crate::SeparableBlur)
//! for the linear alternative.

use std::sync::Arc;

use gblur_core::{EdgeMode, KernelVariant, PixelFormat};
use tracing::trace;

use crate::pass::{ensure_live, BlurParams, BlurPass};
use crate::{DeviceTimer, GpuContext, GpuResult, Surface};

pub struct DirectBlur {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pass: BlurPass,
    timer: Option<DeviceTimer>,
    destroyed: bool,
}

impl DirectBlur {
    /// Zero-padded edges, no timer.
    pub fn create(ctx: &GpuContext, format_id: &str) -> GpuResult<Self> {
        Self::create_with(ctx, format_id, EdgeMode::default(), None)
    }

    /// Fails with `UnsupportedFormat` for unknown ids and `Compilation` if
    /// the kernel or pipeline does not validate on this device. Formats the
    /// device cannot render into give `DeviceCapability`.
    pub fn create_with(
        ctx: &GpuContext,
        format_id: &str,
        edge: EdgeMode,
        timer: Option<DeviceTimer>,
    ) -> GpuResult<Self> {
        let pass = BlurPass::new(ctx, format_id, KernelVariant::Direct, edge, 1)?;
        Ok(Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            pass,
            timer,
            destroyed: false,
        })
    }

    pub fn format(&self) -> &'static PixelFormat {
        self.pass.format()
    }

    pub fn edge(&self) -> EdgeMode {
        self.pass.edge()
    }

    /// Blur `input` into `output`, or into a new surface when `output` is
    /// `None`. Returns the surface written.
    ///
    /// `output` must have `RENDER_ATTACHMENT` usage and be a different
    /// texture from `input`. Radii beyond the larger image dimension are
    /// clamped to it.
    ///
    /// The work is submitted but not awaited; reading the result back or
    /// reading the timer waits for it.
    pub fn blur(&mut self, input: &Surface, radius: u32, output: Option<&Surface>) -> GpuResult<Surface> {
        ensure_live(self.destroyed, "DirectBlur")?;
        let output = self.pass.prepare_output(input, output)?;
        let (width, height) = input.size();

        trace!(format = self.pass.format().id, width, height, radius, "direct blur");

        self.pass
            .write_params(&self.queue, 0, BlurParams::new(radius, 0, width, height));

        let src = input.create_view();
        let dst = output.create_view();
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("gblur_direct"),
        });

        self.pass.encode(
            &mut encoder,
            &src,
            &dst,
            0,
            (width, height),
            self.timer.as_ref().and_then(DeviceTimer::pass_writes),
        );
        if let Some(timer) = self.timer.as_mut() {
            timer.resolve(&mut encoder);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(output)
    }

    pub fn timer(&self) -> Option<&DeviceTimer> {
        self.timer.as_ref()
    }

    pub fn timer_mut(&mut self) -> Option<&mut DeviceTimer> {
        self.timer.as_mut()
    }

    pub fn set_timer(&mut self, timer: Option<DeviceTimer>) {
        self.timer = timer;
    }

    pub fn take_timer(&mut self) -> Option<DeviceTimer> {
        self.timer.take()
    }

    /// Release the parameter buffer. Surfaces are never owned.
    pub fn destroy(&mut self) {
        if !self.destroyed {
            self.pass.destroy();
            self.destroyed = true;
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl std::fmt::Debug for DirectBlur {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectBlur")
            .field("format", &self.pass.format().id)
            .field("edge", &self.pass.edge())
            .field("timed", &self.timer.is_some())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
