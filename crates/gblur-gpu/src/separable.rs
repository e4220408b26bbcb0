//! Two-pass separable Gaussian blur.
//!
//! Pass 1 blurs rows from the input into a private working surface, pass 2
//! blurs columns from the working surface into the output. Both passes are
//! encoded into one command buffer, so pass 1 is complete before pass 2
//! samples it. Cost is linear in the radius.
//!
//! The working surface only grows. When it is larger than the input, both
//! passes render into the input-sized top-left region and the kernels treat
//! the input extent as the image boundary.

use std::sync::Arc;

use gblur_core::{EdgeMode, KernelVariant, PixelFormat};
use tracing::{debug, trace};

use crate::pass::{ensure_live, BlurParams, BlurPass};
use crate::{DeviceTimer, GpuContext, GpuResult, Surface, PIPELINE_USAGES};

const HORIZONTAL: i32 = 0;
const VERTICAL: i32 = 1;

pub struct SeparableBlur {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pass: BlurPass,
    working: Option<Surface>,
    reallocations: u64,
    timer: Option<DeviceTimer>,
    destroyed: bool,
}

/// Extent to reallocate the working surface to, or `None` if `current`
/// already covers `requested`.
pub(crate) fn grow_extent(current: Option<(u32, u32)>, requested: (u32, u32)) -> Option<(u32, u32)> {
    match current {
        None => Some(requested),
        Some((w, h)) if w >= requested.0 && h >= requested.1 => None,
        Some((w, h)) => Some((w.max(requested.0), h.max(requested.1))),
    }
}

impl SeparableBlur {
    /// Zero-padded edges, no timer.
    pub fn create(ctx: &GpuContext, format_id: &str) -> GpuResult<Self> {
        Self::create_with(ctx, format_id, EdgeMode::default(), None)
    }

    pub fn create_with(
        ctx: &GpuContext,
        format_id: &str,
        edge: EdgeMode,
        timer: Option<DeviceTimer>,
    ) -> GpuResult<Self> {
        let pass = BlurPass::new(ctx, format_id, KernelVariant::Separable, edge, 2)?;
        Ok(Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            pass,
            working: None,
            reallocations: 0,
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

    /// Current working surface extent, if allocated.
    pub fn working_size(&self) -> Option<(u32, u32)> {
        self.working.as_ref().map(Surface::size)
    }

    /// How many times the working surface has been (re)allocated.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    fn ensure_working_surface(&mut self, width: u32, height: u32) -> GpuResult<wgpu::TextureView> {
        let grow = grow_extent(self.working_size(), (width, height));
        let surface = match (self.working.take(), grow) {
            (Some(existing), None) => existing,
            (old, target) => {
                if let Some(old) = old {
                    old.destroy();
                }
                let (w, h) = target.unwrap_or((width, height));
                let surface = self.pass.allocate(w, h, PIPELINE_USAGES, "gblur_working")?;
                self.reallocations += 1;
                debug!(width = w, height = h, reallocations = self.reallocations, "working surface allocated");
                surface
            }
        };
        let view = surface.create_view();
        self.working = Some(surface);
        Ok(view)
    }

    /// Blur `input` into `output`, or into a new surface when `output` is
    /// `None`. Returns the surface written.
    ///
    /// Surfaces are validated as for [`DirectBlur::blur`](crate::DirectBlur::blur).
    pub fn blur(&mut self, input: &Surface, radius: u32, output: Option<&Surface>) -> GpuResult<Surface> {
        ensure_live(self.destroyed, "SeparableBlur")?;
        let output = self.pass.prepare_output(input, output)?;
        let (width, height) = input.size();

        trace!(format = self.pass.format().id, width, height, radius, "separable blur");

        let working = self.ensure_working_surface(width, height)?;

        self.pass
            .write_params(&self.queue, 0, BlurParams::new(radius, HORIZONTAL, width, height));
        self.pass
            .write_params(&self.queue, 1, BlurParams::new(radius, VERTICAL, width, height));

        let src = input.create_view();
        let dst = output.create_view();
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("gblur_separable"),
        });

        self.pass.encode(
            &mut encoder,
            &src,
            &working,
            0,
            (width, height),
            self.timer.as_ref().and_then(DeviceTimer::begin_writes),
        );
        self.pass.encode(
            &mut encoder,
            &working,
            &dst,
            1,
            (width, height),
            self.timer.as_ref().and_then(DeviceTimer::end_writes),
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

    /// Release the working surface only. The next blur reallocates it.
    pub fn destroy_textures(&mut self) {
        if let Some(working) = self.working.take() {
            working.destroy();
        }
    }

    /// Release the working surface and the parameter buffer.
    pub fn destroy(&mut self) {
        self.destroy_textures();
        if !self.destroyed {
            self.pass.destroy();
            self.destroyed = true;
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl std::fmt::Debug for SeparableBlur {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeparableBlur")
            .field("format", &self.pass.format().id)
            .field("edge", &self.pass.edge())
            .field("working", &self.working_size())
            .field("reallocations", &self.reallocations)
            .field("timed", &self.timer.is_some())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a sequence of square input sizes, counting reallocations.
    fn replay(sizes: &[u32]) -> (Vec<usize>, Option<(u32, u32)>) {
        let mut current = None;
        let mut grown_at = Vec::new();
        for (i, &s) in sizes.iter().enumerate() {
            if let Some(next) = grow_extent(current, (s, s)) {
                current = Some(next);
                grown_at.push(i);
            }
        }
        (grown_at, current)
    }

    #[test]
    fn test_working_surface_grows_only() {
        let (grown_at, last) = replay(&[64, 32, 128]);
        assert_eq!(grown_at, vec![0, 2]);
        assert_eq!(last, Some((128, 128)));
    }

    #[test]
    fn test_working_surface_never_shrinks_per_axis() {
        assert_eq!(grow_extent(Some((64, 16)), (32, 32)), Some((64, 32)));
        assert_eq!(grow_extent(Some((64, 32)), (64, 32)), None);
        assert_eq!(grow_extent(Some((64, 32)), (10, 10)), None);
        assert_eq!(grow_extent(None, (5, 7)), Some((5, 7)));
    }
}
