//! Device timestamp timer.
//!
//! Brackets GPU work with two timestamp queries: slot 0 at the beginning of
//! the first timed pass, slot 1 at the end of the last. Encode
//! [`DeviceTimer::resolve`] once per timed submission before the encoder is
//! finished, then call [`DeviceTimer::read`] after submitting.
//!
//! Requires `wgpu::Features::TIMESTAMP_QUERY` on the device.
//!
//! [`DeviceTimer::destroy`] releases the query set and both buffers. A
//! destroyed timer attached to a pipeline writes no timestamps and the
//! pipeline keeps working.

use std::sync::Arc;

use tracing::trace;

use crate::surface::map_read;
use crate::{GpuContext, GpuError, GpuResult};

const QUERY_COUNT: u32 = 2;
const RESULT_BYTES: u64 = QUERY_COUNT as u64 * 8;

struct TimerResources {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
}

pub struct DeviceTimer {
    device: Arc<wgpu::Device>,
    /// `None` once destroyed.
    resources: Option<TimerResources>,
    /// Nanoseconds per timestamp tick.
    period: f32,
    pending: bool,
}

impl DeviceTimer {
    /// Allocate the query set and readback buffers.
    ///
    /// Fails with [`GpuError::DeviceCapability`] when the device was created
    /// without timestamp queries.
    pub fn create(ctx: &GpuContext) -> GpuResult<Self> {
        if !ctx.device.features().contains(wgpu::Features::TIMESTAMP_QUERY) {
            return Err(GpuError::DeviceCapability("TIMESTAMP_QUERY".into()));
        }

        let query_set = ctx.device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("gblur_timer"),
            ty: wgpu::QueryType::Timestamp,
            count: QUERY_COUNT,
        });
        let resolve_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gblur_timer_resolve"),
            size: RESULT_BYTES,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gblur_timer_staging"),
            size: RESULT_BYTES,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            device: ctx.device.clone(),
            resources: Some(TimerResources {
                query_set,
                resolve_buffer,
                staging_buffer,
            }),
            period: ctx.queue.get_timestamp_period(),
            pending: false,
        })
    }

    /// Timestamp writes covering a single pass. `None` once destroyed.
    pub fn pass_writes(&self) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        self.writes(Some(0), Some(1))
    }

    /// Begin half of a span: attach to the first timed pass.
    pub fn begin_writes(&self) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        self.writes(Some(0), None)
    }

    /// End half of a span: attach to the last timed pass.
    pub fn end_writes(&self) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        self.writes(None, Some(1))
    }

    fn writes(&self, begin: Option<u32>, end: Option<u32>) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        self.resources.as_ref().map(|r| wgpu::RenderPassTimestampWrites {
            query_set: &r.query_set,
            beginning_of_pass_write_index: begin,
            end_of_pass_write_index: end,
        })
    }

    /// Encode query resolution and the copy to the staging buffer.
    /// Does nothing once destroyed.
    pub fn resolve(&mut self, encoder: &mut wgpu::CommandEncoder) {
        let Some(r) = self.resources.as_ref() else {
            return;
        };
        encoder.resolve_query_set(&r.query_set, 0..QUERY_COUNT, &r.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(&r.resolve_buffer, 0, &r.staging_buffer, 0, RESULT_BYTES);
        self.pending = true;
    }

    /// Whether a resolved measurement is waiting to be read.
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Elapsed device time of the last resolved submission, in nanoseconds.
    ///
    /// Blocks until the staging buffer is mapped.
    pub fn read(&mut self) -> GpuResult<u64> {
        let r = self.resources.as_ref().ok_or(GpuError::Destroyed("DeviceTimer"))?;
        if !self.pending {
            return Err(GpuError::TimerNotResolved);
        }
        let bytes = map_read(&self.device, &r.staging_buffer)?;
        self.pending = false;

        let mut ticks = bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]));
        let (begin, end) = match (ticks.next(), ticks.next()) {
            (Some(b), Some(e)) => (b, e),
            _ => return Err(GpuError::MapFailed("short timestamp readback".into())),
        };

        let ns = (end.saturating_sub(begin) as f64 * self.period as f64) as u64;
        trace!(begin, end, ns, "timer read");
        Ok(ns)
    }

    /// Release the query set and both buffers. Safe to call more than once.
    pub fn destroy(&mut self) {
        if let Some(r) = self.resources.take() {
            r.resolve_buffer.destroy();
            r.staging_buffer.destroy();
            drop(r.query_set);
            self.pending = false;
            trace!("timer destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.resources.is_none()
    }

    /// Render nanoseconds as milliseconds with three decimals.
    pub fn format(ns: u64) -> String {
        format!("{:.3}ms", ns as f64 / 1_000_000.0)
    }
}

impl std::fmt::Debug for DeviceTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTimer")
            .field("period", &self.period)
            .field("pending", &self.pending)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
