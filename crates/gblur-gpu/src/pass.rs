//! Render pass plumbing shared by both blur pipelines.

use std::num::NonZeroU64;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use gblur_core::{
    align_to, effective_radius, EdgeMode, Error, KernelKey, KernelVariant, PixelFormat, PARAMS_SIZE,
};
use tracing::debug;

use crate::context::validated;
use crate::formats::{require_usages, sample_type, texture_format, PIPELINE_USAGES};
use crate::{GpuContext, GpuError, GpuResult, Surface};

/// Uniform record read by the generated kernels.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct BlurParams {
    pub radius: i32,
    pub direction: i32,
    pub width: i32,
    pub height: i32,
}

impl BlurParams {
    /// The radius is clamped to the larger image dimension, which keeps the
    /// kernel's tap loop bounded.
    pub fn new(radius: u32, direction: i32, width: u32, height: u32) -> Self {
        Self {
            radius: effective_radius(radius, width, height).min(i32::MAX as u32) as i32,
            direction,
            width: width as i32,
            height: height as i32,
        }
    }
}

/// Compiled pipeline plus its parameter buffer.
///
/// The parameter buffer holds `slots` records at an offset stride that
/// satisfies the device's uniform offset alignment.
pub(crate) struct BlurPass {
    device: Arc<wgpu::Device>,
    format: &'static PixelFormat,
    edge: EdgeMode,
    /// Usages the device accepts for `format`.
    allowed: wgpu::TextureUsages,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    params: wgpu::Buffer,
    stride: u64,
    label: String,
}

impl BlurPass {
    pub fn new(
        ctx: &GpuContext,
        format_id: &str,
        variant: KernelVariant,
        edge: EdgeMode,
        slots: u64,
    ) -> GpuResult<Self> {
        let format = PixelFormat::lookup(format_id)?;
        let allowed = ctx.allowed_usages(format);
        require_usages(format, allowed, PIPELINE_USAGES)?;
        let key = KernelKey::new(format, variant, edge);
        let label = key.label();
        let module = ctx.shader(&key)?;
        let device = &ctx.device;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&label),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: sample_type(format),
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(PARAMS_SIZE),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let target = texture_format(format)?;
        let pipeline = validated(device, &label, || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        })?;

        let alignment = device.limits().min_uniform_buffer_offset_alignment;
        let stride = align_to(PARAMS_SIZE as u32, alignment) as u64;
        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gblur_params"),
            size: stride * slots.max(1),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        debug!(pipeline = %label, stride, slots, "blur pipeline created");

        Ok(Self {
            device: ctx.device.clone(),
            format,
            edge,
            allowed,
            layout,
            pipeline,
            params,
            stride,
            label,
        })
    }

    pub fn format(&self) -> &'static PixelFormat {
        self.format
    }

    pub fn edge(&self) -> EdgeMode {
        self.edge
    }

    pub fn write_params(&self, queue: &wgpu::Queue, slot: u64, params: BlurParams) {
        queue.write_buffer(&self.params, slot * self.stride, bytemuck::bytes_of(&params));
    }

    /// Encodes one full-screen pass reading `src` into the top-left
    /// `extent` region of `dst`.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        src: &wgpu::TextureView,
        dst: &wgpu::TextureView,
        slot: u64,
        extent: (u32, u32),
        timestamp_writes: Option<wgpu::RenderPassTimestampWrites<'_>>,
    ) {
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.label),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.params,
                        offset: slot * self.stride,
                        size: NonZeroU64::new(PARAMS_SIZE),
                    }),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: dst,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_viewport(0.0, 0.0, extent.0 as f32, extent.1 as f32, 0.0, 1.0);
        pass.set_scissor_rect(0, 0, extent.0, extent.1);
        pass.draw(0..3, 0..1);
    }

    /// Allocates a surface of the pipeline format.
    pub fn allocate(&self, width: u32, height: u32, usage: wgpu::TextureUsages, label: &str) -> GpuResult<Surface> {
        Surface::allocate(&self.device, self.format, width, height, usage, self.allowed, label)
    }

    /// Checks `input` and `output` before any work is encoded and returns
    /// the surface to render into: `output` if given, otherwise a new
    /// allocation.
    ///
    /// The input must be sampleable and the output renderable, and the two
    /// must be distinct textures.
    pub fn prepare_output(&self, input: &Surface, output: Option<&Surface>) -> GpuResult<Surface> {
        let format = self.format;
        if input.format().id != format.id {
            return Err(Error::format_mismatch(format.id, input.format().id).into());
        }
        require_surface_usage("input", input.usage(), wgpu::TextureUsages::TEXTURE_BINDING)?;
        match output {
            Some(out) => {
                if out.size() != input.size() {
                    return Err(Error::size_mismatch(input.size(), out.size()).into());
                }
                if out.format().id != format.id {
                    return Err(Error::format_mismatch(format.id, out.format().id).into());
                }
                require_surface_usage("output", out.usage(), wgpu::TextureUsages::RENDER_ATTACHMENT)?;
                if out.same_texture(input) {
                    return Err(GpuError::AliasedSurface);
                }
                Ok(out.clone())
            }
            None => self.allocate(input.width(), input.height(), Surface::DEFAULT_USAGE, "gblur_output"),
        }
    }

    pub fn destroy(&self) {
        self.params.destroy();
    }
}

/// Fails with [`GpuError::MissingUsage`] unless `usage` covers `required`.
pub(crate) fn require_surface_usage(
    role: &'static str,
    usage: wgpu::TextureUsages,
    required: wgpu::TextureUsages,
) -> GpuResult<()> {
    let missing = required.difference(usage);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(GpuError::MissingUsage { role, missing })
    }
}

pub(crate) fn ensure_live(destroyed: bool, what: &'static str) -> GpuResult<()> {
    if destroyed {
        Err(GpuError::Destroyed(what))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<BlurParams>() as u64, PARAMS_SIZE);
        let p = BlurParams::new(3, 1, 64, 32);
        let bytes = bytemuck::bytes_of(&p);
        assert_eq!(&bytes[0..4], &3i32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &1i32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &32i32.to_ne_bytes());
    }

    #[test]
    fn test_params_radius_clamped_to_extent() {
        assert_eq!(BlurParams::new(u32::MAX, 0, 64, 32).radius, 64);
        assert_eq!(BlurParams::new(u32::MAX, 1, 1, 1).radius, 1);
        assert_eq!(BlurParams::new(1000, 0, 8, 300).radius, 300);
        assert_eq!(BlurParams::new(5, 0, 64, 32).radius, 5);
    }

    #[test]
    fn test_require_surface_usage() {
        use wgpu::TextureUsages as U;
        assert!(require_surface_usage("input", Surface::DEFAULT_USAGE, U::TEXTURE_BINDING).is_ok());
        assert!(require_surface_usage("output", Surface::DEFAULT_USAGE, U::RENDER_ATTACHMENT).is_ok());

        let copy_only = U::COPY_SRC | U::COPY_DST;
        match require_surface_usage("output", copy_only, U::RENDER_ATTACHMENT) {
            Err(GpuError::MissingUsage { role, missing }) => {
                assert_eq!(role, "output");
                assert_eq!(missing, U::RENDER_ATTACHMENT);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match require_surface_usage("input", U::RENDER_ATTACHMENT, U::TEXTURE_BINDING) {
            Err(GpuError::MissingUsage { role, missing }) => {
                assert_eq!(role, "input");
                assert_eq!(missing, U::TEXTURE_BINDING);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_ensure_live() {
        assert!(ensure_live(false, "DirectBlur").is_ok());
        assert!(matches!(ensure_live(true, "DirectBlur"), Err(GpuError::Destroyed("DirectBlur"))));
    }
}
