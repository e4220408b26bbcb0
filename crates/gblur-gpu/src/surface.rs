//! Textures tagged with their registry format.
//!
//! A [`Surface`] is a cheap handle: clones share the underlying texture.
//! Upload writes tightly packed rows; readback goes through a staging buffer
//! whose rows are padded to [`COPY_ROW_ALIGNMENT`] and stripped with
//! [`slice_rows`].

use std::sync::Arc;

use gblur_core::{padded_row_stride, slice_rows, Error, HostImage, PixelFormat, COPY_ROW_ALIGNMENT};
use tracing::trace;

use crate::formats::{pixel_format_for, require_usages, texture_format};
use crate::{GpuContext, GpuError, GpuResult};

#[derive(Clone)]
pub struct Surface {
    texture: Arc<wgpu::Texture>,
    width: u32,
    height: u32,
    format: &'static PixelFormat,
}

impl Surface {
    /// Usage for surfaces that are blurred, rendered into and read back.
    pub const DEFAULT_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
        .union(wgpu::TextureUsages::RENDER_ATTACHMENT)
        .union(wgpu::TextureUsages::COPY_SRC)
        .union(wgpu::TextureUsages::COPY_DST);

    /// Allocate an uninitialized surface.
    ///
    /// Fails with [`GpuError::DeviceCapability`] when the device does not
    /// accept `usage` for the format, or the extent exceeds its texture limit.
    pub fn new(
        ctx: &GpuContext,
        format_id: &str,
        width: u32,
        height: u32,
        usage: wgpu::TextureUsages,
    ) -> GpuResult<Self> {
        let format = PixelFormat::lookup(format_id)?;
        Self::allocate(
            &ctx.device,
            format,
            width,
            height,
            usage,
            ctx.allowed_usages(format),
            "gblur_surface",
        )
    }

    /// Checks `usage` against `allowed` before creating the texture, since
    /// the device reports unsupported usages through its uncaptured error
    /// handler.
    pub(crate) fn allocate(
        device: &wgpu::Device,
        format: &'static PixelFormat,
        width: u32,
        height: u32,
        usage: wgpu::TextureUsages,
        allowed: wgpu::TextureUsages,
        label: &str,
    ) -> GpuResult<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height }.into());
        }
        let max = device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(GpuError::DeviceCapability(format!(
                "{width}x{height} exceeds the {max} texel texture limit"
            )));
        }
        require_usages(format, allowed, usage)?;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(format)?,
            usage,
            view_formats: &[],
        });
        Ok(Self {
            texture: Arc::new(texture),
            width,
            height,
            format,
        })
    }

    /// Create a surface and fill it with densely packed `bytes`.
    pub fn upload(
        ctx: &GpuContext,
        format_id: &str,
        width: u32,
        height: u32,
        bytes: &[u8],
        usage: wgpu::TextureUsages,
    ) -> GpuResult<Self> {
        let format = PixelFormat::lookup(format_id)?;
        let expected = format.packed_len(width, height);
        if bytes.len() != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: bytes.len(),
            }
            .into());
        }

        let surface = Self::allocate(
            &ctx.device,
            format,
            width,
            height,
            usage | wgpu::TextureUsages::COPY_DST,
            ctx.allowed_usages(format),
            "gblur_upload",
        )?;
        surface.write(ctx, bytes)?;
        trace!(format = format.id, width, height, "surface uploaded");
        Ok(surface)
    }

    /// Create a surface from samples in the format's domain.
    pub fn from_host(ctx: &GpuContext, image: &HostImage, usage: wgpu::TextureUsages) -> GpuResult<Self> {
        Self::upload(
            ctx,
            image.format().id,
            image.width(),
            image.height(),
            &image.to_bytes(),
            usage,
        )
    }

    /// Wrap an existing texture. Its format must be registered.
    pub fn from_texture(texture: wgpu::Texture) -> GpuResult<Self> {
        let format = pixel_format_for(texture.format())?;
        Ok(Self {
            width: texture.width(),
            height: texture.height(),
            format,
            texture: Arc::new(texture),
        })
    }

    /// Overwrite the whole surface with densely packed `bytes`.
    pub fn write(&self, ctx: &GpuContext, bytes: &[u8]) -> GpuResult<()> {
        let expected = self.format.packed_len(self.width, self.height);
        if bytes.len() != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: bytes.len(),
            }
            .into());
        }
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.unpadded_row_bytes()),
                rows_per_image: Some(self.height),
            },
            self.extent(),
        );
        Ok(())
    }

    /// Read the surface back as densely packed bytes.
    ///
    /// Blocks until the copy has completed.
    pub fn read_bytes(&self, ctx: &GpuContext) -> GpuResult<Vec<u8>> {
        let unpadded = self.unpadded_row_bytes();
        let padded = padded_row_stride(unpadded);
        debug_assert_eq!(padded % COPY_ROW_ALIGNMENT, 0);
        let size = padded as u64 * self.height as u64;

        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gblur_readback"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gblur_readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            self.extent(),
        );
        ctx.submit(encoder);

        let padded_bytes = map_read(&ctx.device, &staging)?;
        let bytes = slice_rows(&padded_bytes, padded as usize, unpadded as usize).map_err(Error::from)?;
        Ok(bytes)
    }

    /// Read the surface back as samples in the format's domain.
    pub fn to_host(&self, ctx: &GpuContext) -> GpuResult<HostImage> {
        let bytes = self.read_bytes(ctx)?;
        Ok(HostImage::from_bytes(self.format, self.width, self.height, &bytes)?)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> &'static PixelFormat {
        self.format
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn usage(&self) -> wgpu::TextureUsages {
        self.texture.usage()
    }

    /// Whether both handles refer to the same texture.
    pub fn same_texture(&self, other: &Surface) -> bool {
        Arc::ptr_eq(&self.texture, &other.texture)
    }

    pub fn create_view(&self) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Release GPU memory now. Clones of this surface become unusable.
    pub fn destroy(&self) {
        self.texture.destroy();
    }

    fn unpadded_row_bytes(&self) -> u32 {
        self.width * self.format.bytes_per_texel
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

/// Map a `MAP_READ` buffer, copy its contents out and unmap it.
pub(crate) fn map_read(device: &wgpu::Device, buffer: &wgpu::Buffer) -> GpuResult<Vec<u8>> {
    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    let _ = device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|_| GpuError::MapFailed("map channel closed".into()))?
        .map_err(|e| GpuError::MapFailed(e.to_string()))?;

    let data = slice.get_mapped_range();
    let bytes = data.to_vec();
    drop(data);
    buffer.unmap();
    Ok(bytes)
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format.id)
            .finish()
    }
}
