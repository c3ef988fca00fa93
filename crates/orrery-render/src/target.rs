//! Offscreen render targets.
//!
//! All orrery passes use reverse-Z: depth is cleared to 0.0 and compared with
//! `GreaterEqual`.

/// Dark space background.
pub const SPACE_BLACK: wgpu::Color = wgpu::Color {
    r: 0.002,
    g: 0.002,
    b: 0.008,
    a: 1.0,
};

/// Colour and depth formats a pipeline must be built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFormats {
    pub color: wgpu::TextureFormat,
    pub depth: wgpu::TextureFormat,
}

impl Default for TargetFormats {
    fn default() -> Self {
        Self {
            color: wgpu::TextureFormat::Rgba8UnormSrgb,
            depth: FrameTarget::DEPTH_FORMAT,
        }
    }
}

impl TargetFormats {
    /// Depth state shared by every opaque orrery pipeline.
    pub fn depth_state(&self, write: bool) -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            format: self.depth,
            depth_write_enabled: write,
            depth_compare: FrameTarget::DEPTH_COMPARE,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

/// Colour plus depth texture pair rendered into instead of a surface.
pub struct FrameTarget {
    pub color: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    formats: TargetFormats,
    width: u32,
    height: u32,
}

impl FrameTarget {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
    pub const DEPTH_CLEAR: f32 = 0.0;
    pub const DEPTH_COMPARE: wgpu::CompareFunction = wgpu::CompareFunction::GreaterEqual;

    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let formats = TargetFormats::default();
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("frame-color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: formats.color,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("frame-depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: formats.depth,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            color,
            color_view,
            depth,
            depth_view,
            formats,
            width: size.width,
            height: size.height,
        }
    }

    /// Recreate the textures if the size changed.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if self.width == width.max(1) && self.height == height.max(1) {
            return;
        }
        *self = Self::new(device, width, height);
    }

    pub fn formats(&self) -> TargetFormats {
        self.formats
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Begin a pass that clears colour and depth.
    pub fn begin_pass<'e>(
        &'e self,
        encoder: &'e mut wgpu::CommandEncoder,
        clear: wgpu::Color,
    ) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("orrery-main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(Self::DEPTH_CLEAR),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        })
    }
}

/// Square depth-only texture rendered from the star's point of view.
pub struct ShadowMap {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    size: u32,
}

impl ShadowMap {
    pub fn new(device: &wgpu::Device, size: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-map"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FrameTarget::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Begin a depth-only pass clearing to the far plane.
    pub fn begin_pass<'e>(&'e self, encoder: &'e mut wgpu::CommandEncoder) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("shadow-pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(FrameTarget::DEPTH_CLEAR),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_z_constants() {
        assert_eq!(FrameTarget::DEPTH_CLEAR, 0.0);
        assert_eq!(FrameTarget::DEPTH_COMPARE, wgpu::CompareFunction::GreaterEqual);
        let state = TargetFormats::default().depth_state(false);
        assert!(!state.depth_write_enabled);
    }

    #[test]
    fn test_resize_same_size_is_noop() {
        let Some(ctx) = crate::GpuContext::try_headless() else {
            return;
        };
        let mut target = FrameTarget::new(&ctx.device, 64, 32);
        let before = target.color.clone();
        target.resize(&ctx.device, 64, 32);
        assert!(target.color == before);
        target.resize(&ctx.device, 128, 32);
        assert_eq!(target.width(), 128);
    }

    #[test]
    fn test_zero_size_clamped() {
        let Some(ctx) = crate::GpuContext::try_headless() else {
            return;
        };
        let target = FrameTarget::new(&ctx.device, 0, 0);
        assert_eq!((target.width(), target.height()), (1, 1));
    }
}
