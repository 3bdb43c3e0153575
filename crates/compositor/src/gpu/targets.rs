use winit::dpi::PhysicalSize;

use crate::schedule::PingPong;

/// Offscreen color format: alpha-capable and half-float so repeated
/// composition passes do not band.
pub(crate) const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// One offscreen color buffer, drawable and readable as a texture.
pub(crate) struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: PhysicalSize<u32>,
}

impl RenderTarget {
    pub(crate) fn new(device: &wgpu::Device, size: PhysicalSize<u32>, label: &str) -> Self {
        let extent = wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size: PhysicalSize::new(extent.width, extent.height),
        }
    }
}

/// Two equally-sized offscreen buffers exchanged between compositing stages.
/// Swapping relabels input/output without touching the allocations.
pub(crate) struct RenderTargetPair {
    targets: [RenderTarget; 2],
    ping_pong: PingPong,
}

impl RenderTargetPair {
    pub(crate) fn create(device: &wgpu::Device, size: PhysicalSize<u32>) -> Self {
        Self {
            targets: [
                RenderTarget::new(device, size, "compositor target a"),
                RenderTarget::new(device, size, "compositor target b"),
            ],
            ping_pong: PingPong::default(),
        }
    }

    /// Reallocates both buffers; prior contents are discarded.
    pub(crate) fn resize(&mut self, device: &wgpu::Device, size: PhysicalSize<u32>) {
        if self.size() == size {
            return;
        }
        self.targets = [
            RenderTarget::new(device, size, "compositor target a"),
            RenderTarget::new(device, size, "compositor target b"),
        ];
    }

    pub(crate) fn swap(&mut self) {
        self.ping_pong.swap();
    }

    pub(crate) fn input(&self) -> &RenderTarget {
        &self.targets[self.ping_pong.input()]
    }

    pub(crate) fn output(&self) -> &RenderTarget {
        &self.targets[self.ping_pong.output()]
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.targets[0].size
    }
}
