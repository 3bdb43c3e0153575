use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use anyhow::{anyhow, Context, Result};
use image::imageops::flip_vertical_in_place;
use image::GenericImageView;
use wgpu::util::{DeviceExt, TextureDataOrder};

/// A texture plus the view layers bind. The texture handle is kept alive for
/// the view's sake.
pub(crate) struct TextureResources {
    pub _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// 1x1 transparent black; what an unresolved texture slot reads as.
pub(crate) fn create_placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> TextureResources {
    let data = [0u8, 0, 0, 0];
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("placeholder texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &data,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureResources {
        _texture: texture,
        view,
    }
}

pub(crate) fn create_linear_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

struct DecodedImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

fn decode_image(path: &Path) -> Result<DecodedImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to open texture at {}", path.display()))?;
    let (width, height) = image.dimensions();
    let mut rgba = image.to_rgba8();
    // Bottom-left origin, matching the inverted pointer axis.
    flip_vertical_in_place(&mut rgba);
    Ok(DecodedImage {
        width,
        height,
        rgba: rgba.into_raw(),
    })
}

/// An in-flight texture load. Decoding runs on a background thread; the
/// compositor polls once per frame and uploads on completion, so a frame is
/// never blocked on IO.
pub(crate) struct TextureFuture {
    path: PathBuf,
    receiver: Receiver<Result<DecodedImage>>,
}

impl TextureFuture {
    pub(crate) fn spawn(path: PathBuf) -> Self {
        let (sender, receiver) = mpsc::channel();
        let worker_path = path.clone();
        thread::spawn(move || {
            let result = decode_image(&worker_path);
            let _ = sender.send(result);
        });
        Self { path, receiver }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking poll: `Ok(Some(..))` once decoded and uploaded,
    /// `Ok(None)` while pending, `Err` if decoding failed or the worker
    /// vanished.
    pub(crate) fn poll(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Option<TextureResources>> {
        match self.receiver.try_recv() {
            Ok(Ok(decoded)) => Ok(Some(upload_image(device, queue, &self.path, &decoded))),
            Ok(Err(err)) => Err(err),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(anyhow!(
                "texture load worker disconnected before returning a result"
            )),
        }
    }
}

fn upload_image(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    path: &Path,
    decoded: &DecodedImage,
) -> TextureResources {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(&format!("custom texture {}", path.display())),
            size: wgpu::Extent3d {
                width: decoded.width,
                height: decoded.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        &decoded.rgba,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureResources {
        _texture: texture,
        view,
    }
}
