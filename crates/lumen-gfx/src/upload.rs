use crate::decode::{ImageBuffer, PixelFormat};
use crate::error::UploadError;

/// Create a GPU texture from decoded pixels.
///
/// The texture matches the image exactly: its width and height, one mip
/// level, one array layer, sample count 1, the image's pixel format. The
/// bytes are written with a row stride of `width * 4`. A fresh texture is
/// created on every call; nothing is cached.
pub fn upload_image(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    image: &ImageBuffer,
) -> Result<wgpu::Texture, UploadError> {
    if image.format != PixelFormat::Rgba8UnormSrgb {
        return Err(UploadError::UnsupportedFormat(image.format));
    }
    let limit = device.limits().max_texture_dimension_2d;
    if image.width > limit || image.height > limit {
        return Err(UploadError::TooLarge {
            width: image.width,
            height: image.height,
            limit,
        });
    }

    // wgpu reports creation failures out-of-band; error scopes turn them
    // into a Result for this one upload.
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

    let size = wgpu::Extent3d {
        width: image.width,
        height: image.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("image-upload"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: image.format.to_wgpu(),
        usage: wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &image.bytes,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(image.stride()),
            rows_per_image: Some(image.height),
        },
        size,
    );

    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(UploadError::Device(err));
    }
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(UploadError::Device(err));
    }

    log::info!(
        "uploaded {}x{} image ({} bytes) to a fresh texture",
        image.width,
        image.height,
        image.bytes.len()
    );
    Ok(texture)
}
