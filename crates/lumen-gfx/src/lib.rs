//! lumen-gfx: GPU context creation, image decoding and texture upload.
//!
//! Responsibilities:
//! - Pick an adapter (hardware first, software fallback second) and build a
//!   [`GpuContext`] with a device-removal signal wired up.
//! - Decode an image file into the one pixel layout the pipeline supports.
//! - Upload decoded pixels into a fresh GPU texture.

/// Re-export wgpu for downstream crates while avoiding direct dependency leakage.
pub use wgpu;

mod context;
mod decode;
mod error;
mod signal;
mod upload;

pub use context::{DeviceProvider, GpuContext, WgpuDeviceProvider};
pub use decode::{ImageBuffer, PixelFormat, decode_file};
pub use error::{CreateDeviceError, DecodeError, UploadError};
pub use signal::RemovalSignal;
pub use upload::upload_image;

/// Choose an sRGB surface format when available; otherwise, pick the first format.
pub fn choose_srgb_surface_format(
    adapter: &wgpu::Adapter,
    surface: &wgpu::Surface,
) -> wgpu::TextureFormat {
    let caps = surface.get_capabilities(adapter);
    caps.formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .unwrap_or(caps.formats[0])
}

/// Create a surface configuration for the given size, favoring FIFO present mode
/// and an opaque alpha mode when present.
pub fn make_surface_config(
    adapter: &wgpu::Adapter,
    surface: &wgpu::Surface,
    width: u32,
    height: u32,
) -> wgpu::SurfaceConfiguration {
    let caps = surface.get_capabilities(adapter);
    let format = choose_srgb_surface_format(adapter, surface);
    let present_mode = caps
        .present_modes
        .iter()
        .copied()
        .find(|m| *m == wgpu::PresentMode::Fifo)
        .unwrap_or(caps.present_modes[0]);
    let alpha_mode = caps
        .alpha_modes
        .iter()
        .copied()
        .find(|m| *m == wgpu::CompositeAlphaMode::Opaque)
        .unwrap_or(caps.alpha_modes[0]);
    wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width,
        height,
        present_mode,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 1,
    }
}
