use std::path::Path;

use crate::error::DecodeError;

/// The pixel layouts the decoder can produce. The upload path handles exactly
/// one of them; anything else is rejected without conversion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PixelFormat {
    /// 4 bytes per pixel, packed RGBA, non-linear (sRGB) color.
    Rgba8UnormSrgb,
}

impl PixelFormat {
    pub const BYTES_PER_PIXEL: u32 = 4;

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        }
    }
}

/// Decoded pixels plus their layout. Produced once by [`decode_file`],
/// consumed once by [`upload_image`](crate::upload_image).
#[derive(Debug)]
pub struct ImageBuffer {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl ImageBuffer {
    /// Row stride in bytes. Rows are tightly packed.
    pub fn stride(&self) -> u32 {
        self.width * PixelFormat::BYTES_PER_PIXEL
    }
}

/// Decode an image file (JPEG or PNG) into tightly packed RGBA8 pixels.
pub fn decode_file(path: &Path) -> Result<ImageBuffer, DecodeError> {
    let img = image::open(path).map_err(|source| DecodeError {
        path: path.to_path_buf(),
        source,
    })?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    log::info!("decoded {:?}: {}x{}", path, width, height);
    Ok(ImageBuffer {
        bytes: rgba.into_raw(),
        width,
        height,
        format: PixelFormat::Rgba8UnormSrgb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_png(width: u32, height: u32) -> std::path::PathBuf {
        let mut img = image::RgbaImage::new(width, height);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = image::Rgba([x as u8, y as u8, 0x40, 0xff]);
        }
        let path = std::env::temp_dir().join(format!("lumen-decode-{}x{}.png", width, height));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_decode_reports_exact_dimensions() {
        let path = write_test_png(100, 50);
        let buf = decode_file(&path).unwrap();
        assert_eq!(buf.width, 100);
        assert_eq!(buf.height, 50);
        assert_eq!(buf.format, PixelFormat::Rgba8UnormSrgb);
        assert_eq!(buf.bytes.len(), 100 * 50 * 4);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_stride_is_width_times_four() {
        let buf = ImageBuffer {
            bytes: vec![0; 7 * 3 * 4],
            width: 7,
            height: 3,
            format: PixelFormat::Rgba8UnormSrgb,
        };
        assert_eq!(buf.stride(), 28);
    }

    #[test]
    fn test_decode_missing_file_fails() {
        let err = decode_file(Path::new("does-not-exist.jpg")).unwrap_err();
        assert!(err.to_string().contains("does-not-exist"));
    }
}
