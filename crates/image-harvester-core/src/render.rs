use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, Rgba, RgbaImage};
use log::debug;

use crate::error::{Error, Result};
use crate::heif;
use crate::types::RenderedAsset;

/// Side of the square the source is scaled into
pub const SAFE_BOX: u32 = 618;

/// Side of the output canvas
pub const FINAL_SIZE: u32 = 1000;

/// JPEG quality of the output
pub const JPEG_QUALITY: u8 = 100;

/// Channel value above which a pixel counts as background white
const WHITE_THRESHOLD: u8 = 245;

/// Where a scaled source lands on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub dx: u32,
    pub dy: u32,
}

/// Normalizes arbitrary source images into a fixed square JPEG
#[derive(Debug, Clone)]
pub struct Renderer {
    pub safe_box: u32,
    pub final_size: u32,
    pub jpeg_quality: u8,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            safe_box: SAFE_BOX,
            final_size: FINAL_SIZE,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

impl Renderer {
    /// Size and offset of a `width` x `height` source on the canvas
    pub fn placement(&self, width: u32, height: u32) -> Placement {
        let box_side = self.safe_box as f64;
        let scale = (box_side / width as f64).min(box_side / height as f64);
        let dst_w = ((width as f64 * scale).round() as u32).max(1);
        let dst_h = ((height as f64 * scale).round() as u32).max(1);

        Placement {
            width: dst_w,
            height: dst_h,
            dx: self.final_size.saturating_sub(dst_w) / 2,
            dy: self.final_size.saturating_sub(dst_h) / 2,
        }
    }

    /// Decode `bytes`, fit it centered on a white canvas and encode as JPEG
    pub fn render(&self, bytes: &[u8], remove_background: bool) -> Result<RenderedAsset> {
        let mut source = decode_source(bytes)?.to_rgba8();
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::Decode("Image has no pixels".to_string()));
        }

        if remove_background && clear_background(&mut source) {
            debug!("Cleared near-white background of {}x{} source", width, height);
        }

        let placement = self.placement(width, height);
        let scaled = imageops::resize(
            &source,
            placement.width,
            placement.height,
            FilterType::Lanczos3,
        );

        let mut canvas =
            RgbaImage::from_pixel(self.final_size, self.final_size, Rgba([255, 255, 255, 255]));
        imageops::overlay(
            &mut canvas,
            &scaled,
            placement.dx as i64,
            placement.dy as i64,
        );

        let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, self.jpeg_quality)
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
            .map_err(|e| Error::Encode(e.to_string()))?;

        let content_hash = blake3::hash(&bytes).to_hex().to_string();
        Ok(RenderedAsset {
            bytes,
            content_hash,
        })
    }
}

/// HEIC and AVIF go through libheif, everything else through `image`
fn decode_source(bytes: &[u8]) -> Result<DynamicImage> {
    if heif::is_heif(bytes) {
        return heif::decode(bytes);
    }
    image::load_from_memory(bytes).map_err(|e| Error::Decode(e.to_string()))
}

fn is_white(pixel: &Rgba<u8>) -> bool {
    pixel.0[..3].iter().all(|&c| c > WHITE_THRESHOLD)
}

/// Make near-white pixels transparent when the corners say the background is white.
///
/// Returns whether anything was changed.
pub fn clear_background(image: &mut RgbaImage) -> bool {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return false;
    }

    let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)];
    let white_corners = corners
        .iter()
        .filter(|(x, y)| is_white(image.get_pixel(*x, *y)))
        .count();
    if white_corners < 3 {
        return false;
    }

    for pixel in image.pixels_mut() {
        if is_white(pixel) {
            pixel.0[3] = 0;
        }
    }
    true
}
