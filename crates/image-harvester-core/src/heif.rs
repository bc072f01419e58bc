//! HEIC and AVIF sources, decoded through libheif.
//!
//! Both formats live in an ISO-BMFF container that `image` cannot read, so
//! they are recognized by their `ftyp` brand and handed to libheif instead.

use image::{DynamicImage, RgbaImage};
use libheif_rs::{ColorSpace, HeifContext, RgbChroma};
use log::debug;

use crate::error::{Error, Result};
use crate::types::Dimensions;

/// `ftyp` brands of still HEIF images
const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1", b"avif", b"avis",
];

fn is_heif_brand(brand: &[u8]) -> bool {
    HEIF_BRANDS.iter().any(|b| &b[..] == brand)
}

/// Whether `bytes` open with an `ftyp` box naming a HEIF brand
pub fn is_heif(bytes: &[u8]) -> bool {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return false;
    }
    if is_heif_brand(&bytes[8..12]) {
        return true;
    }

    // Compatible brands follow the major brand and minor version
    let box_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let end = box_len.min(bytes.len());
    end > 16 && bytes[16..end].chunks_exact(4).any(is_heif_brand)
}

fn heif_error(step: &str, e: impl std::fmt::Display) -> Error {
    Error::Decode(format!("HEIF {}: {}", step, e))
}

/// Decode the primary image of a HEIF container
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let ctx = HeifContext::read_from_bytes(bytes).map_err(|e| heif_error("read failed", e))?;
    let handle = ctx
        .primary_image_handle()
        .map_err(|e| heif_error("has no primary image", e))?;
    let decoded = handle
        .decode(ColorSpace::Rgb(RgbChroma::Rgba), None)
        .map_err(|e| heif_error("decode failed", e))?;

    let width = decoded.width();
    let height = decoded.height();
    let plane = decoded
        .planes()
        .interleaved
        .ok_or_else(|| heif_error("decode failed", "no interleaved plane"))?;

    // Rows may be padded past width * 4
    let row = width as usize * 4;
    let mut pixels = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * plane.stride;
        let line = plane
            .data
            .get(start..start + row)
            .ok_or_else(|| heif_error("decode failed", "plane shorter than image"))?;
        pixels.extend_from_slice(line);
    }

    let rgba = RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| heif_error("decode failed", "pixel buffer size mismatch"))?;
    debug!("Decoded {}x{} HEIF source", width, height);
    Ok(DynamicImage::ImageRgba8(rgba))
}

/// Size of the primary image without decoding it
pub fn dimensions(bytes: &[u8]) -> Option<Dimensions> {
    let ctx = HeifContext::read_from_bytes(bytes).ok()?;
    let handle = ctx.primary_image_handle().ok()?;
    Some(Dimensions::new(handle.width(), handle.height()))
}
