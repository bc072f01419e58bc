mod common;

use common::{product_on_white, solid_avif, solid_image, solid_png};
use image::{GenericImageView, ImageOutputFormat};
use image_harvester_core::render::Renderer;

fn close(pixel: [u8; 4], expected: [u8; 3]) -> bool {
    pixel[..3]
        .iter()
        .zip(expected.iter())
        .all(|(a, b)| (*a as i16 - *b as i16).abs() <= 12)
}

#[test]
fn test_landscape_source_is_centered_in_safe_box() {
    let renderer = Renderer::default();
    let asset = renderer
        .render(&solid_png(2000, 1000, [220, 0, 0]), false)
        .unwrap();

    let out = image::load_from_memory(&asset.bytes).unwrap();
    assert_eq!(out.dimensions(), (1000, 1000));

    // 618x309 at (191, 345)
    assert!(close(out.get_pixel(500, 500).0, [220, 0, 0]));
    assert!(close(out.get_pixel(500, 360).0, [220, 0, 0]));
    assert!(close(out.get_pixel(500, 630).0, [220, 0, 0]));
    assert!(close(out.get_pixel(500, 335).0, [255, 255, 255]));
    assert!(close(out.get_pixel(500, 665).0, [255, 255, 255]));
    assert!(close(out.get_pixel(195, 500).0, [220, 0, 0]));
    assert!(close(out.get_pixel(170, 500).0, [255, 255, 255]));
    assert!(close(out.get_pixel(820, 500).0, [255, 255, 255]));
}

#[test]
fn test_render_is_deterministic() {
    let renderer = Renderer::default();
    let source = product_on_white(900, 700);
    let a = renderer.render(&source, true).unwrap();
    let b = renderer.render(&source, true).unwrap();
    assert_eq!(a.content_hash, b.content_hash);
    assert_eq!(a.bytes, b.bytes);
    assert_eq!(a.content_hash.len(), 64);
}

#[test]
fn test_same_picture_in_different_containers_renders_alike() {
    let renderer = Renderer::default();
    let png = renderer
        .render(&solid_image(300, 300, [30, 60, 90], ImageOutputFormat::Png), false)
        .unwrap();
    let tiff = renderer
        .render(&solid_image(300, 300, [30, 60, 90], ImageOutputFormat::Tiff), false)
        .unwrap();
    assert_eq!(png.content_hash, tiff.content_hash);
}

#[test]
fn test_background_heuristic_keeps_product() {
    let renderer = Renderer::default();
    let asset = renderer.render(&product_on_white(1000, 1000), true).unwrap();
    let out = image::load_from_memory(&asset.bytes).unwrap();

    assert!(close(out.get_pixel(500, 500).0, [200, 20, 20]));
    assert!(close(out.get_pixel(10, 10).0, [255, 255, 255]));
}

#[test]
fn test_tiny_source_is_upscaled() {
    let renderer = Renderer::default();
    let asset = renderer.render(&solid_png(3, 1, [0, 0, 0]), false).unwrap();
    let out = image::load_from_memory(&asset.bytes).unwrap();
    assert_eq!(out.dimensions(), (1000, 1000));
    assert!(close(out.get_pixel(500, 500).0, [0, 0, 0]));
    assert!(close(out.get_pixel(500, 200).0, [255, 255, 255]));
}

#[test]
fn test_avif_source_renders() {
    let avif = solid_avif(400, 200, [30, 160, 40]);
    assert_eq!(&avif[4..8], b"ftyp");
    assert_eq!(
        image_harvester_core::net::dimensions_of(&avif),
        Some(image_harvester_core::Dimensions::new(400, 200))
    );

    let asset = Renderer::default().render(&avif, false).unwrap();
    let out = image::load_from_memory(&asset.bytes).unwrap();
    assert_eq!(out.dimensions(), (1000, 1000));

    // 618x309 centered: content in the middle, white above it
    let center = out.get_pixel(500, 500).0;
    assert!(center[1] > 120 && center[0] < 90 && center[2] < 90, "{center:?}");
    assert!(close(out.get_pixel(500, 100).0, [255, 255, 255]));
}
