use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage};

use crate::error_handling::types::GenerationError;

/// Converts to RGB, blending any alpha channel over an opaque white background.
pub fn composite_on_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

pub fn to_mask(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, GenerationError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| GenerationError::internal(format!("PNG encoding failed: {}", e)))?;
    Ok(buf)
}

pub fn extension_for_mime_type(mime_type: &str) -> &'static str {
    match super::validator::normalize_mime(mime_type).as_str() {
        "image/jpeg" => ".jpg",
        _ => ".png",
    }
}

/// Width and height of an encoded image, `None` when it cannot be read.
pub fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
