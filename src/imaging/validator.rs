use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageError, ImageFormat, ImageReader, Limits};
use log::{debug, warn};

use super::convert::{composite_on_white, to_mask};
use crate::configuration::ImageLimits;
use crate::error_handling::types::GenerationError;

pub const ALLOWED_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".jpeg"];

/// The only two formats accepted anywhere in the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Png => ".png",
            ImageKind::Jpeg => ".jpg",
        }
    }

    /// Accepts a raw header value such as `image/JPG; charset=binary`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match normalize_mime(mime).as_str() {
            "image/png" => Some(ImageKind::Png),
            "image/jpeg" => Some(ImageKind::Jpeg),
            _ => None,
        }
    }

    /// Accepts `.png`, `.jpg`, `.jpeg`, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            ".png" => Some(ImageKind::Png),
            ".jpg" | ".jpeg" => Some(ImageKind::Jpeg),
            _ => None,
        }
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            _ => None,
        }
    }

    fn format(&self) -> ImageFormat {
        match self {
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Canonical pixel layout requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Keep whatever the file decoded to.
    Original,
    /// Three channels; transparent pixels are composited onto white.
    Rgb,
    /// Single grayscale channel.
    Mask,
}

/// A validated image together with the bytes it came from.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
    pub kind: ImageKind,
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    pub fn mime_type(&self) -> &'static str {
        self.kind.mime_type()
    }

    pub fn extension(&self) -> &'static str {
        self.kind.extension()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Splits off parameters, trims, lowercases and maps `image/jpg` to `image/jpeg`.
pub fn normalize_mime(mime: &str) -> String {
    let base = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if base == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        base
    }
}

/// Lowercased extension with its leading dot, `None` when the name has none.
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

fn unsupported(label: &str) -> GenerationError {
    GenerationError::validation(format!(
        "{} could not be read. Only PNG and JPEG images are supported.",
        label
    ))
}

fn limit_text(value: u32) -> String {
    if value == 0 {
        "unlimited".to_string()
    } else {
        format!("{}px", value)
    }
}

fn dimension_error(label: &str, limits: &ImageLimits) -> GenerationError {
    GenerationError::validation(format!(
        "{} size exceeds the limit: max width {}, max height {}.",
        label,
        limit_text(limits.max_width),
        limit_text(limits.max_height)
    ))
}

fn pixel_error(label: &str, limits: &ImageLimits) -> GenerationError {
    GenerationError::validation(format!(
        "{} pixel count exceeds the limit ({} pixels).",
        label, limits.max_pixels
    ))
}

fn decoder_limits(limits: &ImageLimits) -> Limits {
    let mut decoder = Limits::default();
    if limits.max_width > 0 {
        decoder.max_image_width = Some(limits.max_width);
    }
    if limits.max_height > 0 {
        decoder.max_image_height = Some(limits.max_height);
    }
    if limits.max_pixels > 0 {
        // 8 bytes covers 16-bit RGBA, the widest PNG/JPEG layout
        decoder.max_alloc = Some(limits.max_pixels.saturating_mul(8));
    }
    decoder
}

/// Decodes under the allocation `guard`; a tripped guard reports the pixel-count message.
fn decode_guarded(
    bytes: &[u8],
    kind: ImageKind,
    label: &str,
    limits: &ImageLimits,
    guard: Limits,
) -> Result<DynamicImage, GenerationError> {
    let mut reader = ImageReader::with_format(Cursor::new(bytes), kind.format());
    reader.limits(guard);
    reader.decode().map_err(|e| match e {
        ImageError::Limits(limit) => {
            warn!("Decoder guard rejected {}: {}", label, limit);
            pixel_error(label, limits)
        }
        other => {
            debug!("Decoding {} failed: {}", label, other);
            unsupported(label)
        }
    })
}

/// Validates and decodes raw image bytes.
///
/// Checks run in a fixed order and stop at the first failure: emptiness, extension,
/// declared MIME type, extension/MIME agreement, sniffed content format, dimensions and
/// finally pixel count. The pixel limit is enforced twice, by an explicit check and by the
/// decoder's allocation guard; both report the same message.
pub fn decode_image_bytes(
    bytes: &[u8],
    filename: Option<&str>,
    declared_mime: Option<&str>,
    label: &str,
    limits: &ImageLimits,
    mode: ColorMode,
) -> Result<DecodedImage, GenerationError> {
    if bytes.is_empty() {
        return Err(GenerationError::validation(format!("{} is empty.", label)));
    }

    let ext_kind = match filename.map(str::trim).filter(|f| !f.is_empty()) {
        Some(name) => {
            let kind = file_extension(name).and_then(|ext| ImageKind::from_extension(&ext));
            match kind {
                Some(kind) => Some(kind),
                None => {
                    return Err(GenerationError::validation(format!(
                        "{} must have one of the extensions {}.",
                        label,
                        ALLOWED_EXTENSIONS.join(", ")
                    )))
                }
            }
        }
        None => None,
    };

    let mime_kind = match declared_mime.map(normalize_mime).filter(|m| !m.is_empty()) {
        Some(mime) => match ImageKind::from_mime(&mime) {
            Some(kind) => Some(kind),
            None => {
                return Err(GenerationError::validation(format!(
                    "{} must be a PNG or JPEG image (got {}).",
                    label, mime
                )))
            }
        },
        None => None,
    };

    if let (Some(ext), Some(mime)) = (ext_kind, mime_kind) {
        if ext != mime {
            return Err(GenerationError::validation(format!(
                "{}: MIME type and extension do not match.",
                label
            )));
        }
    }

    let actual = image::guess_format(bytes)
        .ok()
        .and_then(ImageKind::from_format)
        .ok_or_else(|| unsupported(label))?;
    if mime_kind.is_some_and(|k| k != actual) {
        return Err(GenerationError::validation(format!(
            "{}: MIME type does not match the image content.",
            label
        )));
    }
    if ext_kind.is_some_and(|k| k != actual) {
        return Err(GenerationError::validation(format!(
            "{}: extension does not match the image content.",
            label
        )));
    }

    let (width, height) = ImageReader::with_format(Cursor::new(bytes), actual.format())
        .into_dimensions()
        .map_err(|e| {
            debug!("Reading dimensions of {} failed: {}", label, e);
            unsupported(label)
        })?;
    if (limits.max_width > 0 && width > limits.max_width)
        || (limits.max_height > 0 && height > limits.max_height)
    {
        return Err(dimension_error(label, limits));
    }
    if limits.max_pixels > 0 && u64::from(width) * u64::from(height) > limits.max_pixels {
        return Err(pixel_error(label, limits));
    }

    let image = decode_guarded(bytes, actual, label, limits, decoder_limits(limits))?;

    let image = match mode {
        ColorMode::Original => image,
        ColorMode::Rgb => DynamicImage::ImageRgb8(composite_on_white(&image)),
        ColorMode::Mask => DynamicImage::ImageLuma8(to_mask(&image)),
    };

    Ok(DecodedImage {
        width: image.width(),
        height: image.height(),
        image,
        kind: actual,
        bytes: bytes.to_vec(),
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    pub fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 255]));
        let mut buf = Vec::new();
        let dynamic = image::DynamicImage::ImageRgba8(img);
        let dynamic = if format == ImageFormat::Jpeg {
            image::DynamicImage::ImageRgb8(dynamic.to_rgb8())
        } else {
            dynamic
        };
        dynamic.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    pub fn png(width: u32, height: u32) -> Vec<u8> {
        encoded(width, height, ImageFormat::Png)
    }

    pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
        encoded(width, height, ImageFormat::Jpeg)
    }

    /// Fully transparent RGBA PNG.
    pub fn transparent_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{jpeg, png};
    use super::*;
    use crate::error_handling::types::GenerationErrorKind;

    fn limits() -> ImageLimits {
        ImageLimits {
            max_width: 64,
            max_height: 64,
            max_pixels: 2048,
        }
    }

    fn decode(bytes: &[u8], name: Option<&str>, mime: Option<&str>) -> Result<DecodedImage, GenerationError> {
        decode_image_bytes(bytes, name, mime, "Rough image", &limits(), ColorMode::Rgb)
    }

    #[test]
    fn test_matching_triples_decode() {
        let png_bytes = png(4, 4);
        let jpeg_bytes = jpeg(4, 4);
        assert_eq!(decode(&png_bytes, Some("a.png"), Some("image/png")).unwrap().kind, ImageKind::Png);
        assert_eq!(decode(&png_bytes, Some("A.PNG"), Some("IMAGE/PNG; q=1")).unwrap().dimensions(), (4, 4));
        for (name, mime) in [("a.jpg", "image/jpeg"), ("a.jpeg", "image/jpg"), ("a.JPG", "image/jpeg")] {
            let decoded = decode(&jpeg_bytes, Some(name), Some(mime)).unwrap();
            assert_eq!(decoded.kind, ImageKind::Jpeg);
            assert_eq!(decoded.mime_type(), "image/jpeg");
        }
        assert!(decode(&png_bytes, None, None).is_ok());
    }

    #[test]
    fn test_mismatches_are_validation_errors() {
        let png_bytes = png(4, 4);
        let cases = [
            (Some("a.png"), Some("image/jpeg"), "MIME type and extension do not match"),
            (Some("a.jpg"), Some("image/jpeg"), "MIME type does not match the image content"),
            (Some("a.jpg"), None, "extension does not match the image content"),
            (None, Some("image/jpeg"), "MIME type does not match the image content"),
            (Some("a.gif"), Some("image/png"), "must have one of the extensions"),
            (Some("noext"), Some("image/png"), "must have one of the extensions"),
            (Some("a.png"), Some("image/gif"), "must be a PNG or JPEG image"),
        ];
        for (name, mime, expected) in cases {
            let err = decode(&png_bytes, name, mime).unwrap_err();
            assert_eq!(err.kind, GenerationErrorKind::Validation);
            assert!(err.message.contains(expected), "{:?}/{:?}: {}", name, mime, err.message);
        }
    }

    #[test]
    fn test_empty_and_garbage() {
        assert_eq!(decode(b"", Some("a.png"), None).unwrap_err().message, "Rough image is empty.");
        let err = decode(b"GIF89a not really", None, None).unwrap_err();
        assert!(err.message.contains("Only PNG and JPEG"));
    }

    #[test]
    fn test_dimension_and_pixel_limits() {
        let wide = decode(&png(65, 1), None, None).unwrap_err();
        assert_eq!(
            wide.message,
            "Rough image size exceeds the limit: max width 64px, max height 64px."
        );
        assert!(decode(&png(1, 65), None, None).is_err());
        let many = decode(&png(64, 33), None, None).unwrap_err();
        assert_eq!(many.message, "Rough image pixel count exceeds the limit (2048 pixels).");
        assert!(decode(&png(64, 32), None, None).is_ok());
    }

    #[test]
    fn test_decoder_guard_uses_pixel_message() {
        // The explicit checks are disabled, only the allocation guard is left.
        let mut guard = Limits::default();
        guard.max_alloc = Some(16);
        let mut reader = ImageReader::with_format(Cursor::new(png(32, 32)), ImageFormat::Png);
        reader.limits(guard);
        assert!(matches!(reader.decode(), Err(ImageError::Limits(_))));

        let limits = ImageLimits {
            max_width: 0,
            max_height: 0,
            max_pixels: 2,
        };
        assert!(decode_image_bytes(&png(2, 1), None, None, "Mask", &limits, ColorMode::Mask).is_ok());
        let err = decode_image_bytes(&png(3, 1), None, None, "Mask", &limits, ColorMode::Mask).unwrap_err();
        assert_eq!(err.message, "Mask pixel count exceeds the limit (2 pixels).");
    }

    #[test]
    fn test_guard_and_explicit_check_share_the_message() {
        let limits = ImageLimits {
            max_width: 0,
            max_height: 0,
            max_pixels: 16,
        };
        let explicit = decode_image_bytes(&png(8, 8), None, None, "Rough image", &limits, ColorMode::Rgb).unwrap_err();

        // A 4x4 image passes the explicit check; a guard tighter than its buffer trips instead.
        let bytes = png(4, 4);
        assert!(decode_image_bytes(&bytes, None, None, "Rough image", &limits, ColorMode::Rgb).is_ok());
        let mut tight = decoder_limits(&limits);
        tight.max_alloc = Some(8);
        let guarded = decode_guarded(&bytes, ImageKind::Png, "Rough image", &limits, tight).unwrap_err();

        assert_eq!(guarded.kind, explicit.kind);
        assert_eq!(guarded.message, explicit.message);
        assert_eq!(guarded.message, "Rough image pixel count exceeds the limit (16 pixels).");
    }

    #[test]
    fn test_zero_limits_disable_checks() {
        let decoded = decode_image_bytes(
            &png(100, 100),
            Some("big.png"),
            None,
            "Image",
            &ImageLimits::unlimited(),
            ColorMode::Original,
        )
        .unwrap();
        assert_eq!(decoded.dimensions(), (100, 100));
    }

    #[test]
    fn test_color_modes() {
        let rgb = decode(&png(2, 2), None, None).unwrap();
        assert!(matches!(rgb.image, DynamicImage::ImageRgb8(_)));
        let mask = decode_image_bytes(&png(2, 2), None, None, "Mask", &limits(), ColorMode::Mask).unwrap();
        assert!(matches!(mask.image, DynamicImage::ImageLuma8(_)));
    }
}
