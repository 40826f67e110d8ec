use super::data_url::parse_data_url;
use super::validator::{decode_image_bytes, ColorMode, DecodedImage};
use crate::configuration::ImageLimits;
use crate::error_handling::types::GenerationError;

/// An image as it arrives in a request, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Multipart file part.
    Upload {
        bytes: Vec<u8>,
        filename: Option<String>,
        content_type: Option<String>,
    },
    /// `data:` URL sent as a form field (canvas editors).
    DataUrl(String),
}

impl ImageInput {
    pub fn upload(bytes: Vec<u8>, filename: Option<&str>, content_type: Option<&str>) -> Self {
        ImageInput::Upload {
            bytes,
            filename: filename.map(str::to_string),
            content_type: content_type.map(str::to_string),
        }
    }

    pub fn decode(&self, label: &str, limits: &ImageLimits, mode: ColorMode) -> Result<DecodedImage, GenerationError> {
        match self {
            ImageInput::Upload {
                bytes,
                filename,
                content_type,
            } => decode_image_bytes(bytes, filename.as_deref(), content_type.as_deref(), label, limits, mode),
            ImageInput::DataUrl(data_url) => {
                let parsed = parse_data_url(data_url, label)?;
                decode_image_bytes(&parsed.bytes, None, Some(&parsed.mime_type), label, limits, mode)
            }
        }
    }
}

/// Decodes a required input, reporting `missing` when it is absent.
pub fn require_image(
    input: Option<&ImageInput>,
    label: &str,
    missing: &str,
    limits: &ImageLimits,
    mode: ColorMode,
) -> Result<DecodedImage, GenerationError> {
    match input {
        Some(input) => input.decode(label, limits, mode),
        None => Err(GenerationError::validation(missing)),
    }
}
