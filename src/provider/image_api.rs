use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error_handling::types::ProviderError;

/// One element of a multimodal request, in the order the model should read them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image { mime_type: String, data: Vec<u8> },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text(text.into())
    }

    pub fn image(mime_type: &str, data: Vec<u8>) -> Self {
        ContentPart::Image {
            mime_type: mime_type.to_string(),
            data,
        }
    }
}

/// Output resolution buckets understood by the image model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    OneK,
    TwoK,
    FourK,
}

impl ImageSize {
    /// `None` for `auto`, blanks and anything outside the three buckets.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "1K" => Some(ImageSize::OneK),
            "2K" => Some(ImageSize::TwoK),
            "4K" => Some(ImageSize::FourK),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn aspect_ratio_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{1,3}:\d{1,3}$").expect("static regex"))
}

/// `W:H` ratio for the API, `None` for `auto`, blanks and malformed values.
pub fn normalize_aspect_ratio(label: &str) -> Option<String> {
    let trimmed = label.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
        return None;
    }
    aspect_ratio_pattern().is_match(trimmed).then(|| trimmed.to_string())
}

/// Size hints attached to an image request. Empty means provider defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageOptions {
    pub aspect_ratio: Option<String>,
    pub image_size: Option<ImageSize>,
}

impl ImageOptions {
    pub fn from_labels(aspect_ratio: Option<&str>, resolution: Option<&str>) -> Self {
        Self {
            aspect_ratio: aspect_ratio.and_then(normalize_aspect_ratio),
            image_size: resolution.and_then(ImageSize::parse),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Blocking client for the external generative API.
///
/// Implementations are called from the blocking thread pool only.
pub trait ImageApi: Send + Sync {
    fn image_model(&self) -> &str;

    fn text_model(&self) -> &str;

    fn generate_image(&self, parts: &[ContentPart], options: &ImageOptions) -> Result<GeneratedImage, ProviderError>;

    fn generate_text(&self, prompt: &str) -> Result<String, ProviderError> {
        self.generate_multimodal_text(&[ContentPart::text(prompt)])
    }

    fn generate_multimodal_text(&self, parts: &[ContentPart]) -> Result<String, ProviderError>;
}
