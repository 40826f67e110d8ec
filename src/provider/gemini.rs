use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, error, warn};
use reqwest::blocking::Client as HttpClient;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};

use super::image_api::{ContentPart, GeneratedImage, ImageApi, ImageOptions};
use crate::configuration::config::ProviderConfig;
use crate::error_handling::types::ProviderError;

const ERROR_BODY_CHARS: usize = 512;
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini `generateContent` REST client.
pub struct GeminiClient {
    api_base: String,
    image_model: String,
    text_model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            api_base: config.api_base.trim().trim_end_matches('/').to_string(),
            image_model: config.image_model.clone(),
            text_model: config.text_model.clone(),
            api_key: config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{}", trimmed)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        match self.api_key.as_deref() {
            Some(key) => Ok(key),
            None => {
                error!("Gemini API key is not configured");
                Err(ProviderError::MissingApiKey)
            }
        }
    }

    fn post(&self, model: &str, payload: &Value) -> Result<Value, ProviderError> {
        let api_key = self.api_key()?;
        let endpoint = self.endpoint_for_model(model);
        // Built per call: the blocking client must not live on an async worker.
        let client = HttpClient::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::Request(format!("HTTP client setup failed: {}", e)))?;
        debug!("POST {}", endpoint);
        // The key travels in a header so it never shows up in a URL or an error text.
        let response = client
            .post(&endpoint)
            .header(API_KEY_HEADER, api_key)
            .json(payload)
            .send()
            .map_err(|e| ProviderError::Request(format!("Gemini request failed ({}): {}", endpoint, e.without_url())))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ProviderError::Request(format!("Gemini response body read failed: {}", e.without_url())))?;
        classify_status(status, &body)?;
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("Gemini returned invalid JSON: {}", e)))
    }
}

/// 503 and 429 mean "try again later"; other failures are plain request errors.
pub fn classify_status(status: StatusCode, body: &str) -> Result<(), ProviderError> {
    if status.is_success() {
        return Ok(());
    }
    let detail = format!(
        "Gemini request failed ({}): {}",
        status.as_u16(),
        truncate_text(body, ERROR_BODY_CHARS)
    );
    if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::TOO_MANY_REQUESTS {
        warn!("{}", detail);
        return Err(ProviderError::Overloaded(detail));
    }
    Err(ProviderError::Request(detail))
}

pub fn build_parts(parts: &[ContentPart]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({ "text": text }),
            ContentPart::Image { mime_type, data } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": BASE64.encode(data),
                }
            }),
        })
        .collect()
}

pub fn build_image_payload(parts: &[ContentPart], options: &ImageOptions) -> Value {
    let mut generation_config = Map::new();
    generation_config.insert("responseModalities".to_string(), json!(["IMAGE"]));
    let mut image_config = Map::new();
    if let Some(aspect_ratio) = &options.aspect_ratio {
        image_config.insert("aspectRatio".to_string(), json!(aspect_ratio));
    }
    if let Some(size) = options.image_size {
        image_config.insert("imageSize".to_string(), json!(size.as_str()));
    }
    if !image_config.is_empty() {
        generation_config.insert("imageConfig".to_string(), Value::Object(image_config));
    }
    json!({
        "contents": [{ "role": "user", "parts": build_parts(parts) }],
        "generationConfig": Value::Object(generation_config),
    })
}

fn candidate_parts(response: &Value) -> Vec<Value> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.get("content")?.get("parts")?.as_array())
        .flatten()
        .cloned()
        .collect()
}

/// First inline image of the response.
pub fn extract_image(response: &Value) -> Result<GeneratedImage, ProviderError> {
    for part in candidate_parts(response) {
        let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
            continue;
        };
        let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .map_err(|e| ProviderError::InvalidResponse(format!("Gemini image base64 decode failed: {}", e)))?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png")
            .to_string();
        return Ok(GeneratedImage { bytes, mime_type });
    }
    Err(ProviderError::InvalidResponse(format!(
        "The API response contains no image data: {}",
        truncate_text(&response.to_string(), ERROR_BODY_CHARS)
    )))
}

/// Concatenated text parts of the response.
pub fn extract_text(response: &Value) -> Result<String, ProviderError> {
    let text: Vec<String> = candidate_parts(response)
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    let joined = text.join("").trim().to_string();
    if joined.is_empty() {
        return Err(ProviderError::InvalidResponse("The API response contains no text".into()));
    }
    Ok(joined)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

impl ImageApi for GeminiClient {
    fn image_model(&self) -> &str {
        &self.image_model
    }

    fn text_model(&self) -> &str {
        &self.text_model
    }

    fn generate_image(&self, parts: &[ContentPart], options: &ImageOptions) -> Result<GeneratedImage, ProviderError> {
        let payload = build_image_payload(parts, options);
        let response = self.post(&self.image_model, &payload)?;
        extract_image(&response)
    }

    fn generate_multimodal_text(&self, parts: &[ContentPart]) -> Result<String, ProviderError> {
        let payload = json!({ "contents": [{ "role": "user", "parts": build_parts(parts) }] });
        let response = self.post(&self.text_model, &payload)?;
        extract_text(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::GenerationError;
    use crate::provider::image_api::ImageSize;

    fn client(api_key: Option<&str>) -> GeminiClient {
        GeminiClient::new(&ProviderConfig {
            api_key: api_key.map(str::to_string),
            ..ProviderConfig::default()
        })
    }

    #[test]
    fn test_endpoint_for_model() {
        let c = client(Some("k"));
        assert!(c.endpoint_for_model("gemini-2.5-flash-image").ends_with("/models/gemini-2.5-flash-image:generateContent"));
        assert!(c.endpoint_for_model("models/x").ends_with("/models/x:generateContent"));
    }

    #[test]
    fn test_missing_key_fails_before_any_request() {
        let err = client(Some("   ")).generate_text("hi").unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey));
    }

    #[test]
    fn test_transport_error_never_carries_the_key() {
        let c = GeminiClient::new(&ProviderConfig {
            api_base: "http://127.0.0.1:1/v1beta".into(),
            api_key: Some("SECRETKEY123".into()),
            timeout_secs: 2,
            ..ProviderConfig::default()
        });
        let err = c
            .generate_image(&[ContentPart::text("hi")], &ImageOptions::default())
            .unwrap_err();
        assert!(matches!(err, ProviderError::Request(_)));
        assert!(!err.to_string().contains("SECRETKEY123"));
        let detail = GenerationError::from(err).full_detail();
        assert!(!detail.contains("SECRETKEY123"));
    }

    #[test]
    fn test_payload_layout() {
        let parts = vec![ContentPart::text("intro"), ContentPart::image("image/png", vec![1, 2, 3])];
        let options = ImageOptions {
            aspect_ratio: Some("16:9".into()),
            image_size: Some(ImageSize::TwoK),
        };
        let payload = build_image_payload(&parts, &options);
        let sent = &payload["contents"][0]["parts"];
        assert_eq!(sent[0]["text"], json!("intro"));
        assert_eq!(sent[1]["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(sent[1]["inlineData"]["data"], json!("AQID"));
        assert_eq!(payload["generationConfig"]["responseModalities"], json!(["IMAGE"]));
        assert_eq!(payload["generationConfig"]["imageConfig"]["aspectRatio"], json!("16:9"));
        assert_eq!(payload["generationConfig"]["imageConfig"]["imageSize"], json!("2K"));

        let defaults = build_image_payload(&parts, &ImageOptions::default());
        assert!(defaults["generationConfig"].get("imageConfig").is_none());
    }

    #[test]
    fn test_extract_image_accepts_both_spellings() {
        let camel = json!({"candidates": [{"content": {"parts": [
            {"text": "here you go"},
            {"inlineData": {"mimeType": "image/jpeg", "data": "AQID"}}
        ]}}]});
        let image = extract_image(&camel).unwrap();
        assert_eq!(image.bytes, vec![1, 2, 3]);
        assert_eq!(image.mime_type, "image/jpeg");

        let snake = json!({"candidates": [{"content": {"parts": [{"inline_data": {"data": "AQID"}}]}}]});
        assert_eq!(extract_image(&snake).unwrap().mime_type, "image/png");

        let none = json!({"candidates": [{"content": {"parts": [{"text": "sorry"}]}}]});
        assert!(matches!(extract_image(&none), Err(ProviderError::InvalidResponse(_))));
    }

    #[test]
    fn test_extract_text() {
        let response = json!({"candidates": [{"content": {"parts": [{"text": "Hello "}, {"text": "there"}]}}]});
        assert_eq!(extract_text(&response).unwrap(), "Hello there");
        assert!(extract_text(&json!({})).is_err());
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::OK, "").is_ok());
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            Err(ProviderError::Overloaded(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            Err(ProviderError::Overloaded(_))
        ));
        match classify_status(StatusCode::BAD_REQUEST, &"x".repeat(2000)) {
            Err(ProviderError::Request(detail)) => assert!(detail.chars().count() < 600),
            other => panic!("unexpected {:?}", other),
        }
    }
}
