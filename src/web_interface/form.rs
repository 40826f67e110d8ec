use std::collections::HashMap;

use futures_util::StreamExt;
use warp::multipart::FormData;
use warp::Buf;

use crate::imaging::ImageInput;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A multipart body split into text fields and file parts.
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    fields: HashMap<String, String>,
    files: HashMap<String, Vec<UploadedFile>>,
}

impl FormFields {
    pub fn insert_text(&mut self, name: &str, value: String) {
        self.fields.insert(name.to_string(), value);
    }

    /// Empty file parts (an untouched file input) are dropped.
    pub fn insert_file(&mut self, name: &str, file: UploadedFile) {
        if file.bytes.is_empty() && file.filename.as_deref().map_or(true, str::is_empty) {
            return;
        }
        self.files.entry(name.to_string()).or_default().push(file);
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The field value, empty when absent.
    pub fn string(&self, name: &str) -> String {
        self.text(name).unwrap_or_default().to_string()
    }

    /// Trimmed field value, `None` when absent or blank.
    pub fn non_empty(&self, name: &str) -> Option<String> {
        self.text(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn to_input(file: &UploadedFile) -> ImageInput {
        ImageInput::upload(file.bytes.clone(), file.filename.as_deref(), file.content_type.as_deref())
    }

    /// The first file of `file_field`, else a `data:` URL sent in `data_field`.
    pub fn image(&self, file_field: &str, data_field: Option<&str>) -> Option<ImageInput> {
        if let Some(file) = self.files.get(file_field).and_then(|files| files.first()) {
            return Some(Self::to_input(file));
        }
        data_field
            .and_then(|field| self.non_empty(field))
            .map(ImageInput::DataUrl)
    }

    /// Every file sent under `name`, in order.
    pub fn images(&self, name: &str) -> Vec<ImageInput> {
        self.files
            .get(name)
            .map(|files| files.iter().map(Self::to_input).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn with_text(mut self, name: &str, value: &str) -> Self {
        self.insert_text(name, value.to_string());
        self
    }

    #[cfg(test)]
    pub fn with_file(mut self, name: &str, filename: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        self.insert_file(
            name,
            UploadedFile {
                filename: Some(filename.to_string()),
                content_type: Some(content_type.to_string()),
                bytes,
            },
        );
        self
    }
}

/// Reads every part of a multipart body into memory.
pub async fn read_form(form: FormData) -> Result<FormFields, warp::Error> {
    let mut fields = FormFields::default();
    let mut form = Box::pin(form);
    while let Some(part) = form.next().await {
        let part = part?;
        let name = part.name().to_string();
        let filename = part.filename().map(str::to_string);
        let content_type = part.content_type().map(str::to_string);

        let mut bytes = Vec::new();
        let mut stream = Box::pin(part.stream());
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            bytes.extend_from_slice(chunk.chunk());
        }

        match filename {
            Some(_) => fields.insert_file(
                &name,
                UploadedFile {
                    filename,
                    content_type,
                    bytes,
                },
            ),
            None => fields.insert_text(&name, String::from_utf8_lossy(&bytes).into_owned()),
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_inputs_are_ignored() {
        let fields = FormFields::default().with_file("rough_image", "", "application/octet-stream", Vec::new());
        assert!(fields.image("rough_image", None).is_none());
    }

    #[test]
    fn test_file_wins_over_data_url() {
        let fields = FormFields::default()
            .with_text("edit_base_data", "data:image/png;base64,AAAA")
            .with_file("edit_base_image", "base.png", "image/png", vec![1, 2, 3]);
        assert_eq!(
            fields.image("edit_base_image", Some("edit_base_data")),
            Some(ImageInput::upload(vec![1, 2, 3], Some("base.png"), Some("image/png")))
        );

        let fields = FormFields::default().with_text("edit_mask_data", " data:image/png;base64,AAAA ");
        assert_eq!(
            fields.image("edit_mask_image", Some("edit_mask_data")),
            Some(ImageInput::DataUrl("data:image/png;base64,AAAA".into()))
        );
    }

    #[test]
    fn test_text_accessors() {
        let fields = FormFields::default().with_text("message", "  hi ").with_text("blank", "  ");
        assert_eq!(fields.text("message"), Some("  hi "));
        assert_eq!(fields.non_empty("message").as_deref(), Some("hi"));
        assert_eq!(fields.non_empty("blank"), None);
        assert_eq!(fields.string("missing"), "");
    }

    #[test]
    fn test_multiple_images_keep_order() {
        let fields = FormFields::default()
            .with_file("images", "a.png", "image/png", vec![1])
            .with_file("images", "b.png", "image/png", vec![2]);
        assert_eq!(fields.images("images").len(), 2);
        assert!(fields.images("other").is_empty());
    }
}
