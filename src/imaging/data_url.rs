use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error_handling::types::GenerationError;

/// Bytes and declared MIME type carried by a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Parses `data:<mime>[;params];base64,<payload>`.
///
/// Only base64 payloads are accepted; the MIME type is the first header field and is
/// validated later by the image decoder.
pub fn parse_data_url(data_url: &str, label: &str) -> Result<DataUrl, GenerationError> {
    let data_url = data_url.trim();
    if data_url.is_empty() {
        return Err(GenerationError::validation(format!("{} was not provided.", label)));
    }
    let invalid = || GenerationError::validation(format!("{} has an invalid format.", label));

    let (header, payload) = data_url.split_once(',').ok_or_else(invalid)?;
    let header = header.strip_prefix("data:").ok_or_else(invalid)?;
    let mut fields = header.split(';');
    let mime_type = fields.next().unwrap_or_default().trim().to_string();
    if !fields.any(|f| f.trim().eq_ignore_ascii_case("base64")) {
        return Err(invalid());
    }
    let bytes = BASE64.decode(payload.trim()).map_err(|_| invalid())?;
    Ok(DataUrl { mime_type, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_base64_payload() {
        let parsed = parse_data_url("data:image/png;base64,aGVsbG8=", "Mask").unwrap();
        assert_eq!(parsed.mime_type, "image/png");
        assert_eq!(parsed.bytes, b"hello");
    }

    #[test]
    fn test_extra_parameters_are_allowed() {
        let parsed = parse_data_url("data:image/jpeg;name=a.jpg;BASE64,aGk=", "Base").unwrap();
        assert_eq!(parsed.mime_type, "image/jpeg");
        assert_eq!(parsed.bytes, b"hi");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(parse_data_url("  ", "Mask").unwrap_err().message, "Mask was not provided.");
        for bad in [
            "data:image/png;base64aGVsbG8=",
            "image/png;base64,aGVsbG8=",
            "data:image/png,aGVsbG8=",
            "data:image/png;base64,@@@",
        ] {
            assert_eq!(
                parse_data_url(bad, "Mask").unwrap_err().message,
                "Mask has an invalid format.",
                "{}",
                bad
            );
        }
    }
}
