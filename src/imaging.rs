//! Image validation and decoding
//!
//! Every image that enters the application, as a multipart upload or as a `data:` URL,
//! goes through `validator::decode_image_bytes` before anything else touches it.
//!
//! Components:
//! - `validator`: format/extension/MIME agreement and size limits.
//! - `data_url`: `data:` URL parsing.
//! - `convert`: canonical color modes and re-encoding.
//! - `input`: request-side image representation.

pub mod convert;
pub mod data_url;
pub mod input;
pub mod validator;

pub use convert::{encode_png, extension_for_mime_type};
pub use input::{require_image, ImageInput};
pub use validator::{decode_image_bytes, ColorMode, DecodedImage, ImageKind};
