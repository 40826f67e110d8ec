//! External generative API
//!
//! `image_api` defines the blocking [`ImageApi`] seam the orchestrators depend on;
//! `gemini` is the production implementation over the Gemini REST API.

pub mod gemini;
pub mod image_api;

pub use gemini::GeminiClient;
pub use image_api::{ContentPart, GeneratedImage, ImageApi, ImageOptions, ImageSize};
