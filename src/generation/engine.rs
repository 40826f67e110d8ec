use log::debug;
use sha2::{Digest, Sha256};

use super::modes::Mode;
use super::request::ModeInputs;
use crate::configuration::ImageLimits;
use crate::error_handling::types::GenerationError;
use crate::imaging::convert::probe_dimensions;
use crate::imaging::{encode_png, require_image, ColorMode, DecodedImage};
use crate::prompts;
use crate::provider::{ContentPart, ImageApi, ImageOptions};

/// A validated input image and the role it plays in the request.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    /// `rough`, `reference`, `base` or `mask`
    pub kind: &'static str,
    pub image: DecodedImage,
}

/// Everything needed to call the image API once.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub mode: Mode,
    pub prompt: String,
    pub parts: Vec<ContentPart>,
    pub inputs: Vec<PreparedInput>,
    pub fingerprint: String,
}

/// API output with the dimensions read back from its bytes.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// SHA-256 over the mode id, the prompt and the input image bytes, in order.
pub fn fingerprint(mode_id: &str, prompt: &str, images: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(mode_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    for image in images {
        hasher.update([0u8]);
        hasher.update(image);
    }
    hex::encode(hasher.finalize())
}

fn png_part(image: &DecodedImage) -> Result<ContentPart, GenerationError> {
    Ok(ContentPart::image("image/png", encode_png(&image.image)?))
}

/// Validates the inputs of a mode and assembles the request parts.
///
/// Fails before any external call when an image is missing, malformed, over the limits,
/// or when an edit mask does not match its base image.
pub fn prepare(inputs: &ModeInputs, limits: &ImageLimits) -> Result<PreparedCall, GenerationError> {
    let mode = inputs.mode();
    let (prompt, parts, prepared) = match inputs {
        ModeInputs::Rough {
            rough,
            color_instruction,
            pose_instruction,
        } => {
            let rough = require_image(
                rough.as_ref(),
                "Rough image",
                "Please select a rough image.",
                limits,
                ColorMode::Rgb,
            )?;
            let prompt = prompts::build_rough_prompt(color_instruction, pose_instruction);
            let parts = vec![ContentPart::text(prompt.clone()), png_part(&rough)?];
            (prompt, parts, vec![PreparedInput { kind: "rough", image: rough }])
        }
        ModeInputs::Reference {
            reference,
            rough,
            instruction,
        } => {
            let reference = require_image(
                reference.as_ref(),
                "Reference image",
                "Please select a reference image.",
                limits,
                ColorMode::Rgb,
            )?;
            let rough = require_image(
                rough.as_ref(),
                "Rough sketch",
                "Please select a rough sketch.",
                limits,
                ColorMode::Rgb,
            )?;
            let prompt = prompts::build_reference_style_prompt(instruction);
            let parts = vec![
                ContentPart::text(prompts::REFERENCE_ROUGH_INTRO),
                png_part(&rough)?,
                ContentPart::text(prompts::REFERENCE_STYLE_INTRO),
                png_part(&reference)?,
                ContentPart::text(prompt.clone()),
            ];
            let prepared = vec![
                PreparedInput {
                    kind: "reference",
                    image: reference,
                },
                PreparedInput { kind: "rough", image: rough },
            ];
            (prompt, parts, prepared)
        }
        ModeInputs::Edit {
            base,
            mask,
            edit_mode,
            instruction,
        } => {
            let base = require_image(
                base.as_ref(),
                "Base image",
                "Please select a base image.",
                limits,
                ColorMode::Rgb,
            )?;
            let mask = require_image(
                mask.as_ref(),
                "Mask image",
                "Please prepare a mask image. Draw it in the editor and apply it.",
                limits,
                ColorMode::Mask,
            )?;
            if base.dimensions() != mask.dimensions() {
                return Err(GenerationError::validation(
                    "The mask image size does not match the base image.",
                ));
            }
            let prompt = prompts::build_edit_prompt(instruction, *edit_mode);
            let parts = vec![
                ContentPart::text(prompts::EDIT_BASE_INTRO),
                png_part(&base)?,
                ContentPart::text(prompts::EDIT_MASK_INTRO),
                png_part(&mask)?,
                ContentPart::text(prompt.clone()),
            ];
            let prepared = vec![
                PreparedInput { kind: "base", image: base },
                PreparedInput { kind: "mask", image: mask },
            ];
            (prompt, parts, prepared)
        }
    };

    let images: Vec<&[u8]> = prepared.iter().map(|p| p.image.bytes.as_slice()).collect();
    let fingerprint = fingerprint(mode.id(), &prompt, &images);
    debug!("Prepared {} request with {} parts", mode.id(), parts.len());
    Ok(PreparedCall {
        mode,
        prompt,
        parts,
        inputs: prepared,
        fingerprint,
    })
}

/// Calls the image API. Blocking.
pub fn render(api: &dyn ImageApi, parts: &[ContentPart], options: &ImageOptions) -> Result<RenderedImage, GenerationError> {
    let generated = api.generate_image(parts, options)?;
    if generated.bytes.is_empty() {
        return Err(GenerationError::internal("The API returned an empty image"));
    }
    let dimensions = probe_dimensions(&generated.bytes);
    Ok(RenderedImage {
        width: dimensions.map(|d| d.0),
        height: dimensions.map(|d| d.1),
        bytes: generated.bytes,
        mime_type: generated.mime_type,
    })
}
