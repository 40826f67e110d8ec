//! Prompt templates
//!
//! Pure string builders. Nothing here touches images or I/O so the exact wording sent to the
//! image API can be asserted in tests.

use crate::generation::request::EditMode;

pub const DEFAULT_COLOR_INSTRUCTION: &str = "No specific colors were provided.";
pub const DEFAULT_POSE_INSTRUCTION: &str = "Please maintain the pose of the original image.";

/// Sent before the rough sketch in reference mode.
pub const REFERENCE_ROUGH_INTRO: &str =
    "I will give you two images. The first one is the rough sketch to be finished.";
/// Sent before the finished illustration in reference mode.
pub const REFERENCE_STYLE_INTRO: &str = "Here is the second image. It is a finished illustration to use as the \
reference for art style, texture, shading and saturation range.";

pub const EDIT_BASE_INTRO: &str = "The first image is the base image to edit.";
pub const EDIT_MASK_INTRO: &str = "The second image is the mask. White areas mark the region to change, black \
areas must stay as they are.";

const TEXT_ASSISTANT_INTRO: &str = "You are a helpful assistant for illustration workflows.";
const TEXT_HISTORY_INTRO: &str = "Use the prior context if it helps.";

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default
    } else {
        trimmed
    }
}

pub fn build_rough_prompt(color_instruction: &str, pose_instruction: &str) -> String {
    format!(
        "Using the provided image of my rough drawing, create a detailed and polished illustration \
in the style of a high-quality anime. Pay close attention to the fidelity of the original sketch, \
fill in missing lines cleanly, and follow these color instructions to finish the artwork: {} \
Follow these pose instructions to position the character: {}",
        or_default(color_instruction, DEFAULT_COLOR_INSTRUCTION),
        or_default(pose_instruction, DEFAULT_POSE_INSTRUCTION)
    )
}

pub fn build_reference_style_prompt(instruction: &str) -> String {
    let mut prompt = String::from(
        "Finish the first image, the rough sketch, as a complete illustration. Keep its composition, \
pose, proportions and line placement. Match the second image, the finished reference, in art style, \
line quality, coloring, texture, shading and saturation range. Do not copy the characters, objects \
or background of the reference. Do not change the identity, face, hairstyle or outfit of any character \
in the sketch. Do not add props, accessories or objects that are not in the sketch. Do not add text, \
signatures, logos or watermarks. Do not change the composition, framing, camera angle or layout of the \
sketch.",
    );
    let instruction = instruction.trim();
    if !instruction.is_empty() {
        prompt.push_str(" Additional instructions: ");
        prompt.push_str(instruction);
    }
    prompt
}

pub fn build_edit_prompt(instruction: &str, edit_mode: EditMode) -> String {
    let task = match edit_mode {
        EditMode::Inpaint => {
            "Edit only the masked (white) region of the base image and blend the result seamlessly \
with the untouched surroundings."
        }
        EditMode::Outpaint => {
            "Extend the base image into the masked (white) region, continuing its content, lighting \
and style naturally beyond the original borders."
        }
    };
    let instruction = or_default(instruction, "Keep the result consistent with the rest of the image.");
    format!(
        "{} Keep everything outside the mask unchanged. Instructions: {}",
        task, instruction
    )
}

pub fn build_chat_edit_prompt(instruction: &str) -> String {
    format!(
        "Revise the provided image according to the following request while keeping its overall \
composition, characters and style: {}",
        or_default(instruction, "Refine the image slightly.")
    )
}

/// One prior chat turn for the text transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: String,
    pub text: String,
}

/// Role-tagged transcript ending with an open assistant turn.
pub fn build_text_prompt(history: &[HistoryEntry], user_text: &str) -> String {
    let mut lines = vec![TEXT_ASSISTANT_INTRO.to_string(), TEXT_HISTORY_INTRO.to_string()];
    for entry in history.iter().filter(|e| !e.text.is_empty()) {
        let speaker = if entry.role == "user" { "User" } else { "Assistant" };
        lines.push(format!("{}: {}", speaker, entry.text));
    }
    lines.push("---".to_string());
    lines.push(format!("User: {}", user_text));
    lines.push("Assistant:".to_string());
    lines.join("\n")
}
