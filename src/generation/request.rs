use super::modes::Mode;
use crate::imaging::ImageInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Inpaint,
    Outpaint,
}

impl EditMode {
    /// Anything but `outpaint` is an inpaint.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "outpaint" => EditMode::Outpaint,
            _ => EditMode::Inpaint,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EditMode::Inpaint => "inpaint",
            EditMode::Outpaint => "outpaint",
        }
    }
}

/// Inputs of one image-producing mode. Images stay unvalidated until the engine decodes them.
#[derive(Debug, Clone)]
pub enum ModeInputs {
    Rough {
        rough: Option<ImageInput>,
        color_instruction: String,
        pose_instruction: String,
    },
    Reference {
        reference: Option<ImageInput>,
        rough: Option<ImageInput>,
        instruction: String,
    },
    Edit {
        base: Option<ImageInput>,
        mask: Option<ImageInput>,
        edit_mode: EditMode,
        instruction: String,
    },
}

impl ModeInputs {
    pub fn mode(&self) -> Mode {
        match self {
            ModeInputs::Rough { .. } => Mode::Rough,
            ModeInputs::Reference { .. } => Mode::Reference,
            ModeInputs::Edit { .. } => Mode::Edit,
        }
    }

    pub fn edit_mode(&self) -> Option<EditMode> {
        match self {
            ModeInputs::Edit { edit_mode, .. } => Some(*edit_mode),
            _ => None,
        }
    }
}

/// A submission of the generation form.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub inputs: ModeInputs,
    /// Raw form label, `auto` allowed
    pub aspect_ratio: Option<String>,
    /// Raw form label, `auto` allowed
    pub resolution: Option<String>,
}

impl GenerationRequest {
    pub fn new(inputs: ModeInputs) -> Self {
        Self {
            inputs,
            aspect_ratio: None,
            resolution: None,
        }
    }

    pub fn with_hints(mut self, aspect_ratio: Option<String>, resolution: Option<String>) -> Self {
        self.aspect_ratio = aspect_ratio;
        self.resolution = resolution;
        self
    }

    pub fn mode(&self) -> Mode {
        self.inputs.mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_mode_parse() {
        assert_eq!(EditMode::parse(Some("OUTPAINT")), EditMode::Outpaint);
        assert_eq!(EditMode::parse(Some("inpaint")), EditMode::Inpaint);
        assert_eq!(EditMode::parse(Some("sideways")), EditMode::Inpaint);
        assert_eq!(EditMode::parse(None).as_str(), "inpaint");
    }

    #[test]
    fn test_inputs_know_their_mode() {
        let inputs = ModeInputs::Edit {
            base: None,
            mask: None,
            edit_mode: EditMode::Outpaint,
            instruction: String::new(),
        };
        assert_eq!(inputs.mode(), Mode::Edit);
        assert_eq!(inputs.edit_mode(), Some(EditMode::Outpaint));
        let request = GenerationRequest::new(ModeInputs::Rough {
            rough: None,
            color_instruction: String::new(),
            pose_instruction: String::new(),
        });
        assert_eq!(request.mode(), Mode::Rough);
        assert_eq!(request.inputs.edit_mode(), None);
    }
}
