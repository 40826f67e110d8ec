use serde::Serialize;

/// Generation workflows offered by the generation form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// One rough sketch plus color and pose instructions.
    Rough,
    /// A rough sketch finished in the style of a second, finished illustration.
    Reference,
    /// Inpaint or outpaint a base image inside a mask.
    Edit,
    /// Conversational editing, served by the chat endpoints.
    Chat,
}

pub const ALL_MODES: [Mode; 4] = [Mode::Rough, Mode::Reference, Mode::Edit, Mode::Chat];
pub const DEFAULT_MODE: Mode = Mode::Rough;

impl Mode {
    pub fn id(&self) -> &'static str {
        match self {
            Mode::Rough => "rough_with_instructions",
            Mode::Reference => "reference_style_colorize",
            Mode::Edit => "inpaint_outpaint",
            Mode::Chat => "chat",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Rough => "Rough to finish (color and pose instructions)",
            Mode::Reference => "Reference-styled colorize (two images)",
            Mode::Edit => "Inpaint / outpaint edit",
            Mode::Chat => "Chat",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Mode::Rough => "Finish a single rough sketch with text instructions.",
            Mode::Reference => "Finish a rough sketch in the style of a finished illustration.",
            Mode::Edit => "Edit the region of an image selected by a mask.",
            Mode::Chat => "Talk with the assistant and refine images turn by turn.",
        }
    }

    /// Whether `POST /api/generations` accepts the mode.
    pub fn is_generation_mode(&self) -> bool {
        !matches!(self, Mode::Chat)
    }

    pub fn from_id(id: &str) -> Option<Self> {
        ALL_MODES.into_iter().find(|m| m.id() == id.trim())
    }

    /// Unknown or missing ids fall back to the default mode.
    pub fn parse_or_default(id: Option<&str>) -> Self {
        id.and_then(Self::from_id).unwrap_or(DEFAULT_MODE)
    }

    pub fn info(&self) -> ModeInfo {
        ModeInfo {
            id: self.id(),
            label: self.label(),
            description: self.description(),
            enabled: self.is_generation_mode(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeInfo {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub enabled: bool,
}

/// Flows selectable for a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Text,
    SessionEdit,
    Rough,
    Reference,
    Edit,
}

pub const ALL_CHAT_MODES: [ChatMode; 5] = [
    ChatMode::Text,
    ChatMode::SessionEdit,
    ChatMode::Rough,
    ChatMode::Reference,
    ChatMode::Edit,
];

impl ChatMode {
    pub fn id(&self) -> &'static str {
        match self {
            ChatMode::Text => "text_chat",
            ChatMode::SessionEdit => "session_edit",
            ChatMode::Rough => Mode::Rough.id(),
            ChatMode::Reference => Mode::Reference.id(),
            ChatMode::Edit => Mode::Edit.id(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChatMode::Text => "Text chat",
            ChatMode::SessionEdit => "Refine the previous result",
            ChatMode::Rough => Mode::Rough.label(),
            ChatMode::Reference => Mode::Reference.label(),
            ChatMode::Edit => Mode::Edit.label(),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ChatMode::Text => "Ask questions or discuss ideas in text.",
            ChatMode::SessionEdit => "Regenerate the latest image of this chat with a text instruction.",
            ChatMode::Rough => Mode::Rough.description(),
            ChatMode::Reference => Mode::Reference.description(),
            ChatMode::Edit => Mode::Edit.description(),
        }
    }

    pub fn helper(&self) -> &'static str {
        match self {
            ChatMode::Text => "Sends text only; attached images are described.",
            ChatMode::SessionEdit => "Requires an image generated earlier in this chat.",
            ChatMode::Rough => "Attach a rough image and enter color and pose instructions.",
            ChatMode::Reference => "Attach a finished illustration and a rough image.",
            ChatMode::Edit => "Attach a base image and a mask image.",
        }
    }

    /// Unknown or missing ids fall back to text chat.
    pub fn parse_or_default(id: Option<&str>) -> Self {
        id.and_then(|id| ALL_CHAT_MODES.into_iter().find(|m| m.id() == id.trim()))
            .unwrap_or(ChatMode::Text)
    }

    pub fn info(&self) -> ChatModeInfo {
        ChatModeInfo {
            id: self.id(),
            label: self.label(),
            description: self.description(),
            helper: self.helper(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatModeInfo {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub helper: &'static str,
}

pub const ASPECT_RATIO_OPTIONS: [&str; 4] = ["auto", "1:1", "4:5", "16:9"];
pub const RESOLUTION_OPTIONS: [&str; 4] = ["auto", "1K", "2K", "4K"];
