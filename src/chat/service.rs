use std::sync::Arc;

use log::{error, info};
use sea_orm::DatabaseConnection;

use super::history::{self, MessageWithAttachments, NewAttachment, SessionDetail, HISTORY_LIMIT};
use crate::configuration::{ImageLimits, StorageTarget};
use crate::error_handling::types::{ChatError, GenerationError, StorageError};
use crate::generation::engine::{prepare, render, PreparedInput, RenderedImage};
use crate::generation::request::{EditMode, ModeInputs};
use crate::generation::service::log_generation_error;
use crate::generation::ChatMode;
use crate::imaging::{encode_png, extension_for_mime_type, ColorMode, DecodedImage, ImageInput};
use crate::prompts::{self, HistoryEntry};
use crate::provider::{ContentPart, ImageApi, ImageOptions};
use crate::storage::db_entities::{chat_attachments, chat_messages, chat_sessions};
use crate::storage::ObjectStorage;

pub const ROUGH_DONE: &str = "Illustration generated.";
pub const REFERENCE_DONE: &str = "Reference-styled finish complete.";
pub const EDIT_DONE: &str = "Edit complete.";
pub const SESSION_EDIT_DONE: &str = "Regenerated from the previous image.";
pub const REFERENCE_REQUEST_TEXT: &str = "Reference-style colorize request";
pub const EDIT_REQUEST_TEXT: &str = "Masked edit request";
pub const DESCRIBE_IMAGES_TEXT: &str = "Please describe the images.";

/// One submitted chat turn. Which fields matter depends on `mode`.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub mode: ChatMode,
    pub message: String,
    /// Free images attached to a text chat turn
    pub images: Vec<ImageInput>,
    pub rough: Option<ImageInput>,
    pub reference: Option<ImageInput>,
    pub base: Option<ImageInput>,
    pub mask: Option<ImageInput>,
    pub color_instruction: String,
    pub pose_instruction: String,
    pub edit_mode: EditMode,
    pub edit_instruction: String,
}

impl ChatTurn {
    pub fn new(mode: ChatMode) -> Self {
        Self {
            mode,
            message: String::new(),
            images: Vec::new(),
            rough: None,
            reference: None,
            base: None,
            mask: None,
            color_instruction: String::new(),
            pose_instruction: String::new(),
            edit_mode: EditMode::Inpaint,
            edit_instruction: String::new(),
        }
    }

    pub fn text(message: &str) -> Self {
        Self {
            message: message.to_string(),
            ..Self::new(ChatMode::Text)
        }
    }
}

/// Chat sessions and the turn flows that run inside them.
#[derive(Clone)]
pub struct ChatService {
    db: DatabaseConnection,
    storage: ObjectStorage,
    api: Arc<dyn ImageApi>,
    limits: ImageLimits,
    target: StorageTarget,
}

async fn blocking<T, F>(task: F) -> Result<T, GenerationError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, GenerationError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .unwrap_or_else(|e| Err(GenerationError::internal(format!("Chat task failed: {}", e))))
}

fn store_image(
    storage: &ObjectStorage,
    target: &StorageTarget,
    kind: &str,
    bytes: &[u8],
    mime_type: &str,
    dimensions: (Option<u32>, Option<u32>),
) -> Result<NewAttachment, GenerationError> {
    let stored = storage.save(target, bytes, extension_for_mime_type(mime_type), mime_type)?;
    Ok(NewAttachment {
        kind: kind.to_string(),
        stored,
        mime_type: mime_type.to_string(),
        width: dimensions.0,
        height: dimensions.1,
    })
}

fn store_decoded(
    storage: &ObjectStorage,
    target: &StorageTarget,
    kind: &str,
    image: &DecodedImage,
) -> Result<NewAttachment, GenerationError> {
    store_image(
        storage,
        target,
        kind,
        &image.bytes,
        image.mime_type(),
        (Some(image.width), Some(image.height)),
    )
}

fn store_rendered(storage: &ObjectStorage, target: &StorageTarget, image: &RenderedImage) -> Result<NewAttachment, GenerationError> {
    store_image(storage, target, "result", &image.bytes, &image.mime_type, (image.width, image.height))
}

impl ChatService {
    pub fn new(
        db: DatabaseConnection,
        storage: ObjectStorage,
        api: Arc<dyn ImageApi>,
        limits: ImageLimits,
        target: StorageTarget,
    ) -> Self {
        Self {
            db,
            storage,
            api,
            limits,
            target,
        }
    }

    pub async fn create_session(&self, user_id: i32, title: Option<&str>) -> Result<chat_sessions::Model, ChatError> {
        let session = history::create_session(&self.db, user_id, title).await?;
        info!("Chat session {} created for user {}", session.id, user_id);
        Ok(session)
    }

    /// Sessions of a user; a first one is created when there is none.
    pub async fn list_sessions(&self, user_id: i32) -> Result<Vec<chat_sessions::Model>, ChatError> {
        let sessions = history::list_sessions(&self.db, user_id).await?;
        if sessions.is_empty() {
            return Ok(vec![self.create_session(user_id, None).await?]);
        }
        Ok(sessions)
    }

    pub async fn session_detail(&self, user_id: i32, session_id: i32) -> Result<SessionDetail, ChatError> {
        let session = self.owned_session(user_id, session_id).await?;
        Ok(history::session_detail(&self.db, session).await?)
    }

    async fn owned_session(&self, user_id: i32, session_id: i32) -> Result<chat_sessions::Model, ChatError> {
        history::find_session(&self.db, user_id, session_id)
            .await?
            .ok_or(ChatError::SessionNotFound)
    }

    /// Attachment metadata and bytes, `None` unless the caller owns the session.
    pub async fn load_attachment(
        &self,
        user_id: i32,
        attachment_id: i32,
    ) -> Result<Option<(chat_attachments::Model, Vec<u8>)>, ChatError> {
        let Some(attachment) = history::find_owned_attachment(&self.db, user_id, attachment_id).await? else {
            return Ok(None);
        };
        let bytes = self.load_bytes(&attachment).await?;
        Ok(bytes.map(|bytes| (attachment, bytes)))
    }

    async fn load_bytes(&self, attachment: &chat_attachments::Model) -> Result<Option<Vec<u8>>, StorageError> {
        let storage = self.storage.clone();
        let local_dir = self.target.local_dir.clone();
        let attachment = attachment.clone();
        tokio::task::spawn_blocking(move || {
            storage.load(
                &attachment.storage_backend,
                attachment.bucket.as_deref(),
                &attachment.object_name,
                &local_dir,
            )
        })
        .await
        .map_err(|e| {
            error!("Attachment load task failed: {}", e);
            StorageError::ReadFailed
        })?
    }

    async fn add_message(
        &self,
        session_id: i32,
        role: &str,
        text: Option<String>,
        mode: ChatMode,
        attachments: Vec<NewAttachment>,
    ) -> Result<MessageWithAttachments, ChatError> {
        Ok(history::add_message(&self.db, session_id, role, text, Some(mode.id()), attachments).await?)
    }

    async fn add_user_message(
        &self,
        session_id: i32,
        text: &str,
        mode: ChatMode,
        attachments: Vec<NewAttachment>,
    ) -> Result<(), ChatError> {
        let stored_text = (!text.is_empty()).then(|| text.to_string());
        self.add_message(session_id, chat_messages::ROLE_USER, stored_text, mode, attachments)
            .await?;
        history::update_session_title(&self.db, session_id, text).await?;
        Ok(())
    }

    /// Runs one turn and returns the assistant message.
    ///
    /// A failed generation still leaves a committed trace: the user message (when it got
    /// that far) followed by a `system` message carrying the user-facing error.
    pub async fn send_message(&self, user_id: i32, session_id: i32, turn: ChatTurn) -> Result<MessageWithAttachments, ChatError> {
        let session = self.owned_session(user_id, session_id).await?;
        let mode = turn.mode;
        let outcome = match mode {
            ChatMode::Text => self.text_turn(session.id, turn).await,
            ChatMode::SessionEdit => self.session_edit_turn(session.id, turn).await,
            ChatMode::Rough | ChatMode::Reference | ChatMode::Edit => self.image_turn(session.id, turn).await,
        };
        match outcome {
            Ok(reply) => {
                history::touch_session(&self.db, session.id).await?;
                Ok(reply)
            }
            Err(ChatError::Generation(err)) => {
                log_generation_error(&format!("Chat turn in session {}", session.id), &err);
                self.add_message(
                    session.id,
                    chat_messages::ROLE_SYSTEM,
                    Some(format!("Request failed: {}", err.message)),
                    mode,
                    Vec::new(),
                )
                .await?;
                history::touch_session(&self.db, session.id).await?;
                Err(ChatError::Generation(err))
            }
            Err(other) => Err(other),
        }
    }

    async fn text_turn(&self, session_id: i32, turn: ChatTurn) -> Result<MessageWithAttachments, ChatError> {
        let mode = turn.mode;
        let text = turn.message.trim().to_string();
        if text.is_empty() && turn.images.is_empty() {
            return Err(GenerationError::validation("Please enter a message.").into());
        }

        let limits = self.limits;
        let images = turn.images;
        let decoded = blocking(move || {
            images
                .iter()
                .enumerate()
                .map(|(i, input)| input.decode(&format!("Image {}", i + 1), &limits, ColorMode::Original))
                .collect::<Result<Vec<_>, _>>()
        })
        .await;
        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(err) => {
                self.add_user_message(session_id, &text, mode, Vec::new()).await?;
                return Err(err.into());
            }
        };

        let (storage, target, to_store) = (self.storage.clone(), self.target.clone(), decoded.clone());
        let uploads = blocking(move || {
            to_store
                .iter()
                .map(|image| store_decoded(&storage, &target, "image", image))
                .collect::<Result<Vec<_>, _>>()
        })
        .await?;
        self.add_user_message(session_id, &text, mode, uploads).await?;

        let mut entries: Vec<HistoryEntry> = history::recent_text_history(&self.db, session_id, HISTORY_LIMIT)
            .await?
            .into_iter()
            .map(|m| HistoryEntry {
                role: m.role,
                text: m.text.unwrap_or_default(),
            })
            .collect();
        if entries
            .last()
            .is_some_and(|last| last.role == chat_messages::ROLE_USER && last.text == text)
        {
            entries.pop();
        }

        let request_text = if text.is_empty() { DESCRIBE_IMAGES_TEXT.to_string() } else { text };
        let prompt = prompts::build_text_prompt(&entries, &request_text);
        let api = self.api.clone();
        let reply = blocking(move || {
            if decoded.is_empty() {
                return Ok(api.generate_text(&prompt)?);
            }
            let mut parts = vec![ContentPart::text(prompt)];
            parts.extend(decoded.iter().map(|image| ContentPart::image(image.mime_type(), image.bytes.clone())));
            Ok(api.generate_multimodal_text(&parts)?)
        })
        .await?;

        self.add_message(session_id, chat_messages::ROLE_ASSISTANT, Some(reply), mode, Vec::new())
            .await
    }

    async fn session_edit_turn(&self, session_id: i32, turn: ChatTurn) -> Result<MessageWithAttachments, ChatError> {
        let mode = turn.mode;
        let instruction = turn.message.trim().to_string();
        if instruction.is_empty() {
            return Err(GenerationError::validation("Please enter an edit instruction.").into());
        }
        self.add_user_message(session_id, &instruction, mode, Vec::new()).await?;

        let Some(previous) = history::last_assistant_attachment(&self.db, session_id).await? else {
            return Err(GenerationError::validation("No prior image in this session.").into());
        };
        let Some(bytes) = self.load_bytes(&previous).await? else {
            return Err(GenerationError::validation("The previous image could not be loaded.").into());
        };

        let (api, storage, target, limits) = (self.api.clone(), self.storage.clone(), self.target.clone(), self.limits);
        let mime_type = previous.mime_type.clone();
        let result = blocking(move || {
            let image = ImageInput::upload(bytes, None, Some(&mime_type)).decode(
                "Previous image",
                &limits,
                ColorMode::Rgb,
            )?;
            let prompt = prompts::build_chat_edit_prompt(&instruction);
            let parts = vec![
                ContentPart::text(prompt),
                ContentPart::image("image/png", encode_png(&image.image)?),
            ];
            let rendered = render(api.as_ref(), &parts, &ImageOptions::default())?;
            store_rendered(&storage, &target, &rendered)
        })
        .await?;

        self.add_message(
            session_id,
            chat_messages::ROLE_ASSISTANT,
            Some(SESSION_EDIT_DONE.to_string()),
            mode,
            vec![result],
        )
        .await
    }

    async fn image_turn(&self, session_id: i32, turn: ChatTurn) -> Result<MessageWithAttachments, ChatError> {
        let mode = turn.mode;
        let (user_text, done_text, inputs) = match mode {
            ChatMode::Rough => (
                format!("Colors: {}\nPose: {}", turn.color_instruction.trim(), turn.pose_instruction.trim())
                    .trim()
                    .to_string(),
                ROUGH_DONE,
                ModeInputs::Rough {
                    rough: turn.rough,
                    color_instruction: turn.color_instruction,
                    pose_instruction: turn.pose_instruction,
                },
            ),
            ChatMode::Reference => (
                REFERENCE_REQUEST_TEXT.to_string(),
                REFERENCE_DONE,
                ModeInputs::Reference {
                    reference: turn.reference,
                    rough: turn.rough,
                    instruction: turn.message,
                },
            ),
            _ => {
                let instruction = turn.edit_instruction.trim().to_string();
                let text = if instruction.is_empty() {
                    EDIT_REQUEST_TEXT.to_string()
                } else {
                    instruction.clone()
                };
                (
                    text,
                    EDIT_DONE,
                    ModeInputs::Edit {
                        base: turn.base,
                        mask: turn.mask,
                        edit_mode: turn.edit_mode,
                        instruction,
                    },
                )
            }
        };

        let limits = self.limits;
        let prepared = match blocking(move || prepare(&inputs, &limits)).await {
            Ok(prepared) => prepared,
            Err(err) => {
                self.add_user_message(session_id, &user_text, mode, Vec::new()).await?;
                return Err(err.into());
            }
        };

        let (storage, target) = (self.storage.clone(), self.target.clone());
        let inputs: Vec<PreparedInput> = prepared.inputs.clone();
        let uploads = blocking(move || {
            inputs
                .iter()
                .map(|input| store_decoded(&storage, &target, input.kind, &input.image))
                .collect::<Result<Vec<_>, _>>()
        })
        .await?;
        self.add_user_message(session_id, &user_text, mode, uploads).await?;

        let (api, storage, target) = (self.api.clone(), self.storage.clone(), self.target.clone());
        let result = blocking(move || {
            let rendered = render(api.as_ref(), &prepared.parts, &ImageOptions::default())?;
            store_rendered(&storage, &target, &rendered)
        })
        .await?;

        self.add_message(
            session_id,
            chat_messages::ROLE_ASSISTANT,
            Some(done_text.to_string()),
            mode,
            vec![result],
        )
        .await
    }
}
