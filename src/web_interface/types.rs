use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{MessageWithAttachments, SessionDetail};
use crate::generation::GenerationOutcome;
use crate::storage::db_entities::{chat_attachments, chat_sessions, generation_assets, users};

#[derive(Serialize)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&users::Model> for UserResponse {
    fn from(user: &users::Model) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            is_admin: user.is_admin(),
            is_active: user.is_active,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Serialize)]
pub struct AssetResponse {
    pub id: i32,
    pub mime_type: String,
    pub byte_size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub url: String,
    pub download_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<&generation_assets::Model> for AssetResponse {
    fn from(asset: &generation_assets::Model) -> Self {
        Self {
            id: asset.id,
            mime_type: asset.mime_type.clone(),
            byte_size: asset.byte_size,
            width: asset.width,
            height: asset.height,
            url: format!("/api/assets/{}", asset.id),
            download_url: format!("/api/assets/{}/download", asset.id),
            created_at: asset.created_at,
        }
    }
}

/// A generation row. Failure detail stays server-side.
#[derive(Serialize)]
pub struct GenerationResponse {
    pub id: i32,
    pub mode: String,
    pub status: String,
    pub aspect_ratio: Option<String>,
    pub resolution: Option<String>,
    pub edit_mode: Option<String>,
    pub model_image: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub assets: Vec<AssetResponse>,
}

impl From<&GenerationOutcome> for GenerationResponse {
    fn from(outcome: &GenerationOutcome) -> Self {
        let generation = &outcome.generation;
        Self {
            id: generation.id,
            mode: generation.mode.clone(),
            status: generation.status.clone(),
            aspect_ratio: generation.aspect_ratio.clone(),
            resolution: generation.resolution.clone(),
            edit_mode: generation.edit_mode.clone(),
            model_image: generation.model_image.clone(),
            error_code: generation.error_code.clone(),
            error_message: generation.error_message.clone(),
            duration_ms: generation.duration_ms,
            created_at: generation.created_at,
            finished_at: generation.finished_at,
            assets: outcome.assets.iter().map(AssetResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct AttachmentResponse {
    pub id: i32,
    pub kind: String,
    pub mime_type: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub url: String,
}

impl From<&chat_attachments::Model> for AttachmentResponse {
    fn from(attachment: &chat_attachments::Model) -> Self {
        Self {
            id: attachment.id,
            kind: attachment.kind.clone(),
            mime_type: attachment.mime_type.clone(),
            width: attachment.width,
            height: attachment.height,
            url: format!("/api/chat/attachments/{}", attachment.id),
        }
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub id: i32,
    pub role: String,
    pub text: String,
    pub mode_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<AttachmentResponse>,
}

impl From<&MessageWithAttachments> for MessageResponse {
    fn from(entry: &MessageWithAttachments) -> Self {
        Self {
            id: entry.message.id,
            role: entry.message.role.clone(),
            text: entry.message.text.clone().unwrap_or_default(),
            mode_id: entry.message.mode_id.clone(),
            created_at: entry.message.created_at,
            attachments: entry.attachments.iter().map(AttachmentResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub id: i32,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<MessageResponse>>,
}

impl From<&chat_sessions::Model> for SessionResponse {
    fn from(session: &chat_sessions::Model) -> Self {
        Self {
            id: session.id,
            title: session.title.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            messages: None,
        }
    }
}

impl From<&SessionDetail> for SessionResponse {
    fn from(detail: &SessionDetail) -> Self {
        Self {
            messages: Some(detail.messages.iter().map(MessageResponse::from).collect()),
            ..Self::from(&detail.session)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct UserStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PasswordResetRequest {
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateSessionRequest {
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub limit: Option<u64>,
    pub mode: Option<String>,
}
