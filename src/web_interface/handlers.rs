//! Request handlers
//!
//! Every handler takes the shared [`AppContext`], the caller's token (if any) and already
//! parsed inputs, and always produces an [`ApiReply`]. Failures become JSON `{error}`
//! bodies with the matching status; nothing here rejects.

use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde_json::json;
use warp::http::StatusCode;

use super::form::FormFields;
use super::reply::{auth_error, chat_error, generation_error, storage_error, ApiReply};
use super::types::*;
use crate::accounts::presets::{self, NewPreset};
use crate::accounts::{NewUser, SESSION_COOKIE};
use crate::chat::ChatTurn;
use crate::controller::controller_handler::AppContext;
use crate::error_handling::types::GenerationError;
use crate::generation::modes::{ALL_CHAT_MODES, ALL_MODES, ASPECT_RATIO_OPTIONS, RESOLUTION_OPTIONS};
use crate::generation::service::MAX_LIST_LIMIT;
use crate::generation::{ChatMode, EditMode, GenerationRequest, Mode, ModeInputs};
use crate::imaging::extension_for_mime_type;
use crate::storage::db_entities::users;

const DEFAULT_LIST_LIMIT: u64 = 20;
const IMAGE_NOT_FOUND: &str = "The image was not found.";

macro_rules! try_reply {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(reply) => return reply,
        }
    };
}

async fn current_user(ctx: &AppContext, token: Option<&str>) -> Result<users::Model, ApiReply> {
    ctx.accounts.require_user(token).await.map_err(auth_error)
}

async fn current_admin(ctx: &AppContext, token: Option<&str>) -> Result<users::Model, ApiReply> {
    ctx.accounts.require_admin(token).await.map_err(auth_error)
}

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    )
}

pub async fn health() -> ApiReply {
    ApiReply::ok(&json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}

pub async fn me(ctx: Arc<AppContext>, token: Option<String>) -> ApiReply {
    match ctx.accounts.authenticate(token.as_deref()).await {
        Ok(Some(user)) => ApiReply::ok(&json!({ "authenticated": true, "user": UserResponse::from(&user) })),
        Ok(None) => ApiReply::ok(&json!({ "authenticated": false })),
        Err(e) => auth_error(e),
    }
}

pub async fn login(ctx: Arc<AppContext>, request: LoginRequest) -> ApiReply {
    match ctx.accounts.login(&request.username, &request.password).await {
        Ok((user, token)) => {
            let max_age = ctx.config.server.session_ttl_hours * 3600;
            ApiReply::ok(&json!({ "user": UserResponse::from(&user), "token": token }))
                .with_cookie(session_cookie(&token, max_age))
        }
        Err(e) => auth_error(e),
    }
}

pub async fn logout(ctx: Arc<AppContext>, token: Option<String>) -> ApiReply {
    if let Some(token) = token.as_deref() {
        if let Err(e) = ctx.accounts.logout(token).await {
            return auth_error(e);
        }
    }
    ApiReply::ok(&json!({ "ok": true })).with_cookie(session_cookie("", 0))
}

pub async fn list_users(ctx: Arc<AppContext>, token: Option<String>) -> ApiReply {
    try_reply!(current_admin(&ctx, token.as_deref()).await);
    match ctx.accounts.list_users().await {
        Ok(users) => {
            let users: Vec<UserResponse> = users.iter().map(UserResponse::from).collect();
            ApiReply::ok(&json!({ "users": users }))
        }
        Err(e) => auth_error(e),
    }
}

pub async fn create_user(ctx: Arc<AppContext>, token: Option<String>, request: CreateUserRequest) -> ApiReply {
    try_reply!(current_admin(&ctx, token.as_deref()).await);
    let new_user = NewUser {
        username: request.username,
        email: request.email,
        password: request.password,
        role: request.role,
    };
    match ctx.accounts.create_user(new_user).await {
        Ok(user) => ApiReply::created(&json!({ "user": UserResponse::from(&user) })),
        Err(e) => auth_error(e),
    }
}

pub async fn set_user_status(
    ctx: Arc<AppContext>,
    token: Option<String>,
    user_id: i32,
    request: UserStatusRequest,
) -> ApiReply {
    let actor = try_reply!(current_user(&ctx, token.as_deref()).await);
    match ctx.accounts.set_active(&actor, user_id, request.is_active).await {
        Ok(user) => ApiReply::ok(&json!({ "user": UserResponse::from(&user) })),
        Err(e) => auth_error(e),
    }
}

pub async fn reset_user_password(
    ctx: Arc<AppContext>,
    token: Option<String>,
    user_id: i32,
    request: PasswordResetRequest,
) -> ApiReply {
    let actor = try_reply!(current_user(&ctx, token.as_deref()).await);
    match ctx.accounts.reset_password(&actor, user_id, &request.password).await {
        Ok(user) => ApiReply::ok(&json!({ "user": UserResponse::from(&user) })),
        Err(e) => auth_error(e),
    }
}

pub async fn change_user_role(ctx: Arc<AppContext>, token: Option<String>, user_id: i32, request: RoleRequest) -> ApiReply {
    let actor = try_reply!(current_user(&ctx, token.as_deref()).await);
    match ctx.accounts.change_role(&actor, user_id, &request.role).await {
        Ok(user) => ApiReply::ok(&json!({ "user": UserResponse::from(&user) })),
        Err(e) => auth_error(e),
    }
}

pub async fn change_own_password(ctx: Arc<AppContext>, token: Option<String>, request: PasswordChangeRequest) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    match ctx
        .accounts
        .change_own_password(&user, &request.current_password, &request.new_password)
        .await
    {
        Ok(()) => ApiReply::ok(&json!({ "ok": true })),
        Err(e) => auth_error(e),
    }
}

pub async fn modes() -> ApiReply {
    let modes: Vec<_> = ALL_MODES.iter().map(Mode::info).collect();
    ApiReply::ok(&json!({ "modes": modes }))
}

pub async fn options() -> ApiReply {
    ApiReply::ok(&json!({
        "aspect_ratio_options": ASPECT_RATIO_OPTIONS,
        "resolution_options": RESOLUTION_OPTIONS,
    }))
}

pub async fn list_presets(ctx: Arc<AppContext>, token: Option<String>, query: ListQuery) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    let mode = Mode::parse_or_default(query.mode.as_deref());
    match presets::list(&ctx.db, user.id, mode).await {
        Ok(presets) => ApiReply::ok(&json!({ "presets": presets })),
        Err(e) => auth_error(e),
    }
}

pub async fn create_preset(ctx: Arc<AppContext>, token: Option<String>, request: NewPreset) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    match presets::create(&ctx.db, user.id, &request).await {
        Ok(preset) => ApiReply::created(&json!({ "preset": preset })),
        Err(e) => auth_error(e),
    }
}

pub async fn delete_preset(ctx: Arc<AppContext>, token: Option<String>, preset_id: i32) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    match presets::delete(&ctx.db, user.id, preset_id).await {
        Ok(()) => ApiReply::ok(&json!({ "ok": true })),
        Err(e) => auth_error(e),
    }
}

/// Maps a generation form onto the inputs of its mode.
pub fn generation_request(fields: &FormFields) -> Result<GenerationRequest, GenerationError> {
    let mode_id = fields.non_empty("mode").or_else(|| fields.non_empty("mode_id"));
    let inputs = match Mode::parse_or_default(mode_id.as_deref()) {
        Mode::Rough => ModeInputs::Rough {
            rough: fields.image("rough_image", None),
            color_instruction: fields.string("color_instruction"),
            pose_instruction: fields.string("pose_instruction"),
        },
        Mode::Reference => ModeInputs::Reference {
            reference: fields.image("reference_image", None),
            rough: fields.image("rough_image", None),
            instruction: fields.string("reference_instruction"),
        },
        Mode::Edit => ModeInputs::Edit {
            base: fields.image("edit_base_image", Some("edit_base_data")),
            mask: fields.image("edit_mask_image", Some("edit_mask_data")),
            edit_mode: EditMode::parse(fields.text("edit_mode")),
            instruction: fields.string("edit_instruction"),
        },
        Mode::Chat => return Err(GenerationError::validation("Use the chat to work in this mode.")),
    };
    Ok(GenerationRequest::new(inputs).with_hints(fields.non_empty("aspect_ratio"), fields.non_empty("resolution")))
}

pub async fn create_generation(ctx: Arc<AppContext>, token: Option<String>, fields: FormFields) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    let request = match generation_request(&fields) {
        Ok(request) => request,
        Err(e) => return generation_error(&e),
    };
    match ctx.generations.generate(user.id, request).await {
        Ok(outcome) => {
            let generation = GenerationResponse::from(&outcome);
            let assets: Vec<AssetResponse> = outcome.assets.iter().map(AssetResponse::from).collect();
            ApiReply::ok(&json!({ "generation": generation, "assets": assets }))
        }
        Err(e) => generation_error(&e),
    }
}

pub async fn list_generations(ctx: Arc<AppContext>, token: Option<String>, query: ListQuery) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    match ctx.generations.list(user.id, limit).await {
        Ok(outcomes) => {
            let generations: Vec<GenerationResponse> = outcomes.iter().map(GenerationResponse::from).collect();
            ApiReply::ok(&json!({ "generations": generations }))
        }
        Err(e) => storage_error("Listing generations", &e),
    }
}

pub async fn latest_generation(ctx: Arc<AppContext>, token: Option<String>) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    match ctx.generations.latest(user.id).await {
        Ok(Some(outcome)) => ApiReply::ok(&json!({ "generation": GenerationResponse::from(&outcome) })),
        Ok(None) => ApiReply::not_found("No image has been generated yet."),
        Err(e) => storage_error("Latest generation lookup", &e),
    }
}

pub async fn generation_detail(ctx: Arc<AppContext>, token: Option<String>, generation_id: i32) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    match ctx.generations.detail(user.id, generation_id).await {
        Ok(Some(outcome)) => ApiReply::ok(&json!({ "generation": GenerationResponse::from(&outcome) })),
        Ok(None) => ApiReply::not_found("The generation was not found."),
        Err(e) => storage_error("Generation lookup", &e),
    }
}

/// Asset bytes, inline or as a `generated_{id}{ext}` attachment.
pub async fn asset(ctx: Arc<AppContext>, token: Option<String>, asset_id: i32, download: bool) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    let asset = match ctx.generations.find_asset(user.id, asset_id).await {
        Ok(Some(asset)) => asset,
        Ok(None) => return ApiReply::not_found(IMAGE_NOT_FOUND),
        Err(e) => return storage_error("Asset lookup", &e),
    };
    match ctx.generations.load_asset_bytes(&asset).await {
        Ok(Some(bytes)) => {
            let disposition = download.then(|| {
                format!(
                    "attachment; filename=\"generated_{}{}\"",
                    asset.generation_id,
                    extension_for_mime_type(&asset.mime_type)
                )
            });
            ApiReply::bytes(bytes, &asset.mime_type, disposition)
        }
        Ok(None) => {
            warn!("Asset {} has no stored object {}", asset.id, asset.object_name);
            ApiReply::not_found(IMAGE_NOT_FOUND)
        }
        Err(e) => storage_error("Asset load", &e),
    }
}

pub async fn delete_asset(ctx: Arc<AppContext>, token: Option<String>, asset_id: i32) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    match ctx.generations.soft_delete_asset(user.id, asset_id).await {
        Ok(true) => ApiReply::ok(&json!({ "ok": true })),
        Ok(false) => ApiReply::not_found(IMAGE_NOT_FOUND),
        Err(e) => storage_error("Asset delete", &e),
    }
}

pub async fn chat_modes() -> ApiReply {
    let modes: Vec<_> = ALL_CHAT_MODES.iter().map(ChatMode::info).collect();
    ApiReply::ok(&json!({ "modes": modes }))
}

pub async fn list_sessions(ctx: Arc<AppContext>, token: Option<String>) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    match ctx.chat.list_sessions(user.id).await {
        Ok(sessions) => {
            let sessions: Vec<SessionResponse> = sessions.iter().map(SessionResponse::from).collect();
            ApiReply::ok(&json!({ "sessions": sessions }))
        }
        Err(e) => chat_error(e),
    }
}

pub async fn create_session(ctx: Arc<AppContext>, token: Option<String>, request: CreateSessionRequest) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    match ctx.chat.create_session(user.id, request.title.as_deref()).await {
        Ok(session) => ApiReply::created(&json!({ "session": SessionResponse::from(&session) })),
        Err(e) => chat_error(e),
    }
}

pub async fn session_detail(ctx: Arc<AppContext>, token: Option<String>, session_id: i32) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    match ctx.chat.session_detail(user.id, session_id).await {
        Ok(detail) => ApiReply::ok(&json!({ "session": SessionResponse::from(&detail) })),
        Err(e) => chat_error(e),
    }
}

/// Maps a chat form onto a turn. Unknown mode ids fall back to text chat.
pub fn chat_turn(fields: &FormFields) -> ChatTurn {
    let mode = ChatMode::parse_or_default(fields.text("mode_id"));
    let message = match mode {
        ChatMode::Reference => fields
            .non_empty("reference_instruction")
            .unwrap_or_else(|| fields.string("message")),
        _ => fields.string("message"),
    };
    ChatTurn {
        mode,
        message,
        images: fields.images("images"),
        rough: fields.image("rough_image", None),
        reference: fields.image("reference_image", None),
        base: fields.image("edit_base_image", Some("edit_base_data")),
        mask: fields.image("edit_mask_image", Some("edit_mask_data")),
        color_instruction: fields.string("color_instruction"),
        pose_instruction: fields.string("pose_instruction"),
        edit_mode: EditMode::parse(fields.text("edit_mode")),
        edit_instruction: fields.string("edit_instruction"),
    }
}

pub async fn send_message(ctx: Arc<AppContext>, token: Option<String>, session_id: i32, fields: FormFields) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    let turn = chat_turn(&fields);
    info!("Chat turn in session {} with mode {}", session_id, turn.mode.id());
    match ctx.chat.send_message(user.id, session_id, turn).await {
        Ok(reply) => ApiReply::ok(&json!({ "assistant": MessageResponse::from(&reply) })),
        Err(e) => chat_error(e),
    }
}

pub async fn chat_attachment(ctx: Arc<AppContext>, token: Option<String>, attachment_id: i32) -> ApiReply {
    let user = try_reply!(current_user(&ctx, token.as_deref()).await);
    match ctx.chat.load_attachment(user.id, attachment_id).await {
        Ok(Some((attachment, bytes))) => ApiReply::bytes(bytes, &attachment.mime_type, None),
        Ok(None) => ApiReply::not_found(IMAGE_NOT_FOUND),
        Err(e) => chat_error(e),
    }
}

/// Uploads that could not be read as multipart at all.
pub fn unreadable_form(err: warp::Error) -> ApiReply {
    warn!("Unreadable multipart body: {}", err);
    ApiReply::error(StatusCode::BAD_REQUEST, "The form data could not be read.")
}
