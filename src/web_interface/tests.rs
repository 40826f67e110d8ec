use std::sync::Arc;

use sea_orm::EntityTrait;
use serde_json::Value;
use tempfile::TempDir;
use warp::http::StatusCode;

use super::form::FormFields;
use super::handlers;
use super::reply::ApiReply;
use super::types::*;
use crate::accounts::presets::NewPreset;
use crate::accounts::NewUser;
use crate::configuration::config::Config;
use crate::controller::controller_handler::AppContext;
use crate::error_handling::types::INTERNAL_ERROR_MESSAGE;
use crate::imaging::validator::fixtures::png;
use crate::provider::image_api::testing::{StubBehavior, StubImageApi};
use crate::storage::database_storage::testing::temp_db;
use crate::storage::db_entities::{generations, users};
use crate::storage::object_storage::testing::MemoryObjectStore;

const PASSWORD: &str = "password1";

struct Harness {
    ctx: Arc<AppContext>,
    api: Arc<StubImageApi>,
    _db_dir: TempDir,
    _instance: TempDir,
}

async fn harness() -> Harness {
    let (db, db_dir) = temp_db().await;
    let instance = TempDir::new().unwrap();
    let mut config = Config::default();
    config.server.instance_dir = instance.path().to_path_buf();
    let api = Arc::new(StubImageApi::succeeding());
    let ctx = AppContext::new(config, db, api.clone(), Arc::new(MemoryObjectStore::default()));
    Harness {
        ctx: Arc::new(ctx),
        api,
        _db_dir: db_dir,
        _instance: instance,
    }
}

impl Harness {
    async fn user(&self, name: &str, role: &str) -> (users::Model, Option<String>) {
        let user = self
            .ctx
            .accounts
            .create_user(NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password: PASSWORD.to_string(),
                role: role.to_string(),
            })
            .await
            .unwrap();
        let reply = handlers::login(
            self.ctx.clone(),
            LoginRequest {
                username: name.to_string(),
                password: PASSWORD.to_string(),
            },
        )
        .await;
        assert_eq!(reply.status(), StatusCode::OK);
        let token = body(&reply)["token"].as_str().unwrap().to_string();
        (user, Some(token))
    }
}

fn body(reply: &ApiReply) -> &Value {
    match reply {
        ApiReply::Json { body, .. } => body,
        other => panic!("expected a json reply, got {:?}", other),
    }
}

fn rough_form() -> FormFields {
    FormFields::default()
        .with_text("mode", "rough_with_instructions")
        .with_text("color_instruction", "red")
        .with_text("pose_instruction", "pose")
        .with_file("rough_image", "rough.png", "image/png", png(4, 4))
}

#[tokio::test]
async fn test_rough_generation_end_to_end() {
    let h = harness().await;
    let (_, token) = h.user("artist", users::ROLE_USER).await;

    let reply = handlers::create_generation(h.ctx.clone(), token.clone(), rough_form()).await;
    assert_eq!(reply.status(), StatusCode::OK);
    let json = body(&reply);
    assert_eq!(json["generation"]["status"], "succeeded");
    assert_eq!(json["generation"]["mode"], "rough_with_instructions");
    let assets = json["assets"].as_array().unwrap();
    assert_eq!(assets.len(), 1);
    let asset_id = assets[0]["id"].as_i64().unwrap() as i32;
    assert_eq!(assets[0]["url"], format!("/api/assets/{}", asset_id));

    let prompt = match &h.api.image_calls.lock().unwrap()[0].0[0] {
        crate::provider::ContentPart::Text(text) => text.clone(),
        other => panic!("unexpected part {:?}", other),
    };
    assert!(prompt.contains("red"));
    assert!(prompt.contains("pose"));

    match handlers::asset(h.ctx.clone(), token.clone(), asset_id, false).await {
        ApiReply::Bytes {
            body, disposition, ..
        } => {
            assert_eq!(body, h.api.output);
            assert!(disposition.is_none());
        }
        other => panic!("expected bytes, got {:?}", other),
    }
    let generation_id = json["generation"]["id"].as_i64().unwrap();
    match handlers::asset(h.ctx.clone(), token.clone(), asset_id, true).await {
        ApiReply::Bytes { disposition, .. } => assert_eq!(
            disposition.as_deref(),
            Some(format!("attachment; filename=\"generated_{}.png\"", generation_id).as_str())
        ),
        other => panic!("expected bytes, got {:?}", other),
    }

    let latest = handlers::latest_generation(h.ctx.clone(), token.clone()).await;
    assert_eq!(body(&latest)["generation"]["id"].as_i64(), Some(generation_id));
    let listed = handlers::list_generations(h.ctx.clone(), token, ListQuery::default()).await;
    assert_eq!(body(&listed)["generations"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_overloaded_provider_is_503() {
    let h = harness().await;
    let (_, token) = h.user("artist", users::ROLE_USER).await;
    h.api.set_behavior(StubBehavior::Overloaded);

    let reply = handlers::create_generation(h.ctx.clone(), token, rough_form()).await;
    assert_eq!(reply.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body(&reply)["code"], "gemini_overloaded");

    let rows = generations::Entity::find().all(&h.ctx.db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, generations::STATUS_FAILED);
    assert_eq!(rows[0].error_code.as_deref(), Some("gemini_overloaded"));
}

#[tokio::test]
async fn test_unexpected_failure_hides_detail() {
    let h = harness().await;
    let (_, token) = h.user("artist", users::ROLE_USER).await;
    h.api.set_behavior(StubBehavior::Fail("upstream exploded: key=abc".into()));

    let reply = handlers::create_generation(h.ctx.clone(), token, rough_form()).await;
    assert_eq!(reply.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body(&reply)["error"], INTERNAL_ERROR_MESSAGE);
    assert_eq!(body(&reply)["code"], "internal_server_error_contact_admin");
    assert!(!body(&reply).to_string().contains("exploded"));

    let row = generations::Entity::find().one(&h.ctx.db).await.unwrap().unwrap();
    assert!(row.error_detail.unwrap_or_default().contains("exploded"));
}

#[tokio::test]
async fn test_missing_rough_image_is_400() {
    let h = harness().await;
    let (_, token) = h.user("artist", users::ROLE_USER).await;
    let form = FormFields::default().with_text("mode", "rough_with_instructions");
    let reply = handlers::create_generation(h.ctx.clone(), token, form).await;
    assert_eq!(reply.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body(&reply)["error"], "Please select a rough image.");
    assert_eq!(h.api.image_call_count(), 0);
}

#[tokio::test]
async fn test_non_admin_cannot_promote() {
    let h = harness().await;
    let (admin, admin_token) = h.user("admin", users::ROLE_ADMIN).await;
    let (user, user_token) = h.user("user", users::ROLE_USER).await;

    let reply = handlers::change_user_role(
        h.ctx.clone(),
        user_token.clone(),
        user.id,
        RoleRequest { role: "admin".into() },
    )
    .await;
    assert_eq!(reply.status(), StatusCode::FORBIDDEN);

    let reply = handlers::change_user_role(h.ctx.clone(), admin_token.clone(), user.id, RoleRequest { role: "admin".into() }).await;
    assert_eq!(reply.status(), StatusCode::OK);
    assert_eq!(body(&reply)["user"]["is_admin"], true);

    let reply = handlers::reset_user_password(
        h.ctx.clone(),
        admin_token,
        admin.id,
        PasswordResetRequest { password: "x".into() },
    )
    .await;
    assert_eq!(reply.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_me_logout() {
    let h = harness().await;
    let reply = handlers::me(h.ctx.clone(), None).await;
    assert_eq!(body(&reply)["authenticated"], false);

    let bad = handlers::login(
        h.ctx.clone(),
        LoginRequest {
            username: "ghost".into(),
            password: "nope".into(),
        },
    )
    .await;
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
    let empty = handlers::login(h.ctx.clone(), LoginRequest::default()).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let (user, token) = h.user("walker", users::ROLE_USER).await;
    let reply = handlers::me(h.ctx.clone(), token.clone()).await;
    assert_eq!(body(&reply)["user"]["id"].as_i64(), Some(user.id as i64));

    let reply = handlers::logout(h.ctx.clone(), token.clone()).await;
    match &reply {
        ApiReply::Json { set_cookie, .. } => assert!(set_cookie.as_deref().unwrap_or_default().contains("Max-Age=0")),
        other => panic!("unexpected {:?}", other),
    }
    let reply = handlers::list_sessions(h.ctx.clone(), token).await;
    assert_eq!(reply.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_user_management() {
    let h = harness().await;
    let (_, admin_token) = h.user("admin", users::ROLE_ADMIN).await;
    let (_, user_token) = h.user("member", users::ROLE_USER).await;

    let denied = handlers::list_users(h.ctx.clone(), user_token.clone()).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let created = handlers::create_user(
        h.ctx.clone(),
        admin_token.clone(),
        CreateUserRequest {
            username: "newbie".into(),
            email: "newbie@example.com".into(),
            password: "pw".into(),
            role: String::new(),
        },
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let newbie_id = body(&created)["user"]["id"].as_i64().unwrap() as i32;

    let disabled = handlers::set_user_status(
        h.ctx.clone(),
        admin_token.clone(),
        newbie_id,
        UserStatusRequest { is_active: false },
    )
    .await;
    assert_eq!(body(&disabled)["user"]["is_active"], false);

    let login = handlers::login(
        h.ctx.clone(),
        LoginRequest {
            username: "newbie".into(),
            password: "pw".into(),
        },
    )
    .await;
    assert_eq!(login.status(), StatusCode::FORBIDDEN);

    let listed = handlers::list_users(h.ctx.clone(), admin_token).await;
    assert_eq!(body(&listed)["users"].as_array().unwrap().len(), 3);

    let changed = handlers::change_own_password(
        h.ctx.clone(),
        user_token,
        PasswordChangeRequest {
            current_password: "wrong".into(),
            new_password: "next".into(),
        },
    )
    .await;
    assert_eq!(changed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_presets_endpoints() {
    let h = harness().await;
    let (_, token) = h.user("painter", users::ROLE_USER).await;
    let (_, other_token) = h.user("other", users::ROLE_USER).await;

    let created = handlers::create_preset(
        h.ctx.clone(),
        token.clone(),
        NewPreset {
            mode: None,
            name: "sunset".into(),
            color_instruction: "orange".into(),
            pose_instruction: "standing".into(),
        },
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let preset_id = body(&created)["preset"]["id"].as_i64().unwrap() as i32;

    let invalid = handlers::create_preset(h.ctx.clone(), token.clone(), NewPreset::default()).await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let listed = handlers::list_presets(h.ctx.clone(), token.clone(), ListQuery::default()).await;
    assert_eq!(body(&listed)["presets"][0]["color_instruction"], "orange");

    let foreign = handlers::delete_preset(h.ctx.clone(), other_token, preset_id).await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    let deleted = handlers::delete_preset(h.ctx.clone(), token, preset_id).await;
    assert_eq!(body(&deleted)["ok"], true);
}

#[tokio::test]
async fn test_soft_deleted_asset_is_gone() {
    let h = harness().await;
    let (_, token) = h.user("artist", users::ROLE_USER).await;
    let reply = handlers::create_generation(h.ctx.clone(), token.clone(), rough_form()).await;
    let asset_id = body(&reply)["assets"][0]["id"].as_i64().unwrap() as i32;

    let (_, stranger) = h.user("stranger", users::ROLE_USER).await;
    let foreign = handlers::delete_asset(h.ctx.clone(), stranger, asset_id).await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let deleted = handlers::delete_asset(h.ctx.clone(), token.clone(), asset_id).await;
    assert_eq!(deleted.status(), StatusCode::OK);
    let fetched = handlers::asset(h.ctx.clone(), token, asset_id, false).await;
    assert_eq!(fetched.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_flow() {
    let h = harness().await;
    let (_, token) = h.user("chatter", users::ROLE_USER).await;

    let listed = handlers::list_sessions(h.ctx.clone(), token.clone()).await;
    let sessions = body(&listed)["sessions"].as_array().unwrap().clone();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["title"], "New chat");
    let session_id = sessions[0]["id"].as_i64().unwrap() as i32;

    let form = FormFields::default()
        .with_text("mode_id", "text_chat")
        .with_text("message", "hello");
    let reply = handlers::send_message(h.ctx.clone(), token.clone(), session_id, form).await;
    assert_eq!(reply.status(), StatusCode::OK);
    assert_eq!(body(&reply)["assistant"]["text"], "stub reply");

    let form = FormFields::default()
        .with_text("mode_id", "rough_with_instructions")
        .with_text("color_instruction", "blue")
        .with_text("pose_instruction", "jump")
        .with_file("rough_image", "rough.png", "image/png", png(4, 4));
    let reply = handlers::send_message(h.ctx.clone(), token.clone(), session_id, form).await;
    let attachment = &body(&reply)["assistant"]["attachments"][0];
    assert_eq!(attachment["kind"], "result");
    let attachment_id = attachment["id"].as_i64().unwrap() as i32;

    let fetched = handlers::chat_attachment(h.ctx.clone(), token.clone(), attachment_id).await;
    assert!(matches!(fetched, ApiReply::Bytes { .. }));

    let detail = handlers::session_detail(h.ctx.clone(), token.clone(), session_id).await;
    let messages = body(&detail)["session"]["messages"].as_array().unwrap().clone();
    assert_eq!(messages.len(), 4);
    assert_eq!(body(&detail)["session"]["title"], "hello");

    h.api.set_behavior(StubBehavior::Overloaded);
    let form = FormFields::default()
        .with_text("mode_id", "session_edit")
        .with_text("message", "darker");
    let reply = handlers::send_message(h.ctx.clone(), token.clone(), session_id, form).await;
    assert_eq!(reply.status(), StatusCode::SERVICE_UNAVAILABLE);

    let (_, stranger) = h.user("stranger", users::ROLE_USER).await;
    let foreign = handlers::session_detail(h.ctx.clone(), stranger.clone(), session_id).await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    let foreign = handlers::chat_attachment(h.ctx.clone(), stranger, attachment_id).await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let created = handlers::create_session(
        h.ctx.clone(),
        token,
        CreateSessionRequest {
            title: Some("Ideas".into()),
        },
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(body(&created)["session"]["title"], "Ideas");
}

#[tokio::test]
async fn test_catalog_endpoints() {
    let modes = handlers::modes().await;
    assert_eq!(body(&modes)["modes"].as_array().unwrap().len(), 4);
    let options = handlers::options().await;
    assert_eq!(body(&options)["resolution_options"][3], "4K");
    let chat_modes = handlers::chat_modes().await;
    assert_eq!(body(&chat_modes)["modes"][0]["id"], "text_chat");
    let health = handlers::health().await;
    assert_eq!(body(&health)["status"], "ok");
}

mod through_routes {
    use super::*;
    use crate::web_interface::routes::routes;
    use crate::web_interface::web_server::handle_rejection;
    use warp::Filter;

    const BOUNDARY: &str = "sketchforge-boundary";

    fn api(h: &Harness) -> impl Filter<Extract = (ApiReply,), Error = std::convert::Infallible> + Clone + 'static {
        routes(h.ctx.clone()).recover(handle_rejection).unify()
    }

    fn json_of(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    fn multipart_body(texts: &[(&str, &str)], file: Option<(&str, &str, Vec<u8>)>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in texts {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((name, filename, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                    BOUNDARY, name, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(&bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    #[tokio::test]
    async fn test_login_cookie_authenticates_me() {
        let h = harness().await;
        h.user("walker", users::ROLE_USER).await;

        let response = warp::test::request()
            .method("POST")
            .path("/api/auth/login")
            .json(&serde_json::json!({ "username": "walker", "password": PASSWORD }))
            .reply(&api(&h))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()["set-cookie"].to_str().unwrap().to_string();
        assert!(cookie.starts_with("sketchforge_session="));
        assert!(cookie.contains("HttpOnly"));
        let pair = cookie.split(';').next().unwrap().to_string();

        let response = warp::test::request()
            .path("/api/me")
            .header("cookie", pair)
            .reply(&api(&h))
            .await;
        let body = json_of(response.body());
        assert_eq!(body["authenticated"], true);
        assert_eq!(body["user"]["username"], "walker");

        let response = warp::test::request()
            .method("POST")
            .path("/api/auth/login")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&api(&h))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_routes_need_an_admin_bearer() {
        let h = harness().await;
        let (user, user_token) = h.user("member", users::ROLE_USER).await;
        let (_, admin_token) = h.user("admin", users::ROLE_ADMIN).await;

        let response = warp::test::request()
            .method("PATCH")
            .path(&format!("/api/admin/users/{}/role", user.id))
            .header("authorization", format!("Bearer {}", user_token.unwrap()))
            .json(&serde_json::json!({ "role": "admin" }))
            .reply(&api(&h))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = warp::test::request()
            .path("/api/admin/users")
            .header("authorization", format!("Bearer {}", admin_token.unwrap()))
            .reply(&api(&h))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_of(response.body())["users"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_multipart_generation_and_asset_download() {
        let h = harness().await;
        let (_, token) = h.user("artist", users::ROLE_USER).await;
        let bearer = format!("Bearer {}", token.unwrap());

        let body = multipart_body(
            &[
                ("mode", "rough_with_instructions"),
                ("color_instruction", "red"),
                ("pose_instruction", "pose"),
            ],
            Some(("rough_image", "rough.png", png(4, 4))),
        );
        let response = warp::test::request()
            .method("POST")
            .path("/api/generations")
            .header("authorization", bearer.as_str())
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(body)
            .reply(&api(&h))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let created = json_of(response.body());
        assert_eq!(created["generation"]["status"], "succeeded");
        let asset_url = created["assets"][0]["url"].as_str().unwrap().to_string();

        let response = warp::test::request()
            .path(&format!("{}/download", asset_url))
            .header("authorization", bearer.as_str())
            .reply(&api(&h))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/png");
        assert!(response.headers()["content-disposition"]
            .to_str()
            .unwrap()
            .starts_with("attachment; filename=\"generated_"));
        assert_eq!(response.body().as_ref(), h.api.output.as_slice());

        let response = warp::test::request()
            .path("/api/generations/latest")
            .reply(&api(&h))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chat_routes() {
        let h = harness().await;
        let (_, token) = h.user("chatter", users::ROLE_USER).await;
        let bearer = format!("Bearer {}", token.unwrap());

        let response = warp::test::request()
            .path("/api/chat/sessions")
            .header("authorization", bearer.as_str())
            .reply(&api(&h))
            .await;
        let session_id = json_of(response.body())["sessions"][0]["id"].as_i64().unwrap();

        let body = multipart_body(&[("mode_id", "text_chat"), ("message", "hello")], None);
        let response = warp::test::request()
            .method("POST")
            .path(&format!("/api/chat/sessions/{}/messages", session_id))
            .header("authorization", bearer.as_str())
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(body)
            .reply(&api(&h))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_of(response.body())["assistant"]["text"], "stub reply");

        let response = warp::test::request()
            .path("/api/chat/sessions/9999")
            .header("authorization", bearer.as_str())
            .reply(&api(&h))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ui_and_unknown_paths() {
        let h = harness().await;
        let response = warp::test::request().path("/").reply(&api(&h)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/html");

        let response = warp::test::request().path("/static/app.js").reply(&api(&h)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = warp::test::request().path("/api/nope").reply(&api(&h)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_of(response.body())["error"], "Not found.");

        let response = warp::test::request().path("/api/health").reply(&api(&h)).await;
        assert_eq!(json_of(response.body())["status"], "ok");
    }
}
