use std::convert::Infallible;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use warp::filters::BoxedFilter;
use warp::path::Tail;
use warp::{Filter, Rejection};

use super::form::{read_form, FormFields};
use super::handlers;
use super::reply::ApiReply;
use super::types::{
    CreateSessionRequest, CreateUserRequest, ListQuery, LoginRequest, PasswordChangeRequest, PasswordResetRequest,
    RoleRequest, UserStatusRequest,
};
use super::web_server::static_asset;
use crate::accounts::presets::NewPreset;
use crate::accounts::token_from_headers;
use crate::controller::controller_handler::AppContext;

const JSON_BODY_LIMIT: u64 = 64 * 1024;

type Route = BoxedFilter<(ApiReply,)>;
type Form = Result<FormFields, warp::Error>;

fn with_ctx(ctx: Arc<AppContext>) -> impl Filter<Extract = (Arc<AppContext>,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

/// The caller's token from `Authorization: Bearer` or the session cookie.
fn with_token() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::header::optional::<String>("cookie"))
        .map(|authorization: Option<String>, cookie: Option<String>| {
            token_from_headers(authorization.as_deref(), cookie.as_deref())
        })
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(JSON_BODY_LIMIT).and(warp::body::json())
}

fn multipart(max_bytes: u64) -> impl Filter<Extract = (Form,), Error = Rejection> + Clone {
    warp::multipart::form().max_length(max_bytes).then(read_form)
}

fn account_routes(ctx: &Arc<AppContext>) -> Vec<Route> {
    let me = warp::path!("api" / "me")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .then(handlers::me)
        .boxed();
    let login = warp::path!("api" / "auth" / "login")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(json_body::<LoginRequest>())
        .then(handlers::login)
        .boxed();
    let logout = warp::path!("api" / "auth" / "logout")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .then(handlers::logout)
        .boxed();
    let list_users = warp::path!("api" / "admin" / "users")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .then(handlers::list_users)
        .boxed();
    let create_user = warp::path!("api" / "admin" / "users")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .and(json_body::<CreateUserRequest>())
        .then(handlers::create_user)
        .boxed();
    let user_status = warp::path!("api" / "admin" / "users" / i32 / "status")
        .and(warp::patch())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .and(json_body::<UserStatusRequest>())
        .then(|id: i32, ctx: Arc<AppContext>, token: Option<String>, body| {
            handlers::set_user_status(ctx, token, id, body)
        })
        .boxed();
    let user_password = warp::path!("api" / "admin" / "users" / i32 / "password")
        .and(warp::patch())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .and(json_body::<PasswordResetRequest>())
        .then(|id: i32, ctx: Arc<AppContext>, token: Option<String>, body| {
            handlers::reset_user_password(ctx, token, id, body)
        })
        .boxed();
    let user_role = warp::path!("api" / "admin" / "users" / i32 / "role")
        .and(warp::patch())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .and(json_body::<RoleRequest>())
        .then(|id: i32, ctx: Arc<AppContext>, token: Option<String>, body| {
            handlers::change_user_role(ctx, token, id, body)
        })
        .boxed();
    let own_password = warp::path!("api" / "users" / "me" / "password")
        .and(warp::patch())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .and(json_body::<PasswordChangeRequest>())
        .then(handlers::change_own_password)
        .boxed();
    let list_presets = warp::path!("api" / "presets")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .and(warp::query::<ListQuery>())
        .then(handlers::list_presets)
        .boxed();
    let create_preset = warp::path!("api" / "presets")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .and(json_body::<NewPreset>())
        .then(handlers::create_preset)
        .boxed();
    let delete_preset = warp::path!("api" / "presets" / i32)
        .and(warp::delete())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .then(|id: i32, ctx: Arc<AppContext>, token: Option<String>| {
            handlers::delete_preset(ctx, token, id)
        })
        .boxed();
    vec![
        me,
        login,
        logout,
        list_users,
        create_user,
        user_status,
        user_password,
        user_role,
        own_password,
        list_presets,
        create_preset,
        delete_preset,
    ]
}

fn generation_routes(ctx: &Arc<AppContext>) -> Vec<Route> {
    let max_upload = ctx.config.server.max_upload_bytes;
    let modes = warp::path!("api" / "modes").and(warp::get()).then(handlers::modes).boxed();
    let options = warp::path!("api" / "options").and(warp::get()).then(handlers::options).boxed();
    let create = warp::path!("api" / "generations")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .and(multipart(max_upload))
        .then(|ctx: Arc<AppContext>, token: Option<String>, form: Form| async move {
            match form {
                Ok(fields) => handlers::create_generation(ctx, token, fields).await,
                Err(e) => handlers::unreadable_form(e),
            }
        })
        .boxed();
    let list = warp::path!("api" / "generations")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .and(warp::query::<ListQuery>())
        .then(handlers::list_generations)
        .boxed();
    let latest = warp::path!("api" / "generations" / "latest")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .then(handlers::latest_generation)
        .boxed();
    let detail = warp::path!("api" / "generations" / i32)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .then(|id: i32, ctx: Arc<AppContext>, token: Option<String>| {
            handlers::generation_detail(ctx, token, id)
        })
        .boxed();
    let asset = warp::path!("api" / "assets" / i32)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .then(|id: i32, ctx: Arc<AppContext>, token: Option<String>| {
            handlers::asset(ctx, token, id, false)
        })
        .boxed();
    let download = warp::path!("api" / "assets" / i32 / "download")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .then(|id: i32, ctx: Arc<AppContext>, token: Option<String>| {
            handlers::asset(ctx, token, id, true)
        })
        .boxed();
    let delete_asset = warp::path!("api" / "assets" / i32)
        .and(warp::delete())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .then(|id: i32, ctx: Arc<AppContext>, token: Option<String>| {
            handlers::delete_asset(ctx, token, id)
        })
        .boxed();
    vec![modes, options, create, list, latest, detail, asset, download, delete_asset]
}

fn chat_routes(ctx: &Arc<AppContext>) -> Vec<Route> {
    let max_upload = ctx.config.server.max_upload_bytes;
    let modes = warp::path!("api" / "chat" / "modes")
        .and(warp::get())
        .then(handlers::chat_modes)
        .boxed();
    let list = warp::path!("api" / "chat" / "sessions")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .then(handlers::list_sessions)
        .boxed();
    let create = warp::path!("api" / "chat" / "sessions")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .and(json_body::<CreateSessionRequest>())
        .then(handlers::create_session)
        .boxed();
    let detail = warp::path!("api" / "chat" / "sessions" / i32)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .then(|id: i32, ctx: Arc<AppContext>, token: Option<String>| {
            handlers::session_detail(ctx, token, id)
        })
        .boxed();
    let send = warp::path!("api" / "chat" / "sessions" / i32 / "messages")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .and(multipart(max_upload))
        .then(|id: i32, ctx: Arc<AppContext>, token: Option<String>, form: Form| async move {
            match form {
                Ok(fields) => handlers::send_message(ctx, token, id, fields).await,
                Err(e) => handlers::unreadable_form(e),
            }
        })
        .boxed();
    let attachment = warp::path!("api" / "chat" / "attachments" / i32)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and(with_token())
        .then(|id: i32, ctx: Arc<AppContext>, token: Option<String>| {
            handlers::chat_attachment(ctx, token, id)
        })
        .boxed();
    vec![modes, list, create, detail, send, attachment]
}

fn ui_routes() -> Vec<Route> {
    let index = warp::path::end()
        .and(warp::get())
        .then(|| async { static_asset("index.html") })
        .boxed();
    let assets = warp::path("static")
        .and(warp::path::tail())
        .and(warp::get())
        .then(|tail: Tail| async move { static_asset(tail.as_str()) })
        .boxed();
    vec![index, assets]
}

/// Every route of the application, without rejection handling.
pub fn routes(ctx: Arc<AppContext>) -> Route {
    let health = warp::path!("api" / "health").and(warp::get()).then(handlers::health).boxed();
    account_routes(&ctx)
        .into_iter()
        .chain(generation_routes(&ctx))
        .chain(chat_routes(&ctx))
        .chain(ui_routes())
        .fold(health, |all, route| all.or(route).unify().boxed())
}
