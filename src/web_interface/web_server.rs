use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use rust_embed::RustEmbed;
use warp::http::StatusCode;
use warp::{Filter, Rejection};

use super::reply::ApiReply;
use super::routes;
use crate::controller::controller_handler::AppContext;
use crate::error_handling::types::{WebError, INTERNAL_ERROR_MESSAGE};

/// Single-page UI bundled into the binary.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/static/"]
struct StaticAssets;

/// Embedded file with a content type guessed from its path.
pub fn static_asset(path: &str) -> ApiReply {
    match StaticAssets::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            ApiReply::bytes(file.data.into_owned(), mime.as_ref(), None)
        }
        None => ApiReply::not_found("Not found."),
    }
}

/// Turns warp rejections (unknown path, bad body, oversized upload) into JSON errors.
pub async fn handle_rejection(err: Rejection) -> Result<ApiReply, Infallible> {
    let reply = if err.is_not_found() {
        ApiReply::not_found("Not found.")
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        info!("Rejected request body: {}", e);
        ApiReply::error(StatusCode::BAD_REQUEST, "The request body is invalid.")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        ApiReply::error(StatusCode::PAYLOAD_TOO_LARGE, "The upload is too large.")
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        ApiReply::error(StatusCode::BAD_REQUEST, "The query string is invalid.")
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        ApiReply::error(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported content type.")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiReply::error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed.")
    } else {
        error!("Unhandled rejection: {:?}", err);
        ApiReply::error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
    };
    Ok(reply)
}

/// Web server for the HTTP API and the embedded UI
pub struct WebServer {
    ctx: Arc<AppContext>,
}

impl WebServer {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Serves until the process stops.
    pub async fn start(&self, addr: SocketAddr) -> Result<(), WebError> {
        // warp panics when it cannot bind, so probe the address first
        let probe = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| WebError::BindFailed(format!("{}: {}", addr, e)))?;
        drop(probe);

        let routes = routes::routes(self.ctx.clone())
            .recover(handle_rejection)
            .unify()
            .with(warp::log("sketchforge::http"));

        info!("Listening on http://{}", addr);
        warp::serve(routes).run(addr).await;
        Ok(())
    }
}
