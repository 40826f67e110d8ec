use log::error;
use serde::Serialize;
use serde_json::{json, Value};
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};

use crate::error_handling::types::{
    AuthError, ChatError, GenerationError, GenerationErrorKind, StorageError, INTERNAL_ERROR_MESSAGE,
};

/// The single reply type of every route.
#[derive(Debug)]
pub enum ApiReply {
    Json {
        status: StatusCode,
        body: Value,
        set_cookie: Option<String>,
    },
    Bytes {
        body: Vec<u8>,
        content_type: String,
        disposition: Option<String>,
    },
}

impl ApiReply {
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        let body = serde_json::to_value(body).unwrap_or_else(|e| {
            error!("Failed to serialize response: {}", e);
            json!({ "error": INTERNAL_ERROR_MESSAGE })
        });
        ApiReply::Json {
            status,
            body,
            set_cookie: None,
        }
    }

    pub fn ok<T: Serialize>(body: &T) -> Self {
        Self::json(StatusCode::OK, body)
    }

    pub fn created<T: Serialize>(body: &T) -> Self {
        Self::json(StatusCode::CREATED, body)
    }

    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::json(status, &json!({ "error": message }))
    }

    pub fn not_found(message: &str) -> Self {
        Self::error(StatusCode::NOT_FOUND, message)
    }

    pub fn bytes(body: Vec<u8>, content_type: &str, disposition: Option<String>) -> Self {
        ApiReply::Bytes {
            body,
            content_type: content_type.to_string(),
            disposition,
        }
    }

    pub fn with_cookie(self, cookie: String) -> Self {
        match self {
            ApiReply::Json { status, body, .. } => ApiReply::Json {
                status,
                body,
                set_cookie: Some(cookie),
            },
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiReply::Json { status, .. } => *status,
            ApiReply::Bytes { .. } => StatusCode::OK,
        }
    }
}

impl Reply for ApiReply {
    fn into_response(self) -> Response {
        match self {
            ApiReply::Json {
                status,
                body,
                set_cookie,
            } => {
                let json = reply::with_status(reply::json(&body), status);
                match set_cookie {
                    Some(cookie) => reply::with_header(json, "set-cookie", cookie).into_response(),
                    None => json.into_response(),
                }
            }
            ApiReply::Bytes {
                body,
                content_type,
                disposition,
            } => {
                let bytes = reply::with_header(body, "content-type", content_type);
                match disposition {
                    Some(disposition) => reply::with_header(bytes, "content-disposition", disposition).into_response(),
                    None => bytes.into_response(),
                }
            }
        }
    }
}

/// Status and body for a failed generation. Only the user-facing message is sent.
pub fn generation_error(err: &GenerationError) -> ApiReply {
    let status = match err.kind {
        GenerationErrorKind::Validation | GenerationErrorKind::MissingCredentials => StatusCode::BAD_REQUEST,
        GenerationErrorKind::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        GenerationErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    ApiReply::json(status, &json!({ "error": err.message, "code": err.code() }))
}

pub fn storage_error(context: &str, err: &StorageError) -> ApiReply {
    error!("{} failed: {}", context, err);
    ApiReply::error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
}

pub fn auth_error(err: AuthError) -> ApiReply {
    let status = match &err {
        AuthError::MissingCredentials | AuthError::Invalid(_) => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
        AuthError::Inactive | AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
        AuthError::NotFound(_) => StatusCode::NOT_FOUND,
        AuthError::Hashing(_) | AuthError::Storage(_) => {
            error!("Account operation failed: {}", err);
            return ApiReply::error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE);
        }
    };
    ApiReply::error(status, &err.to_string())
}

pub fn chat_error(err: ChatError) -> ApiReply {
    match err {
        ChatError::SessionNotFound => ApiReply::not_found("The chat session was not found."),
        ChatError::Generation(e) => generation_error(&e),
        ChatError::Storage(e) => storage_error("Chat", &e),
    }
}
