use chrono::{Duration, Utc};
use log::debug;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::db_entities::{auth_tokens, users};
use crate::storage::object_storage::sha256_hex;

/// Cookie carrying the login token for browser clients.
pub const SESSION_COOKIE: &str = "sketchforge_session";

/// Picks the token from an `Authorization: Bearer` header, else from the session cookie.
pub fn token_from_headers(authorization: Option<&str>, cookie: Option<&str>) -> Option<String> {
    let bearer = authorization
        .and_then(|value| value.trim().strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    cookie?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Creates a token for `user_id` valid for `ttl_hours`. Only its hash is stored.
pub async fn issue(db: &DatabaseConnection, user_id: i32, ttl_hours: i64) -> Result<String, StorageError> {
    let token = Uuid::new_v4().simple().to_string();
    let now = Utc::now();
    auth_tokens::ActiveModel {
        user_id: Set(user_id),
        token_hash: Set(sha256_hex(token.as_bytes())),
        created_at: Set(now),
        expires_at: Set(now + Duration::hours(ttl_hours.max(1))),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(token)
}

/// The active user a token belongs to. Expired tokens are removed on sight.
pub async fn resolve(db: &DatabaseConnection, token: &str) -> Result<Option<users::Model>, StorageError> {
    let Some((row, user)) = auth_tokens::Entity::find()
        .filter(auth_tokens::Column::TokenHash.eq(sha256_hex(token.as_bytes())))
        .find_also_related(users::Entity)
        .one(db)
        .await?
    else {
        return Ok(None);
    };
    if row.expires_at <= Utc::now() {
        debug!("Dropping expired token of user {}", row.user_id);
        auth_tokens::Entity::delete_by_id(row.id).exec(db).await?;
        return Ok(None);
    }
    Ok(user.filter(|u| u.is_active))
}

pub async fn revoke(db: &DatabaseConnection, token: &str) -> Result<(), StorageError> {
    auth_tokens::Entity::delete_many()
        .filter(auth_tokens::Column::TokenHash.eq(sha256_hex(token.as_bytes())))
        .exec(db)
        .await?;
    Ok(())
}

/// Drops every token of a user, returning how many were removed.
pub async fn revoke_all(db: &DatabaseConnection, user_id: i32) -> Result<u64, StorageError> {
    let result = auth_tokens::Entity::delete_many()
        .filter(auth_tokens::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
