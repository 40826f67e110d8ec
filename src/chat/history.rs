use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, Set, TransactionTrait,
};

use crate::error_handling::types::StorageError;
use crate::storage::db_entities::{chat_attachments, chat_messages, chat_sessions};
use crate::storage::StoredObject;

pub const DEFAULT_TITLE: &str = "New chat";
pub const TITLE_CHARS: usize = 30;
pub const MAX_TITLE_CHARS: usize = 120;
pub const HISTORY_LIMIT: u64 = 8;

/// An attachment about to be written with its message.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub kind: String,
    pub stored: StoredObject,
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct MessageWithAttachments {
    pub message: chat_messages::Model,
    pub attachments: Vec<chat_attachments::Model>,
}

#[derive(Debug, Clone)]
pub struct SessionDetail {
    pub session: chat_sessions::Model,
    pub messages: Vec<MessageWithAttachments>,
}

pub async fn create_session(db: &DatabaseConnection, user_id: i32, title: Option<&str>) -> Result<chat_sessions::Model, StorageError> {
    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.chars().take(MAX_TITLE_CHARS).collect())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let now = Utc::now();
    let session = chat_sessions::ActiveModel {
        user_id: Set(user_id),
        title: Set(title),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(session)
}

pub async fn find_session(db: &DatabaseConnection, user_id: i32, session_id: i32) -> Result<Option<chat_sessions::Model>, StorageError> {
    Ok(chat_sessions::Entity::find_by_id(session_id)
        .filter(chat_sessions::Column::UserId.eq(user_id))
        .one(db)
        .await?)
}

/// Sessions of a user, most recently active first.
pub async fn list_sessions(db: &DatabaseConnection, user_id: i32) -> Result<Vec<chat_sessions::Model>, StorageError> {
    Ok(chat_sessions::Entity::find()
        .filter(chat_sessions::Column::UserId.eq(user_id))
        .order_by_desc(chat_sessions::Column::UpdatedAt)
        .order_by_desc(chat_sessions::Column::Id)
        .all(db)
        .await?)
}

pub async fn touch_session(db: &DatabaseConnection, session_id: i32) -> Result<(), StorageError> {
    chat_sessions::ActiveModel {
        id: Set(session_id),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .update(db)
    .await?;
    Ok(())
}

/// Derives the title from the first message while the session still has the default one.
///
/// Returns whether the title changed.
pub async fn update_session_title(db: &DatabaseConnection, session_id: i32, user_text: &str) -> Result<bool, StorageError> {
    let Some(session) = chat_sessions::Entity::find_by_id(session_id).one(db).await? else {
        return Ok(false);
    };
    let trimmed = user_text.trim();
    if session.title != DEFAULT_TITLE || trimmed.is_empty() {
        return Ok(false);
    }
    let mut active: chat_sessions::ActiveModel = session.into();
    active.title = Set(trimmed.chars().take(TITLE_CHARS).collect());
    active.update(db).await?;
    Ok(true)
}

/// Appends a message and its attachments in one transaction.
pub async fn add_message(
    db: &DatabaseConnection,
    session_id: i32,
    role: &str,
    text: Option<String>,
    mode_id: Option<&str>,
    attachments: Vec<NewAttachment>,
) -> Result<MessageWithAttachments, StorageError> {
    let now = Utc::now();
    let txn = db.begin().await?;
    let message = chat_messages::ActiveModel {
        session_id: Set(session_id),
        role: Set(role.to_string()),
        text: Set(text),
        mode_id: Set(mode_id.map(str::to_string)),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    let mut saved = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        let row = chat_attachments::ActiveModel {
            message_id: Set(message.id),
            kind: Set(attachment.kind),
            storage_backend: Set(attachment.stored.storage_backend.as_str().to_string()),
            bucket: Set(attachment.stored.bucket),
            object_name: Set(attachment.stored.object_name),
            mime_type: Set(attachment.mime_type),
            byte_size: Set(attachment.stored.byte_size),
            width: Set(attachment.width.and_then(|w| i32::try_from(w).ok())),
            height: Set(attachment.height.and_then(|h| i32::try_from(h).ok())),
            sha256: Set(attachment.stored.sha256),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        saved.push(row);
    }
    txn.commit().await?;
    Ok(MessageWithAttachments {
        message,
        attachments: saved,
    })
}

/// The last `limit` user and assistant messages carrying text, oldest first.
pub async fn recent_text_history(db: &DatabaseConnection, session_id: i32, limit: u64) -> Result<Vec<chat_messages::Model>, StorageError> {
    let mut rows = chat_messages::Entity::find()
        .filter(chat_messages::Column::SessionId.eq(session_id))
        .filter(chat_messages::Column::Text.is_not_null())
        .filter(chat_messages::Column::Role.ne(chat_messages::ROLE_SYSTEM))
        .order_by_desc(chat_messages::Column::CreatedAt)
        .order_by_desc(chat_messages::Column::Id)
        .limit(limit)
        .all(db)
        .await?;
    rows.reverse();
    Ok(rows)
}

pub async fn session_detail(db: &DatabaseConnection, session: chat_sessions::Model) -> Result<SessionDetail, StorageError> {
    let messages = chat_messages::Entity::find()
        .filter(chat_messages::Column::SessionId.eq(session.id))
        .order_by_asc(chat_messages::Column::Id)
        .all(db)
        .await?;
    let ids: Vec<i32> = messages.iter().map(|m| m.id).collect();
    let mut by_message: HashMap<i32, Vec<chat_attachments::Model>> = HashMap::new();
    if !ids.is_empty() {
        let attachments = chat_attachments::Entity::find()
            .filter(chat_attachments::Column::MessageId.is_in(ids))
            .order_by_asc(chat_attachments::Column::Id)
            .all(db)
            .await?;
        for attachment in attachments {
            by_message.entry(attachment.message_id).or_default().push(attachment);
        }
    }
    let messages = messages
        .into_iter()
        .map(|message| MessageWithAttachments {
            attachments: by_message.remove(&message.id).unwrap_or_default(),
            message,
        })
        .collect();
    Ok(SessionDetail { session, messages })
}

/// Most recent attachment on an assistant message of the session.
pub async fn last_assistant_attachment(db: &DatabaseConnection, session_id: i32) -> Result<Option<chat_attachments::Model>, StorageError> {
    Ok(chat_attachments::Entity::find()
        .join(JoinType::InnerJoin, chat_attachments::Relation::Message.def())
        .filter(chat_messages::Column::SessionId.eq(session_id))
        .filter(chat_messages::Column::Role.eq(chat_messages::ROLE_ASSISTANT))
        .order_by_desc(chat_messages::Column::CreatedAt)
        .order_by_desc(chat_attachments::Column::Id)
        .one(db)
        .await?)
}

/// An attachment whose session belongs to `user_id`.
pub async fn find_owned_attachment(
    db: &DatabaseConnection,
    user_id: i32,
    attachment_id: i32,
) -> Result<Option<chat_attachments::Model>, StorageError> {
    let Some((attachment, Some(message))) = chat_attachments::Entity::find_by_id(attachment_id)
        .find_also_related(chat_messages::Entity)
        .one(db)
        .await?
    else {
        return Ok(None);
    };
    let owned = find_session(db, user_id, message.session_id).await?.is_some();
    Ok(owned.then_some(attachment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database_storage::testing::{insert_user, temp_db};
    use crate::storage::db_entities::users;
    use crate::storage::StorageBackend;

    fn stored(name: &str) -> NewAttachment {
        NewAttachment {
            kind: "result".into(),
            stored: StoredObject {
                storage_backend: StorageBackend::Local,
                bucket: None,
                object_name: name.into(),
                byte_size: 3,
                sha256: "00".repeat(32),
            },
            mime_type: "image/png".into(),
            width: Some(2),
            height: Some(2),
        }
    }

    #[tokio::test]
    async fn test_title_updates_exactly_once() {
        let (db, _dir) = temp_db().await;
        let user = insert_user(&db, "writer", users::ROLE_USER).await;
        let session = create_session(&db, user.id, None).await.unwrap();
        assert_eq!(session.title, DEFAULT_TITLE);

        assert!(!update_session_title(&db, session.id, "   ").await.unwrap());
        let long = "  a very long first message that keeps going and going  ";
        assert!(update_session_title(&db, session.id, long).await.unwrap());
        assert!(!update_session_title(&db, session.id, "second message").await.unwrap());
        let session = find_session(&db, user.id, session.id).await.unwrap().unwrap();
        assert_eq!(session.title, "a very long first message that");
        assert_eq!(session.title.chars().count(), TITLE_CHARS);

        let custom = create_session(&db, user.id, Some("My title")).await.unwrap();
        assert!(!update_session_title(&db, custom.id, "hello").await.unwrap());
    }

    #[tokio::test]
    async fn test_history_is_chronological_and_limited() {
        let (db, _dir) = temp_db().await;
        let user = insert_user(&db, "talker", users::ROLE_USER).await;
        let session = create_session(&db, user.id, None).await.unwrap();
        for i in 0..10 {
            let role = if i % 2 == 0 { chat_messages::ROLE_USER } else { chat_messages::ROLE_ASSISTANT };
            add_message(&db, session.id, role, Some(format!("m{}", i)), None, vec![]).await.unwrap();
        }
        add_message(&db, session.id, chat_messages::ROLE_ASSISTANT, None, None, vec![stored("x.png")])
            .await
            .unwrap();
        add_message(&db, session.id, chat_messages::ROLE_SYSTEM, Some("Request failed".into()), None, vec![])
            .await
            .unwrap();

        let history = recent_text_history(&db, session.id, HISTORY_LIMIT).await.unwrap();
        let texts: Vec<String> = history.into_iter().filter_map(|m| m.text).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4", "m5", "m6", "m7", "m8", "m9"]);
    }

    #[tokio::test]
    async fn test_attachments_and_ownership() {
        let (db, _dir) = temp_db().await;
        let owner = insert_user(&db, "owner", users::ROLE_USER).await;
        let stranger = insert_user(&db, "stranger", users::ROLE_USER).await;
        let session = create_session(&db, owner.id, None).await.unwrap();

        assert!(last_assistant_attachment(&db, session.id).await.unwrap().is_none());
        add_message(&db, session.id, chat_messages::ROLE_USER, Some("hi".into()), None, vec![stored("user.png")])
            .await
            .unwrap();
        assert!(last_assistant_attachment(&db, session.id).await.unwrap().is_none());

        add_message(&db, session.id, chat_messages::ROLE_ASSISTANT, None, None, vec![stored("a.png")])
            .await
            .unwrap();
        let latest = add_message(&db, session.id, chat_messages::ROLE_ASSISTANT, None, None, vec![stored("b.png")])
            .await
            .unwrap();
        let found = last_assistant_attachment(&db, session.id).await.unwrap().unwrap();
        assert_eq!(found.object_name, "b.png");

        let id = latest.attachments[0].id;
        assert!(find_owned_attachment(&db, owner.id, id).await.unwrap().is_some());
        assert!(find_owned_attachment(&db, stranger.id, id).await.unwrap().is_none());

        let detail = session_detail(&db, session).await.unwrap();
        assert_eq!(detail.messages.len(), 3);
        assert_eq!(detail.messages[0].attachments[0].object_name, "user.png");
        assert_eq!(detail.messages[2].attachments[0].width, Some(2));
    }
}
