use std::time::Duration;

use log::{error, info};
use sea_orm::sea_query::Index;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};

use crate::error_handling::types::StorageError;
use crate::storage::db_entities::{
    auth_tokens, chat_attachments, chat_messages, chat_sessions, generation_assets, generations,
    presets, users,
};

/// Opens the database and makes sure every table exists.
pub async fn connect(url: &str) -> Result<DatabaseConnection, StorageError> {
    let mut options = ConnectOptions::new(url.to_owned());
    options
        .max_connections(5)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    let db = Database::connect(options).await.map_err(|e| {
        error!("Failed to open database {}: {}", url, e);
        StorageError::ConnectionFailed
    })?;
    ensure_schema(&db).await?;
    info!("Database ready at {}", url);
    Ok(db)
}

/// Creates missing tables (parents first) and the unique preset index.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), StorageError> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut tables = vec![
        schema.create_table_from_entity(users::Entity),
        schema.create_table_from_entity(auth_tokens::Entity),
        schema.create_table_from_entity(presets::Entity),
        schema.create_table_from_entity(generations::Entity),
        schema.create_table_from_entity(generation_assets::Entity),
        schema.create_table_from_entity(chat_sessions::Entity),
        schema.create_table_from_entity(chat_messages::Entity),
        schema.create_table_from_entity(chat_attachments::Entity),
    ];
    for table in tables.iter_mut() {
        table.if_not_exists();
        db.execute(backend.build(&*table)).await.map_err(|e| {
            error!("Failed to create table: {}", e);
            StorageError::WriteFailed
        })?;
    }

    let preset_index = Index::create()
        .if_not_exists()
        .name("ux_presets_user_mode_name")
        .table(presets::Entity)
        .col(presets::Column::UserId)
        .col(presets::Column::Mode)
        .col(presets::Column::Name)
        .unique()
        .to_owned();
    db.execute(backend.build(&preset_index)).await.map_err(|e| {
        error!("Failed to create preset index: {}", e);
        StorageError::WriteFailed
    })?;
    Ok(())
}
