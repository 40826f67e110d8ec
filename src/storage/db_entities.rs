//! SeaORM entity models used by the database backend.
//!
//! Tables, each child cascading on delete of its parent:
//! - `users`: accounts and roles
//! - `auth_tokens`: hashed login tokens of a user
//! - `presets`: saved instruction sets per user and mode
//! - `generations`: one row per generation attempt
//! - `generation_assets`: stored outputs of a generation
//! - `chat_sessions`: conversations of a user
//! - `chat_messages`: ordered messages of a session
//! - `chat_attachments`: stored images of a message

/// Users table entity models.
pub mod users {
    use sea_orm::entity::prelude::*;

    pub const ROLE_ADMIN: &str = "admin";
    pub const ROLE_USER: &str = "user";

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        #[sea_orm(unique)]
        pub username: String,
        #[sea_orm(unique)]
        pub email: String,
        /// bcrypt hash
        pub password_hash: String,
        /// `admin` or `user`
        pub role: String,
        pub is_active: bool,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
        pub last_login_at: Option<DateTimeUtc>,
    }

    impl Model {
        pub fn is_admin(&self) -> bool {
            self.role == ROLE_ADMIN
        }
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Login tokens; only the SHA-256 of the token is stored.
pub mod auth_tokens {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "auth_tokens")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub user_id: i32,
        #[sea_orm(unique)]
        pub token_hash: String,
        pub created_at: DateTimeUtc,
        pub expires_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::users::Entity",
            from = "Column::UserId",
            to = "super::users::Column::Id",
            on_delete = "Cascade"
        )]
        User,
    }

    impl Related<super::users::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::User.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Presets table entity models. (user_id, mode, name) is unique.
pub mod presets {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "presets")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub user_id: i32,
        pub mode: String,
        pub name: String,
        /// Mode-specific instruction fields as a JSON object
        #[sea_orm(column_type = "Text")]
        pub payload_json: String,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::users::Entity",
            from = "Column::UserId",
            to = "super::users::Column::Id",
            on_delete = "Cascade"
        )]
        User,
    }

    impl Related<super::users::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::User.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Generation attempts.
pub mod generations {
    use sea_orm::entity::prelude::*;

    pub const STATUS_QUEUED: &str = "queued";
    pub const STATUS_RUNNING: &str = "running";
    pub const STATUS_SUCCEEDED: &str = "succeeded";
    pub const STATUS_FAILED: &str = "failed";

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "generations")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub user_id: i32,
        pub mode: String,
        pub aspect_ratio: Option<String>,
        pub resolution: Option<String>,
        /// `inpaint` or `outpaint`, edit mode only
        pub edit_mode: Option<String>,
        pub model_image: String,
        pub model_text: Option<String>,
        pub status: String,
        pub started_at: Option<DateTimeUtc>,
        pub finished_at: Option<DateTimeUtc>,
        pub duration_ms: Option<i64>,
        pub error_code: Option<String>,
        pub error_message: Option<String>,
        #[sea_orm(column_type = "Text", nullable)]
        pub error_detail: Option<String>,
        pub input_fingerprint: Option<String>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::users::Entity",
            from = "Column::UserId",
            to = "super::users::Column::Id",
            on_delete = "Cascade"
        )]
        User,
    }

    impl Related<super::users::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::User.def()
        }
    }

    impl Related<super::generation_assets::Entity> for Entity {
        fn to() -> RelationDef {
            super::generation_assets::Relation::Generation.def().rev()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Stored outputs of a generation.
pub mod generation_assets {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "generation_assets")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub generation_id: i32,
        pub storage_backend: String,
        pub bucket: Option<String>,
        pub object_name: String,
        pub mime_type: String,
        pub byte_size: i64,
        pub width: Option<i32>,
        pub height: Option<i32>,
        pub sha256: String,
        pub deleted_at: Option<DateTimeUtc>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::generations::Entity",
            from = "Column::GenerationId",
            to = "super::generations::Column::Id",
            on_delete = "Cascade"
        )]
        Generation,
    }

    impl Related<super::generations::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Generation.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Chat sessions.
pub mod chat_sessions {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "chat_sessions")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub user_id: i32,
        pub title: String,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::users::Entity",
            from = "Column::UserId",
            to = "super::users::Column::Id",
            on_delete = "Cascade"
        )]
        User,
    }

    impl Related<super::users::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::User.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Chat messages, ordered by id inside a session.
pub mod chat_messages {
    use sea_orm::entity::prelude::*;

    pub const ROLE_USER: &str = "user";
    pub const ROLE_ASSISTANT: &str = "assistant";
    pub const ROLE_SYSTEM: &str = "system";

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "chat_messages")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub session_id: i32,
        pub role: String,
        #[sea_orm(column_type = "Text", nullable)]
        pub text: Option<String>,
        pub mode_id: Option<String>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::chat_sessions::Entity",
            from = "Column::SessionId",
            to = "super::chat_sessions::Column::Id",
            on_delete = "Cascade"
        )]
        Session,
    }

    impl Related<super::chat_sessions::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Session.def()
        }
    }

    impl Related<super::chat_attachments::Entity> for Entity {
        fn to() -> RelationDef {
            super::chat_attachments::Relation::Message.def().rev()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Images attached to chat messages; same storage shape as generation assets.
pub mod chat_attachments {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "chat_attachments")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub message_id: i32,
        /// `image`, `rough`, `reference`, `base`, `mask` or `result`
        pub kind: String,
        pub storage_backend: String,
        pub bucket: Option<String>,
        pub object_name: String,
        pub mime_type: String,
        pub byte_size: i64,
        pub width: Option<i32>,
        pub height: Option<i32>,
        pub sha256: String,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::chat_messages::Entity",
            from = "Column::MessageId",
            to = "super::chat_messages::Column::Id",
            on_delete = "Cascade"
        )]
        Message,
    }

    impl Related<super::chat_messages::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Message.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}
