use std::sync::OnceLock;

use chrono::Utc;
use log::{info, warn};
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set,
};

use super::passwords::{hash_password, verify_password};
use super::tokens;
use crate::configuration::config::BootstrapConfig;
use crate::error_handling::types::AuthError;
use crate::storage::db_entities::users;

const ADMIN_REQUIRED: &str = "Administrator privileges are required.";
const USER_NOT_FOUND: &str = "User not found.";

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

fn parse_role(role: &str) -> Result<&'static str, AuthError> {
    match role.trim() {
        users::ROLE_ADMIN => Ok(users::ROLE_ADMIN),
        users::ROLE_USER | "" => Ok(users::ROLE_USER),
        other => Err(AuthError::Invalid(format!("Unknown role: {}.", other))),
    }
}

/// Fields of an account created by an administrator.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

/// Login, token resolution and account administration.
#[derive(Clone)]
pub struct AccountService {
    db: DatabaseConnection,
    session_ttl_hours: i64,
}

impl AccountService {
    pub fn new(db: DatabaseConnection, session_ttl_hours: i64) -> Self {
        Self { db, session_ttl_hours }
    }

    /// Checks credentials and issues a token.
    pub async fn login(&self, username: &str, password: &str) -> Result<(users::Model, String), AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.db)
            .await?;
        let Some(user) = user else {
            info!("Login failed for unknown user {}", username);
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &user.password_hash).await {
            info!("Login failed for user {}", username);
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        let mut active: users::ActiveModel = user.into();
        active.last_login_at = Set(Some(Utc::now()));
        let user = active.update(&self.db).await?;
        let token = tokens::issue(&self.db, user.id, self.session_ttl_hours).await?;
        info!("User {} logged in", user.username);
        Ok((user, token))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        Ok(tokens::revoke(&self.db, token).await?)
    }

    /// The active user behind `token`, `None` when absent, unknown or expired.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Option<users::Model>, AuthError> {
        match token {
            Some(token) => Ok(tokens::resolve(&self.db, token).await?),
            None => Ok(None),
        }
    }

    /// Like [`authenticate`](Self::authenticate) but a missing user is an error.
    pub async fn require_user(&self, token: Option<&str>) -> Result<users::Model, AuthError> {
        self.authenticate(token).await?.ok_or(AuthError::Unauthenticated)
    }

    pub async fn require_admin(&self, token: Option<&str>) -> Result<users::Model, AuthError> {
        let user = self.require_user(token).await?;
        if !user.is_admin() {
            return Err(AuthError::Forbidden(ADMIN_REQUIRED.to_string()));
        }
        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<users::Model>, AuthError> {
        Ok(users::Entity::find()
            .order_by_asc(users::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn create_user(&self, new_user: NewUser) -> Result<users::Model, AuthError> {
        let username = new_user.username.trim();
        let email = new_user.email.trim();
        if username.is_empty() || email.is_empty() || new_user.password.is_empty() {
            return Err(AuthError::Invalid("Please fill in every field.".into()));
        }
        if !is_valid_email(email) {
            return Err(AuthError::Invalid("Please enter a valid email address.".into()));
        }
        let role = parse_role(&new_user.role)?;
        let taken = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(username))
                    .add(users::Column::Email.eq(email)),
            )
            .count(&self.db)
            .await?;
        if taken > 0 {
            return Err(AuthError::Invalid(
                "A user with the same username or email already exists.".into(),
            ));
        }

        let password_hash = hash_password(&new_user.password).await?;
        let now = Utc::now();
        let user = users::ActiveModel {
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            role: Set(role.to_string()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            last_login_at: Set(None),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        info!("User {} created with role {}", user.username, user.role);
        Ok(user)
    }

    async fn other_user(&self, actor: &users::Model, user_id: i32, self_message: &str) -> Result<users::Model, AuthError> {
        if !actor.is_admin() {
            return Err(AuthError::Forbidden(ADMIN_REQUIRED.to_string()));
        }
        if actor.id == user_id {
            return Err(AuthError::Invalid(self_message.to_string()));
        }
        users::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AuthError::NotFound(USER_NOT_FOUND.to_string()))
    }

    /// Activates or deactivates another account. Deactivation revokes its tokens.
    pub async fn set_active(&self, actor: &users::Model, user_id: i32, is_active: bool) -> Result<users::Model, AuthError> {
        let target = self
            .other_user(actor, user_id, "You cannot change the status of your own account.")
            .await?;
        let mut active: users::ActiveModel = target.into();
        active.is_active = Set(is_active);
        active.updated_at = Set(Utc::now());
        let user = active.update(&self.db).await?;
        if !is_active {
            let revoked = tokens::revoke_all(&self.db, user.id).await?;
            info!("User {} deactivated, {} tokens revoked", user.username, revoked);
        }
        Ok(user)
    }

    pub async fn reset_password(&self, actor: &users::Model, user_id: i32, new_password: &str) -> Result<users::Model, AuthError> {
        let target = self
            .other_user(actor, user_id, "Use the password change form for your own account.")
            .await?;
        if new_password.is_empty() {
            return Err(AuthError::Invalid("Please enter a new password.".into()));
        }
        let password_hash = hash_password(new_password).await?;
        let mut active: users::ActiveModel = target.into();
        active.password_hash = Set(password_hash);
        active.updated_at = Set(Utc::now());
        let user = active.update(&self.db).await?;
        tokens::revoke_all(&self.db, user.id).await?;
        info!("Password of user {} reset by {}", user.username, actor.username);
        Ok(user)
    }

    pub async fn change_role(&self, actor: &users::Model, user_id: i32, role: &str) -> Result<users::Model, AuthError> {
        let target = self
            .other_user(actor, user_id, "You cannot change the role of your own account.")
            .await?;
        let role = parse_role(role)?;
        let mut active: users::ActiveModel = target.into();
        active.role = Set(role.to_string());
        active.updated_at = Set(Utc::now());
        let user = active.update(&self.db).await?;
        info!("User {} is now {}", user.username, user.role);
        Ok(user)
    }

    pub async fn change_own_password(
        &self,
        user: &users::Model,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if current_password.is_empty() || new_password.is_empty() {
            return Err(AuthError::Invalid("Please enter the current and the new password.".into()));
        }
        if !verify_password(current_password, &user.password_hash).await {
            return Err(AuthError::Invalid("The current password is incorrect.".into()));
        }
        let mut active: users::ActiveModel = user.clone().into();
        active.password_hash = Set(hash_password(new_password).await?);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }

    /// Creates the configured administrator when the user table is empty.
    pub async fn bootstrap_admin(&self, bootstrap: &BootstrapConfig) -> Result<Option<users::Model>, AuthError> {
        let (Some(username), Some(email), Some(password)) = (
            bootstrap.username.as_deref(),
            bootstrap.email.as_deref(),
            bootstrap.password.as_deref(),
        ) else {
            info!("No initial user configured, skipping account bootstrap");
            return Ok(None);
        };
        let existing = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(username))
                    .add(users::Column::Email.eq(email)),
            )
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Ok(None);
        }
        if users::Entity::find().count(&self.db).await? > 0 {
            warn!("Users already exist, skipping creation of initial user {}", username);
            return Ok(None);
        }
        let user = self
            .create_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                role: users::ROLE_ADMIN.to_string(),
            })
            .await?;
        Ok(Some(user))
    }
}
