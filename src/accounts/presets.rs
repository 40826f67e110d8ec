use chrono::{DateTime, Utc};
use log::{debug, warn};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use crate::error_handling::types::AuthError;
use crate::generation::Mode;
use crate::storage::db_entities::presets;

pub const MAX_NAME_CHARS: usize = 80;
pub const MAX_COLOR_CHARS: usize = 200;
pub const MAX_POSE_CHARS: usize = 160;
pub const MAX_INSTRUCTION_CHARS: usize = 1000;

const TOO_LONG: &str = "The input exceeds the character limit. Please shorten it.";

/// Instruction fields stored as `payload_json`.
///
/// Reference and edit presets keep their single instruction in `color_instruction`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetPayload {
    pub color_instruction: String,
    pub pose_instruction: String,
}

/// A preset as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct Preset {
    pub id: i32,
    pub mode: String,
    pub name: String,
    pub color_instruction: String,
    pub pose_instruction: String,
    pub created_at: DateTime<Utc>,
}

impl From<presets::Model> for Preset {
    fn from(model: presets::Model) -> Self {
        let payload = serde_json::from_str::<PresetPayload>(&model.payload_json).unwrap_or_else(|e| {
            warn!("Preset {} has an unreadable payload: {}", model.id, e);
            PresetPayload::default()
        });
        Self {
            id: model.id,
            mode: model.mode,
            name: model.name,
            color_instruction: payload.color_instruction,
            pose_instruction: payload.pose_instruction,
            created_at: model.created_at,
        }
    }
}

/// Submitted preset fields before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewPreset {
    pub mode: Option<String>,
    pub name: String,
    pub color_instruction: String,
    pub pose_instruction: String,
}

fn invalid(message: &str) -> AuthError {
    AuthError::Invalid(message.to_string())
}

/// Normalizes and checks a submission against the rules of its mode.
pub fn validate(new_preset: &NewPreset) -> Result<(Mode, String, PresetPayload), AuthError> {
    let mode = Mode::parse_or_default(new_preset.mode.as_deref());
    let name = new_preset.name.trim();
    let color = new_preset.color_instruction.trim();
    let pose = new_preset.pose_instruction.trim();

    if name.is_empty() {
        return Err(invalid("Please enter a preset name."));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(invalid("Preset names must be at most 80 characters."));
    }
    let payload = match mode {
        Mode::Reference | Mode::Edit => {
            if color.is_empty() {
                return Err(invalid("Please enter the additional instructions."));
            }
            if color.chars().count() > MAX_INSTRUCTION_CHARS {
                return Err(invalid(TOO_LONG));
            }
            PresetPayload {
                color_instruction: color.to_string(),
                pose_instruction: String::new(),
            }
        }
        Mode::Rough => {
            if color.is_empty() || pose.is_empty() {
                return Err(invalid("Please enter both the color and the pose instructions."));
            }
            if color.chars().count() > MAX_COLOR_CHARS || pose.chars().count() > MAX_POSE_CHARS {
                return Err(invalid(TOO_LONG));
            }
            PresetPayload {
                color_instruction: color.to_string(),
                pose_instruction: pose.to_string(),
            }
        }
        Mode::Chat => return Err(invalid("Presets are not available for this mode.")),
    };
    Ok((mode, name.to_string(), payload))
}

/// Presets of `user_id` for one mode, newest first.
pub async fn list(db: &DatabaseConnection, user_id: i32, mode: Mode) -> Result<Vec<Preset>, AuthError> {
    let rows = presets::Entity::find()
        .filter(presets::Column::UserId.eq(user_id))
        .filter(presets::Column::Mode.eq(mode.id()))
        .order_by_desc(presets::Column::CreatedAt)
        .order_by_desc(presets::Column::Id)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(Preset::from).collect())
}

pub async fn create(db: &DatabaseConnection, user_id: i32, new_preset: &NewPreset) -> Result<Preset, AuthError> {
    let (mode, name, payload) = validate(new_preset)?;
    let duplicates = presets::Entity::find()
        .filter(presets::Column::UserId.eq(user_id))
        .filter(presets::Column::Mode.eq(mode.id()))
        .filter(presets::Column::Name.eq(name.as_str()))
        .count(db)
        .await?;
    if duplicates > 0 {
        return Err(invalid("A preset with the same name already exists."));
    }
    let payload_json = serde_json::to_string(&payload).map_err(|e| AuthError::Invalid(e.to_string()))?;
    let now = Utc::now();
    let model = presets::ActiveModel {
        user_id: Set(user_id),
        mode: Set(mode.id().to_string()),
        name: Set(name),
        payload_json: Set(payload_json),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;
    debug!("Preset {} created for user {}", model.id, user_id);
    Ok(model.into())
}

/// Deletes one of the caller's presets. Presets of other users are reported as missing.
pub async fn delete(db: &DatabaseConnection, user_id: i32, preset_id: i32) -> Result<(), AuthError> {
    let result = presets::Entity::delete_many()
        .filter(presets::Column::Id.eq(preset_id))
        .filter(presets::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(AuthError::NotFound("The preset was not found.".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database_storage::testing::{insert_user, temp_db};
    use crate::storage::db_entities::users;

    fn rough(name: &str, color: &str, pose: &str) -> NewPreset {
        NewPreset {
            mode: None,
            name: name.to_string(),
            color_instruction: color.to_string(),
            pose_instruction: pose.to_string(),
        }
    }

    fn reference(name: &str, instruction: &str) -> NewPreset {
        NewPreset {
            mode: Some("reference_style_colorize".into()),
            name: name.to_string(),
            color_instruction: instruction.to_string(),
            pose_instruction: "ignored".to_string(),
        }
    }

    #[test]
    fn test_validation_rules() {
        assert!(validate(&rough("", "red", "sit")).is_err());
        assert!(validate(&rough(&"n".repeat(81), "red", "sit")).is_err());
        assert!(validate(&rough(&"n".repeat(80), "red", "sit")).is_ok());
        assert!(validate(&rough("a", "red", " ")).is_err());
        assert!(validate(&rough("a", &"c".repeat(201), "sit")).is_err());
        assert!(validate(&rough("a", "red", &"p".repeat(161))).is_err());
        assert!(validate(&reference("a", "")).is_err());
        assert!(validate(&reference("a", &"i".repeat(1001))).is_err());

        let (mode, name, payload) = validate(&reference(" soft ", " pastel ")).unwrap();
        assert_eq!(mode, Mode::Reference);
        assert_eq!(name, "soft");
        assert_eq!(payload.color_instruction, "pastel");
        assert_eq!(payload.pose_instruction, "");
    }

    #[tokio::test]
    async fn test_presets_are_scoped_by_owner_and_mode() {
        let (db, _dir) = temp_db().await;
        let alice = insert_user(&db, "alice", users::ROLE_USER).await;
        let bob = insert_user(&db, "bob", users::ROLE_USER).await;

        let first = create(&db, alice.id, &rough("day", "red", "sit")).await.unwrap();
        let second = create(&db, alice.id, &rough("night", "blue", "stand")).await.unwrap();
        create(&db, alice.id, &reference("day", "pastel")).await.unwrap();
        assert!(create(&db, alice.id, &rough("day", "x", "y")).await.is_err());
        create(&db, bob.id, &rough("day", "red", "sit")).await.unwrap();

        let listed = list(&db, alice.id, Mode::Rough).await.unwrap();
        let ids: Vec<i32> = listed.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(listed[1].pose_instruction, "sit");
        assert_eq!(list(&db, alice.id, Mode::Reference).await.unwrap().len(), 1);

        assert!(matches!(delete(&db, bob.id, first.id).await, Err(AuthError::NotFound(_))));
        delete(&db, alice.id, first.id).await.unwrap();
        assert_eq!(list(&db, alice.id, Mode::Rough).await.unwrap().len(), 1);
    }
}
