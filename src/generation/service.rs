use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};

use super::engine::{prepare, render, RenderedImage};
use super::request::GenerationRequest;
use crate::configuration::{ImageLimits, StorageTarget};
use crate::error_handling::types::{GenerationError, GenerationErrorKind, StorageError};
use crate::imaging::extension_for_mime_type;
use crate::provider::{ImageApi, ImageOptions};
use crate::storage::db_entities::{generation_assets, generations};
use crate::storage::{ObjectStorage, StoredObject};

pub const MAX_LIST_LIMIT: u64 = 100;
const ERROR_MESSAGE_CHARS: usize = 255;

/// A generation row with its live (not soft-deleted) assets.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub generation: generations::Model,
    pub assets: Vec<generation_assets::Model>,
}

struct BlockingRun {
    fingerprint: Option<String>,
    result: Result<(RenderedImage, StoredObject), GenerationError>,
}

/// Runs generation attempts and answers queries about past ones.
#[derive(Clone)]
pub struct GenerationService {
    db: DatabaseConnection,
    storage: ObjectStorage,
    api: Arc<dyn ImageApi>,
    limits: ImageLimits,
    target: StorageTarget,
}

pub(crate) fn duration_ms(started_at: Option<DateTime<Utc>>, finished_at: DateTime<Utc>) -> i64 {
    started_at
        .map(|started| (finished_at - started).num_milliseconds().max(0))
        .unwrap_or(0)
}

pub(crate) fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

pub(crate) fn log_generation_error(context: &str, err: &GenerationError) {
    match err.kind {
        GenerationErrorKind::Validation => info!("{} rejected: {}", context, err.message),
        GenerationErrorKind::MissingCredentials => error!("{} failed: {}", context, err.message),
        GenerationErrorKind::Overloaded => warn!("{} failed, provider overloaded: {}", context, err.full_detail()),
        GenerationErrorKind::Internal => error!("{} failed: {}", context, err.full_detail()),
    }
}

fn db_error(err: sea_orm::DbErr) -> GenerationError {
    GenerationError::internal(format!("Database error: {}", err))
}

impl GenerationService {
    pub fn new(
        db: DatabaseConnection,
        storage: ObjectStorage,
        api: Arc<dyn ImageApi>,
        limits: ImageLimits,
        target: StorageTarget,
    ) -> Self {
        Self {
            db,
            storage,
            api,
            limits,
            target,
        }
    }

    /// Runs one generation attempt to a committed terminal state.
    ///
    /// The row is created `running` before anything else happens. Validation, the API call
    /// and the storage write run on the blocking pool; the outcome is then committed as
    /// either `succeeded` together with its single asset, or `failed` with the error code,
    /// a truncated message and the full detail. Errors are returned after the commit.
    pub async fn generate(&self, user_id: i32, request: GenerationRequest) -> Result<GenerationOutcome, GenerationError> {
        let mode = request.mode();
        let started_at = Utc::now();
        // The row records the hints exactly as the provider will receive them.
        let options = ImageOptions::from_labels(request.aspect_ratio.as_deref(), request.resolution.as_deref());
        let row = generations::ActiveModel {
            user_id: Set(user_id),
            mode: Set(mode.id().to_string()),
            aspect_ratio: Set(options.aspect_ratio.clone()),
            resolution: Set(options.image_size.map(|size| size.as_str().to_string())),
            edit_mode: Set(request.inputs.edit_mode().map(|m| m.as_str().to_string())),
            model_image: Set(self.api.image_model().to_string()),
            model_text: Set(None),
            status: Set(generations::STATUS_RUNNING.to_string()),
            started_at: Set(Some(started_at)),
            finished_at: Set(None),
            duration_ms: Set(None),
            error_code: Set(None),
            error_message: Set(None),
            error_detail: Set(None),
            input_fingerprint: Set(None),
            created_at: Set(started_at),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(|e| {
            let err = db_error(e);
            log_generation_error("Generation", &err);
            err
        })?;
        info!("Generation {} started for user {} in mode {}", row.id, user_id, mode.id());

        let run = self.run_blocking(request, options).await;
        let outcome = match run.result {
            Ok((image, stored)) => self.commit_success(&row, run.fingerprint.clone(), &image, &stored).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(outcome) => {
                info!(
                    "Generation {} succeeded in {} ms",
                    row.id,
                    outcome.generation.duration_ms.unwrap_or_default()
                );
                Ok(outcome)
            }
            Err(err) => {
                log_generation_error(&format!("Generation {}", row.id), &err);
                self.commit_failure(&row, run.fingerprint, &err).await?;
                Err(err)
            }
        }
    }

    async fn run_blocking(&self, request: GenerationRequest, options: ImageOptions) -> BlockingRun {
        let api = self.api.clone();
        let storage = self.storage.clone();
        let limits = self.limits;
        let target = self.target.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let call = match prepare(&request.inputs, &limits) {
                Ok(call) => call,
                Err(err) => {
                    return BlockingRun {
                        fingerprint: None,
                        result: Err(err),
                    }
                }
            };
            let result = render(api.as_ref(), &call.parts, &options).and_then(|image| {
                let extension = extension_for_mime_type(&image.mime_type);
                let stored = storage.save(&target, &image.bytes, extension, &image.mime_type)?;
                Ok((image, stored))
            });
            BlockingRun {
                fingerprint: Some(call.fingerprint),
                result,
            }
        })
        .await;
        joined.unwrap_or_else(|e| BlockingRun {
            fingerprint: None,
            result: Err(GenerationError::internal(format!("Generation task failed: {}", e))),
        })
    }

    async fn commit_success(
        &self,
        row: &generations::Model,
        fingerprint: Option<String>,
        image: &RenderedImage,
        stored: &StoredObject,
    ) -> Result<GenerationOutcome, GenerationError> {
        let finished_at = Utc::now();
        let txn = self.db.begin().await.map_err(db_error)?;
        let asset = generation_assets::ActiveModel {
            generation_id: Set(row.id),
            storage_backend: Set(stored.storage_backend.as_str().to_string()),
            bucket: Set(stored.bucket.clone()),
            object_name: Set(stored.object_name.clone()),
            mime_type: Set(image.mime_type.clone()),
            byte_size: Set(stored.byte_size),
            width: Set(image.width.and_then(|w| i32::try_from(w).ok())),
            height: Set(image.height.and_then(|h| i32::try_from(h).ok())),
            sha256: Set(stored.sha256.clone()),
            deleted_at: Set(None),
            created_at: Set(finished_at),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(db_error)?;

        let mut active: generations::ActiveModel = row.clone().into();
        active.status = Set(generations::STATUS_SUCCEEDED.to_string());
        active.finished_at = Set(Some(finished_at));
        active.duration_ms = Set(Some(duration_ms(row.started_at, finished_at)));
        active.input_fingerprint = Set(fingerprint);
        let generation = active.update(&txn).await.map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        Ok(GenerationOutcome {
            generation,
            assets: vec![asset],
        })
    }

    /// Marks the row `failed`. When that write fails the row is left `running`, and the
    /// returned internal error carries both the storage failure and the original detail.
    async fn commit_failure(
        &self,
        row: &generations::Model,
        fingerprint: Option<String>,
        err: &GenerationError,
    ) -> Result<(), GenerationError> {
        let finished_at = Utc::now();
        let mut active: generations::ActiveModel = row.clone().into();
        active.status = Set(generations::STATUS_FAILED.to_string());
        active.finished_at = Set(Some(finished_at));
        active.duration_ms = Set(Some(duration_ms(row.started_at, finished_at)));
        active.error_code = Set(Some(err.code().to_string()));
        active.error_message = Set(Some(truncate_chars(&err.message, ERROR_MESSAGE_CHARS)));
        active.error_detail = Set(Some(err.full_detail()));
        active.input_fingerprint = Set(fingerprint);
        match active.update(&self.db).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Failed to record failure of generation {}: {}", row.id, e);
                Err(GenerationError::internal(format!(
                    "Generation {} failure was not recorded ({}); original error: {}",
                    row.id,
                    e,
                    err.full_detail()
                )))
            }
        }
    }

    /// Newest first, at most [`MAX_LIST_LIMIT`] rows.
    pub async fn list(&self, user_id: i32, limit: u64) -> Result<Vec<GenerationOutcome>, StorageError> {
        let rows = generations::Entity::find()
            .filter(generations::Column::UserId.eq(user_id))
            .order_by_desc(generations::Column::CreatedAt)
            .order_by_desc(generations::Column::Id)
            .limit(limit.clamp(1, MAX_LIST_LIMIT))
            .all(&self.db)
            .await?;
        self.with_assets(rows).await
    }

    pub async fn detail(&self, user_id: i32, generation_id: i32) -> Result<Option<GenerationOutcome>, StorageError> {
        let row = generations::Entity::find_by_id(generation_id)
            .filter(generations::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?;
        Ok(self.with_assets(row.into_iter().collect()).await?.pop())
    }

    /// Most recent successful generation of the user.
    pub async fn latest(&self, user_id: i32) -> Result<Option<GenerationOutcome>, StorageError> {
        let row = generations::Entity::find()
            .filter(generations::Column::UserId.eq(user_id))
            .filter(generations::Column::Status.eq(generations::STATUS_SUCCEEDED))
            .order_by_desc(generations::Column::CreatedAt)
            .order_by_desc(generations::Column::Id)
            .one(&self.db)
            .await?;
        Ok(self.with_assets(row.into_iter().collect()).await?.pop())
    }

    async fn with_assets(&self, rows: Vec<generations::Model>) -> Result<Vec<GenerationOutcome>, StorageError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
        let assets = generation_assets::Entity::find()
            .filter(generation_assets::Column::GenerationId.is_in(ids))
            .filter(generation_assets::Column::DeletedAt.is_null())
            .order_by_asc(generation_assets::Column::Id)
            .all(&self.db)
            .await?;
        let mut by_generation: HashMap<i32, Vec<generation_assets::Model>> = HashMap::new();
        for asset in assets {
            by_generation.entry(asset.generation_id).or_default().push(asset);
        }
        Ok(rows
            .into_iter()
            .map(|generation| GenerationOutcome {
                assets: by_generation.remove(&generation.id).unwrap_or_default(),
                generation,
            })
            .collect())
    }

    /// A live asset owned by `user_id`.
    pub async fn find_asset(&self, user_id: i32, asset_id: i32) -> Result<Option<generation_assets::Model>, StorageError> {
        let found = generation_assets::Entity::find_by_id(asset_id)
            .find_also_related(generations::Entity)
            .one(&self.db)
            .await?;
        Ok(match found {
            Some((asset, Some(generation))) if generation.user_id == user_id && asset.deleted_at.is_none() => Some(asset),
            _ => None,
        })
    }

    /// Bytes of an asset, `None` when the object is gone from its backend.
    pub async fn load_asset_bytes(&self, asset: &generation_assets::Model) -> Result<Option<Vec<u8>>, StorageError> {
        let storage = self.storage.clone();
        let local_dir = self.target.local_dir.clone();
        let asset = asset.clone();
        tokio::task::spawn_blocking(move || {
            storage.load(&asset.storage_backend, asset.bucket.as_deref(), &asset.object_name, &local_dir)
        })
        .await
        .map_err(|e| {
            error!("Asset load task failed: {}", e);
            StorageError::ReadFailed
        })?
    }

    /// Marks an asset deleted; the stored object is kept.
    pub async fn soft_delete_asset(&self, user_id: i32, asset_id: i32) -> Result<bool, StorageError> {
        let Some(asset) = self.find_asset(user_id, asset_id).await? else {
            return Ok(false);
        };
        let mut active: generation_assets::ActiveModel = asset.into();
        active.deleted_at = Set(Some(Utc::now()));
        active.update(&self.db).await?;
        info!("Asset {} soft-deleted by user {}", asset_id, user_id);
        Ok(true)
    }
}
