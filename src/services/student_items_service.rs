use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Actor, ApprovalStatus, StudentLostItemImageModel, StudentLostItemModel};
use crate::storage::StorageBackend;

const STUDENT_COLUMNS: &str = "id, title, description, email_subject, email_from, submitted_at, \
     approval_status, approved_by, approved_at";

/// Payload forwarded by the inbound-mail gateway.
#[derive(Debug, Deserialize)]
pub struct StudentReport {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub email_subject: String,
    #[serde(default)]
    pub email_from: String,
    #[serde(default)]
    pub images: Vec<ReportImage>,
}

#[derive(Debug, Deserialize)]
pub struct ReportImage {
    /// Base64-encoded image bytes, as attached to the email.
    pub data: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "image/jpeg".to_string()
}

#[derive(Clone)]
pub struct StudentItemsService {
    pool: PgPool,
    storage: Option<Arc<dyn StorageBackend>>,
}

impl StudentItemsService {
    pub fn new(pool: PgPool, storage: Option<Arc<dyn StorageBackend>>) -> Self {
        Self { pool, storage }
    }

    /// Record a student-reported lost item; it enters the approval queue
    /// as PENDING like any staff upload.
    pub async fn ingest(
        &self,
        actor: &Actor,
        report: StudentReport,
    ) -> AppResult<StudentLostItemModel> {
        if !actor.role.can_upload() {
            return Err(AppError::Forbidden("staff account required".to_string()));
        }
        let title = report.title.trim();
        if title.is_empty() || title.len() > 255 {
            return Err(AppError::validation("title", "Title must be 1-255 characters"));
        }

        let mut tx = self.pool.begin().await?;

        let item: StudentLostItemModel = sqlx::query_as(&format!(
            "INSERT INTO student_lost_items (title, description, email_subject, email_from) \
             VALUES ($1, $2, $3, $4) RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(title)
        .bind(report.description.trim())
        .bind(report.email_subject.trim())
        .bind(report.email_from.trim())
        .fetch_one(&mut *tx)
        .await?;

        for image in report.images {
            let bytes = BASE64.decode(image.data.as_bytes()).map_err(|_| {
                AppError::validation("images", "Image data is not valid base64")
            })?;

            let (storage_key, blob) = match &self.storage {
                Some(backend) => {
                    let key = format!("student_item_images/{}", Uuid::new_v4());
                    backend.upload(&key, &bytes, &image.content_type).await?;
                    (Some(key), None)
                }
                None => (None, Some(image.data)),
            };

            let _: StudentLostItemImageModel = sqlx::query_as(
                "INSERT INTO student_lost_item_images \
                 (student_item_id, storage_key, blob, content_type) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, student_item_id, storage_key, blob, content_type, created_at",
            )
            .bind(item.id)
            .bind(storage_key)
            .bind(blob)
            .bind(&image.content_type)
            .fetch_one(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "student lost item {} ({}) ingested from {}",
            item.id,
            item.title,
            if item.email_from.is_empty() {
                "unknown sender"
            } else {
                &item.email_from
            }
        );
        Ok(item)
    }

    pub async fn list(
        &self,
        actor: &Actor,
        status: Option<ApprovalStatus>,
    ) -> AppResult<Vec<StudentLostItemModel>> {
        if !actor.role.can_upload() {
            return Err(AppError::Forbidden("staff account required".to_string()));
        }

        let items: Vec<StudentLostItemModel> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    "SELECT {STUDENT_COLUMNS} FROM student_lost_items \
                     WHERE approval_status = $1 ORDER BY submitted_at DESC"
                ))
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {STUDENT_COLUMNS} FROM student_lost_items \
                     ORDER BY submitted_at DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(items)
    }
}
