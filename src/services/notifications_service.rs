use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Actor, NoticeView};

/// Claim notices for the staff dashboard. The ledger is written by the
/// claim transaction; this service only reads it and records per-viewer
/// dismissals, so a notice one admin clears still shows for the others.
#[derive(Clone)]
pub struct NotificationsService {
    pool: PgPool,
}

impl NotificationsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn active_for(&self, actor: &Actor) -> AppResult<Vec<NoticeView>> {
        if !actor.role.can_upload() {
            return Err(AppError::Forbidden("staff account required".to_string()));
        }

        let notices: Vec<NoticeView> = sqlx::query_as(
            "SELECT n.id, n.item_id, i.title AS item_title, c.claimant_name, c.claimed_at \
             FROM claim_notices n \
             JOIN claims c ON c.id = n.claim_id \
             JOIN items i ON i.id = n.item_id \
             WHERE NOT EXISTS (\
                 SELECT 1 FROM claim_notice_dismissals d \
                 WHERE d.notice_id = n.id AND d.user_id = $1\
             ) \
             ORDER BY c.claimed_at DESC",
        )
        .bind(actor.user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notices)
    }

    /// Idempotent: dismissing twice is a no-op.
    pub async fn dismiss(&self, actor: &Actor, notice_id: Uuid) -> AppResult<()> {
        if !actor.role.can_upload() {
            return Err(AppError::Forbidden("staff account required".to_string()));
        }

        let exists: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM claim_notices WHERE id = $1")
                .bind(notice_id)
                .fetch_optional(&self.pool)
                .await?;
        if exists.is_none() {
            return Err(AppError::NotFound("notice".to_string()));
        }

        sqlx::query(
            "INSERT INTO claim_notice_dismissals (notice_id, user_id) VALUES ($1, $2) \
             ON CONFLICT (notice_id, user_id) DO NOTHING",
        )
        .bind(notice_id)
        .bind(actor.user_id)
        .execute(&self.pool)
        .await?;

        tracing::debug!("notice {} dismissed by {}", notice_id, actor.username);
        Ok(())
    }
}
