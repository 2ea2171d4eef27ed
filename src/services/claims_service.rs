use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult, FieldError};
use crate::models::{ClaimModel, ItemModel, ItemStatus};
use crate::services::items_service::ITEM_COLUMNS;

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimOutcome {
    pub claim: ClaimModel,
    /// True when this claim flipped the item from FOUND to CLAIMED.
    pub first_claim: bool,
    pub message: String,
}

#[derive(Clone)]
pub struct ClaimsService {
    pool: PgPool,
}

impl ClaimsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a claim. Every claim adds a row; only the first one moves the
    /// item to CLAIMED and stamps the legacy single-claimant fields. The row
    /// lock makes "first" unambiguous under concurrent claims.
    pub async fn claim(&self, item_id: Uuid, req: ClaimRequest) -> AppResult<ClaimOutcome> {
        let name = req.name.trim().to_string();
        let mut errors: Vec<FieldError> = Vec::new();
        if name.is_empty() {
            errors.push(FieldError {
                field: "name".to_string(),
                message: "Claimant name is required".to_string(),
            });
        } else if name.len() > 255 {
            errors.push(FieldError {
                field: "name".to_string(),
                message: "Claimant name must be at most 255 characters".to_string(),
            });
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let mut tx = self.pool.begin().await?;

        let item: Option<ItemModel> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1 FOR UPDATE"
        ))
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?;
        let item = item.ok_or_else(|| AppError::NotFound("item".to_string()))?;

        let claim: ClaimModel = sqlx::query_as(
            "INSERT INTO claims (item_id, claimant_name) VALUES ($1, $2) \
             RETURNING id, item_id, claimant_name, claimed_at",
        )
        .bind(item_id)
        .bind(&name)
        .fetch_one(&mut *tx)
        .await?;

        let first_claim = item.status == ItemStatus::Found;
        if first_claim {
            sqlx::query(
                "UPDATE items SET status = 'CLAIMED', claimed_by_name = $1, claimed_at = $2, \
                 updated_at = NOW() WHERE id = $3",
            )
            .bind(&claim.claimant_name)
            .bind(claim.claimed_at)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
        }

        // One dismissible notice per claim.
        sqlx::query(
            "INSERT INTO claim_notices (claim_id, item_id) VALUES ($1, $2) \
             ON CONFLICT (claim_id) DO NOTHING",
        )
        .bind(claim.id)
        .bind(item_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "item {} ({}) claimed by {} (claim {}, first_claim={})",
            item.id,
            item.title,
            claim.claimant_name,
            claim.id,
            first_claim
        );

        Ok(ClaimOutcome {
            claim,
            first_claim,
            message: "Item successfully claimed! Pick it up from the reception.".to_string(),
        })
    }
}
