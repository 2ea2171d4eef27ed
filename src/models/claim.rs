use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ClaimModel {
    pub id: Uuid,
    pub item_id: Uuid,
    pub claimant_name: String,
    pub claimed_at: DateTime<Utc>,
}
