use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ApprovalStatus;

/// An item a student reported losing, ingested from the inbound mail
/// channel. Simpler than a found item: no claim lifecycle, just approval.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StudentLostItemModel {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub email_subject: String,
    pub email_from: String,
    pub submitted_at: DateTime<Utc>,
    pub approval_status: ApprovalStatus,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StudentLostItemImageModel {
    pub id: Uuid,
    pub student_item_id: Uuid,
    pub storage_key: Option<String>,
    pub blob: Option<String>,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}
