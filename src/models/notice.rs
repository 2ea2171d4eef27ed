use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Ledger row: one staff-visible notice per claim. Dismissal is recorded
/// per viewer, so a notice one admin clears still shows for the others.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ClaimNoticeModel {
    pub id: Uuid,
    pub claim_id: Uuid,
    pub item_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A notice joined with its claim and item, as shown on the dashboard.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NoticeView {
    pub id: Uuid,
    pub item_id: Uuid,
    pub item_title: String,
    pub claimant_name: String,
    pub claimed_at: DateTime<Utc>,
}
