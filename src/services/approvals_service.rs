use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Actor, ApprovalStatus, ItemModel, StudentLostItemModel};
use crate::services::items_service::ITEM_COLUMNS;

const STUDENT_COLUMNS: &str = "id, title, description, email_subject, email_from, submitted_at, \
     approval_status, approved_by, approved_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Item,
    StudentItem,
}

/// One pending submission awaiting a super-user decision, from either
/// source table.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub kind: QueueKind,
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub submitted_by: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct PendingItemRow {
    #[sqlx(flatten)]
    item: ItemModel,
    creator: Option<String>,
}

#[derive(Clone)]
pub struct ApprovalsService {
    pool: PgPool,
}

impl ApprovalsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Approve or reject a found item. The UPDATE only matches rows still
    /// PENDING, so a racing second decision loses and is told why.
    pub async fn decide_item(
        &self,
        actor: &Actor,
        id: Uuid,
        decision: ApprovalStatus,
    ) -> AppResult<ItemModel> {
        self.check(actor, decision)?;

        let updated: Option<ItemModel> = sqlx::query_as(&format!(
            "UPDATE items SET approval_status = $1, updated_at = NOW() \
             WHERE id = $2 AND approval_status = 'PENDING' RETURNING {ITEM_COLUMNS}"
        ))
        .bind(decision)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(item) => {
                tracing::info!("item {} {} by {}", item.id, decision, actor.username);
                Ok(item)
            }
            None => Err(self.item_decision_conflict(id).await?),
        }
    }

    /// Same compare-and-set for student-reported items, stamping the
    /// deciding staff member and time.
    pub async fn decide_student_item(
        &self,
        actor: &Actor,
        id: Uuid,
        decision: ApprovalStatus,
    ) -> AppResult<StudentLostItemModel> {
        self.check(actor, decision)?;

        let updated: Option<StudentLostItemModel> = sqlx::query_as(&format!(
            "UPDATE student_lost_items \
             SET approval_status = $1, approved_by = $2, approved_at = NOW() \
             WHERE id = $3 AND approval_status = 'PENDING' RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(decision)
        .bind(actor.user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(item) => {
                tracing::info!("student item {} {} by {}", item.id, decision, actor.username);
                Ok(item)
            }
            None => {
                let current: Option<ApprovalStatus> = sqlx::query_scalar(
                    "SELECT approval_status FROM student_lost_items WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
                Err(match current {
                    None => AppError::NotFound("student lost item".to_string()),
                    Some(status) => AppError::Conflict(format!(
                        "student lost item is no longer pending (currently {status})"
                    )),
                })
            }
        }
    }

    /// Everything awaiting a decision, from both tables, newest first.
    pub async fn queue(&self, actor: &Actor) -> AppResult<Vec<QueueEntry>> {
        if !actor.role.can_approve() {
            return Err(AppError::Forbidden(
                "super user privileges required".to_string(),
            ));
        }

        let items: Vec<PendingItemRow> = sqlx::query_as(
            "SELECT i.*, u.username AS creator \
             FROM items i LEFT JOIN app_users u ON u.id = i.created_by \
             WHERE i.approval_status = 'PENDING' \
             ORDER BY i.created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let students: Vec<StudentLostItemModel> = sqlx::query_as(&format!(
            "SELECT {STUDENT_COLUMNS} FROM student_lost_items \
             WHERE approval_status = 'PENDING' ORDER BY submitted_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(merge_queue(items, students))
    }

    fn check(&self, actor: &Actor, decision: ApprovalStatus) -> AppResult<()> {
        if !actor.role.can_approve() {
            return Err(AppError::Forbidden(
                "super user privileges required".to_string(),
            ));
        }
        if decision == ApprovalStatus::Pending {
            return Err(AppError::InvalidInput(
                "decision must be APPROVED or REJECTED".to_string(),
            ));
        }
        Ok(())
    }

    async fn item_decision_conflict(&self, id: Uuid) -> Result<AppError, AppError> {
        let current: Option<ApprovalStatus> =
            sqlx::query_scalar("SELECT approval_status FROM items WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match current {
            None => AppError::NotFound("item".to_string()),
            Some(status) => {
                AppError::Conflict(format!("item is no longer pending (currently {status})"))
            }
        })
    }
}

fn merge_queue(items: Vec<PendingItemRow>, students: Vec<StudentLostItemModel>) -> Vec<QueueEntry> {
    let mut entries: Vec<QueueEntry> = items
        .into_iter()
        .map(|row| QueueEntry {
            kind: QueueKind::Item,
            id: row.item.id,
            title: row.item.title,
            description: row.item.description,
            submitted_by: row.creator,
            submitted_at: row.item.created_at,
        })
        .chain(students.into_iter().map(|s| QueueEntry {
            kind: QueueKind::StudentItem,
            id: s.id,
            title: s.title,
            description: s.description,
            submitted_by: Some(s.email_from),
            submitted_at: s.submitted_at,
        }))
        .collect();
    entries.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ItemStatus, ItemType};
    use chrono::{NaiveDate, TimeZone};

    fn pending_item(title: &str, created_at: DateTime<Utc>) -> PendingItemRow {
        PendingItemRow {
            item: ItemModel {
                id: Uuid::new_v4(),
                title: title.to_string(),
                description: String::new(),
                category: Category::OtherMisc,
                location_found: String::new(),
                date_found: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
                status: ItemStatus::Found,
                approval_status: ApprovalStatus::Pending,
                item_type: ItemType::Senior,
                claimed_by_name: None,
                claimed_at: None,
                created_by: None,
                created_at,
                updated_at: created_at,
            },
            creator: Some("frontdesk".to_string()),
        }
    }

    fn student_item(title: &str, submitted_at: DateTime<Utc>) -> StudentLostItemModel {
        StudentLostItemModel {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: String::new(),
            email_subject: "lost item".to_string(),
            email_from: "student@school.example".to_string(),
            submitted_at,
            approval_status: ApprovalStatus::Pending,
            approved_by: None,
            approved_at: None,
        }
    }

    #[test]
    fn queue_merges_both_sources_newest_first() {
        let t1 = Utc.with_ymd_and_hms(2025, 3, 9, 8, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap();
        let t3 = Utc.with_ymd_and_hms(2025, 3, 10, 7, 0, 0).unwrap();

        let merged = merge_queue(
            vec![pending_item("umbrella", t1), pending_item("cap", t3)],
            vec![student_item("watch", t2)],
        );

        let titles: Vec<&str> = merged.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["cap", "watch", "umbrella"]);
        assert_eq!(merged[1].kind, QueueKind::StudentItem);
        assert_eq!(
            merged[1].submitted_by.as_deref(),
            Some("student@school.example")
        );
    }
}
