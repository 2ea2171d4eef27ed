use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult, FieldError};
use crate::models::{
    Actor, ApprovalStatus, Category, ClaimModel, ImageUpload, ItemImageModel, ItemModel, ItemType,
};
use crate::storage::StorageBackend;

pub const ITEM_COLUMNS: &str = "id, title, description, category, location_found, date_found, \
     status, approval_status, item_type, claimed_by_name, claimed_at, created_by, created_at, \
     updated_at";

const IMAGE_COLUMNS: &str = "id, item_id, storage_key, blob, content_type, sha256, created_at";

const PAGE_SIZE: i64 = 20;
const DASHBOARD_PAGE_SIZE: i64 = 50;

/// Raw form fields from the upload/edit forms; `validate` turns them into
/// a `NewItem` or a field-level error list.
#[derive(Debug, Default)]
pub struct ItemDraft {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub location_found: String,
    pub date_found: Option<String>,
    pub item_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub location_found: String,
    pub date_found: NaiveDate,
    pub item_type: ItemType,
}

impl ItemDraft {
    pub fn validate(self) -> AppResult<NewItem> {
        let mut errors: Vec<FieldError> = Vec::new();
        let push = |errors: &mut Vec<FieldError>, field: &str, message: &str| {
            errors.push(FieldError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        let title = self.title.trim().to_string();
        if title.is_empty() {
            push(&mut errors, "title", "Title is required");
        } else if title.len() > 255 {
            push(&mut errors, "title", "Title must be at most 255 characters");
        }

        let category = match self.category.as_deref().map(str::trim) {
            None | Some("") => Category::OtherMisc,
            Some(raw) => match raw.parse() {
                Ok(category) => category,
                Err(_) => {
                    push(&mut errors, "category", "Unknown category");
                    Category::OtherMisc
                }
            },
        };

        let item_type = match self.item_type.as_deref().map(str::trim) {
            None | Some("") => ItemType::Senior,
            Some(raw) => match raw.parse() {
                Ok(item_type) => item_type,
                Err(_) => {
                    push(&mut errors, "item_type", "Unknown item type");
                    ItemType::Senior
                }
            },
        };

        let date_found = match self.date_found.as_deref().map(str::trim) {
            None | Some("") => {
                push(&mut errors, "date_found", "Date found is required");
                None
            }
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    push(&mut errors, "date_found", "Expected a date like 2025-03-09");
                    None
                }
            },
        };

        match (date_found, errors.is_empty()) {
            (Some(date_found), true) => Ok(NewItem {
                title,
                description: self.description.trim().to_string(),
                category,
                location_found: self.location_found.trim().to_string(),
                date_found,
                item_type,
            }),
            _ => Err(AppError::Validation(errors)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BrowseFilters {
    pub audience: Option<String>,
    pub q: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug)]
struct ParsedBrowse {
    segment: ItemType,
    q: Option<String>,
    category: Option<Category>,
    location: Option<String>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    offset: i64,
}

/// Bind values collected while assembling a dynamic WHERE clause, applied
/// in order afterwards.
enum Bind {
    Segment(ItemType),
    Cat(Category),
    Ts(DateTime<Utc>),
    Text(String),
    Date(NaiveDate),
    Int(i64),
}

#[derive(Debug, Serialize)]
pub struct BrowseItem {
    #[serde(flatten)]
    pub item: ItemModel,
    pub images: Vec<ItemImageModel>,
}

#[derive(Debug, Serialize)]
pub struct BrowseResponse {
    pub items: Vec<BrowseItem>,
    pub page: u32,
    pub page_size: i64,
}

#[derive(Debug, Serialize)]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: ItemModel,
    pub images: Vec<ItemImageModel>,
    pub claim_count: i64,
    pub latest_claim: Option<ClaimModel>,
}

#[derive(Debug, sqlx::FromRow)]
struct DashboardRow {
    #[sqlx(flatten)]
    item: ItemModel,
    claim_count: i64,
    latest_claimant: Option<String>,
    latest_claimed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct DashboardEntry {
    #[serde(flatten)]
    pub item: ItemModel,
    pub claim_count: i64,
    pub latest_claimant: Option<String>,
    pub latest_claimed_at: Option<DateTime<Utc>>,
    /// Items with more than one claimant are flagged distinctly so staff
    /// can resolve competing claims at pickup.
    pub multiple_claims: bool,
}

#[derive(Clone)]
pub struct ItemsService {
    pool: PgPool,
    storage: Option<Arc<dyn StorageBackend>>,
}

impl ItemsService {
    pub fn new(pool: PgPool, storage: Option<Arc<dyn StorageBackend>>) -> Self {
        Self { pool, storage }
    }

    /// Staff upload. Super-user submissions go live immediately; everyone
    /// else lands in the approval queue.
    pub async fn create_item(
        &self,
        actor: &Actor,
        new: NewItem,
        images: Vec<ImageUpload>,
    ) -> AppResult<ItemDetail> {
        if !actor.role.can_upload() {
            return Err(AppError::Forbidden("staff account required".to_string()));
        }
        let approval = if actor.role.auto_approved() {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Pending
        };

        let mut tx = self.pool.begin().await?;

        let item: ItemModel = sqlx::query_as(&format!(
            "INSERT INTO items \
             (title, description, category, location_found, date_found, item_type, approval_status, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.category)
        .bind(&new.location_found)
        .bind(new.date_found)
        .bind(new.item_type)
        .bind(approval)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut stored = Vec::with_capacity(images.len());
        for image in images {
            stored.push(self.store_image(&mut tx, item.id, image).await?);
        }

        tx.commit().await?;

        tracing::info!(
            "item {} ({}) created by {} as {}",
            item.id,
            item.title,
            actor.username,
            item.approval_status
        );

        Ok(ItemDetail {
            item,
            images: stored,
            claim_count: 0,
            latest_claim: None,
        })
    }

    async fn store_image(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        item_id: Uuid,
        image: ImageUpload,
    ) -> AppResult<ItemImageModel> {
        let digest = Sha256::digest(&image.bytes);
        let sha256: String = digest.iter().map(|b| format!("{:02x}", b)).collect();

        let (storage_key, blob) = match &self.storage {
            Some(backend) => {
                let key = format!("item_images/{}", Uuid::new_v4());
                backend.upload(&key, &image.bytes, &image.content_type).await?;
                (Some(key), None)
            }
            None => (None, Some(BASE64.encode(&image.bytes))),
        };

        let stored: ItemImageModel = sqlx::query_as(&format!(
            "INSERT INTO item_images (item_id, storage_key, blob, content_type, sha256) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {IMAGE_COLUMNS}"
        ))
        .bind(item_id)
        .bind(storage_key)
        .bind(blob)
        .bind(&image.content_type)
        .bind(&sha256)
        .fetch_one(&mut **tx)
        .await?;

        Ok(stored)
    }

    /// Staff edit of descriptive fields. Status and approval move only
    /// through their own workflows.
    pub async fn update_item(&self, actor: &Actor, id: Uuid, draft: ItemDraft) -> AppResult<ItemModel> {
        if !actor.role.can_upload() {
            return Err(AppError::Forbidden("staff account required".to_string()));
        }
        let new = draft.validate()?;

        let updated: Option<ItemModel> = sqlx::query_as(&format!(
            "UPDATE items SET title = $1, description = $2, category = $3, location_found = $4, \
             date_found = $5, item_type = $6, updated_at = NOW() \
             WHERE id = $7 RETURNING {ITEM_COLUMNS}"
        ))
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.category)
        .bind(&new.location_found)
        .bind(new.date_found)
        .bind(new.item_type)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| AppError::NotFound("item".to_string()))
    }

    /// Detail view. Items outside the approval gate only exist for staff;
    /// anonymous callers get the same 404 as for an unknown id.
    pub async fn get_item(&self, id: Uuid, actor: Option<&Actor>) -> AppResult<ItemDetail> {
        let item: Option<ItemModel> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let item = item.ok_or_else(|| AppError::NotFound("item".to_string()))?;

        if item.approval_status != ApprovalStatus::Approved && actor.is_none() {
            return Err(AppError::NotFound("item".to_string()));
        }

        let images: Vec<ItemImageModel> = sqlx::query_as(&format!(
            "SELECT {IMAGE_COLUMNS} FROM item_images WHERE item_id = $1 ORDER BY created_at"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let claims: Vec<ClaimModel> = sqlx::query_as(
            "SELECT id, item_id, claimant_name, claimed_at FROM claims \
             WHERE item_id = $1 ORDER BY claimed_at DESC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ItemDetail {
            item,
            claim_count: claims.len() as i64,
            latest_claim: claims.into_iter().next(),
            images,
        })
    }

    /// Public browse: the visibility contract plus optional composable
    /// filters, newest finds first.
    pub async fn list_public(&self, filters: BrowseFilters) -> AppResult<BrowseResponse> {
        let page = filters.page.unwrap_or(1).max(1);
        let parsed = parse_filters(filters)?;
        let (sql, binds) = build_public_listing(&parsed, Utc::now());

        let mut query = sqlx::query_as::<_, ItemModel>(&sql);
        for bind in binds {
            query = match bind {
                Bind::Segment(v) => query.bind(v),
                Bind::Cat(v) => query.bind(v),
                Bind::Ts(v) => query.bind(v),
                Bind::Text(v) => query.bind(v),
                Bind::Date(v) => query.bind(v),
                Bind::Int(v) => query.bind(v),
            };
        }
        let items: Vec<ItemModel> = query.fetch_all(&self.pool).await?;

        let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
        let mut images_by_item: HashMap<Uuid, Vec<ItemImageModel>> = HashMap::new();
        if !ids.is_empty() {
            let images: Vec<ItemImageModel> = sqlx::query_as(&format!(
                "SELECT {IMAGE_COLUMNS} FROM item_images WHERE item_id = ANY($1) ORDER BY created_at"
            ))
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
            for image in images {
                images_by_item.entry(image.item_id).or_default().push(image);
            }
        }

        let items = items
            .into_iter()
            .map(|item| {
                let images = images_by_item.remove(&item.id).unwrap_or_default();
                BrowseItem { item, images }
            })
            .collect();

        Ok(BrowseResponse {
            items,
            page,
            page_size: PAGE_SIZE,
        })
    }

    /// Staff dashboard: every item regardless of state, with claim counts
    /// and the latest claimant for each row.
    pub async fn dashboard(&self, actor: &Actor, page: u32) -> AppResult<Vec<DashboardEntry>> {
        if !actor.role.can_upload() {
            return Err(AppError::Forbidden("staff account required".to_string()));
        }
        let offset = (page.max(1) as i64 - 1) * DASHBOARD_PAGE_SIZE;

        let rows: Vec<DashboardRow> = sqlx::query_as(
            "SELECT i.*, COUNT(c.id) AS claim_count, \
             (SELECT claimant_name FROM claims WHERE item_id = i.id \
              ORDER BY claimed_at DESC LIMIT 1) AS latest_claimant, \
             MAX(c.claimed_at) AS latest_claimed_at \
             FROM items i LEFT JOIN claims c ON c.item_id = i.id \
             GROUP BY i.id \
             ORDER BY i.date_found DESC, i.created_at DESC \
             LIMIT $1 OFFSET $2",
        )
        .bind(DASHBOARD_PAGE_SIZE)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DashboardEntry {
                multiple_claims: row.claim_count > 1,
                item: row.item,
                claim_count: row.claim_count,
                latest_claimant: row.latest_claimant,
                latest_claimed_at: row.latest_claimed_at,
            })
            .collect())
    }
}

fn parse_filters(filters: BrowseFilters) -> AppResult<ParsedBrowse> {
    let mut errors: Vec<FieldError> = Vec::new();

    let segment = match filters.audience.as_deref().map(str::trim) {
        None | Some("") => ItemType::Senior,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            errors.push(FieldError {
                field: "audience".to_string(),
                message: "Unknown audience segment".to_string(),
            });
            ItemType::Senior
        }),
    };

    let category = match filters.category.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse() {
            Ok(category) => Some(category),
            Err(_) => {
                errors.push(FieldError {
                    field: "category".to_string(),
                    message: "Unknown category".to_string(),
                });
                None
            }
        },
    };

    let mut parse_date = |field: &str, raw: Option<&str>| -> Option<NaiveDate> {
        match raw.map(str::trim) {
            None | Some("") => None,
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.push(FieldError {
                        field: field.to_string(),
                        message: "Expected a date like 2025-03-09".to_string(),
                    });
                    None
                }
            },
        }
    };
    let date_from = parse_date("date_from", filters.date_from.as_deref());
    let date_to = parse_date("date_to", filters.date_to.as_deref());

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let page = filters.page.unwrap_or(1).max(1) as i64;
    Ok(ParsedBrowse {
        segment,
        q: filters.q.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        category,
        location: filters
            .location
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        date_from,
        date_to,
        offset: (page - 1) * PAGE_SIZE,
    })
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Assemble the public-listing query. Claimed items are kept visible per
/// category until their grace window lapses, so each category contributes
/// its own cutoff branch.
fn build_public_listing(filters: &ParsedBrowse, now: DateTime<Utc>) -> (String, Vec<Bind>) {
    let mut conditions: Vec<String> = vec!["approval_status = 'APPROVED'".to_string()];
    let mut binds: Vec<Bind> = Vec::new();
    let mut param = 1usize;

    conditions.push(format!("item_type = ${param}"));
    binds.push(Bind::Segment(filters.segment));
    param += 1;

    let mut visible = vec!["status = 'FOUND'".to_string()];
    for category in Category::ALL {
        visible.push(format!(
            "(status = 'CLAIMED' AND category = ${} AND claimed_at IS NOT NULL AND claimed_at > ${})",
            param,
            param + 1
        ));
        binds.push(Bind::Cat(category));
        binds.push(Bind::Ts(now - category.claim_window()));
        param += 2;
    }
    conditions.push(format!("({})", visible.join(" OR ")));

    if let Some(q) = &filters.q {
        conditions.push(format!("(title ILIKE ${param} OR description ILIKE ${param})"));
        binds.push(Bind::Text(format!("%{}%", escape_like(q))));
        param += 1;
    }
    if let Some(category) = filters.category {
        conditions.push(format!("category = ${param}"));
        binds.push(Bind::Cat(category));
        param += 1;
    }
    if let Some(location) = &filters.location {
        conditions.push(format!("location_found ILIKE ${param}"));
        binds.push(Bind::Text(format!("%{}%", escape_like(location))));
        param += 1;
    }
    if let Some(from) = filters.date_from {
        conditions.push(format!("date_found >= ${param}"));
        binds.push(Bind::Date(from));
        param += 1;
    }
    if let Some(to) = filters.date_to {
        conditions.push(format!("date_found <= ${param}"));
        binds.push(Bind::Date(to));
        param += 1;
    }

    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE {} \
         ORDER BY date_found DESC, created_at DESC LIMIT {PAGE_SIZE} OFFSET ${param}",
        conditions.join(" AND ")
    );
    binds.push(Bind::Int(filters.offset));

    (sql, binds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_filters() -> ParsedBrowse {
        ParsedBrowse {
            segment: ItemType::Senior,
            q: None,
            category: None,
            location: None,
            date_from: None,
            date_to: None,
            offset: 0,
        }
    }

    #[test]
    fn listing_sql_has_one_claimed_branch_per_category() {
        let (sql, binds) = build_public_listing(&bare_filters(), Utc::now());
        assert_eq!(sql.matches("status = 'CLAIMED'").count(), Category::ALL.len());
        assert!(sql.contains("approval_status = 'APPROVED'"));
        assert!(sql.contains("status = 'FOUND'"));
        // segment + (category, cutoff) per category + offset
        assert_eq!(binds.len(), 1 + Category::ALL.len() * 2 + 1);
        assert!(sql.ends_with(&format!("OFFSET ${}", binds.len())));
    }

    #[test]
    fn listing_sql_reuses_the_search_bind_for_both_columns() {
        let mut filters = bare_filters();
        filters.q = Some("umbrella".to_string());
        let (sql, binds) = build_public_listing(&filters, Utc::now());
        let q_param = format!("${}", 2 + Category::ALL.len() * 2);
        assert_eq!(sql.matches(&q_param).count(), 2);
        assert_eq!(binds.len(), 1 + Category::ALL.len() * 2 + 1 + 1);
    }

    #[test]
    fn listing_sql_appends_optional_filters_in_order() {
        let mut filters = bare_filters();
        filters.q = Some("bottle".to_string());
        filters.category = Some(Category::BottlesAndContainers);
        filters.location = Some("gym".to_string());
        filters.date_from = NaiveDate::from_ymd_opt(2025, 3, 1);
        filters.date_to = NaiveDate::from_ymd_opt(2025, 3, 31);
        let (sql, binds) = build_public_listing(&filters, Utc::now());
        assert!(sql.contains("location_found ILIKE"));
        assert!(sql.contains("date_found >="));
        assert!(sql.contains("date_found <="));
        assert_eq!(binds.len(), 1 + Category::ALL.len() * 2 + 5 + 1);
        assert!(sql.ends_with(&format!("OFFSET ${}", binds.len())));
    }

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("100%_a\\b"), "100\\%\\_a\\\\b");
    }

    #[test]
    fn draft_validation_collects_field_errors() {
        let draft = ItemDraft {
            title: "   ".to_string(),
            date_found: Some("9/3/2025".to_string()),
            category: Some("GADGETS".to_string()),
            ..ItemDraft::default()
        };
        match draft.validate() {
            Err(AppError::Validation(fields)) => {
                let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
                assert!(names.contains(&"title"));
                assert!(names.contains(&"date_found"));
                assert!(names.contains(&"category"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn draft_defaults_category_and_type() {
        let draft = ItemDraft {
            title: "Black umbrella".to_string(),
            date_found: Some("2025-03-09".to_string()),
            ..ItemDraft::default()
        };
        let new = draft.validate().unwrap();
        assert_eq!(new.category, Category::OtherMisc);
        assert_eq!(new.item_type, ItemType::Senior);
        assert_eq!(new.date_found, NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());
    }
}
