use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Electronics,
    BagsAndCarry,
    SportsAndClothing,
    BottlesAndContainers,
    DocumentsAndIds,
    NotebooksAndBooks,
    OtherMisc,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Electronics,
        Category::BagsAndCarry,
        Category::SportsAndClothing,
        Category::BottlesAndContainers,
        Category::DocumentsAndIds,
        Category::NotebooksAndBooks,
        Category::OtherMisc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Electronics => "ELECTRONICS",
            Category::BagsAndCarry => "BAGS_AND_CARRY",
            Category::SportsAndClothing => "SPORTS_AND_CLOTHING",
            Category::BottlesAndContainers => "BOTTLES_AND_CONTAINERS",
            Category::DocumentsAndIds => "DOCUMENTS_AND_IDS",
            Category::NotebooksAndBooks => "NOTEBOOKS_AND_BOOKS",
            Category::OtherMisc => "OTHER_MISC",
        }
    }

    /// How long a claimed item stays publicly listed after being claimed.
    /// Higher-value categories get a longer grace window.
    pub fn claim_window(&self) -> Duration {
        match self {
            Category::Electronics => Duration::days(7),
            Category::SportsAndClothing => Duration::days(3),
            _ => Duration::days(1),
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Found,
    Claimed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Found => "FOUND",
            ItemStatus::Claimed => "CLAIMED",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ApprovalStatus::Pending),
            "APPROVED" => Ok(ApprovalStatus::Approved),
            "REJECTED" => Ok(ApprovalStatus::Rejected),
            other => Err(format!("unknown approval status: {other}")),
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audience segment an item belongs to; the public browse view serves one
/// segment at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Senior,
    Primary,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Senior => "SENIOR",
            ItemType::Primary => "PRIMARY",
        }
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENIOR" => Ok(ItemType::Senior),
            "PRIMARY" => Ok(ItemType::Primary),
            other => Err(format!("unknown item type: {other}")),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ItemModel {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub location_found: String,
    pub date_found: NaiveDate,
    pub status: ItemStatus,
    pub approval_status: ApprovalStatus,
    pub item_type: ItemType,
    /// Legacy single-claimant fields, stamped once by the first claim and
    /// never overwritten. The claims table is the source of truth.
    pub claimed_by_name: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemModel {
    /// The public listing contract: approved, in the requested segment, and
    /// either still unclaimed or claimed within the category's grace window.
    pub fn publicly_visible_at(&self, now: DateTime<Utc>, segment: ItemType) -> bool {
        if self.approval_status != ApprovalStatus::Approved || self.item_type != segment {
            return false;
        }
        match self.status {
            ItemStatus::Found => true,
            ItemStatus::Claimed => match self.claimed_at {
                Some(claimed_at) => now - claimed_at < self.category.claim_window(),
                None => false,
            },
        }
    }
}

/// An uploaded image payload, before persistence or analysis.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ItemImageModel {
    pub id: Uuid,
    pub item_id: Uuid,
    /// Key in the object-storage bucket, or None when the blob lives in the
    /// database.
    pub storage_key: Option<String>,
    pub blob: Option<String>,
    pub content_type: String,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(category: Category) -> ItemModel {
        let created = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        ItemModel {
            id: Uuid::new_v4(),
            title: "Black umbrella".to_string(),
            description: String::new(),
            category,
            location_found: "Gym foyer".to_string(),
            date_found: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
            status: ItemStatus::Found,
            approval_status: ApprovalStatus::Approved,
            item_type: ItemType::Senior,
            claimed_by_name: None,
            claimed_at: None,
            created_by: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn claim_windows_by_category() {
        assert_eq!(Category::Electronics.claim_window(), Duration::days(7));
        assert_eq!(Category::SportsAndClothing.claim_window(), Duration::days(3));
        assert_eq!(Category::BagsAndCarry.claim_window(), Duration::days(1));
        assert_eq!(Category::DocumentsAndIds.claim_window(), Duration::days(1));
        assert_eq!(Category::OtherMisc.claim_window(), Duration::days(1));
    }

    #[test]
    fn unapproved_items_are_never_visible() {
        let now = Utc::now();
        for status in [ApprovalStatus::Pending, ApprovalStatus::Rejected] {
            let mut it = item(Category::OtherMisc);
            it.approval_status = status;
            assert!(!it.publicly_visible_at(now, ItemType::Senior));
        }
    }

    #[test]
    fn wrong_segment_is_not_visible() {
        let it = item(Category::OtherMisc);
        assert!(it.publicly_visible_at(Utc::now(), ItemType::Senior));
        assert!(!it.publicly_visible_at(Utc::now(), ItemType::Primary));
    }

    #[test]
    fn claimed_item_ages_out_after_its_window() {
        let claimed_at = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let mut it = item(Category::Electronics);
        it.status = ItemStatus::Claimed;
        it.claimed_by_name = Some("Priya".to_string());
        it.claimed_at = Some(claimed_at);

        let within = claimed_at + Duration::days(6);
        let boundary = claimed_at + Duration::days(7);
        let after = claimed_at + Duration::days(8);
        assert!(it.publicly_visible_at(within, ItemType::Senior));
        assert!(!it.publicly_visible_at(boundary, ItemType::Senior));
        assert!(!it.publicly_visible_at(after, ItemType::Senior));
    }

    #[test]
    fn claimed_without_timestamp_is_hidden() {
        let mut it = item(Category::OtherMisc);
        it.status = ItemStatus::Claimed;
        it.claimed_at = None;
        assert!(!it.publicly_visible_at(Utc::now(), ItemType::Senior));
    }

    #[test]
    fn category_round_trips_through_wire_name() {
        for c in Category::ALL {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
        }
        assert!("GADGETS".parse::<Category>().is_err());
    }
}
