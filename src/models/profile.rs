use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AppUserModel {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

/// 1:1 extension of an account, created lazily on first login or first
/// admin access.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserProfileModel {
    pub user_id: Uuid,
    pub is_super_user: bool,
    pub created_at: DateTime<Utc>,
}

/// What an authenticated staff account is allowed to do. Super users
/// approve submissions and their own uploads skip the approval queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    SuperUser,
}

impl Role {
    pub fn can_upload(&self) -> bool {
        matches!(self, Role::Staff | Role::SuperUser)
    }

    pub fn can_approve(&self) -> bool {
        matches!(self, Role::SuperUser)
    }

    pub fn auto_approved(&self) -> bool {
        matches!(self, Role::SuperUser)
    }
}

/// The resolved identity a request acts as. Built once by the auth
/// middleware and passed into every operation; business code never reads
/// request state directly.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_upload_but_do_not_approve() {
        assert!(Role::Staff.can_upload());
        assert!(!Role::Staff.can_approve());
        assert!(!Role::Staff.auto_approved());
    }

    #[test]
    fn super_users_hold_every_capability() {
        assert!(Role::SuperUser.can_upload());
        assert!(Role::SuperUser.can_approve());
        assert!(Role::SuperUser.auto_approved());
    }
}
