use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub body_type: String,
    pub gender: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct WardrobeItemRow {
    pub id: i64,
    pub user_id: i64,
    pub category: String,
    pub color: String,
    pub style: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserInsert {
    pub username: String,
    pub body_type: String,
    pub gender: Option<String>,
}

/// Fields left as `None` keep their stored value; `gender: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub body_type: Option<String>,
    pub gender: Option<Option<String>>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.body_type.is_none() && self.gender.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WardrobeItemInsert {
    pub category: String,
    pub color: String,
    pub style: String,
    pub description: Option<String>,
}
