use std::str::FromStr;

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::db::models::{UserInsert, UserRow, UserUpdate, WardrobeItemInsert, WardrobeItemRow};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // Every connection to `:memory:` opens its own empty database, so keep exactly one alive.
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                username TEXT NOT NULL UNIQUE,\
                body_type TEXT NOT NULL,\
                gender TEXT,\
                created_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS wardrobe_items (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                user_id INTEGER NOT NULL,\
                category TEXT NOT NULL,\
                color TEXT NOT NULL,\
                style TEXT NOT NULL,\
                description TEXT,\
                created_at TEXT NOT NULL,\
                FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_wardrobe_items_user_id ON wardrobe_items(user_id);",
        )
        .execute(&pool)
        .await?;

        info!("Database tables created successfully");

        Ok(Database { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn create_user(&self, user: &UserInsert) -> Result<UserRow, StoreError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (username, body_type, gender, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.body_type)
        .bind(&user.gender)
        .bind(created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(UserRow {
                id: done.last_insert_rowid(),
                username: user.username.clone(),
                body_type: user.body_type.clone(),
                gender: user.gender.clone(),
                created_at,
            }),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::DuplicateUsername(user.username.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, body_type, gender, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_user(&self, user_id: i64, update: &UserUpdate) -> Result<Option<UserRow>> {
        let result = sqlx::query(
            "UPDATE users \
             SET body_type = COALESCE(?, body_type), \
                 gender = CASE WHEN ? THEN ? ELSE gender END \
             WHERE id = ?",
        )
        .bind(&update.body_type)
        .bind(update.gender.is_some())
        .bind(update.gender.clone().flatten())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(user_id).await
    }

    /// Removes the user together with their wardrobe. Returns false when no such user.
    pub async fn delete_user(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_wardrobe_item(
        &self,
        user_id: i64,
        item: &WardrobeItemInsert,
    ) -> Result<WardrobeItemRow> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO wardrobe_items (user_id, category, color, style, description, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(&item.category)
        .bind(&item.color)
        .bind(&item.style)
        .bind(&item.description)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(WardrobeItemRow {
            id: result.last_insert_rowid(),
            user_id,
            category: item.category.clone(),
            color: item.color.clone(),
            style: item.style.clone(),
            description: item.description.clone(),
            created_at,
        })
    }

    pub async fn list_wardrobe_items(&self, user_id: i64) -> Result<Vec<WardrobeItemRow>> {
        let rows = sqlx::query_as::<_, WardrobeItemRow>(
            "SELECT id, user_id, category, color, style, description, created_at \
             FROM wardrobe_items WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_wardrobe_item(&self, user_id: i64, item_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM wardrobe_items WHERE id = ? AND user_id = ?")
            .bind(item_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> Database {
        Database::init("sqlite::memory:")
            .await
            .expect("in-memory database")
    }

    fn new_user(username: &str) -> UserInsert {
        UserInsert {
            username: username.to_string(),
            body_type: "стандартный".to_string(),
            gender: None,
        }
    }

    fn jacket() -> WardrobeItemInsert {
        WardrobeItemInsert {
            category: "пиджак".to_string(),
            color: "темно-синий".to_string(),
            style: "office".to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn users_round_trip_and_reject_duplicate_names() {
        let db = memory_db().await;
        let created = db.create_user(&new_user("anna")).await.unwrap();
        assert!(created.id > 0);

        let fetched = db.get_user(created.id).await.unwrap().expect("stored");
        assert_eq!(fetched.username, "anna");
        assert_eq!(fetched.body_type, "стандартный");

        let duplicate = db.create_user(&new_user("anna")).await;
        assert!(matches!(duplicate, Err(StoreError::DuplicateUsername(name)) if name == "anna"));
        assert!(db.get_user(created.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_keeps_fields_that_were_not_sent() {
        let db = memory_db().await;
        let user = db.create_user(&new_user("boris")).await.unwrap();

        let updated = db
            .update_user(
                user.id,
                &UserUpdate {
                    body_type: None,
                    gender: Some(Some("мужской".to_string())),
                },
            )
            .await
            .unwrap()
            .expect("user exists");
        assert_eq!(updated.body_type, "стандартный");
        assert_eq!(updated.gender.as_deref(), Some("мужской"));

        let untouched = db
            .update_user(
                user.id,
                &UserUpdate {
                    body_type: Some("плотный".to_string()),
                    gender: None,
                },
            )
            .await
            .unwrap()
            .expect("user exists");
        assert_eq!(untouched.body_type, "плотный");
        assert_eq!(untouched.gender.as_deref(), Some("мужской"));

        let cleared = db
            .update_user(
                user.id,
                &UserUpdate {
                    body_type: None,
                    gender: Some(None),
                },
            )
            .await
            .unwrap()
            .expect("user exists");
        assert_eq!(cleared.body_type, "плотный");
        assert!(cleared.gender.is_none());

        let missing = db.update_user(999, &UserUpdate::default()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn wardrobe_items_are_scoped_to_their_owner() {
        let db = memory_db().await;
        let owner = db.create_user(&new_user("owner")).await.unwrap();
        let other = db.create_user(&new_user("other")).await.unwrap();

        let first = db.insert_wardrobe_item(owner.id, &jacket()).await.unwrap();
        let mut jeans = jacket();
        jeans.category = "джинсы".to_string();
        db.insert_wardrobe_item(owner.id, &jeans).await.unwrap();

        let items = db.list_wardrobe_items(owner.id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, first.id);
        assert_eq!(items[1].category, "джинсы");
        assert!(db.list_wardrobe_items(other.id).await.unwrap().is_empty());

        assert!(!db.delete_wardrobe_item(other.id, first.id).await.unwrap());
        assert!(db.delete_wardrobe_item(owner.id, first.id).await.unwrap());
        assert_eq!(db.list_wardrobe_items(owner.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_to_the_wardrobe() {
        let db = memory_db().await;
        let user = db.create_user(&new_user("cascade")).await.unwrap();
        db.insert_wardrobe_item(user.id, &jacket()).await.unwrap();

        assert!(db.delete_user(user.id).await.unwrap());
        assert!(!db.delete_user(user.id).await.unwrap());
        assert!(db.list_wardrobe_items(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wardrobe_rows_require_an_existing_user() {
        let db = memory_db().await;
        assert!(db.insert_wardrobe_item(42, &jacket()).await.is_err());
        db.health_check().await.unwrap();
    }
}
