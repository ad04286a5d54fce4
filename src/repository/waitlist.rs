//! Waitlist store

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::waitlist::WaitlistEntry,
};

#[async_trait]
pub trait WaitlistStore: Send + Sync {
    /// Insert or update by id
    async fn save(&self, entry: &WaitlistEntry) -> AppResult<WaitlistEntry>;

    /// Entries for a device, oldest first
    async fn get_by_device_id(&self, device_id: &str) -> AppResult<Vec<WaitlistEntry>>;

    /// Entries for a user, newest first
    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Vec<WaitlistEntry>>;

    /// Entries still waiting for a device, oldest first
    async fn get_unnotified_by_device_id(&self, device_id: &str) -> AppResult<Vec<WaitlistEntry>>;
}

fn already_waiting() -> AppError {
    AppError::Conflict("You are already on the waitlist for this device".to_string())
}

/// In-memory waitlist store. Insertion order breaks `joined_at` ties.
#[derive(Default)]
pub struct MemoryWaitlistRepository {
    entries: RwLock<Vec<WaitlistEntry>>,
}

impl MemoryWaitlistRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn select<F>(&self, filter: F) -> Vec<WaitlistEntry>
    where
        F: Fn(&WaitlistEntry) -> bool,
    {
        let mut entries: Vec<WaitlistEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| filter(e))
            .cloned()
            .collect();
        // stable sort keeps insertion order for equal timestamps
        entries.sort_by_key(|e| e.joined_at);
        entries
    }
}

#[async_trait]
impl WaitlistStore for MemoryWaitlistRepository {
    async fn save(&self, entry: &WaitlistEntry) -> AppResult<WaitlistEntry> {
        let mut entries = self.entries.write().await;

        if !entry.notified
            && entries.iter().any(|e| {
                e.id != entry.id
                    && e.user_id == entry.user_id
                    && e.device_id == entry.device_id
                    && !e.notified
            })
        {
            return Err(already_waiting());
        }

        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry.clone(),
            None => entries.push(entry.clone()),
        }
        Ok(entry.clone())
    }

    async fn get_by_device_id(&self, device_id: &str) -> AppResult<Vec<WaitlistEntry>> {
        Ok(self.select(|e| e.device_id == device_id).await)
    }

    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Vec<WaitlistEntry>> {
        let mut entries = self.select(|e| e.user_id == user_id).await;
        entries.reverse();
        Ok(entries)
    }

    async fn get_unnotified_by_device_id(&self, device_id: &str) -> AppResult<Vec<WaitlistEntry>> {
        Ok(self
            .select(|e| e.device_id == device_id && !e.notified)
            .await)
    }
}

/// Postgres waitlist store
#[derive(Clone)]
pub struct PgWaitlistRepository {
    pool: Pool<Postgres>,
}

impl PgWaitlistRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WaitlistStore for PgWaitlistRepository {
    async fn save(&self, entry: &WaitlistEntry) -> AppResult<WaitlistEntry> {
        let saved = sqlx::query_as::<_, WaitlistEntry>(
            r#"
            INSERT INTO waitlist (
                id, user_id, user_email, user_name, device_id,
                device_brand, device_model, joined_at, notified, notified_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                notified = EXCLUDED.notified,
                notified_at = EXCLUDED.notified_at
            RETURNING *
            "#,
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(&entry.user_email)
        .bind(&entry.user_name)
        .bind(&entry.device_id)
        .bind(&entry.device_brand)
        .bind(&entry.device_model)
        .bind(entry.joined_at)
        .bind(entry.notified)
        .bind(entry.notified_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // uq_waitlist_unnotified_user_device
            let unique = e
                .as_database_error()
                .map_or(false, |db| db.is_unique_violation());
            if unique {
                already_waiting()
            } else {
                AppError::Database(e)
            }
        })?;
        Ok(saved)
    }

    async fn get_by_device_id(&self, device_id: &str) -> AppResult<Vec<WaitlistEntry>> {
        let entries = sqlx::query_as::<_, WaitlistEntry>(
            "SELECT * FROM waitlist WHERE device_id = $1 ORDER BY joined_at ASC",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Vec<WaitlistEntry>> {
        let entries = sqlx::query_as::<_, WaitlistEntry>(
            "SELECT * FROM waitlist WHERE user_id = $1 ORDER BY joined_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn get_unnotified_by_device_id(&self, device_id: &str) -> AppResult<Vec<WaitlistEntry>> {
        let entries = sqlx::query_as::<_, WaitlistEntry>(
            r#"
            SELECT * FROM waitlist
            WHERE device_id = $1 AND notified = FALSE
            ORDER BY joined_at ASC
            "#,
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
