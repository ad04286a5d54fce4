//! Notification ledger

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{error::AppResult, models::notification::Notification};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn save(&self, notification: &Notification) -> AppResult<Notification>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Notification>>;

    /// Notifications for a user, newest first
    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Vec<Notification>>;

    async fn mark_as_read(&self, id: Uuid) -> AppResult<()>;

    async fn mark_all_as_read(&self, user_id: &str) -> AppResult<()>;
}

#[derive(Default)]
pub struct MemoryNotificationsRepository {
    notifications: RwLock<Vec<Notification>>,
}

impl MemoryNotificationsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationsRepository {
    async fn save(&self, notification: &Notification) -> AppResult<Notification> {
        let mut notifications = self.notifications.write().await;
        match notifications.iter_mut().find(|n| n.id == notification.id) {
            Some(existing) => *existing = notification.clone(),
            None => notifications.push(notification.clone()),
        }
        Ok(notification.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Notification>> {
        Ok(self
            .notifications
            .read()
            .await
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Vec<Notification>> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .read()
            .await
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by_key(|n| n.created_at);
        notifications.reverse();
        Ok(notifications)
    }

    async fn mark_as_read(&self, id: Uuid) -> AppResult<()> {
        if let Some(n) = self.notifications.write().await.iter_mut().find(|n| n.id == id) {
            n.read = true;
        }
        Ok(())
    }

    async fn mark_all_as_read(&self, user_id: &str) -> AppResult<()> {
        self.notifications
            .write()
            .await
            .iter_mut()
            .filter(|n| n.user_id == user_id)
            .for_each(|n| n.read = true);
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgNotificationsRepository {
    pool: Pool<Postgres>,
}

impl PgNotificationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationsRepository {
    async fn save(&self, notification: &Notification) -> AppResult<Notification> {
        let saved = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (
                id, user_id, kind, title, message, loan_id,
                device_id, device_brand, device_model, created_at, read
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET read = EXCLUDED.read
            RETURNING *
            "#,
        )
        .bind(notification.id)
        .bind(&notification.user_id)
        .bind(notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.loan_id)
        .bind(&notification.device_id)
        .bind(&notification.device_brand)
        .bind(&notification.device_model)
        .bind(notification.created_at)
        .bind(notification.read)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Notification>> {
        let notification =
            sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(notification)
    }

    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    async fn mark_as_read(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_all_as_read(&self, user_id: &str) -> AppResult<()> {
        sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = $1 AND read = FALSE")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
