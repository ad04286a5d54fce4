//! Notification ledger service

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::notification::{CreateNotification, Notification},
    repository::Repository,
};

#[derive(Clone)]
pub struct NotificationsService {
    repository: Repository,
}

impl NotificationsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Append a notification to a user's inbox
    pub async fn notify(&self, input: CreateNotification) -> AppResult<Notification> {
        let notification = Notification::new(input);
        let saved = self.repository.notifications.save(&notification).await?;
        tracing::debug!(
            user_id = %saved.user_id,
            kind = saved.kind.as_str(),
            "Saved notification"
        );
        Ok(saved)
    }

    /// Notifications for a user, newest first
    pub async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<Notification>> {
        self.repository.notifications.get_by_user_id(user_id).await
    }

    pub async fn mark_read(&self, id: Uuid, user_id: &str) -> AppResult<()> {
        let notification = self
            .repository
            .notifications
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;

        if notification.user_id != user_id {
            return Err(AppError::Forbidden(
                "You can only update your own notifications".to_string(),
            ));
        }

        if !notification.read {
            self.repository.notifications.mark_as_read(id).await?;
        }
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<()> {
        self.repository.notifications.mark_all_as_read(user_id).await
    }
}
