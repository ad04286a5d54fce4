//! Waitlist service: joining a device's queue and the return cascade

use std::sync::Arc;

use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::{
        notification::{CreateNotification, NotificationKind},
        user::UserClaims,
        waitlist::{CreateWaitlistEntry, WaitlistEntry},
    },
    repository::Repository,
};

use super::{devices::DeviceCatalogue, notifications::NotificationsService};

#[derive(Clone)]
pub struct WaitlistService {
    repository: Repository,
    devices: Arc<dyn DeviceCatalogue>,
    notifications: NotificationsService,
}

impl WaitlistService {
    pub fn new(
        repository: Repository,
        devices: Arc<dyn DeviceCatalogue>,
        notifications: NotificationsService,
    ) -> Self {
        Self {
            repository,
            devices,
            notifications,
        }
    }

    /// Put a user in line for a device
    pub async fn join(&self, user: &UserClaims, device_id: &str) -> AppResult<WaitlistEntry> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(AppError::Validation("Device ID is required".to_string()));
        }

        let device = self
            .devices
            .get_device(device_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Device not found: {}", device_id)))?;

        let already_waiting = self
            .repository
            .waitlist
            .get_by_user_id(user.user_id())
            .await?
            .iter()
            .any(|e| e.device_id == device_id && !e.notified);

        if already_waiting {
            return Err(AppError::Conflict(
                "You are already on the waitlist for this device".to_string(),
            ));
        }

        let entry = WaitlistEntry::new(CreateWaitlistEntry {
            user_id: user.user_id().to_string(),
            user_email: user.email.clone(),
            user_name: user.name.clone(),
            device_id: device_id.to_string(),
            device_brand: device.brand,
            device_model: device.model,
        });

        let saved = self.repository.waitlist.save(&entry).await?;
        tracing::info!(user_id = %saved.user_id, device_id = %saved.device_id, "Joined waitlist");
        Ok(saved)
    }

    /// A user's waitlist entries, newest first
    pub async fn get_user_waitlist(&self, user_id: &str) -> AppResult<Vec<WaitlistEntry>> {
        self.repository.waitlist.get_by_user_id(user_id).await
    }

    /// Tell the earliest waiting user that the device is back. At most one
    /// entry is notified per call; later entrants wait for the next return.
    pub async fn notify_next_in_line(&self, device_id: &str) -> AppResult<Option<WaitlistEntry>> {
        let waiting = self
            .repository
            .waitlist
            .get_unnotified_by_device_id(device_id)
            .await?;

        let Some(first) = waiting.into_iter().next() else {
            return Ok(None);
        };

        self.notifications
            .notify(CreateNotification {
                user_id: first.user_id.clone(),
                kind: NotificationKind::Available,
                title: "Device Now Available!".to_string(),
                message: format!(
                    "Good news! {} {} is now available. Reserve it now!",
                    first.device_brand, first.device_model
                ),
                loan_id: None,
                device_id: Some(first.device_id.clone()),
                device_brand: Some(first.device_brand.clone()),
                device_model: Some(first.device_model.clone()),
            })
            .await?;

        let notified = first.mark_notified(Utc::now());
        let saved = self.repository.waitlist.save(&notified).await?;

        tracing::info!(
            user_email = %saved.user_email,
            device_id = %saved.device_id,
            "Notified waitlisted user that device is available"
        );
        Ok(Some(saved))
    }
}
