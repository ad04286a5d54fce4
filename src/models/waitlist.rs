//! Waitlist entry model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// A user waiting for a device to come back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
    pub device_id: String,
    pub device_brand: String,
    pub device_model: String,
    pub joined_at: DateTime<Utc>,
    pub notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
}

/// Data needed to put a user on a device's waitlist
#[derive(Debug, Clone)]
pub struct CreateWaitlistEntry {
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
    pub device_id: String,
    pub device_brand: String,
    pub device_model: String,
}

impl WaitlistEntry {
    pub fn new(input: CreateWaitlistEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            user_email: input.user_email,
            user_name: input.user_name,
            device_id: input.device_id,
            device_brand: input.device_brand,
            device_model: input.device_model,
            joined_at: Utc::now(),
            notified: false,
            notified_at: None,
        }
    }

    /// Copy flagged as told that the device is available again
    pub fn mark_notified(&self, now: DateTime<Utc>) -> Self {
        Self {
            notified: true,
            notified_at: Some(now),
            ..self.clone()
        }
    }
}

/// Join waitlist request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinWaitlistRequest {
    #[validate(length(min = 1, message = "Device ID is required"))]
    pub device_id: String,
}
