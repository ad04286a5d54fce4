//! User notification model (per-user inbox of loan lifecycle events)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum NotificationKind {
    #[serde(rename = "device.reserved")]
    Reserved,
    #[serde(rename = "device.collected")]
    Collected,
    #[serde(rename = "device.returned")]
    Returned,
    #[serde(rename = "device.available")]
    Available,
    #[serde(rename = "device.cancelled")]
    Cancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Reserved => "device.reserved",
            NotificationKind::Collected => "device.collected",
            NotificationKind::Returned => "device.returned",
            NotificationKind::Available => "device.available",
            NotificationKind::Cancelled => "device.cancelled",
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device.reserved" => Ok(NotificationKind::Reserved),
            "device.collected" => Ok(NotificationKind::Collected),
            "device.returned" => Ok(NotificationKind::Returned),
            "device.available" => Ok(NotificationKind::Available),
            "device.cancelled" => Ok(NotificationKind::Cancelled),
            _ => Err(format!("Invalid notification kind: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for NotificationKind {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for NotificationKind {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for NotificationKind {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <String as Encode<Postgres>>::encode(self.as_str().to_string(), buf)
    }
}

/// Notification record. Append-only apart from the `read` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub loan_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub device_brand: Option<String>,
    pub device_model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub loan_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub device_brand: Option<String>,
    pub device_model: Option<String>,
}

impl Notification {
    pub fn new(input: CreateNotification) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            kind: input.kind,
            title: input.title,
            message: input.message,
            loan_id: input.loan_id,
            device_id: input.device_id,
            device_brand: input.device_brand,
            device_model: input.device_model,
            created_at: Utc::now(),
            read: false,
        }
    }
}
