//! Loan lifecycle events broadcast to downstream consumers (email, analytics)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::loan::Loan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanEventType {
    #[serde(rename = "device.reserved")]
    Reserved,
    #[serde(rename = "device.collected")]
    Collected,
    #[serde(rename = "device.returned")]
    Returned,
    #[serde(rename = "device.reservation.cancelled")]
    Cancelled,
}

impl LoanEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanEventType::Reserved => "device.reserved",
            LoanEventType::Collected => "device.collected",
            LoanEventType::Returned => "device.returned",
            LoanEventType::Cancelled => "device.reservation.cancelled",
        }
    }

    /// Event type name on the Event Grid topic
    pub fn grid_type(&self) -> &'static str {
        match self {
            LoanEventType::Reserved => "Loan.Reserved",
            LoanEventType::Collected => "Loan.Collected",
            LoanEventType::Returned => "Loan.Returned",
            LoanEventType::Cancelled => "Loan.Cancelled",
        }
    }
}

impl std::fmt::Display for LoanEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanEventData {
    pub loan_id: Uuid,
    pub user_id: String,
    pub device_id: String,
    pub device_model: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanEvent {
    #[serde(rename = "type")]
    pub event_type: LoanEventType,
    pub data: LoanEventData,
}

impl LoanEvent {
    fn base(event_type: LoanEventType, loan: &Loan, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type,
            data: LoanEventData {
                loan_id: loan.id,
                user_id: loan.user_id.clone(),
                device_id: loan.device_id.clone(),
                device_model: loan.device_model.clone(),
                timestamp,
                due_date: None,
                reserved_at: None,
                collected_at: None,
                returned_at: None,
                cancelled_at: None,
            },
        }
    }

    pub fn reserved(loan: &Loan) -> Self {
        let mut event = Self::base(LoanEventType::Reserved, loan, loan.reserved_at);
        event.data.reserved_at = Some(loan.reserved_at);
        event.data.due_date = Some(loan.due_date);
        event
    }

    pub fn collected(loan: &Loan) -> Self {
        let at = loan.collected_at.unwrap_or_else(Utc::now);
        let mut event = Self::base(LoanEventType::Collected, loan, at);
        event.data.collected_at = Some(at);
        event.data.due_date = Some(loan.due_date);
        event
    }

    pub fn returned(loan: &Loan) -> Self {
        let at = loan.returned_at.unwrap_or_else(Utc::now);
        let mut event = Self::base(LoanEventType::Returned, loan, at);
        event.data.returned_at = Some(at);
        event
    }

    pub fn cancelled(loan: &Loan, cancelled_at: DateTime<Utc>) -> Self {
        let mut event = Self::base(LoanEventType::Cancelled, loan, cancelled_at);
        event.data.cancelled_at = Some(cancelled_at);
        event
    }
}
