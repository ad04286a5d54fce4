//! Loan model and the loan lifecycle state machine
//!
//! A loan moves `reserved -> collected -> returned`. `overdue` is never the
//! target of a transition: it is derived from the due date when loans are
//! read, and only persisted by the overdue sweep.

use chrono::{DateTime, Days, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Loan window, counted in calendar days from the reservation
pub const LOAN_DURATION_DAYS: u64 = 2;

/// Loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Reserved,
    Collected,
    Returned,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Reserved => "reserved",
            LoanStatus::Collected => "collected",
            LoanStatus::Returned => "returned",
            LoanStatus::Overdue => "overdue",
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reserved" => Ok(LoanStatus::Reserved),
            "collected" => Ok(LoanStatus::Collected),
            "returned" => Ok(LoanStatus::Returned),
            "overdue" => Ok(LoanStatus::Overdue),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

// SQLx conversion for LoanStatus
impl sqlx::Type<Postgres> for LoanStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for LoanStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for LoanStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        let s: String = self.as_str().to_string();
        <String as Encode<Postgres>>::encode(s, buf)
    }
}

/// Loan of one device unit to one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: Uuid,
    pub user_id: String,
    pub device_id: String,
    /// Display name ("brand model"), frozen at reservation time
    pub device_model: String,
    pub reserved_at: DateTime<Utc>,
    pub collected_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub status: LoanStatus,
}

/// Due date for a reservation made at `reserved_at`
pub fn calculate_due_date(reserved_at: DateTime<Utc>) -> DateTime<Utc> {
    reserved_at + Days::new(LOAN_DURATION_DAYS)
}

fn required(value: &str, what: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", what)));
    }
    Ok(trimmed.to_string())
}

impl Loan {
    /// Create a new reservation
    pub fn create(user_id: &str, device_id: &str, device_model: &str) -> AppResult<Self> {
        Self::create_at(user_id, device_id, device_model, Utc::now())
    }

    pub fn create_at(
        user_id: &str,
        device_id: &str,
        device_model: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let user_id = required(user_id, "User ID")?;
        let device_id = required(device_id, "Device ID")?;
        let device_model = required(device_model, "Device model")?;

        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            device_id,
            device_model,
            reserved_at: now,
            collected_at: None,
            returned_at: None,
            due_date: calculate_due_date(now),
            status: LoanStatus::Reserved,
        })
    }

    /// Mark the device as picked up by the borrower
    pub fn collect(&self) -> AppResult<Self> {
        self.collect_at(Utc::now())
    }

    pub fn collect_at(&self, now: DateTime<Utc>) -> AppResult<Self> {
        if self.status != LoanStatus::Reserved {
            return Err(AppError::InvalidTransition(format!(
                "Only reserved loans can be collected (loan is {})",
                self.status
            )));
        }
        if self.collected_at.is_some() {
            return Err(AppError::InvalidTransition(
                "Loan has already been collected".to_string(),
            ));
        }

        Ok(Self {
            collected_at: Some(now),
            status: LoanStatus::Collected,
            ..self.clone()
        })
    }

    /// Mark the device as handed back
    pub fn return_device(&self) -> AppResult<Self> {
        self.return_at(Utc::now())
    }

    pub fn return_at(&self, now: DateTime<Utc>) -> AppResult<Self> {
        if self.status != LoanStatus::Collected {
            return Err(AppError::InvalidTransition(format!(
                "Only collected loans can be returned (loan is {})",
                self.status
            )));
        }
        if self.returned_at.is_some() {
            return Err(AppError::InvalidTransition(
                "Loan has already been returned".to_string(),
            ));
        }

        Ok(Self {
            returned_at: Some(now),
            status: LoanStatus::Returned,
            ..self.clone()
        })
    }

    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now())
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        if self.status == LoanStatus::Returned {
            return false;
        }
        now > self.due_date
    }

    /// Copy of the loan with its status re-derived against the due date.
    /// Pure: persisting the result is up to the caller.
    pub fn derive_overdue(&self) -> Self {
        self.derive_overdue_at(Utc::now())
    }

    pub fn derive_overdue_at(&self, now: DateTime<Utc>) -> Self {
        if self.is_overdue_at(now) {
            Self {
                status: LoanStatus::Overdue,
                ..self.clone()
            }
        } else {
            self.clone()
        }
    }

    /// Status before any overdue flip, recovered from the timestamps
    pub fn underlying_status(&self) -> LoanStatus {
        match self.status {
            LoanStatus::Overdue if self.collected_at.is_some() => LoanStatus::Collected,
            LoanStatus::Overdue => LoanStatus::Reserved,
            status => status,
        }
    }

    /// Copy with an `overdue` status rebased onto the underlying status
    pub fn without_overdue(&self) -> Self {
        Self {
            status: self.underlying_status(),
            ..self.clone()
        }
    }

    /// An active loan blocks new reservations of the same device
    pub fn is_active(&self) -> bool {
        self.returned_at.is_none() && self.status != LoanStatus::Returned
    }
}

/// Loan list filters
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub status: Option<LoanStatus>,
}

/// Result of a successful reservation
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReservationReceipt {
    pub loan_id: Uuid,
    pub device_model: String,
    pub due_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn reserved() -> Loan {
        Loan::create("user-123", "device-456", "Dell XPS 15").unwrap()
    }

    #[test]
    fn test_due_date_adds_two_days() {
        assert_eq!(calculate_due_date(at(2026, 1, 4, 10)), at(2026, 1, 6, 10));
    }

    #[test]
    fn test_due_date_month_boundary() {
        assert_eq!(calculate_due_date(at(2026, 1, 30, 10)), at(2026, 2, 1, 10));
        assert_eq!(calculate_due_date(at(2028, 2, 28, 23)), at(2028, 3, 1, 23));
    }

    #[test]
    fn test_due_date_year_boundary() {
        assert_eq!(calculate_due_date(at(2025, 12, 30, 10)), at(2026, 1, 1, 10));
    }

    #[test]
    fn test_create_loan() {
        let now = at(2026, 3, 1, 9);
        let loan = Loan::create_at("user-123", "device-456", "Dell XPS 15", now).unwrap();

        assert_eq!(loan.user_id, "user-123");
        assert_eq!(loan.device_id, "device-456");
        assert_eq!(loan.device_model, "Dell XPS 15");
        assert_eq!(loan.status, LoanStatus::Reserved);
        assert_eq!(loan.reserved_at, now);
        assert_eq!(loan.due_date, at(2026, 3, 3, 9));
        assert!(loan.collected_at.is_none());
        assert!(loan.returned_at.is_none());
    }

    #[test]
    fn test_create_loan_trims_inputs() {
        let loan = Loan::create("  user-123  ", "  device-456  ", "  Dell XPS  ").unwrap();
        assert_eq!(loan.user_id, "user-123");
        assert_eq!(loan.device_id, "device-456");
        assert_eq!(loan.device_model, "Dell XPS");
    }

    #[test]
    fn test_create_loan_rejects_blank_fields() {
        for (user, device, model, field) in [
            ("", "device-456", "Test", "User ID"),
            ("user-123", "   ", "Test", "Device ID"),
            ("user-123", "device-456", "", "Device model"),
        ] {
            match Loan::create(user, device, model) {
                Err(AppError::Validation(msg)) => assert!(msg.contains(field), "{}", msg),
                other => panic!("expected validation error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_create_loan_ids_are_unique() {
        assert_ne!(reserved().id, reserved().id);
    }

    #[test]
    fn test_collect() {
        let loan = reserved();
        let collected = loan.collect().unwrap();

        assert_eq!(collected.status, LoanStatus::Collected);
        assert!(collected.collected_at.is_some());
        // input untouched
        assert_eq!(loan.status, LoanStatus::Reserved);
        assert!(loan.collected_at.is_none());
    }

    #[test]
    fn test_collect_only_from_reserved() {
        let collected = reserved().collect().unwrap();
        let returned = collected.return_device().unwrap();
        let overdue = Loan {
            status: LoanStatus::Overdue,
            ..reserved()
        };

        for loan in [collected, returned, overdue] {
            assert!(matches!(loan.collect(), Err(AppError::InvalidTransition(_))));
        }
    }

    #[test]
    fn test_collect_rejects_stamped_loan() {
        let loan = Loan {
            collected_at: Some(Utc::now()),
            ..reserved()
        };
        assert!(matches!(loan.collect(), Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn test_return() {
        let collected = reserved().collect().unwrap();
        let returned = collected.return_device().unwrap();

        assert_eq!(returned.status, LoanStatus::Returned);
        assert!(returned.returned_at.is_some());
        assert_eq!(collected.status, LoanStatus::Collected);
        assert!(collected.returned_at.is_none());
    }

    #[test]
    fn test_return_only_from_collected() {
        let returned = reserved().collect().unwrap().return_device().unwrap();
        let overdue = Loan {
            status: LoanStatus::Overdue,
            ..reserved().collect().unwrap()
        };

        for loan in [reserved(), returned, overdue] {
            assert!(matches!(
                loan.return_device(),
                Err(AppError::InvalidTransition(_))
            ));
        }
    }

    #[test]
    fn test_is_overdue() {
        let now = Utc::now();
        let mut loan = reserved().collect().unwrap();

        loan.due_date = now + Duration::days(5);
        assert!(!loan.is_overdue_at(now));

        loan.due_date = now - Duration::days(1);
        assert!(loan.is_overdue_at(now));

        let returned = Loan {
            status: LoanStatus::Returned,
            returned_at: Some(now),
            ..loan
        };
        assert!(!returned.is_overdue_at(now));
    }

    #[test]
    fn test_derive_overdue() {
        let now = Utc::now();
        let past = now - Duration::days(1);

        let collected = Loan {
            due_date: past,
            ..reserved().collect().unwrap()
        };
        let derived = collected.derive_overdue_at(now);
        assert_eq!(derived.status, LoanStatus::Overdue);
        assert_eq!(derived.derive_overdue_at(now), derived);

        let reserved_late = Loan {
            due_date: past,
            ..reserved()
        };
        assert_eq!(reserved_late.derive_overdue_at(now).status, LoanStatus::Overdue);

        let fresh = reserved();
        assert_eq!(fresh.derive_overdue_at(now), fresh);
    }

    #[test]
    fn test_derive_overdue_ignores_returned() {
        let now = Utc::now();
        let returned = Loan {
            due_date: now - Duration::days(10),
            ..reserved().collect().unwrap().return_device().unwrap()
        };
        assert_eq!(returned.derive_overdue_at(now), returned);
    }

    #[test]
    fn test_without_overdue() {
        let collected = reserved().collect().unwrap();
        let late = Loan {
            status: LoanStatus::Overdue,
            ..collected.clone()
        };
        assert_eq!(late.without_overdue().status, LoanStatus::Collected);

        let late_reservation = Loan {
            status: LoanStatus::Overdue,
            ..reserved()
        };
        assert_eq!(late_reservation.without_overdue().status, LoanStatus::Reserved);
        assert_eq!(collected.without_overdue(), collected);
    }

    #[test]
    fn test_status_round_trip_from_str() {
        assert_eq!("Overdue".parse::<LoanStatus>(), Ok(LoanStatus::Overdue));
        assert!("lost".parse::<LoanStatus>().is_err());
    }
}
