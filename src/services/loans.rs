//! Loan lifecycle service: reservation, collection, return and cancellation
//!
//! The loan write in each operation is the primary mutation and its failure
//! is returned to the caller. Inventory updates, notifications, the waitlist
//! cascade and event publishing run afterwards through [`best_effort`].

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        event::LoanEvent,
        loan::{Loan, LoanQuery, LoanStatus, ReservationReceipt},
        notification::{CreateNotification, NotificationKind},
    },
    repository::Repository,
};

use super::{
    best_effort, notifications::NotificationsService, waitlist::WaitlistService, Collaborators,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    collaborators: Collaborators,
    waitlist: WaitlistService,
    notifications: NotificationsService,
}

fn loan_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Loan not found: {}", id))
}

fn loan_notification(loan: &Loan, kind: NotificationKind, title: &str, message: String) -> CreateNotification {
    CreateNotification {
        user_id: loan.user_id.clone(),
        kind,
        title: title.to_string(),
        message,
        loan_id: Some(loan.id),
        device_id: Some(loan.device_id.clone()),
        device_brand: None,
        device_model: Some(loan.device_model.clone()),
    }
}

impl LoansService {
    pub fn new(
        repository: Repository,
        collaborators: Collaborators,
        waitlist: WaitlistService,
        notifications: NotificationsService,
    ) -> Self {
        Self {
            repository,
            collaborators,
            waitlist,
            notifications,
        }
    }

    /// Reserve a device for a user.
    ///
    /// The active-loan check and the loan write run under a lease on the
    /// device id, so concurrent reservations of one device are serialized and
    /// exactly one of them succeeds.
    pub async fn reserve_device(&self, user_id: &str, device_id: &str) -> AppResult<ReservationReceipt> {
        let user_id = user_id.trim();
        let device_id = device_id.trim();
        if user_id.is_empty() {
            return Err(AppError::Validation("User ID is required".to_string()));
        }
        if device_id.is_empty() {
            return Err(AppError::Validation("Device ID is required".to_string()));
        }

        let devices = &self.collaborators.devices;
        let device = devices
            .get_device(device_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Device not found: {}", device_id)))?;

        if !devices.is_available(device_id).await? {
            return Err(AppError::Unavailable(format!(
                "Device {} is not available",
                device.display_model()
            )));
        }

        let lease = self.collaborators.locks.acquire(device_id).await?;
        let created = self
            .create_exclusive(user_id, device_id, &device.display_model())
            .await;
        self.collaborators.locks.release(lease).await;
        let loan = created?;

        tracing::info!(
            loan_id = %loan.id,
            user_id = %loan.user_id,
            device_id = %loan.device_id,
            "Device reserved"
        );

        let subject = loan.id.to_string();
        best_effort(
            "decrement availability",
            &subject,
            devices.update_availability(&loan.device_id, -1),
        )
        .await;
        best_effort(
            "reserved notification",
            &subject,
            self.notifications.notify(loan_notification(
                &loan,
                NotificationKind::Reserved,
                "Device Reserved",
                format!(
                    "You have reserved {}. Please collect it by {}",
                    loan.device_model,
                    loan.due_date.format("%Y-%m-%d")
                ),
            )),
        )
        .await;
        best_effort(
            "publish reserved",
            &subject,
            self.collaborators.events.publish(&LoanEvent::reserved(&loan)),
        )
        .await;

        Ok(ReservationReceipt {
            loan_id: loan.id,
            device_model: loan.device_model,
            due_date: loan.due_date,
        })
    }

    /// Check for an active loan and write the new one. Callers hold the
    /// device lease.
    async fn create_exclusive(&self, user_id: &str, device_id: &str, device_model: &str) -> AppResult<Loan> {
        let existing = self.repository.loans.get_by_device_id(device_id).await?;
        if existing.iter().any(Loan::is_active) {
            return Err(AppError::Conflict(format!(
                "Device {} is already reserved or on loan",
                device_id
            )));
        }

        let loan = Loan::create(user_id, device_id, device_model)?;
        self.repository.loans.save(&loan).await
    }

    async fn find(&self, loan_id: Uuid) -> AppResult<Loan> {
        self.repository
            .loans
            .get_by_id(loan_id)
            .await?
            .ok_or_else(|| loan_not_found(loan_id))
    }

    /// Write a transitioned loan, failing if another writer moved the stored
    /// record away from `expected` in the meantime
    async fn commit(&self, loan: &Loan, expected: LoanStatus) -> AppResult<()> {
        if self.repository.loans.save_if_status(loan, expected).await? {
            Ok(())
        } else {
            Err(AppError::InvalidTransition(format!(
                "Loan {} was modified concurrently",
                loan.id
            )))
        }
    }

    /// Hand a reserved device over to its borrower
    pub async fn collect_device(&self, loan_id: Uuid) -> AppResult<Loan> {
        let stored = self.find(loan_id).await?;
        // an expired reservation is overdue whether or not the sweep stored it
        let loan = stored.derive_overdue().collect()?;
        self.commit(&loan, stored.status).await?;

        tracing::info!(loan_id = %loan.id, device_id = %loan.device_id, "Device collected");

        let subject = loan.id.to_string();
        best_effort(
            "collected notification",
            &subject,
            self.notifications.notify(loan_notification(
                &loan,
                NotificationKind::Collected,
                "Device Collected",
                format!(
                    "You have collected {}. Due date: {}",
                    loan.device_model,
                    loan.due_date.format("%Y-%m-%d")
                ),
            )),
        )
        .await;
        best_effort(
            "publish collected",
            &subject,
            self.collaborators.events.publish(&LoanEvent::collected(&loan)),
        )
        .await;

        Ok(loan)
    }

    /// Take a device back, free the unit and tell the next user in line
    pub async fn return_device(&self, loan_id: Uuid) -> AppResult<Loan> {
        let stored = self.find(loan_id).await?;
        let loan = stored.without_overdue().return_device()?;
        self.commit(&loan, stored.status).await?;

        tracing::info!(loan_id = %loan.id, device_id = %loan.device_id, "Device returned");

        let subject = loan.id.to_string();
        best_effort(
            "returned notification",
            &subject,
            self.notifications.notify(loan_notification(
                &loan,
                NotificationKind::Returned,
                "Device Returned",
                format!("You have successfully returned {}. Thank you!", loan.device_model),
            )),
        )
        .await;
        best_effort(
            "increment availability",
            &subject,
            self.collaborators.devices.update_availability(&loan.device_id, 1),
        )
        .await;
        best_effort(
            "waitlist cascade",
            &subject,
            self.waitlist.notify_next_in_line(&loan.device_id),
        )
        .await;
        best_effort(
            "publish returned",
            &subject,
            self.collaborators.events.publish(&LoanEvent::returned(&loan)),
        )
        .await;

        Ok(loan)
    }

    /// Withdraw a reservation that has not been collected yet. Only the
    /// borrower may cancel; the record is deleted outright.
    pub async fn cancel_loan(&self, loan_id: Uuid, user_id: &str) -> AppResult<()> {
        let stored = self.find(loan_id).await?;

        if stored.user_id != user_id {
            return Err(AppError::Forbidden(
                "You can only cancel your own reservations".to_string(),
            ));
        }

        if stored.without_overdue().status != LoanStatus::Reserved {
            return Err(AppError::InvalidTransition(
                "Only reserved loans can be cancelled. This loan has already been collected or returned."
                    .to_string(),
            ));
        }

        if !self
            .repository
            .loans
            .delete_if_status(stored.id, stored.status)
            .await?
        {
            return Err(AppError::InvalidTransition(format!(
                "Loan {} was modified concurrently",
                stored.id
            )));
        }

        let cancelled_at = Utc::now();
        tracing::info!(loan_id = %stored.id, user_id, "Loan cancelled");

        let subject = stored.id.to_string();
        best_effort(
            "increment availability",
            &subject,
            self.collaborators.devices.update_availability(&stored.device_id, 1),
        )
        .await;
        best_effort(
            "cancelled notification",
            &subject,
            self.notifications.notify(loan_notification(
                &stored,
                NotificationKind::Cancelled,
                "Reservation Cancelled",
                format!("Your reservation for {} has been cancelled", stored.device_model),
            )),
        )
        .await;
        best_effort(
            "publish cancelled",
            &subject,
            self.collaborators
                .events
                .publish(&LoanEvent::cancelled(&stored, cancelled_at)),
        )
        .await;

        Ok(())
    }

    pub async fn get_loan(&self, loan_id: Uuid) -> AppResult<Loan> {
        Ok(self.find(loan_id).await?.derive_overdue())
    }

    /// List loans by the most specific filter given; a device filter still
    /// narrows a per-user listing. Overdue status is derived before the
    /// status filter applies and is not written back.
    pub async fn list_loans(&self, query: &LoanQuery) -> AppResult<Vec<Loan>> {
        let loans = match (&query.user_id, &query.device_id) {
            (Some(user_id), _) => self.repository.loans.get_by_user_id(user_id).await?,
            (None, Some(device_id)) => self.repository.loans.get_by_device_id(device_id).await?,
            (None, None) => self.repository.loans.list().await?,
        };

        Ok(loans
            .iter()
            .filter(|l| query.device_id.as_ref().map_or(true, |d| &l.device_id == d))
            .map(Loan::derive_overdue)
            .filter(|l| query.status.map_or(true, |s| l.status == s))
            .collect())
    }

    /// All overdue loans. A loan whose stored status is not yet `overdue` is
    /// written back once; later calls find it already flipped.
    pub async fn get_overdue_loans(&self) -> AppResult<Vec<Loan>> {
        let now = Utc::now();
        let mut overdue = Vec::new();

        for stored in self.repository.loans.list().await? {
            let derived = stored.derive_overdue_at(now);
            if derived.status != LoanStatus::Overdue {
                continue;
            }

            if stored.status != LoanStatus::Overdue
                && !self
                    .repository
                    .loans
                    .save_if_status(&derived, stored.status)
                    .await?
            {
                // moved on since the scan; no longer ours to flip
                continue;
            }

            overdue.push(derived);
        }

        Ok(overdue)
    }

    /// Scheduled variant of [`Self::get_overdue_loans`]
    pub async fn sweep_overdue(&self) -> AppResult<usize> {
        let overdue = self.get_overdue_loans().await?;
        tracing::info!(count = overdue.len(), "Overdue sweep finished");
        Ok(overdue.len())
    }
}
