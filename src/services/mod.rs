//! Business logic services

pub mod devices;
pub mod events;
pub mod loans;
pub mod locks;
pub mod notifications;
pub mod waitlist;

use std::{future::Future, sync::Arc};

use crate::{error::AppResult, repository::Repository};

use devices::DeviceCatalogue;
use events::EventPublisher;
use locks::ReservationLock;

/// External components the services call but do not own
#[derive(Clone)]
pub struct Collaborators {
    pub devices: Arc<dyn DeviceCatalogue>,
    pub events: Arc<dyn EventPublisher>,
    pub locks: Arc<dyn ReservationLock>,
}

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub loans: loans::LoansService,
    pub waitlist: waitlist::WaitlistService,
    pub notifications: notifications::NotificationsService,
}

impl Services {
    /// Create all services with the given repository and collaborators
    pub fn new(repository: Repository, collaborators: Collaborators) -> Self {
        let notifications = notifications::NotificationsService::new(repository.clone());
        let waitlist = waitlist::WaitlistService::new(
            repository.clone(),
            collaborators.devices.clone(),
            notifications.clone(),
        );
        let loans = loans::LoansService::new(
            repository,
            collaborators,
            waitlist.clone(),
            notifications.clone(),
        );

        Self {
            loans,
            waitlist,
            notifications,
        }
    }
}

/// Run a secondary side effect behind its own error boundary: a failure is
/// logged and swallowed so it cannot abort the caller or the next effect.
pub(crate) async fn best_effort<T, F>(effect: &'static str, subject: &str, fut: F) -> Option<T>
where
    F: Future<Output = AppResult<T>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(effect, subject, error = %e, "Side effect failed");
            None
        }
    }
}
