//! Repository layer: loan store, waitlist store and notification ledger

pub mod loans;
pub mod notifications;
pub mod waitlist;

use std::sync::Arc;

use sqlx::{Pool, Postgres};

pub use loans::{LoanStore, MemoryLoansRepository, PgLoansRepository};
pub use notifications::{MemoryNotificationsRepository, NotificationStore, PgNotificationsRepository};
pub use waitlist::{MemoryWaitlistRepository, PgWaitlistRepository, WaitlistStore};

/// The three stores the loan services coordinate. Each exclusively owns its
/// records; there is no transaction spanning them.
#[derive(Clone)]
pub struct Repository {
    pub loans: Arc<dyn LoanStore>,
    pub waitlist: Arc<dyn WaitlistStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Repository {
    /// Create a repository backed by the given database pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            loans: Arc::new(PgLoansRepository::new(pool.clone())),
            waitlist: Arc::new(PgWaitlistRepository::new(pool.clone())),
            notifications: Arc::new(PgNotificationsRepository::new(pool)),
        }
    }

    /// Create a process-local repository (development and tests)
    pub fn in_memory() -> Self {
        Self {
            loans: Arc::new(MemoryLoansRepository::new()),
            waitlist: Arc::new(MemoryWaitlistRepository::new()),
            notifications: Arc::new(MemoryNotificationsRepository::new()),
        }
    }
}
