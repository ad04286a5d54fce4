//! Data models for the campus loans server

pub mod device;
pub mod event;
pub mod loan;
pub mod notification;
pub mod user;
pub mod waitlist;

// Re-export commonly used types
pub use device::Device;
pub use event::{LoanEvent, LoanEventType};
pub use loan::{Loan, LoanQuery, LoanStatus, ReservationReceipt};
pub use notification::{Notification, NotificationKind};
pub use user::{Role, UserClaims};
pub use waitlist::WaitlistEntry;
