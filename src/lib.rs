//! Campus device loans server
//!
//! Reservation, collection, return and cancellation of loaned devices, with
//! per-device waitlists and a user notification inbox, served as a REST JSON
//! API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
