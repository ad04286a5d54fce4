//! Device as seen through the device catalogue service

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub category: String,
    pub total_count: i32,
    pub available_count: i32,
}

impl Device {
    /// Display name stored on loans ("Dell XPS 15")
    pub fn display_model(&self) -> String {
        format!("{} {}", self.brand, self.model).trim().to_string()
    }

    pub fn is_available(&self) -> bool {
        self.available_count > 0
    }
}
