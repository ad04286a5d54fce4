//! Device catalogue client
//!
//! The catalogue service owns device records and availability counts. The
//! loan services only read devices and nudge availability by one unit.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tokio::sync::RwLock;

use crate::{
    config::DevicesConfig,
    error::{AppError, AppResult},
    models::device::Device,
};

/// Device availability collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceCatalogue: Send + Sync {
    async fn get_device(&self, device_id: &str) -> AppResult<Option<Device>>;

    async fn is_available(&self, device_id: &str) -> AppResult<bool>;

    /// Apply a signed change to the free unit count (-1 reserves, +1 returns)
    async fn update_availability(&self, device_id: &str, delta: i32) -> AppResult<()>;
}

/// HTTP client for the device catalogue service
#[derive(Clone)]
pub struct HttpDeviceCatalogue {
    client: Client,
    base_url: String,
    function_key: Option<String>,
}

impl HttpDeviceCatalogue {
    pub fn new(config: &DevicesConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            function_key: config.function_key.clone(),
        })
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.function_key {
            Some(key) => request.header("x-functions-key", key),
            None => request,
        }
    }
}

#[async_trait]
impl DeviceCatalogue for HttpDeviceCatalogue {
    async fn get_device(&self, device_id: &str) -> AppResult<Option<Device>> {
        let url = format!("{}/devices/{}", self.base_url, device_id);
        tracing::debug!(%url, "Fetching device");

        let response = self
            .with_key(self.client.get(&url))
            .send()
            .await
            .map_err(|e| AppError::Collaborator(format!("Failed to fetch device: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Collaborator(format!(
                "Failed to fetch device {}: {} {}",
                device_id, status, body
            )));
        }

        let device = response
            .json::<Device>()
            .await
            .map_err(|e| AppError::Collaborator(format!("Invalid device payload: {}", e)))?;

        Ok(Some(device))
    }

    async fn is_available(&self, device_id: &str) -> AppResult<bool> {
        Ok(self
            .get_device(device_id)
            .await?
            .map(|d| d.is_available())
            .unwrap_or(false))
    }

    async fn update_availability(&self, device_id: &str, delta: i32) -> AppResult<()> {
        let url = format!("{}/devices/{}/update-availability", self.base_url, device_id);
        tracing::debug!(%url, delta, "Updating device availability");

        // The catalogue endpoint takes a decrement
        let response = self
            .with_key(self.client.post(&url))
            .json(&json!({ "decrementBy": -delta }))
            .send()
            .await
            .map_err(|e| {
                AppError::Collaborator(format!("Failed to update device availability: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::Collaborator(format!(
                "Failed to update device availability for {}: {}",
                device_id,
                response.status()
            )));
        }

        Ok(())
    }
}

/// Process-local device catalogue for development and tests
#[derive(Default)]
pub struct InMemoryDeviceCatalogue {
    devices: RwLock<HashMap<String, Device>>,
}

impl InMemoryDeviceCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices: RwLock::new(devices.into_iter().map(|d| (d.id.clone(), d)).collect()),
        }
    }

    pub async fn insert(&self, device: Device) {
        self.devices.write().await.insert(device.id.clone(), device);
    }
}

#[async_trait]
impl DeviceCatalogue for InMemoryDeviceCatalogue {
    async fn get_device(&self, device_id: &str) -> AppResult<Option<Device>> {
        Ok(self.devices.read().await.get(device_id).cloned())
    }

    async fn is_available(&self, device_id: &str) -> AppResult<bool> {
        Ok(self
            .devices
            .read()
            .await
            .get(device_id)
            .map(|d| d.is_available())
            .unwrap_or(false))
    }

    async fn update_availability(&self, device_id: &str, delta: i32) -> AppResult<()> {
        let mut devices = self.devices.write().await;
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| AppError::Collaborator(format!("Device not found: {}", device_id)))?;

        let available = device.available_count + delta;
        if available < 0 {
            return Err(AppError::Collaborator(
                "Not enough devices available".to_string(),
            ));
        }
        if available > device.total_count {
            return Err(AppError::Collaborator(
                "Available count cannot exceed total count".to_string(),
            ));
        }

        device.available_count = available;
        Ok(())
    }
}
