//! Loan event publishing (fire-and-forget from the orchestrators' view)

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;

use crate::{
    config::EventsConfig,
    error::{AppError, AppResult},
    models::event::LoanEvent,
};

const HISTORY_LIMIT: usize = 256;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &LoanEvent) -> AppResult<()>;
}

/// Writes events to the log and keeps the most recent ones in memory
#[derive(Default)]
pub struct LogEventPublisher {
    history: Mutex<VecDeque<LoanEvent>>,
}

impl LogEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent events, oldest first
    pub fn published(&self) -> Vec<LoanEvent> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, event: &LoanEvent) -> AppResult<()> {
        let data = serde_json::to_string(&event.data)
            .map_err(|e| AppError::Internal(format!("Failed to encode event: {}", e)))?;
        tracing::info!(event_type = %event.event_type, %data, "Event published");

        let mut history = self
            .history
            .lock()
            .map_err(|_| AppError::Internal("Event history lock poisoned".to_string()))?;
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(event.clone());
        Ok(())
    }
}

/// Publishes to an Azure Event Grid topic
#[derive(Clone)]
pub struct EventGridPublisher {
    client: Client,
    topic_endpoint: String,
    topic_key: String,
}

impl EventGridPublisher {
    pub fn new(config: &EventsConfig) -> AppResult<Self> {
        let topic_endpoint = config.topic_endpoint.clone().ok_or_else(|| {
            AppError::Internal("events.topic_endpoint is required for event_grid".to_string())
        })?;
        let topic_key = config.topic_key.clone().ok_or_else(|| {
            AppError::Internal("events.topic_key is required for event_grid".to_string())
        })?;

        Ok(Self {
            client: Client::new(),
            topic_endpoint,
            topic_key,
        })
    }
}

#[async_trait]
impl EventPublisher for EventGridPublisher {
    async fn publish(&self, event: &LoanEvent) -> AppResult<()> {
        let now = Utc::now();
        let body = json!([{
            "id": format!("{}-{}-{}", event.event_type, event.data.loan_id, now.timestamp_millis()),
            "subject": format!("loans/{}", event.data.loan_id),
            "dataVersion": "1.0",
            "eventType": event.event_type.grid_type(),
            "eventTime": now,
            "data": event.data,
        }]);

        let response = self
            .client
            .post(&self.topic_endpoint)
            .header("aeg-sas-key", &self.topic_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AppError::Collaborator(format!("Failed to publish {} event: {}", event.event_type, e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::Collaborator(format!(
                "Failed to publish {} event: {}",
                event.event_type,
                response.status()
            )));
        }

        tracing::info!(event_type = %event.event_type, loan_id = %event.data.loan_id, "Published event to Event Grid");
        Ok(())
    }
}
