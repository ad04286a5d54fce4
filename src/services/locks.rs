//! Per-device reservation locks
//!
//! Checking for an active loan and writing the new one must happen as one
//! step per device. Reservations take a lease on the device id around that
//! step; leases on different devices never contend.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use redis::Client;
use tokio::{
    sync::{Mutex as AsyncMutex, OwnedMutexGuard},
    time::Instant,
};
use uuid::Uuid;

use crate::{
    config::LockConfig,
    error::{AppError, AppResult},
};

/// Compare-and-delete so a lease that expired and was re-acquired by another
/// holder is left alone.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Exclusive hold on one device id
pub struct DeviceLease {
    key: String,
    token: String,
    _guard: Option<OwnedMutexGuard<()>>,
}

impl DeviceLease {
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
pub trait ReservationLock: Send + Sync {
    /// Wait for the device to be free, failing with `Conflict` on timeout
    async fn acquire(&self, device_id: &str) -> AppResult<DeviceLease>;

    async fn release(&self, lease: DeviceLease);
}

fn busy(device_id: &str) -> AppError {
    AppError::Conflict(format!(
        "Another reservation for device {} is in progress",
        device_id
    ))
}

/// Single-process lock: one async mutex per device id
pub struct LocalReservationLock {
    // keyed only by ids the catalogue has confirmed, so the map is bounded
    // by the device pool and never pruned
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    acquire_timeout: Duration,
}

impl LocalReservationLock {
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            acquire_timeout,
        }
    }
}

impl Default for LocalReservationLock {
    fn default() -> Self {
        Self::new(Duration::from_millis(LockConfig::default().acquire_timeout_ms))
    }
}

#[async_trait]
impl ReservationLock for LocalReservationLock {
    async fn acquire(&self, device_id: &str) -> AppResult<DeviceLease> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| AppError::Internal("Reservation lock map poisoned".to_string()))?;
            locks.entry(device_id.to_string()).or_default().clone()
        };

        let guard = tokio::time::timeout(self.acquire_timeout, lock.lock_owned())
            .await
            .map_err(|_| busy(device_id))?;

        Ok(DeviceLease {
            key: device_id.to_string(),
            token: String::new(),
            _guard: Some(guard),
        })
    }

    async fn release(&self, lease: DeviceLease) {
        drop(lease);
    }
}

/// Lock shared by every server instance, held as a Redis key with a TTL
#[derive(Clone)]
pub struct RedisReservationLock {
    client: Client,
    ttl_ms: u64,
    acquire_timeout: Duration,
    retry_delay: Duration,
}

impl RedisReservationLock {
    /// Create a new Redis-backed lock
    pub async fn new(url: &str, config: &LockConfig) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        // Test connection
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Redis: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(Self {
            client,
            ttl_ms: config.ttl_ms,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl ReservationLock for RedisReservationLock {
    async fn acquire(&self, device_id: &str) -> AppResult<DeviceLease> {
        let mut conn = self.connection().await?;
        let key = format!("loans:device-lock:{}", device_id);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.acquire_timeout;

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(self.ttl_ms)
                .query_async(&mut conn)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to acquire device lock: {}", e)))?;

            if acquired.is_some() {
                return Ok(DeviceLease {
                    key,
                    token,
                    _guard: None,
                });
            }

            if Instant::now() >= deadline {
                return Err(busy(device_id));
            }
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    async fn release(&self, lease: DeviceLease) {
        let result = match self.connection().await {
            Ok(mut conn) => redis::Script::new(RELEASE_SCRIPT)
                .key(&lease.key)
                .arg(&lease.token)
                .invoke_async::<_, i32>(&mut conn)
                .await
                .map_err(|e| AppError::Internal(e.to_string())),
            Err(e) => Err(e),
        };

        // The TTL frees the device eventually even if this fails
        if let Err(e) = result {
            tracing::warn!(key = %lease.key, error = %e, "Failed to release device lock");
        }
    }
}
