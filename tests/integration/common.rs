use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use campus_loans_server::{
    models::{
        device::Device,
        user::{Role, UserClaims},
    },
    repository::Repository,
    services::{
        devices::{DeviceCatalogue, InMemoryDeviceCatalogue},
        events::LogEventPublisher,
        locks::LocalReservationLock,
        Collaborators, Services,
    },
    AppResult,
};

pub fn device(id: &str, available: i32, total: i32) -> Device {
    Device {
        id: id.to_string(),
        brand: "Apple".to_string(),
        model: format!("MacBook {}", id),
        category: "laptop".to_string(),
        total_count: total,
        available_count: available,
    }
}

pub fn user(id: &str, role: Role) -> UserClaims {
    UserClaims {
        sub: id.to_string(),
        email: format!("{}@campus.test", id),
        name: id.to_uppercase(),
        role,
        exp: chrono::Utc::now().timestamp() + 3600,
    }
}

pub struct Harness {
    pub services: Services,
    pub repository: Repository,
    pub events: Arc<LogEventPublisher>,
}

pub fn harness(devices: Arc<dyn DeviceCatalogue>) -> Harness {
    let repository = Repository::in_memory();
    let events = Arc::new(LogEventPublisher::new());
    let services = Services::new(
        repository.clone(),
        Collaborators {
            devices,
            events: events.clone(),
            locks: Arc::new(LocalReservationLock::new(Duration::from_secs(5))),
        },
    );

    Harness {
        services,
        repository,
        events,
    }
}

pub fn catalogue(devices: Vec<Device>) -> Arc<InMemoryDeviceCatalogue> {
    Arc::new(InMemoryDeviceCatalogue::with_devices(devices))
}

/// Catalogue whose availability reads are served from a stale cache: every
/// unit looks free, while updates are counted separately. Only the loan
/// store can then refuse a second reservation.
pub struct StaleCatalogue {
    device: Device,
    available: AtomicI32,
}

impl StaleCatalogue {
    pub fn new(device: Device) -> Self {
        let available = AtomicI32::new(device.available_count);
        Self { device, available }
    }

    pub fn available(&self) -> i32 {
        self.available.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceCatalogue for StaleCatalogue {
    async fn get_device(&self, device_id: &str) -> AppResult<Option<Device>> {
        Ok((device_id == self.device.id).then(|| self.device.clone()))
    }

    async fn is_available(&self, device_id: &str) -> AppResult<bool> {
        Ok(device_id == self.device.id)
    }

    async fn update_availability(&self, _device_id: &str, delta: i32) -> AppResult<()> {
        self.available.fetch_add(delta, Ordering::SeqCst);
        Ok(())
    }
}
