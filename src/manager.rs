use crate::bulb::Bulb;
use crate::error::{BulbError, Result};
use crate::types::{DeviceId, Endpoint};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Summary of a managed bulb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedBulb {
    pub id: DeviceId,
    pub label: String,
    pub endpoint: Endpoint,
}

struct Entry {
    label: String,
    bulb: Bulb,
}

/// Inventory of bulb sessions
///
/// Holds at most one session per address and fans bulk operations out to
/// every session.
///
/// # Example
///
/// ```no_run
/// use yeelight_lan::{BulbManager, Endpoint};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = BulbManager::new();
///     let id = manager.create(Endpoint::new("192.168.1.50"), "Desk")?;
///     manager.initialize_all().await;
///
///     if let Some(bulb) = manager.get(id) {
///         bulb.set_level(40, None);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone, Default)]
pub struct BulbManager {
    bulbs: Arc<Mutex<BTreeMap<DeviceId, Entry>>>,
}

impl BulbManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session for `endpoint`; it is not connected until initialized
    pub fn create(&self, endpoint: Endpoint, label: impl Into<String>) -> Result<DeviceId> {
        let mut bulbs = self.lock();

        if let Some(address) = endpoint.address.as_deref() {
            let taken = bulbs
                .values()
                .any(|entry| entry.bulb.endpoint().address.as_deref() == Some(address));
            if taken {
                return Err(BulbError::DuplicateAddress(address.to_string()));
            }
        }

        let id = Uuid::new_v4();
        let label = label.into();
        tracing::info!("Adding bulb {} ({}) at {:?}", label, id, endpoint.address);
        bulbs.insert(
            id,
            Entry {
                label,
                bulb: Bulb::new(endpoint),
            },
        );
        Ok(id)
    }

    /// Remove a bulb and shut its session down
    pub async fn remove(&self, id: DeviceId) -> Option<ManagedBulb> {
        let entry = self.lock().remove(&id)?;
        tracing::info!("Removing bulb {} ({})", entry.label, id);
        entry.bulb.shutdown().await;
        Some(ManagedBulb {
            id,
            label: entry.label,
            endpoint: entry.bulb.endpoint(),
        })
    }

    /// All managed bulbs, ordered by id
    pub fn list(&self) -> Vec<ManagedBulb> {
        self.lock()
            .iter()
            .map(|(id, entry)| ManagedBulb {
                id: *id,
                label: entry.label.clone(),
                endpoint: entry.bulb.endpoint(),
            })
            .collect()
    }

    /// Session handle for `id`, if it is managed here
    pub fn get(&self, id: DeviceId) -> Option<Bulb> {
        self.lock().get(&id).map(|entry| entry.bulb.clone())
    }

    /// Number of managed bulbs
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no bulbs are managed
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Initialize every session; failures are logged per bulb
    pub async fn initialize_all(&self) {
        for (id, bulb) in self.sessions() {
            if let Err(e) = bulb.initialize().await {
                tracing::warn!("Failed to initialize bulb {}: {}", id, e);
            }
        }
    }

    /// Poll every session
    pub fn poll_all(&self) {
        for (_, bulb) in self.sessions() {
            bulb.poll();
        }
    }

    /// Rewrite every endpoint with `update` and re-initialize each session
    pub async fn reconfigure_all<F>(&self, update: F)
    where
        F: Fn(&Endpoint) -> Endpoint,
    {
        for (id, bulb) in self.sessions() {
            let endpoint = update(&bulb.endpoint());
            if let Err(e) = bulb.reconfigure(endpoint).await {
                tracing::warn!("Failed to reconfigure bulb {}: {}", id, e);
            }
        }
    }

    /// Snapshot of the sessions so no lock is held across awaits
    fn sessions(&self) -> Vec<(DeviceId, Bulb)> {
        self.lock()
            .iter()
            .map(|(id, entry)| (*id, entry.bulb.clone()))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<DeviceId, Entry>> {
        self.bulbs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
